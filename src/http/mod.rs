pub mod exchange;
pub mod inbound;
pub mod outbound;
pub mod request;
pub mod requestbody;
pub mod response;
pub mod responsebody;
pub mod settings;

// Re-exports for convenience
pub use exchange::Exchange;
pub use inbound::ResponseHead;
pub use outbound::OutboundBody;
pub use request::HttpRequest;
pub use requestbody::RequestBody;
pub use response::HttpResponse;
pub use responsebody::ResponseBody;
pub use settings::{BridgeConfig, ClientSettings};
