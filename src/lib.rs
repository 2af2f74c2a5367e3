//! # bridgenet
//!
//! An async HTTP client whose networking runs in a native engine.
//!
//! The engine (connection pooling, TLS, HTTP/1.1 and HTTP/2 framing) lives
//! behind a C ABI and drives its own worker threads. `bridgenet` is the
//! managed side of that boundary: it owns the native handles, routes
//! engine callbacks to the right exchange, and exposes requests and
//! responses as ordinary `http` and `http-body` types.
//!
//! ## Features
//!
//! - **Handle lifetimes**: a reference-counted runtime, per-client
//!   contexts, per-request handles, torn down in a fixed order
//! - **Streaming bodies**: request bodies with send-buffer backpressure,
//!   response bodies as [`http_body::Body`] and [`futures::Stream`]
//! - **Cancellation**: [`tokio_util::sync::CancellationToken`] per request,
//!   observed immediately on the managed side
//! - **Trailers and HTTP/2 reset codes** surfaced on completion
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bridgenet::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bridgenet::BridgeError> {
//!     let client = Client::builder().build()?;
//!     let response = client.get("https://example.com").send().await?;
//!     println!("Status: {}", response.status());
//!     println!("{}", response.text().await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error type, response states, native error translation
//! - [`native`] - The engine ABI: handles, buffers, callbacks, [`native::NativeEngine`]
//! - [`handle`] - Runtime and context ownership
//! - [`dispatch`] - Sequence registry and callback entry points
//! - [`http`] - Requests, exchanges, body bridges and responses
//! - [`client`] - High-level client API

pub mod base;
pub mod client;
pub mod dispatch;
pub mod handle;
pub mod http;
pub mod native;

pub use base::neterror::BridgeError;
pub use client::{Client, ClientBuilder, RequestBuilder};
pub use handle::NativeRuntime;
pub use crate::http::{
    BridgeConfig, ClientSettings, Exchange, HttpRequest, HttpResponse, OutboundBody, RequestBody,
    ResponseBody,
};
pub use tokio_util::sync::CancellationToken;
