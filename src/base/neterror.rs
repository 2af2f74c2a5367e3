use thiserror::Error;

/// Every failure the bridge can surface.
///
/// Native-reported errors are translated into this type once, at the
/// boundary, and then propagated unchanged. The type is `Clone` because a
/// single terminal condition is delivered to both the response-head
/// awaiter and the body consumer.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum BridgeError {
    // Construction errors
    #[error("Native runtime initialization failed")]
    RuntimeInitFailed,
    #[error("Native context initialization failed: {message}")]
    ContextInitFailed { message: String },

    // Send errors, raised before the exchange begins
    #[error("Setting request {field} failed: {message}")]
    SetterFailed { field: &'static str, message: String },
    #[error("Unsupported HTTP version '{0}'")]
    UnsupportedVersion(String),
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Failed to begin request: {message}")]
    BeginFailed { message: String },
    #[error("Failed to complete request body: {message}")]
    CompleteBodyFailed { message: String },

    // Exchange outcomes
    #[error("{}", describe_request_failure(.message, .h2_error_code))]
    RequestFailed { message: String, h2_error_code: u32 },
    #[error("Request cancelled: {reason}")]
    Cancelled { reason: String },

    // Local contract violations
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    // Body handling
    #[error("Request body error: {0}")]
    BodyError(String),
    #[error("Invalid UTF-8 in response body")]
    InvalidUtf8,
    #[error("JSON parse error")]
    JsonParseError,
}

fn describe_request_failure(message: &str, h2_error_code: &u32) -> String {
    if *h2_error_code == 0 {
        message.to_string()
    } else {
        format!(
            "The HTTP/2 server reset the stream. HTTP/2 error code (0x{:x}): {}",
            h2_error_code, message
        )
    }
}

pub(crate) const UNEXPECTED_NATIVE_ERROR: &str = "Unexpected error occurred.";

impl BridgeError {
    pub fn request_failed(message: impl Into<String>, h2_error_code: u32) -> Self {
        BridgeError::RequestFailed { message: message.into(), h2_error_code }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        BridgeError::Cancelled { reason: reason.into() }
    }

    pub fn setter_failed(field: &'static str, message: impl Into<String>) -> Self {
        BridgeError::SetterFailed { field, message: message.into() }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled { .. })
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, BridgeError::Disposed(_))
    }

    /// Whether the error was reported by the native engine rather than
    /// detected locally.
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            BridgeError::ContextInitFailed { .. }
                | BridgeError::SetterFailed { .. }
                | BridgeError::BeginFailed { .. }
                | BridgeError::CompleteBodyFailed { .. }
                | BridgeError::RequestFailed { .. }
        )
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            BridgeError::RuntimeInitFailed => -100,
            BridgeError::ContextInitFailed { .. } => -101,
            BridgeError::SetterFailed { .. } => -200,
            BridgeError::UnsupportedVersion(_) => -201,
            BridgeError::InvalidUrl => -202,
            BridgeError::BeginFailed { .. } => -203,
            BridgeError::CompleteBodyFailed { .. } => -204,
            BridgeError::RequestFailed { .. } => -300,
            BridgeError::Cancelled { .. } => -301,
            BridgeError::InvalidState(_) => -400,
            BridgeError::Disposed(_) => -401,
            BridgeError::BodyError(_) => -500,
            BridgeError::InvalidUtf8 => -501,
            BridgeError::JsonParseError => -502,
        }
    }
}
