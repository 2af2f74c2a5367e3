//! Response head plus the streaming body of one exchange.

use crate::base::neterror::BridgeError;
use crate::http::inbound::ResponseHead;
use crate::http::ResponseBody;
use http::{HeaderMap, StatusCode, Version};

/// A response whose head has arrived from the engine.
///
/// Owns the body, and through it the exchange's native request handle.
/// Dropping the response without reading the body aborts the exchange.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Option<ResponseBody>,
}

impl HttpResponse {
    pub(crate) fn new(head: ResponseHead, body: ResponseBody) -> Self {
        Self { status: head.status, version: head.version, headers: head.headers, body: Some(body) }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Version negotiated by the engine.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Detach the body for streaming. `None` once taken.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    /// Read the rest of the body into memory.
    pub async fn bytes(mut self) -> Result<bytes::Bytes, BridgeError> {
        self.body.take().ok_or(BridgeError::InvalidState("body already taken"))?.bytes().await
    }

    /// Read the body as UTF-8.
    pub async fn text(mut self) -> Result<String, BridgeError> {
        self.body.take().ok_or(BridgeError::InvalidState("body already taken"))?.text().await
    }

    #[cfg(feature = "json")]
    pub async fn json<T: serde::de::DeserializeOwned>(mut self) -> Result<T, BridgeError> {
        self.body.take().ok_or(BridgeError::InvalidState("body already taken"))?.json().await
    }
}
