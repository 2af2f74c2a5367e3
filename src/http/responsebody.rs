//! Response body streaming.
//!
//! Chunks arrive from engine callbacks in order. The body implements both
//! [`http_body::Body`] (trailers are the final frame) and
//! [`futures::Stream`] of data chunks. Cancellation is checked before any
//! buffered chunk is returned, so a cancelled exchange never yields
//! further data. Dropping the body disposes the exchange.

use crate::base::neterror::BridgeError;
use crate::base::responsestate::ResponseState;
use crate::http::exchange::ExchangeShared;
use crate::http::inbound::{BodyEvent, BodyReceiver};
use bytes::Bytes;
use futures::Stream;
use http::HeaderMap;
use http_body::{Body, Frame};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Response body wrapper for streaming.
pub struct ResponseBody {
    exchange: Arc<ExchangeShared>,
    events: BodyReceiver,
    done: bool,
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("sequence", &self.exchange.sequence())
            .field("done", &self.done)
            .finish()
    }
}

impl ResponseBody {
    pub(crate) fn new(exchange: Arc<ExchangeShared>, events: BodyReceiver) -> Self {
        Self { exchange, events, done: false }
    }

    pub fn state(&self) -> ResponseState {
        self.exchange.response_state()
    }

    /// Trailers, available once the response completed successfully.
    pub fn trailers(&self) -> Option<HeaderMap> {
        self.exchange.trailers()
    }

    /// Read entire body as bytes.
    pub async fn bytes(self) -> Result<Bytes, BridgeError> {
        use http_body_util::BodyExt;
        let collected = self.collect().await?;
        Ok(collected.to_bytes())
    }

    /// Read body as UTF-8 string.
    pub async fn text(self) -> Result<String, BridgeError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| BridgeError::InvalidUtf8)
    }

    /// Read body as JSON, deserializing to type T.
    #[cfg(feature = "json")]
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, BridgeError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|_| BridgeError::JsonParseError)
    }

    fn end(&mut self, error: Option<BridgeError>) -> Poll<Option<Result<Frame<Bytes>, BridgeError>>> {
        self.done = true;
        self.events.close();
        Poll::Ready(error.map(Err))
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = BridgeError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if let Some(err) = this.exchange.cancellation_error() {
            return this.end(Some(err));
        }

        match this.events.poll_recv(cx) {
            Poll::Ready(Some(BodyEvent::Data(data))) => Poll::Ready(Some(Ok(Frame::data(data)))),
            Poll::Ready(Some(BodyEvent::Trailers(trailers))) => {
                Poll::Ready(Some(Ok(Frame::trailers(trailers))))
            }
            Poll::Ready(Some(BodyEvent::Failed(err))) => this.end(Some(err)),
            Poll::Ready(None) => {
                // Closed without an error event: completed, or torn down.
                let error = match this.exchange.response_state() {
                    ResponseState::Completed => None,
                    _ => Some(this.exchange.terminal_error().unwrap_or(BridgeError::Disposed("exchange"))),
                };
                this.end(error)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }
}

impl Stream for ResponseBody {
    type Item = Result<Bytes, BridgeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.as_mut().poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                    Ok(data) => return Poll::Ready(Some(Ok(data))),
                    // Trailers stay reachable through `trailers()`.
                    Err(_) => continue,
                },
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        self.exchange.dispose();
    }
}
