//! Inbound half of an exchange: response state and delivery.
//!
//! Engine callbacks feed events in; the head is delivered once through a
//! oneshot and body chunks through an unbounded channel. All transitions
//! happen under one lock, so a terminal state is entered at most once and
//! nothing is delivered after it.

use crate::base::neterror::BridgeError;
use crate::base::responsestate::ResponseState;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

/// What the body consumer receives.
#[derive(Debug)]
pub(crate) enum BodyEvent {
    Data(Bytes),
    Trailers(HeaderMap),
    Failed(BridgeError),
}

pub(crate) type HeadReceiver = oneshot::Receiver<Result<ResponseHead, BridgeError>>;
pub(crate) type BodyReceiver = mpsc::UnboundedReceiver<BodyEvent>;

struct Inner {
    state: ResponseState,
    head_tx: Option<oneshot::Sender<Result<ResponseHead, BridgeError>>>,
    body_tx: Option<mpsc::UnboundedSender<BodyEvent>>,
    trailers: Option<HeaderMap>,
    error: Option<BridgeError>,
}

pub(crate) struct ResponseShared {
    inner: Mutex<Inner>,
}

impl ResponseShared {
    pub(crate) fn new() -> (Self, HeadReceiver, BodyReceiver) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::unbounded_channel();
        let shared = Self {
            inner: Mutex::new(Inner {
                state: ResponseState::Created,
                head_tx: Some(head_tx),
                body_tx: Some(body_tx),
                trailers: None,
                error: None,
            }),
        };
        (shared, head_rx, body_rx)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ResponseState {
        self.lock().state
    }

    /// The error the response ended with, if it failed or was cancelled.
    pub(crate) fn error(&self) -> Option<BridgeError> {
        self.lock().error.clone()
    }

    /// The cancellation error, once cancelled.
    pub(crate) fn cancellation(&self) -> Option<BridgeError> {
        let inner = self.lock();
        match inner.state {
            ResponseState::Cancelled => inner.error.clone(),
            _ => None,
        }
    }

    pub(crate) fn trailers(&self) -> Option<HeaderMap> {
        self.lock().trailers.clone()
    }

    /// The request was handed to the engine.
    pub(crate) fn begin(&self) -> bool {
        let mut inner = self.lock();
        if !inner.state.can_transition_to(ResponseState::HeadersPending) {
            return false;
        }
        inner.state = ResponseState::HeadersPending;
        true
    }

    pub(crate) fn headers_received(&self, head: ResponseHead) -> bool {
        let mut inner = self.lock();
        if !inner.state.can_transition_to(ResponseState::HeadersReceived) {
            tracing::debug!(state = ?inner.state, "ignoring response headers");
            return false;
        }
        inner.state = ResponseState::HeadersReceived;
        if let Some(tx) = inner.head_tx.take() {
            // The awaiter may have gone away; the body still drains.
            let _ = tx.send(Ok(head));
        }
        true
    }

    pub(crate) fn data_received(&self, data: Bytes) -> bool {
        let mut inner = self.lock();
        match inner.state {
            ResponseState::HeadersReceived => inner.state = ResponseState::BodyStreaming,
            ResponseState::BodyStreaming => {}
            state => {
                tracing::debug!(?state, len = data.len(), "ignoring response body chunk");
                return false;
            }
        }
        if let Some(tx) = &inner.body_tx {
            let _ = tx.send(BodyEvent::Data(data));
        }
        true
    }

    /// Successful end of the response. Closes the body stream after
    /// handing over any trailers.
    pub(crate) fn complete(&self, trailers: HeaderMap) -> bool {
        let mut inner = self.lock();
        if !inner.state.can_transition_to(ResponseState::Completed) {
            return false;
        }
        inner.state = ResponseState::Completed;
        if let Some(tx) = inner.body_tx.take() {
            if !trailers.is_empty() {
                let _ = tx.send(BodyEvent::Trailers(trailers.clone()));
            }
        }
        inner.trailers = Some(trailers);
        inner.head_tx = None;
        true
    }

    pub(crate) fn fail(&self, error: BridgeError) -> bool {
        self.finish_with(ResponseState::Failed, error)
    }

    pub(crate) fn cancel(&self, error: BridgeError) -> bool {
        self.finish_with(ResponseState::Cancelled, error)
    }

    fn finish_with(&self, state: ResponseState, error: BridgeError) -> bool {
        let mut inner = self.lock();
        if !inner.state.can_transition_to(state) {
            return false;
        }
        inner.state = state;
        if let Some(tx) = inner.head_tx.take() {
            let _ = tx.send(Err(error.clone()));
        }
        if let Some(tx) = inner.body_tx.take() {
            let _ = tx.send(BodyEvent::Failed(error.clone()));
        }
        inner.error = Some(error);
        true
    }
}
