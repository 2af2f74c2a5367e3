//! Outbound half of an exchange: the request body bridge.
//!
//! The engine never blocks a write. When its send buffer is full the write
//! is retried after [`BridgeConfig::write_retry_interval`], or sooner if the
//! body is completed or the exchange cancelled in the meantime.
//!
//! A body given as bytes or a stream is owned by the background pump; the
//! caller's [`OutboundBody`] may then only observe it. Only a
//! [`RequestBody::Writer`](crate::http::requestbody::RequestBody::Writer)
//! body is written and completed by the caller.
//!
//! [`BridgeConfig::write_retry_interval`]: crate::http::settings::BridgeConfig

use crate::base::context::NativeResultExt;
use crate::base::neterror::BridgeError;
use crate::http::exchange::ExchangeShared;
use crate::http::requestbody::BodyStream;
use crate::native::primitives::WriteResult;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::Notify;

pub(crate) struct OutboundState {
    completed: AtomicBool,
    pumped: AtomicBool,
    // Serializes native writes against the native complete call.
    io: Mutex<()>,
    wake: Notify,
}

impl OutboundState {
    pub(crate) fn new() -> Self {
        Self {
            completed: AtomicBool::new(false),
            pumped: AtomicBool::new(false),
            io: Mutex::new(()),
            wake: Notify::new(),
        }
    }

    /// Hand the body to the pump. Caller writes are refused from then on.
    pub(crate) fn set_pumped(&self) {
        self.pumped.store(true, Ordering::Release);
    }

    fn check_caller_owned(&self) -> Result<(), BridgeError> {
        if self.pumped.load(Ordering::Acquire) {
            return Err(BridgeError::InvalidState("request body is written by its stream"));
        }
        Ok(())
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Flag the body as finished and wake a pending retry. Returns whether
    /// this call set the flag.
    pub(crate) fn mark_completed(&self) -> bool {
        let first = !self.completed.swap(true, Ordering::AcqRel);
        if first {
            self.wake.notify_waiters();
        }
        first
    }
}

/// Writer for a request body.
///
/// Obtained from [`Exchange::outbound`](crate::http::exchange::Exchange::outbound).
#[derive(Clone)]
pub struct OutboundBody {
    exchange: Arc<ExchangeShared>,
}

impl OutboundBody {
    pub(crate) fn new(exchange: Arc<ExchangeShared>) -> Self {
        Self { exchange }
    }

    pub fn is_completed(&self) -> bool {
        self.exchange.outbound().is_completed()
    }

    /// Hand `data` to the engine, waiting while its send buffer is full.
    ///
    /// Fails with [`BridgeError::InvalidState`] when the body is pumped
    /// from bytes or a stream, or once it has been completed, and with the
    /// cancellation error once the exchange is cancelled.
    pub async fn write(&self, data: &[u8]) -> Result<(), BridgeError> {
        self.exchange.outbound().check_caller_owned()?;
        write_body(&self.exchange, data).await
    }

    /// Signal end of body. Only the first call reaches the engine. Refused
    /// while the pump owns the body.
    pub fn complete(&self) -> Result<(), BridgeError> {
        self.exchange.outbound().check_caller_owned()?;
        complete_body(&self.exchange)
    }
}

pub(crate) async fn write_body(exchange: &ExchangeShared, data: &[u8]) -> Result<(), BridgeError> {
    if exchange.outbound().is_completed() {
        return Err(BridgeError::InvalidState("request body already completed"));
    }
    if data.is_empty() {
        return Ok(());
    }

    let interval = exchange.config().write_retry_interval;
    let mut attempts = 0u32;
    loop {
        // Registered before the flag checks so a completion in between is
        // not missed.
        let completed = exchange.outbound().wake.notified();

        if let Some(err) = exchange.cancellation_error() {
            return Err(err);
        }
        if exchange.outbound().is_completed() {
            return Err(exchange
                .terminal_error()
                .unwrap_or(BridgeError::InvalidState("request body completed during write")));
        }

        let result = {
            let _io = exchange.outbound().io.lock().unwrap_or_else(PoisonError::into_inner);
            if exchange.outbound().is_completed() {
                continue;
            }
            exchange.with_request(|engine, ctx, req| engine.request_write_body(ctx, req, data))?
        };

        match result {
            WriteResult::Success => {
                tracing::trace!(seq = exchange.sequence(), len = data.len(), attempts, "request body chunk written");
                return Ok(());
            }
            WriteResult::AlreadyCompleted => {
                tracing::debug!(seq = exchange.sequence(), "engine reports request body already completed");
                exchange.outbound().mark_completed();
                return Err(BridgeError::InvalidState("request body already completed"));
            }
            WriteResult::Full => {
                attempts += 1;
                tracing::trace!(seq = exchange.sequence(), attempts, "send buffer full, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = completed => {}
                    _ = exchange.cancel_token().cancelled() => {}
                }
            }
        }
    }
}

pub(crate) fn complete_body(exchange: &ExchangeShared) -> Result<(), BridgeError> {
    let _io = exchange.outbound().io.lock().unwrap_or_else(PoisonError::into_inner);
    if !exchange.outbound().mark_completed() {
        return Ok(());
    }
    if exchange.response_state().is_terminal() {
        return Ok(());
    }

    tracing::debug!(seq = exchange.sequence(), "completing request body");
    exchange.with_request(|engine, ctx, req| {
        engine.request_complete_body(ctx, req).native_context(engine, ctx, Some(req), |message| {
            BridgeError::CompleteBodyFailed { message }
        })
    })?
}

/// Copy `body` into the exchange, then complete it.
///
/// Holds the exchange weakly between chunks so an abandoned exchange can
/// be torn down while its producer is idle. A producer error ends the body
/// early; the response then reflects whatever the engine makes of the
/// truncated upload.
pub(crate) async fn pump(exchange: Weak<ExchangeShared>, mut body: BodyStream) {
    let Some(finished) = exchange.upgrade().map(|e| e.finished_token()) else {
        return;
    };

    loop {
        let next = tokio::select! {
            next = body.next() => next,
            _ = finished.cancelled() => return,
        };
        let Some(exchange) = exchange.upgrade() else {
            return;
        };

        match next {
            Some(Ok(chunk)) => {
                if let Err(err) = write_body(&exchange, &chunk).await {
                    tracing::debug!(seq = exchange.sequence(), error = %err, "request body write stopped");
                    return;
                }
            }
            Some(Err(err)) => {
                tracing::warn!(seq = exchange.sequence(), error = %err, "request body producer failed");
                break;
            }
            None => break,
        }
    }

    if let Some(exchange) = exchange.upgrade() {
        if let Err(err) = complete_body(&exchange) {
            tracing::warn!(seq = exchange.sequence(), error = %err, "failed to complete request body");
            exchange.fail(err);
        }
    }
}
