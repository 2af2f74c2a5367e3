//! One request/response exchange with the engine.
//!
//! [`ExchangeShared`] owns the native request handle and both body
//! bridges. It is reachable from engine callbacks through the dispatch
//! registry (weakly), from the caller through [`Exchange`], the response
//! body and the outbound writer.
//!
//! Teardown order is fixed: the outbound side is marked complete, the
//! registry entry removed, then the native request destroyed while the
//! context is still alive. Each exchange retains its context, so an
//! explicit context dispose defers the engine teardown (and the runtime
//! release) until every request has been destroyed.

use crate::base::context::{last_error_message, NativeResultExt};
use crate::base::neterror::BridgeError;
use crate::base::responsestate::ResponseState;
use crate::dispatch::registry;
use crate::handle::context::NativeContext;
use crate::http::inbound::{BodyReceiver, HeadReceiver, ResponseHead, ResponseShared};
use crate::http::outbound::{self, OutboundBody, OutboundState};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::responsebody::ResponseBody;
use crate::http::settings::BridgeConfig;
use crate::native::primitives::{CompletionReason, HttpVersion};
use crate::native::{ContextPtr, NativeEngine, RequestPtr};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Version};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

const CANCELLED_BY_CALLER: &str = "request cancelled";
const ABORTED_BY_ENGINE: &str = "request aborted by native engine";
const DISPOSED: &str = "exchange disposed";

#[derive(Clone, Copy)]
enum HeaderSection {
    Headers,
    Trailers,
}

pub struct ExchangeShared {
    sequence: i32,
    context: Arc<NativeContext>,
    request: RwLock<Option<RequestPtr>>,
    outbound: OutboundState,
    response: ResponseShared,
    cancel: CancellationToken,
    finished: CancellationToken,
    disposed: AtomicBool,
}

impl std::fmt::Debug for ExchangeShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeShared")
            .field("sequence", &self.sequence)
            .field("state", &self.response.state())
            .finish()
    }
}

impl ExchangeShared {
    pub fn sequence(&self) -> i32 {
        self.sequence
    }

    pub(crate) fn config(&self) -> &BridgeConfig {
        self.context.config()
    }

    pub(crate) fn outbound(&self) -> &OutboundState {
        &self.outbound
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn finished_token(&self) -> CancellationToken {
        self.finished.clone()
    }

    pub fn response_state(&self) -> ResponseState {
        self.response.state()
    }

    pub(crate) fn terminal_error(&self) -> Option<BridgeError> {
        self.response.error()
    }

    pub(crate) fn trailers(&self) -> Option<HeaderMap> {
        self.response.trailers()
    }

    /// The cancellation error if the exchange is cancelled. A fired token
    /// whose watcher has not run yet is applied here.
    pub(crate) fn cancellation_error(&self) -> Option<BridgeError> {
        if self.cancel.is_cancelled() {
            self.abort(CANCELLED_BY_CALLER);
        }
        self.response.cancellation()
    }

    /// Run `f` against the live context and request pointers.
    pub(crate) fn with_request<R>(
        &self,
        f: impl FnOnce(&dyn NativeEngine, ContextPtr, RequestPtr) -> R,
    ) -> Result<R, BridgeError> {
        let engine = self.context.engine();
        self.context.with_ptr(|ctx| {
            let guard = self.request.read().unwrap_or_else(PoisonError::into_inner);
            match *guard {
                Some(req) => Ok(f(engine, ctx, req)),
                None => Err(BridgeError::Disposed("request")),
            }
        })?
    }

    pub(crate) fn on_headers(&self, status_code: i32, version: i32) {
        let status = match u16::try_from(status_code).ok().and_then(|s| StatusCode::from_u16(s).ok()) {
            Some(status) => status,
            None => {
                tracing::warn!(seq = self.sequence, status_code, "invalid status code from engine");
                if self.fail(BridgeError::request_failed(format!("invalid status code {}", status_code), 0)) {
                    self.native_abort();
                }
                return;
            }
        };
        let version = match HttpVersion::from_raw(version) {
            Some(version) => version.to_http(),
            None => {
                tracing::warn!(seq = self.sequence, version, "unknown response version");
                Version::default()
            }
        };
        let headers = self.read_header_section(HeaderSection::Headers);
        self.response.headers_received(ResponseHead { status, version, headers });
    }

    pub(crate) fn on_data(&self, data: &[u8]) {
        self.response.data_received(Bytes::copy_from_slice(data));
    }

    pub(crate) fn on_complete(&self, reason: CompletionReason, h2_error_code: u32) {
        let changed = match reason {
            CompletionReason::Success => {
                let trailers = self.read_header_section(HeaderSection::Trailers);
                let completed = self.response.complete(trailers);
                if !completed && !self.response.state().is_terminal() {
                    // Success before any headers: the engine broke ordering.
                    self.response.fail(BridgeError::request_failed(
                        "response completed before headers were received",
                        h2_error_code,
                    ))
                } else {
                    completed
                }
            }
            CompletionReason::Error => {
                // The engine's last error is per worker thread; read it here.
                let message = self
                    .with_request(|engine, ctx, req| last_error_message(engine, Some(ctx), Some(req)))
                    .unwrap_or_else(|err| err.to_string());
                tracing::debug!(seq = self.sequence, %message, h2_error_code, "request failed");
                self.response.fail(BridgeError::request_failed(message, h2_error_code))
            }
            CompletionReason::Aborted => self.response.cancel(BridgeError::cancelled(ABORTED_BY_ENGINE)),
        };
        if changed {
            tracing::debug!(seq = self.sequence, state = ?self.response.state(), "exchange finished");
        }
        self.finish();
    }

    /// Enter [`ResponseState::Failed`] locally.
    pub(crate) fn fail(&self, error: BridgeError) -> bool {
        let changed = self.response.fail(error);
        if changed {
            self.finish();
        }
        changed
    }

    /// Enter [`ResponseState::Cancelled`] and ask the engine to stop.
    /// Returns whether this call performed the transition.
    pub(crate) fn abort(&self, reason: &str) -> bool {
        if !self.response.cancel(BridgeError::cancelled(reason)) {
            return false;
        }
        tracing::debug!(seq = self.sequence, reason, "exchange cancelled");
        self.finish();
        self.native_abort();
        true
    }

    fn native_abort(&self) {
        if let Err(err) = self.with_request(|engine, ctx, req| engine.request_abort(ctx, req)) {
            tracing::debug!(seq = self.sequence, error = %err, "native abort skipped");
        }
    }

    fn finish(&self) {
        registry().remove(self.sequence);
        self.outbound.mark_completed();
        self.finished.cancel();
    }

    fn read_header_section(&self, section: HeaderSection) -> HeaderMap {
        let read = self.with_request(|engine, ctx, req| {
            let count = match section {
                HeaderSection::Headers => engine.response_headers_count(ctx, req),
                HeaderSection::Trailers => engine.response_trailers_count(ctx, req),
            };
            let mut map = HeaderMap::with_capacity(usize::try_from(count).unwrap_or(0));
            for index in 0..count {
                let (key, value) = match section {
                    HeaderSection::Headers => (
                        engine.response_header_key(ctx, req, index),
                        engine.response_header_value(ctx, req, index),
                    ),
                    HeaderSection::Trailers => (
                        engine.response_trailer_key(ctx, req, index),
                        engine.response_trailer_value(ctx, req, index),
                    ),
                };
                let (Some(key), Some(value)) = (key, value) else {
                    tracing::warn!(seq = self.sequence, index, "missing header entry");
                    continue;
                };
                match (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_bytes(value.as_bytes()),
                ) {
                    (Ok(name), Ok(value)) => {
                        map.append(name, value);
                    }
                    _ => tracing::warn!(
                        seq = self.sequence,
                        name = %key.to_string_lossy(),
                        "skipping invalid header"
                    ),
                }
            }
            map
        });
        read.unwrap_or_else(|err| {
            tracing::debug!(seq = self.sequence, error = %err, "response headers unavailable");
            HeaderMap::new()
        })
    }

    /// Release the native request. Idempotent; also runs on drop.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.outbound.mark_completed();
        match self.response.state() {
            state if state.is_terminal() => {}
            // Never handed to the engine; nothing to abort.
            ResponseState::Created => {
                self.response.cancel(BridgeError::cancelled(DISPOSED));
            }
            _ => {
                self.abort(DISPOSED);
            }
        }
        registry().remove(self.sequence);
        self.finished.cancel();

        let engine = self.context.engine();
        let destroyed = self.context.with_ptr(|ctx| {
            let req = self.request.write().unwrap_or_else(PoisonError::into_inner).take();
            req.map(|req| engine.request_destroy(ctx, req))
        });
        match destroyed {
            Ok(Some(true)) => tracing::debug!(seq = self.sequence, "native request destroyed"),
            Ok(Some(false)) => tracing::warn!(seq = self.sequence, "native request destroy failed"),
            Ok(None) | Err(_) => {}
        }
        // The context may tear down here if it was disposed meanwhile.
        self.context.release_request();
    }
}

impl Drop for ExchangeShared {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Caller-side handle for an exchange in flight.
///
/// Await [`Exchange::response`] for the head; the body and the exchange's
/// native resources then belong to the returned [`HttpResponse`].
#[derive(Debug)]
pub struct Exchange {
    shared: Arc<ExchangeShared>,
    head: Option<HeadReceiver>,
    body: Option<BodyReceiver>,
}

impl Exchange {
    /// Create the native request, apply `request` to it, register for
    /// callbacks and begin. The body, if any, is pumped in the background
    /// once the engine has begun.
    pub(crate) fn send(
        context: &Arc<NativeContext>,
        request: HttpRequest,
        cancel: CancellationToken,
    ) -> Result<Exchange, BridgeError> {
        if cancel.is_cancelled() {
            return Err(BridgeError::cancelled(CANCELLED_BY_CALLER));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| BridgeError::InvalidState("sending requires a Tokio runtime"))?;
        let version = HttpVersion::for_request(request.version())
            .ok_or_else(|| BridgeError::UnsupportedVersion(format!("{:?}", request.version())))?;

        let sequence = registry().next_sequence();
        let engine = context.engine();
        context.retain_request()?;
        let req = context
            .with_ptr(|ctx| {
                engine.request_new(ctx, sequence).ok_or_else(|| BridgeError::BeginFailed {
                    message: last_error_message(engine, Some(ctx), None),
                })
            })
            .and_then(|req| req)
            .map_err(|err| {
                context.release_request();
                err
            })?;

        let (response, head, body) = ResponseShared::new();
        let shared = Arc::new(ExchangeShared {
            sequence,
            context: Arc::clone(context),
            request: RwLock::new(Some(req)),
            outbound: OutboundState::new(),
            response,
            cancel,
            finished: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        });
        // From here on, failures drop `shared`, which destroys the request
        // and releases its hold on the context.

        let has_body = !request.body().is_empty();
        shared.with_request(|engine, ctx, req| -> Result<(), BridgeError> {
            for (name, value) in request.joined_headers() {
                engine
                    .request_set_header(ctx, req, name.as_bytes(), &value)
                    .setter_context(engine, ctx, req, "header")?;
            }
            engine
                .request_set_method(ctx, req, request.method().as_str().as_bytes())
                .setter_context(engine, ctx, req, "method")?;
            engine
                .request_set_uri(ctx, req, request.url().as_str().as_bytes())
                .setter_context(engine, ctx, req, "uri")?;
            engine.request_set_version(ctx, req, version).setter_context(engine, ctx, req, "version")?;
            engine.request_set_has_body(ctx, req, has_body).setter_context(engine, ctx, req, "has_body")
        })??;

        registry().register(sequence, &shared)?;
        shared.with_request(|engine, ctx, req| {
            engine
                .request_begin(ctx, req)
                .native_context(engine, ctx, Some(req), |message| BridgeError::BeginFailed { message })
        })??;
        // Headers may already have arrived on a worker thread.
        shared.response.begin();
        tracing::info!(seq = sequence, method = %request.method(), url = %request.url(), "request started");

        shared.spawn_cancellation_watcher(&runtime);
        if !has_body {
            outbound::complete_body(&shared)?;
        } else if let Some(stream) = request.into_body().into_stream() {
            shared.outbound.set_pumped();
            runtime.spawn(outbound::pump(Arc::downgrade(&shared), stream));
        }

        Ok(Exchange { shared, head: Some(head), body: Some(body) })
    }

    pub fn sequence(&self) -> i32 {
        self.shared.sequence
    }

    pub fn state(&self) -> ResponseState {
        self.shared.response_state()
    }

    /// The request body side. Writable only for a
    /// [`RequestBody::Writer`](crate::http::requestbody::RequestBody::Writer)
    /// body; otherwise the background pump owns it.
    pub fn outbound(&self) -> OutboundBody {
        OutboundBody::new(Arc::clone(&self.shared))
    }

    /// Cancel the exchange. The state is `Cancelled` when this returns;
    /// the engine is asked to abort on a best-effort basis.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
        self.shared.abort(CANCELLED_BY_CALLER);
    }

    /// Wait for the status line and headers.
    pub async fn response(mut self) -> Result<HttpResponse, BridgeError> {
        let head = self.head.take().ok_or(BridgeError::InvalidState("response already taken"))?;
        let body = self.body.take().ok_or(BridgeError::InvalidState("response already taken"))?;

        let head = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => {
                self.shared.abort(CANCELLED_BY_CALLER);
                return Err(self
                    .shared
                    .terminal_error()
                    .unwrap_or_else(|| BridgeError::cancelled(CANCELLED_BY_CALLER)));
            }
            head = head => head.map_err(|_| BridgeError::Disposed("exchange"))??,
        };

        Ok(HttpResponse::new(head, ResponseBody::new(Arc::clone(&self.shared), body)))
    }

    /// Tear the exchange down now instead of when the last handle drops.
    pub fn dispose(&self) {
        self.shared.dispose();
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        // Abandoned before the response was taken; a body pump stuck on a
        // full send buffer would otherwise keep it alive.
        if self.body.is_some() {
            self.shared.dispose();
        }
    }
}

impl ExchangeShared {
    fn spawn_cancellation_watcher(self: &Arc<Self>, runtime: &tokio::runtime::Handle) {
        let weak = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        let finished = self.finished.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Some(exchange) = weak.upgrade() {
                        exchange.abort(CANCELLED_BY_CALLER);
                    }
                }
                _ = finished.cancelled() => {}
            }
        });
    }
}
