//! In-process stand-in for the native engine.
//!
//! Handles are fabricated from small integer ids. Responses are driven by
//! the test through `emit_*`, which invoke the registered callbacks from a
//! separate OS thread the way engine workers do. Every native call is
//! counted so tests can assert on what crossed the boundary.

#![allow(dead_code)]

use bridgenet::native::buffer::{ByteBuffer, NativeBuffer};
use bridgenet::native::primitives::{CompletionReason, HttpVersion, WriteResult};
use bridgenet::native::{ContextPtr, NativeCallbacks, NativeEngine, RequestPtr, RuntimePtr};
use bridgenet::{BridgeConfig, Client, ClientSettings, NativeRuntime};
use libc::c_void;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

static BUFFERS_ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static BUFFERS_FREED: AtomicUsize = AtomicUsize::new(0);

/// (allocated, freed) engine buffers in this test process.
pub fn buffer_counts() -> (usize, usize) {
    (BUFFERS_ALLOCATED.load(Ordering::SeqCst), BUFFERS_FREED.load(Ordering::SeqCst))
}

unsafe extern "C" fn sim_free(raw: *mut ByteBuffer) {
    BUFFERS_FREED.fetch_add(1, Ordering::SeqCst);
    let buffer = *Box::from_raw(raw);
    buffer.destroy();
}

fn native_buffer(bytes: &[u8]) -> Option<NativeBuffer> {
    let buffer = ByteBuffer::from_vec(bytes.to_vec())?;
    BUFFERS_ALLOCATED.fetch_add(1, Ordering::SeqCst);
    let raw = Box::into_raw(Box::new(buffer));
    unsafe { NativeBuffer::from_raw(raw, sim_free) }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default)]
pub struct Counters {
    pub runtime_inits: AtomicUsize,
    pub runtime_disposes: AtomicUsize,
    pub context_inits: AtomicUsize,
    pub context_disposes: AtomicUsize,
    pub requests_created: AtomicUsize,
    pub requests_destroyed: AtomicUsize,
    pub begins: AtomicUsize,
    pub writes: AtomicUsize,
    pub full_results: AtomicUsize,
    pub complete_body_calls: AtomicUsize,
    pub aborts: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// What the engine has been told about one request.
#[derive(Debug, Clone, Default)]
pub struct SimRequest {
    pub seq: i32,
    pub ctx: usize,
    pub method: String,
    pub uri: String,
    pub version: Option<HttpVersion>,
    pub headers: Vec<(String, String)>,
    pub has_body: Option<bool>,
    pub begun: bool,
    pub body: Vec<u8>,
    pub body_completed: bool,
    pub aborted: bool,
    buffered: usize,
    response_headers: Vec<(String, String)>,
    trailers: Vec<(String, String)>,
}

#[derive(Default)]
struct SimState {
    next_id: usize,
    contexts: HashMap<usize, NativeCallbacks>,
    requests: HashMap<usize, SimRequest>,
    destroyed: HashMap<i32, SimRequest>,
    last_error: Option<String>,
    fail_setter: Option<&'static str>,
    fail_runtime_init: bool,
    fail_build_client: bool,
    send_capacity: usize,
    always_full: bool,
    settings: Vec<ClientSettings>,
    runtime_worker_threads: Vec<usize>,
    events: Vec<&'static str>,
}

pub struct SimEngine {
    state: Mutex<SimState>,
    pub counters: Counters,
}

impl SimEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SimState { next_id: 1, send_capacity: 16 * 1024, ..Default::default() }),
            counters: Counters::default(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    fn next_id(&self) -> usize {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    pub fn set_send_capacity(&self, capacity: usize) {
        self.lock().send_capacity = capacity;
    }

    pub fn set_always_full(&self, always_full: bool) {
        self.lock().always_full = always_full;
    }

    pub fn fail_setter(&self, field: &'static str) {
        self.lock().fail_setter = Some(field);
    }

    pub fn fail_runtime_init(&self, fail: bool) {
        self.lock().fail_runtime_init = fail;
    }

    pub fn fail_build_client(&self, fail: bool) {
        self.lock().fail_build_client = fail;
    }

    /// Pool sizes passed to every `init_runtime` call.
    pub fn runtime_worker_threads(&self) -> Vec<usize> {
        self.lock().runtime_worker_threads.clone()
    }

    /// Settings passed to every `build_client` call.
    pub fn built_settings(&self) -> Vec<ClientSettings> {
        self.lock().settings.clone()
    }

    /// Snapshot of a live or destroyed request.
    pub fn request(&self, seq: i32) -> Option<SimRequest> {
        let state = self.lock();
        state
            .requests
            .values()
            .find(|r| r.seq == seq)
            .cloned()
            .or_else(|| state.destroyed.get(&seq).cloned())
    }

    /// Lifecycle calls in the order the engine saw them.
    pub fn events(&self) -> Vec<&'static str> {
        self.lock().events.clone()
    }

    /// Sequence of some request the engine has begun and not destroyed.
    pub fn first_live_sequence(&self) -> Option<i32> {
        self.lock().requests.values().find(|r| r.begun).map(|r| r.seq)
    }

    pub fn live_requests(&self) -> usize {
        self.lock().requests.len()
    }

    fn callbacks_for(&self, seq: i32) -> Option<NativeCallbacks> {
        let state = self.lock();
        let req = state.requests.values().find(|r| r.seq == seq)?;
        state.contexts.get(&req.ctx).copied()
    }

    fn update(&self, seq: i32, f: impl FnOnce(&mut SimRequest)) {
        let mut state = self.lock();
        if let Some(req) = state.requests.values_mut().find(|r| r.seq == seq) {
            f(req);
        }
    }

    /// Deliver status and headers for `seq` from a worker thread.
    pub fn emit_headers(&self, seq: i32, status: i32, version: HttpVersion, headers: &[(&str, &str)]) {
        let headers = headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.update(seq, |r| r.response_headers = headers);
        if let Some(callbacks) = self.callbacks_for(seq) {
            on_worker(move || (callbacks.on_status_code_and_headers_receive)(seq, status, version as i32));
        }
    }

    pub fn emit_data(&self, seq: i32, data: &[u8]) {
        if let Some(callbacks) = self.callbacks_for(seq) {
            let data = data.to_vec();
            on_worker(move || (callbacks.on_receive)(seq, data.len(), data.as_ptr()));
        }
    }

    pub fn emit_trailers(&self, seq: i32, trailers: &[(&str, &str)]) {
        let trailers = trailers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.update(seq, |r| r.trailers = trailers);
    }

    pub fn emit_complete(&self, seq: i32, reason: CompletionReason, h2_error_code: u32) {
        if let Some(callbacks) = self.callbacks_for(seq) {
            on_worker(move || (callbacks.on_complete)(seq, reason as i32, h2_error_code));
        }
    }

    /// Complete `seq` with an error whose message is readable from the
    /// callback thread.
    pub fn emit_failure(self: &Arc<Self>, seq: i32, message: &str, h2_error_code: u32) {
        if let Some(callbacks) = self.callbacks_for(seq) {
            let engine = Arc::clone(self);
            let message = message.to_string();
            on_worker(move || {
                engine.lock().last_error = Some(message);
                (callbacks.on_complete)(seq, CompletionReason::Error as i32, h2_error_code)
            });
        }
    }

    /// Headers, one body chunk and a successful completion.
    pub fn respond(&self, seq: i32, status: i32, body: &[u8]) {
        self.emit_headers(seq, status, HttpVersion::Http11, &[("content-type", "text/plain")]);
        if !body.is_empty() {
            self.emit_data(seq, body);
        }
        self.emit_complete(seq, CompletionReason::Success, 0);
    }

    fn with_request<R>(&self, req: RequestPtr, f: impl FnOnce(&mut SimState, usize) -> R) -> R {
        let mut state = self.lock();
        let id = req.as_ptr() as usize;
        f(&mut state, id)
    }

    fn setter(&self, req: RequestPtr, field: &'static str, apply: impl FnOnce(&mut SimRequest)) -> bool {
        self.with_request(req, |state, id| {
            if state.fail_setter == Some(field) {
                state.last_error = Some(format!("simulated {} failure", field));
                return false;
            }
            match state.requests.get_mut(&id) {
                Some(r) => {
                    apply(r);
                    true
                }
                None => false,
            }
        })
    }
}

fn on_worker(f: impl FnOnce() + Send + 'static) {
    std::thread::spawn(f).join().unwrap();
}

fn ptr(id: usize) -> *mut c_void {
    id as *mut c_void
}

impl NativeEngine for SimEngine {
    fn init_runtime(&self, worker_threads: usize) -> Option<RuntimePtr> {
        if self.lock().fail_runtime_init {
            return None;
        }
        self.lock().runtime_worker_threads.push(worker_threads);
        self.counters.runtime_inits.fetch_add(1, Ordering::SeqCst);
        self.lock().events.push("init_runtime");
        RuntimePtr::from_raw(ptr(self.next_id()))
    }

    fn dispose_runtime(&self, _runtime: RuntimePtr) {
        self.counters.runtime_disposes.fetch_add(1, Ordering::SeqCst);
        self.lock().events.push("dispose_runtime");
    }

    fn init_context(&self, _runtime: RuntimePtr, callbacks: NativeCallbacks) -> Option<ContextPtr> {
        self.counters.context_inits.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id();
        let mut state = self.lock();
        state.contexts.insert(id, callbacks);
        state.events.push("init_context");
        ContextPtr::from_raw(ptr(id))
    }

    fn build_client(&self, _ctx: ContextPtr, settings: &ClientSettings) -> bool {
        let mut state = self.lock();
        if state.fail_build_client {
            state.last_error = Some("simulated build failure".to_string());
            return false;
        }
        state.settings.push(settings.clone());
        true
    }

    fn dispose_context(&self, ctx: ContextPtr) {
        self.counters.context_disposes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        state.contexts.remove(&(ctx.as_ptr() as usize));
        state.events.push("dispose_context");
    }

    fn request_new(&self, ctx: ContextPtr, sequence: i32) -> Option<RequestPtr> {
        self.counters.requests_created.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id();
        let request = SimRequest { seq: sequence, ctx: ctx.as_ptr() as usize, ..Default::default() };
        self.lock().requests.insert(id, request);
        RequestPtr::from_raw(ptr(id))
    }

    fn request_set_method(&self, _ctx: ContextPtr, req: RequestPtr, method: &[u8]) -> bool {
        let method = String::from_utf8_lossy(method).into_owned();
        self.setter(req, "method", |r| r.method = method)
    }

    fn request_set_uri(&self, _ctx: ContextPtr, req: RequestPtr, uri: &[u8]) -> bool {
        let uri = String::from_utf8_lossy(uri).into_owned();
        self.setter(req, "uri", |r| r.uri = uri)
    }

    fn request_set_version(&self, _ctx: ContextPtr, req: RequestPtr, version: HttpVersion) -> bool {
        self.setter(req, "version", |r| r.version = Some(version))
    }

    fn request_set_header(&self, _ctx: ContextPtr, req: RequestPtr, key: &[u8], value: &[u8]) -> bool {
        let key = String::from_utf8_lossy(key).into_owned();
        let value = String::from_utf8_lossy(value).into_owned();
        self.setter(req, "header", |r| r.headers.push((key, value)))
    }

    fn request_set_has_body(&self, _ctx: ContextPtr, req: RequestPtr, has_body: bool) -> bool {
        self.setter(req, "has_body", |r| r.has_body = Some(has_body))
    }

    fn request_begin(&self, _ctx: ContextPtr, req: RequestPtr) -> bool {
        self.counters.begins.fetch_add(1, Ordering::SeqCst);
        self.setter(req, "begin", |r| r.begun = true)
    }

    fn request_write_body(&self, _ctx: ContextPtr, req: RequestPtr, data: &[u8]) -> WriteResult {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        let full = &self.counters.full_results;
        self.with_request(req, |state, id| {
            let capacity = state.send_capacity;
            let always_full = state.always_full;
            let Some(r) = state.requests.get_mut(&id) else {
                return WriteResult::AlreadyCompleted;
            };
            if r.body_completed {
                return WriteResult::AlreadyCompleted;
            }
            if always_full || (r.buffered > 0 && r.buffered + data.len() > capacity) {
                full.fetch_add(1, Ordering::SeqCst);
                // The peer drains the buffer while the writer waits.
                r.buffered = 0;
                return WriteResult::Full;
            }
            r.buffered += data.len();
            r.body.extend_from_slice(data);
            WriteResult::Success
        })
    }

    fn request_complete_body(&self, _ctx: ContextPtr, req: RequestPtr) -> bool {
        self.counters.complete_body_calls.fetch_add(1, Ordering::SeqCst);
        self.setter(req, "complete_body", |r| r.body_completed = true)
    }

    fn request_abort(&self, _ctx: ContextPtr, req: RequestPtr) {
        self.counters.aborts.fetch_add(1, Ordering::SeqCst);
        self.setter(req, "abort", |r| r.aborted = true);
    }

    fn request_destroy(&self, _ctx: ContextPtr, req: RequestPtr) -> bool {
        self.counters.requests_destroyed.fetch_add(1, Ordering::SeqCst);
        self.with_request(req, |state, id| {
            state.events.push("destroy_request");
            match state.requests.remove(&id) {
                Some(r) => {
                    state.destroyed.insert(r.seq, r);
                    true
                }
                None => false,
            }
        })
    }

    fn response_headers_count(&self, _ctx: ContextPtr, req: RequestPtr) -> i32 {
        self.with_request(req, |state, id| {
            state.requests.get(&id).map_or(0, |r| r.response_headers.len() as i32)
        })
    }

    fn response_header_key(&self, _ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer> {
        let key = self.with_request(req, |state, id| {
            state.requests.get(&id)?.response_headers.get(index as usize).map(|(k, _)| k.clone())
        })?;
        native_buffer(key.as_bytes())
    }

    fn response_header_value(&self, _ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer> {
        let value = self.with_request(req, |state, id| {
            state.requests.get(&id)?.response_headers.get(index as usize).map(|(_, v)| v.clone())
        })?;
        native_buffer(value.as_bytes())
    }

    fn response_trailers_count(&self, _ctx: ContextPtr, req: RequestPtr) -> i32 {
        self.with_request(req, |state, id| state.requests.get(&id).map_or(0, |r| r.trailers.len() as i32))
    }

    fn response_trailer_key(&self, _ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer> {
        let key = self.with_request(req, |state, id| {
            state.requests.get(&id)?.trailers.get(index as usize).map(|(k, _)| k.clone())
        })?;
        native_buffer(key.as_bytes())
    }

    fn response_trailer_value(&self, _ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer> {
        let value = self.with_request(req, |state, id| {
            state.requests.get(&id)?.trailers.get(index as usize).map(|(_, v)| v.clone())
        })?;
        native_buffer(value.as_bytes())
    }

    fn last_error(&self, _ctx: Option<ContextPtr>, _req: Option<RequestPtr>) -> Option<NativeBuffer> {
        let message = self.lock().last_error.take()?;
        native_buffer(message.as_bytes())
    }
}

/// A runtime bound to `engine` with two simulated workers.
pub fn runtime(engine: &Arc<SimEngine>) -> Arc<NativeRuntime> {
    NativeRuntime::new(Arc::clone(engine) as Arc<dyn NativeEngine>, 2)
}

pub fn client(engine: &Arc<SimEngine>) -> Client {
    client_with(engine, BridgeConfig::default())
}

pub fn client_with(engine: &Arc<SimEngine>, config: BridgeConfig) -> Client {
    init_tracing();
    Client::builder().runtime(runtime(engine)).config(config).build().unwrap()
}

/// Poll `condition` until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}

/// Fail the test if `fut` does not finish within `limit`.
pub async fn within<F: Future>(limit: Duration, fut: F) -> F::Output {
    tokio::time::timeout(limit, fut).await.expect("timed out")
}
