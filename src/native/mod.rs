//! The native engine's ABI surface.
//!
//! The engine owns connections, TLS and HTTP framing. This crate only
//! consumes it: opaque handles go in, callbacks come out on the engine's
//! worker threads. [`NativeEngine`] is the seam; [`linked::LinkedEngine`]
//! binds it to the real `yaha_*` symbols.

pub mod buffer;
#[cfg(feature = "link-native")]
pub mod linked;
pub mod primitives;

use crate::http::settings::ClientSettings;
use buffer::NativeBuffer;
use libc::c_void;
use primitives::WriteResult;
use std::ptr::NonNull;

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NonNull<c_void>);

        // Handles are opaque addresses; the engine serializes access to
        // what they point at.
        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}

        impl $name {
            /// Wrap a pointer returned by the engine. Null yields `None`.
            pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
                NonNull::new(ptr).map(Self)
            }

            pub fn as_ptr(self) -> *mut c_void {
                self.0.as_ptr()
            }
        }
    };
}

native_handle!(
    /// Process-wide engine runtime (worker thread pool).
    RuntimePtr
);
native_handle!(
    /// Per-client context: configuration, connection pool, callbacks.
    ContextPtr
);
native_handle!(
    /// One in-flight request/response exchange.
    RequestPtr
);

/// Status line and headers are ready: `(sequence, status_code, version)`.
pub type OnStatusCodeAndHeadersReceive = extern "C" fn(i32, i32, i32);
/// A response body chunk: `(sequence, length, bytes)`. The bytes are only
/// valid for the duration of the call.
pub type OnReceive = extern "C" fn(i32, usize, *const u8);
/// The exchange finished: `(sequence, completion_reason, h2_error_code)`.
pub type OnComplete = extern "C" fn(i32, i32, u32);

/// Callback table registered with a context.
#[derive(Debug, Clone, Copy)]
pub struct NativeCallbacks {
    pub on_status_code_and_headers_receive: OnStatusCodeAndHeadersReceive,
    pub on_receive: OnReceive,
    pub on_complete: OnComplete,
}

/// Entry points of the native HTTP engine.
///
/// Methods returning `bool` report failure with `false`; the reason is
/// then available from [`NativeEngine::last_error`]. Buffers returned by
/// getters are owned by the caller.
pub trait NativeEngine: Send + Sync + 'static {
    fn init_runtime(&self, worker_threads: usize) -> Option<RuntimePtr>;
    fn dispose_runtime(&self, runtime: RuntimePtr);

    fn init_context(&self, runtime: RuntimePtr, callbacks: NativeCallbacks) -> Option<ContextPtr>;
    /// Apply configuration and build the underlying client.
    fn build_client(&self, ctx: ContextPtr, settings: &ClientSettings) -> bool;
    fn dispose_context(&self, ctx: ContextPtr);

    fn request_new(&self, ctx: ContextPtr, sequence: i32) -> Option<RequestPtr>;
    fn request_set_method(&self, ctx: ContextPtr, req: RequestPtr, method: &[u8]) -> bool;
    fn request_set_uri(&self, ctx: ContextPtr, req: RequestPtr, uri: &[u8]) -> bool;
    fn request_set_version(&self, ctx: ContextPtr, req: RequestPtr, version: primitives::HttpVersion) -> bool;
    fn request_set_header(&self, ctx: ContextPtr, req: RequestPtr, key: &[u8], value: &[u8]) -> bool;
    fn request_set_has_body(&self, ctx: ContextPtr, req: RequestPtr, has_body: bool) -> bool;
    fn request_begin(&self, ctx: ContextPtr, req: RequestPtr) -> bool;
    fn request_write_body(&self, ctx: ContextPtr, req: RequestPtr, data: &[u8]) -> WriteResult;
    fn request_complete_body(&self, ctx: ContextPtr, req: RequestPtr) -> bool;
    /// Ask the engine to abort the exchange. Best-effort; no acknowledgement.
    fn request_abort(&self, ctx: ContextPtr, req: RequestPtr);
    fn request_destroy(&self, ctx: ContextPtr, req: RequestPtr) -> bool;

    fn response_headers_count(&self, ctx: ContextPtr, req: RequestPtr) -> i32;
    fn response_header_key(&self, ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer>;
    fn response_header_value(&self, ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer>;
    fn response_trailers_count(&self, ctx: ContextPtr, req: RequestPtr) -> i32;
    fn response_trailer_key(&self, ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer>;
    fn response_trailer_value(&self, ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer>;

    /// The most recent error recorded by the engine on this thread, if any.
    fn last_error(&self, ctx: Option<ContextPtr>, req: Option<RequestPtr>) -> Option<NativeBuffer>;
}
