//! Binding of [`NativeEngine`] to the `yaha_*` symbols exported by the
//! native engine library. Locating and loading that library is left to the
//! build (`cargo:rustc-link-lib`).

use super::buffer::{ByteBuffer, FreeByteBuffer, NativeBuffer, StringBuffer};
use super::primitives::{HttpVersion, WriteResult};
use super::{
    ContextPtr, NativeCallbacks, NativeEngine, OnComplete, OnReceive,
    OnStatusCodeAndHeadersReceive, RequestPtr, RuntimePtr,
};
use crate::http::settings::ClientSettings;
use libc::{c_void, size_t};
use std::ptr;

extern "C" {
    fn yaha_get_last_error(ctx: *const c_void, req: *const c_void) -> *mut ByteBuffer;
    fn yaha_free_byte_buffer(buf: *mut ByteBuffer);

    fn yaha_init_runtime(worker_threads: size_t) -> *mut c_void;
    fn yaha_dispose_runtime(runtime: *mut c_void);

    fn yaha_init_context(
        runtime: *mut c_void,
        on_status_code_and_headers_receive: OnStatusCodeAndHeadersReceive,
        on_receive: OnReceive,
        on_complete: OnComplete,
    ) -> *mut c_void;
    fn yaha_dispose_context(ctx: *mut c_void);

    fn yaha_client_config_skip_certificate_verification(ctx: *mut c_void, val: bool);
    fn yaha_client_config_add_root_certificates(ctx: *mut c_void, certs: *const StringBuffer) -> size_t;
    fn yaha_client_config_add_client_auth_certificates(ctx: *mut c_void, certs: *const StringBuffer) -> size_t;
    fn yaha_client_config_add_client_auth_key(ctx: *mut c_void, key: *const StringBuffer) -> size_t;
    fn yaha_client_config_pool_idle_timeout(ctx: *mut c_void, val_milliseconds: u64);
    fn yaha_client_config_pool_max_idle_per_host(ctx: *mut c_void, max_idle: size_t);
    fn yaha_client_config_http2_only(ctx: *mut c_void, val: bool);
    fn yaha_client_config_http2_initial_stream_window_size(ctx: *mut c_void, val: u32);
    fn yaha_client_config_http2_initial_connection_window_size(ctx: *mut c_void, val: u32);
    fn yaha_client_config_http2_adaptive_window(ctx: *mut c_void, val: bool);
    fn yaha_client_config_http2_max_frame_size(ctx: *mut c_void, val: u32);
    fn yaha_client_config_http2_keep_alive_interval(ctx: *mut c_void, val_milliseconds: u64);
    fn yaha_client_config_http2_keep_alive_timeout(ctx: *mut c_void, val_milliseconds: u64);
    fn yaha_client_config_http2_keep_alive_while_idle(ctx: *mut c_void, val: bool);
    fn yaha_client_config_http2_max_concurrent_reset_streams(ctx: *mut c_void, max: size_t);
    fn yaha_client_config_http2_max_send_buf_size(ctx: *mut c_void, max: size_t);
    fn yaha_build_client(ctx: *mut c_void) -> bool;

    fn yaha_request_new(ctx: *mut c_void, seq: i32) -> *mut c_void;
    fn yaha_request_set_method(ctx: *mut c_void, req: *mut c_void, value: *const StringBuffer) -> bool;
    fn yaha_request_set_uri(ctx: *mut c_void, req: *mut c_void, value: *const StringBuffer) -> bool;
    fn yaha_request_set_version(ctx: *mut c_void, req: *mut c_void, version: HttpVersion) -> bool;
    fn yaha_request_set_header(
        ctx: *mut c_void,
        req: *mut c_void,
        key: *const StringBuffer,
        value: *const StringBuffer,
    ) -> bool;
    fn yaha_request_set_has_body(ctx: *mut c_void, req: *mut c_void, has_body: bool) -> bool;
    fn yaha_request_begin(ctx: *mut c_void, req: *mut c_void) -> bool;
    fn yaha_request_write_body(ctx: *mut c_void, req: *mut c_void, buf: *const u8, len: size_t) -> i32;
    fn yaha_request_complete_body(ctx: *mut c_void, req: *mut c_void) -> bool;
    fn yaha_request_abort(ctx: *mut c_void, req: *mut c_void);
    fn yaha_request_destroy(ctx: *mut c_void, req: *mut c_void) -> bool;

    fn yaha_request_response_get_headers_count(ctx: *mut c_void, req: *mut c_void) -> i32;
    fn yaha_request_response_get_header_key(ctx: *mut c_void, req: *mut c_void, index: i32) -> *mut ByteBuffer;
    fn yaha_request_response_get_header_value(ctx: *mut c_void, req: *mut c_void, index: i32) -> *mut ByteBuffer;
    fn yaha_request_response_get_trailers_count(ctx: *mut c_void, req: *mut c_void) -> i32;
    fn yaha_request_response_get_trailers_key(ctx: *mut c_void, req: *mut c_void, index: i32) -> *mut ByteBuffer;
    fn yaha_request_response_get_trailers_value(ctx: *mut c_void, req: *mut c_void, index: i32) -> *mut ByteBuffer;
}

const FREE: FreeByteBuffer = yaha_free_byte_buffer;

fn owned(raw: *mut ByteBuffer) -> Option<NativeBuffer> {
    // SAFETY: every `yaha_*` getter hands the caller a fresh buffer.
    unsafe { NativeBuffer::from_raw(raw, FREE) }
}

fn with_pem(ctx: ContextPtr, pem: &str, f: unsafe extern "C" fn(*mut c_void, *const StringBuffer) -> size_t) -> usize {
    let Some(buf) = StringBuffer::new(pem.as_bytes()) else {
        tracing::warn!(len = pem.len(), "PEM bundle too large for the engine");
        return 0;
    };
    unsafe { f(ctx.as_ptr(), &buf) }
}

fn borrowed(field: &'static str, bytes: &[u8]) -> Option<StringBuffer> {
    let buf = StringBuffer::new(bytes);
    if buf.is_none() {
        tracing::warn!(field, len = bytes.len(), "value too large for the engine");
    }
    buf
}

/// The engine linked into this process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkedEngine;

impl NativeEngine for LinkedEngine {
    fn init_runtime(&self, worker_threads: usize) -> Option<RuntimePtr> {
        RuntimePtr::from_raw(unsafe { yaha_init_runtime(worker_threads) })
    }

    fn dispose_runtime(&self, runtime: RuntimePtr) {
        unsafe { yaha_dispose_runtime(runtime.as_ptr()) }
    }

    fn init_context(&self, runtime: RuntimePtr, callbacks: NativeCallbacks) -> Option<ContextPtr> {
        ContextPtr::from_raw(unsafe {
            yaha_init_context(
                runtime.as_ptr(),
                callbacks.on_status_code_and_headers_receive,
                callbacks.on_receive,
                callbacks.on_complete,
            )
        })
    }

    fn build_client(&self, ctx: ContextPtr, settings: &ClientSettings) -> bool {
        let raw = ctx.as_ptr();
        unsafe {
            if let Some(v) = settings.skip_certificate_verification {
                yaha_client_config_skip_certificate_verification(raw, v);
            }
            if let Some(pem) = &settings.root_certificates {
                let valid = with_pem(ctx, pem, yaha_client_config_add_root_certificates);
                tracing::debug!(valid, "root certificates added");
            }
            if let Some(pem) = &settings.client_auth_certificates {
                with_pem(ctx, pem, yaha_client_config_add_client_auth_certificates);
            }
            if let Some(pem) = &settings.client_auth_key {
                with_pem(ctx, pem, yaha_client_config_add_client_auth_key);
            }
            if let Some(v) = settings.pool_idle_timeout {
                yaha_client_config_pool_idle_timeout(raw, v.as_millis() as u64);
            }
            if let Some(v) = settings.max_idle_per_host {
                yaha_client_config_pool_max_idle_per_host(raw, v);
            }
            if let Some(v) = settings.http2_only {
                yaha_client_config_http2_only(raw, v);
            }
            if let Some(v) = settings.http2_initial_stream_window_size {
                yaha_client_config_http2_initial_stream_window_size(raw, v);
            }
            if let Some(v) = settings.http2_initial_connection_window_size {
                yaha_client_config_http2_initial_connection_window_size(raw, v);
            }
            if let Some(v) = settings.http2_adaptive_window {
                yaha_client_config_http2_adaptive_window(raw, v);
            }
            if let Some(v) = settings.http2_max_frame_size {
                yaha_client_config_http2_max_frame_size(raw, v);
            }
            if let Some(v) = settings.http2_keep_alive_interval {
                yaha_client_config_http2_keep_alive_interval(raw, v.as_millis() as u64);
            }
            if let Some(v) = settings.http2_keep_alive_timeout {
                yaha_client_config_http2_keep_alive_timeout(raw, v.as_millis() as u64);
            }
            if let Some(v) = settings.http2_keep_alive_while_idle {
                yaha_client_config_http2_keep_alive_while_idle(raw, v);
            }
            if let Some(v) = settings.http2_max_concurrent_reset_streams {
                yaha_client_config_http2_max_concurrent_reset_streams(raw, v);
            }
            if let Some(v) = settings.http2_max_send_buffer_size {
                yaha_client_config_http2_max_send_buf_size(raw, v);
            }
            yaha_build_client(raw)
        }
    }

    fn dispose_context(&self, ctx: ContextPtr) {
        unsafe { yaha_dispose_context(ctx.as_ptr()) }
    }

    fn request_new(&self, ctx: ContextPtr, sequence: i32) -> Option<RequestPtr> {
        RequestPtr::from_raw(unsafe { yaha_request_new(ctx.as_ptr(), sequence) })
    }

    fn request_set_method(&self, ctx: ContextPtr, req: RequestPtr, method: &[u8]) -> bool {
        let Some(buf) = borrowed("method", method) else {
            return false;
        };
        unsafe { yaha_request_set_method(ctx.as_ptr(), req.as_ptr(), &buf) }
    }

    fn request_set_uri(&self, ctx: ContextPtr, req: RequestPtr, uri: &[u8]) -> bool {
        let Some(buf) = borrowed("uri", uri) else {
            return false;
        };
        unsafe { yaha_request_set_uri(ctx.as_ptr(), req.as_ptr(), &buf) }
    }

    fn request_set_version(&self, ctx: ContextPtr, req: RequestPtr, version: HttpVersion) -> bool {
        unsafe { yaha_request_set_version(ctx.as_ptr(), req.as_ptr(), version) }
    }

    fn request_set_header(&self, ctx: ContextPtr, req: RequestPtr, key: &[u8], value: &[u8]) -> bool {
        let (Some(key), Some(value)) = (borrowed("header name", key), borrowed("header value", value)) else {
            return false;
        };
        unsafe { yaha_request_set_header(ctx.as_ptr(), req.as_ptr(), &key, &value) }
    }

    fn request_set_has_body(&self, ctx: ContextPtr, req: RequestPtr, has_body: bool) -> bool {
        unsafe { yaha_request_set_has_body(ctx.as_ptr(), req.as_ptr(), has_body) }
    }

    fn request_begin(&self, ctx: ContextPtr, req: RequestPtr) -> bool {
        unsafe { yaha_request_begin(ctx.as_ptr(), req.as_ptr()) }
    }

    fn request_write_body(&self, ctx: ContextPtr, req: RequestPtr, data: &[u8]) -> WriteResult {
        let raw = unsafe { yaha_request_write_body(ctx.as_ptr(), req.as_ptr(), data.as_ptr(), data.len()) };
        WriteResult::from_raw(raw)
    }

    fn request_complete_body(&self, ctx: ContextPtr, req: RequestPtr) -> bool {
        unsafe { yaha_request_complete_body(ctx.as_ptr(), req.as_ptr()) }
    }

    fn request_abort(&self, ctx: ContextPtr, req: RequestPtr) {
        unsafe { yaha_request_abort(ctx.as_ptr(), req.as_ptr()) }
    }

    fn request_destroy(&self, ctx: ContextPtr, req: RequestPtr) -> bool {
        unsafe { yaha_request_destroy(ctx.as_ptr(), req.as_ptr()) }
    }

    fn response_headers_count(&self, ctx: ContextPtr, req: RequestPtr) -> i32 {
        unsafe { yaha_request_response_get_headers_count(ctx.as_ptr(), req.as_ptr()) }
    }

    fn response_header_key(&self, ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer> {
        owned(unsafe { yaha_request_response_get_header_key(ctx.as_ptr(), req.as_ptr(), index) })
    }

    fn response_header_value(&self, ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer> {
        owned(unsafe { yaha_request_response_get_header_value(ctx.as_ptr(), req.as_ptr(), index) })
    }

    fn response_trailers_count(&self, ctx: ContextPtr, req: RequestPtr) -> i32 {
        unsafe { yaha_request_response_get_trailers_count(ctx.as_ptr(), req.as_ptr()) }
    }

    fn response_trailer_key(&self, ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer> {
        owned(unsafe { yaha_request_response_get_trailers_key(ctx.as_ptr(), req.as_ptr(), index) })
    }

    fn response_trailer_value(&self, ctx: ContextPtr, req: RequestPtr, index: i32) -> Option<NativeBuffer> {
        owned(unsafe { yaha_request_response_get_trailers_value(ctx.as_ptr(), req.as_ptr(), index) })
    }

    fn last_error(&self, ctx: Option<ContextPtr>, req: Option<RequestPtr>) -> Option<NativeBuffer> {
        let ctx = ctx.map_or(ptr::null(), |c| c.as_ptr() as *const c_void);
        let req = req.map_or(ptr::null(), |r| r.as_ptr() as *const c_void);
        owned(unsafe { yaha_get_last_error(ctx, req) })
    }
}
