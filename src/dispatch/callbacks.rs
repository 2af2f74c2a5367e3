//! `extern "C"` entry points handed to the engine.
//!
//! These run on the engine's worker threads. Each one resolves the
//! exchange by sequence number and forwards the event; a sequence that no
//! longer resolves is a late delivery for a finished or cancelled exchange
//! and is dropped. Panics never cross back into native code.

use crate::dispatch::registry;
use crate::native::primitives::CompletionReason;
use crate::native::NativeCallbacks;
use std::panic::{self, AssertUnwindSafe};

/// The callback table every context registers.
pub fn native_callbacks() -> NativeCallbacks {
    NativeCallbacks {
        on_status_code_and_headers_receive,
        on_receive,
        on_complete,
    }
}

extern "C" fn on_status_code_and_headers_receive(seq: i32, status_code: i32, version: i32) {
    guarded("on_status_code_and_headers_receive", || {
        tracing::debug!(seq, status_code, version, "response headers received");
        match registry().resolve(seq) {
            Some(exchange) => exchange.on_headers(status_code, version),
            None => tracing::debug!(seq, "headers for unknown exchange dropped"),
        }
    });
}

extern "C" fn on_receive(seq: i32, length: usize, buf: *const u8) {
    guarded("on_receive", || {
        tracing::trace!(seq, length, "response body chunk received");
        let Some(exchange) = registry().resolve(seq) else {
            tracing::debug!(seq, "body chunk for unknown exchange dropped");
            return;
        };
        let data = if buf.is_null() || length == 0 {
            &[][..]
        } else {
            // The engine keeps `buf` alive for the duration of this call.
            unsafe { std::slice::from_raw_parts(buf, length) }
        };
        exchange.on_data(data);
    });
}

extern "C" fn on_complete(seq: i32, reason: i32, h2_error_code: u32) {
    guarded("on_complete", || {
        let reason = CompletionReason::from_raw(reason);
        tracing::debug!(seq, ?reason, h2_error_code, "response completed");
        match registry().resolve(seq) {
            Some(exchange) => exchange.on_complete(reason, h2_error_code),
            None => tracing::debug!(seq, "completion for unknown exchange dropped"),
        }
    });
}

fn guarded(callback: &'static str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(callback, "panic in native callback");
    }
}
