//! Translation of native status results into [`BridgeError`].
//!
//! A native entry point reporting `false` leaves its reason in the
//! engine's last-error slot. These helpers fetch that text (freeing the
//! native buffer) and wrap it exactly once.

use crate::base::neterror::{BridgeError, UNEXPECTED_NATIVE_ERROR};
use crate::native::{ContextPtr, NativeEngine, RequestPtr};

/// Fetch and release the engine's last error message.
pub fn last_error_message(
    engine: &dyn NativeEngine,
    ctx: Option<ContextPtr>,
    req: Option<RequestPtr>,
) -> String {
    match engine.last_error(ctx, req) {
        Some(buf) => buf.to_string_lossy(),
        None => UNEXPECTED_NATIVE_ERROR.to_string(),
    }
}

/// Extension trait for native `bool` status results.
pub trait NativeResultExt {
    /// Fail with [`BridgeError::SetterFailed`] naming the request field.
    fn setter_context(
        self,
        engine: &dyn NativeEngine,
        ctx: ContextPtr,
        req: RequestPtr,
        field: &'static str,
    ) -> Result<(), BridgeError>;

    /// Fail with the error built by `wrap` from the native message.
    fn native_context<F>(
        self,
        engine: &dyn NativeEngine,
        ctx: ContextPtr,
        req: Option<RequestPtr>,
        wrap: F,
    ) -> Result<(), BridgeError>
    where
        F: FnOnce(String) -> BridgeError;
}

impl NativeResultExt for bool {
    fn setter_context(
        self,
        engine: &dyn NativeEngine,
        ctx: ContextPtr,
        req: RequestPtr,
        field: &'static str,
    ) -> Result<(), BridgeError> {
        self.native_context(engine, ctx, Some(req), |message| {
            BridgeError::setter_failed(field, message)
        })
    }

    fn native_context<F>(
        self,
        engine: &dyn NativeEngine,
        ctx: ContextPtr,
        req: Option<RequestPtr>,
        wrap: F,
    ) -> Result<(), BridgeError>
    where
        F: FnOnce(String) -> BridgeError,
    {
        if self {
            Ok(())
        } else {
            Err(wrap(last_error_message(engine, Some(ctx), req)))
        }
    }
}
