//! Native client context.
//!
//! A context owns the engine-side client (configuration, connection
//! pool, callback table) and holds one runtime reference for its whole
//! life. Every native request retains the context; [`NativeContext::dispose`]
//! only closes it to new requests, and the engine context is torn down
//! once the last retained request has been destroyed.

use crate::base::context::last_error_message;
use crate::base::neterror::BridgeError;
use crate::dispatch::callbacks;
use crate::handle::runtime::{NativeRuntime, RuntimeHandle};
use crate::http::settings::{BridgeConfig, ClientSettings};
use crate::native::{ContextPtr, NativeEngine};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

#[derive(Debug, Default)]
struct Retention {
    requests: usize,
    closing: bool,
}

pub struct NativeContext {
    engine: Arc<dyn NativeEngine>,
    ptr: RwLock<Option<ContextPtr>>,
    retention: Mutex<Retention>,
    runtime: Mutex<Option<RuntimeHandle>>,
    config: BridgeConfig,
}

impl std::fmt::Debug for NativeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeContext")
            .field("disposed", &self.is_disposed())
            .field("requests", &self.live_requests())
            .field("config", &self.config)
            .finish()
    }
}

impl NativeContext {
    /// Acquire the runtime, create the engine context with the dispatch
    /// callbacks and build the client from `settings`.
    ///
    /// On failure everything acquired so far is released in reverse order.
    pub fn create(
        runtime: &Arc<NativeRuntime>,
        settings: &ClientSettings,
        config: BridgeConfig,
    ) -> Result<Arc<Self>, BridgeError> {
        let handle = runtime.acquire()?;
        let engine = Arc::clone(runtime.engine());

        let ptr = engine
            .init_context(handle.as_ptr()?, callbacks::native_callbacks())
            .ok_or_else(|| BridgeError::ContextInitFailed {
                message: last_error_message(engine.as_ref(), None, None),
            })?;

        for option in settings.configured_options() {
            tracing::debug!(option, "applying client option");
        }
        if !engine.build_client(ptr, settings) {
            let message = last_error_message(engine.as_ref(), Some(ptr), None);
            tracing::error!(%message, "failed to build native client");
            engine.dispose_context(ptr);
            return Err(BridgeError::ContextInitFailed { message });
        }
        tracing::info!("native context created");

        Ok(Arc::new(Self {
            engine,
            ptr: RwLock::new(Some(ptr)),
            retention: Mutex::new(Retention::default()),
            runtime: Mutex::new(Some(handle)),
            config,
        }))
    }

    pub fn engine(&self) -> &dyn NativeEngine {
        self.engine.as_ref()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// True once [`NativeContext::dispose`] has been called, even while
    /// retained requests keep the engine context alive.
    pub fn is_disposed(&self) -> bool {
        self.lock_retention().closing
    }

    /// Number of native requests currently holding the context open.
    pub fn live_requests(&self) -> usize {
        self.lock_retention().requests
    }

    /// Run `f` against the live context pointer. Teardown waits for `f`
    /// to return.
    pub(crate) fn with_ptr<R>(&self, f: impl FnOnce(ContextPtr) -> R) -> Result<R, BridgeError> {
        let guard = self.ptr.read().unwrap_or_else(PoisonError::into_inner);
        match *guard {
            Some(ptr) => Ok(f(ptr)),
            None => Err(BridgeError::Disposed("context")),
        }
    }

    /// Keep the engine context alive for one native request. Fails once the
    /// context has been disposed.
    pub(crate) fn retain_request(&self) -> Result<(), BridgeError> {
        let mut retention = self.lock_retention();
        if retention.closing {
            return Err(BridgeError::Disposed("context"));
        }
        retention.requests += 1;
        Ok(())
    }

    /// Drop one request's hold. The last release after disposal tears the
    /// engine context down.
    pub(crate) fn release_request(&self) {
        let teardown = {
            let mut retention = self.lock_retention();
            match retention.requests.checked_sub(1) {
                Some(requests) => retention.requests = requests,
                None => {
                    tracing::warn!("context request released more often than retained");
                    return;
                }
            }
            retention.closing && retention.requests == 0
        };
        if teardown {
            self.teardown();
        }
    }

    /// Close the context to new requests. The engine context and the
    /// runtime reference go away now, or after the last in-flight request
    /// is destroyed. Idempotent.
    pub fn dispose(&self) {
        let teardown = {
            let mut retention = self.lock_retention();
            if retention.closing {
                return;
            }
            retention.closing = true;
            if retention.requests > 0 {
                tracing::info!(requests = retention.requests, "native context closing, waiting for requests");
            }
            retention.requests == 0
        };
        if teardown {
            self.teardown();
        }
    }

    fn teardown(&self) {
        let ptr = self.ptr.write().unwrap_or_else(PoisonError::into_inner).take();
        let Some(ptr) = ptr else {
            return;
        };

        tracing::info!("disposing native context");
        self.engine.dispose_context(ptr);

        let handle = self.runtime.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.release();
        }
    }

    fn lock_retention(&self) -> MutexGuard<'_, Retention> {
        self.retention.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for NativeContext {
    fn drop(&mut self) {
        self.dispose();
    }
}
