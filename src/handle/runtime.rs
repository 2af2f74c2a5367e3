//! Reference-counted native runtime.
//!
//! The engine's worker pool is created when the first holder acquires it
//! and torn down when the last holder releases it. Each successful
//! [`NativeRuntime::acquire`] yields a [`RuntimeHandle`] that releases its
//! reference exactly once, either explicitly or on drop.
//!
//! The worker pool size belongs to the runtime, not to the contexts
//! sharing it: it is fixed by [`NativeRuntime::new`] and passed to the
//! engine on every initialization.

use crate::base::neterror::BridgeError;
use crate::native::{NativeEngine, RuntimePtr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct RuntimeSlot {
    refs: usize,
    ptr: Option<RuntimePtr>,
}

/// Owner of the engine runtime and its holder count.
pub struct NativeRuntime {
    engine: Arc<dyn NativeEngine>,
    worker_threads: usize,
    slot: Mutex<RuntimeSlot>,
}

impl std::fmt::Debug for NativeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.lock_slot();
        f.debug_struct("NativeRuntime")
            .field("worker_threads", &self.worker_threads)
            .field("refs", &slot.refs)
            .field("initialized", &slot.ptr.is_some())
            .finish()
    }
}

#[cfg(feature = "link-native")]
static SHARED: once_cell::sync::Lazy<Arc<NativeRuntime>> = once_cell::sync::Lazy::new(|| {
    NativeRuntime::new(Arc::new(crate::native::linked::LinkedEngine), NativeRuntime::DEFAULT_WORKER_THREADS)
});

impl NativeRuntime {
    /// Pool size of the shared runtime.
    pub const DEFAULT_WORKER_THREADS: usize = 2;

    pub fn new(engine: Arc<dyn NativeEngine>, worker_threads: usize) -> Arc<Self> {
        Arc::new(Self { engine, worker_threads, slot: Mutex::new(RuntimeSlot::default()) })
    }

    /// The process-wide runtime bound to the linked engine.
    #[cfg(feature = "link-native")]
    pub fn shared() -> Arc<Self> {
        SHARED.clone()
    }

    pub fn engine(&self) -> &Arc<dyn NativeEngine> {
        &self.engine
    }

    /// Worker threads requested from the engine on initialization.
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// Take a reference, initializing the engine runtime on the 0 to 1
    /// transition. A failed initialization leaves the count untouched.
    pub fn acquire(self: &Arc<Self>) -> Result<RuntimeHandle, BridgeError> {
        let mut slot = self.lock_slot();
        if slot.refs == 0 {
            tracing::info!(worker_threads = self.worker_threads, "initializing native runtime");
            match self.engine.init_runtime(self.worker_threads) {
                Some(ptr) => slot.ptr = Some(ptr),
                None => {
                    tracing::error!("native runtime initialization failed");
                    return Err(BridgeError::RuntimeInitFailed);
                }
            }
        }
        let ptr = slot.ptr.ok_or(BridgeError::RuntimeInitFailed)?;
        slot.refs += 1;
        tracing::debug!(refs = slot.refs, "native runtime acquired");

        Ok(RuntimeHandle { runtime: Arc::clone(self), ptr, released: AtomicBool::new(false) })
    }

    fn release(&self) {
        let mut slot = self.lock_slot();
        if slot.refs == 0 {
            tracing::warn!("native runtime released more often than acquired");
            return;
        }
        slot.refs -= 1;
        tracing::debug!(refs = slot.refs, "native runtime released");

        if slot.refs == 0 {
            if let Some(ptr) = slot.ptr.take() {
                tracing::info!("disposing native runtime");
                self.engine.dispose_runtime(ptr);
            }
        }
    }

    /// Current number of holders.
    pub fn ref_count(&self) -> usize {
        self.lock_slot().refs
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_slot().ptr.is_some()
    }

    fn lock_slot(&self) -> MutexGuard<'_, RuntimeSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One reference to the runtime.
pub struct RuntimeHandle {
    runtime: Arc<NativeRuntime>,
    ptr: RuntimePtr,
    released: AtomicBool,
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("released", &self.is_released())
            .finish()
    }
}

impl RuntimeHandle {
    /// The runtime pointer, valid until this handle is released.
    pub fn as_ptr(&self) -> Result<RuntimePtr, BridgeError> {
        if self.is_released() {
            return Err(BridgeError::Disposed("runtime handle"));
        }
        Ok(self.ptr)
    }

    pub fn runtime(&self) -> &Arc<NativeRuntime> {
        &self.runtime
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Give the reference back. Later calls are no-ops.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.runtime.release();
        }
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        self.release();
    }
}
