//! Routing of engine callbacks to exchanges.

pub mod callbacks;
pub mod registry;

use crate::http::exchange::ExchangeShared;
use once_cell::sync::Lazy;
use registry::DispatchRegistry;

static REGISTRY: Lazy<DispatchRegistry<ExchangeShared>> = Lazy::new(DispatchRegistry::new);

/// The process-wide registry shared by every context.
pub fn registry() -> &'static DispatchRegistry<ExchangeShared> {
    &REGISTRY
}
