//! Base types and error handling.
//!
//! - [`neterror::BridgeError`]: the crate's error type
//! - [`responsestate::ResponseState`]: the per-exchange response lifecycle
//! - [`context::NativeResultExt`]: native status to error translation

pub mod context;
pub mod neterror;
pub mod responsestate;

#[cfg(test)]
mod tests;
