//! Client configuration.
//!
//! [`ClientSettings`] is opaque to the bridge: every value is forwarded to
//! the native engine once, when the client's context is built. Unset
//! fields keep the engine's defaults. [`BridgeConfig`] tunes the bridge
//! itself.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-level configuration, forwarded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Only speak HTTP/2 (prior knowledge for cleartext).
    pub http2_only: Option<bool>,
    pub skip_certificate_verification: Option<bool>,
    /// PEM-encoded trust anchors replacing the platform roots.
    pub root_certificates: Option<String>,
    /// PEM-encoded client certificate chain for mutual TLS.
    pub client_auth_certificates: Option<String>,
    /// PEM-encoded PKCS#8 private key for mutual TLS.
    pub client_auth_key: Option<String>,
    pub pool_idle_timeout: Option<Duration>,
    pub max_idle_per_host: Option<usize>,
    pub http2_initial_stream_window_size: Option<u32>,
    pub http2_initial_connection_window_size: Option<u32>,
    pub http2_adaptive_window: Option<bool>,
    pub http2_max_frame_size: Option<u32>,
    pub http2_keep_alive_interval: Option<Duration>,
    pub http2_keep_alive_timeout: Option<Duration>,
    pub http2_keep_alive_while_idle: Option<bool>,
    pub http2_max_concurrent_reset_streams: Option<usize>,
    pub http2_max_send_buffer_size: Option<usize>,
}

impl ClientSettings {
    /// Names of the options that are set, for logging.
    pub fn configured_options(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        macro_rules! note {
            ($($field:ident),* $(,)?) => {
                $(if self.$field.is_some() { names.push(stringify!($field)); })*
            };
        }
        note!(
            http2_only,
            skip_certificate_verification,
            root_certificates,
            client_auth_certificates,
            client_auth_key,
            pool_idle_timeout,
            max_idle_per_host,
            http2_initial_stream_window_size,
            http2_initial_connection_window_size,
            http2_adaptive_window,
            http2_max_frame_size,
            http2_keep_alive_interval,
            http2_keep_alive_timeout,
            http2_keep_alive_while_idle,
            http2_max_concurrent_reset_streams,
            http2_max_send_buffer_size,
        );
        names
    }
}

/// Bridge-side tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long the outbound body waits before retrying a write the
    /// engine rejected because its send buffer was full.
    pub write_retry_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { write_retry_interval: Duration::from_millis(10) }
    }
}
