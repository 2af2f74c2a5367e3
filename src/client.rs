//! HTTP Client with builder pattern.
//!
//! A [`Client`] owns one native context. Requests are described with a
//! [`RequestBuilder`] and executed by the engine; responses stream back
//! through engine callbacks.
//!
//! # Example
//!
//! ```rust,ignore
//! use bridgenet::Client;
//!
//! let client = Client::builder()
//!     .http2_only(true)
//!     .build()?;
//!
//! let resp = client.get("https://example.com")
//!     .send()
//!     .await?;
//! ```

use crate::base::neterror::BridgeError;
use crate::handle::context::NativeContext;
use crate::handle::runtime::NativeRuntime;
use crate::http::exchange::Exchange;
use crate::http::request::HttpRequest;
use crate::http::requestbody::RequestBody;
use crate::http::settings::{BridgeConfig, ClientSettings};
use crate::http::HttpResponse;
use bytes::Bytes;
use futures::Stream;
use http::Method;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// HTTP Client for making requests.
///
/// Use [`Client::builder()`] to configure and create a client. Clones
/// share the same native context.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    context: Mutex<Option<Arc<NativeContext>>>,
    settings: ClientSettings,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("disposed", &self.is_disposed())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The settings the native client was built with.
    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    pub fn is_disposed(&self) -> bool {
        self.context().is_err()
    }

    /// Start building a GET request.
    pub fn get<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Start building a POST request.
    pub fn post<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Start building a PUT request.
    pub fn put<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Start building a DELETE request.
    pub fn delete<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Start building a HEAD request.
    pub fn head<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    /// Start building a PATCH request.
    pub fn patch<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    /// Start building a request with custom method.
    pub fn request<U: AsRef<str>>(&self, method: Method, url: U) -> RequestBuilder {
        RequestBuilder {
            client: self.clone(),
            method,
            url: url.as_ref().to_string(),
            version: http::Version::HTTP_11,
            headers: http::HeaderMap::new(),
            body: RequestBody::Empty,
            cancel: None,
        }
    }

    /// Begin an exchange without waiting for its response.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, request: HttpRequest, cancel: CancellationToken) -> Result<Exchange, BridgeError> {
        let context = self.context()?;
        Exchange::send(&context, request, cancel)
    }

    /// Send `request` and wait for the response head.
    pub async fn execute(
        &self,
        request: HttpRequest,
        cancel: CancellationToken,
    ) -> Result<HttpResponse, BridgeError> {
        self.start(request, cancel)?.response().await
    }

    /// Release this client's hold on the native context. The context is
    /// torn down once exchanges still in flight have been released.
    pub fn dispose(&self) {
        let context = self.inner.context.lock().unwrap_or_else(PoisonError::into_inner).take();
        if context.is_some() {
            tracing::debug!("client disposed");
        }
    }

    /// The native context backing this client.
    pub fn native_context(&self) -> Result<Arc<NativeContext>, BridgeError> {
        self.context()
    }

    fn context(&self) -> Result<Arc<NativeContext>, BridgeError> {
        self.inner
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(BridgeError::Disposed("client"))
    }
}

/// Builder for creating a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    settings: ClientSettings,
    config: BridgeConfig,
    runtime: Option<Arc<NativeRuntime>>,
}

impl ClientBuilder {
    /// Use `runtime` instead of the process-wide one.
    pub fn runtime(mut self, runtime: Arc<NativeRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Replace all engine settings at once.
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.settings.http2_only = Some(enabled);
        self
    }

    /// Disable server certificate verification. Testing only.
    pub fn skip_certificate_verification(mut self, skip: bool) -> Self {
        self.settings.skip_certificate_verification = Some(skip);
        self
    }

    /// Trust only the given PEM roots.
    pub fn root_certificates(mut self, pem: impl Into<String>) -> Self {
        self.settings.root_certificates = Some(pem.into());
        self
    }

    /// Present a client certificate (PEM chain and PKCS#8 key).
    pub fn client_auth(mut self, certificates: impl Into<String>, key: impl Into<String>) -> Self {
        self.settings.client_auth_certificates = Some(certificates.into());
        self.settings.client_auth_key = Some(key.into());
        self
    }

    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.settings.pool_idle_timeout = Some(timeout);
        self
    }

    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.settings.max_idle_per_host = Some(max);
        self
    }

    pub fn http2_initial_stream_window_size(mut self, size: u32) -> Self {
        self.settings.http2_initial_stream_window_size = Some(size);
        self
    }

    pub fn http2_initial_connection_window_size(mut self, size: u32) -> Self {
        self.settings.http2_initial_connection_window_size = Some(size);
        self
    }

    pub fn http2_adaptive_window(mut self, enabled: bool) -> Self {
        self.settings.http2_adaptive_window = Some(enabled);
        self
    }

    pub fn http2_max_frame_size(mut self, size: u32) -> Self {
        self.settings.http2_max_frame_size = Some(size);
        self
    }

    pub fn http2_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.settings.http2_keep_alive_interval = Some(interval);
        self
    }

    pub fn http2_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.settings.http2_keep_alive_timeout = Some(timeout);
        self
    }

    pub fn http2_keep_alive_while_idle(mut self, enabled: bool) -> Self {
        self.settings.http2_keep_alive_while_idle = Some(enabled);
        self
    }

    pub fn http2_max_concurrent_reset_streams(mut self, max: usize) -> Self {
        self.settings.http2_max_concurrent_reset_streams = Some(max);
        self
    }

    pub fn http2_max_send_buffer_size(mut self, size: usize) -> Self {
        self.settings.http2_max_send_buffer_size = Some(size);
        self
    }

    /// Delay between retries of a write the engine rejected as full.
    pub fn write_retry_interval(mut self, interval: Duration) -> Self {
        self.config.write_retry_interval = interval;
        self
    }

    /// Build the client, creating its native context.
    pub fn build(self) -> Result<Client, BridgeError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => default_runtime()?,
        };
        let context = NativeContext::create(&runtime, &self.settings, self.config)?;

        Ok(Client {
            inner: Arc::new(ClientInner { context: Mutex::new(Some(context)), settings: self.settings }),
        })
    }
}

#[cfg(feature = "link-native")]
fn default_runtime() -> Result<Arc<NativeRuntime>, BridgeError> {
    Ok(NativeRuntime::shared())
}

#[cfg(not(feature = "link-native"))]
fn default_runtime() -> Result<Arc<NativeRuntime>, BridgeError> {
    Err(BridgeError::InvalidState("no native engine linked; supply a runtime"))
}

/// Builder for a single request.
pub struct RequestBuilder {
    client: Client,
    method: Method,
    url: String,
    version: http::Version,
    headers: http::HeaderMap,
    body: RequestBody,
    cancel: Option<CancellationToken>,
}

impl RequestBuilder {
    /// Add a header.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: http::header::IntoHeaderName,
        V: TryInto<http::HeaderValue>,
    {
        if let Ok(val) = value.try_into() {
            self.headers.append(key, val);
        }
        self
    }

    /// HTTP version to request. Only 1.0, 1.1 and 2 can be sent.
    pub fn version(mut self, version: http::Version) -> Self {
        self.version = version;
        self
    }

    /// Set request body.
    pub fn body<B: Into<RequestBody>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Stream the request body from `stream`.
    pub fn body_stream<S>(mut self, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BridgeError>> + Send + 'static,
    {
        self.body = RequestBody::wrap_stream(stream);
        self
    }

    /// Leave the body to the caller, who writes and completes it through
    /// [`Exchange::outbound`].
    pub fn body_writer(mut self) -> Self {
        self.body = RequestBody::Writer;
        self
    }

    /// Set JSON body.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(mut self, json: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(json) {
            self.body = RequestBody::from(bytes);
            self.headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
        }
        self
    }

    /// Cancel the request when `token` fires.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Assemble the request without sending it.
    pub fn build(self) -> Result<(Client, HttpRequest, CancellationToken), BridgeError> {
        let url = Url::parse(&self.url).map_err(|_| BridgeError::InvalidUrl)?;
        let mut request = HttpRequest::new(self.method, url);
        request.set_version(self.version);
        *request.headers_mut() = self.headers;
        request.set_body(self.body);
        let cancel = self.cancel.map(|t| t.child_token()).unwrap_or_default();
        Ok((self.client, request, cancel))
    }

    /// Begin the exchange, returning a handle for cancellation and state.
    pub fn start(self) -> Result<Exchange, BridgeError> {
        let (client, request, cancel) = self.build()?;
        client.start(request, cancel)
    }

    /// Send the request.
    pub async fn send(self) -> Result<HttpResponse, BridgeError> {
        let (client, request, cancel) = self.build()?;
        client.execute(request, cancel).await
    }
}
