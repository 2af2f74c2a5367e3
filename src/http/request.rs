//! Outgoing request description.

use crate::http::requestbody::RequestBody;
use http::{HeaderMap, Method, Version};
use url::Url;

/// A request ready to be sent through a client.
#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    url: Url,
    version: Version,
    headers: HeaderMap,
    body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn set_body(&mut self, body: impl Into<RequestBody>) {
        self.body = body.into();
    }

    /// Header values as sent to the engine: one entry per name, multiple
    /// values joined with `,`.
    pub(crate) fn joined_headers(&self) -> Vec<(&str, Vec<u8>)> {
        self.headers
            .keys()
            .map(|name| {
                let mut joined = Vec::new();
                for (i, value) in self.headers.get_all(name).iter().enumerate() {
                    if i > 0 {
                        joined.push(b',');
                    }
                    joined.extend_from_slice(value.as_bytes());
                }
                (name.as_str(), joined)
            })
            .collect()
    }

    pub(crate) fn into_body(self) -> RequestBody {
        self.body
    }
}
