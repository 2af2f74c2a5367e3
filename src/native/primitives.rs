//! Plain-old-data values exchanged with the native engine.

/// HTTP protocol version as encoded across the ABI.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http09 = 0,
    Http10 = 1,
    Http11 = 2,
    Http2 = 3,
    Http3 = 4,
}

impl HttpVersion {
    /// Decode a raw value handed to a callback. Unknown values yield `None`.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(HttpVersion::Http09),
            1 => Some(HttpVersion::Http10),
            2 => Some(HttpVersion::Http11),
            3 => Some(HttpVersion::Http2),
            4 => Some(HttpVersion::Http3),
            _ => None,
        }
    }

    /// Versions a request may be sent with. HTTP/0.9 and HTTP/3 are
    /// response-only.
    pub fn for_request(version: http::Version) -> Option<Self> {
        match version {
            http::Version::HTTP_10 => Some(HttpVersion::Http10),
            http::Version::HTTP_11 => Some(HttpVersion::Http11),
            http::Version::HTTP_2 => Some(HttpVersion::Http2),
            _ => None,
        }
    }

    pub fn to_http(self) -> http::Version {
        match self {
            HttpVersion::Http09 => http::Version::HTTP_09,
            HttpVersion::Http10 => http::Version::HTTP_10,
            HttpVersion::Http11 => http::Version::HTTP_11,
            HttpVersion::Http2 => http::Version::HTTP_2,
            HttpVersion::Http3 => http::Version::HTTP_3,
        }
    }
}

/// Why the engine finished an exchange.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    Success = 0,
    Error = 1,
    Aborted = 2,
}

impl CompletionReason {
    /// Any value other than the known ones is treated as an error.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => CompletionReason::Success,
            2 => CompletionReason::Aborted,
            _ => CompletionReason::Error,
        }
    }
}

/// Outcome of `request_write_body`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    Success = 0,
    /// The engine's send buffer is full; retry later.
    Full = 1,
    /// The engine already finished the request body.
    AlreadyCompleted = 2,
}

impl WriteResult {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => WriteResult::Success,
            1 => WriteResult::Full,
            _ => WriteResult::AlreadyCompleted,
        }
    }
}
