//! Network transport capability.
//!
//! The scheduler never talks to the network directly: it hands a
//! [`TransportRequest`] to an injected [`Transport`] and consumes the
//! resulting [`TransportStream`] of events. Dropping the stream aborts the
//! transfer. [`CurlTransport`] is the default libcurl-backed implementation.

mod curl_transport;
mod stream;

use std::fmt;
use std::time::Duration;

use crate::headers::HeaderSet;

pub use curl_transport::CurlTransport;
pub use stream::{AbortToken, TransportSink, TransportStream};

/// Username/password pair passed through to the transport untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub password: String,
}

impl Credential {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything a transport needs to issue one request. Built by the scheduler
/// at start time from the settings in effect at that moment.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: HeaderSet,
    pub credential: Option<Credential>,
    /// Let the transport store and send cookies.
    pub handle_cookies: bool,
    /// Accept invalid TLS certificates and host names.
    pub allow_insecure: bool,
    /// Ask intermediaries not to serve a cached response.
    pub bypass_cache: bool,
    /// Overall deadline for the transfer; the scheduler enforces it as well.
    pub timeout: Duration,
}

/// One item on a transport stream.
#[derive(Debug)]
pub enum TransportEvent {
    /// Response headers arrived; `expected_length` comes from `Content-Length`.
    Response { expected_length: Option<u64> },
    /// A slice of the response body.
    Chunk(Vec<u8>),
    /// The body is complete.
    Done,
    /// The transfer failed; no further events follow.
    Failed(TransportError),
}

/// Failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Server answered with a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Connection, DNS, TLS or protocol failure.
    #[error("{0}")]
    Network(String),
    /// The transport's own timer expired.
    #[error("transfer timed out")]
    TimedOut,
    /// The transfer was aborted before it finished.
    #[error("transfer aborted")]
    Aborted,
}

/// Starts network transfers. Implementations must return promptly and do the
/// actual I/O in the background, reporting progress through the stream.
pub trait Transport: Send + Sync {
    fn start(&self, request: TransportRequest) -> Result<TransportStream, TransportError>;
}
