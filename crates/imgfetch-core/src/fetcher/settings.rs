//! Live settings read by the scheduler each time an operation starts.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ExecutionOrder, FetcherConfig, DEFAULT_MAX_CONCURRENT_DOWNLOADS};
use crate::headers::HeaderSet;
use crate::request::FetchOptions;
use crate::transport::{Credential, TransportRequest};

/// Rewrites the header set for one request: `(url, headers) -> headers`.
pub type HeadersFilter = Arc<dyn Fn(&str, &HeaderSet) -> HeaderSet + Send + Sync>;

/// Mutable configuration surface of a [`super::Fetcher`].
///
/// Changes only affect operations that have not started yet; a started
/// operation keeps the snapshot it was launched with.
#[derive(Clone)]
pub struct FetcherSettings {
    pub max_concurrent_downloads: usize,
    pub download_timeout: Duration,
    pub execution_order: ExecutionOrder,
    pub headers: HeaderSet,
    pub headers_filter: Option<HeadersFilter>,
    pub credential: Option<Credential>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            download_timeout: FetcherConfig::default().download_timeout(),
            execution_order: ExecutionOrder::Fifo,
            headers: HeaderSet::with_defaults(),
            headers_filter: None,
            credential: None,
            username: None,
            password: None,
        }
    }
}

impl From<&FetcherConfig> for FetcherSettings {
    fn from(cfg: &FetcherConfig) -> Self {
        Self {
            max_concurrent_downloads: cfg.max_concurrent_downloads.max(1),
            download_timeout: cfg.download_timeout(),
            execution_order: cfg.execution_order,
            headers: cfg.headers.iter().collect(),
            headers_filter: None,
            credential: None,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
        }
    }
}

impl FetcherSettings {
    /// Explicit credential if set, otherwise username + password when both are present.
    pub fn effective_credential(&self) -> Option<Credential> {
        if let Some(c) = &self.credential {
            return Some(c.clone());
        }
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some(Credential::new(user, password)),
            _ => None,
        }
    }

    /// Deadline for new operations; zero means the default.
    pub fn effective_timeout(&self) -> Duration {
        if self.download_timeout.is_zero() {
            FetcherConfig::default().download_timeout()
        } else {
            self.download_timeout
        }
    }

    /// Build the transport request for `url`. Runs the headers filter, so call
    /// it without holding the scheduler lock.
    pub(crate) fn transport_request(&self, url: &str, options: FetchOptions) -> TransportRequest {
        let headers = match &self.headers_filter {
            Some(filter) => filter(url, &self.headers),
            None => self.headers.clone(),
        };
        TransportRequest {
            url: url.to_string(),
            headers,
            credential: self.effective_credential(),
            handle_cookies: options.contains(FetchOptions::HANDLE_COOKIES),
            allow_insecure: options.contains(FetchOptions::ALLOW_INSECURE_TRANSPORT),
            bypass_cache: options.contains(FetchOptions::IGNORE_CACHE),
            timeout: self.effective_timeout(),
        }
    }
}

impl fmt::Debug for FetcherSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetcherSettings")
            .field("max_concurrent_downloads", &self.max_concurrent_downloads)
            .field("download_timeout", &self.download_timeout)
            .field("execution_order", &self.execution_order)
            .field("headers", &self.headers)
            .field("headers_filter", &self.headers_filter.is_some())
            .field("credential", &self.credential)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
