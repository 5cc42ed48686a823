use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::operation::{OperationId, RegistrationId};

/// Process-wide identity of one [`super::Fetcher`]. Operation and
/// registration ids restart at one in every fetcher; this tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FetcherId(u64);

impl FetcherId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle for one submission, used only to cancel it.
///
/// Cancelling stops deliveries to this caller without affecting other callers
/// sharing the same operation. A token cancels at most once; later calls are
/// no-ops. Only the fetcher that issued a token acts on it.
#[derive(Debug, Clone)]
pub struct FetchToken {
    url: String,
    fetcher: FetcherId,
    pub(crate) operation: OperationId,
    pub(crate) registration: RegistrationId,
    pub(crate) live: Arc<AtomicBool>,
}

impl FetchToken {
    pub(crate) fn new(
        url: String,
        fetcher: FetcherId,
        operation: OperationId,
        registration: RegistrationId,
        live: Arc<AtomicBool>,
    ) -> Self {
        Self {
            url,
            fetcher,
            operation,
            registration,
            live,
        }
    }

    /// Normalised URL the token was issued for.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_cancelled(&self) -> bool {
        !self.live.load(Ordering::Acquire)
    }

    pub(crate) fn issued_by(&self, fetcher: FetcherId) -> bool {
        self.fetcher == fetcher
    }

    /// Flip the token to cancelled. True only for the first call.
    pub(crate) fn revoke(&self) -> bool {
        self.live.swap(false, Ordering::AcqRel)
    }
}
