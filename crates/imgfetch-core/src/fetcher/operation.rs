//! Operation bookkeeping kept under the scheduler lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::request::{
    Completion, CompletionCallback, FetchOptions, FetchProgress, OperationKey, Priority,
    ProgressCallback,
};
use crate::transport::AbortToken;

use super::state::OperationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub(crate) u64);

/// One caller's callback pair attached to an operation.
///
/// `live` is shared with the caller's token; once it is cleared no callback
/// fires again, even if a fan-out snapshot still holds this registration.
pub(crate) struct Registration {
    pub(crate) id: RegistrationId,
    pub(crate) progressive: bool,
    on_progress: Option<ProgressCallback>,
    on_completion: Option<CompletionCallback>,
    live: Arc<AtomicBool>,
}

impl Registration {
    pub(crate) fn new(
        id: RegistrationId,
        options: FetchOptions,
        on_progress: Option<ProgressCallback>,
        on_completion: Option<CompletionCallback>,
        live: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            progressive: options.contains(FetchOptions::PROGRESSIVE),
            on_progress,
            on_completion,
            live,
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn revoke(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub(crate) fn wants_progress(&self) -> bool {
        self.on_progress.is_some()
    }

    pub(crate) fn notify_progress(&self, progress: &FetchProgress) {
        if let Some(cb) = &self.on_progress {
            if self.is_live() {
                cb(progress);
            }
        }
    }

    pub(crate) fn notify_completion(&self, completion: &Completion) {
        if let Some(cb) = &self.on_completion {
            if self.is_live() {
                cb(completion);
            }
        }
    }
}

/// The unit of work for one request shape, shared by all its registrations.
pub(crate) struct Operation {
    pub(crate) id: OperationId,
    pub(crate) key: OperationKey,
    pub(crate) options: FetchOptions,
    pub(crate) priority: Priority,
    pub(crate) state: OperationState,
    pub(crate) registrations: Vec<Arc<Registration>>,
    /// True from the moment the scheduler reserves a slot until the slot is released.
    pub(crate) holds_slot: bool,
    /// Abort flag of the live transport stream, set on entering `Executing`.
    pub(crate) abort: Option<AbortToken>,
    /// Wakes the driving task when the operation is cancelled.
    pub(crate) wake: Arc<Notify>,
}

impl Operation {
    pub(crate) fn new(
        id: OperationId,
        key: OperationKey,
        options: FetchOptions,
        registration: Arc<Registration>,
    ) -> Self {
        Self {
            id,
            key,
            options,
            priority: options.priority(),
            state: OperationState::Pending,
            registrations: vec![registration],
            holds_slot: false,
            abort: None,
            wake: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.key.url
    }

    /// Detach one registration; returns it if it was attached.
    pub(crate) fn detach(&mut self, id: RegistrationId) -> Option<Arc<Registration>> {
        let pos = self.registrations.iter().position(|r| r.id == id)?;
        Some(self.registrations.remove(pos))
    }

    /// Abort the transport (if any) and wake the driving task.
    pub(crate) fn tear_down(&mut self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
        self.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(id: u64, live: Arc<AtomicBool>) -> Arc<Registration> {
        Arc::new(Registration::new(
            RegistrationId(id),
            FetchOptions::PROGRESSIVE,
            None,
            Some(Arc::new(|_: &Completion| {})),
            live,
        ))
    }

    #[test]
    fn detach_keeps_order_of_the_rest() {
        let key = OperationKey::for_request("https://example.com/a.png", FetchOptions::NONE).unwrap();
        let mut op = Operation::new(
            OperationId(1),
            key,
            FetchOptions::NONE,
            registration(1, Arc::new(AtomicBool::new(true))),
        );
        op.registrations.push(registration(2, Arc::new(AtomicBool::new(true))));
        op.registrations.push(registration(3, Arc::new(AtomicBool::new(true))));
        assert!(op.detach(RegistrationId(2)).is_some());
        assert!(op.detach(RegistrationId(2)).is_none());
        let left: Vec<u64> = op.registrations.iter().map(|r| r.id.0).collect();
        assert_eq!(left, vec![1, 3]);
        assert_eq!(op.state, OperationState::Pending);
    }

    #[test]
    fn revoked_registration_is_silent() {
        let live = Arc::new(AtomicBool::new(true));
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let reg = Registration::new(
            RegistrationId(1),
            FetchOptions::NONE,
            Some(Arc::new(move |_: &FetchProgress| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            None,
            Arc::clone(&live),
        );
        let p = FetchProgress {
            received: 1,
            expected: None,
            url: "u".into(),
        };
        reg.notify_progress(&p);
        reg.revoke();
        reg.notify_progress(&p);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!live.load(Ordering::SeqCst));
        assert!(!reg.progressive);
    }
}
