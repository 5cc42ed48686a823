//! Scheduler state guarded by the fetcher's single lock.
//!
//! Everything here is synchronous and never calls user code: admission,
//! deduplication, queue ordering, slot accounting and state transitions.
//! The async side ([`super::drive`]) asks this state what to launch and
//! reports back terminal outcomes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::request::{FetchOptions, OperationKey};
use crate::transport::AbortToken;

use super::budget::ConcurrencyBudget;
use super::operation::{Operation, OperationId, Registration, RegistrationId};
use super::queue::PendingQueue;
use super::settings::FetcherSettings;
use super::state::OperationState;

/// Everything a driving task needs to start one operation, captured at launch.
pub(crate) struct Launch {
    pub(crate) id: OperationId,
    pub(crate) url: String,
    pub(crate) options: FetchOptions,
    pub(crate) settings: FetcherSettings,
    pub(crate) wake: Arc<Notify>,
}

/// Result of detaching one registration.
#[derive(Default)]
pub(crate) struct Detached {
    pub(crate) registration: Option<Arc<Registration>>,
    /// Set when the detach left the operation empty and it was cancelled.
    pub(crate) cancelled: Option<Operation>,
}

pub(crate) struct SchedulerState {
    pub(crate) settings: FetcherSettings,
    pub(crate) suspended: bool,
    budget: ConcurrencyBudget,
    queue: PendingQueue,
    operations: HashMap<OperationId, Operation>,
    by_key: HashMap<OperationKey, OperationId>,
    /// Bumped whenever headers, the headers filter or the credential change.
    request_revision: u64,
    next_operation: u64,
    next_registration: u64,
}

impl SchedulerState {
    pub(crate) fn new(mut settings: FetcherSettings) -> Self {
        settings.max_concurrent_downloads = settings.max_concurrent_downloads.max(1);
        let budget = ConcurrencyBudget::new(settings.max_concurrent_downloads);
        Self {
            settings,
            suspended: false,
            budget,
            queue: PendingQueue::new(),
            operations: HashMap::new(),
            by_key: HashMap::new(),
            request_revision: 0,
            next_operation: 0,
            next_registration: 0,
        }
    }

    /// Mark the header set or credential as changed. Later submissions no
    /// longer join operations admitted before the change.
    pub(crate) fn request_changed(&mut self) {
        self.request_revision += 1;
    }

    pub(crate) fn next_registration_id(&mut self) -> RegistrationId {
        self.next_registration += 1;
        RegistrationId(self.next_registration)
    }

    /// Attach `registration` to the live operation for `key` under the current
    /// header and credential revision, or create a new pending one. Returns
    /// the operation id and whether it was newly created.
    pub(crate) fn admit(
        &mut self,
        key: OperationKey,
        options: FetchOptions,
        registration: Arc<Registration>,
    ) -> (OperationId, bool) {
        let key = key.at_revision(self.request_revision);
        let priority = options.priority();
        if let Some(&id) = self.by_key.get(&key) {
            if let Some(op) = self.operations.get_mut(&id) {
                op.registrations.push(registration);
                if op.state == OperationState::Pending && priority > op.priority {
                    op.priority = priority;
                    self.queue
                        .promote(id, priority, self.settings.execution_order);
                    tracing::debug!(op = id.0, ?priority, "promoted pending operation");
                }
                return (id, false);
            }
        }

        self.next_operation += 1;
        let id = OperationId(self.next_operation);
        let op = Operation::new(id, key.clone(), options, registration);
        self.queue.push(id, priority, self.settings.execution_order);
        self.operations.insert(id, op);
        self.by_key.insert(key, id);
        (id, true)
    }

    /// Reserve slots for as many queued operations as capacity allows and
    /// return what must be launched. Does nothing while suspended.
    pub(crate) fn pump(&mut self) -> Vec<Launch> {
        let mut launches = Vec::new();
        if self.suspended || self.queue.is_empty() {
            return launches;
        }
        while self.budget.available() > 0 {
            let Some(id) = self.queue.pop_next() else {
                break;
            };
            let Some(op) = self.operations.get_mut(&id) else {
                continue;
            };
            if op.state != OperationState::Pending || op.holds_slot {
                continue;
            }
            if !self.budget.try_acquire() {
                break;
            }
            op.holds_slot = true;
            launches.push(Launch {
                id,
                url: op.key.url.clone(),
                options: op.options,
                settings: self.settings.clone(),
                wake: Arc::clone(&op.wake),
            });
        }
        launches
    }

    /// Enter `Executing` once the transport stream exists. False if the
    /// operation was cancelled while it was being launched.
    pub(crate) fn mark_executing(&mut self, id: OperationId, abort: AbortToken) -> bool {
        match self.operations.get_mut(&id) {
            Some(op) if op.state == OperationState::Pending && op.holds_slot => {
                op.state = OperationState::Executing;
                op.abort = Some(abort);
                true
            }
            _ => false,
        }
    }

    /// Registrations to fan out to, in attachment order.
    pub(crate) fn snapshot(&self, id: OperationId) -> Option<Vec<Arc<Registration>>> {
        self.operations.get(&id).map(|op| op.registrations.clone())
    }

    pub(crate) fn state_of(&self, id: OperationId) -> Option<OperationState> {
        self.operations.get(&id).map(|op| op.state)
    }

    /// Detach one registration; an operation left without registrations is
    /// cancelled on the spot, releasing its slot.
    pub(crate) fn detach(&mut self, id: OperationId, registration: RegistrationId) -> Detached {
        let Some(op) = self.operations.get_mut(&id) else {
            return Detached::default();
        };
        let detached = op.detach(registration);
        if detached.is_none() || !op.registrations.is_empty() {
            return Detached {
                registration: detached,
                cancelled: None,
            };
        }
        Detached {
            registration: detached,
            cancelled: self.cancel_operation(id),
        }
    }

    /// Cancel every operation, pending and executing.
    pub(crate) fn cancel_all(&mut self) -> Vec<Operation> {
        let mut ids: Vec<OperationId> = self.operations.keys().copied().collect();
        ids.sort();
        let cancelled: Vec<Operation> = ids
            .into_iter()
            .filter_map(|id| self.cancel_operation(id))
            .collect();
        self.queue.clear();
        cancelled
    }

    /// Terminal transition reported by the driving task. `None` if the
    /// operation already left (cancelled meanwhile).
    pub(crate) fn finish(&mut self, id: OperationId, state: OperationState) -> Option<Operation> {
        debug_assert!(state.is_terminal());
        if !self.operations.get(&id).is_some_and(|op| op.holds_slot) {
            return None;
        }
        let mut op = self.remove(id)?;
        op.state = state;
        Some(op)
    }

    pub(crate) fn set_max_concurrent(&mut self, limit: usize) {
        let limit = limit.max(1);
        self.settings.max_concurrent_downloads = limit;
        self.budget.set_limit(limit);
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        self.budget.limit()
    }

    /// Operations that are queued, launching or executing.
    pub(crate) fn pending_and_executing(&self) -> usize {
        self.operations.len()
    }

    /// Operations holding a concurrency slot.
    pub(crate) fn executing(&self) -> usize {
        self.budget.in_use()
    }

    pub(crate) fn peak_executing(&self) -> usize {
        self.budget.peak()
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }

    fn cancel_operation(&mut self, id: OperationId) -> Option<Operation> {
        let mut op = self.remove(id)?;
        for reg in &op.registrations {
            reg.revoke();
        }
        op.tear_down();
        op.state = OperationState::Cancelled;
        tracing::debug!(op = op.id.0, url = %op.url(), "operation cancelled");
        Some(op)
    }

    /// Drop all scheduler references to `id` and give back its slot.
    fn remove(&mut self, id: OperationId) -> Option<Operation> {
        let op = self.operations.remove(&id)?;
        if self.by_key.get(&op.key) == Some(&id) {
            self.by_key.remove(&op.key);
        }
        if self.queue.contains(id) {
            self.queue.remove(id);
        }
        if op.holds_slot {
            self.budget.release();
        }
        Some(op)
    }
}
