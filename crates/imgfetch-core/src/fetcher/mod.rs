//! The fetch scheduler.
//!
//! A [`Fetcher`] accepts [`RequestDescriptor`]s, folds requests with the same
//! shape into one operation, runs at most `max_concurrent_downloads`
//! operations at a time and fans progress and completion out to every caller
//! still attached. All scheduling state lives behind one lock; callbacks,
//! transport calls and decoding always run outside it.

mod budget;
mod drive;
mod events;
mod operation;
mod queue;
mod scheduler;
mod settings;
mod state;
mod token;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use crate::config::{ExecutionOrder, FetcherConfig};
use crate::decoder::{Decoder, ImageDecoder};
use crate::error::FetchError;
use crate::headers::HeaderSet;
use crate::request::{
    Completion, CompletionCallback, FetchOptions, FetchedImage, OperationKey, ProgressCallback,
    RequestDescriptor,
};
use crate::transport::{Credential, CurlTransport, Transport};

pub use events::{FetchEvent, StopReason};
pub use operation::OperationId;
pub use settings::{FetcherSettings, HeadersFilter};
pub use state::OperationState;
pub use token::FetchToken;

use operation::{Operation, Registration};
use scheduler::{Launch, SchedulerState};
use token::FetcherId;

const EVENT_CAPACITY: usize = 64;

/// State shared between the public handle and the driving tasks.
pub(crate) struct Shared {
    id: FetcherId,
    state: Mutex<SchedulerState>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) decoder: Arc<dyn Decoder>,
    runtime: Handle,
    events: broadcast::Sender<FetchEvent>,
}

impl Shared {
    /// A callback that panicked elsewhere never wedges the scheduler.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: FetchEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn launch(self: &Arc<Self>, launches: Vec<Launch>) {
        for launch in launches {
            tracing::debug!(op = launch.id.0, url = %launch.url, "launching operation");
            self.runtime
                .spawn(drive::run_operation(Arc::clone(self), launch));
        }
    }

    /// Emit `Stopped` for operations that had started. Call with the lock held
    /// so events stay ordered with the state they describe.
    fn emit_stopped(&self, op: &Operation, reason: StopReason) {
        if op.abort.is_some() {
            self.emit(FetchEvent::Stopped {
                url: op.url().to_string(),
                reason,
            });
        }
    }

    /// Terminal transition for a launched operation, then fan-out of the final
    /// completion. Ignored if the operation was cancelled in the meantime.
    pub(crate) fn finish(self: &Arc<Self>, id: OperationId, result: Result<FetchedImage, FetchError>) {
        let (state, reason) = match &result {
            Ok(_) => (OperationState::Completed, StopReason::Completed),
            Err(FetchError::Cancelled) => (OperationState::Cancelled, StopReason::Cancelled),
            Err(e) => (OperationState::Failed, StopReason::Failed(e.kind())),
        };
        let (op, launches) = {
            let mut guard = self.lock();
            let Some(op) = guard.finish(id, state) else {
                tracing::debug!(op = id.0, "finished after cancellation; dropping result");
                return;
            };
            self.emit_stopped(&op, reason);
            (op, guard.pump())
        };
        self.launch(launches);

        match &result {
            Ok(fetched) => tracing::info!(
                op = id.0,
                url = %op.url(),
                bytes = fetched.data.len(),
                width = fetched.image.width,
                height = fetched.image.height,
                "download completed"
            ),
            Err(e) => tracing::warn!(op = id.0, url = %op.url(), kind = e.kind(), error = %e, "download failed"),
        }

        let completion = Completion {
            result,
            finished: true,
        };
        for reg in &op.registrations {
            reg.notify_completion(&completion);
        }
    }
}

/// Asynchronous image fetch scheduler.
///
/// Must be created inside a Tokio runtime (or given a [`Handle`] through the
/// builder). Dropping it cancels everything still pending or executing.
pub struct Fetcher {
    shared: Arc<Shared>,
}

impl Fetcher {
    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::default()
    }

    /// Fetcher with the curl transport and raster decoder, configured from `cfg`.
    pub fn from_config(cfg: &FetcherConfig) -> Result<Self> {
        Self::builder().settings(FetcherSettings::from(cfg)).build()
    }

    /// Submit one request. Returns `None` (after reporting `InvalidRequest`
    /// to the completion callback) when the URL is empty or malformed.
    pub fn submit(&self, request: RequestDescriptor) -> Option<FetchToken> {
        let RequestDescriptor {
            url,
            options,
            on_progress,
            on_completion,
        } = request;

        let key = match OperationKey::for_request(&url, options) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "rejected request");
                if let Some(cb) = on_completion {
                    cb(&Completion {
                        result: Err(e),
                        finished: true,
                    });
                }
                return None;
            }
        };

        let live = Arc::new(AtomicBool::new(true));
        let (token, launches) = {
            let mut state = self.shared.lock();
            let reg_id = state.next_registration_id();
            let registration = Arc::new(Registration::new(
                reg_id,
                options,
                on_progress,
                on_completion,
                Arc::clone(&live),
            ));
            let normalized = key.url.clone();
            let (op, created) = state.admit(key, options, registration);
            if created {
                tracing::debug!(op = op.0, url = %normalized, ?options, "queued new operation");
            } else {
                tracing::debug!(op = op.0, url = %normalized, "attached to existing operation");
            }
            (
                FetchToken::new(normalized, self.shared.id, op, reg_id, live),
                state.pump(),
            )
        };
        self.shared.launch(launches);
        Some(token)
    }

    /// Shorthand for [`Fetcher::submit`] with loose arguments.
    pub fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
        on_progress: Option<ProgressCallback>,
        on_completion: Option<CompletionCallback>,
    ) -> Option<FetchToken> {
        self.submit(RequestDescriptor {
            url: url.to_string(),
            options,
            on_progress,
            on_completion,
        })
    }

    /// Detach the token's callbacks. The operation is cancelled once no
    /// caller is left on it. Cancelling twice is a no-op, and so is a token
    /// issued by another fetcher.
    pub fn cancel(&self, token: &FetchToken) {
        if !token.issued_by(self.shared.id) {
            tracing::warn!(url = %token.url(), "ignoring token issued by another fetcher");
            return;
        }
        if !token.revoke() {
            return;
        }
        let (detached, launches) = {
            let mut state = self.shared.lock();
            let detached = state.detach(token.operation, token.registration);
            if let Some(op) = &detached.cancelled {
                self.shared.emit_stopped(op, StopReason::Cancelled);
            }
            (detached, state.pump())
        };
        self.shared.launch(launches);
        if detached.registration.is_some() {
            tracing::debug!(op = token.operation.0, url = %token.url(), "token cancelled");
        }
    }

    /// Cancel every registration on every operation.
    pub fn cancel_all(&self) {
        let cancelled = {
            let mut state = self.shared.lock();
            let cancelled = state.cancel_all();
            for op in &cancelled {
                self.shared.emit_stopped(op, StopReason::Cancelled);
            }
            cancelled
        };
        if !cancelled.is_empty() {
            tracing::info!(count = cancelled.len(), "cancelled all operations");
        }
    }

    /// While suspended no new operation starts; running ones are unaffected.
    pub fn set_suspended(&self, suspended: bool) {
        let launches = {
            let mut state = self.shared.lock();
            state.suspended = suspended;
            state.pump()
        };
        tracing::debug!(suspended, "scheduler suspension changed");
        self.shared.launch(launches);
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.lock().suspended
    }

    pub fn max_concurrent_downloads(&self) -> usize {
        self.shared.lock().max_concurrent()
    }

    /// Values below one are clamped to one. Raising the limit starts queued
    /// operations right away; lowering it lets running ones finish.
    pub fn set_max_concurrent_downloads(&self, limit: usize) {
        let launches = {
            let mut state = self.shared.lock();
            state.set_max_concurrent(limit);
            state.pump()
        };
        self.shared.launch(launches);
    }

    pub fn download_timeout(&self) -> Duration {
        self.shared.lock().settings.effective_timeout()
    }

    /// Applies to operations started afterwards. Zero restores the default.
    pub fn set_download_timeout(&self, timeout: Duration) {
        self.shared.lock().settings.download_timeout = timeout;
    }

    pub fn execution_order(&self) -> ExecutionOrder {
        self.shared.lock().settings.execution_order
    }

    /// Affects where later submissions are queued.
    pub fn set_execution_order(&self, order: ExecutionOrder) {
        self.shared.lock().settings.execution_order = order;
    }

    /// Set or (with `None`) remove a header sent with every request.
    /// Operations already admitted keep the headers they were admitted with.
    pub fn set_header(&self, field: &str, value: Option<&str>) {
        let mut state = self.shared.lock();
        state.settings.headers.set(field, value);
        state.request_changed();
    }

    pub fn header(&self, field: &str) -> Option<String> {
        self.shared
            .lock()
            .settings
            .headers
            .get(field)
            .map(str::to_string)
    }

    pub fn headers(&self) -> HeaderSet {
        self.shared.lock().settings.headers.clone()
    }

    pub fn set_headers_filter(&self, filter: Option<HeadersFilter>) {
        let previous = {
            let mut state = self.shared.lock();
            state.request_changed();
            std::mem::replace(&mut state.settings.headers_filter, filter)
        };
        drop(previous);
    }

    pub fn set_credential(&self, credential: Option<Credential>) {
        let mut state = self.shared.lock();
        state.settings.credential = credential;
        state.request_changed();
    }

    pub fn set_username(&self, username: Option<String>) {
        let mut state = self.shared.lock();
        state.settings.username = username;
        state.request_changed();
    }

    pub fn set_password(&self, password: Option<String>) {
        let mut state = self.shared.lock();
        state.settings.password = password;
        state.request_changed();
    }

    /// Credential that would be attached to a request started now.
    pub fn credential(&self) -> Option<Credential> {
        self.shared.lock().settings.effective_credential()
    }

    /// Snapshot of the live settings.
    pub fn settings(&self) -> FetcherSettings {
        self.shared.lock().settings.clone()
    }

    /// Operations pending or executing.
    pub fn pending_and_executing_count(&self) -> usize {
        self.shared.lock().pending_and_executing()
    }

    /// Operations currently holding a concurrency slot.
    pub fn executing_count(&self) -> usize {
        self.shared.lock().executing()
    }

    /// State of the token's operation, or `None` once it has left the
    /// scheduler (terminal), the token was cancelled or another fetcher
    /// issued it.
    pub fn operation_state(&self, token: &FetchToken) -> Option<OperationState> {
        if token.is_cancelled() || !token.issued_by(self.shared.id) {
            return None;
        }
        self.shared.lock().state_of(token.operation)
    }

    /// Started/stopped notifications for every operation from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FetchEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for Fetcher {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Fetcher")
            .field("settings", &state.settings)
            .field("suspended", &state.suspended)
            .field("operations", &state.pending_and_executing())
            .field("queued", &state.queued())
            .field("executing", &state.executing())
            .field("peak_executing", &state.peak_executing())
            .finish()
    }
}

/// Assembles a [`Fetcher`]; transport and decoder default to
/// [`CurlTransport`] and [`ImageDecoder`].
#[derive(Default)]
pub struct FetcherBuilder {
    settings: FetcherSettings,
    transport: Option<Arc<dyn Transport>>,
    decoder: Option<Arc<dyn Decoder>>,
    runtime: Option<Handle>,
}

impl FetcherBuilder {
    pub fn settings(mut self, settings: FetcherSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_concurrent_downloads(mut self, limit: usize) -> Self {
        self.settings.max_concurrent_downloads = limit.max(1);
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.settings.download_timeout = timeout;
        self
    }

    pub fn execution_order(mut self, order: ExecutionOrder) -> Self {
        self.settings.execution_order = order;
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Runtime the operations are spawned on. Defaults to the current one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<Fetcher> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()
                .context("Fetcher must be built inside a Tokio runtime or given a runtime handle")?,
        };
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(CurlTransport::new()));
        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(ImageDecoder::default()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        tracing::debug!(settings = ?self.settings, "fetcher created");
        Ok(Fetcher {
            shared: Arc::new(Shared {
                id: FetcherId::next(),
                state: Mutex::new(SchedulerState::new(self.settings)),
                transport,
                decoder,
                runtime,
                events,
            }),
        })
    }
}
