//! The task that drives one launched operation from transport start to its
//! terminal transition.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

use crate::decoder::{DecodeError, DecodedImage, Decoder};
use crate::error::FetchError;
use crate::request::{Completion, FetchOptions, FetchProgress, FetchedImage};
use crate::transport::{TransportError, TransportEvent, TransportStream};

use super::events::FetchEvent;
use super::operation::{OperationId, Registration};
use super::scheduler::Launch;
use super::Shared;

pub(crate) async fn run_operation(shared: Arc<Shared>, launch: Launch) {
    let Launch {
        id,
        url,
        options,
        settings,
        wake,
    } = launch;

    let request = settings.transport_request(&url, options);
    let timeout = request.timeout;
    let mut stream = match shared.transport.start(request) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(op = id.0, url = %url, error = %e, "transport refused request");
            shared.finish(id, Err(e.into()));
            return;
        }
    };

    {
        let mut state = shared.lock();
        if !state.mark_executing(id, stream.abort_token()) {
            tracing::debug!(op = id.0, "cancelled before start; dropping transport");
            return;
        }
        shared.emit(FetchEvent::Started { url: url.clone() });
    }
    tracing::info!(op = id.0, url = %url, ?timeout, "download started");

    let deadline = Instant::now() + timeout;
    let transfer = Transfer {
        shared: &shared,
        id,
        url: &url,
        scale_down: options.contains(FetchOptions::SCALE_DOWN_LARGE_RESULT),
        timeout,
    };
    let Some(outcome) = transfer.run(&mut stream, &wake, deadline).await else {
        tracing::debug!(op = id.0, "driver stopped after cancellation");
        return;
    };
    drop(stream);

    let result = match outcome {
        Ok(data) => {
            let data = Arc::new(data);
            match decode(
                Arc::clone(&shared.decoder),
                Arc::clone(&data),
                transfer.scale_down,
            )
            .await
            {
                Ok(image) => Ok(FetchedImage {
                    image: Arc::new(image),
                    data,
                }),
                Err(e) => Err(FetchError::Decode(e)),
            }
        }
        Err(e) => Err(e),
    };
    shared.finish(id, result);
}

/// What the transfer loop does after a delivery.
enum Flow {
    Continue,
    /// The operation left the scheduler; report nothing more.
    Stop,
    TimedOut,
}

struct Transfer<'a> {
    shared: &'a Arc<Shared>,
    id: OperationId,
    url: &'a str,
    scale_down: bool,
    timeout: Duration,
}

impl Transfer<'_> {
    /// Pump transport events until the body is complete or something ends the
    /// transfer early. `None` means the operation was cancelled and nothing
    /// further should be reported.
    async fn run(
        &self,
        stream: &mut TransportStream,
        wake: &Notify,
        deadline: Instant,
    ) -> Option<Result<Vec<u8>, FetchError>> {
        let mut data = Vec::new();
        let mut expected = None;
        loop {
            let event = tokio::select! {
                biased;
                _ = wake.notified() => return None,
                _ = sleep_until(deadline) => return Some(Err(self.timed_out())),
                event = stream.next() => event,
            };
            match event {
                Some(TransportEvent::Response { expected_length }) => {
                    expected = expected_length;
                    if self.report_progress(0, expected).is_none() {
                        return None;
                    }
                }
                Some(TransportEvent::Chunk(chunk)) => {
                    data.extend_from_slice(&chunk);
                    match self.deliver_progress(&data, expected, wake, deadline).await {
                        Flow::Continue => {}
                        Flow::Stop => return None,
                        Flow::TimedOut => return Some(Err(self.timed_out())),
                    }
                }
                Some(TransportEvent::Done) => return Some(Ok(data)),
                Some(TransportEvent::Failed(TransportError::TimedOut)) => {
                    return Some(Err(FetchError::Timeout(self.timeout)))
                }
                Some(TransportEvent::Failed(e)) => {
                    tracing::warn!(op = self.id.0, url = %self.url, error = %e, "transport failed");
                    return Some(Err(e.into()));
                }
                None => {
                    return Some(Err(FetchError::Transport(TransportError::Network(
                        "transport closed without finishing".to_string(),
                    ))))
                }
            }
        }
    }

    fn timed_out(&self) -> FetchError {
        tracing::warn!(op = self.id.0, url = %self.url, "download timed out");
        FetchError::Timeout(self.timeout)
    }

    /// Fan out a progress report. Returns the registrations it went to, or
    /// `None` once the operation has left the scheduler.
    fn report_progress(&self, received: u64, expected: Option<u64>) -> Option<Vec<Arc<Registration>>> {
        let registrations = self.shared.lock().snapshot(self.id)?;
        let progress = FetchProgress {
            received,
            expected,
            url: self.url.to_string(),
        };
        for reg in registrations.iter().filter(|r| r.wants_progress()) {
            reg.notify_progress(&progress);
        }
        Some(registrations)
    }

    /// Fan out progress, then a partial image to progressive registrations.
    /// The partial decode still yields to cancellation and the deadline.
    async fn deliver_progress(
        &self,
        data: &[u8],
        expected: Option<u64>,
        wake: &Notify,
        deadline: Instant,
    ) -> Flow {
        let Some(registrations) = self.report_progress(data.len() as u64, expected) else {
            return Flow::Stop;
        };
        if !registrations.iter().any(|r| r.progressive && r.is_live()) {
            return Flow::Continue;
        }
        let snapshot = Arc::new(data.to_vec());
        let decoded = tokio::select! {
            biased;
            _ = wake.notified() => return Flow::Stop,
            _ = sleep_until(deadline) => return Flow::TimedOut,
            decoded = decode(
                Arc::clone(&self.shared.decoder),
                Arc::clone(&snapshot),
                self.scale_down,
            ) => decoded,
        };
        // Truncated input routinely fails to decode; only successes are delivered.
        let Ok(image) = decoded else {
            return Flow::Continue;
        };
        let partial = Completion {
            result: Ok(FetchedImage {
                image: Arc::new(image),
                data: snapshot,
            }),
            finished: false,
        };
        for reg in registrations.iter().filter(|r| r.progressive) {
            reg.notify_completion(&partial);
        }
        Flow::Continue
    }
}

async fn decode(
    decoder: Arc<dyn Decoder>,
    data: Arc<Vec<u8>>,
    scale_down: bool,
) -> Result<DecodedImage, DecodeError> {
    tokio::task::spawn_blocking(move || decoder.decode(&data, scale_down))
        .await
        .map_err(|e| DecodeError::new(format!("decoder task failed: {e}")))?
}
