//! Event channel between a transport and the operation driving it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::TransportEvent;

/// Shared abort flag. The transport polls it; the scheduler sets it on
/// cancellation, timeout, or when the stream is dropped.
#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicBool>);

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request abort. Returns true only for the call that actually set the flag.
    pub fn abort(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Receiving half, owned by the operation while it is executing.
/// Dropping it releases the transfer.
#[derive(Debug)]
pub struct TransportStream {
    events: mpsc::Receiver<TransportEvent>,
    abort: AbortToken,
}

/// Sending half, owned by the transport implementation.
#[derive(Debug, Clone)]
pub struct TransportSink {
    tx: mpsc::Sender<TransportEvent>,
    abort: AbortToken,
}

impl TransportStream {
    /// Create a connected sink/stream pair with a bounded buffer of `capacity` events.
    pub fn channel(capacity: usize) -> (TransportSink, TransportStream) {
        let (tx, events) = mpsc::channel(capacity.max(1));
        let abort = AbortToken::new();
        (
            TransportSink {
                tx,
                abort: abort.clone(),
            },
            TransportStream { events, abort },
        )
    }

    /// Next event, or `None` once the transport has gone away.
    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub fn abort_token(&self) -> AbortToken {
        self.abort.clone()
    }
}

impl Drop for TransportStream {
    fn drop(&mut self) {
        if self.abort.abort() {
            tracing::trace!("transport stream released");
        }
    }
}

impl TransportSink {
    /// True once the consumer aborted or dropped the stream.
    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted() || self.tx.is_closed()
    }

    /// Send an event from async code. Returns false if the consumer is gone.
    pub async fn send(&self, event: TransportEvent) -> bool {
        if self.is_aborted() {
            return false;
        }
        self.tx.send(event).await.is_ok()
    }

    /// Send an event from a blocking thread. Returns false if the consumer is gone.
    pub fn blocking_send(&self, event: TransportEvent) -> bool {
        if self.is_aborted() {
            return false;
        }
        self.tx.blocking_send(event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_reports_first_caller_only() {
        let token = AbortToken::new();
        assert!(!token.is_aborted());
        assert!(token.abort());
        assert!(!token.abort());
        assert!(token.is_aborted());
    }

    #[tokio::test]
    async fn dropping_stream_aborts_sink() {
        let (sink, mut stream) = TransportStream::channel(4);
        assert!(sink.send(TransportEvent::Chunk(vec![1, 2])).await);
        match stream.next().await {
            Some(TransportEvent::Chunk(b)) => assert_eq!(b, vec![1, 2]),
            other => panic!("unexpected event: {:?}", other),
        }
        drop(stream);
        assert!(sink.is_aborted());
        assert!(!sink.send(TransportEvent::Done).await);
    }
}
