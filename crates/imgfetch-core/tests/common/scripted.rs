//! In-memory transport and decoder the tests drive by hand.
//!
//! Every `start` hands the test a [`Started`] with the request and the sink
//! end of the stream, so a test decides exactly when bytes, completion or
//! failure arrive.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use imgfetch_core::decoder::{DecodeError, DecodedImage, Decoder};
use imgfetch_core::transport::{
    Transport, TransportError, TransportEvent, TransportRequest, TransportSink, TransportStream,
};
use imgfetch_core::request::{CompletionCallback, ProgressCallback};
use imgfetch_core::{Completion, FetchEvent, FetchProgress};
use tokio::sync::{broadcast, mpsc};

pub const WAIT: Duration = Duration::from_secs(5);

/// How long [`StubDecoder`] blocks on bytes starting with `slow`.
pub const SLOW_DECODE: Duration = Duration::from_secs(2);

/// One transport start observed by the test.
pub struct Started {
    pub request: TransportRequest,
    pub sink: TransportSink,
}

impl Started {
    pub fn url(&self) -> &str {
        &self.request.url
    }

    /// Send the whole body in one chunk and finish.
    pub async fn complete(&self, body: &[u8]) {
        assert!(
            self.sink
                .send(TransportEvent::Response {
                    expected_length: Some(body.len() as u64),
                })
                .await
        );
        assert!(self.sink.send(TransportEvent::Chunk(body.to_vec())).await);
        assert!(self.sink.send(TransportEvent::Done).await);
    }

    pub async fn fail(&self, error: TransportError) {
        assert!(self.sink.send(TransportEvent::Failed(error)).await);
    }
}

#[derive(Clone)]
pub struct ScriptedTransport {
    tx: mpsc::UnboundedSender<Started>,
    starts: Arc<Mutex<HashMap<String, usize>>>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Started>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                starts: Arc::new(Mutex::new(HashMap::new())),
            },
            rx,
        )
    }

    /// How many times `url` was started.
    pub fn starts(&self, url: &str) -> usize {
        self.starts.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl Transport for ScriptedTransport {
    fn start(&self, request: TransportRequest) -> Result<TransportStream, TransportError> {
        let (sink, stream) = TransportStream::channel(16);
        *self
            .starts
            .lock()
            .unwrap()
            .entry(request.url.clone())
            .or_default() += 1;
        self.tx
            .send(Started { request, sink })
            .map_err(|_| TransportError::Network("test harness gone".into()))?;
        Ok(stream)
    }
}

/// Treats any bytes as a one-row image `len` pixels wide; bytes starting
/// with `bad` fail to decode and bytes starting with `slow` take
/// [`SLOW_DECODE`].
pub struct StubDecoder;

impl Decoder for StubDecoder {
    fn decode(&self, data: &[u8], _scale_down: bool) -> Result<DecodedImage, DecodeError> {
        if data.starts_with(b"slow") {
            std::thread::sleep(SLOW_DECODE);
        }
        if data.is_empty() || data.starts_with(b"bad") {
            return Err(DecodeError::new("not an image"));
        }
        Ok(DecodedImage {
            width: data.len() as u32,
            height: 1,
            rgba: vec![0; data.len() * 4],
        })
    }
}

/// What a completion callback saw, in a form that can cross a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub finished: bool,
    /// Width of the decoded image on success.
    pub width: Option<u32>,
    /// `FetchError::kind` on failure.
    pub error: Option<&'static str>,
}

impl Outcome {
    fn from_completion(c: &Completion) -> Self {
        match &c.result {
            Ok(img) => Self {
                finished: c.finished,
                width: Some(img.image.width),
                error: None,
            },
            Err(e) => Self {
                finished: c.finished,
                width: None,
                error: Some(e.kind()),
            },
        }
    }
}

pub fn completion_recorder() -> (CompletionCallback, mpsc::UnboundedReceiver<Outcome>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cb: CompletionCallback = Arc::new(move |c: &Completion| {
        let _ = tx.send(Outcome::from_completion(c));
    });
    (cb, rx)
}

pub fn progress_recorder() -> (ProgressCallback, mpsc::UnboundedReceiver<FetchProgress>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cb: ProgressCallback = Arc::new(move |p: &FetchProgress| {
        let _ = tx.send(p.clone());
    });
    (cb, rx)
}

/// Next item from a test channel, failing the test after [`WAIT`].
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a delivery")
        .expect("sender dropped")
}

pub async fn next_event(rx: &mut broadcast::Receiver<FetchEvent>) -> FetchEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Give spawned tasks a moment, then assert nothing arrived.
pub async fn assert_quiet<T>(rx: &mut mpsc::UnboundedReceiver<T>) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "unexpected delivery");
}
