//! Request descriptor and the payloads delivered to its callbacks.

use std::fmt;
use std::sync::Arc;

use crate::decoder::DecodedImage;
use crate::error::FetchError;

use super::FetchOptions;

/// Called as bytes arrive. May run on any runtime thread.
pub type ProgressCallback = Arc<dyn Fn(&FetchProgress) + Send + Sync>;

/// Called with partial results (progressive only) and exactly once with `finished = true`.
pub type CompletionCallback = Arc<dyn Fn(&Completion) + Send + Sync>;

/// Progress snapshot for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchProgress {
    /// Body bytes received so far.
    pub received: u64,
    /// Total body size if the server announced it.
    pub expected: Option<u64>,
    pub url: String,
}

impl FetchProgress {
    /// Fraction complete in [0.0, 1.0], or `None` when the size is unknown.
    pub fn fraction(&self) -> Option<f64> {
        match self.expected {
            Some(0) => Some(1.0),
            Some(total) => Some((self.received as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Successful (possibly partial) result: decoded image plus the bytes it came from.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub image: Arc<DecodedImage>,
    pub data: Arc<Vec<u8>>,
}

/// Payload of a completion callback.
#[derive(Debug)]
pub struct Completion {
    pub result: Result<FetchedImage, FetchError>,
    /// False only for progressive partial deliveries.
    pub finished: bool,
}

/// Immutable description of one fetch.
#[derive(Clone)]
pub struct RequestDescriptor {
    pub url: String,
    pub options: FetchOptions,
    pub on_progress: Option<ProgressCallback>,
    pub on_completion: Option<CompletionCallback>,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: FetchOptions::NONE,
            on_progress: None,
            on_completion: None,
        }
    }

    pub fn options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&FetchProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_completion<F>(mut self, f: F) -> Self
    where
        F: Fn(&Completion) + Send + Sync + 'static,
    {
        self.on_completion = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("url", &self.url)
            .field("options", &self.options)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_completion", &self.on_completion.is_some())
            .finish()
    }
}
