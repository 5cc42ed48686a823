//! Start/stop notifications for operations, delivered over a broadcast channel.

/// Why an executing operation stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    /// Carries [`crate::FetchError::kind`].
    Failed(&'static str),
    Cancelled,
}

/// Emitted once when an operation starts executing and once when it stops.
/// Operations cancelled or failed before they started emit nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    Started { url: String },
    Stopped { url: String, reason: StopReason },
}

impl FetchEvent {
    pub fn url(&self) -> &str {
        match self {
            FetchEvent::Started { url } | FetchEvent::Stopped { url, .. } => url,
        }
    }
}
