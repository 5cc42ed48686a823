//! Error types surfaced to completion callbacks.

use std::time::Duration;

use crate::decoder::DecodeError;
use crate::transport::TransportError;

/// Why a fetch did not produce an image.
///
/// Every variant reaches callers through their completion callback with
/// `finished = true`; the scheduler never returns these across `submit`.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The URL was empty or could not be parsed. No operation was created.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The transport reported a network or HTTP failure.
    #[error("transport failure: {0}")]
    Transport(#[source] TransportError),
    /// The per-operation deadline elapsed before the transfer finished.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// The decoder rejected the downloaded bytes.
    #[error("decode failure: {0}")]
    Decode(#[from] DecodeError),
    /// The transfer was aborted underneath registrations that were still attached.
    #[error("download cancelled")]
    Cancelled,
}

impl FetchError {
    /// Short stable name, used in log fields and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidRequest(_) => "invalid_request",
            FetchError::Transport(_) => "transport",
            FetchError::Timeout(_) => "timeout",
            FetchError::Decode(_) => "decode",
            FetchError::Cancelled => "cancelled",
        }
    }
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Aborted => FetchError::Cancelled,
            other => FetchError::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_transport_maps_to_cancelled() {
        let e: FetchError = TransportError::Aborted.into();
        assert!(matches!(e, FetchError::Cancelled));
        let e: FetchError = TransportError::Http(404).into();
        assert_eq!(e.kind(), "transport");
        assert!(e.to_string().contains("HTTP 404"));
    }

    #[test]
    fn timeout_message_includes_duration() {
        let e = FetchError::Timeout(Duration::from_secs(15));
        assert_eq!(e.kind(), "timeout");
        assert!(e.to_string().contains("15s"));
    }
}
