//! imgfetch core: a concurrent, deduplicating image fetch scheduler.
//!
//! Submit a [`RequestDescriptor`] to a [`Fetcher`]; requests with the same
//! shape share one transfer, at most `max_concurrent_downloads` transfers run
//! at once, and every caller gets its own progress and completion callbacks
//! plus a [`FetchToken`] to cancel with.

pub mod config;
pub mod decoder;
pub mod error;
pub mod fetcher;
pub mod headers;
pub mod logging;
pub mod request;
pub mod transport;

pub use config::{ExecutionOrder, FetcherConfig};
pub use decoder::{DecodeError, DecodedImage, Decoder, ImageDecoder};
pub use error::FetchError;
pub use fetcher::{
    FetchEvent, FetchToken, Fetcher, FetcherBuilder, FetcherSettings, HeadersFilter,
    OperationState, StopReason,
};
pub use headers::HeaderSet;
pub use request::{Completion, FetchOptions, FetchProgress, FetchedImage, RequestDescriptor};
pub use transport::{Credential, CurlTransport, Transport, TransportError};
