//! Image decoding capability.
//!
//! The scheduler hands downloaded bytes to an injected [`Decoder`]; decoding
//! runs on the blocking pool. [`ImageDecoder`] is the default implementation.

mod raster;

pub use raster::{ImageDecoder, DEFAULT_MAX_PIXELS};

/// A decoded bitmap in RGBA8 layout (`width * height * 4` bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Decoder rejected the bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DecodeError {
    pub message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Turns raw response bytes into an image. Called with partial data during
/// progressive downloads, so implementations must tolerate truncated input
/// by returning an error rather than panicking.
pub trait Decoder: Send + Sync {
    fn decode(&self, data: &[u8], scale_down: bool) -> Result<DecodedImage, DecodeError>;
}
