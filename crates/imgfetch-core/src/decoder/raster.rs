//! Decoder backed by the `image` crate (PNG, JPEG, WebP, GIF).

use image::imageops::FilterType;
use image::DynamicImage;

use super::{DecodeError, DecodedImage, Decoder};

/// Pixel budget for scale-down: 60 MiB of RGBA8.
pub const DEFAULT_MAX_PIXELS: u64 = 60 * 1024 * 1024 / 4;

#[derive(Debug, Clone)]
pub struct ImageDecoder {
    max_pixels: u64,
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self {
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

impl ImageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the pixel budget used when scale-down is requested.
    pub fn with_max_pixels(max_pixels: u64) -> Self {
        Self {
            max_pixels: max_pixels.max(1),
        }
    }
}

impl Decoder for ImageDecoder {
    fn decode(&self, data: &[u8], scale_down: bool) -> Result<DecodedImage, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::new("image data is empty"));
        }
        let mut img = image::load_from_memory(data).map_err(|e| DecodeError::new(e.to_string()))?;
        if scale_down {
            if let Some((w, h)) = scaled_size(img.width(), img.height(), self.max_pixels) {
                tracing::debug!(
                    from_w = img.width(),
                    from_h = img.height(),
                    to_w = w,
                    to_h = h,
                    "scaling down large image"
                );
                img = img.resize_exact(w, h, FilterType::Triangle);
            }
        }
        into_decoded(img)
    }
}

fn into_decoded(img: DynamicImage) -> Result<DecodedImage, DecodeError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(DecodeError::new("decoded image has 0 pixels"));
    }
    let rgba = img.into_rgba8();
    Ok(DecodedImage {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

/// Target size that fits `max_pixels` keeping the aspect ratio, or `None` if
/// the image already fits.
fn scaled_size(width: u32, height: u32, max_pixels: u64) -> Option<(u32, u32)> {
    let pixels = width as u64 * height as u64;
    if pixels <= max_pixels {
        return None;
    }
    let ratio = (max_pixels as f64 / pixels as f64).sqrt();
    let w = ((width as f64 * ratio).floor() as u32).max(1);
    let h = ((height as f64 * ratio).floor() as u32).max(1);
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_png_to_rgba() {
        let decoded = ImageDecoder::new().decode(&png(4, 3), false).unwrap();
        assert_eq!((decoded.width, decoded.height), (4, 3));
        assert_eq!(decoded.rgba.len(), 4 * 3 * 4);
        assert_eq!(&decoded.rgba[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn scale_down_respects_budget() {
        let decoder = ImageDecoder::with_max_pixels(100);
        let decoded = decoder.decode(&png(40, 20), true).unwrap();
        assert!(decoded.pixel_count() <= 100);
        assert!(decoded.width > decoded.height);

        // Without the flag the budget is ignored.
        let full = decoder.decode(&png(40, 20), false).unwrap();
        assert_eq!((full.width, full.height), (40, 20));
    }

    #[test]
    fn rejects_empty_and_truncated_data() {
        let decoder = ImageDecoder::new();
        assert!(decoder.decode(&[], false).is_err());
        let bytes = png(8, 8);
        assert!(decoder.decode(&bytes[..bytes.len() / 3], false).is_err());
    }

    #[test]
    fn scaled_size_keeps_aspect_ratio() {
        assert_eq!(scaled_size(10, 10, 100), None);
        let (w, h) = scaled_size(400, 100, 400).unwrap();
        assert!(w as u64 * h as u64 <= 400);
        assert!((39..=40).contains(&w));
        assert!((9..=10).contains(&h));
    }
}
