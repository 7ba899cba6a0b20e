//! The input raster every stage works from.
//!
//! A [`FundusImage`] is decoded once, coerced to 8-bit RGB, and never
//! mutated afterwards. Clones share the same pixel buffer, so a
//! [`DiagnosisRecord`](crate::pipeline::DiagnosisRecord) can hold on to its
//! source image without copying it.
//!
//! Each image also carries a SHA-256 digest of its decoded pixels. The digest
//! is what serialized summaries use to refer back to the image, and what the
//! result cache keys on: two files with different container bytes but the same
//! pixels are the same image as far as screening is concerned.

use crate::error::ScreenError;
use image::{DynamicImage, ImageReader, RgbImage};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Image file extensions with decoders compiled in.
const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

/// Returns the file extensions [`FundusImage::open`] can decode.
pub fn supported_input_extensions() -> &'static [&'static str] {
    SUPPORTED_EXTENSIONS
}

/// Whether a path has one of the [supported extensions](supported_input_extensions).
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

/// A decoded, immutable RGB fundus photograph.
#[derive(Debug, Clone)]
pub struct FundusImage {
    pixels: Arc<RgbImage>,
    digest: Arc<str>,
}

impl FundusImage {
    /// Decode an encoded image (JPEG, PNG, TIFF, WebP) and coerce it to RGB8.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScreenError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ScreenError::InvalidImage(format!("unreadable image data: {e}")))?;
        if reader.format().is_none() {
            return Err(ScreenError::InvalidImage(
                "unrecognized image format".to_string(),
            ));
        }
        let decoded = reader
            .decode()
            .map_err(|e| ScreenError::InvalidImage(format!("failed to decode: {e}")))?;
        Self::from_dynamic(decoded)
    }

    /// Read and decode an image file.
    pub fn open(path: &Path) -> Result<Self, ScreenError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes).map_err(|e| match e {
            ScreenError::InvalidImage(reason) => {
                ScreenError::InvalidImage(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }

    /// Wrap an already-decoded raster of any color type.
    pub fn from_dynamic(image: DynamicImage) -> Result<Self, ScreenError> {
        Self::from_rgb(image.into_rgb8())
    }

    pub fn from_rgb(pixels: RgbImage) -> Result<Self, ScreenError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(ScreenError::InvalidImage(format!(
                "image has no pixels ({}x{})",
                pixels.width(),
                pixels.height()
            )));
        }
        let digest = pixel_digest(&pixels);
        Ok(Self {
            pixels: Arc::new(pixels),
            digest: digest.into(),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Hex SHA-256 of the dimensions and raw RGB pixels.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl PartialEq for FundusImage {
    fn eq(&self, other: &Self) -> bool {
        self.dimensions() == other.dimensions() && self.digest == other.digest
    }
}

impl Eq for FundusImage {}

fn pixel_digest(pixels: &RgbImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"rgb8\0");
    hasher.update(pixels.width().to_le_bytes());
    hasher.update(pixels.height().to_le_bytes());
    hasher.update(pixels.as_raw());
    format!("{:x}", hasher.finalize())
}
