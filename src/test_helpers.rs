//! Shared test utilities for the fundus-screen test suite.
//!
//! Synthetic rasters stand in for real fundus photographs: the algorithms
//! under test are deterministic functions of pixel values, so a handful of
//! hand-built images cover the interesting cases.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let image = fundus_like(96, 80);
//! let masks = segment(&image);
//! assert_binary_mask(masks.get(LesionKind::Exudates));
//! ```

use crate::fundus::FundusImage;
use image::{GrayImage, ImageEncoder, Rgb, RgbImage};

// =========================================================================
// Raster builders
// =========================================================================

/// A single-color RGB raster.
pub fn solid_rgb(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(rgb))
}

/// A single-color [`FundusImage`].
pub fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> FundusImage {
    FundusImage::from_rgb(solid_rgb(width, height, rgb)).unwrap()
}

/// Rough imitation of a fundus photograph: black surround, orange disc,
/// a bright yellow optic disc, a dark red blot and a pale spot.
///
/// Contains every feature the lesion engine reacts to, so all five masks
/// have something to work with.
pub fn fundus_like(width: u32, height: u32) -> FundusImage {
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let radius = width.min(height) as f32 * 0.45;
    let raster = RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let r = (dx * dx + dy * dy).sqrt();
        if r > radius {
            return Rgb([0, 0, 0]);
        }
        // optic disc, right of center
        let odx = x as f32 - (cx + radius * 0.5);
        if (odx * odx + dy * dy).sqrt() < radius * 0.15 {
            return Rgb([250, 230, 60]);
        }
        // blot hemorrhage, left of center
        let hdx = x as f32 - (cx - radius * 0.4);
        let hdy = y as f32 - (cy - radius * 0.2);
        if (hdx * hdx + hdy * hdy).sqrt() < radius * 0.12 {
            return Rgb([150, 10, 12]);
        }
        // pale cotton-wool-like patch below center
        let cdy = y as f32 - (cy + radius * 0.45);
        if (dx * dx + cdy * cdy).sqrt() < radius * 0.1 {
            return Rgb([235, 235, 225]);
        }
        Rgb([205, 110, 40])
    });
    FundusImage::from_rgb(raster).unwrap()
}

/// Smooth gradient with no saturated reds, no yellows and nothing bright:
/// every channel stays between 60 and 120 with red never dominant.
pub fn featureless(width: u32, height: u32) -> FundusImage {
    let raster = RgbImage::from_fn(width, height, |x, y| {
        let v = 60 + ((x + y) % 40) as u8;
        Rgb([v, v + 10, v + 20])
    });
    FundusImage::from_rgb(raster).unwrap()
}

// =========================================================================
// Encoders
// =========================================================================

/// Encode an RGB raster as PNG bytes.
pub fn encode_png(raster: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut bytes)
        .write_image(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
    bytes
}

// =========================================================================
// Assertions
// =========================================================================

/// Assert every pixel of a mask is either 0 or 255.
pub fn assert_binary_mask(mask: &GrayImage) {
    if let Some((x, y, p)) = mask.enumerate_pixels().find(|(_, _, p)| p[0] != 0 && p[0] != 255) {
        panic!("mask pixel ({x}, {y}) = {} is not binary", p[0]);
    }
}

/// Number of foreground (255) pixels in a mask.
pub fn count_set(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p[0] == 255).count()
}
