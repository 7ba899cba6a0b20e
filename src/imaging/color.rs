//! 8-bit color space encodings.
//!
//! The conversions themselves come from `palette` (sRGB, D65). This module
//! only packs the results into the common 8-bit encodings found in
//! computer-vision tooling, so thresholds tuned on those encodings carry
//! over unchanged:
//!
//! - **HSV**: hue on a 0–180 scale (degrees / 2), saturation and value on 0–255.
//! - **Lab**: `L * 255 / 100`, `a + 128`, `b + 128`.

use image::{GrayImage, Luma, RgbImage};
use palette::{Hsv, IntoColor, Lab, Srgb};

/// Hue, saturation and value planes of an image.
#[derive(Debug, Clone)]
pub struct HsvPlanes {
    pub hue: GrayImage,
    pub saturation: GrayImage,
    pub value: GrayImage,
}

fn srgb([r, g, b]: [u8; 3]) -> Srgb<f32> {
    Srgb::new(r, g, b).into_format::<f32>()
}

/// Convert one RGB pixel to `[h, s, v]` with `h` in `0..=180`.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let hsv: Hsv = srgb(rgb).into_color();
    let degrees = hsv.hue.into_positive_degrees();
    [
        (degrees / 2.0).round().min(180.0) as u8,
        to_u8(hsv.saturation * 255.0),
        to_u8(hsv.value * 255.0),
    ]
}

/// Convert one RGB pixel to 8-bit `[L, a, b]`.
pub fn rgb_to_lab(rgb: [u8; 3]) -> [u8; 3] {
    let lab: Lab = srgb(rgb).into_color();
    [
        to_u8(lab.l * 255.0 / 100.0),
        to_u8(lab.a + 128.0),
        to_u8(lab.b + 128.0),
    ]
}

/// Split an RGB raster into HSV planes.
pub fn hsv_planes(image: &RgbImage) -> HsvPlanes {
    let (w, h) = image.dimensions();
    let mut planes = HsvPlanes {
        hue: GrayImage::new(w, h),
        saturation: GrayImage::new(w, h),
        value: GrayImage::new(w, h),
    };
    for (x, y, p) in image.enumerate_pixels() {
        let [hh, s, v] = rgb_to_hsv(p.0);
        planes.hue.put_pixel(x, y, Luma([hh]));
        planes.saturation.put_pixel(x, y, Luma([s]));
        planes.value.put_pixel(x, y, Luma([v]));
    }
    planes
}

/// The blue–yellow Lab plane of an image, 128 = neutral, larger is yellower.
pub fn lab_b_plane(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([rgb_to_lab(image.get_pixel(x, y).0)[2]])
    })
}

/// Extract a single RGB channel (0 = red, 1 = green, 2 = blue).
pub fn channel_plane(image: &RgbImage, channel: usize) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[channel]])
    })
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
