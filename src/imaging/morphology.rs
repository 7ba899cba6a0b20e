//! Binary mask primitives used by the lesion engine.
//!
//! Structuring elements map onto `imageproc` distance norms:
//!
//! | Element | Norm | Radius |
//! |---|---|---|
//! | 3×3 ellipse (a plus-shaped cross at this size) | `L1` | 1 |
//! | 5×5 rectangle | `LInf` | 2 |
//!
//! Pixels outside the image never count as background, so objects touching
//! the border are not eroded by it.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;

/// Set pixels strictly above `threshold` to 255, everything else to 0.
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// 255 wherever `lo <= plane[i] <= hi` holds for all three planes.
pub fn in_range(planes: [&GrayImage; 3], lo: [u8; 3], hi: [u8; 3]) -> GrayImage {
    let (w, h) = planes[0].dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let inside = (0..3).all(|i| {
            let v = planes[i].get_pixel(x, y)[0];
            lo[i] <= v && v <= hi[i]
        });
        Luma([if inside { 255 } else { 0 }])
    })
}

/// Pixel-wise maximum of two masks.
pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].max(b.get_pixel(x, y)[0])])
    })
}

/// Opening (erode, then dilate) with the 3×3 elliptical element.
pub fn open_ellipse3(mask: &GrayImage) -> GrayImage {
    morphology::open(mask, Norm::L1, 1)
}

/// Closing (dilate, then erode) with the 3×3 elliptical element.
pub fn close_ellipse3(mask: &GrayImage) -> GrayImage {
    morphology::close(mask, Norm::L1, 1)
}

/// Morphological gradient (dilation minus erosion) with the 5×5 rectangle.
pub fn gradient_rect5(mask: &GrayImage) -> GrayImage {
    let dilated = morphology::dilate(mask, Norm::LInf, 2);
    let eroded = morphology::erode(mask, Norm::LInf, 2);
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([dilated.get_pixel(x, y)[0].saturating_sub(eroded.get_pixel(x, y)[0])])
    })
}
