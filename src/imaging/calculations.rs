//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the crop box for an aspect-fit "fill" of a target area.
///
/// Returns the largest region of `source`, centered, whose aspect ratio
/// matches `target`. Resizing that region to `target` fills it completely
/// with no letterboxing; whatever falls outside the box is discarded.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `target` - Target area dimensions (width, height)
///
/// # Returns
/// * `(x, y, width, height)` - Crop box in source pixel coordinates
pub fn calculate_center_crop(source: (u32, u32), target: (u32, u32)) -> (u32, u32, u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: keep full height, trim left and right
        let w = ((src_h as f64 * tgt_aspect).round() as u32).clamp(1, src_w);
        ((src_w - w) / 2, 0, w, src_h)
    } else {
        // Source is taller (or equal): keep full width, trim top and bottom
        let h = ((src_w as f64 / tgt_aspect).round() as u32).clamp(1, src_h);
        (0, (src_h - h) / 2, src_w, h)
    }
}

/// Fraction of `set` out of `total`, 0.0 when `total` is zero.
pub fn coverage_fraction(set: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        (set as f64 / total as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // calculate_center_crop tests
    // =========================================================================

    #[test]
    fn crop_square_source_is_identity() {
        assert_eq!(calculate_center_crop((800, 800), (512, 512)), (0, 0, 800, 800));
    }

    #[test]
    fn crop_landscape_trims_sides() {
        // 1200x800 → 800x800 box, 200px trimmed each side
        assert_eq!(
            calculate_center_crop((1200, 800), (512, 512)),
            (200, 0, 800, 800)
        );
    }

    #[test]
    fn crop_portrait_trims_top_and_bottom() {
        // 600x1000 → 600x600 box, 200px trimmed top and bottom
        assert_eq!(
            calculate_center_crop((600, 1000), (512, 512)),
            (0, 200, 600, 600)
        );
    }

    #[test]
    fn crop_odd_difference_biases_left() {
        // 101x100 → 100x100, one spare column goes to the right
        assert_eq!(calculate_center_crop((101, 100), (512, 512)), (0, 0, 100, 100));
    }

    #[test]
    fn crop_non_square_target() {
        // 1000x1000 into 2:1 → 1000x500 centered vertically
        assert_eq!(
            calculate_center_crop((1000, 1000), (200, 100)),
            (0, 250, 1000, 500)
        );
    }

    #[test]
    fn crop_extreme_aspect_never_collapses() {
        let (_, _, w, h) = calculate_center_crop((1, 5000), (512, 512));
        assert_eq!((w, h), (1, 1));
    }

    #[test]
    fn coverage_of_empty_total_is_zero() {
        assert_eq!(coverage_fraction(0, 0), 0.0);
        assert_eq!(coverage_fraction(25, 100), 0.25);
    }
}
