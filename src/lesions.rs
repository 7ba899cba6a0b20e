//! Rule-based lesion segmentation.
//!
//! Produces five binary masks from color thresholds and small morphology
//! steps. No model is involved, so the output is a pure function of the
//! pixels:
//!
//! | Kind | Derivation |
//! |---|---|
//! | microaneurysms | red mask, opened with the 3×3 ellipse |
//! | hemorrhages | red mask rebinarized at 127, closed with the 3×3 ellipse |
//! | exudates | Lab `b` above 145 |
//! | cotton_wool | green channel above 180, opened with the 3×3 ellipse |
//! | neovascularization | 5×5 gradient of the red mask, rebinarized at 40 |
//!
//! The red mask is the union of two HSV boxes, one on each side of the hue
//! wraparound (`0..=10` and `170..=180`), both needing saturation and value
//! of at least 50.
//!
//! All thresholds and kernels are fixed. They were tuned by eye on real
//! photographs and have no derivation, so they are constants rather than
//! configuration.

use crate::error::ScreenError;
use crate::fundus::FundusImage;
use crate::imaging::color::{HsvPlanes, channel_plane, hsv_planes, lab_b_plane};
use crate::imaging::coverage_fraction;
use crate::imaging::morphology::{
    binarize, close_ellipse3, gradient_rect5, in_range, open_ellipse3, union,
};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lower HSV corner of the low-hue red box.
pub const RED_LOW_MIN: [u8; 3] = [0, 50, 50];
/// Upper HSV corner of the low-hue red box.
pub const RED_LOW_MAX: [u8; 3] = [10, 255, 255];
/// Lower HSV corner of the high-hue red box.
pub const RED_HIGH_MIN: [u8; 3] = [170, 50, 50];
/// Upper HSV corner of the high-hue red box.
pub const RED_HIGH_MAX: [u8; 3] = [180, 255, 255];

pub const HEMORRHAGE_THRESHOLD: u8 = 127;
pub const EXUDATE_B_THRESHOLD: u8 = 145;
pub const COTTON_WOOL_GREEN_THRESHOLD: u8 = 180;
pub const NEOVASCULAR_THRESHOLD: u8 = 40;

/// The five lesion kinds, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LesionKind {
    Microaneurysms,
    Hemorrhages,
    Exudates,
    CottonWool,
    Neovascularization,
}

impl LesionKind {
    pub const ALL: [LesionKind; 5] = [
        LesionKind::Microaneurysms,
        LesionKind::Hemorrhages,
        LesionKind::Exudates,
        LesionKind::CottonWool,
        LesionKind::Neovascularization,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LesionKind::Microaneurysms => "microaneurysms",
            LesionKind::Hemorrhages => "hemorrhages",
            LesionKind::Exudates => "exudates",
            LesionKind::CottonWool => "cotton_wool",
            LesionKind::Neovascularization => "neovascularization",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LesionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One binary mask per [`LesionKind`], all the size of the source image.
#[derive(Debug, Clone, PartialEq)]
pub struct LesionMaskSet {
    masks: [GrayImage; 5],
}

impl LesionMaskSet {
    pub fn get(&self, kind: LesionKind) -> &GrayImage {
        &self.masks[kind.slot()]
    }

    /// Masks in [`LesionKind::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (LesionKind, &GrayImage)> {
        LesionKind::ALL.into_iter().zip(self.masks.iter())
    }

    /// `(width, height)` shared by every mask.
    pub fn dimensions(&self) -> (u32, u32) {
        self.masks[0].dimensions()
    }

    /// Fraction of the image flagged for `kind`, in `[0, 1]`.
    pub fn coverage(&self, kind: LesionKind) -> f32 {
        let mask = self.get(kind);
        let set = mask.pixels().filter(|p| p[0] == 255).count();
        coverage_fraction(set, mask.len())
    }

    /// Write every mask as `<dir>/<stem>-<kind>.png`. Returns the written paths.
    pub fn save_pngs(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>, ScreenError> {
        std::fs::create_dir_all(dir)?;
        self.iter()
            .map(|(kind, mask)| -> Result<PathBuf, ScreenError> {
                let path = dir.join(format!("{stem}-{kind}.png"));
                mask.save(&path).map_err(|e| match e {
                    image::ImageError::IoError(io) => ScreenError::Io(io),
                    other => ScreenError::Encode(format!("{}: {other}", path.display())),
                })?;
                Ok(path)
            })
            .collect()
    }
}

/// Red-hued, reasonably saturated and bright pixels, across the hue wraparound.
pub fn red_lesion_mask(hsv: &HsvPlanes) -> GrayImage {
    let planes = [&hsv.hue, &hsv.saturation, &hsv.value];
    let low = in_range(planes, RED_LOW_MIN, RED_LOW_MAX);
    let high = in_range(planes, RED_HIGH_MIN, RED_HIGH_MAX);
    union(&low, &high)
}

/// Segment candidate lesions in an image.
pub fn segment(image: &FundusImage) -> LesionMaskSet {
    let rgb = image.pixels();
    let hsv = hsv_planes(rgb);
    let lab_b = lab_b_plane(rgb);

    let red = red_lesion_mask(&hsv);
    let microaneurysms = open_ellipse3(&red);
    let hemorrhages = close_ellipse3(&binarize(&red, HEMORRHAGE_THRESHOLD));
    let exudates = binarize(&lab_b, EXUDATE_B_THRESHOLD);
    let cotton_wool = open_ellipse3(&binarize(&channel_plane(rgb, 1), COTTON_WOOL_GREEN_THRESHOLD));
    let neovascularization = binarize(&gradient_rect5(&red), NEOVASCULAR_THRESHOLD);

    let set = LesionMaskSet {
        masks: [
            microaneurysms,
            hemorrhages,
            exudates,
            cotton_wool,
            neovascularization,
        ],
    };
    for (kind, _) in set.iter() {
        debug!(
            image = %&image.digest()[..12],
            kind = kind.as_str(),
            coverage = set.coverage(kind),
            "lesion mask"
        );
    }
    set
}
