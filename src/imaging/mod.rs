//! Pixel-level building blocks in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Resize** | `image::imageops::resize` (Triangle for validity, Lanczos3 for severity) |
//! | **Center crop** | `image::imageops::crop_imm` + [`calculations`] |
//! | **Tensors** | `ndarray::Array4<f32>` |
//! | **HSV / Lab** | `palette`, packed to 8 bits in [`color`] |
//! | **Open / close / gradient** | `imageproc::morphology` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Normalize**: Model input tensors, one per [`TensorKind`]
//! - **Color**: HSV planes and the Lab `b` plane
//! - **Morphology**: Thresholding and structuring-element operations on masks

mod calculations;
pub mod color;
pub mod morphology;
pub mod normalize;

pub use calculations::{calculate_center_crop, coverage_fraction};
pub use normalize::{
    CHANNEL_MEAN, CHANNEL_STD, NormalizedTensor, SEVERITY_SIZE, TensorKind, VALIDITY_SIZE,
    normalize,
};
