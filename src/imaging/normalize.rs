//! Canonical model inputs.
//!
//! Each scorer expects its own tensor layout, so normalization branches by
//! [`TensorKind`]:
//!
//! | Kind | Geometry | Values | Shape |
//! |---|---|---|---|
//! | [`TensorKind::Validity`] | plain resize to 224×224 (bilinear) | `(x/255 - mean[c]) / std[c]` | `1×3×224×224` (NCHW) |
//! | [`TensorKind::Severity`] | center crop to 1:1, then 512×512 (Lanczos3) | `x/255` | `1×512×512×3` (NHWC) |
//!
//! Both branches are pure functions of the pixel data: the same image and
//! kind always produce bit-identical tensors.

use super::calculations::calculate_center_crop;
use crate::fundus::FundusImage;
use image::imageops::{self, FilterType};
use ndarray::{Array4, ArrayView2, s};

/// Side of the square validity tensor.
pub const VALIDITY_SIZE: u32 = 224;
/// Side of the square severity tensor.
pub const SEVERITY_SIZE: u32 = 512;
/// Per-channel mean subtracted from the validity tensor.
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel standard deviation dividing the validity tensor.
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Which consumer a tensor is shaped for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorKind {
    Validity,
    Severity,
}

impl TensorKind {
    /// Full tensor shape including the leading batch dimension.
    pub fn shape(self) -> [usize; 4] {
        match self {
            TensorKind::Validity => [1, 3, VALIDITY_SIZE as usize, VALIDITY_SIZE as usize],
            TensorKind::Severity => [1, SEVERITY_SIZE as usize, SEVERITY_SIZE as usize, 3],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TensorKind::Validity => "validity",
            TensorKind::Severity => "severity",
        }
    }
}

/// A read-only model input derived from one image.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    kind: TensorKind,
    data: Array4<f32>,
}

impl NormalizedTensor {
    pub fn kind(&self) -> TensorKind {
        self.kind
    }

    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// One color plane as a `height × width` view, whatever the layout.
    ///
    /// # Panics
    /// If `channel` is not 0, 1 or 2.
    pub fn channel(&self, channel: usize) -> ArrayView2<'_, f32> {
        match self.kind {
            TensorKind::Validity => self.data.slice(s![0, channel, .., ..]),
            TensorKind::Severity => self.data.slice(s![0, .., .., channel]),
        }
    }
}

/// Produce the tensor of the given kind for an image.
pub fn normalize(image: &FundusImage, kind: TensorKind) -> NormalizedTensor {
    let data = match kind {
        TensorKind::Validity => validity_tensor(image),
        TensorKind::Severity => severity_tensor(image),
    };
    NormalizedTensor { kind, data }
}

fn validity_tensor(image: &FundusImage) -> Array4<f32> {
    let resized = imageops::resize(
        image.pixels(),
        VALIDITY_SIZE,
        VALIDITY_SIZE,
        FilterType::Triangle,
    );
    let side = VALIDITY_SIZE as usize;
    Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        let value = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
        (value - CHANNEL_MEAN[c]) / CHANNEL_STD[c]
    })
}

fn severity_tensor(image: &FundusImage) -> Array4<f32> {
    let (x, y, w, h) =
        calculate_center_crop(image.dimensions(), (SEVERITY_SIZE, SEVERITY_SIZE));
    let cropped = imageops::crop_imm(image.pixels(), x, y, w, h).to_image();
    let resized = imageops::resize(&cropped, SEVERITY_SIZE, SEVERITY_SIZE, FilterType::Lanczos3);
    let side = SEVERITY_SIZE as usize;
    Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}
