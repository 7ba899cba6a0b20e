//! # Fundus Screen
//!
//! Diabetic retinopathy screening for fundus (retinal) photographs. An image
//! is first checked by a validity gate, then staged on the five-point DR
//! scale. Independently, a rule-based segmenter marks candidate lesions.
//!
//! # Architecture: Gate, Stage, Segment
//!
//! ```text
//!                  ┌── validity tensor (224², NCHW) ──→ ValidityGate ──┐
//! FundusImage ─────┤                                                   ├──→ PipelineOutcome
//!                  └── severity tensor (512², NHWC) ──→ SeverityClassifier
//!
//! FundusImage ──→ lesions::segment ──→ LesionMaskSet (5 binary masks)
//! ```
//!
//! The two classifiers are opaque scoring functions behind the
//! [`scoring::Scorer`] trait. They are loaded once into a
//! [`scoring::ScorerSet`] and passed to the [`pipeline::Pipeline`]
//! explicitly, so tests swap in stubs and the CLI loads weights from disk.
//!
//! Segmentation uses no model at all and never touches a scorer.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`fundus`] | Decoded RGB raster with a pixel digest |
//! | [`imaging`] | Tensors, color spaces, morphology |
//! | [`scoring`] | `Scorer` trait, `ScorerSet`, output interpretation, linear-head scorer |
//! | [`gate`] | Retina validity gate and its fixed 0.5 threshold |
//! | [`severity`] | `DrStage` scale and the argmax classifier |
//! | [`pipeline`] | The gate → classify state machine and `DiagnosisRecord` |
//! | [`lesions`] | Rule-based lesion masks, coverage and PNG export |
//! | [`types`] | Serializable summaries shared by the report and the cache |
//! | [`scan`] | Expands CLI inputs into image files |
//! | [`batch`] | Parallel screening and segmentation with progress events |
//! | [`cache`] | Content-addressed result cache |
//! | [`config`] | `config.toml` loading, merging, validation |
//! | [`output`] | CLI output formatting |
//! | [`error`] | `ScreenError` and the offending `ScorerKind` |
//!
//! # Design Decisions
//!
//! ## Rejection Is a Value
//!
//! A photograph that is not a retina is an expected answer, not a failure.
//! [`pipeline::Pipeline::run`] returns `Ok(PipelineOutcome::Rejected { .. })`
//! for it and keeps `Err` for undecodable images and scorer problems. A
//! [`pipeline::DiagnosisRecord`] cannot be constructed outside the accept
//! branch.
//!
//! ## Fixed Policy Constants
//!
//! The acceptance threshold, the normalization constants and every
//! segmentation threshold and kernel are compile-time constants. None of
//! them can be set from `config.toml`; configuration only covers where
//! weights live, how many threads to use, and where output goes.
//!
//! ## Failures Stay Local
//!
//! In batch mode each image is screened on its own. One corrupt file or a
//! scorer error on one image is recorded in the report and the rest of the
//! batch carries on.

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod fundus;
pub mod gate;
pub mod imaging;
pub mod lesions;
pub mod output;
pub mod pipeline;
pub mod scan;
pub mod scoring;
pub mod severity;
pub mod types;

pub use error::{ScorerKind, ScreenError};
pub use fundus::FundusImage;
pub use lesions::{LesionKind, LesionMaskSet, segment};
pub use pipeline::{DiagnosisRecord, Pipeline, PipelineOutcome};
pub use scoring::{Scorer, ScorerSet};
pub use severity::DrStage;

#[cfg(test)]
pub(crate) mod test_helpers;
