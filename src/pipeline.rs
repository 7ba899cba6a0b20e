//! Two-stage inference: validity gate, then severity staging.
//!
//! ```text
//! START → VALIDATING ─┬─ p < 0.5 ──→ REJECTED
//!                     └─ p ≥ 0.5 ──→ CLASSIFYING → DONE
//! ```
//!
//! Rejection is an expected outcome, not an error, so [`Pipeline::run`]
//! returns a [`PipelineOutcome`] on success and reserves `Err` for real
//! failures (bad image, missing or misbehaving scorer). A
//! [`DiagnosisRecord`] is only ever built on the accept branch, and only
//! once all of its fields are known.
//!
//! The pipeline keeps no state between runs. It borrows a [`ScorerSet`] that
//! the caller loaded once, so one set can serve any number of concurrent
//! runs on different images.

use crate::error::ScreenError;
use crate::fundus::FundusImage;
use crate::gate::{ValidityGate, ValidityResult};
use crate::scoring::ScorerSet;
use crate::severity::{Classification, DrStage, SeverityClassifier};
use std::fmt;
use tracing::debug;

/// Points in a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Validating,
    Rejected,
    Classifying,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Start => "START",
            PipelineState::Validating => "VALIDATING",
            PipelineState::Rejected => "REJECTED",
            PipelineState::Classifying => "CLASSIFYING",
            PipelineState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// A completed diagnosis. Exists only for images that passed the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisRecord {
    stage: DrStage,
    confidence: f32,
    retina_probability: f32,
    source_image: FundusImage,
}

impl DiagnosisRecord {
    /// Bind a classification to its image. Only called once the gate accepted.
    fn new(
        validity: ValidityResult,
        classification: &Classification,
        source_image: FundusImage,
    ) -> Self {
        Self {
            stage: classification.stage,
            confidence: classification.confidence,
            retina_probability: validity.probability_retina,
            source_image,
        }
    }

    pub fn stage(&self) -> DrStage {
        self.stage
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn retina_probability(&self) -> f32 {
        self.retina_probability
    }

    pub fn source_image(&self) -> &FundusImage {
        &self.source_image
    }
}

/// Terminal result of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The image is not a retinal photograph. Carries the probability for display.
    Rejected { retina_probability: f32 },
    /// The image was staged.
    Diagnosed(DiagnosisRecord),
}

impl PipelineOutcome {
    pub fn final_state(&self) -> PipelineState {
        match self {
            PipelineOutcome::Rejected { .. } => PipelineState::Rejected,
            PipelineOutcome::Diagnosed(_) => PipelineState::Done,
        }
    }

    pub fn retina_probability(&self) -> f32 {
        match self {
            PipelineOutcome::Rejected { retina_probability } => *retina_probability,
            PipelineOutcome::Diagnosed(record) => record.retina_probability(),
        }
    }

    pub fn record(&self) -> Option<&DiagnosisRecord> {
        match self {
            PipelineOutcome::Diagnosed(record) => Some(record),
            PipelineOutcome::Rejected { .. } => None,
        }
    }

    pub fn into_record(self) -> Option<DiagnosisRecord> {
        match self {
            PipelineOutcome::Diagnosed(record) => Some(record),
            PipelineOutcome::Rejected { .. } => None,
        }
    }
}

/// Normalizer → gate → classifier, for one image at a time.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    scorers: &'a ScorerSet,
}

impl<'a> Pipeline<'a> {
    pub fn new(scorers: &'a ScorerSet) -> Self {
        Self { scorers }
    }

    pub fn scorers(&self) -> &'a ScorerSet {
        self.scorers
    }

    /// Screen one image.
    pub fn run(&self, image: FundusImage) -> Result<PipelineOutcome, ScreenError> {
        let id = &image.digest()[..12];
        transition(id, PipelineState::Start, PipelineState::Validating);
        let validity = ValidityGate::new(self.scorers).check(&image)?;

        if !validity.is_retina() {
            transition(id, PipelineState::Validating, PipelineState::Rejected);
            return Ok(PipelineOutcome::Rejected {
                retina_probability: validity.probability_retina,
            });
        }

        transition(id, PipelineState::Validating, PipelineState::Classifying);
        let classification = SeverityClassifier::new(self.scorers).classify(&image)?;
        transition(id, PipelineState::Classifying, PipelineState::Done);

        Ok(PipelineOutcome::Diagnosed(DiagnosisRecord::new(
            validity,
            &classification,
            image,
        )))
    }
}

fn transition(image: &str, from: PipelineState, to: PipelineState) {
    debug!(image, %from, %to, "pipeline transition");
}
