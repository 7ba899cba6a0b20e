//! Retina validity gate.
//!
//! Decides whether an image is a genuine fundus photograph before any
//! staging happens. The acceptance threshold is a fixed policy constant: it
//! defines where the pipeline exits early, so callers cannot move it.

use crate::error::{ScorerKind, ScreenError};
use crate::fundus::FundusImage;
use crate::imaging::{TensorKind, normalize};
use crate::scoring::ScorerSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Minimum retina probability for an image to be staged. Inclusive.
pub const RETINA_THRESHOLD: f32 = 0.5;

/// Index of the "is retina" class in the validity scorer's output.
const RETINA_CLASS: usize = 1;

/// Probability that an image is a retinal photograph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidityResult {
    pub probability_retina: f32,
}

impl ValidityResult {
    /// Whether the image clears [`RETINA_THRESHOLD`].
    pub fn is_retina(&self) -> bool {
        self.probability_retina >= RETINA_THRESHOLD
    }
}

/// Binary retina / non-retina check backed by the validity scorer.
#[derive(Debug, Clone, Copy)]
pub struct ValidityGate<'a> {
    scorers: &'a ScorerSet,
}

impl<'a> ValidityGate<'a> {
    pub fn new(scorers: &'a ScorerSet) -> Self {
        Self { scorers }
    }

    /// Score an image. Has no effect beyond invoking the validity scorer.
    pub fn check(&self, image: &FundusImage) -> Result<ValidityResult, ScreenError> {
        let tensor = normalize(image, TensorKind::Validity);
        let probabilities = self.scorers.run(ScorerKind::Validity, &tensor)?;
        let probability_retina = probabilities[RETINA_CLASS];
        debug!(
            image = %&image.digest()[..12],
            probability_retina,
            "validity scored"
        );
        Ok(ValidityResult { probability_retina })
    }
}
