//! The external scoring seam.
//!
//! Trained models are opaque to this crate: a [`Scorer`] takes a
//! [`NormalizedTensor`] and returns one number per class. The two scorers the
//! pipeline needs are bundled in a [`ScorerSet`], built once at startup and
//! handed to [`Pipeline`](crate::pipeline::Pipeline) explicitly. There is no
//! global model cache. Tests build a `ScorerSet` from stubs.
//!
//! Raw output is never trusted. [`interpret`] checks the class count, rejects
//! NaN and out-of-range values, and converts logits to probabilities, so the
//! gate and classifier only ever see a proper distribution.

pub mod linear;

use crate::error::{ScorerKind, ScreenError};
use crate::imaging::{NormalizedTensor, TensorKind};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use linear::LinearHeadScorer;

/// Sums further than this from 1.0 are renormalized.
const SUM_TOLERANCE: f32 = 1e-3;

/// What a scorer's raw output vector means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreScale {
    /// Unnormalized log-odds; softmax is applied.
    Logits,
    /// Non-negative values that should already sum to 1.
    Probabilities,
}

/// Failure inside a scorer (weights missing, backend out of memory, ...).
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ScorerError(pub String);

/// An externally supplied classification function.
///
/// Implementations must be pure for a fixed set of weights: the same tensor
/// always yields the same output. They are shared across worker threads, so
/// `score` takes `&self`.
pub trait Scorer: Send + Sync {
    /// Score one tensor, returning one value per class.
    fn score(&self, tensor: &NormalizedTensor) -> Result<Vec<f32>, ScorerError>;

    /// How to read the output of [`score`](Scorer::score).
    fn scale(&self) -> ScoreScale {
        ScoreScale::Probabilities
    }

    /// Stable identifier of the weights, if the scorer has one.
    ///
    /// Results are only cached when both scorers report a fingerprint.
    fn fingerprint(&self) -> Option<String> {
        None
    }
}

/// The tensor layout a scorer consumes.
pub fn tensor_kind_for(scorer: ScorerKind) -> TensorKind {
    match scorer {
        ScorerKind::Validity => TensorKind::Validity,
        ScorerKind::Severity => TensorKind::Severity,
    }
}

/// The validity and severity scorers, loaded once and shared read-only.
#[derive(Clone)]
pub struct ScorerSet {
    validity: Arc<dyn Scorer>,
    severity: Arc<dyn Scorer>,
}

impl ScorerSet {
    pub fn new(validity: Arc<dyn Scorer>, severity: Arc<dyn Scorer>) -> Self {
        Self { validity, severity }
    }

    /// Load both scorers from linear-head weight files.
    pub fn from_files(validity: &Path, severity: &Path) -> Result<Self, ScreenError> {
        let validity = LinearHeadScorer::load(validity, ScorerKind::Validity)?;
        let severity = LinearHeadScorer::load(severity, ScorerKind::Severity)?;
        Ok(Self::new(Arc::new(validity), Arc::new(severity)))
    }

    pub fn get(&self, kind: ScorerKind) -> &dyn Scorer {
        match kind {
            ScorerKind::Validity => self.validity.as_ref(),
            ScorerKind::Severity => self.severity.as_ref(),
        }
    }

    /// Combined fingerprint of both scorers, `None` unless both have one.
    pub fn fingerprint(&self) -> Option<String> {
        let validity = self.validity.fingerprint()?;
        let severity = self.severity.fingerprint()?;
        let mut hasher = Sha256::new();
        hasher.update(b"scorers\0");
        hasher.update(validity.as_bytes());
        hasher.update(b"\0");
        hasher.update(severity.as_bytes());
        Some(format!("{:x}", hasher.finalize()))
    }

    /// Run a scorer on a tensor and validate its output.
    pub(crate) fn run(
        &self,
        kind: ScorerKind,
        tensor: &NormalizedTensor,
    ) -> Result<Vec<f32>, ScreenError> {
        let scorer = self.get(kind);
        let raw = scorer
            .score(tensor)
            .map_err(|e| ScreenError::unavailable(kind, e.to_string()))?;
        interpret(raw, kind, scorer.scale())
    }
}

impl std::fmt::Debug for ScorerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScorerSet")
            .field("validity", &self.validity.fingerprint())
            .field("severity", &self.severity.fingerprint())
            .finish()
    }
}

/// Turn raw scorer output into a probability distribution.
///
/// Fails with [`ScreenError::ScorerOutput`] when the vector has the wrong
/// length, contains non-finite values, or (for probabilities) contains values
/// outside `[0, 1]` or sums to zero. A probability vector whose sum is off by
/// more than [`SUM_TOLERANCE`] is rescaled to sum to 1.
pub fn interpret(
    raw: Vec<f32>,
    scorer: ScorerKind,
    scale: ScoreScale,
) -> Result<Vec<f32>, ScreenError> {
    let expected = scorer.class_count();
    if raw.len() != expected {
        return Err(ScreenError::bad_output(
            scorer,
            format!("expected {expected} values, got {}", raw.len()),
        ));
    }
    if let Some(bad) = raw.iter().find(|v| !v.is_finite()) {
        return Err(ScreenError::bad_output(
            scorer,
            format!("non-finite value {bad}"),
        ));
    }

    match scale {
        ScoreScale::Logits => Ok(softmax(&raw)),
        ScoreScale::Probabilities => {
            if let Some(bad) = raw.iter().find(|v| !(0.0..=1.0).contains(*v)) {
                return Err(ScreenError::bad_output(
                    scorer,
                    format!("probability {bad} outside [0, 1]"),
                ));
            }
            let sum: f32 = raw.iter().sum();
            if sum <= 0.0 {
                return Err(ScreenError::bad_output(
                    scorer,
                    "probabilities sum to zero",
                ));
            }
            if (sum - 1.0).abs() > SUM_TOLERANCE {
                Ok(raw.iter().map(|v| v / sum).collect())
            } else {
                Ok(raw)
            }
        }
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scorer returning a fixed output and counting its calls.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    pub struct StubScorer {
        pub output: Vec<f32>,
        pub scale: ScoreScale,
        pub fingerprint: Option<String>,
        pub seen: Mutex<Vec<TensorKind>>,
    }

    impl StubScorer {
        pub fn probabilities(output: Vec<f32>) -> Self {
            Self {
                output,
                scale: ScoreScale::Probabilities,
                fingerprint: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn logits(output: Vec<f32>) -> Self {
            Self {
                scale: ScoreScale::Logits,
                ..Self::probabilities(output)
            }
        }

        /// Two-class validity stub with the given retina probability.
        pub fn retina(probability: f32) -> Self {
            Self::probabilities(vec![1.0 - probability, probability])
        }

        pub fn with_fingerprint(mut self, fingerprint: &str) -> Self {
            self.fingerprint = Some(fingerprint.to_string());
            self
        }

        pub fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        pub fn seen_kinds(&self) -> Vec<TensorKind> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Scorer for StubScorer {
        fn score(&self, tensor: &NormalizedTensor) -> Result<Vec<f32>, ScorerError> {
            self.seen.lock().unwrap().push(tensor.kind());
            Ok(self.output.clone())
        }

        fn scale(&self) -> ScoreScale {
            self.scale
        }

        fn fingerprint(&self) -> Option<String> {
            self.fingerprint.clone()
        }
    }

    /// Scorer that always fails, as if its weights could not be loaded.
    pub struct FailingScorer;

    impl Scorer for FailingScorer {
        fn score(&self, _tensor: &NormalizedTensor) -> Result<Vec<f32>, ScorerError> {
            Err(ScorerError("weights not loaded".to_string()))
        }
    }

    #[test]
    fn softmax_sums_to_one_and_preserves_order() {
        let p = softmax(&[1.0, 3.0, 2.0]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p[1] > p[2] && p[2] > p[0]);
    }

    #[test]
    fn softmax_handles_large_logits() {
        let p = softmax(&[1000.0, 1000.0]);
        assert_eq!(p, vec![0.5, 0.5]);
    }

    #[test]
    fn interpret_applies_softmax_to_logits() {
        let p = interpret(vec![0.0, 0.0], ScorerKind::Validity, ScoreScale::Logits).unwrap();
        assert_eq!(p, vec![0.5, 0.5]);
    }

    #[test]
    fn interpret_passes_through_exact_probabilities() {
        let p = interpret(
            vec![0.5, 0.5],
            ScorerKind::Validity,
            ScoreScale::Probabilities,
        )
        .unwrap();
        assert_eq!(p, vec![0.5, 0.5]);
    }

    #[test]
    fn interpret_renormalizes_unnormalized_probabilities() {
        let p = interpret(
            vec![0.2, 0.2, 0.2, 0.2, 0.4],
            ScorerKind::Severity,
            ScoreScale::Probabilities,
        )
        .unwrap();
        assert!((p[4] - 0.4 / 1.2).abs() < 1e-6);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn interpret_rejects_wrong_length() {
        let err = interpret(vec![0.5; 4], ScorerKind::Severity, ScoreScale::Probabilities)
            .unwrap_err();
        assert!(matches!(
            err,
            ScreenError::ScorerOutput {
                scorer: ScorerKind::Severity,
                ..
            }
        ));
    }

    #[test]
    fn interpret_rejects_nan_even_for_logits() {
        let err = interpret(vec![0.1, f32::NAN], ScorerKind::Validity, ScoreScale::Logits)
            .unwrap_err();
        assert!(matches!(err, ScreenError::ScorerOutput { .. }));
    }

    #[test]
    fn interpret_rejects_out_of_range_probabilities() {
        for raw in [vec![-0.1, 1.1], vec![1.5, 0.0]] {
            let err = interpret(raw, ScorerKind::Validity, ScoreScale::Probabilities)
                .unwrap_err();
            assert!(matches!(err, ScreenError::ScorerOutput { .. }));
        }
    }

    #[test]
    fn interpret_rejects_all_zero_probabilities() {
        let err = interpret(vec![0.0; 5], ScorerKind::Severity, ScoreScale::Probabilities)
            .unwrap_err();
        assert!(err.to_string().contains("sum to zero"));
    }

    #[test]
    fn failing_scorer_maps_to_unavailable() {
        let set = ScorerSet::new(Arc::new(FailingScorer), Arc::new(FailingScorer));
        let tensor = crate::imaging::normalize(
            &crate::test_helpers::solid_image(8, 8, [0, 0, 0]),
            TensorKind::Validity,
        );
        let err = set.run(ScorerKind::Validity, &tensor).unwrap_err();
        assert!(matches!(
            err,
            ScreenError::ScorerUnavailable {
                scorer: ScorerKind::Validity,
                ..
            }
        ));
    }

    #[test]
    fn fingerprint_requires_both_scorers() {
        let partial = ScorerSet::new(
            Arc::new(StubScorer::retina(0.9).with_fingerprint("a")),
            Arc::new(StubScorer::probabilities(vec![0.2; 5])),
        );
        assert_eq!(partial.fingerprint(), None);

        let full = ScorerSet::new(
            Arc::new(StubScorer::retina(0.9).with_fingerprint("a")),
            Arc::new(StubScorer::probabilities(vec![0.2; 5]).with_fingerprint("b")),
        );
        let swapped = ScorerSet::new(
            Arc::new(StubScorer::retina(0.9).with_fingerprint("b")),
            Arc::new(StubScorer::probabilities(vec![0.2; 5]).with_fingerprint("a")),
        );
        assert!(full.fingerprint().is_some());
        assert_ne!(full.fingerprint(), swapped.fingerprint());
    }
}
