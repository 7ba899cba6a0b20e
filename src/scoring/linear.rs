//! A small, loadable scorer: a linear read-out over channel statistics.
//!
//! Features are the mean and standard deviation of each color channel of the
//! input tensor (`[mean_r, mean_g, mean_b, std_r, std_g, std_b]`). The output
//! is `weights · features + bias`, read as logits.
//!
//! Weights live in a JSON file:
//!
//! ```json
//! {
//!   "input": "validity",
//!   "weights": [[0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
//!               [1.2, -0.4, 0.1, 0.8, 0.3, 0.0]],
//!   "bias": [0.0, -0.5]
//! }
//! ```
//!
//! One row per class: 2 rows for the validity scorer, 5 for severity.

use super::{ScoreScale, Scorer, ScorerError, tensor_kind_for};
use crate::error::{ScorerKind, ScreenError};
use crate::imaging::{NormalizedTensor, TensorKind};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Number of features extracted from a tensor.
pub const FEATURE_COUNT: usize = 6;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WeightsFile {
    input: String,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// Linear classifier head over per-channel tensor statistics.
#[derive(Debug, Clone)]
pub struct LinearHeadScorer {
    input: TensorKind,
    weights: Vec<[f32; FEATURE_COUNT]>,
    bias: Vec<f32>,
    fingerprint: String,
}

impl LinearHeadScorer {
    /// Load weights for the given scorer from a JSON file.
    ///
    /// Any problem with the file (missing, unparsable, wrong shape, wrong
    /// input kind) is reported as [`ScreenError::ScorerUnavailable`].
    pub fn load(path: &Path, scorer: ScorerKind) -> Result<Self, ScreenError> {
        let bytes = std::fs::read(path).map_err(|e| {
            ScreenError::unavailable(scorer, format!("cannot read {}: {e}", path.display()))
        })?;
        let file: WeightsFile = serde_json::from_slice(&bytes).map_err(|e| {
            ScreenError::unavailable(scorer, format!("malformed weights {}: {e}", path.display()))
        })?;

        let expected_input = tensor_kind_for(scorer);
        if file.input != expected_input.as_str() {
            return Err(ScreenError::unavailable(
                scorer,
                format!(
                    "{} expects '{}' input, weights are for '{}'",
                    scorer,
                    expected_input.as_str(),
                    file.input
                ),
            ));
        }

        let fingerprint = format!("{:x}", Sha256::digest(&bytes));
        Self::from_parts(scorer, file.weights, file.bias, fingerprint)
    }

    /// Build a scorer from in-memory weights.
    pub fn from_parts(
        scorer: ScorerKind,
        weights: Vec<Vec<f32>>,
        bias: Vec<f32>,
        fingerprint: String,
    ) -> Result<Self, ScreenError> {
        let classes = scorer.class_count();
        if weights.len() != classes || bias.len() != classes {
            return Err(ScreenError::unavailable(
                scorer,
                format!(
                    "expected {classes} weight rows and biases, got {} and {}",
                    weights.len(),
                    bias.len()
                ),
            ));
        }
        let rows = weights
            .into_iter()
            .map(|row| {
                <[f32; FEATURE_COUNT]>::try_from(row.as_slice()).map_err(|_| {
                    ScreenError::unavailable(
                        scorer,
                        format!(
                            "weight rows need {FEATURE_COUNT} columns, got {}",
                            row.len()
                        ),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let all_finite = rows.iter().flatten().chain(bias.iter()).all(|v| v.is_finite());
        if !all_finite {
            return Err(ScreenError::unavailable(scorer, "weights contain NaN or infinity"));
        }
        Ok(Self {
            input: tensor_kind_for(scorer),
            weights: rows,
            bias,
            fingerprint,
        })
    }
}

/// `[mean_r, mean_g, mean_b, std_r, std_g, std_b]` of a tensor.
pub fn channel_features(tensor: &NormalizedTensor) -> [f32; FEATURE_COUNT] {
    let mut features = [0.0; FEATURE_COUNT];
    for c in 0..3 {
        let plane = tensor.channel(c);
        features[c] = plane.mean().unwrap_or(0.0);
        features[c + 3] = plane.std(0.0);
    }
    features
}

impl Scorer for LinearHeadScorer {
    fn score(&self, tensor: &NormalizedTensor) -> Result<Vec<f32>, ScorerError> {
        if tensor.kind() != self.input {
            return Err(ScorerError(format!(
                "expected a {} tensor, got {}",
                self.input.as_str(),
                tensor.kind().as_str()
            )));
        }
        let features = channel_features(tensor);
        Ok(self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, bias)| {
                row.iter().zip(&features).map(|(w, f)| w * f).sum::<f32>() + bias
            })
            .collect())
    }

    fn scale(&self) -> ScoreScale {
        ScoreScale::Logits
    }

    fn fingerprint(&self) -> Option<String> {
        Some(self.fingerprint.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::normalize;
    use crate::test_helpers::solid_image;
    use tempfile::TempDir;

    fn write_weights(dir: &Path, name: &str, json: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn loads_and_scores_validity_weights() {
        let tmp = TempDir::new().unwrap();
        let path = write_weights(
            tmp.path(),
            "validity.json",
            r#"{"input": "validity",
                "weights": [[0,0,0,0,0,0],[1,0,0,0,0,0]],
                "bias": [0.5, 0.0]}"#,
        );
        let scorer = LinearHeadScorer::load(&path, ScorerKind::Validity).unwrap();
        let tensor = normalize(&solid_image(10, 10, [255, 0, 0]), TensorKind::Validity);
        let out = scorer.score(&tensor).unwrap();
        let red_mean = (1.0 - 0.485) / 0.229;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], 0.5);
        assert!((out[1] - red_mean).abs() < 1e-2);
        assert_eq!(scorer.scale(), ScoreScale::Logits);
    }

    #[test]
    fn fingerprint_is_file_hash() {
        let tmp = TempDir::new().unwrap();
        let json = r#"{"input": "validity", "weights": [[0,0,0,0,0,0],[0,0,0,0,0,0]], "bias": [0,0]}"#;
        let a = write_weights(tmp.path(), "a.json", json);
        let b = write_weights(tmp.path(), "b.json", json);
        let fa = LinearHeadScorer::load(&a, ScorerKind::Validity).unwrap().fingerprint();
        let fb = LinearHeadScorer::load(&b, ScorerKind::Validity).unwrap().fingerprint();
        assert_eq!(fa, fb);
        assert_eq!(fa.unwrap().len(), 64);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = LinearHeadScorer::load(Path::new("/nonexistent/w.json"), ScorerKind::Severity)
            .unwrap_err();
        assert!(matches!(
            err,
            ScreenError::ScorerUnavailable {
                scorer: ScorerKind::Severity,
                ..
            }
        ));
    }

    #[test]
    fn malformed_json_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let path = write_weights(tmp.path(), "bad.json", "{ not json");
        let err = LinearHeadScorer::load(&path, ScorerKind::Validity).unwrap_err();
        assert!(err.to_string().contains("malformed weights"));
    }

    #[test]
    fn wrong_class_count_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let path = write_weights(
            tmp.path(),
            "severity.json",
            r#"{"input": "severity", "weights": [[0,0,0,0,0,0],[0,0,0,0,0,0]], "bias": [0,0]}"#,
        );
        let err = LinearHeadScorer::load(&path, ScorerKind::Severity).unwrap_err();
        assert!(err.to_string().contains("expected 5 weight rows"));
    }

    #[test]
    fn wrong_input_kind_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let path = write_weights(
            tmp.path(),
            "validity.json",
            r#"{"input": "severity", "weights": [[0,0,0,0,0,0],[0,0,0,0,0,0]], "bias": [0,0]}"#,
        );
        let err = LinearHeadScorer::load(&path, ScorerKind::Validity).unwrap_err();
        assert!(err.to_string().contains("expects 'validity' input"));
    }

    #[test]
    fn short_weight_row_is_unavailable() {
        let err = LinearHeadScorer::from_parts(
            ScorerKind::Validity,
            vec![vec![0.0; 6], vec![0.0; 3]],
            vec![0.0, 0.0],
            "x".into(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("6 columns, got 3"));
    }

    #[test]
    fn rejects_tensor_of_other_kind() {
        let scorer = LinearHeadScorer::from_parts(
            ScorerKind::Validity,
            vec![vec![0.0; 6]; 2],
            vec![0.0; 2],
            "x".into(),
        )
        .unwrap();
        let tensor = normalize(&solid_image(4, 4, [1, 2, 3]), TensorKind::Severity);
        assert!(scorer.score(&tensor).is_err());
    }

    #[test]
    fn features_of_solid_image_have_zero_spread() {
        let tensor = normalize(&solid_image(12, 12, [0, 255, 0]), TensorKind::Severity);
        let f = channel_features(&tensor);
        assert_eq!(&f[..3], &[0.0, 1.0, 0.0]);
        assert!(f[3..].iter().all(|s| s.abs() < 1e-6));
    }
}
