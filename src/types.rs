//! Serializable results shared by the batch runner, the cache and the report.
//!
//! A [`DiagnosisRecord`] holds the decoded image itself. Outside the process
//! that is replaced by an [`ImageReference`]: the pixel digest and dimensions
//! identify the image losslessly, and the path is kept as a convenience.

use crate::fundus::FundusImage;
use crate::pipeline::{DiagnosisRecord, PipelineOutcome};
use crate::severity::DrStage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Points back at a screened image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// [`FundusImage::digest`] of the decoded pixels.
    pub sha256: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ImageReference {
    pub fn new(image: &FundusImage, path: Option<&Path>) -> Self {
        Self {
            sha256: image.digest().to_string(),
            width: image.width(),
            height: image.height(),
            path: path.map(Path::to_path_buf),
        }
    }

    /// Whether `image` is the image this reference was taken from.
    pub fn matches(&self, image: &FundusImage) -> bool {
        self.sha256 == image.digest() && (self.width, self.height) == image.dimensions()
    }
}

/// A [`DiagnosisRecord`] in plain-data form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisSummary {
    pub stage: DrStage,
    pub stage_label: String,
    pub confidence: f32,
    pub retina_probability: f32,
    pub image: ImageReference,
}

impl DiagnosisSummary {
    pub fn from_record(record: &DiagnosisRecord, path: Option<&Path>) -> Self {
        Self {
            stage: record.stage(),
            stage_label: record.stage().label().to_string(),
            confidence: record.confidence(),
            retina_probability: record.retina_probability(),
            image: ImageReference::new(record.source_image(), path),
        }
    }
}

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScreeningSummary {
    /// Not a retinal photograph.
    Rejected {
        retina_probability: f32,
        image: ImageReference,
    },
    Diagnosed(DiagnosisSummary),
    /// Decoding or scoring failed. Only the path is known.
    Failed { path: PathBuf, error: String },
}

impl ScreeningSummary {
    /// Summarize a pipeline outcome for `image`, read from `path`.
    pub fn from_outcome(outcome: &PipelineOutcome, image: &FundusImage, path: Option<&Path>) -> Self {
        match outcome {
            PipelineOutcome::Rejected { retina_probability } => ScreeningSummary::Rejected {
                retina_probability: *retina_probability,
                image: ImageReference::new(image, path),
            },
            PipelineOutcome::Diagnosed(record) => {
                ScreeningSummary::Diagnosed(DiagnosisSummary::from_record(record, path))
            }
        }
    }

    pub fn failed(path: &Path, error: impl ToString) -> Self {
        ScreeningSummary::Failed {
            path: path.to_path_buf(),
            error: error.to_string(),
        }
    }

    pub fn image(&self) -> Option<&ImageReference> {
        match self {
            ScreeningSummary::Rejected { image, .. } => Some(image),
            ScreeningSummary::Diagnosed(summary) => Some(&summary.image),
            ScreeningSummary::Failed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ScreeningSummary::Failed { .. })
    }

    /// The same summary pointing at a different file with identical pixels.
    pub fn with_path(mut self, path: &Path) -> Self {
        match &mut self {
            ScreeningSummary::Rejected { image, .. } => image.path = Some(path.to_path_buf()),
            ScreeningSummary::Diagnosed(summary) => summary.image.path = Some(path.to_path_buf()),
            ScreeningSummary::Failed { path: p, .. } => *p = path.to_path_buf(),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::scoring::ScorerSet;
    use crate::scoring::tests::StubScorer;
    use crate::test_helpers::{fundus_like, solid_image};
    use std::sync::Arc;

    fn diagnosed(image: &FundusImage) -> PipelineOutcome {
        let scorers = ScorerSet::new(
            Arc::new(StubScorer::retina(0.875)),
            Arc::new(StubScorer::probabilities(vec![0.1, 0.1, 0.1, 0.6, 0.1])),
        );
        Pipeline::new(&scorers).run(image.clone()).unwrap()
    }

    #[test]
    fn diagnosis_round_trips_through_json() {
        let image = fundus_like(64, 48);
        let summary = ScreeningSummary::from_outcome(
            &diagnosed(&image),
            &image,
            Some(Path::new("eyes/left.png")),
        );
        let json = serde_json::to_string(&summary).unwrap();
        let back: ScreeningSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);

        let ScreeningSummary::Diagnosed(d) = back else {
            panic!("expected a diagnosis");
        };
        assert_eq!(d.stage, DrStage::Severe);
        assert_eq!(d.stage_label, "Severe DR");
        assert_eq!(d.confidence, 0.6);
        assert_eq!(d.retina_probability, 0.875);
        assert!(d.image.matches(&image));
    }

    #[test]
    fn outcome_tag_is_snake_case() {
        let image = solid_image(8, 8, [0, 0, 0]);
        let rejected = ScreeningSummary::from_outcome(
            &PipelineOutcome::Rejected {
                retina_probability: 0.25,
            },
            &image,
            None,
        );
        let value = serde_json::to_value(&rejected).unwrap();
        assert_eq!(value["outcome"], "rejected");
        assert_eq!(value["retina_probability"], 0.25);
        assert!(value["image"].get("path").is_none());

        let failed = ScreeningSummary::failed(Path::new("x.jpg"), "truncated");
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["error"], "truncated");
    }

    #[test]
    fn stage_is_stored_as_index() {
        let image = fundus_like(32, 32);
        let summary = ScreeningSummary::from_outcome(&diagnosed(&image), &image, None);
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["stage"], 3);
    }

    #[test]
    fn reference_matches_only_same_pixels() {
        let a = solid_image(10, 10, [1, 2, 3]);
        let b = solid_image(10, 10, [1, 2, 4]);
        let reference = ImageReference::new(&a, None);
        assert!(reference.matches(&a));
        assert!(!reference.matches(&b));
    }

    #[test]
    fn with_path_rewrites_reference() {
        let image = fundus_like(32, 32);
        let summary = ScreeningSummary::from_outcome(&diagnosed(&image), &image, Some(Path::new("a.png")))
            .with_path(Path::new("b.png"));
        assert_eq!(summary.image().unwrap().path.as_deref(), Some(Path::new("b.png")));
    }
}
