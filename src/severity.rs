//! Diabetic retinopathy staging.
//!
//! [`DrStage`] is the fixed five-step ordinal scale. Its descriptive metadata
//! (label, indicator color, typical finding, follow-up note) exists for
//! presentation and reports; the classifier never reads it.
//!
//! [`SeverityClassifier::classify`] takes the arg-max of the severity
//! scorer's distribution. Exact ties resolve to the lowest index, i.e. the
//! less severe stage.

use crate::error::{ScorerKind, ScreenError};
use crate::fundus::FundusImage;
use crate::imaging::{TensorKind, normalize};
use crate::scoring::ScorerSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Ordinal DR severity, 0 (none) through 4 (proliferative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum DrStage {
    NoDr = 0,
    Mild = 1,
    Moderate = 2,
    Severe = 3,
    Proliferative = 4,
}

impl DrStage {
    /// All stages in ordinal order.
    pub const ALL: [DrStage; 5] = [
        DrStage::NoDr,
        DrStage::Mild,
        DrStage::Moderate,
        DrStage::Severe,
        DrStage::Proliferative,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            DrStage::NoDr => "No Diabetic Retinopathy",
            DrStage::Mild => "Mild DR",
            DrStage::Moderate => "Moderate DR",
            DrStage::Severe => "Severe DR",
            DrStage::Proliferative => "Proliferative DR",
        }
    }

    /// Hex color used to flag the stage in displays.
    pub fn indicator_color(self) -> &'static str {
        match self {
            DrStage::NoDr => "#4CAF50",
            DrStage::Mild => "#FFC107",
            DrStage::Moderate => "#FF9800",
            DrStage::Severe => "#F44336",
            DrStage::Proliferative => "#D32F2F",
        }
    }

    /// The finding most characteristic of the stage.
    pub fn typical_finding(self) -> &'static str {
        match self {
            DrStage::NoDr => "No abnormalities detected",
            DrStage::Mild => "Microaneurysms present",
            DrStage::Moderate => "Multiple hemorrhages",
            DrStage::Severe => "Retinal lesions",
            DrStage::Proliferative => "Neovascularization",
        }
    }

    /// Follow-up and urgency note.
    pub fn follow_up(self) -> &'static str {
        match self {
            DrStage::NoDr => {
                "Recommend annual retinal screening. Maintain good glycemic control (HbA1c < 7%). \
                 Regular monitoring of blood pressure and lipid profile."
            }
            DrStage::Mild => {
                "6-month follow-up recommended. Optimize blood glucose management. \
                 Consider focal laser therapy if microaneurysms progress."
            }
            DrStage::Moderate => {
                "3-month ophthalmologist review required. Evaluate for macular edema. \
                 Anti-VEGF therapy may be indicated."
            }
            DrStage::Severe => {
                "Urgent referral to retinal specialist. Pan-retinal photocoagulation likely needed. \
                 Monitor for vitreous hemorrhage."
            }
            DrStage::Proliferative => {
                "Emergency intervention required. High risk of vision loss. \
                 Vitrectomy may be necessary. Intensive glycemic control critical."
            }
        }
    }

    /// Whether the stage calls for specialist referral rather than routine follow-up.
    pub fn is_urgent(self) -> bool {
        self >= DrStage::Severe
    }
}

impl fmt::Display for DrStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Stage {})", self.label(), self.index())
    }
}

impl From<DrStage> for u8 {
    fn from(stage: DrStage) -> u8 {
        stage.index()
    }
}

impl TryFrom<u8> for DrStage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        DrStage::from_index(value as usize).ok_or_else(|| format!("no DR stage {value}"))
    }
}

/// Result of staging one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub stage: DrStage,
    /// Probability of the chosen stage.
    pub confidence: f32,
    /// Full distribution over the five stages.
    pub distribution: [f32; 5],
}

/// Index and value of the maximum; the first index wins exact ties.
pub fn argmax_lowest(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

/// Five-way stage classifier backed by the severity scorer.
#[derive(Debug, Clone, Copy)]
pub struct SeverityClassifier<'a> {
    scorers: &'a ScorerSet,
}

impl<'a> SeverityClassifier<'a> {
    pub fn new(scorers: &'a ScorerSet) -> Self {
        Self { scorers }
    }

    pub fn classify(&self, image: &FundusImage) -> Result<Classification, ScreenError> {
        let tensor = normalize(image, TensorKind::Severity);
        let probabilities = self.scorers.run(ScorerKind::Severity, &tensor)?;
        classification_from(&probabilities)
    }
}

/// Build a [`Classification`] from a validated five-value distribution.
pub(crate) fn classification_from(probabilities: &[f32]) -> Result<Classification, ScreenError> {
    let distribution: [f32; 5] = probabilities.try_into().map_err(|_| {
        ScreenError::bad_output(
            ScorerKind::Severity,
            format!("expected 5 values, got {}", probabilities.len()),
        )
    })?;
    let (index, confidence) = argmax_lowest(&distribution)
        .ok_or_else(|| ScreenError::bad_output(ScorerKind::Severity, "empty output"))?;
    let stage = DrStage::from_index(index)
        .ok_or_else(|| ScreenError::bad_output(ScorerKind::Severity, "stage out of range"))?;
    debug!(stage = stage.index(), confidence, "severity classified");
    Ok(Classification {
        stage,
        confidence,
        distribution,
    })
}
