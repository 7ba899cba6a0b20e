//! Error kinds surfaced by the screening core.
//!
//! Every failure reaches the immediate caller with its kind and, for scorer
//! failures, the stage that produced it. Nothing here is retried internally:
//! whether to resubmit an image is the caller's decision.

use std::fmt;
use thiserror::Error;

/// Which external scorer a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScorerKind {
    /// Binary retina / non-retina scorer.
    Validity,
    /// Five-way severity scorer.
    Severity,
}

impl ScorerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScorerKind::Validity => "validity",
            ScorerKind::Severity => "severity",
        }
    }

    /// Number of classes the scorer must emit.
    pub fn class_count(self) -> usize {
        match self {
            ScorerKind::Validity => 2,
            ScorerKind::Severity => 5,
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("{scorer} scorer unavailable: {reason}")]
    ScorerUnavailable { scorer: ScorerKind, reason: String },
    #[error("{scorer} scorer returned unusable output: {reason}")]
    ScorerOutput { scorer: ScorerKind, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding failed: {0}")]
    Encode(String),
}

impl ScreenError {
    /// The scorer involved, if this is a scorer failure.
    pub fn scorer(&self) -> Option<ScorerKind> {
        match self {
            ScreenError::ScorerUnavailable { scorer, .. }
            | ScreenError::ScorerOutput { scorer, .. } => Some(*scorer),
            _ => None,
        }
    }

    pub(crate) fn unavailable(scorer: ScorerKind, reason: impl Into<String>) -> Self {
        ScreenError::ScorerUnavailable {
            scorer,
            reason: reason.into(),
        }
    }

    pub(crate) fn bad_output(scorer: ScorerKind, reason: impl Into<String>) -> Self {
        ScreenError::ScorerOutput {
            scorer,
            reason: reason.into(),
        }
    }
}
