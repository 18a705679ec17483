//! Per-run failure ledger entries.

use serde::{Deserialize, Serialize};

use crate::{Field, GenerationReason, PagelensError};

/// Why a stage contributed nothing to the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// A required input was absent or empty at run time.
    Skipped { missing_field: Field },
    /// The generation client failed.
    Generation { reason: GenerationReason },
    /// The generated text did not match the stage's output convention.
    Parse,
    /// The stage wrote outside its declared outputs or read an undeclared
    /// input. Always ends the run.
    Violation,
}

/// One recorded stage failure. Partial results remain valid alongside these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: String,
    #[serde(flatten)]
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    pub fn skipped(stage: impl Into<String>, missing_field: Field) -> Self {
        Self {
            stage: stage.into(),
            kind: FailureKind::Skipped { missing_field },
            message: format!("required field '{missing_field}' is absent or empty"),
        }
    }

    /// Classify a stage error for the ledger.
    ///
    /// Errors that are neither generation nor parse failures are recorded as
    /// `invalid_response` generation failures.
    pub fn from_error(stage: impl Into<String>, err: &PagelensError) -> Self {
        let kind = match err {
            PagelensError::ParseError { .. } => FailureKind::Parse,
            PagelensError::OwnershipViolation { .. } | PagelensError::PipelineDefinition(_) => {
                FailureKind::Violation
            }
            other => FailureKind::Generation {
                reason: other
                    .generation_reason()
                    .unwrap_or(GenerationReason::InvalidResponse),
            },
        };
        Self {
            stage: stage.into(),
            kind,
            message: err.to_string(),
        }
    }

    /// The entry that ends a run: classified by `cause`, with a message
    /// naming the stage.
    pub fn aborted(stage: impl Into<String>, cause: PagelensError) -> Self {
        let stage = stage.into();
        let kind = Self::from_error(stage.as_str(), &cause).kind;
        let message = PagelensError::StageFailed {
            stage: stage.clone(),
            source: Box::new(cause),
        }
        .to_string();
        Self {
            stage,
            kind,
            message,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self.kind, FailureKind::Skipped { .. })
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match &self.kind {
            FailureKind::Skipped { .. } => "skipped",
            FailureKind::Generation { .. } => "generation failed",
            FailureKind::Parse => "parse failed",
            FailureKind::Violation => "contract violation",
        };
        write!(f, "{} ({}): {}", self.stage, label, self.message)
    }
}
