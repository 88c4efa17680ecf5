//! Assignment lifecycle state machine.
//!
//! An assignment moves strictly forward through
//! `draft → instructions_saved → modifications_generated → pdf_generated → published`.
//! The suggestion call and the document generation each carry their own
//! sub-status so a failure in one can be retried without regressing the
//! parent assignment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by lifecycle transitions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("Illegal transition from '{from}' to '{to}'")]
    IllegalTransition {
        from: AssignmentStatus,
        to: AssignmentStatus,
    },

    #[error("Instructions text is empty")]
    EmptyInstructions,

    #[error("Suggestion stage is '{0}', expected 'completed'")]
    SuggestionNotCompleted(SuggestionStatus),

    #[error("Document stage is '{0}', expected 'completed'")]
    DocumentNotCompleted(DocumentStatus),

    #[error("The {stage} stage is already '{status}'")]
    StageBusy { stage: &'static str, status: String },

    #[error("Assignment is published; trap records are immutable")]
    AlreadyPublished,

    #[error("Unknown {kind} status '{value}'")]
    UnknownStatus { kind: &'static str, value: String },
}

/// Top-level assignment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Draft,
    InstructionsSaved,
    ModificationsGenerated,
    PdfGenerated,
    Published,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Draft => "draft",
            AssignmentStatus::InstructionsSaved => "instructions_saved",
            AssignmentStatus::ModificationsGenerated => "modifications_generated",
            AssignmentStatus::PdfGenerated => "pdf_generated",
            AssignmentStatus::Published => "published",
        }
    }

    /// The only state this one may advance to.
    pub fn next(&self) -> Option<AssignmentStatus> {
        match self {
            AssignmentStatus::Draft => Some(AssignmentStatus::InstructionsSaved),
            AssignmentStatus::InstructionsSaved => Some(AssignmentStatus::ModificationsGenerated),
            AssignmentStatus::ModificationsGenerated => Some(AssignmentStatus::PdfGenerated),
            AssignmentStatus::PdfGenerated => Some(AssignmentStatus::Published),
            AssignmentStatus::Published => None,
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(AssignmentStatus::Draft),
            "instructions_saved" => Ok(AssignmentStatus::InstructionsSaved),
            "modifications_generated" => Ok(AssignmentStatus::ModificationsGenerated),
            "pdf_generated" => Ok(AssignmentStatus::PdfGenerated),
            "published" => Ok(AssignmentStatus::Published),
            other => Err(LifecycleError::UnknownStatus {
                kind: "assignment",
                value: other.to_string(),
            }),
        }
    }
}

/// Status of the external suggestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SuggestionStatus {
    /// States from which a (re)try may enter `processing`.
    pub const RETRYABLE: [SuggestionStatus; 2] =
        [SuggestionStatus::Pending, SuggestionStatus::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Processing => "processing",
            SuggestionStatus::Completed => "completed",
            SuggestionStatus::Failed => "failed",
        }
    }

    pub fn begin(self) -> Result<Self, LifecycleError> {
        if Self::RETRYABLE.contains(&self) {
            Ok(SuggestionStatus::Processing)
        } else {
            Err(LifecycleError::StageBusy {
                stage: "suggestion",
                status: self.to_string(),
            })
        }
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SuggestionStatus::Pending),
            "processing" => Ok(SuggestionStatus::Processing),
            "completed" => Ok(SuggestionStatus::Completed),
            "failed" => Ok(SuggestionStatus::Failed),
            other => Err(LifecycleError::UnknownStatus {
                kind: "suggestion",
                value: other.to_string(),
            }),
        }
    }
}

/// Status of trap document generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// States from which a (re)try may enter `generating`.
    pub const RETRYABLE: [DocumentStatus; 2] = [DocumentStatus::Pending, DocumentStatus::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Generating => "generating",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn begin(self) -> Result<Self, LifecycleError> {
        if Self::RETRYABLE.contains(&self) {
            Ok(DocumentStatus::Generating)
        } else {
            Err(LifecycleError::StageBusy {
                stage: "document",
                status: self.to_string(),
            })
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "generating" => Ok(DocumentStatus::Generating),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(LifecycleError::UnknownStatus {
                kind: "document",
                value: other.to_string(),
            }),
        }
    }
}

/// The artifacts a parent transition is checked against.
#[derive(Debug, Clone, Copy)]
pub struct StageArtifacts<'a> {
    pub instructions: &'a str,
    pub suggestion: Option<SuggestionStatus>,
    pub document: Option<DocumentStatus>,
}

/// Validates a parent transition `from → to`.
///
/// Only single forward steps are legal, and each requires the artifact of
/// the stage before it.
pub fn check_transition(
    from: AssignmentStatus,
    to: AssignmentStatus,
    artifacts: StageArtifacts<'_>,
) -> Result<(), LifecycleError> {
    if from.next() != Some(to) {
        return Err(LifecycleError::IllegalTransition { from, to });
    }

    match to {
        AssignmentStatus::Draft => Err(LifecycleError::IllegalTransition { from, to }),
        AssignmentStatus::InstructionsSaved => {
            if artifacts.instructions.trim().is_empty() {
                Err(LifecycleError::EmptyInstructions)
            } else {
                Ok(())
            }
        }
        AssignmentStatus::ModificationsGenerated => match artifacts.suggestion {
            Some(SuggestionStatus::Completed) => Ok(()),
            other => Err(LifecycleError::SuggestionNotCompleted(
                other.unwrap_or(SuggestionStatus::Pending),
            )),
        },
        AssignmentStatus::PdfGenerated | AssignmentStatus::Published => {
            match artifacts.document {
                Some(DocumentStatus::Completed) => Ok(()),
                other => Err(LifecycleError::DocumentNotCompleted(
                    other.unwrap_or(DocumentStatus::Pending),
                )),
            }
        }
    }
}
