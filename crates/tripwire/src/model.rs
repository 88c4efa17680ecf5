//! Persisted records shared by the pipeline stages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::FlagDecision;
use crate::interview::Verdict;
use crate::lifecycle::{AssignmentStatus, DocumentStatus, SuggestionStatus};

/// Lexical class of a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationKind {
    Number,
    Word,
    Phrase,
    Character,
    Punctuation,
}

impl ModificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModificationKind::Number => "number",
            ModificationKind::Word => "word",
            ModificationKind::Phrase => "phrase",
            ModificationKind::Character => "character",
            ModificationKind::Punctuation => "punctuation",
        }
    }
}

impl fmt::Display for ModificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" => Ok(ModificationKind::Number),
            "word" => Ok(ModificationKind::Word),
            "phrase" => Ok(ModificationKind::Phrase),
            "character" => Ok(ModificationKind::Character),
            "punctuation" => Ok(ModificationKind::Punctuation),
            other => Err(format!("unknown modification kind '{}'", other)),
        }
    }
}

/// One trap: a span of the original text and what extraction yields instead.
///
/// `start_index`/`end_index` are Unicode scalar offsets into the original
/// text, half-open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modification {
    pub original_text: String,
    pub modified_text: String,
    pub start_index: usize,
    pub end_index: usize,
    /// 1-based page of the trap document the span starts on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub kind: ModificationKind,
    /// The suggested line that produced this trap, kept for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Modification {
    pub fn span_len(&self) -> usize {
        self.end_index - self.start_index
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub course_id: String,
    pub instructor_id: String,
    pub title: String,
    pub instructions: String,
    pub due_date: DateTime<Utc>,
    pub max_score: u32,
    pub is_published: bool,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an assignment in `draft`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    pub course_id: String,
    pub instructor_id: String,
    pub title: String,
    pub due_date: DateTime<Utc>,
    #[serde(default = "default_max_score")]
    pub max_score: u32,
}

fn default_max_score() -> u32 {
    100
}

/// The generated trap set and document for one assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrapDocumentRecord {
    pub assignment_id: String,
    /// Full text returned by the suggestion service.
    pub suggested_text: Option<String>,
    pub modifications: Vec<Modification>,
    pub document_handle: Option<String>,
    pub content_hash: Option<String>,
    pub page_count: Option<u32>,
    pub suggestion_status: SuggestionStatus,
    pub document_status: DocumentStatus,
    pub last_error: Option<String>,
    /// When the running `processing`/`generating` stage was entered.
    pub stage_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrapDocumentRecord {
    pub fn new(assignment_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            assignment_id: assignment_id.to_string(),
            suggested_text: None,
            modifications: Vec::new(),
            document_handle: None,
            content_hash: None,
            page_count: None,
            suggestion_status: SuggestionStatus::Pending,
            document_status: DocumentStatus::Pending,
            last_error: None,
            stage_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a stage is running and still inside its lease. A stage left
    /// in `processing`/`generating` past the lease was abandoned by a
    /// dropped request or a crash and may be taken over.
    pub fn stage_running(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        let running = self.suggestion_status == SuggestionStatus::Processing
            || self.document_status == DocumentStatus::Generating;
        running
            && self
                .stage_started_at
                .map_or(true, |started| now.signed_duration_since(started) <= lease)
    }

    /// No traps could be generated; detection will always score 0.
    pub fn has_traps(&self) -> bool {
        !self.modifications.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub file_handle: Option<String>,
    pub file_hash: Option<String>,
    pub extracted_text: Option<String>,
    pub text_extracted: bool,
    pub score: Option<f64>,
    pub decision: FlagDecision,
    pub interview_id: Option<String>,
    pub verdict: Option<Verdict>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn is_flagged(&self) -> bool {
        self.decision.is_flagged()
    }
}

/// What a student is shown after submitting. Never carries trap details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub submission_id: String,
    pub text_extracted: bool,
    pub score: Option<f64>,
    pub interview_offered: bool,
    pub decision: FlagDecision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modification_serializes_camel_case() {
        let m = Modification {
            original_text: "6".to_string(),
            modified_text: "11".to_string(),
            start_index: 10,
            end_index: 11,
            page: Some(1),
            kind: ModificationKind::Number,
            suggestion: None,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["originalText"], "6");
        assert_eq!(json["startIndex"], 10);
        assert_eq!(json["kind"], "number");
        assert!(json.get("suggestion").is_none());

        let back: Modification = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_stage_running_respects_lease() {
        let now = Utc::now();
        let lease = Duration::seconds(60);
        let mut record = TrapDocumentRecord::new("a1", now);
        assert!(!record.stage_running(now, lease));

        record.suggestion_status = SuggestionStatus::Processing;
        record.stage_started_at = Some(now - Duration::seconds(10));
        assert!(record.stage_running(now, lease));

        record.stage_started_at = Some(now - Duration::seconds(61));
        assert!(!record.stage_running(now, lease));

        record.suggestion_status = SuggestionStatus::Completed;
        record.document_status = DocumentStatus::Generating;
        record.stage_started_at = Some(now);
        assert!(record.stage_running(now, lease));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(
            "punctuation".parse::<ModificationKind>().unwrap(),
            ModificationKind::Punctuation
        );
        assert!("emoji".parse::<ModificationKind>().is_err());
    }
}
