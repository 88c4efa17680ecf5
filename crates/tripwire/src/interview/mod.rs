//! Interview protocol: a turn-based verification conversation run through
//! an external agent when a submission scores above the threshold.
//!
//! `not_started → offered → in_progress → completed`, with `skipped`
//! reachable only from `offered`. The verdict is read from the agent's
//! utterances; the system never computes it.

mod channel;
mod runner;
mod script;
mod verdict;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::InterviewResolution;

pub use channel::{AgentChannel, AgentEvent, NoopSink, TranscriptSink};
pub use runner::{InterviewRunner, RunOutcome};
pub use script::{InterviewScript, QuestionIntent};
pub use verdict::{Verdict, VerdictParser, DEFAULT_VERDICT_MARKER};

#[derive(Error, Debug)]
pub enum InterviewError {
    #[error("Illegal interview transition from '{from}' to '{to}'")]
    IllegalTransition {
        from: InterviewState,
        to: InterviewState,
    },

    #[error("Interview is '{0}', turns can only be recorded while in progress")]
    NotInProgress(InterviewState),

    #[error("Invalid verdict marker: {0}")]
    InvalidMarker(#[from] regex::Error),

    #[error("Agent channel error: {0}")]
    Channel(String),

    #[error("Failed to persist transcript: {0}")]
    Persist(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewState {
    NotStarted,
    Offered,
    InProgress,
    Completed,
    Skipped,
}

impl InterviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewState::NotStarted => "not_started",
            InterviewState::Offered => "offered",
            InterviewState::InProgress => "in_progress",
            InterviewState::Completed => "completed",
            InterviewState::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InterviewState::Completed | InterviewState::Skipped)
    }

    fn can_move_to(&self, to: InterviewState) -> bool {
        matches!(
            (self, to),
            (InterviewState::NotStarted, InterviewState::Offered)
                | (InterviewState::Offered, InterviewState::InProgress)
                | (InterviewState::Offered, InterviewState::Skipped)
                | (InterviewState::InProgress, InterviewState::Completed)
        )
    }
}

impl fmt::Display for InterviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterviewState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(InterviewState::NotStarted),
            "offered" => Ok(InterviewState::Offered),
            "in_progress" => Ok(InterviewState::InProgress),
            "completed" => Ok(InterviewState::Completed),
            "skipped" => Ok(InterviewState::Skipped),
            other => Err(format!("unknown interview state '{}'", other)),
        }
    }
}

/// Who spoke. Serialized with the agent platform's role names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "assistant")]
    Agent,
    #[serde(rename = "user")]
    Student,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSession {
    pub id: String,
    pub submission_id: String,
    pub state: InterviewState,
    pub turns: Vec<Turn>,
    pub verdict: Option<Verdict>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterviewSession {
    pub fn new(id: impl Into<String>, submission_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            submission_id: submission_id.into(),
            state: InterviewState::NotStarted,
            turns: Vec::new(),
            verdict: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn move_to(&mut self, to: InterviewState) -> Result<(), InterviewError> {
        if !self.state.can_move_to(to) {
            return Err(InterviewError::IllegalTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn offer(&mut self) -> Result<(), InterviewError> {
        self.move_to(InterviewState::Offered)
    }

    pub fn skip(&mut self) -> Result<(), InterviewError> {
        self.move_to(InterviewState::Skipped)
    }

    /// Begins the conversation, or resumes one left in progress.
    pub fn start(&mut self) -> Result<(), InterviewError> {
        if self.state == InterviewState::InProgress {
            return Ok(());
        }
        self.move_to(InterviewState::InProgress)
    }

    pub fn record(&mut self, role: Role, content: impl Into<String>) -> Result<(), InterviewError> {
        if self.state != InterviewState::InProgress {
            return Err(InterviewError::NotInProgress(self.state));
        }
        let at = Utc::now();
        self.turns.push(Turn {
            role,
            content: content.into(),
            at,
        });
        self.updated_at = at;
        Ok(())
    }

    pub fn complete(&mut self, verdict: Verdict) -> Result<(), InterviewError> {
        self.move_to(InterviewState::Completed)?;
        self.verdict = Some(verdict);
        Ok(())
    }

    pub fn is_resumable(&self) -> bool {
        self.state == InterviewState::InProgress
    }

    pub fn resolution(&self) -> InterviewResolution {
        match (self.state, self.verdict) {
            (InterviewState::Skipped, _) => InterviewResolution::Skipped,
            (InterviewState::Completed, Some(v)) => InterviewResolution::Verdict(v),
            (InterviewState::Completed, None) => InterviewResolution::Verdict(Verdict::Unclear),
            _ => InterviewResolution::NotHeld,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut session = InterviewSession::new("i1", "s1");
        session.offer().unwrap();
        session.start().unwrap();
        session.record(Role::Agent, "Summarize please").unwrap();
        session.record(Role::Student, "It was about apples").unwrap();
        session.complete(Verdict::Legitimate).unwrap();

        assert_eq!(session.state, InterviewState::Completed);
        assert_eq!(session.turns.len(), 2);
        assert_eq!(
            session.resolution(),
            InterviewResolution::Verdict(Verdict::Legitimate)
        );
    }

    #[test]
    fn test_skip_only_from_offered() {
        let mut session = InterviewSession::new("i1", "s1");
        assert!(matches!(
            session.skip(),
            Err(InterviewError::IllegalTransition { .. })
        ));
        session.offer().unwrap();
        session.start().unwrap();
        assert!(session.skip().is_err());

        let mut session = InterviewSession::new("i2", "s2");
        session.offer().unwrap();
        session.skip().unwrap();
        assert_eq!(session.resolution(), InterviewResolution::Skipped);
        assert!(session.start().is_err());
    }

    #[test]
    fn test_start_resumes_in_progress() {
        let mut session = InterviewSession::new("i1", "s1");
        session.offer().unwrap();
        session.start().unwrap();
        session.record(Role::Agent, "hello").unwrap();
        session.start().unwrap();
        assert_eq!(session.turns.len(), 1);
        assert!(session.is_resumable());
    }

    #[test]
    fn test_record_requires_in_progress() {
        let mut session = InterviewSession::new("i1", "s1");
        session.offer().unwrap();
        assert!(matches!(
            session.record(Role::Student, "hi"),
            Err(InterviewError::NotInProgress(InterviewState::Offered))
        ));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Agent).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::Student).unwrap(), "\"user\"");
    }

    #[test]
    fn test_state_parse() {
        assert_eq!(
            "in_progress".parse::<InterviewState>().unwrap(),
            InterviewState::InProgress
        );
        assert!("done".parse::<InterviewState>().is_err());
    }
}
