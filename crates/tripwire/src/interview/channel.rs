//! Capabilities the interview runner depends on.

use super::script::InterviewScript;
use super::{InterviewError, InterviewSession, Role, Turn};

/// Something the agent channel delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Settings were applied; the conversation may begin.
    Ready,
    Utterance { role: Role, content: String },
}

impl AgentEvent {
    pub fn agent(content: impl Into<String>) -> Self {
        AgentEvent::Utterance {
            role: Role::Agent,
            content: content.into(),
        }
    }

    pub fn student(content: impl Into<String>) -> Self {
        AgentEvent::Utterance {
            role: Role::Student,
            content: content.into(),
        }
    }
}

/// Bidirectional turn stream to the external conversational agent.
#[async_trait::async_trait]
pub trait AgentChannel: Send {
    /// Sends the script; `history` is non-empty when resuming a session.
    async fn configure(
        &mut self,
        script: &InterviewScript,
        history: &[Turn],
    ) -> Result<(), InterviewError>;

    /// Waits for the next event. `None` means the stream closed.
    async fn next_event(&mut self) -> Result<Option<AgentEvent>, InterviewError>;
}

/// Receives the session after every change so a transcript survives a
/// dropped connection.
pub trait TranscriptSink: Send + Sync {
    fn persist(&self, session: &InterviewSession) -> Result<(), InterviewError>;
}

/// No-op sink for unit tests.
pub struct NoopSink;

impl TranscriptSink for NoopSink {
    fn persist(&self, _session: &InterviewSession) -> Result<(), InterviewError> {
        Ok(())
    }
}
