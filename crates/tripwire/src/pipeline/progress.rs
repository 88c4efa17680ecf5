use std::fmt;

/// The independently retryable stages of trap generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Suggestion,
    Document,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Suggestion => f.write_str("suggestion"),
            Stage::Document => f.write_str("document"),
        }
    }
}

/// Events emitted while an assignment's stages run.
/// Never carries instruction text or trap contents.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started { assignment_id: String, stage: Stage },
    Completed {
        assignment_id: String,
        stage: Stage,
        modifications: usize,
    },
    Failed {
        assignment_id: String,
        stage: Stage,
        error: String,
        retryable: bool,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards events to the tracing subscriber.
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started {
                assignment_id,
                stage,
            } => tracing::info!(%assignment_id, %stage, "Stage started"),
            ProgressEvent::Completed {
                assignment_id,
                stage,
                modifications,
            } => tracing::info!(%assignment_id, %stage, modifications, "Stage completed"),
            ProgressEvent::Failed {
                assignment_id,
                stage,
                error,
                retryable,
            } => tracing::warn!(%assignment_id, %stage, retryable, "Stage failed: {}", error),
        }
    }
}
