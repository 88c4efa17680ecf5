//! Test harness for isolated pipeline runs.
//!
//! Each harness owns a temp directory holding the SQLite database and the
//! document store, so tests never share state.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use tripwire::ai::{Suggestion, SuggesterError, SuggestionService};
use tripwire::config::Config;
use tripwire::interview::{AgentChannel, AgentEvent, InterviewError, InterviewScript, Turn};
use tripwire::model::NewAssignment;
use tripwire::pipeline::{AssignmentService, PipelineContext, SubmissionService};

/// Always suggests the same rewrite.
pub struct FixedSuggester(pub String);

#[async_trait::async_trait]
impl SuggestionService for FixedSuggester {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn suggest(&self, _instructions: &str) -> Result<Suggestion, SuggesterError> {
        Ok(Suggestion {
            text: self.0.clone(),
        })
    }
}

/// Never answers, like a service that hangs past the caller's patience.
pub struct HangingSuggester;

#[async_trait::async_trait]
impl SuggestionService for HangingSuggester {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn suggest(&self, _instructions: &str) -> Result<Suggestion, SuggesterError> {
        std::future::pending().await
    }
}

/// Replays events. When they run out it either closes the stream or, with
/// `cancel_when_exhausted`, cancels the token and waits forever.
pub struct ScriptedChannel {
    events: VecDeque<AgentEvent>,
    cancel_when_exhausted: Option<CancellationToken>,
    pub resumed_with: Option<usize>,
}

impl ScriptedChannel {
    pub fn new(events: Vec<AgentEvent>) -> Self {
        Self {
            events: events.into(),
            cancel_when_exhausted: None,
            resumed_with: None,
        }
    }

    pub fn then_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel_when_exhausted = Some(token);
        self
    }
}

#[async_trait::async_trait]
impl AgentChannel for ScriptedChannel {
    async fn configure(
        &mut self,
        _script: &InterviewScript,
        history: &[Turn],
    ) -> Result<(), InterviewError> {
        self.resumed_with = Some(history.len());
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<AgentEvent>, InterviewError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        match &self.cancel_when_exhausted {
            Some(token) => {
                token.cancel();
                std::future::pending().await
            }
            None => Ok(None),
        }
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub ctx: PipelineContext,
    pub assignments: AssignmentService,
    pub submissions: SubmissionService,
}

impl TestHarness {
    /// Default configuration; the suggestion service returns `suggested`.
    pub fn new(suggested: &str) -> Self {
        Self::with_config(Config::default(), suggested)
    }

    pub fn with_config(mut config: Config, suggested: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        config.database_path = temp_dir.path().join("tripwire.db").to_string_lossy().into_owned();
        config.storage_directory = temp_dir.path().join("documents").to_string_lossy().into_owned();

        let ctx = PipelineContext::open(config.clone()).expect("Failed to open pipeline context");
        let assignments =
            AssignmentService::new(ctx.clone(), Arc::new(FixedSuggester(suggested.to_string())));
        let submissions = SubmissionService::new(ctx.clone());

        Self {
            temp_dir,
            config,
            ctx,
            assignments,
            submissions,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn storage_path(&self, handle: &str) -> PathBuf {
        PathBuf::from(&self.config.storage_directory).join(handle)
    }

    /// Reopens the same database and store, as after a restart.
    pub fn reopen(&self, suggested: &str) -> (AssignmentService, SubmissionService) {
        let ctx = PipelineContext::open(self.config.clone()).expect("Failed to reopen context");
        (
            AssignmentService::new(ctx.clone(), Arc::new(FixedSuggester(suggested.to_string()))),
            SubmissionService::new(ctx),
        )
    }

    /// Services over the same database and store with a different suggester
    /// and configuration, as a second worker would see them.
    pub fn worker(&self, config: Config, suggester: Arc<dyn SuggestionService>) -> AssignmentService {
        let ctx = PipelineContext::new(Arc::new(config), self.ctx.db.clone(), self.ctx.storage.clone());
        AssignmentService::new(ctx, suggester)
    }

    pub fn create_draft(&self, title: &str) -> String {
        self.assignments
            .create(NewAssignment {
                course_id: "course-101".to_string(),
                instructor_id: "instructor-1".to_string(),
                title: title.to_string(),
                due_date: Utc::now(),
                max_score: 100,
            })
            .expect("Failed to create assignment")
            .id
    }

    pub fn create_assignment(&self, title: &str, instructions: &str) -> String {
        let id = self.create_draft(title);
        self.assignments
            .save_instructions(&id, instructions)
            .expect("Failed to save instructions");
        id
    }

    /// Runs every instructor stage through to publication.
    pub async fn publish(&self, instructions: &str) -> String {
        let id = self.create_assignment("Integration", instructions);
        self.assignments
            .generate_modifications(&id)
            .await
            .expect("Failed to generate modifications");
        self.assignments
            .generate_document(&id)
            .expect("Failed to generate document");
        self.assignments.publish(&id).expect("Failed to publish");
        id
    }
}
