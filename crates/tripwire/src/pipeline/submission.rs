//! Student side: store the upload, extract, score, decide, and run the
//! verification interview when the score crosses the threshold.

use std::path::Path;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use super::context::PipelineContext;
use crate::db::{assignment_repo, interview_repo, submission_repo, trap_repo, Database};
use crate::decision::{decide, FlagDecision, InterviewResolution};
use crate::detection::{self, DetectionOptions};
use crate::encoder;
use crate::error::{Result, TripwireError};
use crate::interview::{
    AgentChannel, InterviewError, InterviewRunner, InterviewScript, InterviewSession, RunOutcome,
    TranscriptSink,
};
use crate::lifecycle::DocumentStatus;
use crate::model::{Submission, SubmissionReceipt, TrapDocumentRecord};
use crate::processor::{DocumentFormat, ExtractorRegistry};
use crate::sanitize;
use crate::storage::StorageArea;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Persists the interview after every turn.
pub struct DbTranscriptSink {
    db: Database,
}

impl DbTranscriptSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl TranscriptSink for DbTranscriptSink {
    fn persist(&self, session: &InterviewSession) -> std::result::Result<(), InterviewError> {
        interview_repo::save(&self.db, session).map_err(|e| InterviewError::Persist(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterviewOutcome {
    pub run: RunOutcome,
    pub decision: FlagDecision,
}

pub struct SubmissionService {
    ctx: PipelineContext,
    extractors: ExtractorRegistry,
    options: DetectionOptions,
    threshold: f64,
}

impl SubmissionService {
    pub fn new(ctx: PipelineContext) -> Self {
        let options = ctx.config.detection.options();
        let threshold = ctx.config.detection.threshold;
        Self {
            ctx,
            extractors: ExtractorRegistry::new(),
            options,
            threshold,
        }
    }

    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    /// Stores the uploaded file, then extracts and scores it. The file is
    /// kept even when extraction fails; such a submission is accepted
    /// unscored.
    pub fn submit_document(
        &self,
        assignment_id: &str,
        student_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<SubmissionReceipt> {
        let _span = info_span!(
            "submission.upload",
            assignment_id = %assignment_id,
            student_id = %student_id,
            file = %sanitize::redact_path(Path::new(filename)),
            size = bytes.len()
        )
        .entered();

        check_size(bytes.len())?;
        let traps = self.published_trap_set(assignment_id)?;
        self.check_open(assignment_id, student_id)?;

        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(DocumentFormat::from_extension)
            .or_else(|| DocumentFormat::detect(bytes))
            .map(|f| f.extension())
            .unwrap_or("bin");
        let handle = self.ctx.storage.store(
            bytes,
            StorageArea::Submissions,
            &format!("{}_{}", assignment_id, student_id),
            extension,
        )?;

        let text = match self.extractors.extract_named(bytes, filename) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "Text extraction failed, submission kept unscored");
                None
            }
        };

        self.record(
            &traps,
            student_id,
            Some(handle),
            Some(encoder::content_hash(bytes)),
            text,
        )
    }

    /// Scores a typed response. Same upsert path as an upload, no file.
    pub fn submit_text(
        &self,
        assignment_id: &str,
        student_id: &str,
        text: &str,
    ) -> Result<SubmissionReceipt> {
        let _span = info_span!(
            "submission.text",
            assignment_id = %assignment_id,
            student_id = %student_id,
            text = %sanitize::text_fingerprint(text)
        )
        .entered();

        if text.trim().is_empty() {
            return Err(TripwireError::Validation("submission text is empty".to_string()));
        }
        check_size(text.len())?;
        let traps = self.published_trap_set(assignment_id)?;
        self.check_open(assignment_id, student_id)?;

        self.record(&traps, student_id, None, None, Some(text.to_string()))
    }

    fn published_trap_set(&self, assignment_id: &str) -> Result<TrapDocumentRecord> {
        let assignment = assignment_repo::find_by_id(&self.ctx.db, assignment_id)?.ok_or_else(
            || TripwireError::NotFound {
                entity: "assignment",
                id: assignment_id.to_string(),
            },
        )?;
        if !assignment.is_published {
            return Err(TripwireError::Validation(format!(
                "assignment '{}' is not published",
                assignment_id
            )));
        }

        let traps = trap_repo::find(&self.ctx.db, assignment_id)?.ok_or_else(|| {
            TripwireError::Inconsistency(format!(
                "published assignment '{}' has no trap set",
                assignment_id
            ))
        })?;
        if traps.assignment_id != assignment.id || traps.document_status != DocumentStatus::Completed
        {
            return Err(TripwireError::Inconsistency(format!(
                "trap set for '{}' is not a completed document of that assignment",
                assignment_id
            )));
        }
        Ok(traps)
    }

    /// A submission with an interview linked is frozen until its decision
    /// stands; a new upload would replace the text under review.
    fn check_open(&self, assignment_id: &str, student_id: &str) -> Result<()> {
        match submission_repo::find_by_student(&self.ctx.db, assignment_id, student_id)? {
            Some(existing) if existing.interview_id.is_some() => Err(locked(assignment_id, student_id)),
            _ => Ok(()),
        }
    }

    fn record(
        &self,
        traps: &TrapDocumentRecord,
        student_id: &str,
        file_handle: Option<String>,
        file_hash: Option<String>,
        text: Option<String>,
    ) -> Result<SubmissionReceipt> {
        let db = &self.ctx.db;

        let score = text.as_deref().map(|text| {
            let report = detection::analyze(text, &traps.modifications, &self.options);
            tracing::info!(
                score = report.score,
                leaked = report.leaked_count,
                detectable = report.detectable_count,
                "Submission scored"
            );
            report.score
        });
        let decision = match score {
            Some(score) => decide(score, self.threshold, InterviewResolution::NotHeld),
            None => FlagDecision::Accepted,
        };

        let now = Utc::now();
        let submission = Submission {
            id: uuid::Uuid::new_v4().to_string(),
            assignment_id: traps.assignment_id.clone(),
            student_id: student_id.to_string(),
            file_handle,
            file_hash,
            text_extracted: text.is_some(),
            extracted_text: text,
            score,
            decision,
            interview_id: None,
            verdict: None,
            submitted_at: now,
            updated_at: now,
        };
        let stored = match submission_repo::upsert(db, &submission)? {
            Some(stored) => stored,
            None => return Err(locked(&traps.assignment_id, student_id)),
        };

        let interview_offered = decision == FlagDecision::PendingInterview;
        if interview_offered {
            let mut session = InterviewSession::new(uuid::Uuid::new_v4().to_string(), &stored.id);
            session.offer()?;
            interview_repo::save(db, &session)?;
            let linked = submission_repo::update_outcome(
                db,
                &stored,
                decision,
                Some(session.id.as_str()),
                None,
                now,
            )?;
            if !linked {
                // Another upload replaced this one before the link landed.
                tracing::warn!(interview_id = %session.id, "Upload superseded, interview not linked");
                return Err(TripwireError::Validation(format!(
                    "submission '{}' was replaced by a concurrent upload",
                    stored.id
                )));
            }
            tracing::info!(interview_id = %session.id, "Interview offered");
        }

        Ok(SubmissionReceipt {
            submission_id: stored.id,
            text_extracted: stored.text_extracted,
            score,
            interview_offered,
            decision,
        })
    }

    pub fn get(&self, submission_id: &str) -> Result<Submission> {
        submission_repo::find_by_id(&self.ctx.db, submission_id)?.ok_or_else(|| {
            TripwireError::NotFound {
                entity: "submission",
                id: submission_id.to_string(),
            }
        })
    }

    /// What the student sees: score and decision, no trap details.
    pub fn receipt(&self, submission_id: &str) -> Result<SubmissionReceipt> {
        let submission = self.get(submission_id)?;
        Ok(SubmissionReceipt {
            interview_offered: submission.interview_id.is_some(),
            submission_id: submission.id,
            text_extracted: submission.text_extracted,
            score: submission.score,
            decision: submission.decision,
        })
    }

    pub fn list(&self, assignment_id: &str) -> Result<Vec<Submission>> {
        Ok(submission_repo::list_by_assignment(&self.ctx.db, assignment_id)?)
    }

    /// The student declines the interview; the submission is flagged.
    pub fn skip_interview(&self, submission_id: &str) -> Result<FlagDecision> {
        let _span = info_span!("submission.skip_interview", submission_id = %submission_id).entered();

        let submission = self.get(submission_id)?;
        let mut session = self.offered_session(&submission)?;
        session.skip()?;
        interview_repo::save(&self.ctx.db, &session)?;
        self.conclude(&submission, &session)
    }

    /// Runs or resumes the interview. A cancelled run leaves the decision
    /// pending and the transcript saved.
    pub async fn run_interview<C>(
        &self,
        submission_id: &str,
        channel: &mut C,
        cancel: &CancellationToken,
    ) -> Result<InterviewOutcome>
    where
        C: AgentChannel + ?Sized,
    {
        let span = info_span!("submission.interview", submission_id = %submission_id);
        self.interview(submission_id, channel, cancel)
            .instrument(span)
            .await
    }

    async fn interview<C>(
        &self,
        submission_id: &str,
        channel: &mut C,
        cancel: &CancellationToken,
    ) -> Result<InterviewOutcome>
    where
        C: AgentChannel + ?Sized,
    {
        let submission = self.get(submission_id)?;
        let mut session = self.offered_session(&submission)?;

        let script = InterviewScript::standard(&self.ctx.config.interview.verdict_marker);
        let runner = InterviewRunner::new(script)?;
        let sink = DbTranscriptSink::new(self.ctx.db.clone());

        let run = runner.run(&mut session, channel, cancel, &sink).await?;
        let decision = match run {
            RunOutcome::Completed(_) => self.conclude(&submission, &session)?,
            RunOutcome::Cancelled => submission.decision,
        };
        Ok(InterviewOutcome { run, decision })
    }

    fn offered_session(&self, submission: &Submission) -> Result<InterviewSession> {
        let interview_id = submission.interview_id.as_deref().ok_or_else(|| {
            TripwireError::Validation(format!(
                "no interview was offered for submission '{}'",
                submission.id
            ))
        })?;
        interview_repo::find_by_id(&self.ctx.db, interview_id)?.ok_or_else(|| {
            TripwireError::Inconsistency(format!(
                "submission '{}' references missing interview '{}'",
                submission.id, interview_id
            ))
        })
    }

    fn conclude(&self, submission: &Submission, session: &InterviewSession) -> Result<FlagDecision> {
        let score = submission.score.ok_or_else(|| {
            TripwireError::Inconsistency(format!(
                "submission '{}' has an interview but no score",
                submission.id
            ))
        })?;

        let decision = decide(score, self.threshold, session.resolution());
        let updated = submission_repo::update_outcome(
            &self.ctx.db,
            submission,
            decision,
            Some(session.id.as_str()),
            session.verdict,
            Utc::now(),
        )?;
        if !updated {
            return Err(TripwireError::Inconsistency(format!(
                "submission '{}' changed while interview '{}' was running",
                submission.id, session.id
            )));
        }
        tracing::info!(%decision, state = %session.state, "Submission decided");
        Ok(decision)
    }
}

fn locked(assignment_id: &str, student_id: &str) -> TripwireError {
    TripwireError::Validation(format!(
        "the submission of '{}' to '{}' is under interview review and cannot be replaced",
        student_id, assignment_id
    ))
}

fn check_size(len: usize) -> Result<()> {
    if len == 0 {
        return Err(TripwireError::Validation("submission is empty".to_string()));
    }
    if len > MAX_UPLOAD_BYTES {
        return Err(TripwireError::Validation(format!(
            "submission is {} bytes, the limit is {}",
            len, MAX_UPLOAD_BYTES
        )));
    }
    Ok(())
}
