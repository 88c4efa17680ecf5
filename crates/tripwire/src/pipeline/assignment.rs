//! Instructor side: save instructions, generate the trap set and document,
//! publish, and serve the verified document.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info_span, Instrument};

use super::context::PipelineContext;
use super::progress::{NoopProgress, ProgressEvent, ProgressReporter, Stage};
use crate::ai::SuggestionService;
use crate::db::trap_repo::GeneratedDocument;
use crate::db::{assignment_repo, trap_repo};
use crate::diff::DiffEngine;
use crate::encoder::{self, TrapDocument, TrapEncoder};
use crate::error::{Result, TripwireError};
use crate::lifecycle::{
    check_transition, AssignmentStatus, DocumentStatus, LifecycleError, StageArtifacts,
    SuggestionStatus,
};
use crate::model::{Assignment, Modification, NewAssignment, TrapDocumentRecord};
use crate::sanitize;
use crate::storage::StorageArea;

/// Per-stage status for the instructor. Carries counts, never trap text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentStatusView {
    pub assignment_id: String,
    pub status: AssignmentStatus,
    pub is_published: bool,
    pub suggestion_status: SuggestionStatus,
    pub document_status: DocumentStatus,
    pub modification_count: usize,
    pub page_count: Option<u32>,
    pub content_hash: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DownloadedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_hash: String,
}

pub struct AssignmentService {
    ctx: PipelineContext,
    suggester: Arc<dyn SuggestionService>,
    diff: DiffEngine,
    encoder: TrapEncoder,
    stage_lease: Duration,
    progress: Arc<dyn ProgressReporter>,
}

impl AssignmentService {
    pub fn new(ctx: PipelineContext, suggester: Arc<dyn SuggestionService>) -> Self {
        let diff = DiffEngine::new(ctx.config.diff.max_cells);
        let encoder = TrapEncoder::new(ctx.config.encoder.clone());
        let stage_lease = ctx.config.pipeline.stage_lease();
        Self {
            ctx,
            suggester,
            diff,
            encoder,
            stage_lease,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn create(&self, new: NewAssignment) -> Result<Assignment> {
        if new.title.trim().is_empty() {
            return Err(TripwireError::Validation(
                "assignment title is empty".to_string(),
            ));
        }

        let now = Utc::now();
        let assignment = Assignment {
            id: uuid::Uuid::new_v4().to_string(),
            course_id: new.course_id,
            instructor_id: new.instructor_id,
            title: new.title,
            instructions: String::new(),
            due_date: new.due_date,
            max_score: new.max_score,
            is_published: false,
            status: AssignmentStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        assignment_repo::insert(&self.ctx.db, &assignment)?;

        tracing::info!(
            assignment_id = %assignment.id,
            course_id = %assignment.course_id,
            "Assignment created"
        );
        Ok(assignment)
    }

    pub fn get(&self, id: &str) -> Result<Assignment> {
        assignment_repo::find_by_id(&self.ctx.db, id)?.ok_or_else(|| TripwireError::NotFound {
            entity: "assignment",
            id: id.to_string(),
        })
    }

    /// Stores the instructions. Allowed from `draft`, and again until a
    /// trap document exists; revising discards the trap set built so far.
    pub fn save_instructions(&self, id: &str, instructions: &str) -> Result<Assignment> {
        let _span = info_span!(
            "assignment.save_instructions",
            assignment_id = %id,
            text = %sanitize::text_fingerprint(instructions)
        )
        .entered();

        let assignment = self.get(id)?;
        let target = AssignmentStatus::InstructionsSaved;
        match assignment.status {
            AssignmentStatus::Draft => check_transition(
                AssignmentStatus::Draft,
                target,
                StageArtifacts {
                    instructions,
                    suggestion: None,
                    document: None,
                },
            )?,
            AssignmentStatus::InstructionsSaved | AssignmentStatus::ModificationsGenerated => {
                self.check_revisable(&assignment, instructions)?
            }
            AssignmentStatus::Published => return Err(LifecycleError::AlreadyPublished.into()),
            from => return Err(LifecycleError::IllegalTransition { from, to: target }.into()),
        }
        self.encoder.check_original(instructions)?;

        let now = Utc::now();
        let saved = if assignment.status == AssignmentStatus::Draft {
            assignment_repo::save_instructions(
                &self.ctx.db,
                id,
                instructions,
                assignment.status,
                target,
                now,
            )?
        } else {
            assignment_repo::revise_instructions(
                &self.ctx.db,
                id,
                instructions,
                assignment.status,
                now - self.stage_lease,
                now,
            )?
        };
        if !saved {
            return Err(TripwireError::Inconsistency(format!(
                "assignment '{}' changed while saving instructions",
                id
            )));
        }
        tracing::info!(from = %assignment.status, "Instructions saved");
        self.get(id)
    }

    /// The text must not change under a running stage, nor once a
    /// document has been generated from it.
    fn check_revisable(&self, assignment: &Assignment, instructions: &str) -> Result<()> {
        if instructions.trim().is_empty() {
            return Err(LifecycleError::EmptyInstructions.into());
        }
        let record = match trap_repo::find(&self.ctx.db, &assignment.id)? {
            Some(record) => record,
            None => return Ok(()),
        };
        if record.stage_running(Utc::now(), self.stage_lease) {
            let (stage, status) = if record.suggestion_status == SuggestionStatus::Processing {
                ("suggestion", record.suggestion_status.to_string())
            } else {
                ("document", record.document_status.to_string())
            };
            return Err(LifecycleError::StageBusy { stage, status }.into());
        }
        if record.document_status == DocumentStatus::Completed {
            return Err(LifecycleError::IllegalTransition {
                from: assignment.status,
                to: AssignmentStatus::InstructionsSaved,
            }
            .into());
        }
        Ok(())
    }

    /// Runs the suggestion service and diffs its output against the
    /// instructions. A failure marks the suggestion stage `failed` and can
    /// be retried by calling this again.
    pub async fn generate_modifications(&self, id: &str) -> Result<TrapDocumentRecord> {
        let span = info_span!(
            "assignment.suggest",
            assignment_id = %id,
            service = self.suggester.name()
        );
        self.suggest_and_diff(id).instrument(span).await
    }

    async fn suggest_and_diff(&self, id: &str) -> Result<TrapDocumentRecord> {
        let assignment = self.get(id)?;
        let target = AssignmentStatus::ModificationsGenerated;
        match assignment.status {
            AssignmentStatus::InstructionsSaved => {}
            AssignmentStatus::Published => return Err(LifecycleError::AlreadyPublished.into()),
            from => return Err(LifecycleError::IllegalTransition { from, to: target }.into()),
        }

        let db = &self.ctx.db;
        trap_repo::ensure(db, id, Utc::now())?;
        let record = self.trap_record(id)?;
        if record.suggestion_status == SuggestionStatus::Completed {
            // A previous run finished but the parent never advanced.
            self.advance(&assignment, target, &record)?;
            return Ok(record);
        }

        let now = Utc::now();
        let abandoned = record.suggestion_status == SuggestionStatus::Processing
            && !record.stage_running(now, self.stage_lease);
        if !abandoned {
            record.suggestion_status.begin()?;
        }
        let lease = match trap_repo::begin_suggestion(db, id, now, self.stage_lease)? {
            Some(lease) => lease,
            None => {
                let current = self.trap_record(id)?;
                return Err(LifecycleError::StageBusy {
                    stage: "suggestion",
                    status: current.suggestion_status.to_string(),
                }
                .into());
            }
        };
        if abandoned {
            tracing::warn!("Restarting a suggestion stage whose lease ran out");
        }
        self.progress.report(ProgressEvent::Started {
            assignment_id: id.to_string(),
            stage: Stage::Suggestion,
        });

        match self.suggest_modifications(&assignment.instructions).await {
            Ok((suggested, modifications)) => {
                if !trap_repo::complete_suggestion(
                    db,
                    id,
                    lease,
                    &suggested,
                    &modifications,
                    Utc::now(),
                )? {
                    return Err(lease_lost(id, "suggestion"));
                }
                tracing::info!(modifications = modifications.len(), "Trap set computed");
                self.progress.report(ProgressEvent::Completed {
                    assignment_id: id.to_string(),
                    stage: Stage::Suggestion,
                    modifications: modifications.len(),
                });

                let record = self.trap_record(id)?;
                self.advance(&assignment, target, &record)?;
                Ok(record)
            }
            Err(e) => {
                trap_repo::fail_suggestion(db, id, lease, &e.to_string(), Utc::now())?;
                self.progress.report(ProgressEvent::Failed {
                    assignment_id: id.to_string(),
                    stage: Stage::Suggestion,
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                });
                Err(e)
            }
        }
    }

    async fn suggest_modifications(&self, instructions: &str) -> Result<(String, Vec<Modification>)> {
        let suggestion = self.suggester.suggest(instructions).await?;
        let modifications = self.diff.compute(instructions, &suggestion.text)?;
        Ok((suggestion.text, modifications))
    }

    /// Encodes the trap document and stores it. A failure marks the
    /// document stage `failed` without touching the trap set.
    pub fn generate_document(&self, id: &str) -> Result<TrapDocumentRecord> {
        let _span = info_span!("assignment.encode", assignment_id = %id).entered();

        let assignment = self.get(id)?;
        let target = AssignmentStatus::PdfGenerated;
        match assignment.status {
            AssignmentStatus::ModificationsGenerated => {}
            AssignmentStatus::Published => return Err(LifecycleError::AlreadyPublished.into()),
            from => return Err(LifecycleError::IllegalTransition { from, to: target }.into()),
        }

        let db = &self.ctx.db;
        let record = self.trap_record(id)?;
        if record.document_status == DocumentStatus::Completed {
            self.advance(&assignment, target, &record)?;
            return Ok(record);
        }

        let now = Utc::now();
        let abandoned = record.document_status == DocumentStatus::Generating
            && !record.stage_running(now, self.stage_lease);
        if !abandoned {
            record.document_status.begin()?;
        }
        let lease = match trap_repo::begin_document(db, id, now, self.stage_lease)? {
            Some(lease) => lease,
            None => {
                let current = self.trap_record(id)?;
                return Err(LifecycleError::StageBusy {
                    stage: "document",
                    status: current.document_status.to_string(),
                }
                .into());
            }
        };
        if abandoned {
            tracing::warn!("Restarting a document stage whose lease ran out");
        }
        self.progress.report(ProgressEvent::Started {
            assignment_id: id.to_string(),
            stage: Stage::Document,
        });

        match self.encode_and_store(&assignment, &record.modifications) {
            Ok((handle, document, placed)) => {
                let generated = GeneratedDocument {
                    handle: &handle,
                    content_hash: &document.content_hash,
                    page_count: document.page_count,
                    modifications: &placed,
                };
                if !trap_repo::complete_document(db, id, lease, &generated, Utc::now())? {
                    return Err(lease_lost(id, "document"));
                }
                tracing::info!(
                    pages = document.page_count,
                    hash = %document.content_hash,
                    "Trap document stored"
                );
                self.progress.report(ProgressEvent::Completed {
                    assignment_id: id.to_string(),
                    stage: Stage::Document,
                    modifications: placed.len(),
                });

                let record = self.trap_record(id)?;
                self.advance(&assignment, target, &record)?;
                Ok(record)
            }
            Err(e) => {
                trap_repo::fail_document(db, id, lease, &e.to_string(), Utc::now())?;
                self.progress.report(ProgressEvent::Failed {
                    assignment_id: id.to_string(),
                    stage: Stage::Document,
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                });
                Err(e)
            }
        }
    }

    fn encode_and_store(
        &self,
        assignment: &Assignment,
        modifications: &[Modification],
    ) -> Result<(String, TrapDocument, Vec<Modification>)> {
        let document = self.encoder.encode(&assignment.instructions, modifications)?;
        let placed = modifications
            .iter()
            .zip(document.trap_pages.iter())
            .map(|(m, page)| Modification {
                page: Some(*page),
                ..m.clone()
            })
            .collect();
        let handle = self.ctx.storage.store(
            &document.bytes,
            StorageArea::TrapDocuments,
            &assignment.id,
            "pdf",
        )?;
        Ok((handle, document, placed))
    }

    /// Makes the assignment visible. Requires a completed document whose
    /// stored bytes still match their hash. There is no unpublish.
    pub fn publish(&self, id: &str) -> Result<Assignment> {
        let _span = info_span!("assignment.publish", assignment_id = %id).entered();

        let assignment = self.get(id)?;
        if assignment.status == AssignmentStatus::Published {
            return Err(LifecycleError::AlreadyPublished.into());
        }

        let record = trap_repo::find(&self.ctx.db, id)?;
        check_transition(
            assignment.status,
            AssignmentStatus::Published,
            StageArtifacts {
                instructions: &assignment.instructions,
                suggestion: record.as_ref().map(|r| r.suggestion_status),
                document: record.as_ref().map(|r| r.document_status),
            },
        )?;
        let record = record.ok_or_else(|| {
            TripwireError::Inconsistency(format!("assignment '{}' has no trap record", id))
        })?;

        self.load_verified(&record)?;
        self.advance(&assignment, AssignmentStatus::Published, &record)?;
        tracing::info!(traps = record.modifications.len(), "Assignment published");
        self.get(id)
    }

    pub fn status(&self, id: &str) -> Result<AssignmentStatusView> {
        let assignment = self.get(id)?;
        let record = trap_repo::find(&self.ctx.db, id)?;
        let record = record.unwrap_or_else(|| TrapDocumentRecord::new(id, assignment.created_at));

        Ok(AssignmentStatusView {
            assignment_id: assignment.id,
            status: assignment.status,
            is_published: assignment.is_published,
            suggestion_status: record.suggestion_status,
            document_status: record.document_status,
            modification_count: record.modifications.len(),
            page_count: record.page_count,
            content_hash: record.content_hash,
            last_error: record.last_error,
        })
    }

    /// The trap set, for the instructor's audit view only.
    pub fn modifications(&self, id: &str) -> Result<Vec<Modification>> {
        self.get(id)?;
        Ok(trap_repo::find(&self.ctx.db, id)?
            .map(|r| r.modifications)
            .unwrap_or_default())
    }

    /// Retrieves the stored document, refusing bytes that no longer match
    /// the recorded hash.
    pub fn download(&self, id: &str) -> Result<DownloadedDocument> {
        let _span = info_span!("assignment.download", assignment_id = %id).entered();

        let assignment = self.get(id)?;
        let record = self.trap_record(id)?;
        let bytes = self.load_verified(&record)?;

        Ok(DownloadedDocument {
            filename: format!("{}.pdf", slugify(&assignment.title)),
            content_hash: record.content_hash.unwrap_or_default(),
            bytes,
        })
    }

    /// Whether `bytes` are the document generated for this assignment.
    pub fn verify_document(&self, id: &str, bytes: &[u8]) -> Result<bool> {
        let record = self.trap_record(id)?;
        match (record.document_status, record.content_hash) {
            (DocumentStatus::Completed, Some(hash)) => Ok(encoder::verify_hash(bytes, &hash)),
            (status, _) => Err(LifecycleError::DocumentNotCompleted(status).into()),
        }
    }

    fn trap_record(&self, id: &str) -> Result<TrapDocumentRecord> {
        trap_repo::find(&self.ctx.db, id)?.ok_or_else(|| TripwireError::NotFound {
            entity: "trap document",
            id: id.to_string(),
        })
    }

    fn load_verified(&self, record: &TrapDocumentRecord) -> Result<Vec<u8>> {
        if record.document_status != DocumentStatus::Completed {
            return Err(LifecycleError::DocumentNotCompleted(record.document_status).into());
        }
        let (handle, hash) = match (&record.document_handle, &record.content_hash) {
            (Some(handle), Some(hash)) => (handle, hash),
            _ => {
                return Err(TripwireError::Inconsistency(format!(
                    "trap document for '{}' is completed but has no handle or hash",
                    record.assignment_id
                )))
            }
        };

        let bytes = self.ctx.storage.retrieve(handle)?;
        if !encoder::verify_hash(&bytes, hash) {
            tracing::warn!(
                assignment_id = %record.assignment_id,
                "Stored trap document does not match its hash"
            );
            return Err(TripwireError::Inconsistency(format!(
                "stored trap document for '{}' does not match its recorded hash",
                record.assignment_id
            )));
        }
        Ok(bytes)
    }

    fn advance(
        &self,
        assignment: &Assignment,
        to: AssignmentStatus,
        record: &TrapDocumentRecord,
    ) -> Result<()> {
        check_transition(
            assignment.status,
            to,
            StageArtifacts {
                instructions: &assignment.instructions,
                suggestion: Some(record.suggestion_status),
                document: Some(record.document_status),
            },
        )?;
        if !assignment_repo::advance_status(
            &self.ctx.db,
            &assignment.id,
            assignment.status,
            to,
            Utc::now(),
        )? {
            return Err(TripwireError::Inconsistency(format!(
                "assignment '{}' left '{}' concurrently",
                assignment.id, assignment.status
            )));
        }
        Ok(())
    }
}

fn lease_lost(id: &str, stage: &str) -> TripwireError {
    TripwireError::Inconsistency(format!(
        "{} stage for '{}' was taken over before it finished",
        stage, id
    ))
}

/// Lowercase ASCII slug for download filenames.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "assignment".to_string()
    } else {
        slug
    }
}
