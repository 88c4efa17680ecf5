//! Trap document repository: one row per assignment in `trap_documents`.
//!
//! Stage transitions are compare-and-set updates: entering `processing`
//! or `generating` only succeeds while the stage is `pending` or `failed`,
//! or while a running stage has outlived its lease. Finishing a stage
//! requires the lease taken when it began, so a run that was taken over
//! cannot overwrite its successor.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_time, parse_column, parse_time, Database, DatabaseError};
use crate::lifecycle::{DocumentStatus, SuggestionStatus};
use crate::model::{Modification, TrapDocumentRecord};

#[derive(Debug, Clone)]
struct TrapRow {
    assignment_id: String,
    suggested_text: Option<String>,
    modifications: String,
    document_handle: Option<String>,
    content_hash: Option<String>,
    page_count: Option<u32>,
    suggestion_status: String,
    document_status: String,
    last_error: Option<String>,
    stage_started_ms: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl TrapRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            assignment_id: row.get("assignment_id")?,
            suggested_text: row.get("suggested_text")?,
            modifications: row.get("modifications")?,
            document_handle: row.get("document_handle")?,
            content_hash: row.get("content_hash")?,
            page_count: row.get("page_count")?,
            suggestion_status: row.get("suggestion_status")?,
            document_status: row.get("document_status")?,
            last_error: row.get("last_error")?,
            stage_started_ms: row.get("stage_started_ms")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_model(self) -> Result<TrapDocumentRecord, DatabaseError> {
        Ok(TrapDocumentRecord {
            modifications: serde_json::from_str(&self.modifications)?,
            suggestion_status: parse_column::<SuggestionStatus>(
                "suggestion_status",
                &self.suggestion_status,
            )?,
            document_status: parse_column::<DocumentStatus>(
                "document_status",
                &self.document_status,
            )?,
            stage_started_at: self
                .stage_started_ms
                .map(|ms| {
                    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
                        DatabaseError::InvalidColumn {
                            column: "stage_started_ms",
                            reason: format!("{} is out of range", ms),
                        }
                    })
                })
                .transpose()?,
            created_at: parse_time("created_at", &self.created_at)?,
            updated_at: parse_time("updated_at", &self.updated_at)?,
            assignment_id: self.assignment_id,
            suggested_text: self.suggested_text,
            document_handle: self.document_handle,
            content_hash: self.content_hash,
            page_count: self.page_count,
            last_error: self.last_error,
        })
    }
}

fn placeholders(statuses: &[&str]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Creates the record in `pending/pending` unless one exists.
pub fn ensure(db: &Database, assignment_id: &str, now: DateTime<Utc>) -> Result<(), DatabaseError> {
    let record = TrapDocumentRecord::new(assignment_id, now);
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO trap_documents (assignment_id, modifications, suggestion_status,
             document_status, created_at, updated_at)
             VALUES (?1, '[]', ?2, ?3, ?4, ?4)",
            params![
                record.assignment_id,
                record.suggestion_status.as_str(),
                record.document_status.as_str(),
                format_time(&now),
            ],
        )?;
        Ok(())
    })
}

pub fn find(db: &Database, assignment_id: &str) -> Result<Option<TrapDocumentRecord>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM trap_documents WHERE assignment_id = ?1")?;
        let mut rows = stmt.query_map(params![assignment_id], TrapRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })?;
    row.map(TrapRow::into_model).transpose()
}

/// Held by whoever moved a stage into `processing` or `generating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLease {
    started_ms: i64,
}

/// Enters the running state of one stage column. `None` if the stage is
/// completed, or running inside its lease.
fn begin_stage(
    db: &Database,
    assignment_id: &str,
    column: &'static str,
    retryable: &[&str],
    running: &str,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<Option<StageLease>, DatabaseError> {
    let started_ms = now.timestamp_millis();
    let stale_before = (now - lease).timestamp_millis();
    let sql = format!(
        "UPDATE trap_documents
         SET {col} = ?2, last_error = NULL, stage_started_ms = ?3, updated_at = ?4
         WHERE assignment_id = ?1
           AND ({col} IN ({retryable})
                OR ({col} = ?2 AND (stage_started_ms IS NULL OR stage_started_ms < ?5)))",
        col = column,
        retryable = placeholders(retryable)
    );
    db.with_conn(|conn| {
        let previous: Option<String> = conn
            .query_row(
                &format!("SELECT {} FROM trap_documents WHERE assignment_id = ?1", column),
                params![assignment_id],
                |r| r.get(0),
            )
            .optional()?;
        let changed = conn.execute(
            &sql,
            params![
                assignment_id,
                running,
                started_ms,
                format_time(&now),
                stale_before
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        if previous.as_deref() == Some(running) {
            log::warn!(
                "Took over abandoned {} stage for assignment {}",
                column,
                assignment_id
            );
        }
        Ok(Some(StageLease { started_ms }))
    })
}

/// `pending|failed → processing`, or takes over a `processing` stage whose
/// lease ran out. `None` if another caller holds the stage.
pub fn begin_suggestion(
    db: &Database,
    assignment_id: &str,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<Option<StageLease>, DatabaseError> {
    let retryable: Vec<&str> = SuggestionStatus::RETRYABLE.iter().map(|s| s.as_str()).collect();
    begin_stage(
        db,
        assignment_id,
        "suggestion_status",
        &retryable,
        SuggestionStatus::Processing.as_str(),
        now,
        lease,
    )
}

/// `processing → completed`, storing the suggestion and the trap set.
pub fn complete_suggestion(
    db: &Database,
    assignment_id: &str,
    lease: StageLease,
    suggested_text: &str,
    modifications: &[Modification],
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let json = serde_json::to_string(modifications)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE trap_documents
             SET suggestion_status = ?2, suggested_text = ?3, modifications = ?4,
                 last_error = NULL, stage_started_ms = NULL, updated_at = ?5
             WHERE assignment_id = ?1 AND suggestion_status = ?6 AND stage_started_ms = ?7",
            params![
                assignment_id,
                SuggestionStatus::Completed.as_str(),
                suggested_text,
                json,
                format_time(&now),
                SuggestionStatus::Processing.as_str(),
                lease.started_ms,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// `processing → failed`, keeping the error for the instructor.
pub fn fail_suggestion(
    db: &Database,
    assignment_id: &str,
    lease: StageLease,
    error: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE trap_documents
             SET suggestion_status = ?2, last_error = ?3, stage_started_ms = NULL, updated_at = ?4
             WHERE assignment_id = ?1 AND suggestion_status = ?5 AND stage_started_ms = ?6",
            params![
                assignment_id,
                SuggestionStatus::Failed.as_str(),
                error,
                format_time(&now),
                SuggestionStatus::Processing.as_str(),
                lease.started_ms,
            ],
        )?;
        if changed == 1 {
            log::warn!("Suggestion stage failed for assignment {}: {}", assignment_id, error);
        }
        Ok(changed == 1)
    })
}

/// `pending|failed → generating`, or takes over an abandoned run.
pub fn begin_document(
    db: &Database,
    assignment_id: &str,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<Option<StageLease>, DatabaseError> {
    let retryable: Vec<&str> = DocumentStatus::RETRYABLE.iter().map(|s| s.as_str()).collect();
    begin_stage(
        db,
        assignment_id,
        "document_status",
        &retryable,
        DocumentStatus::Generating.as_str(),
        now,
        lease,
    )
}

/// The stored parts of a generated document.
#[derive(Debug, Clone)]
pub struct GeneratedDocument<'a> {
    pub handle: &'a str,
    pub content_hash: &'a str,
    pub page_count: u32,
    /// The trap set with pages filled in.
    pub modifications: &'a [Modification],
}

/// `generating → completed`.
pub fn complete_document(
    db: &Database,
    assignment_id: &str,
    lease: StageLease,
    document: &GeneratedDocument<'_>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let json = serde_json::to_string(document.modifications)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE trap_documents
             SET document_status = ?2, document_handle = ?3, content_hash = ?4, page_count = ?5,
                 modifications = ?6, last_error = NULL, stage_started_ms = NULL, updated_at = ?7
             WHERE assignment_id = ?1 AND document_status = ?8 AND stage_started_ms = ?9",
            params![
                assignment_id,
                DocumentStatus::Completed.as_str(),
                document.handle,
                document.content_hash,
                document.page_count,
                json,
                format_time(&now),
                DocumentStatus::Generating.as_str(),
                lease.started_ms,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// `generating → failed`.
pub fn fail_document(
    db: &Database,
    assignment_id: &str,
    lease: StageLease,
    error: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE trap_documents
             SET document_status = ?2, last_error = ?3, stage_started_ms = NULL, updated_at = ?4
             WHERE assignment_id = ?1 AND document_status = ?5 AND stage_started_ms = ?6",
            params![
                assignment_id,
                DocumentStatus::Failed.as_str(),
                error,
                format_time(&now),
                DocumentStatus::Generating.as_str(),
                lease.started_ms,
            ],
        )?;
        if changed == 1 {
            log::warn!("Document stage failed for assignment {}: {}", assignment_id, error);
        }
        Ok(changed == 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::assignment_repo;
    use crate::lifecycle::AssignmentStatus;
    use crate::model::{Assignment, ModificationKind};

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        assignment_repo::insert(
            &db,
            &Assignment {
                id: "a1".to_string(),
                course_id: "c1".to_string(),
                instructor_id: "i1".to_string(),
                title: "T".to_string(),
                instructions: "There are 6 apples.".to_string(),
                due_date: now,
                max_score: 10,
                is_published: false,
                status: AssignmentStatus::InstructionsSaved,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        ensure(&db, "a1", now).unwrap();
        db
    }

    fn trap() -> Modification {
        Modification {
            original_text: "6".to_string(),
            modified_text: "11".to_string(),
            start_index: 10,
            end_index: 11,
            page: None,
            kind: ModificationKind::Number,
            suggestion: Some("There are 11 apples.".to_string()),
        }
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let db = setup();
        ensure(&db, "a1", Utc::now()).unwrap();
        let record = find(&db, "a1").unwrap().unwrap();
        assert_eq!(record.suggestion_status, SuggestionStatus::Pending);
        assert_eq!(record.document_status, DocumentStatus::Pending);
        assert!(record.modifications.is_empty());
    }

    fn lease() -> Duration {
        Duration::minutes(10)
    }

    #[test]
    fn test_concurrent_begin_only_one_wins() {
        let db = setup();
        let now = Utc::now();
        assert!(begin_suggestion(&db, "a1", now, lease()).unwrap().is_some());
        assert!(begin_suggestion(&db, "a1", now, lease()).unwrap().is_none());
    }

    #[test]
    fn test_expired_lease_is_taken_over() {
        let db = setup();
        let started = Utc::now() - Duration::minutes(30);
        let abandoned = begin_suggestion(&db, "a1", started, lease()).unwrap().unwrap();

        let record = find(&db, "a1").unwrap().unwrap();
        assert_eq!(record.suggestion_status, SuggestionStatus::Processing);
        assert_eq!(
            record.stage_started_at.map(|t| t.timestamp_millis()),
            Some(abandoned.started_ms)
        );
        assert!(!record.stage_running(Utc::now(), lease()));

        let now = Utc::now();
        let current = begin_suggestion(&db, "a1", now, lease()).unwrap().unwrap();
        assert_ne!(current, abandoned);

        // The abandoned run can no longer finish the stage.
        assert!(!complete_suggestion(&db, "a1", abandoned, "stale", &[trap()], now).unwrap());
        assert!(!fail_suggestion(&db, "a1", abandoned, "late timeout", now).unwrap());
        assert!(complete_suggestion(&db, "a1", current, "There are 11 apples.", &[trap()], now).unwrap());

        let record = find(&db, "a1").unwrap().unwrap();
        assert_eq!(record.suggested_text.as_deref(), Some("There are 11 apples."));
        assert!(record.stage_started_at.is_none());
    }

    #[test]
    fn test_live_document_lease_blocks_takeover() {
        let db = setup();
        let now = Utc::now();
        let held = begin_document(&db, "a1", now - Duration::minutes(1), lease()).unwrap();
        assert!(held.is_some());
        assert!(begin_document(&db, "a1", now, lease()).unwrap().is_none());
        assert!(begin_document(&db, "a1", now + Duration::minutes(15), lease())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_concurrent_begin_across_threads() {
        let db = setup();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || {
                    begin_document(&db, "a1", Utc::now(), lease())
                        .unwrap()
                        .is_some()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_failed_stage_can_retry() {
        let db = setup();
        let now = Utc::now();
        let first = begin_suggestion(&db, "a1", now, lease()).unwrap().unwrap();
        assert!(fail_suggestion(&db, "a1", first, "timeout", now).unwrap());

        let record = find(&db, "a1").unwrap().unwrap();
        assert_eq!(record.suggestion_status, SuggestionStatus::Failed);
        assert_eq!(record.last_error.as_deref(), Some("timeout"));

        let retry = begin_suggestion(&db, "a1", now, lease()).unwrap().unwrap();
        assert!(complete_suggestion(&db, "a1", retry, "There are 11 apples.", &[trap()], now).unwrap());

        let record = find(&db, "a1").unwrap().unwrap();
        assert_eq!(record.suggestion_status, SuggestionStatus::Completed);
        assert_eq!(record.modifications, vec![trap()]);
        assert!(record.last_error.is_none());

        // Completed stages do not restart.
        assert!(begin_suggestion(&db, "a1", now, lease()).unwrap().is_none());
    }

    #[test]
    fn test_complete_requires_processing() {
        let db = setup();
        let lease = StageLease {
            started_ms: Utc::now().timestamp_millis(),
        };
        assert!(!complete_suggestion(&db, "a1", lease, "x", &[], Utc::now()).unwrap());
        assert!(!fail_document(&db, "a1", lease, "x", Utc::now()).unwrap());
    }

    #[test]
    fn test_document_stage() {
        let db = setup();
        let now = Utc::now();
        let held = begin_document(&db, "a1", now, lease()).unwrap().unwrap();
        let mut placed = trap();
        placed.page = Some(1);
        let mods = [placed];
        let doc = GeneratedDocument {
            handle: "trap-documents/a1.pdf",
            content_hash: "abc123",
            page_count: 1,
            modifications: &mods,
        };
        assert!(complete_document(&db, "a1", held, &doc, now).unwrap());

        let record = find(&db, "a1").unwrap().unwrap();
        assert_eq!(record.document_status, DocumentStatus::Completed);
        assert_eq!(record.document_handle.as_deref(), Some("trap-documents/a1.pdf"));
        assert_eq!(record.page_count, Some(1));
        assert_eq!(record.modifications[0].page, Some(1));
    }
}
