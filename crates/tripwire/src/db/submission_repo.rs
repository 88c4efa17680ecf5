//! Submission repository. One row per (assignment, student); later uploads
//! update the row in place until an interview is linked to it.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{format_time, parse_column, parse_time, Database, DatabaseError};
use crate::decision::FlagDecision;
use crate::interview::Verdict;
use crate::model::Submission;

#[derive(Debug, Clone)]
struct SubmissionRow {
    id: String,
    assignment_id: String,
    student_id: String,
    file_handle: Option<String>,
    file_hash: Option<String>,
    extracted_text: Option<String>,
    text_extracted: bool,
    score: Option<f64>,
    decision: String,
    interview_id: Option<String>,
    verdict: Option<String>,
    submitted_at: String,
    updated_at: String,
}

impl SubmissionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            assignment_id: row.get("assignment_id")?,
            student_id: row.get("student_id")?,
            file_handle: row.get("file_handle")?,
            file_hash: row.get("file_hash")?,
            extracted_text: row.get("extracted_text")?,
            text_extracted: row.get("text_extracted")?,
            score: row.get("score")?,
            decision: row.get("decision")?,
            interview_id: row.get("interview_id")?,
            verdict: row.get("verdict")?,
            submitted_at: row.get("submitted_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_model(self) -> Result<Submission, DatabaseError> {
        Ok(Submission {
            decision: parse_column::<FlagDecision>("decision", &self.decision)?,
            verdict: self
                .verdict
                .as_deref()
                .map(|v| parse_column::<Verdict>("verdict", v))
                .transpose()?,
            submitted_at: parse_time("submitted_at", &self.submitted_at)?,
            updated_at: parse_time("updated_at", &self.updated_at)?,
            id: self.id,
            assignment_id: self.assignment_id,
            student_id: self.student_id,
            file_handle: self.file_handle,
            file_hash: self.file_hash,
            extracted_text: self.extracted_text,
            text_extracted: self.text_extracted,
            score: self.score,
            interview_id: self.interview_id,
        })
    }
}

fn select_one(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<SubmissionRow>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query_map(args, SubmissionRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Inserts the submission, or overwrites the existing row for the same
/// (assignment, student). The stored row keeps its original id, which is
/// what is returned. `None` when the existing row has an interview linked,
/// which freezes it.
pub fn upsert(db: &Database, submission: &Submission) -> Result<Option<Submission>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO submissions (id, assignment_id, student_id, file_handle, file_hash,
             extracted_text, text_extracted, score, decision, interview_id, verdict,
             submitted_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT (assignment_id, student_id) DO UPDATE SET
                file_handle = excluded.file_handle,
                file_hash = excluded.file_hash,
                extracted_text = excluded.extracted_text,
                text_extracted = excluded.text_extracted,
                score = excluded.score,
                decision = excluded.decision,
                interview_id = excluded.interview_id,
                verdict = excluded.verdict,
                submitted_at = excluded.submitted_at,
                updated_at = excluded.updated_at
             WHERE submissions.interview_id IS NULL",
            params![
                submission.id,
                submission.assignment_id,
                submission.student_id,
                submission.file_handle,
                submission.file_hash,
                submission.extracted_text,
                submission.text_extracted,
                submission.score,
                submission.decision.as_str(),
                submission.interview_id,
                submission.verdict.map(|v| v.as_str()),
                format_time(&submission.submitted_at),
                format_time(&submission.updated_at),
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        select_one(
            conn,
            "SELECT * FROM submissions WHERE assignment_id = ?1 AND student_id = ?2",
            params![submission.assignment_id, submission.student_id],
        )?
        .map(Some)
        .ok_or_else(|| DatabaseError::InvalidColumn {
            column: "id",
            reason: "upserted submission vanished".to_string(),
        })
    })?;

    row.map(SubmissionRow::into_model).transpose()
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Submission>, DatabaseError> {
    let row = db.with_conn(|conn| {
        select_one(conn, "SELECT * FROM submissions WHERE id = ?1", params![id])
    })?;
    row.map(SubmissionRow::into_model).transpose()
}

pub fn find_by_student(
    db: &Database,
    assignment_id: &str,
    student_id: &str,
) -> Result<Option<Submission>, DatabaseError> {
    let row = db.with_conn(|conn| {
        select_one(
            conn,
            "SELECT * FROM submissions WHERE assignment_id = ?1 AND student_id = ?2",
            params![assignment_id, student_id],
        )
    })?;
    row.map(SubmissionRow::into_model).transpose()
}

pub fn list_by_assignment(
    db: &Database,
    assignment_id: &str,
) -> Result<Vec<Submission>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM submissions WHERE assignment_id = ?1 ORDER BY submitted_at ASC",
        )?;
        let rows = stmt
            .query_map(params![assignment_id], SubmissionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(SubmissionRow::into_model).collect()
}

/// Records the interview link and the resulting decision, provided the row
/// still holds the upload and interview link `current` was read with.
pub fn update_outcome(
    db: &Database,
    current: &Submission,
    decision: FlagDecision,
    interview_id: Option<&str>,
    verdict: Option<Verdict>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE submissions SET decision = ?2, interview_id = ?3, verdict = ?4, updated_at = ?5
             WHERE id = ?1 AND interview_id IS ?6 AND submitted_at = ?7",
            params![
                current.id,
                decision.as_str(),
                interview_id,
                verdict.map(|v| v.as_str()),
                format_time(&now),
                current.interview_id,
                format_time(&current.submitted_at),
            ],
        )?;
        Ok(changed == 1)
    })
}
