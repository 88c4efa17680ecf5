//! Assignment repository: CRUD for the `assignments` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{format_time, parse_column, parse_time, Database, DatabaseError};
use crate::lifecycle::{AssignmentStatus, DocumentStatus};
use crate::model::Assignment;

/// A raw assignment row from the database.
#[derive(Debug, Clone)]
struct AssignmentRow {
    id: String,
    course_id: String,
    instructor_id: String,
    title: String,
    instructions: String,
    due_date: String,
    max_score: u32,
    is_published: bool,
    status: String,
    created_at: String,
    updated_at: String,
}

impl AssignmentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            course_id: row.get("course_id")?,
            instructor_id: row.get("instructor_id")?,
            title: row.get("title")?,
            instructions: row.get("instructions")?,
            due_date: row.get("due_date")?,
            max_score: row.get("max_score")?,
            is_published: row.get("is_published")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_model(self) -> Result<Assignment, DatabaseError> {
        Ok(Assignment {
            due_date: parse_time("due_date", &self.due_date)?,
            status: parse_column::<AssignmentStatus>("status", &self.status)?,
            created_at: parse_time("created_at", &self.created_at)?,
            updated_at: parse_time("updated_at", &self.updated_at)?,
            id: self.id,
            course_id: self.course_id,
            instructor_id: self.instructor_id,
            title: self.title,
            instructions: self.instructions,
            max_score: self.max_score,
            is_published: self.is_published,
        })
    }
}

pub fn insert(db: &Database, assignment: &Assignment) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO assignments (id, course_id, instructor_id, title, instructions, due_date,
             max_score, is_published, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                assignment.id,
                assignment.course_id,
                assignment.instructor_id,
                assignment.title,
                assignment.instructions,
                format_time(&assignment.due_date),
                assignment.max_score,
                assignment.is_published,
                assignment.status.as_str(),
                format_time(&assignment.created_at),
                format_time(&assignment.updated_at),
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Assignment>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM assignments WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], AssignmentRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })?;
    row.map(AssignmentRow::into_model).transpose()
}

pub fn list_by_course(db: &Database, course_id: &str) -> Result<Vec<Assignment>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM assignments WHERE course_id = ?1 ORDER BY due_date ASC, created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![course_id], AssignmentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(AssignmentRow::into_model).collect()
}

/// Replaces the instructions text while the status is still `from`.
/// Returns false if the status moved on concurrently.
pub fn save_instructions(
    db: &Database,
    id: &str,
    instructions: &str,
    from: AssignmentStatus,
    to: AssignmentStatus,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE assignments SET instructions = ?2, status = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?3",
            params![id, instructions, from.as_str(), to.as_str(), format_time(&now)],
        )?;
        Ok(changed == 1)
    })
}

/// Replaces the instructions of an assignment that already has (or is
/// building) a trap set, moving it back to `instructions_saved` and
/// dropping the trap record so the next suggestion starts from the new
/// text. Refused while a stage runs inside its lease or once a document
/// exists. Returns false if the row left `from` or a stage got in the way.
pub fn revise_instructions(
    db: &Database,
    id: &str,
    instructions: &str,
    from: AssignmentStatus,
    stale_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;

        let changed = tx.execute(
            "UPDATE assignments SET instructions = ?2, status = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?3",
            params![
                id,
                instructions,
                from.as_str(),
                AssignmentStatus::InstructionsSaved.as_str(),
                format_time(&now)
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        let existing: u32 = tx.query_row(
            "SELECT COUNT(*) FROM trap_documents WHERE assignment_id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        // `stage_started_ms` is only set while a stage runs.
        let removed = tx.execute(
            "DELETE FROM trap_documents
             WHERE assignment_id = ?1
               AND document_status != ?2
               AND (stage_started_ms IS NULL OR stage_started_ms < ?3)",
            params![
                id,
                DocumentStatus::Completed.as_str(),
                stale_before.timestamp_millis(),
            ],
        )?;
        if removed as u32 != existing {
            return Ok(false);
        }

        tx.commit()?;
        log::debug!("Assignment {} instructions revised from {}", id, from);
        Ok(true)
    })
}

/// Moves `from → to` if the row is still at `from`. Publishing also sets
/// the visibility flag.
pub fn advance_status(
    db: &Database,
    id: &str,
    from: AssignmentStatus,
    to: AssignmentStatus,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE assignments
             SET status = ?3, is_published = (is_published OR ?4), updated_at = ?5
             WHERE id = ?1 AND status = ?2",
            params![
                id,
                from.as_str(),
                to.as_str(),
                to == AssignmentStatus::Published,
                format_time(&now)
            ],
        )?;
        if changed == 1 {
            log::debug!("Assignment {} moved {} -> {}", id, from, to);
        }
        Ok(changed == 1)
    })
}
