//! Interview session repository. Turns are stored as a JSON array and the
//! whole session is rewritten on every save.

use rusqlite::{params, Row};

use super::{format_time, parse_column, parse_time, Database, DatabaseError};
use crate::interview::{InterviewSession, InterviewState, Verdict};

#[derive(Debug, Clone)]
struct SessionRow {
    id: String,
    submission_id: String,
    state: String,
    turns: String,
    verdict: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            submission_id: row.get("submission_id")?,
            state: row.get("state")?,
            turns: row.get("turns")?,
            verdict: row.get("verdict")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_model(self) -> Result<InterviewSession, DatabaseError> {
        Ok(InterviewSession {
            state: parse_column::<InterviewState>("state", &self.state)?,
            turns: serde_json::from_str(&self.turns)?,
            verdict: self
                .verdict
                .as_deref()
                .map(|v| parse_column::<Verdict>("verdict", v))
                .transpose()?,
            created_at: parse_time("created_at", &self.created_at)?,
            updated_at: parse_time("updated_at", &self.updated_at)?,
            id: self.id,
            submission_id: self.submission_id,
        })
    }
}

/// Inserts or fully rewrites the session.
pub fn save(db: &Database, session: &InterviewSession) -> Result<(), DatabaseError> {
    let turns = serde_json::to_string(&session.turns)?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO interview_sessions (id, submission_id, state, turns, verdict,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
                state = excluded.state,
                turns = excluded.turns,
                verdict = excluded.verdict,
                updated_at = excluded.updated_at",
            params![
                session.id,
                session.submission_id,
                session.state.as_str(),
                turns,
                session.verdict.map(|v| v.as_str()),
                format_time(&session.created_at),
                format_time(&session.updated_at),
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<InterviewSession>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM interview_sessions WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], SessionRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })?;
    row.map(SessionRow::into_model).transpose()
}

/// The most recent session for a submission.
pub fn find_latest_for_submission(
    db: &Database,
    submission_id: &str,
) -> Result<Option<InterviewSession>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM interview_sessions WHERE submission_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![submission_id], SessionRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })?;
    row.map(SessionRow::into_model).transpose()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::{assignment_repo, submission_repo};
    use crate::decision::FlagDecision;
    use crate::interview::Role;
    use crate::lifecycle::AssignmentStatus;
    use crate::model::{Assignment, Submission};

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
                instructions: "Count.".to_string(),
                due_date: now,
                max_score: 10,
                is_published: true,
                status: AssignmentStatus::Published,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        submission_repo::upsert(
            &db,
            &Submission {
                id: "x1".to_string(),
                assignment_id: "a1".to_string(),
                student_id: "stu-1".to_string(),
                file_handle: None,
                file_hash: None,
                extracted_text: Some("11 apples".to_string()),
                text_extracted: true,
                score: Some(1.0),
                decision: FlagDecision::PendingInterview,
                interview_id: None,
                verdict: None,
                submitted_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        db
    }

    #[test]
    fn test_save_and_reload_turns() {
        let db = setup();
        let mut session = InterviewSession::new("iv1", "x1");
        session.offer().unwrap();
        save(&db, &session).unwrap();

        session.start().unwrap();
        session.record(Role::Agent, "Summarize please").unwrap();
        session.record(Role::Student, "Apples were counted").unwrap();
        save(&db, &session).unwrap();

        let loaded = find_by_id(&db, "iv1").unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(loaded.is_resumable());
    }

    #[test]
    fn test_completed_session_keeps_verdict() {
        let db = setup();
        let mut session = InterviewSession::new("iv1", "x1");
        session.offer().unwrap();
        session.start().unwrap();
        session.complete(Verdict::Unclear).unwrap();
        save(&db, &session).unwrap();

        let loaded = find_latest_for_submission(&db, "x1").unwrap().unwrap();
        assert_eq!(loaded.state, InterviewState::Completed);
        assert_eq!(loaded.verdict, Some(Verdict::Unclear));
        assert!(find_latest_for_submission(&db, "nope").unwrap().is_none());
    }
}
