//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_assignments_table",
        sql: include_str!("sql/001_create_assignments.sql"),
    },
    Migration {
        version: 2,
        description: "create_trap_documents_table",
        sql: include_str!("sql/002_create_trap_documents.sql"),
    },
    Migration {
        version: 3,
        description: "create_submissions_table",
        sql: include_str!("sql/003_create_submissions.sql"),
    },
    Migration {
        version: 4,
        description: "create_interview_sessions_table",
        sql: include_str!("sql/004_create_interview_sessions.sql"),
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = fresh();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table)).unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_tables_carry_tracking_columns() {
        let conn = fresh();
        assert!(columns(&conn, "submissions").contains(&"file_hash".to_string()));
        assert!(columns(&conn, "trap_documents").contains(&"stage_started_ms".to_string()));
    }

    #[test]
    fn test_submission_pair_is_unique() {
        let conn = fresh();
        conn.execute(
            "INSERT INTO assignments (id, course_id, instructor_id, title, due_date, created_at, updated_at)
             VALUES ('a1', 'c1', 'i1', 'T', '2026-01-01', '2026-01-01', '2026-01-01')",
            [],
        )
        .unwrap();
        let insert = "INSERT INTO submissions (id, assignment_id, student_id, submitted_at, updated_at)
                      VALUES (?1, 'a1', 's1', '2026-01-01', '2026-01-01')";
        conn.execute(insert, ["x1"]).unwrap();
        assert!(conn.execute(insert, ["x2"]).is_err());
    }
}
