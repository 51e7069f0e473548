use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "classroom.sqlite3";

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            teacher_id TEXT NOT NULL,
            pin TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    // PIN -> classroom. Rows are hard-deleted, so the index only holds active PINs.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_classrooms_pin ON classrooms(pin)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classrooms_teacher ON classrooms(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            classroom_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            display_name TEXT,
            enrolled_at TEXT NOT NULL,
            PRIMARY KEY(classroom_id, student_id),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            video_ref TEXT,
            notes_ref TEXT,
            sort_order INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_classroom_sort ON lessons(classroom_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            lesson_id TEXT,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            document_ref TEXT,
            due_date TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id),
            FOREIGN KEY(lesson_id) REFERENCES lessons(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_classroom ON assignments(classroom_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_lesson ON assignments(lesson_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            content TEXT,
            document_ref TEXT,
            submitted_at TEXT NOT NULL,
            grade INTEGER,
            feedback TEXT,
            graded_at TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            UNIQUE(assignment_id, student_id)
        )",
        [],
    )?;
    ensure_submissions_content_hash(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_assignment ON submissions(assignment_id, submitted_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_student ON submissions(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS video_progress(
            student_id TEXT NOT NULL,
            lesson_id TEXT NOT NULL,
            watched_seconds REAL NOT NULL,
            total_seconds REAL NOT NULL,
            is_completed INTEGER NOT NULL DEFAULT 0,
            last_watched_at TEXT NOT NULL,
            PRIMARY KEY(student_id, lesson_id),
            FOREIGN KEY(lesson_id) REFERENCES lessons(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_video_progress_lesson ON video_progress(lesson_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

/// Opens a single-writer transaction. Holding the RESERVED lock for the
/// whole read-modify-write keeps check-then-act sequences atomic even across
/// processes sharing the workspace file.
pub fn write_tx(conn: &Connection) -> rusqlite::Result<Transaction<'_>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
}

/// Opens a read transaction so multi-query reads see one snapshot.
pub fn read_tx(conn: &Connection) -> rusqlite::Result<Transaction<'_>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Deferred)
}

pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn ensure_submissions_content_hash(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "submissions", "content_hash")? {
        return Ok(());
    }
    // Older workspaces predate hashing; an empty hash never matches a fresh one.
    conn.execute(
        "ALTER TABLE submissions ADD COLUMN content_hash TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_dir;
    use super::*;
    use serde_json::json;

    #[test]
    fn open_is_idempotent_and_settings_roundtrip() {
        let ws = temp_dir("classroomd-db-open");
        {
            let conn = open_db(&ws).expect("first open");
            settings_set_json(&conn, "setup.progress", &json!({ "completionThreshold": 0.8 }))
                .expect("set");
        }
        let conn = open_db(&ws).expect("second open");
        assert!(table_has_column(&conn, "submissions", "content_hash").expect("pragma"));
        let v = settings_get_json(&conn, "setup.progress").expect("get");
        assert_eq!(v, Some(json!({ "completionThreshold": 0.8 })));
        assert_eq!(settings_get_json(&conn, "setup.missing").expect("get"), None);
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = now_ts();
        std::thread::sleep(Duration::from_millis(2));
        let b = now_ts();
        assert!(a < b, "{a} !< {b}");
        assert!(a.ends_with('Z'));
    }
}
