use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "academy.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grade TEXT NOT NULL,
            parent_phone TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_name ON students(name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_schedules(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            weekday INTEGER NOT NULL,
            expected_time TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, weekday)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_schedules_weekday ON student_schedules(weekday)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            check_in TEXT,
            check_out TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS daily_logs(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            teacher_note TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, date)
        )",
        [],
    )?;
    // Workspaces created before the follow-up fields existed only have teacher_note.
    ensure_daily_logs_followup_columns(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_daily_logs_date ON daily_logs(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS daily_tasks(
            id TEXT PRIMARY KEY,
            daily_log_id TEXT NOT NULL,
            content TEXT NOT NULL,
            grading_done INTEGER NOT NULL DEFAULT 0,
            review_done INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(daily_log_id) REFERENCES daily_logs(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_daily_tasks_log ON daily_tasks(daily_log_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS consultations(
            id TEXT PRIMARY KEY,
            student_id TEXT,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            parent_name TEXT,
            content TEXT,
            notes TEXT,
            status TEXT NOT NULL DEFAULT 'scheduled',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    ensure_consultations_snapshot_columns(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_consultations_date ON consultations(date, time)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            token TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            display_name TEXT NOT NULL,
            issued_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_daily_logs_followup_columns(conn: &Connection) -> anyhow::Result<()> {
    for column in [
        "attendance_status",
        "absence_reason",
        "follow_up_action",
        "makeup_class_note",
        "exam_result",
    ] {
        if !table_has_column(conn, "daily_logs", column)? {
            conn.execute(
                &format!("ALTER TABLE daily_logs ADD COLUMN {} TEXT", column),
                [],
            )?;
        }
    }
    Ok(())
}

fn ensure_consultations_snapshot_columns(conn: &Connection) -> anyhow::Result<()> {
    // Snapshot the linked student's current name/grade into rows that predate the columns.
    if !table_has_column(conn, "consultations", "student_name")? {
        conn.execute(
            "ALTER TABLE consultations ADD COLUMN student_name TEXT NOT NULL DEFAULT ''",
            [],
        )?;
        conn.execute(
            "UPDATE consultations
             SET student_name = (SELECT name FROM students WHERE students.id = consultations.student_id)
             WHERE student_id IS NOT NULL
               AND EXISTS (SELECT 1 FROM students WHERE students.id = consultations.student_id)",
            [],
        )?;
    }
    if !table_has_column(conn, "consultations", "student_grade")? {
        conn.execute(
            "ALTER TABLE consultations ADD COLUMN student_grade TEXT",
            [],
        )?;
        conn.execute(
            "UPDATE consultations
             SET student_grade = (SELECT grade FROM students WHERE students.id = consultations.student_id)
             WHERE student_id IS NOT NULL",
            [],
        )?;
    }
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
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
    use super::*;

    #[test]
    fn open_db_is_idempotent_and_creates_core_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        drop(open_db(dir.path()).expect("first open"));
        let conn = open_db(dir.path()).expect("second open");
        for table in [
            "students",
            "student_schedules",
            "attendance",
            "daily_logs",
            "daily_tasks",
            "consultations",
            "sessions",
        ] {
            let n: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    [table],
                    |r| r.get(0),
                )
                .expect("query sqlite_master");
            assert_eq!(n, 1, "missing table {}", table);
        }
        assert!(table_has_column(&conn, "daily_logs", "exam_result").expect("column lookup"));
        assert!(table_has_column(&conn, "consultations", "student_grade").expect("column lookup"));
    }

    #[test]
    fn legacy_consultations_get_snapshot_columns_backfilled() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let conn = Connection::open(dir.path().join(DB_FILE)).expect("open raw");
            conn.execute_batch(
                "CREATE TABLE students(
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    grade TEXT NOT NULL,
                    parent_phone TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT
                 );
                 CREATE TABLE consultations(
                    id TEXT PRIMARY KEY,
                    student_id TEXT,
                    date TEXT NOT NULL,
                    time TEXT NOT NULL,
                    parent_name TEXT,
                    content TEXT,
                    notes TEXT,
                    status TEXT NOT NULL DEFAULT 'scheduled',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                 );
                 INSERT INTO students VALUES('s1', 'Lee', '9', NULL, '2024-01-01T00:00:00Z', NULL);
                 INSERT INTO consultations(id, student_id, date, time, created_at, updated_at)
                   VALUES('c1', 's1', '2024-06-12', '16:00:00', '2024-06-01T00:00:00Z', '2024-06-01T00:00:00Z');",
            )
            .expect("seed legacy schema");
        }

        let conn = open_db(dir.path()).expect("migrate");
        let (name, grade): (String, Option<String>) = conn
            .query_row(
                "SELECT student_name, student_grade FROM consultations WHERE id = 'c1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .expect("read migrated row");
        assert_eq!(name, "Lee");
        assert_eq!(grade.as_deref(), Some("9"));
    }
}
