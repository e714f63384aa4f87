use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;

pub fn open_store(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("studyhub.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL DEFAULT '',
            credits INTEGER NOT NULL DEFAULT 0,
            professor TEXT,
            color TEXT,
            current_grade REAL NOT NULL DEFAULT 0,
            progress REAL NOT NULL DEFAULT 0,
            next_assignment TEXT,
            schedule TEXT,
            created_on TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            due_date TEXT,
            priority TEXT NOT NULL DEFAULT 'medium',
            status TEXT NOT NULL DEFAULT 'pending',
            category TEXT NOT NULL DEFAULT 'assignment',
            weight REAL NOT NULL DEFAULT 0,
            grade REAL,
            description TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    ensure_assignments_description(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_course ON assignments(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_course_due ON assignments(course_id, due_date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            student_no TEXT NOT NULL DEFAULT '',
            course_id INTEGER,
            grade REAL,
            tags TEXT,
            birth_date TEXT,
            gender TEXT,
            section TEXT,
            guardian_name TEXT,
            contact_number TEXT,
            email TEXT,
            address TEXT,
            enrollment_date TEXT,
            nationality TEXT,
            category TEXT,
            emergency_contact TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    ensure_students_contact_columns(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_course ON students(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS what_if_scenarios(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            course_id INTEGER,
            assignment_id INTEGER,
            potential_grade REAL NOT NULL DEFAULT 0,
            created_on TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(assignment_id) REFERENCES assignments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_what_if_scenarios_course ON what_if_scenarios(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_predictions(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            course_id INTEGER,
            student_id INTEGER,
            scenario_id INTEGER,
            predicted_grade REAL NOT NULL DEFAULT 0,
            created_on TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(scenario_id) REFERENCES what_if_scenarios(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_predictions_course ON grade_predictions(course_id)",
        [],
    )?;

    Ok(conn)
}

/// Record creation stamp, RFC 3339 UTC. Stored as text alongside the record
/// so listings can order newest-first without a schema-level clock.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

fn ensure_assignments_description(conn: &Connection) -> anyhow::Result<()> {
    // Early workspaces predate the free-text description field.
    if table_has_column(conn, "assignments", "description")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE assignments ADD COLUMN description TEXT", [])?;
    Ok(())
}

fn ensure_students_contact_columns(conn: &Connection) -> anyhow::Result<()> {
    // The demographic/contact block arrived after the first roster schema.
    for col in [
        "birth_date",
        "gender",
        "section",
        "guardian_name",
        "contact_number",
        "email",
        "address",
        "enrollment_date",
        "nationality",
        "category",
        "emergency_contact",
    ] {
        if !table_has_column(conn, "students", col)? {
            conn.execute(
                &format!("ALTER TABLE students ADD COLUMN {} TEXT", col),
                [],
            )?;
        }
    }
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
