use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("gradebook.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// In-memory database with the full schema. Used by tests and by callers
/// that manage persistence themselves.
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            roll_number TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS instructors(
            instructor_id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            course_code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            instructor_id TEXT NOT NULL,
            grading_scheme TEXT NOT NULL DEFAULT 'linear',
            FOREIGN KEY(instructor_id) REFERENCES instructors(instructor_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_instructor ON courses(instructor_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            roll_number TEXT NOT NULL,
            course_code TEXT NOT NULL,
            PRIMARY KEY(roll_number, course_code),
            FOREIGN KEY(roll_number) REFERENCES students(roll_number),
            FOREIGN KEY(course_code) REFERENCES courses(course_code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_course ON enrollments(course_code)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS graded_components(
            id TEXT PRIMARY KEY,
            course_code TEXT NOT NULL,
            name TEXT NOT NULL,
            percentage REAL NOT NULL,
            FOREIGN KEY(course_code) REFERENCES courses(course_code),
            UNIQUE(course_code, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_graded_components_course ON graded_components(course_code)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS component_scores(
            component_id TEXT NOT NULL,
            roll_number TEXT NOT NULL,
            score REAL NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(component_id, roll_number),
            FOREIGN KEY(component_id) REFERENCES graded_components(id),
            FOREIGN KEY(roll_number) REFERENCES students(roll_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_component_scores_student ON component_scores(roll_number)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assigned_grades(
            roll_number TEXT NOT NULL,
            course_code TEXT NOT NULL,
            grade REAL NOT NULL,
            assigner_id TEXT NOT NULL,
            assigned_at TEXT,
            PRIMARY KEY(roll_number, course_code),
            FOREIGN KEY(roll_number) REFERENCES students(roll_number),
            FOREIGN KEY(course_code) REFERENCES courses(course_code),
            FOREIGN KEY(assigner_id) REFERENCES instructors(instructor_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assigned_grades_course ON assigned_grades(course_code)",
        [],
    )?;

    // Early workspaces predate the audit columns. Add them if missing.
    ensure_component_scores_updated_at(conn)?;
    ensure_assigned_grades_audit_columns(conn)?;

    Ok(())
}

fn ensure_component_scores_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "component_scores", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE component_scores ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn ensure_assigned_grades_audit_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "assigned_grades", "assigner_id")? {
        conn.execute(
            "ALTER TABLE assigned_grades ADD COLUMN assigner_id TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }
    if !table_has_column(conn, "assigned_grades", "assigned_at")? {
        conn.execute("ALTER TABLE assigned_grades ADD COLUMN assigned_at TEXT", [])?;
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
