use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::error::Result;

/// A durable grade decision. One row per student-course pair; a later
/// assignment overwrites the grade, assigner and timestamp. No history is
/// kept.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedGrade {
    pub roll_number: String,
    pub course_code: String,
    pub grade: f64,
    pub assigner_id: String,
    pub assigned_at: String,
}

pub fn upsert_grade(
    conn: &Connection,
    assigner_id: &str,
    roll_number: &str,
    course_code: &str,
    grade: f64,
) -> Result<AssignedGrade> {
    let assigned_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    conn.execute(
        "INSERT INTO assigned_grades(roll_number, course_code, grade, assigner_id, assigned_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(roll_number, course_code) DO UPDATE SET
           grade = excluded.grade,
           assigner_id = excluded.assigner_id,
           assigned_at = excluded.assigned_at",
        (roll_number, course_code, grade, assigner_id, &assigned_at),
    )?;
    Ok(AssignedGrade {
        roll_number: roll_number.to_string(),
        course_code: course_code.to_string(),
        grade,
        assigner_id: assigner_id.to_string(),
        assigned_at,
    })
}

pub fn fetch_grade(
    conn: &Connection,
    roll_number: &str,
    course_code: &str,
) -> Result<Option<AssignedGrade>> {
    let row = conn
        .query_row(
            "SELECT grade, assigner_id, assigned_at
             FROM assigned_grades
             WHERE roll_number = ? AND course_code = ?",
            (roll_number, course_code),
            |r| {
                Ok(AssignedGrade {
                    roll_number: roll_number.to_string(),
                    course_code: course_code.to_string(),
                    grade: r.get(0)?,
                    assigner_id: r.get(1)?,
                    assigned_at: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn course_grades(conn: &Connection, course_code: &str) -> Result<Vec<AssignedGrade>> {
    let mut stmt = conn.prepare(
        "SELECT roll_number, grade, assigner_id, assigned_at
         FROM assigned_grades
         WHERE course_code = ?
         ORDER BY roll_number",
    )?;
    let rows = stmt
        .query_map([course_code], |r| {
            Ok(AssignedGrade {
                roll_number: r.get(0)?,
                course_code: course_code.to_string(),
                grade: r.get(1)?,
                assigner_id: r.get(2)?,
                assigned_at: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })
        .and_then(|it| it.collect::<rusqlite::Result<Vec<_>>>())?;
    Ok(rows)
}
