use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GradebookError, Result};

/// Course grading scheme. Stored as text; parsed and rejected at this
/// boundary on both read and write so unknown values never reach banding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingScheme {
    Linear,
    Gaussian,
    Random,
}

impl GradingScheme {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "linear" => Ok(GradingScheme::Linear),
            "gaussian" => Ok(GradingScheme::Gaussian),
            "random" => Ok(GradingScheme::Random),
            other => Err(GradebookError::InvalidScheme(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GradingScheme::Linear => "linear",
            GradingScheme::Gaussian => "gaussian",
            GradingScheme::Random => "random",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub roll_number: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_code: String,
    pub name: String,
    pub instructor_id: String,
    pub grading_scheme: GradingScheme,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedComponent {
    pub id: String,
    pub name: String,
    pub percentage: f64,
}

/// An existing score row joined with its component definition. Absent rows
/// mean "not yet graded" and are never materialized as zeros.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScore {
    pub component_name: String,
    pub percentage: f64,
    pub score: f64,
}

/// One existing score row for any student in a course; the raw material for
/// class statistics and ranking.
#[derive(Debug, Clone)]
pub struct ScoredRow {
    pub roll_number: String,
    pub percentage: f64,
    pub score: f64,
}

/// A course as seen from a student's enrollment list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub course_code: String,
    pub name: String,
    pub instructor_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRef {
    pub course_code: String,
    pub name: String,
}

/// One requested score change, addressed by component name within the
/// course. Applied as part of an atomic batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEdit {
    pub component_name: String,
    pub score: f64,
}

pub fn add_student(conn: &Connection, roll_number: &str, name: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO students(roll_number, name) VALUES(?, ?)",
        (roll_number, name),
    )?;
    Ok(())
}

pub fn add_instructor(conn: &Connection, instructor_id: &str, name: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO instructors(instructor_id, name) VALUES(?, ?)",
        (instructor_id, name),
    )?;
    Ok(())
}

pub fn add_course(
    conn: &Connection,
    course_code: &str,
    name: &str,
    instructor_id: &str,
    scheme: GradingScheme,
) -> Result<()> {
    conn.execute(
        "INSERT INTO courses(course_code, name, instructor_id, grading_scheme)
         VALUES(?, ?, ?, ?)",
        (course_code, name, instructor_id, scheme.as_str()),
    )?;
    Ok(())
}

pub fn enroll(conn: &Connection, roll_number: &str, course_code: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO enrollments(roll_number, course_code) VALUES(?, ?)",
        (roll_number, course_code),
    )?;
    Ok(())
}

pub fn add_component(
    conn: &Connection,
    course_code: &str,
    name: &str,
    percentage: f64,
) -> Result<GradedComponent> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO graded_components(id, course_code, name, percentage)
         VALUES(?, ?, ?, ?)",
        (&id, course_code, name, percentage),
    )?;
    Ok(GradedComponent {
        id,
        name: name.to_string(),
        percentage,
    })
}

pub fn course_exists(conn: &Connection, course_code: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM courses WHERE course_code = ?",
            [course_code],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn student_exists(conn: &Connection, roll_number: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE roll_number = ?",
            [roll_number],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn student_enrolled(conn: &Connection, roll_number: &str, course_code: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE roll_number = ? AND course_code = ?",
            (roll_number, course_code),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn fetch_course(conn: &Connection, course_code: &str) -> Result<Course> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT name, instructor_id, grading_scheme FROM courses WHERE course_code = ?",
            [course_code],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((name, instructor_id, raw_scheme)) = row else {
        return Err(GradebookError::not_found("course", course_code));
    };
    Ok(Course {
        course_code: course_code.to_string(),
        name,
        instructor_id,
        grading_scheme: GradingScheme::parse(&raw_scheme)?,
    })
}

pub fn fetch_scheme(conn: &Connection, course_code: &str) -> Result<GradingScheme> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT grading_scheme FROM courses WHERE course_code = ?",
            [course_code],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => GradingScheme::parse(&raw),
        None => Err(GradebookError::not_found("course", course_code)),
    }
}

pub fn set_scheme(conn: &Connection, course_code: &str, scheme: GradingScheme) -> Result<()> {
    let changed = conn.execute(
        "UPDATE courses SET grading_scheme = ? WHERE course_code = ?",
        (scheme.as_str(), course_code),
    )?;
    if changed == 0 {
        return Err(GradebookError::not_found("course", course_code));
    }
    Ok(())
}

pub fn fetch_components(conn: &Connection, course_code: &str) -> Result<Vec<GradedComponent>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, percentage
         FROM graded_components
         WHERE course_code = ?
         ORDER BY name",
    )?;
    let rows = stmt
        .query_map([course_code], |r| {
            Ok(GradedComponent {
                id: r.get(0)?,
                name: r.get(1)?,
                percentage: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<rusqlite::Result<Vec<_>>>())?;
    Ok(rows)
}

/// Score rows one student holds in one course, joined with their component
/// definitions. Components the student has no row for are simply absent.
pub fn fetch_scores(
    conn: &Connection,
    roll_number: &str,
    course_code: &str,
) -> Result<Vec<ComponentScore>> {
    let mut stmt = conn.prepare(
        "SELECT gc.name, gc.percentage, cs.score
         FROM component_scores cs
         JOIN graded_components gc ON gc.id = cs.component_id
         WHERE cs.roll_number = ? AND gc.course_code = ?
         ORDER BY gc.name",
    )?;
    let rows = stmt
        .query_map((roll_number, course_code), |r| {
            Ok(ComponentScore {
                component_name: r.get(0)?,
                percentage: r.get(1)?,
                score: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<rusqlite::Result<Vec<_>>>())?;
    Ok(rows)
}

/// Every score row in the course, ordered by roll number so callers can
/// group per student in one pass.
pub fn fetch_scored_rows(conn: &Connection, course_code: &str) -> Result<Vec<ScoredRow>> {
    let mut stmt = conn.prepare(
        "SELECT cs.roll_number, gc.percentage, cs.score
         FROM component_scores cs
         JOIN graded_components gc ON gc.id = cs.component_id
         WHERE gc.course_code = ?
         ORDER BY cs.roll_number",
    )?;
    let rows = stmt
        .query_map([course_code], |r| {
            Ok(ScoredRow {
                roll_number: r.get(0)?,
                percentage: r.get(1)?,
                score: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<rusqlite::Result<Vec<_>>>())?;
    Ok(rows)
}

/// Insert or overwrite one score, resolving the component by name within
/// the course. A miss on the component name fails the whole call so batch
/// callers can roll back.
pub fn upsert_component_score(
    conn: &Connection,
    course_code: &str,
    roll_number: &str,
    edit: &ScoreEdit,
) -> Result<()> {
    let component_id: Option<String> = conn
        .query_row(
            "SELECT id FROM graded_components WHERE course_code = ? AND name = ?",
            (course_code, &edit.component_name),
            |r| r.get(0),
        )
        .optional()?;
    let Some(component_id) = component_id else {
        return Err(GradebookError::not_found(
            "component",
            format!("{}/{}", course_code, edit.component_name),
        ));
    };

    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    conn.execute(
        "INSERT INTO component_scores(component_id, roll_number, score, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(component_id, roll_number) DO UPDATE SET
           score = excluded.score,
           updated_at = excluded.updated_at",
        (&component_id, roll_number, edit.score, &now),
    )?;
    Ok(())
}

pub fn student_courses(conn: &Connection, roll_number: &str) -> Result<Vec<CourseSummary>> {
    let mut stmt = conn.prepare(
        "SELECT c.course_code, c.name, i.name
         FROM enrollments e
         JOIN courses c ON c.course_code = e.course_code
         JOIN instructors i ON i.instructor_id = c.instructor_id
         WHERE e.roll_number = ?
         ORDER BY c.course_code",
    )?;
    let rows = stmt
        .query_map([roll_number], |r| {
            Ok(CourseSummary {
                course_code: r.get(0)?,
                name: r.get(1)?,
                instructor_name: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<rusqlite::Result<Vec<_>>>())?;
    Ok(rows)
}

pub fn instructor_courses(conn: &Connection, instructor_id: &str) -> Result<Vec<CourseRef>> {
    let mut stmt = conn.prepare(
        "SELECT course_code, name
         FROM courses
         WHERE instructor_id = ?
         ORDER BY course_code",
    )?;
    let rows = stmt
        .query_map([instructor_id], |r| {
            Ok(CourseRef {
                course_code: r.get(0)?,
                name: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<rusqlite::Result<Vec<_>>>())?;
    Ok(rows)
}

pub fn enrolled_students(conn: &Connection, course_code: &str) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT s.roll_number, s.name
         FROM enrollments e
         JOIN students s ON s.roll_number = e.roll_number
         WHERE e.course_code = ?
         ORDER BY s.roll_number",
    )?;
    let rows = stmt
        .query_map([course_code], |r| {
            Ok(Student {
                roll_number: r.get(0)?,
                name: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<rusqlite::Result<Vec<_>>>())?;
    Ok(rows)
}
