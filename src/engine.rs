use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::calc::{self, ScoredPart, StudentTotal};
use crate::error::{GradebookError, Result};
use crate::ledger::{self, AssignedGrade};
use crate::store::{self, GradingScheme, ScoreEdit, ScoredRow};

/// Weighted total plus the grade the active scheme would band it at right
/// now. `grade` is None when the scheme is `random` or the student has no
/// score rows yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalScore {
    pub weighted_total: f64,
    pub grade: Option<u8>,
}

/// One enrolled student on an instructor's course view. The live weighted
/// total and the committed grade are reported side by side; they are on
/// different scales and are never merged.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    pub roll_number: String,
    pub name: String,
    pub weighted_total: f64,
    pub assigned_grade: Option<f64>,
}

/// Group course score rows (ordered by roll number) into per-student
/// weighted totals. Students with no rows do not appear.
fn totals_by_student(rows: &[ScoredRow]) -> Vec<StudentTotal> {
    let mut totals: Vec<StudentTotal> = Vec::new();
    let mut i = 0;
    while i < rows.len() {
        let roll_number = rows[i].roll_number.clone();
        let mut parts: Vec<ScoredPart> = Vec::new();
        while i < rows.len() && rows[i].roll_number == roll_number {
            parts.push(ScoredPart {
                score: rows[i].score,
                percentage: rows[i].percentage,
            });
            i += 1;
        }
        totals.push(StudentTotal {
            roll_number,
            total: calc::weighted_total(parts),
        });
    }
    totals
}

/// Band every scored student in the course and commit the grades as one
/// transaction. Runs under the course's stored scheme; `random` and any
/// unrecognized scheme text are rejected before anything is written, and a
/// failure mid-commit rolls the whole batch back.
///
/// Re-running after scores change simply overwrites the previous batch.
pub fn assign_course_grades(
    conn: &Connection,
    assigner_id: &str,
    course_code: &str,
) -> Result<Vec<AssignedGrade>> {
    let tx = conn.unchecked_transaction()?;

    let scheme = store::fetch_scheme(&tx, course_code)?;
    match scheme {
        GradingScheme::Linear | GradingScheme::Gaussian => {}
        GradingScheme::Random => {
            return Err(GradebookError::InvalidScheme(scheme.as_str().to_string()))
        }
    }

    let rows = store::fetch_scored_rows(&tx, course_code)?;
    let mut totals = totals_by_student(&rows);
    let raw_totals: Vec<f64> = totals.iter().map(|t| t.total).collect();
    let Some(stats) = calc::class_stats(&raw_totals) else {
        return Err(GradebookError::NoData(course_code.to_string()));
    };
    if scheme == GradingScheme::Gaussian && stats.std_dev == 0.0 {
        warn!(course = course_code, "zero score spread; the whole class bands at 8");
    }
    calc::rank_totals(&mut totals);

    let class_size = totals.len();
    let mut committed = Vec::with_capacity(class_size);
    for (rank, entry) in totals.iter().enumerate() {
        // random was rejected above, so anything other than gaussian is linear
        let grade = if scheme == GradingScheme::Gaussian {
            calc::band_gaussian(entry.total, &stats)
        } else {
            calc::band_linear(rank, class_size)
        };
        committed.push(ledger::upsert_grade(
            &tx,
            assigner_id,
            &entry.roll_number,
            course_code,
            f64::from(grade),
        )?);
    }
    tx.commit()?;

    info!(
        course = course_code,
        scheme = scheme.as_str(),
        students = committed.len(),
        "course grades assigned"
    );
    committed.sort_by(|a, b| a.roll_number.cmp(&b.roll_number));
    Ok(committed)
}

/// Commit one final grade directly, bypassing the banding algorithms. Used
/// for manual overrides; the value lands in the same ledger and overwrites
/// any batch-assigned grade for the pair.
pub fn assign_final_grade(
    conn: &Connection,
    assigner_id: &str,
    roll_number: &str,
    course_code: &str,
    grade: f64,
) -> Result<AssignedGrade> {
    if !store::course_exists(conn, course_code)? {
        return Err(GradebookError::not_found("course", course_code));
    }
    if !store::student_exists(conn, roll_number)? {
        return Err(GradebookError::not_found("student", roll_number));
    }
    let committed = ledger::upsert_grade(conn, assigner_id, roll_number, course_code, grade)?;
    info!(
        roll = roll_number,
        course = course_code,
        grade,
        "final grade assigned"
    );
    Ok(committed)
}

/// Live standing for one student in one course, computed on the fly from
/// the score rows. Nothing is written.
pub fn total_score(conn: &Connection, roll_number: &str, course_code: &str) -> Result<TotalScore> {
    let scheme = store::fetch_scheme(conn, course_code)?;
    let scores = store::fetch_scores(conn, roll_number, course_code)?;
    if scores.is_empty() {
        return Ok(TotalScore {
            weighted_total: 0.0,
            grade: None,
        });
    }
    let weighted_total = calc::weighted_total(scores.iter().map(|s| ScoredPart {
        score: s.score,
        percentage: s.percentage,
    }));

    let grade = match scheme {
        GradingScheme::Random => None,
        GradingScheme::Gaussian => {
            let rows = store::fetch_scored_rows(conn, course_code)?;
            let raw_totals: Vec<f64> = totals_by_student(&rows).iter().map(|t| t.total).collect();
            calc::class_stats(&raw_totals).map(|stats| calc::band_gaussian(weighted_total, &stats))
        }
        GradingScheme::Linear => {
            let rows = store::fetch_scored_rows(conn, course_code)?;
            let mut totals = totals_by_student(&rows);
            calc::rank_totals(&mut totals);
            let class_size = totals.len();
            totals
                .iter()
                .position(|t| t.roll_number == roll_number)
                .map(|rank| calc::band_linear(rank, class_size))
        }
    };

    Ok(TotalScore {
        weighted_total,
        grade,
    })
}

/// Uniform score needed on every not-yet-graded component for the student
/// to reach `target` under the course's active scheme. Thresholds are a
/// snapshot of the current class; scoring the predicted marks would itself
/// move the statistics.
pub fn predict_required_marks(
    conn: &Connection,
    roll_number: &str,
    course_code: &str,
    target: f64,
) -> Result<calc::Prediction> {
    let scheme = store::fetch_scheme(conn, course_code)?;
    if scheme == GradingScheme::Random {
        return Err(GradebookError::InvalidScheme(scheme.as_str().to_string()));
    }

    let components = store::fetch_components(conn, course_code)?;
    let scores = store::fetch_scores(conn, roll_number, course_code)?;
    let current_total = calc::weighted_total(scores.iter().map(|s| ScoredPart {
        score: s.score,
        percentage: s.percentage,
    }));
    let scored_names: HashSet<&str> = scores.iter().map(|s| s.component_name.as_str()).collect();
    let remaining_weight: f64 = components
        .iter()
        .filter(|c| !scored_names.contains(c.name.as_str()))
        .map(|c| c.percentage)
        .sum();

    // Everything already graded: the outcome is fixed, nothing to predict.
    if remaining_weight <= 0.0 {
        return Err(GradebookError::Infeasible {
            target,
            current_total,
        });
    }
    let Some(band) = calc::band_at_least(target) else {
        return Err(GradebookError::Infeasible {
            target,
            current_total,
        });
    };

    let rows = store::fetch_scored_rows(conn, course_code)?;
    let mut totals = totals_by_student(&rows);
    let raw_totals: Vec<f64> = totals.iter().map(|t| t.total).collect();
    let Some(stats) = calc::class_stats(&raw_totals) else {
        return Err(GradebookError::NoData(course_code.to_string()));
    };
    // random was rejected above, so anything other than gaussian is linear
    let threshold = if scheme == GradingScheme::Gaussian {
        calc::required_total_gaussian(band, &stats)
    } else {
        calc::rank_totals(&mut totals);
        calc::required_total_linear(band, &totals)
    };

    let prediction = match threshold {
        Some(threshold) => calc::solve_required_score(current_total, remaining_weight, threshold),
        // Band 2 is the floor of both schemes; any outcome already meets it.
        None => calc::Prediction {
            current_total,
            remaining_weight,
            required_score: 0.0,
            feasible: true,
        },
    };
    debug!(
        roll = roll_number,
        course = course_code,
        target,
        required = prediction.required_score,
        feasible = prediction.feasible,
        "required marks computed"
    );
    Ok(prediction)
}

/// Apply a batch of score edits for one student in one course as a single
/// transaction. Any bad edit (unknown component name) aborts the batch; a
/// reader never observes a partially applied set.
pub fn update_component_scores(
    conn: &Connection,
    roll_number: &str,
    course_code: &str,
    edits: &[ScoreEdit],
) -> Result<usize> {
    if edits.is_empty() {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    if !store::course_exists(&tx, course_code)? {
        return Err(GradebookError::not_found("course", course_code));
    }
    if !store::student_exists(&tx, roll_number)? {
        return Err(GradebookError::not_found("student", roll_number));
    }
    if !store::student_enrolled(&tx, roll_number, course_code)? {
        return Err(GradebookError::not_found(
            "enrollment",
            format!("{}/{}", roll_number, course_code),
        ));
    }
    for edit in edits {
        store::upsert_component_score(&tx, course_code, roll_number, edit)?;
    }
    tx.commit()?;

    info!(
        roll = roll_number,
        course = course_code,
        updated = edits.len(),
        "component scores updated"
    );
    Ok(edits.len())
}

/// Instructor view of a course: every enrolled student with the live
/// weighted total and, where one exists, the committed grade.
pub fn course_roster(conn: &Connection, course_code: &str) -> Result<Vec<RosterRow>> {
    if !store::course_exists(conn, course_code)? {
        return Err(GradebookError::not_found("course", course_code));
    }
    let students = store::enrolled_students(conn, course_code)?;
    let rows = store::fetch_scored_rows(conn, course_code)?;
    let totals: HashMap<String, f64> = totals_by_student(&rows)
        .into_iter()
        .map(|t| (t.roll_number, t.total))
        .collect();
    let grades: HashMap<String, f64> = ledger::course_grades(conn, course_code)?
        .into_iter()
        .map(|g| (g.roll_number, g.grade))
        .collect();

    Ok(students
        .into_iter()
        .map(|s| RosterRow {
            weighted_total: totals.get(&s.roll_number).copied().unwrap_or(0.0),
            assigned_grade: grades.get(&s.roll_number).copied(),
            roll_number: s.roll_number,
            name: s.name,
        })
        .collect())
}
