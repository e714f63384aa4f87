use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::model::Status;
use serde_json::json;
use std::collections::BTreeMap;

fn handle_grades_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut course_stmt = match conn.prepare("SELECT current_grade, credits FROM courses") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let standings: Vec<calc::CourseStanding> = match course_stmt
        .query_map([], |r| {
            Ok(calc::CourseStanding {
                current_grade: r.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                credits: r.get::<_, Option<i64>>(1)?.unwrap_or(0),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut assignment_stmt = match conn.prepare("SELECT grade, status FROM assignments") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let assignment_rows: Vec<(Option<f64>, Option<String>)> = match assignment_stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let gpa = calc::round_off_2_decimals(calc::compute_gpa(&standings));
    let total_credits: i64 = standings.iter().map(|c| c.credits.max(0)).sum();

    let graded: Vec<f64> = assignment_rows.iter().filter_map(|(g, _)| *g).collect();
    let average_assignment_grade = if graded.is_empty() {
        0.0
    } else {
        calc::round_off_2_decimals(graded.iter().sum::<f64>() / graded.len() as f64)
    };

    let completed = assignment_rows
        .iter()
        .filter(|(_, s)| s.as_deref() == Some(Status::Completed.as_str()))
        .count();
    let completion_rate = calc::completion_progress(completed, assignment_rows.len());

    let mut distribution: BTreeMap<&'static str, i64> = BTreeMap::new();
    for c in &standings {
        *distribution.entry(calc::letter_grade(c.current_grade)).or_insert(0) += 1;
    }

    ok(
        &req.id,
        json!({
            "gpa": gpa,
            "totalCredits": total_credits,
            "averageAssignmentGrade": average_assignment_grade,
            "completionRate": completion_rate,
            "gradeDistribution": distribution,
        }),
    )
}

fn handle_grades_category_breakdown(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(course_id) = req.params.get("courseId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };
    match helpers::course_exists(conn, course_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let mut stmt = match conn.prepare(
        "SELECT category, weight, grade FROM assignments WHERE course_id = ?",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let marks: Vec<calc::CategoryMark> = match stmt
        .query_map([course_id], |r| {
            Ok(calc::CategoryMark {
                category: r.get::<_, Option<String>>(0)?.unwrap_or_default(),
                weight: r.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                grade: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "courseId": course_id,
            "categories": calc::category_breakdown(&marks),
        }),
    )
}

fn handle_grades_letter(req: &Request) -> serde_json::Value {
    let Some(percentage) = req.params.get("percentage").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing numeric percentage", None);
    };
    ok(&req.id, json!({ "letter": calc::letter_grade(percentage) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.overview" => Some(handle_grades_overview(state, req)),
        "grades.categoryBreakdown" => Some(handle_grades_category_breakdown(state, req)),
        "grades.letter" => Some(handle_grades_letter(req)),
        _ => None,
    }
}
