use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::model::{Assignment, Category, Priority, Status};
use rusqlite::OptionalExtension;
use serde_json::json;

fn fetch_assignment(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Assignment>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM assignments WHERE id = ?",
            Assignment::COLUMNS
        ),
        [id],
        Assignment::from_row,
    )
    .optional()
}

/// Contribution weight is form-validated to [1, 100]. Values outside that
/// range never reach the store through this surface.
fn parse_weight(raw: &serde_json::Value) -> Result<f64, String> {
    let Some(w) = raw.as_f64() else {
        return Err("weight must be a number".to_string());
    };
    if !w.is_finite() || !(1.0..=100.0).contains(&w) {
        return Err(format!("weight must be within [1, 100], got {}", w));
    }
    Ok(w)
}

fn parse_grade(raw: &serde_json::Value) -> Result<Option<f64>, String> {
    if raw.is_null() {
        return Ok(None);
    }
    let Some(g) = raw.as_f64() else {
        return Err("grade must be a number or null".to_string());
    };
    if !g.is_finite() || !(0.0..=100.0).contains(&g) {
        return Err(format!("grade must be within [0, 100], got {}", g));
    }
    Ok(Some(g))
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "assignments": [] }));
    };

    let course_filter = req.params.get("courseId").and_then(|v| v.as_i64());

    let rows = match course_filter {
        Some(course_id) => {
            let mut stmt = match conn.prepare(&format!(
                "SELECT {} FROM assignments WHERE course_id = ? ORDER BY due_date, id",
                Assignment::COLUMNS
            )) {
                Ok(s) => s,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            stmt.query_map([course_id], Assignment::from_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
        None => {
            let mut stmt = match conn.prepare(&format!(
                "SELECT {} FROM assignments ORDER BY due_date, id",
                Assignment::COLUMNS
            )) {
                Ok(s) => s,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            stmt.query_map([], Assignment::from_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
    };

    match rows {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_assignments_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = req.params.get("assignmentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing assignmentId", None);
    };

    match fetch_assignment(conn, id) {
        Ok(Some(assignment)) => ok(&req.id, json!({ "assignment": assignment })),
        Ok(None) => ok(&req.id, json!({ "assignment": null })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let title = match req.params.get("title").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing title", None),
    };
    if title.is_empty() {
        return err(&req.id, "bad_params", "title must not be empty", None);
    }

    let weight = match req.params.get("weight") {
        Some(v) => match parse_weight(v) {
            Ok(w) => w,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
        None => return err(&req.id, "bad_params", "missing weight", None),
    };
    let grade = match req.params.get("grade") {
        None => None,
        Some(v) => match parse_grade(v) {
            Ok(g) => g,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
    };

    let priority = match req.params.get("priority").and_then(|v| v.as_str()) {
        None => Priority::Medium,
        Some(s) => match Priority::parse(s) {
            Some(p) => p,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "priority must be one of: low, medium, high",
                    Some(json!({ "priority": s })),
                )
            }
        },
    };
    let status = match req.params.get("status").and_then(|v| v.as_str()) {
        None => Status::Pending,
        Some(s) => match Status::parse(s) {
            Some(v) => v,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "status must be one of: pending, completed",
                    Some(json!({ "status": s })),
                )
            }
        },
    };
    let category = match req.params.get("category").and_then(|v| v.as_str()) {
        None => Category::Assignment,
        Some(s) => match Category::parse(s) {
            Some(v) => v,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "category must be one of: assignment, quiz, exam, project, homework",
                    Some(json!({ "category": s })),
                )
            }
        },
    };

    let due_date = req
        .params
        .get("dueDate")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let description = req
        .params
        .get("description")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    if let Err(e) = conn.execute(
        "INSERT INTO assignments(course_id, title, due_date, priority, status, category, weight, grade, description)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            course_id,
            title,
            due_date,
            priority.as_str(),
            status.as_str(),
            category.as_str(),
            weight,
            grade,
            description
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }
    let assignment_id = conn.last_insert_rowid();

    if let Err(e) = helpers::refresh_course_cache(conn, course_id) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    match fetch_assignment(conn, assignment_id) {
        Ok(Some(assignment)) => ok(&req.id, json!({ "assignment": assignment })),
        Ok(None) => err(&req.id, "not_found", "assignment not found after insert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_assignments_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = req.params.get("assignmentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing assignmentId", None);
    };

    let existing = match fetch_assignment(conn, id) {
        Ok(Some(a)) => a,
        Ok(None) => return err(&req.id, "not_found", "assignment not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let course_id = match req.params.get("courseId").and_then(|v| v.as_i64()) {
        None => existing.course_id,
        Some(new_course) => {
            match helpers::course_exists(conn, new_course) {
                Ok(true) => new_course,
                Ok(false) => return err(&req.id, "not_found", "course not found", None),
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            }
        }
    };

    let title = match req.params.get("title").and_then(|v| v.as_str()) {
        Some(v) => {
            let t = v.trim().to_string();
            if t.is_empty() {
                return err(&req.id, "bad_params", "title must not be empty", None);
            }
            t
        }
        None => existing.title,
    };
    let weight = match req.params.get("weight") {
        None => existing.weight,
        Some(v) => match parse_weight(v) {
            Ok(w) => w,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
    };
    let grade = match req.params.get("grade") {
        None => existing.grade,
        Some(v) => match parse_grade(v) {
            Ok(g) => g,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
    };
    let priority = match req.params.get("priority").and_then(|v| v.as_str()) {
        None => existing.priority,
        Some(s) => match Priority::parse(s) {
            Some(p) => p,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "priority must be one of: low, medium, high",
                    None,
                )
            }
        },
    };
    let status = match req.params.get("status").and_then(|v| v.as_str()) {
        None => existing.status,
        Some(s) => match Status::parse(s) {
            Some(v) => v,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "status must be one of: pending, completed",
                    None,
                )
            }
        },
    };
    let category = match req.params.get("category").and_then(|v| v.as_str()) {
        None => existing.category,
        Some(s) => match Category::parse(s) {
            Some(v) => v,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "category must be one of: assignment, quiz, exam, project, homework",
                    None,
                )
            }
        },
    };
    let due_date = match req.params.get("dueDate") {
        None => existing.due_date,
        Some(v) if v.is_null() => None,
        Some(v) => v.as_str().map(|s| s.to_string()),
    };
    let description = match req.params.get("description") {
        None => existing.description,
        Some(v) if v.is_null() => None,
        Some(v) => v.as_str().map(|s| s.to_string()),
    };

    if let Err(e) = conn.execute(
        "UPDATE assignments
         SET course_id = ?, title = ?, due_date = ?, priority = ?, status = ?, category = ?,
             weight = ?, grade = ?, description = ?
         WHERE id = ?",
        rusqlite::params![
            course_id,
            title,
            due_date,
            priority.as_str(),
            status.as_str(),
            category.as_str(),
            weight,
            grade,
            description,
            id
        ],
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }

    // Moving an assignment across courses invalidates both caches.
    if let Err(e) = helpers::refresh_course_cache(conn, course_id) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if course_id != existing.course_id {
        if let Err(e) = helpers::refresh_course_cache(conn, existing.course_id) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    match fetch_assignment(conn, id) {
        Ok(Some(assignment)) => ok(&req.id, json!({ "assignment": assignment })),
        Ok(None) => err(&req.id, "not_found", "assignment not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = req.params.get("assignmentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing assignmentId", None);
    };

    let existing = match fetch_assignment(conn, id) {
        Ok(Some(a)) => a,
        Ok(None) => return err(&req.id, "not_found", "assignment not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Saved override rows for this assignment go with it; the aggregate
    // prediction records stay (they are snapshots, not live references).
    if let Err(e) = tx.execute(
        "DELETE FROM what_if_scenarios WHERE assignment_id = ?",
        [id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "what_if_scenarios" })),
        );
    }

    if let Err(e) = tx.execute("DELETE FROM assignments WHERE id = ?", [id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    if let Err(e) = helpers::refresh_course_cache(conn, existing.course_id) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.get" => Some(handle_assignments_get(state, req)),
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.update" => Some(handle_assignments_update(state, req)),
        "assignments.delete" => Some(handle_assignments_delete(state, req)),
        _ => None,
    }
}
