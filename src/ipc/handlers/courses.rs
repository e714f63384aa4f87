use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, Course, ScheduleSlot};
use rusqlite::OptionalExtension;
use serde_json::json;

fn fetch_course(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Course>> {
    conn.query_row(
        &format!("SELECT {} FROM courses WHERE id = ?", Course::COLUMNS),
        [id],
        Course::from_row,
    )
    .optional()
}

/// Schedule arrives as a JSON array of slots; anything else is a form error.
fn parse_schedule_param(raw: &serde_json::Value) -> Result<Vec<ScheduleSlot>, String> {
    if !raw.is_array() {
        return Err("schedule must be an array of {day, time} slots".to_string());
    }
    serde_json::from_value(raw.clone()).map_err(|e| format!("bad schedule: {}", e))
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };

    let mut stmt = match conn.prepare(&format!(
        "SELECT {} FROM courses ORDER BY name",
        Course::COLUMNS
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], Course::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = req.params.get("courseId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };

    match fetch_course(conn, id) {
        Ok(Some(course)) => ok(&req.id, json!({ "course": course })),
        Ok(None) => ok(&req.id, json!({ "course": null })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    let credits = match req.params.get("credits").and_then(|v| v.as_i64()) {
        Some(v) if v > 0 => v,
        Some(v) => {
            return err(
                &req.id,
                "bad_params",
                "credits must be a positive integer",
                Some(json!({ "credits": v })),
            )
        }
        None => return err(&req.id, "bad_params", "missing credits", None),
    };

    let code = req
        .params
        .get("code")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let professor = req
        .params
        .get("professor")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let color = req
        .params
        .get("color")
        .and_then(|v| v.as_str())
        .unwrap_or(model::DEFAULT_COURSE_COLOR)
        .to_string();

    let schedule = match req.params.get("schedule") {
        None => Vec::new(),
        Some(v) if v.is_null() => Vec::new(),
        Some(v) => match parse_schedule_param(v) {
            Ok(slots) => slots,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
    };

    if let Err(e) = conn.execute(
        "INSERT INTO courses(name, code, credits, professor, color, schedule, created_on)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            name,
            code,
            credits,
            professor,
            color,
            model::format_schedule(&schedule),
            db::now_timestamp()
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    let course_id = conn.last_insert_rowid();
    match fetch_course(conn, course_id) {
        Ok(Some(course)) => ok(&req.id, json!({ "course": course })),
        Ok(None) => err(&req.id, "not_found", "course not found after insert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = req.params.get("courseId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };

    let existing = match fetch_course(conn, id) {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => {
            let t = v.trim().to_string();
            if t.is_empty() {
                return err(&req.id, "bad_params", "name must not be empty", None);
            }
            t
        }
        None => existing.name,
    };
    let credits = match req.params.get("credits") {
        None => existing.credits,
        Some(v) => match v.as_i64() {
            Some(n) if n > 0 => n,
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    "credits must be a positive integer",
                    None,
                )
            }
        },
    };
    let code = req
        .params
        .get("code")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or(existing.code);
    let professor = match req.params.get("professor") {
        None => existing.professor,
        Some(v) if v.is_null() => None,
        Some(v) => v.as_str().map(|s| s.to_string()),
    };
    let color = req
        .params
        .get("color")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or(existing.color);
    let schedule = match req.params.get("schedule") {
        None => existing.schedule,
        Some(v) if v.is_null() => Vec::new(),
        Some(v) => match parse_schedule_param(v) {
            Ok(slots) => slots,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
    };

    // Derived fields (current_grade, progress, next_assignment) are cache;
    // they are not writable through this path.
    if let Err(e) = conn.execute(
        "UPDATE courses SET name = ?, code = ?, credits = ?, professor = ?, color = ?, schedule = ?
         WHERE id = ?",
        rusqlite::params![
            name,
            code,
            credits,
            professor,
            color,
            model::format_schedule(&schedule),
            id
        ],
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    match fetch_course(conn, id) {
        Ok(Some(course)) => ok(&req.id, json!({ "course": course })),
        Ok(None) => err(&req.id, "not_found", "course not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = req.params.get("courseId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "course not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicit delete in dependency order (no ON DELETE CASCADE). Enrolled
    // students survive the course; only the link is cleared.
    if let Err(e) = tx.execute(
        "DELETE FROM grade_predictions WHERE course_id = ?",
        [id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "grade_predictions" })),
        );
    }

    if let Err(e) = tx.execute(
        "DELETE FROM what_if_scenarios WHERE course_id = ?",
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

    if let Err(e) = tx.execute("DELETE FROM assignments WHERE course_id = ?", [id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }

    if let Err(e) = tx.execute(
        "UPDATE students SET course_id = NULL WHERE course_id = ?",
        [id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    if let Err(e) = tx.execute("DELETE FROM courses WHERE id = ?", [id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.get" => Some(handle_courses_get(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.update" => Some(handle_courses_update(state, req)),
        "courses.delete" => Some(handle_courses_delete(state, req)),
        _ => None,
    }
}
