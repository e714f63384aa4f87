use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use rusqlite::OptionalExtension;
use serde_json::json;

fn fetch_student(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Student>> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", Student::COLUMNS),
        [id],
        Student::from_row,
    )
    .optional()
}

/// Optional free-text field: absent keeps the current value, null clears it,
/// a string replaces it.
fn merge_text(
    params: &serde_json::Value,
    key: &str,
    current: Option<String>,
) -> Option<String> {
    match params.get(key) {
        None => current,
        Some(v) if v.is_null() => None,
        Some(v) => v.as_str().map(|s| s.to_string()),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let mut stmt = match conn.prepare(&format!(
        "SELECT {} FROM students ORDER BY name",
        Student::COLUMNS
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], Student::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };

    match fetch_student(conn, id) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => ok(&req.id, json!({ "student": null })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let course_id = match req.params.get("courseId").and_then(|v| v.as_i64()) {
        None => None,
        Some(course_id) => match helpers::course_exists(conn, course_id) {
            Ok(true) => Some(course_id),
            Ok(false) => return err(&req.id, "not_found", "course not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
    };

    let grade = match req.params.get("grade") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_f64() {
            Some(g) if g.is_finite() && (0.0..=100.0).contains(&g) => Some(g),
            _ => return err(&req.id, "bad_params", "grade must be within [0, 100]", None),
        },
    };

    let student_no = req
        .params
        .get("studentNo")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let tags = req
        .params
        .get("tags")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    // The demographic/contact block is entirely optional; none of it feeds
    // grade computation.
    let optional = |key: &str| merge_text(&req.params, key, None);
    if let Err(e) = conn.execute(
        "INSERT INTO students(name, student_no, course_id, grade, tags, birth_date, gender,
             section, guardian_name, contact_number, email, address, enrollment_date,
             nationality, category, emergency_contact)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            name,
            student_no,
            course_id,
            grade,
            tags,
            optional("birthDate"),
            optional("gender"),
            optional("section"),
            optional("guardianName"),
            optional("contactNumber"),
            optional("email"),
            optional("address"),
            optional("enrollmentDate"),
            optional("nationality"),
            optional("category"),
            optional("emergencyContact")
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    let student_id = conn.last_insert_rowid();
    match fetch_student(conn, student_id) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found after insert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };

    let existing = match fetch_student(conn, id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
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

    let course_id = match req.params.get("courseId") {
        None => existing.course_id,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_i64() {
            None => return err(&req.id, "bad_params", "courseId must be an integer", None),
            Some(course_id) => match helpers::course_exists(conn, course_id) {
                Ok(true) => Some(course_id),
                Ok(false) => return err(&req.id, "not_found", "course not found", None),
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            },
        },
    };

    let grade = match req.params.get("grade") {
        None => existing.grade,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_f64() {
            Some(g) if g.is_finite() && (0.0..=100.0).contains(&g) => Some(g),
            _ => return err(&req.id, "bad_params", "grade must be within [0, 100]", None),
        },
    };

    let student_no = req
        .params
        .get("studentNo")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or(existing.student_no);
    let tags = req
        .params
        .get("tags")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or(existing.tags);

    let merged = |key: &str, current: Option<String>| merge_text(&req.params, key, current);
    if let Err(e) = conn.execute(
        "UPDATE students
         SET name = ?, student_no = ?, course_id = ?, grade = ?, tags = ?, birth_date = ?,
             gender = ?, section = ?, guardian_name = ?, contact_number = ?, email = ?,
             address = ?, enrollment_date = ?, nationality = ?, category = ?,
             emergency_contact = ?
         WHERE id = ?",
        rusqlite::params![
            name,
            student_no,
            course_id,
            grade,
            tags,
            merged("birthDate", existing.birth_date),
            merged("gender", existing.gender),
            merged("section", existing.section),
            merged("guardianName", existing.guardian_name),
            merged("contactNumber", existing.contact_number),
            merged("email", existing.email),
            merged("address", existing.address),
            merged("enrollmentDate", existing.enrollment_date),
            merged("nationality", existing.nationality),
            merged("category", existing.category),
            merged("emergencyContact", existing.emergency_contact),
            id
        ],
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    match fetch_student(conn, id) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    // Prediction snapshots may reference the student; unlink rather than
    // cascade so the saved aggregates survive roster edits.
    if let Err(e) = conn.execute(
        "UPDATE grade_predictions SET student_id = NULL WHERE student_id = ?",
        [id],
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "grade_predictions" })),
        );
    }

    if let Err(e) = conn.execute("DELETE FROM students WHERE id = ?", [id]) {
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
