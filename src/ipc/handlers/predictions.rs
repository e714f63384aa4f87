use crate::calc;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::model::{self, PredictionRecord, ScenarioRecord};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

fn fetch_predict_marks(
    conn: &Connection,
    course_id: i64,
) -> rusqlite::Result<Vec<calc::PredictMark>> {
    let mut stmt =
        conn.prepare("SELECT id, weight, grade FROM assignments WHERE course_id = ? ORDER BY id")?;
    let rows = stmt.query_map([course_id], |r| {
        Ok(calc::PredictMark {
            assignment_id: r.get(0)?,
            weight: r.get(1)?,
            grade: r.get(2)?,
        })
    })?;
    rows.collect()
}

/// Override maps arrive keyed by the assignment id's decimal string (JSON
/// object keys are strings). Keys that are not integers are ignored — the
/// predictor treats them the same as an absent override.
fn overrides_from_params(
    raw: Option<&serde_json::Value>,
) -> Result<HashMap<i64, serde_json::Value>, String> {
    let Some(raw) = raw else {
        return Ok(HashMap::new());
    };
    if raw.is_null() {
        return Ok(HashMap::new());
    }
    let Some(obj) = raw.as_object() else {
        return Err("overrides must be an object of {assignmentId: grade}".to_string());
    };
    let mut out = HashMap::new();
    for (key, value) in obj {
        if let Ok(assignment_id) = key.parse::<i64>() {
            out.insert(assignment_id, value.clone());
        }
    }
    Ok(out)
}

fn handle_predict_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let overrides = match overrides_from_params(req.params.get("overrides")) {
        Ok(map) => map,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let marks = match fetch_predict_marks(conn, course_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({ "prediction": calc::predict(&marks, &overrides) }),
    )
}

fn handle_scenarios_save(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    // Scenario grouping is a name-prefix contract; a separator inside the
    // base name would split the scenario on load.
    if name.contains(" - ") {
        return err(
            &req.id,
            "bad_params",
            "scenario name must not contain \" - \"",
            Some(json!({ "name": name })),
        );
    }

    let Some(course_id) = req.params.get("courseId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };
    match helpers::course_exists(conn, course_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let overrides = match overrides_from_params(req.params.get("overrides")) {
        Ok(map) => map,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    // Only entries that parse become override records; a parsed value must
    // still be a legal grade.
    let mut parsed: Vec<(i64, f64)> = Vec::new();
    for (&assignment_id, value) in &overrides {
        let Some(grade) = calc::parse_override(value) else {
            continue;
        };
        if !(0.0..=100.0).contains(&grade) {
            return err(
                &req.id,
                "bad_params",
                format!("hypothetical grade must be within [0, 100], got {}", grade),
                Some(json!({ "assignmentId": assignment_id })),
            );
        }
        parsed.push((assignment_id, grade));
    }
    parsed.sort_by_key(|(assignment_id, _)| *assignment_id);

    let marks = match fetch_predict_marks(conn, course_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let prediction = calc::predict(&marks, &overrides);

    // One override record per assignment plus the aggregate prediction
    // record, all or nothing: a partial save must never look like a saved
    // scenario.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let stamp = db::now_timestamp();
    for (assignment_id, grade) in &parsed {
        if let Err(e) = tx.execute(
            "INSERT INTO what_if_scenarios(name, course_id, assignment_id, potential_grade, created_on)
             VALUES(?, ?, ?, ?, ?)",
            rusqlite::params![
                format!("{} - Assignment {}", name, assignment_id),
                course_id,
                assignment_id,
                grade,
                stamp
            ],
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "what_if_scenarios" })),
            );
        }
    }

    if let Err(e) = tx.execute(
        "INSERT INTO grade_predictions(name, course_id, predicted_grade, created_on)
         VALUES(?, ?, ?, ?)",
        rusqlite::params![name, course_id, prediction.predicted_aggregate, stamp],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "grade_predictions" })),
        );
    }
    let prediction_id = tx.last_insert_rowid();

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "scenarioId": prediction_id,
            "name": name,
            "predictedGrade": prediction.predicted_aggregate,
            "savedOverrides": parsed.len(),
        }),
    )
}

fn handle_scenarios_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(course_id) = req.params.get("courseId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };

    let mut stmt = match conn.prepare(&format!(
        "SELECT {} FROM grade_predictions WHERE course_id = ? ORDER BY created_on DESC, id DESC",
        PredictionRecord::COLUMNS
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([course_id], PredictionRecord::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(scenarios) => ok(&req.id, json!({ "scenarios": scenarios })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_scenarios_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(course_id) = req.params.get("courseId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };
    let Some(name) = req.params.get("name").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing name", None);
    };

    // Either the base name or a full member record name selects the group.
    let base = model::scenario_base_name(name);

    let mut stmt = match conn.prepare(&format!(
        "SELECT {} FROM what_if_scenarios WHERE course_id = ?",
        ScenarioRecord::COLUMNS
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let records: Vec<ScenarioRecord> = match stmt
        .query_map([course_id], ScenarioRecord::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut overrides = serde_json::Map::new();
    for record in records {
        // Group by the record's own base so "Plan" never swallows "Plan B".
        if model::scenario_base_name(&record.name) != base {
            continue;
        }
        let Some(assignment_id) = record.assignment_id else {
            continue;
        };
        overrides.insert(assignment_id.to_string(), json!(record.potential_grade));
    }

    ok(
        &req.id,
        json!({
            "name": base,
            "overrides": overrides,
        }),
    )
}

fn handle_scenarios_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(course_id) = req.params.get("courseId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };
    let Some(name) = req.params.get("name").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let base = model::scenario_base_name(name).to_string();

    // Collect member record ids first; the group is a name convention, not
    // a key, so matching happens here rather than in SQL.
    let mut stmt = match conn.prepare(&format!(
        "SELECT {} FROM what_if_scenarios WHERE course_id = ?",
        ScenarioRecord::COLUMNS
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let member_ids: Vec<i64> = match stmt
        .query_map([course_id], ScenarioRecord::from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(records) => records
            .into_iter()
            .filter(|r| model::scenario_base_name(&r.name) == base)
            .map(|r| r.id)
            .collect(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let aggregate_count: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM grade_predictions WHERE course_id = ? AND name = ?",
        rusqlite::params![course_id, base],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if member_ids.is_empty() && aggregate_count == 0 {
        return err(&req.id, "not_found", "scenario not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Aggregates may reference member records; they go first.
    if let Err(e) = tx.execute(
        "DELETE FROM grade_predictions WHERE course_id = ? AND name = ?",
        rusqlite::params![course_id, base],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "grade_predictions" })),
        );
    }

    for member_id in &member_ids {
        if let Err(e) = tx.execute("DELETE FROM what_if_scenarios WHERE id = ?", [member_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "what_if_scenarios" })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "deleted": true, "removedOverrides": member_ids.len() }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "predict.compute" => Some(handle_predict_compute(state, req)),
        "scenarios.save" => Some(handle_scenarios_save(state, req)),
        "scenarios.list" => Some(handle_scenarios_list(state, req)),
        "scenarios.load" => Some(handle_scenarios_load(state, req)),
        "scenarios.delete" => Some(handle_scenarios_delete(state, req)),
        _ => None,
    }
}
