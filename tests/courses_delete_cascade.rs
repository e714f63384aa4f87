use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_studyhubd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn studyhubd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn deleting_a_course_removes_dependents_and_unlinks_students() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = temp_dir("studyhub-delete-cascade");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let course_id = request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "courses.create",
        json!({ "name": "World History", "credits": 3 }),
    )["course"]["id"]
        .as_i64()
        .expect("course id");

    let a1 = request_ok(
        &mut stdin,
        &mut reader,
        "a1",
        "assignments.create",
        json!({ "courseId": course_id, "title": "Essay", "weight": 40, "grade": 88 }),
    )["assignment"]["id"]
        .as_i64()
        .expect("assignment id");

    let student_id = request_ok(
        &mut stdin,
        &mut reader,
        "st1",
        "students.create",
        json!({ "name": "Dana Whitfield", "studentNo": "S-1042", "courseId": course_id }),
    )["student"]["id"]
        .as_i64()
        .expect("student id");

    let mut overrides = serde_json::Map::new();
    overrides.insert(a1.to_string(), json!(95));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "scenarios.save",
        json!({ "name": "Stretch", "courseId": course_id, "overrides": overrides }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "courses.delete",
        json!({ "courseId": course_id }),
    );

    let course = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "courses.get",
        json!({ "courseId": course_id }),
    );
    assert!(course["course"].is_null());

    let assignments = request_ok(
        &mut stdin,
        &mut reader,
        "g2",
        "assignments.list",
        json!({ "courseId": course_id }),
    );
    assert_eq!(assignments["assignments"].as_array().map(|a| a.len()), Some(0));

    let scenarios = request_ok(
        &mut stdin,
        &mut reader,
        "g3",
        "scenarios.list",
        json!({ "courseId": course_id }),
    );
    assert_eq!(scenarios["scenarios"].as_array().map(|a| a.len()), Some(0));

    // The student record survives with the enrollment cleared.
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "g4",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(student["student"]["name"].as_str(), Some("Dana Whitfield"));
    assert!(student["student"]["courseId"].is_null());

    let again = request(
        &mut stdin,
        &mut reader,
        "d2",
        "courses.delete",
        json!({ "courseId": course_id }),
    );
    assert_eq!(again["ok"].as_bool(), Some(false));
    assert_eq!(again["error"]["code"].as_str(), Some("not_found"));
}

#[test]
fn creating_against_a_missing_course_is_not_found() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = temp_dir("studyhub-missing-course");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "a1",
        "assignments.create",
        json!({ "courseId": 12345, "title": "Orphan", "weight": 10 }),
    );
    assert_eq!(resp["ok"].as_bool(), Some(false));
    assert_eq!(resp["error"]["code"].as_str(), Some("not_found"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "st1",
        "students.create",
        json!({ "name": "Nobody", "courseId": 12345 }),
    );
    assert_eq!(resp["ok"].as_bool(), Some(false));
    assert_eq!(resp["error"]["code"].as_str(), Some("not_found"));
}

#[test]
fn deleting_an_assignment_drops_its_saved_overrides() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = temp_dir("studyhub-assignment-delete");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let course_id = request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "courses.create",
        json!({ "name": "Statistics", "credits": 3 }),
    )["course"]["id"]
        .as_i64()
        .expect("course id");

    let a1 = request_ok(
        &mut stdin,
        &mut reader,
        "a1",
        "assignments.create",
        json!({ "courseId": course_id, "title": "Quiz 1", "category": "quiz", "weight": 20, "grade": 70 }),
    )["assignment"]["id"]
        .as_i64()
        .expect("assignment id");
    let a2 = request_ok(
        &mut stdin,
        &mut reader,
        "a2",
        "assignments.create",
        json!({ "courseId": course_id, "title": "Quiz 2", "category": "quiz", "weight": 20, "grade": 90 }),
    )["assignment"]["id"]
        .as_i64()
        .expect("assignment id");

    let mut overrides = serde_json::Map::new();
    overrides.insert(a1.to_string(), json!(100));
    overrides.insert(a2.to_string(), json!(100));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "scenarios.save",
        json!({ "name": "Perfect", "courseId": course_id, "overrides": overrides }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "assignments.delete",
        json!({ "assignmentId": a1 }),
    );

    let loaded = request_ok(
        &mut stdin,
        &mut reader,
        "l1",
        "scenarios.load",
        json!({ "courseId": course_id, "name": "Perfect" }),
    );
    let map = loaded["overrides"].as_object().expect("override map");
    assert_eq!(map.len(), 1);
    assert_eq!(map[&a2.to_string()].as_f64(), Some(100.0));
}
