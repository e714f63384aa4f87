use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension};

use crate::calc;
use crate::model::Status;

pub fn course_exists(conn: &Connection, course_id: i64) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(hit.is_some())
}

struct CacheRow {
    weight: f64,
    grade: Option<f64>,
    status: Option<String>,
    due_date: Option<String>,
}

/// The cached course fields (current_grade, progress, next_assignment) are
/// derived from the assignment list and must be rebuilt inside every
/// assignment mutation. They are never directly authoritative.
pub fn refresh_course_cache(conn: &Connection, course_id: i64) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT weight, grade, status, due_date
         FROM assignments
         WHERE course_id = ?",
    )?;
    let rows: Vec<CacheRow> = stmt
        .query_map([course_id], |r| {
            Ok(CacheRow {
                weight: r.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                grade: r.get(1)?,
                status: r.get(2)?,
                due_date: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let marks: Vec<calc::WeightedMark> = rows
        .iter()
        .map(|r| calc::WeightedMark {
            weight: r.weight,
            grade: r.grade,
        })
        .collect();
    let current_grade = calc::current_course_grade(&marks);

    let completed = rows
        .iter()
        .filter(|r| r.status.as_deref() == Some(Status::Completed.as_str()))
        .count();
    let progress = calc::completion_progress(completed, rows.len());

    let next_assignment = rows
        .iter()
        .filter(|r| r.status.as_deref() != Some(Status::Completed.as_str()))
        .filter_map(|r| {
            let raw = r.due_date.as_deref()?;
            Some((parse_due_date(raw)?, raw))
        })
        .min_by_key(|(due, _)| *due)
        .map(|(_, raw)| raw.to_string());

    conn.execute(
        "UPDATE courses SET current_grade = ?, progress = ?, next_assignment = ? WHERE id = ?",
        rusqlite::params![current_grade, progress, next_assignment, course_id],
    )?;
    Ok(())
}

/// Due dates come from the UI as ISO-8601 text, with or without an offset or
/// a time-of-day. Unparseable dates sort nowhere (skipped).
fn parse_due_date(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_date_parse_accepts_common_iso_shapes() {
        assert!(parse_due_date("2026-03-01T09:30:00Z").is_some());
        assert!(parse_due_date("2026-03-01T09:30:00+02:00").is_some());
        assert!(parse_due_date("2026-03-01T09:30:00").is_some());
        assert!(parse_due_date("2026-03-01T09:30").is_some());
        assert!(parse_due_date("2026-03-01").is_some());
        assert!(parse_due_date("next tuesday").is_none());
        assert!(parse_due_date("").is_none());
    }

    #[test]
    fn due_date_ordering_is_chronological_not_lexical() {
        let a = parse_due_date("2026-03-01T09:30:00Z").expect("parse");
        let b = parse_due_date("2026-03-01").expect("parse");
        assert!(b < a);
    }
}
