//! Typed views over the record store. One adapter per collection: a row
//! mapping that tolerates absent optional fields (absent -> null/default,
//! never an error) and camelCase wire serialization for the UI.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub const DEFAULT_COURSE_COLOR: &str = "#6366f1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Completed,
}

impl Status {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Assignment,
    Quiz,
    Exam,
    Project,
    Homework,
}

impl Category {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "assignment" => Some(Self::Assignment),
            "quiz" => Some(Self::Quiz),
            "exam" => Some(Self::Exam),
            "project" => Some(Self::Project),
            "homework" => Some(Self::Homework),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Quiz => "quiz",
            Self::Exam => "exam",
            Self::Project => "project",
            Self::Homework => "homework",
        }
    }
}

/// One weekly schedule slot. Stored as a JSON array in a single text column;
/// unknown fields are ignored and missing ones default so old records load.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScheduleSlot {
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub time: String,
}

/// Lenient by contract: schedule text that fails to parse is an empty
/// schedule, not an error.
pub fn parse_schedule(raw: Option<&str>) -> Vec<ScheduleSlot> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    serde_json::from_str(raw).unwrap_or_default()
}

pub fn format_schedule(slots: &[ScheduleSlot]) -> String {
    serde_json::to_string(slots).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub credits: i64,
    pub professor: Option<String>,
    pub color: String,
    pub current_grade: f64,
    pub progress: f64,
    pub next_assignment: Option<String>,
    pub schedule: Vec<ScheduleSlot>,
    pub created_on: Option<String>,
}

impl Course {
    pub const COLUMNS: &'static str = "id, name, code, credits, professor, color, \
         current_grade, progress, next_assignment, schedule, created_on";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            code: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            credits: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
            professor: row.get(4)?,
            color: row
                .get::<_, Option<String>>(5)?
                .unwrap_or_else(|| DEFAULT_COURSE_COLOR.to_string()),
            current_grade: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
            progress: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
            next_assignment: row.get(8)?,
            schedule: parse_schedule(row.get::<_, Option<String>>(9)?.as_deref()),
            created_on: row.get(10)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub due_date: Option<String>,
    pub priority: Priority,
    pub status: Status,
    pub category: Category,
    pub weight: f64,
    pub grade: Option<f64>,
    pub description: Option<String>,
}

impl Assignment {
    pub const COLUMNS: &'static str =
        "id, course_id, title, due_date, priority, status, category, weight, grade, description";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            course_id: row.get(1)?,
            title: row.get(2)?,
            due_date: row.get(3)?,
            priority: row
                .get::<_, Option<String>>(4)?
                .as_deref()
                .and_then(Priority::parse)
                .unwrap_or(Priority::Medium),
            status: row
                .get::<_, Option<String>>(5)?
                .as_deref()
                .and_then(Status::parse)
                .unwrap_or(Status::Pending),
            category: row
                .get::<_, Option<String>>(6)?
                .as_deref()
                .and_then(Category::parse)
                .unwrap_or(Category::Assignment),
            weight: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
            grade: row.get(8)?,
            description: row.get(9)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub student_no: String,
    pub course_id: Option<i64>,
    pub grade: Option<f64>,
    pub tags: String,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub section: Option<String>,
    pub guardian_name: Option<String>,
    pub contact_number: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub enrollment_date: Option<String>,
    pub nationality: Option<String>,
    pub category: Option<String>,
    pub emergency_contact: Option<String>,
}

impl Student {
    pub const COLUMNS: &'static str = "id, name, student_no, course_id, grade, tags, \
         birth_date, gender, section, guardian_name, contact_number, email, address, \
         enrollment_date, nationality, category, emergency_contact";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            student_no: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            course_id: row.get(3)?,
            grade: row.get(4)?,
            tags: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            birth_date: row.get(6)?,
            gender: row.get(7)?,
            section: row.get(8)?,
            guardian_name: row.get(9)?,
            contact_number: row.get(10)?,
            email: row.get(11)?,
            address: row.get(12)?,
            enrollment_date: row.get(13)?,
            nationality: row.get(14)?,
            category: row.get(15)?,
            emergency_contact: row.get(16)?,
        })
    }
}

/// One saved what-if override. Scenario membership is the name-prefix
/// convention: `"<base> - Assignment <assignmentId>"`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRecord {
    pub id: i64,
    pub name: String,
    pub course_id: Option<i64>,
    pub assignment_id: Option<i64>,
    pub potential_grade: f64,
    pub created_on: Option<String>,
}

impl ScenarioRecord {
    pub const COLUMNS: &'static str =
        "id, name, course_id, assignment_id, potential_grade, created_on";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            course_id: row.get(2)?,
            assignment_id: row.get(3)?,
            potential_grade: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
            created_on: row.get(5)?,
        })
    }
}

/// Saved aggregate of one what-if exploration: the predicted overall grade
/// under a named scenario.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub id: i64,
    pub name: String,
    pub course_id: Option<i64>,
    pub student_id: Option<i64>,
    pub scenario_id: Option<i64>,
    pub predicted_grade: f64,
    pub created_on: Option<String>,
}

impl PredictionRecord {
    pub const COLUMNS: &'static str =
        "id, name, course_id, student_id, scenario_id, predicted_grade, created_on";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            course_id: row.get(2)?,
            student_id: row.get(3)?,
            scenario_id: row.get(4)?,
            predicted_grade: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
            created_on: row.get(6)?,
        })
    }
}

/// The portion of a scenario record name before `" - "`. Records that share
/// a base belong to the same saved scenario.
pub fn scenario_base_name(name: &str) -> &str {
    name.split(" - ").next().unwrap_or(name)
}
