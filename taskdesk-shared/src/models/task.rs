//! Task model
//!
//! Tasks are created by an admin or manager, assigned to a single user, and
//! carry a progress percentage that the assignee reports.
//!
//! # Lifecycle
//!
//! ```text
//! create (admin/manager) ──> update details (creator console)
//!                        ──> update progress (assignee)
//!                        ──> delete (admin/manager)
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE tasks (
//!     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     title TEXT NOT NULL,
//!     description TEXT NOT NULL DEFAULT '',
//!     assignee UUID NOT NULL,
//!     status TEXT NOT NULL DEFAULT 'pending',
//!     priority TEXT NOT NULL DEFAULT 'medium',
//!     due_date DATE NOT NULL,
//!     created_by UUID NOT NULL,
//!     progress INTEGER DEFAULT 0,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! The database does not re-check the progress range; [`Progress`] is the
//! only place the 0..=100 bound is enforced before a write, and rows read back
//! with an out-of-range value are rejected as malformed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::MalformedRecord;

/// Message shown when a required draft field is blank
pub const REQUIRED_FIELDS_MESSAGE: &str = "Please fill all required fields.";

/// Message shown when a progress value is missing or out of range
pub const PROGRESS_RANGE_MESSAGE: &str = "Please enter a valid progress percentage (0-100).";

/// Task status
///
/// Declared for display; no console operation transitions it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Error for a progress value outside 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("progress {0} is outside 0..=100")]
pub struct ProgressOutOfRange(pub i64);

/// Completion percentage, always within 0..=100
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Progress(u8);

impl Progress {
    pub const MAX: u8 = 100;

    /// Raw percentage value
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Progress {
    type Error = ProgressOutOfRange;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        if (0..=i64::from(Self::MAX)).contains(&v) {
            Ok(Progress(v as u8))
        } else {
            Err(ProgressOutOfRange(v))
        }
    }
}

impl From<Progress> for u8 {
    fn from(p: Progress) -> Self {
        p.0
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// A validated task row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned ID
    pub id: Uuid,

    pub title: String,

    pub description: String,

    /// User the task is assigned to
    pub assignee: Uuid,

    pub status: TaskStatus,

    pub priority: TaskPriority,

    pub due_date: NaiveDate,

    /// Admin or manager who created the task
    pub created_by: Uuid,

    /// Reported progress, 0 until the assignee reports
    pub progress: Progress,
}

/// Task form values exactly as entered
///
/// Every field is a plain string so blank input can be told apart from a
/// missing one and reported with the same message the form shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub assignee: String,
    pub due_date: String,
    pub priority: TaskPriority,
}

/// Error raised by [`TaskDraft::validate`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    /// Title, due date or assignee is blank
    #[error("{}", REQUIRED_FIELDS_MESSAGE)]
    MissingRequired,

    /// Due date is not a `YYYY-MM-DD` date
    #[error("Invalid due date: {0}")]
    InvalidDueDate(String),

    /// Assignee is not a user ID
    #[error("Invalid assignee: {0}")]
    InvalidAssignee(String),
}

/// A draft whose required fields are present and parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidTaskDraft {
    pub title: String,
    pub description: String,
    pub assignee: Uuid,
    pub due_date: NaiveDate,
    pub priority: TaskPriority,
}

impl TaskDraft {
    /// Checks required fields and parses the typed ones
    ///
    /// # Errors
    ///
    /// - [`DraftError::MissingRequired`] if title, due date or assignee is blank
    /// - [`DraftError::InvalidDueDate`] / [`DraftError::InvalidAssignee`] if a
    ///   value is present but unparseable
    pub fn validate(&self) -> Result<ValidTaskDraft, DraftError> {
        let title = self.title.trim();
        let due_date = self.due_date.trim();
        let assignee = self.assignee.trim();

        if title.is_empty() || due_date.is_empty() || assignee.is_empty() {
            return Err(DraftError::MissingRequired);
        }

        let due_date = NaiveDate::parse_from_str(due_date, "%Y-%m-%d")
            .map_err(|_| DraftError::InvalidDueDate(due_date.to_string()))?;
        let assignee = Uuid::parse_str(assignee)
            .map_err(|_| DraftError::InvalidAssignee(assignee.to_string()))?;

        Ok(ValidTaskDraft {
            title: title.to_string(),
            description: self.description.clone(),
            assignee,
            due_date,
            priority: self.priority,
        })
    }

    /// Prefills a draft from an existing task (edit mode)
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            assignee: task.assignee.to_string(),
            due_date: task.due_date.format("%Y-%m-%d").to_string(),
            priority: task.priority,
        }
    }
}

/// Input for inserting a task
///
/// Status and progress are left to their column defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub assignee: Uuid,
    pub due_date: NaiveDate,
    pub priority: TaskPriority,
    pub created_by: Uuid,
}

impl NewTask {
    pub fn from_draft(draft: ValidTaskDraft, created_by: Uuid) -> Self {
        Self {
            title: draft.title,
            description: draft.description,
            assignee: draft.assignee,
            due_date: draft.due_date,
            priority: draft.priority,
            created_by,
        }
    }
}

/// Change applied by an update call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskUpdate {
    /// Replace every editable field (admin edit)
    Details(ValidTaskDraft),

    /// Patch only the progress column (assignee)
    Progress(Progress),
}

/// Which rows a list call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    /// Every task (admin console)
    All,

    /// Tasks whose assignee is the given user (member console)
    AssignedTo(Uuid),
}

/// Task row as it comes off the wire or out of the database
#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct TaskRecord {
    pub id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee: Option<Uuid>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub created_by: Option<Uuid>,
    pub progress: Option<i32>,
}

impl TryFrom<TaskRecord> for Task {
    type Error = MalformedRecord;

    fn try_from(rec: TaskRecord) -> Result<Self, Self::Error> {
        let status = match rec.status {
            Some(s) => s.parse().map_err(|reason| MalformedRecord::InvalidValue {
                field: "tasks.status",
                reason,
            })?,
            None => TaskStatus::default(),
        };
        let priority = match rec.priority {
            Some(p) => p.parse().map_err(|reason| MalformedRecord::InvalidValue {
                field: "tasks.priority",
                reason,
            })?,
            None => TaskPriority::default(),
        };
        let progress = Progress::try_from(i64::from(rec.progress.unwrap_or(0))).map_err(|e| {
            MalformedRecord::InvalidValue {
                field: "tasks.progress",
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            id: rec.id.ok_or(MalformedRecord::MissingField("tasks.id"))?,
            title: rec.title.ok_or(MalformedRecord::MissingField("tasks.title"))?,
            description: rec.description.unwrap_or_default(),
            assignee: rec
                .assignee
                .ok_or(MalformedRecord::MissingField("tasks.assignee"))?,
            status,
            priority,
            due_date: rec
                .due_date
                .ok_or(MalformedRecord::MissingField("tasks.due_date"))?,
            created_by: rec
                .created_by
                .ok_or(MalformedRecord::MissingField("tasks.created_by"))?,
            progress,
        })
    }
}
