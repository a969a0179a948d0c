//! Task consoles
//!
//! Per-page view models. Each console owns its task list and changes it only
//! after the backend has confirmed a write, so a failed call leaves the list
//! exactly as it was.
//!
//! - [`admin::AdminConsole`]: every task, every user, create/edit/delete
//! - [`member::MemberConsole`]: the caller's own tasks, progress reporting

pub mod admin;
pub mod member;

use serde::Serialize;

use crate::store::StoreError;

/// Severity of a [`Notice`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Toast-style message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl From<&StoreError> for Notice {
    fn from(err: &StoreError) -> Self {
        Notice::error(err.to_string())
    }
}
