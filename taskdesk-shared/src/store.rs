//! Task store client
//!
//! Thin, validating wrapper over the backend's `tasks` table for one
//! session. Input is checked before any request is made; a rejected draft or
//! progress value never reaches the backend. Nothing is retried.

use std::sync::Arc;
use uuid::Uuid;

use crate::backend::{AccessToken, Backend, BackendError};
use crate::models::{
    task::{
        DraftError, NewTask, Progress, Task, TaskDraft, TaskScope, TaskUpdate,
        PROGRESS_RANGE_MESSAGE,
    },
    user::UserProfile,
};

/// Failure of a store operation
///
/// `Display` is the message shown to the user.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Input rejected locally; no request was made
    #[error("{0}")]
    Invalid(String),

    /// The targeted task does not exist
    #[error("{message}")]
    NotFound { message: String },

    /// The backend refused or failed the request
    #[error("{message}")]
    Backend {
        message: String,
        #[source]
        source: BackendError,
    },
}

impl StoreError {
    /// Whether the backend was never called
    pub fn is_local(&self) -> bool {
        matches!(self, StoreError::Invalid(_))
    }

    /// Backend error behind the failure, if any
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            StoreError::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DraftError> for StoreError {
    fn from(err: DraftError) -> Self {
        StoreError::Invalid(err.to_string())
    }
}

fn remote(message: impl Into<String>) -> impl FnOnce(BackendError) -> StoreError {
    let message = message.into();
    move |source| {
        tracing::error!(error = %source, "{}", message);
        StoreError::Backend { message, source }
    }
}

/// Parses a raw progress input
///
/// Accepts an integer in 0..=100 with optional surrounding whitespace.
pub fn parse_progress(raw: &str) -> Result<Progress, StoreError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|v| Progress::try_from(v).ok())
        .ok_or_else(|| StoreError::Invalid(PROGRESS_RANGE_MESSAGE.to_string()))
}

/// Task and user access for one session
#[derive(Clone)]
pub struct TaskStore {
    backend: Arc<dyn Backend>,
    token: AccessToken,
}

impl TaskStore {
    pub fn new(backend: Arc<dyn Backend>, token: AccessToken) -> Self {
        Self { backend, token }
    }

    /// Lists tasks in `scope`
    pub async fn list(&self, scope: TaskScope) -> Result<Vec<Task>, StoreError> {
        self.backend
            .select_tasks(&self.token, scope)
            .await
            .map_err(remote("Failed to fetch tasks."))
    }

    /// Every user profile, for assignee selection
    pub async fn users(&self) -> Result<Vec<UserProfile>, StoreError> {
        self.backend
            .select_profiles(&self.token)
            .await
            .map_err(remote("Failed to fetch users."))
    }

    /// Validates and inserts a draft; returns the stored row
    pub async fn create(&self, draft: &TaskDraft, created_by: Uuid) -> Result<Task, StoreError> {
        let valid = draft.validate()?;

        self.backend
            .insert_task(&self.token, NewTask::from_draft(valid, created_by))
            .await
            .map_err(|source| {
                let message = format!("Failed to create task: {}", source);
                tracing::error!(error = %source, "Task creation failed");
                StoreError::Backend { message, source }
            })
    }

    /// Replaces every editable field of a task
    pub async fn update(&self, id: Uuid, draft: &TaskDraft) -> Result<Task, StoreError> {
        let valid = draft.validate()?;
        let message = "Failed to update task.";

        self.backend
            .update_task(&self.token, id, TaskUpdate::Details(valid))
            .await
            .map_err(remote(message))?
            .ok_or_else(|| StoreError::NotFound {
                message: message.to_string(),
            })
    }

    /// Sets only the progress of a task from raw input
    pub async fn update_progress(&self, id: Uuid, raw: &str) -> Result<Task, StoreError> {
        let progress = parse_progress(raw)?;
        self.set_progress(id, progress).await
    }

    /// Sets only the progress of a task
    pub async fn set_progress(&self, id: Uuid, progress: Progress) -> Result<Task, StoreError> {
        let message = "Failed to update progress.";

        self.backend
            .update_task(&self.token, id, TaskUpdate::Progress(progress))
            .await
            .map_err(remote(message))?
            .ok_or_else(|| StoreError::NotFound {
                message: message.to_string(),
            })
    }

    /// Deletes a task
    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let message = "Failed to delete task.";

        let deleted = self
            .backend
            .delete_task(&self.token, id)
            .await
            .map_err(remote(message))?;

        if deleted {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                message: message.to_string(),
            })
        }
    }
}
