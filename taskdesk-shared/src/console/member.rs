//! Team member console

use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::Notice;
use crate::models::task::{Task, TaskScope};
use crate::session::CurrentUser;
use crate::store::{self, StoreError, TaskStore};

/// One task line with its pending progress input
#[derive(Debug, Clone, Serialize)]
pub struct MemberTaskRow {
    #[serde(flatten)]
    pub task: Task,
    pub progress_input: String,
}

/// Serialisable snapshot of the console
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub user: CurrentUser,
    pub tasks: Vec<MemberTaskRow>,
}

/// Console over the caller's own tasks
pub struct MemberConsole {
    store: TaskStore,
    user: CurrentUser,
    tasks: Vec<Task>,
    inputs: HashMap<Uuid, String>,
}

impl MemberConsole {
    /// Loads the tasks assigned to `user`
    pub async fn load(store: TaskStore, user: CurrentUser) -> Result<Self, StoreError> {
        let tasks = store.list(TaskScope::AssignedTo(user.id)).await?;
        tracing::debug!(user_id = %user.id, tasks = tasks.len(), "Member console loaded");

        Ok(Self {
            store,
            user,
            tasks,
            inputs: HashMap::new(),
        })
    }

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Records the raw progress typed for a task
    pub fn set_progress_input(&mut self, id: Uuid, value: impl Into<String>) {
        self.inputs.insert(id, value.into());
    }

    pub fn progress_input(&self, id: Uuid) -> &str {
        self.inputs.get(&id).map(String::as_str).unwrap_or("")
    }

    /// Submits the recorded input for a task
    pub async fn submit_progress(&mut self, id: Uuid) -> Result<Notice, StoreError> {
        let raw = self.progress_input(id).to_string();
        self.update_progress(id, &raw).await
    }

    /// Validates `raw` and patches the progress of one listed task
    ///
    /// Tasks not assigned to the caller are refused without a request.
    pub async fn update_progress(&mut self, id: Uuid, raw: &str) -> Result<Notice, StoreError> {
        let progress = store::parse_progress(raw)?;

        if !self.tasks.iter().any(|t| t.id == id) {
            return Err(StoreError::NotFound {
                message: "Failed to update progress.".to_string(),
            });
        }

        let updated = self.store.set_progress(id, progress).await?;
        tracing::info!(task_id = %id, progress = progress.value(), "Progress updated");

        if let Some(row) = self.tasks.iter_mut().find(|t| t.id == id) {
            row.progress = updated.progress;
        }
        self.inputs.remove(&id);
        Ok(Notice::success("Progress updated successfully!"))
    }

    pub fn view(&self) -> MemberView {
        MemberView {
            user: self.user.clone(),
            tasks: self
                .tasks
                .iter()
                .map(|t| MemberTaskRow {
                    task: t.clone(),
                    progress_input: self.progress_input(t.id).to_string(),
                })
                .collect(),
        }
    }
}
