//! Admin / manager console

use serde::Serialize;
use uuid::Uuid;

use super::Notice;
use crate::models::{
    task::{Task, TaskDraft, TaskScope},
    user::UserProfile,
};
use crate::session::CurrentUser;
use crate::store::{StoreError, TaskStore};

/// Shown for a task whose assignee has no profile
pub const UNASSIGNED: &str = "Unassigned";

/// State of the task form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "task_id", rename_all = "snake_case")]
pub enum FormMode {
    Closed,
    Create,
    Edit(Uuid),
}

/// One task line in the admin view
#[derive(Debug, Clone, Serialize)]
pub struct AdminTaskRow {
    #[serde(flatten)]
    pub task: Task,
    pub assignee_name: String,
}

/// Entry of the assignee picker
#[derive(Debug, Clone, Serialize)]
pub struct AssigneeOption {
    pub id: Uuid,
    pub username: String,
}

/// Serialisable snapshot of the console
#[derive(Debug, Clone, Serialize)]
pub struct AdminView {
    pub user: CurrentUser,
    pub assignees: Vec<AssigneeOption>,
    pub tasks: Vec<AdminTaskRow>,
    pub form: FormMode,
    pub draft: TaskDraft,
}

/// Console over all tasks
pub struct AdminConsole {
    store: TaskStore,
    user: CurrentUser,
    users: Vec<UserProfile>,
    tasks: Vec<Task>,
    form: FormMode,
    draft: TaskDraft,
}

impl AdminConsole {
    /// Loads the user list and every task
    pub async fn load(store: TaskStore, user: CurrentUser) -> Result<Self, StoreError> {
        let users = store.users().await?;
        let tasks = store.list(TaskScope::All).await?;

        tracing::debug!(
            user_id = %user.id,
            users = users.len(),
            tasks = tasks.len(),
            "Admin console loaded"
        );

        Ok(Self {
            store,
            user,
            users,
            tasks,
            form: FormMode::Closed,
            draft: TaskDraft::default(),
        })
    }

    /// Reloads users and tasks; state is kept if either call fails
    pub async fn refresh(&mut self) -> Result<(), StoreError> {
        let users = self.store.users().await?;
        let tasks = self.store.list(TaskScope::All).await?;
        self.users = users;
        self.tasks = tasks;
        Ok(())
    }

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn users(&self) -> &[UserProfile] {
        &self.users
    }

    pub fn form(&self) -> FormMode {
        self.form
    }

    pub fn draft(&self) -> &TaskDraft {
        &self.draft
    }

    /// Display name of a task's assignee
    pub fn assignee_name(&self, task: &Task) -> &str {
        self.users
            .iter()
            .find(|u| u.id == task.assignee)
            .map(|u| u.username.as_str())
            .unwrap_or(UNASSIGNED)
    }

    /// Creates a task and appends it to the list
    pub async fn create(&mut self, draft: &TaskDraft) -> Result<Notice, StoreError> {
        let task = self.store.create(draft, self.user.id).await?;
        tracing::info!(task_id = %task.id, created_by = %self.user.id, "Task created");

        self.tasks.push(task);
        Ok(Notice::success("Task created successfully!"))
    }

    /// Replaces every editable field of a task and the matching row
    pub async fn update(&mut self, id: Uuid, draft: &TaskDraft) -> Result<Notice, StoreError> {
        let updated = self.store.update(id, draft).await?;
        tracing::info!(task_id = %id, "Task updated");

        match self.tasks.iter_mut().find(|t| t.id == id) {
            Some(row) => *row = updated,
            None => self.tasks.push(updated),
        }
        Ok(Notice::success("Task updated successfully!"))
    }

    /// Deletes a task and removes exactly that row
    pub async fn delete(&mut self, id: Uuid) -> Result<Notice, StoreError> {
        self.store.delete(id).await?;
        tracing::info!(task_id = %id, "Task deleted");

        self.tasks.retain(|t| t.id != id);
        Ok(Notice::success("Task deleted successfully!"))
    }

    /// Opens an empty form for a new task
    pub fn open_create(&mut self) {
        self.form = FormMode::Create;
        self.draft = TaskDraft::default();
    }

    /// Opens the form prefilled from a listed task; `false` if it is not listed
    pub fn begin_edit(&mut self, id: Uuid) -> bool {
        match self.tasks.iter().find(|t| t.id == id) {
            Some(task) => {
                self.draft = TaskDraft::from_task(task);
                self.form = FormMode::Edit(id);
                true
            }
            None => false,
        }
    }

    /// Replaces the form contents
    pub fn set_draft(&mut self, draft: TaskDraft) {
        self.draft = draft;
    }

    /// Closes the form and discards its contents
    pub fn cancel(&mut self) {
        self.form = FormMode::Closed;
        self.draft = TaskDraft::default();
    }

    /// Submits the open form; it closes only on success
    pub async fn submit(&mut self) -> Result<Notice, StoreError> {
        let draft = self.draft.clone();
        let notice = match self.form {
            FormMode::Closed => {
                return Err(StoreError::Invalid("No task form is open.".to_string()))
            }
            FormMode::Create => self.create(&draft).await?,
            FormMode::Edit(id) => self.update(id, &draft).await?,
        };

        self.cancel();
        Ok(notice)
    }

    pub fn view(&self) -> AdminView {
        AdminView {
            user: self.user.clone(),
            assignees: self
                .users
                .iter()
                .map(|u| AssigneeOption {
                    id: u.id,
                    username: u.username.clone(),
                })
                .collect(),
            tasks: self
                .tasks
                .iter()
                .map(|t| AdminTaskRow {
                    task: t.clone(),
                    assignee_name: self.assignee_name(t).to_string(),
                })
                .collect(),
            form: self.form,
            draft: self.draft.clone(),
        }
    }
}
