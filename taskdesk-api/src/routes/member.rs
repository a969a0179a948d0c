/// Member dashboard endpoints (team member)
///
/// - `GET  /dashboard` - The caller's own tasks
/// - `POST /dashboard/tasks/:id/progress` - Report progress on one of them
///
/// Admins and managers visiting the page are redirected to
/// `/admin-dashboard`.

use super::Mutation;
use crate::{
    app::AppState,
    error::ApiResult,
    middleware::session::{PageAccess, SessionContext},
};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use serde::Deserialize;
use taskdesk_shared::{
    console::member::{MemberConsole, MemberView},
    routing::Route,
    store::TaskStore,
};
use uuid::Uuid;

/// Progress as typed; a number or a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProgressInput {
    Number(serde_json::Number),
    Text(String),
}

impl ProgressInput {
    fn raw(&self) -> String {
        match self {
            ProgressInput::Number(n) => n.to_string(),
            ProgressInput::Text(s) => s.clone(),
        }
    }
}

/// Progress request
#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub progress: ProgressInput,
}

/// `GET /dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> ApiResult<Response> {
    match ctx.page(Route::Dashboard)? {
        PageAccess::Redirect(route) => Ok(Redirect::to(route.path()).into_response()),
        PageAccess::Granted { token, user } => {
            let store = TaskStore::new(state.backend.clone(), token);
            let console = MemberConsole::load(store, user).await?;
            Ok(Json(console.view()).into_response())
        }
    }
}

/// Report progress
///
/// # Endpoint
///
/// ```text
/// POST /dashboard/tasks/:id/progress
/// Content-Type: application/json
///
/// { "progress": 45 }
/// ```
///
/// # Errors
///
/// - `404 Not Found`: the task is not assigned to the caller
/// - `422 Unprocessable Entity`: not an integer between 0 and 100; nothing
///   is written
pub async fn update_progress(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProgressRequest>,
) -> ApiResult<Json<Mutation<MemberView>>> {
    let (token, user) = ctx.authorize(Route::Dashboard)?;
    let store = TaskStore::new(state.backend.clone(), token);
    let mut console = MemberConsole::load(store, user).await?;

    console.set_progress_input(id, req.progress.raw());
    let notice = console.submit_progress(id).await?;

    Ok(Json(Mutation {
        notice,
        view: console.view(),
    }))
}
