/// Admin dashboard endpoints (admin and manager)
///
/// # Endpoints
///
/// - `GET    /admin-dashboard` - Every task with assignee names, and the users
/// - `POST   /admin-dashboard/tasks` - Create a task
/// - `PUT    /admin-dashboard/tasks/:id` - Replace a task's editable fields
/// - `DELETE /admin-dashboard/tasks/:id` - Delete a task
///
/// Team members visiting the page are redirected to `/dashboard`, anonymous
/// visitors to `/login`. Mutations answer `401` or `403` instead.

use super::Mutation;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::session::{PageAccess, SessionContext},
};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use taskdesk_shared::{
    console::admin::{AdminConsole, AdminView},
    models::task::TaskDraft,
    routing::Route,
    store::TaskStore,
};
use uuid::Uuid;

async fn open(state: &AppState, ctx: &SessionContext) -> ApiResult<AdminConsole> {
    let (token, user) = ctx.authorize(Route::AdminDashboard)?;
    let store = TaskStore::new(state.backend.clone(), token);
    Ok(AdminConsole::load(store, user).await?)
}

/// `GET /admin-dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> ApiResult<Response> {
    match ctx.page(Route::AdminDashboard)? {
        PageAccess::Redirect(route) => Ok(Redirect::to(route.path()).into_response()),
        PageAccess::Granted { token, user } => {
            let store = TaskStore::new(state.backend.clone(), token);
            let console = AdminConsole::load(store, user).await?;
            Ok(Json(console.view()).into_response())
        }
    }
}

/// Create a task
///
/// # Endpoint
///
/// ```text
/// POST /admin-dashboard/tasks
/// Content-Type: application/json
///
/// {
///   "title": "Draft report",
///   "description": "",
///   "assignee": "uuid",
///   "due_date": "2025-03-01",
///   "priority": "high"
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: title, due date or assignee missing; nothing
///   is written
pub async fn create_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Json(draft): Json<TaskDraft>,
) -> ApiResult<Json<Mutation<AdminView>>> {
    let mut console = open(&state, &ctx).await?;

    console.open_create();
    console.set_draft(draft);
    let notice = console.submit().await?;

    Ok(Json(Mutation {
        notice,
        view: console.view(),
    }))
}

/// `PUT /admin-dashboard/tasks/:id`
pub async fn update_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(id): Path<Uuid>,
    Json(draft): Json<TaskDraft>,
) -> ApiResult<Json<Mutation<AdminView>>> {
    let mut console = open(&state, &ctx).await?;

    if !console.begin_edit(id) {
        return Err(ApiError::NotFound("Failed to update task.".to_string()));
    }
    console.set_draft(draft);
    let notice = console.submit().await?;

    Ok(Json(Mutation {
        notice,
        view: console.view(),
    }))
}

/// `DELETE /admin-dashboard/tasks/:id`
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Mutation<AdminView>>> {
    let mut console = open(&state, &ctx).await?;
    let notice = console.delete(id).await?;

    Ok(Json(Mutation {
        notice,
        view: console.view(),
    }))
}
