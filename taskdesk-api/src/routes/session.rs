/// Session endpoints
///
/// - `GET  /session` - Current [`SessionState`] of the bearer
/// - `POST /session/refresh` - Exchange a refresh token for a new session
/// - `GET  /session/events` - Server-Sent Events stream of [`SessionState`]
///
/// # SSE Event Format
///
/// ```text
/// event: session
/// data: {"state":"loading"}
///
/// event: session
/// data: {"state":"ready","id":"...","email":"ana@example.com","username":"ana","role":"team_member"}
/// ```
///
/// Each connection owns one [`SessionWatcher`]; closing the connection drops
/// the watcher and with it the auth subscription.

use crate::{
    app::AppState,
    error::ApiResult,
    middleware::session::{bearer_token, SessionContext},
};
use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use taskdesk_shared::{
    backend::{AccessToken, AuthApi},
    session::{SessionState, SessionWatcher},
};
use tokio_stream::wrappers::WatchStream;
use uuid::Uuid;

/// Refresh request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// A fresh session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub access_token: AccessToken,
    pub refresh_token: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// `GET /session`
pub async fn current(Extension(ctx): Extension<SessionContext>) -> Json<SessionState> {
    Json(ctx.state)
}

/// `POST /session/refresh`
///
/// # Errors
///
/// - `401 Unauthorized`: the refresh token is unknown, expired or revoked
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let session = state.backend.refresh(&req.refresh_token).await?;
    tracing::debug!(user_id = %session.identity.id, "Session refreshed");

    Ok(Json(SessionResponse {
        user_id: session.identity.id,
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_at: session.expires_at,
    }))
}

/// State updates of one watcher, rendered as SSE events
pub struct SessionEvents {
    updates: WatchStream<SessionState>,
    _watcher: SessionWatcher,
}

impl SessionEvents {
    pub fn new(watcher: SessionWatcher) -> Self {
        Self {
            updates: WatchStream::new(watcher.receiver()),
            _watcher: watcher,
        }
    }
}

impl Stream for SessionEvents {
    type Item = Result<Event, axum::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.updates)
            .poll_next(cx)
            .map(|state| state.map(|s| Event::default().event("session").json_data(&s)))
    }
}

/// `GET /session/events`
pub async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Sse<SessionEvents>> {
    let token = bearer_token(&headers)?;
    let watcher = SessionWatcher::start(state.backend.clone(), token);
    tracing::debug!("Session event stream opened");

    Ok(Sse::new(SessionEvents::new(watcher)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
