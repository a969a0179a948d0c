//! Session resolution
//!
//! Turns an access token into the current user by asking the auth side for
//! the identity and then reading that identity's profile row.
//!
//! [`resolve`] is a single lookup. [`SessionWatcher`] keeps the answer fresh:
//! it subscribes to the backend's auth events before its first lookup and
//! resolves its own token again on every sign-in, token refresh and sign-out
//! that concerns its identity, publishing [`SessionState`] through a `watch` channel.
//! Route decisions are held back while the state is [`SessionState::Loading`].

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{AccessToken, Backend, BackendError, Identity};
use crate::models::user::{Role, UserProfile};

/// Shown when an identity has no readable profile row
pub const PROFILE_MISSING_MESSAGE: &str = "Failed to fetch user details.";

/// The resolved `{id, username, role}` of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub username: String,
    pub role: Role,
}

impl From<UserProfile> for CurrentUser {
    fn from(p: UserProfile) -> Self {
        Self {
            id: p.id,
            email: p.email,
            username: p.username,
            role: p.role,
        }
    }
}

/// Outcome of a single resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No token, or the backend does not recognise it
    Unauthenticated,

    /// Authenticated, but no profile row exists for the identity
    ProfileMissing(Identity),

    Resolved(CurrentUser),
}

impl Resolution {
    /// Identity behind the resolution, if any
    pub fn identity(&self) -> Option<Uuid> {
        match self {
            Resolution::Unauthenticated => None,
            Resolution::ProfileMissing(identity) => Some(identity.id),
            Resolution::Resolved(user) => Some(user.id),
        }
    }
}

/// A lookup failed for a reason other than "no session"
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to resolve session: {0}")]
    Identity(#[source] BackendError),

    #[error("{}", PROFILE_MISSING_MESSAGE)]
    Profile(#[source] BackendError),
}

/// Resolves the user behind `token`
///
/// # Errors
///
/// Auth failures are not errors; they resolve to
/// [`Resolution::Unauthenticated`]. Anything else the backend reports,
/// including a profile row that fails validation, is a [`SessionError`].
pub async fn resolve(
    backend: &dyn Backend,
    token: Option<&AccessToken>,
) -> Result<Resolution, SessionError> {
    let token = match token {
        Some(t) if !t.is_anonymous() => t,
        _ => return Ok(Resolution::Unauthenticated),
    };

    let identity = match backend.current_identity(token).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return Ok(Resolution::Unauthenticated),
        Err(e) if e.is_auth_failure() => return Ok(Resolution::Unauthenticated),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to fetch authenticated user");
            return Err(SessionError::Identity(e));
        }
    };

    match backend.select_profile(token, identity.id).await {
        Ok(Some(profile)) => Ok(Resolution::Resolved(profile.into())),
        Ok(None) => {
            tracing::warn!(user_id = %identity.id, "No profile row for identity");
            Ok(Resolution::ProfileMissing(identity))
        }
        Err(e) => {
            tracing::warn!(user_id = %identity.id, error = %e, "Failed to fetch user role");
            Err(SessionError::Profile(e))
        }
    }
}

/// Published state of a watched session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// A resolution is in flight; no route decision may be made
    Loading,
    Unauthenticated,
    ProfileMissing { message: String },
    Failed { message: String },
    Ready(CurrentUser),
}

impl SessionState {
    /// Role used for routing; only a ready session has one
    pub fn role(&self) -> Option<Role> {
        match self {
            SessionState::Ready(user) => Some(user.role),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&CurrentUser> {
        match self {
            SessionState::Ready(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }
}

impl From<Result<Resolution, SessionError>> for SessionState {
    fn from(result: Result<Resolution, SessionError>) -> Self {
        match result {
            Ok(Resolution::Unauthenticated) => SessionState::Unauthenticated,
            Ok(Resolution::ProfileMissing(_)) => SessionState::ProfileMissing {
                message: PROFILE_MISSING_MESSAGE.to_string(),
            },
            Ok(Resolution::Resolved(user)) => SessionState::Ready(user),
            Err(e) => SessionState::Failed {
                message: e.to_string(),
            },
        }
    }
}

/// Long-lived session tracker
///
/// Holds the one auth subscription for its lifetime. [`SessionWatcher::stop`]
/// or dropping the watcher ends the background task, which drops the
/// subscription.
pub struct SessionWatcher {
    state: watch::Receiver<SessionState>,
    task: Option<JoinHandle<()>>,
}

impl SessionWatcher {
    /// Subscribes to auth events, then starts the first resolution
    ///
    /// The watcher is bound to `token` for its whole life. Events for the
    /// same identity, including those of its other logins, only trigger a
    /// fresh resolution with that token.
    pub fn start(backend: Arc<dyn Backend>, token: Option<AccessToken>) -> Self {
        let mut events = backend.subscribe();
        let (tx, rx) = watch::channel(SessionState::Loading);

        let task = tokio::spawn(async move {
            let mut identity = resolve_into(&tx, backend.as_ref(), token.as_ref()).await;

            while let Some(event) = events.recv().await {
                if identity != Some(event.identity()) {
                    continue;
                }

                tracing::debug!(user_id = ?identity, "Auth state changed, resolving session");
                if let Some(id) = resolve_into(&tx, backend.as_ref(), token.as_ref()).await {
                    identity = Some(id);
                }

                if tx.is_closed() {
                    break;
                }
            }
        });

        Self {
            state: rx,
            task: Some(task),
        }
    }

    /// Latest published state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// A receiver for following state changes
    pub fn receiver(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Waits until the state is no longer [`SessionState::Loading`]
    pub async fn settled(&mut self) -> SessionState {
        let settled = self
            .state
            .wait_for(|s| !s.is_loading())
            .await
            .map(|s| s.clone());
        settled.unwrap_or_else(|_| self.state())
    }

    /// Stops the watcher and waits for its task to finish
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Publishes `Loading`, resolves, publishes the outcome; returns the identity
async fn resolve_into(
    tx: &watch::Sender<SessionState>,
    backend: &dyn Backend,
    token: Option<&AccessToken>,
) -> Option<Uuid> {
    tx.send_replace(SessionState::Loading);

    let result = resolve(backend, token).await;
    let identity = result.as_ref().ok().and_then(Resolution::identity);
    tx.send_replace(SessionState::from(result));
    identity
}
