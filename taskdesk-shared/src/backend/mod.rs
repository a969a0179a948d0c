//! Backend collaborator seam
//!
//! All state lives in a backend that provides authentication plus two tables,
//! `users` and `tasks`. This module defines that contract as three async
//! traits and the types that cross it; the rest of the crate only ever talks
//! to a `dyn Backend`.
//!
//! # Adapters
//!
//! - [`rest::RestBackend`]: the hosted backend over HTTP (auth under
//!   `/auth/v1`, tables under `/rest/v1`), configured by URL + API key
//! - [`postgres::PgBackend`]: the same contract on a PostgreSQL database
//! - [`memory::MemoryBackend`]: in-process, for development and tests
//!
//! # Auth events
//!
//! Every adapter publishes [`AuthEvent`]s for sign-in, token refresh and
//! sign-out performed through it. [`AuthApi::subscribe`] hands out an
//! [`AuthSubscription`]; dropping the subscription is the one and only
//! unsubscribe.

pub mod memory;
pub mod postgres;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{
    task::{NewTask, Task, TaskScope, TaskUpdate},
    user::{NewProfile, UserProfile},
    MalformedRecord,
};

/// Result type for backend calls
pub type BackendResult<T> = Result<T, BackendError>;

/// Failure reported by a backend call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Email/password pair was not accepted
    #[error("{0}")]
    InvalidCredentials(String),

    /// Access token missing, expired or revoked
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Backend refused a write (constraint, policy, duplicate)
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Targeted row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request never got a usable answer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response arrived but did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Anything else on the backend side
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BackendError {
    /// Whether the error means "there is no valid session"
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            BackendError::Unauthorized(_) | BackendError::InvalidCredentials(_)
        )
    }
}

impl From<MalformedRecord> for BackendError {
    fn from(err: MalformedRecord) -> Self {
        BackendError::MalformedResponse(err.to_string())
    }
}

/// Opaque bearer token for the backend
///
/// The empty token is the anonymous caller: the hosted backend then
/// authenticates with the project API key alone.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token for calls made without a user session
    pub fn anonymous() -> Self {
        Self(String::new())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            f.write_str("AccessToken(anonymous)")
        } else {
            f.write_str("AccessToken(***)")
        }
    }
}

/// An authenticated identity, as known to the auth side of the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
}

/// A live login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: AccessToken,
    pub refresh_token: String,
    /// Access-token expiry (Unix timestamp), when the backend reports one
    pub expires_at: Option<i64>,
    pub identity: Identity,
}

/// Result of a sign-up
///
/// `session` is `None` when the backend requires email confirmation before
/// the first sign-in.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub identity: Identity,
    pub session: Option<AuthSession>,
}

/// Auth-state change published by a backend
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    TokenRefreshed(AuthSession),
    SignedOut { identity: Uuid },
}

impl AuthEvent {
    /// Identity the event concerns
    pub fn identity(&self) -> Uuid {
        match self {
            AuthEvent::SignedIn(s) | AuthEvent::TokenRefreshed(s) => s.identity.id,
            AuthEvent::SignedOut { identity } => *identity,
        }
    }
}

/// Receiving end of the auth event stream
///
/// Owns exactly one broadcast receiver; dropping it unsubscribes.
pub struct AuthSubscription {
    rx: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    /// Waits for the next event
    ///
    /// Returns `None` once the publishing backend is gone. Events missed
    /// because the subscriber fell behind are skipped with a warning; the
    /// next event still triggers a fresh resolution.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Auth subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Publisher side shared by all adapters
#[derive(Debug, Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event; having no subscribers is not an error
    pub fn publish(&self, event: AuthEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Authentication side of the backend
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Creates an identity for an email/password pair
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<SignUp>;

    /// Starts a session; publishes [`AuthEvent::SignedIn`]
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession>;

    /// Ends the session the token belongs to; publishes [`AuthEvent::SignedOut`]
    async fn sign_out(&self, token: &AccessToken) -> BackendResult<()>;

    /// Identity behind a token, or `None` if the token is not a live session
    async fn current_identity(&self, token: &AccessToken) -> BackendResult<Option<Identity>>;

    /// Exchanges a refresh token; publishes [`AuthEvent::TokenRefreshed`]
    async fn refresh(&self, refresh_token: &str) -> BackendResult<AuthSession>;

    /// Subscribes to auth events
    fn subscribe(&self) -> AuthSubscription;

    /// Number of live subscriptions
    fn subscriber_count(&self) -> usize;
}

/// The `users` table
#[async_trait]
pub trait UserTable: Send + Sync {
    async fn select_profile(&self, token: &AccessToken, id: Uuid)
        -> BackendResult<Option<UserProfile>>;

    async fn select_profiles(&self, token: &AccessToken) -> BackendResult<Vec<UserProfile>>;

    async fn insert_profile(&self, token: &AccessToken, profile: NewProfile)
        -> BackendResult<UserProfile>;
}

/// The `tasks` table
#[async_trait]
pub trait TaskTable: Send + Sync {
    async fn select_tasks(&self, token: &AccessToken, scope: TaskScope) -> BackendResult<Vec<Task>>;

    /// Inserts and returns the stored row with its server-assigned ID
    async fn insert_task(&self, token: &AccessToken, task: NewTask) -> BackendResult<Task>;

    /// Applies an update; `None` when no row has that ID
    async fn update_task(
        &self,
        token: &AccessToken,
        id: Uuid,
        update: TaskUpdate,
    ) -> BackendResult<Option<Task>>;

    /// Deletes by ID; `false` when no row has that ID
    async fn delete_task(&self, token: &AccessToken, id: Uuid) -> BackendResult<bool>;
}

/// A complete backend
pub trait Backend: AuthApi + UserTable + TaskTable {
    /// Short name for logs and health output
    fn kind(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: Uuid) -> AuthSession {
        AuthSession {
            access_token: AccessToken::new("t"),
            refresh_token: "r".to_string(),
            expires_at: None,
            identity: Identity { id, email: None },
        }
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("eyJsecret");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
        assert!(AccessToken::anonymous().is_anonymous());
    }

    #[test]
    fn test_event_identity() {
        let id = Uuid::new_v4();
        assert_eq!(AuthEvent::SignedIn(session(id)).identity(), id);
        assert_eq!(AuthEvent::SignedOut { identity: id }.identity(), id);
    }

    #[test]
    fn test_malformed_record_maps_to_malformed_response() {
        let err: BackendError = MalformedRecord::MissingField("tasks.id").into();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
        assert!(!err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_subscription_count_tracks_drop() {
        let events = AuthEvents::default();
        assert_eq!(events.subscriber_count(), 0);

        let mut sub = events.subscribe();
        assert_eq!(events.subscriber_count(), 1);

        let id = Uuid::new_v4();
        events.publish(AuthEvent::SignedOut { identity: id });
        assert_eq!(sub.recv().await.map(|e| e.identity()), Some(id));

        drop(sub);
        assert_eq!(events.subscriber_count(), 0);
    }
}
