//! In-process backend
//!
//! Keeps accounts, sessions, profiles and tasks in memory behind a single
//! `RwLock`. Tokens are real HS256 JWTs (see [`crate::auth::jwt`]) and
//! passwords are Argon2id hashes, so flows that work here work the same way
//! against the Postgres backend. Rows keep insertion order.
//!
//! Sign-up confirms the identity immediately and returns a session.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AccessToken, AuthApi, AuthEvent, AuthEvents, AuthSession, AuthSubscription, Backend,
    BackendError, BackendResult, Identity, SignUp, TaskTable, UserTable,
};
use crate::auth::{
    jwt::{self, JwtError, TokenType},
    password::{self, HashParams},
};
use crate::models::{
    task::{NewTask, Progress, Task, TaskScope, TaskStatus, TaskUpdate},
    user::{NewProfile, UserProfile},
};

struct Account {
    id: Uuid,
    email: String,
    password_hash: String,
}

#[derive(Default)]
struct State {
    /// Keyed by lowercased email
    accounts: HashMap<String, Account>,
    live_sessions: HashSet<Uuid>,
    profiles: Vec<UserProfile>,
    tasks: Vec<Task>,
}

/// Backend that lives entirely in process memory
pub struct MemoryBackend {
    state: RwLock<State>,
    secret: String,
    params: HashParams,
    events: AuthEvents,
}

impl MemoryBackend {
    /// Creates an empty backend signing tokens with `secret`
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            secret: secret.into(),
            params: HashParams::light(),
            events: AuthEvents::default(),
        }
    }

    /// Overrides the password hashing parameters
    pub fn with_hash_params(mut self, params: HashParams) -> Self {
        self.params = params;
        self
    }

    fn open_session(&self, id: Uuid, email: &str, sid: Uuid) -> BackendResult<AuthSession> {
        let pair = jwt::issue_pair(id, Some(email.to_string()), sid, &self.secret)
            .map_err(|e| BackendError::Internal(e.to_string()))?;

        Ok(AuthSession {
            access_token: AccessToken::new(pair.access_token),
            refresh_token: pair.refresh_token,
            expires_at: Some(pair.expires_at),
            identity: Identity {
                id,
                email: Some(email.to_string()),
            },
        })
    }

    /// Claims of a live access token
    async fn authorize(&self, token: &AccessToken) -> BackendResult<jwt::Claims> {
        if token.is_anonymous() {
            return Err(BackendError::Unauthorized("No session".to_string()));
        }

        let claims = jwt::validate_token_of_type(token.as_str(), &self.secret, TokenType::Access)
            .map_err(token_error)?;

        if !self.state.read().await.live_sessions.contains(&claims.sid) {
            return Err(BackendError::Unauthorized("Session has ended".to_string()));
        }

        Ok(claims)
    }
}

fn token_error(err: JwtError) -> BackendError {
    match err {
        JwtError::Expired => BackendError::Unauthorized("Token expired".to_string()),
        other => BackendError::Unauthorized(other.to_string()),
    }
}

#[async_trait]
impl AuthApi for MemoryBackend {
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<SignUp> {
        let key = email.trim().to_lowercase();
        if key.is_empty() {
            return Err(BackendError::Rejected("Email is required".to_string()));
        }

        let password_hash = password::hash_password_with(password, self.params)
            .map_err(|e| BackendError::Internal(e.to_string()))?;

        let id = Uuid::new_v4();
        let sid = Uuid::new_v4();
        {
            let mut state = self.state.write().await;
            if state.accounts.contains_key(&key) {
                return Err(BackendError::Rejected("User already registered".to_string()));
            }
            state.accounts.insert(
                key.clone(),
                Account {
                    id,
                    email: key.clone(),
                    password_hash,
                },
            );
            state.live_sessions.insert(sid);
        }

        tracing::debug!(user_id = %id, "Identity created");

        let session = self.open_session(id, &key, sid)?;
        Ok(SignUp {
            identity: session.identity.clone(),
            session: Some(session),
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        let key = email.trim().to_lowercase();
        let invalid = || BackendError::InvalidCredentials("Invalid login credentials".to_string());

        let (id, stored_email, hash) = {
            let state = self.state.read().await;
            let account = state.accounts.get(&key).ok_or_else(invalid)?;
            (account.id, account.email.clone(), account.password_hash.clone())
        };

        let valid = password::verify_password(password, &hash)
            .map_err(|e| BackendError::Internal(e.to_string()))?;
        if !valid {
            return Err(invalid());
        }

        let sid = Uuid::new_v4();
        self.state.write().await.live_sessions.insert(sid);

        let session = self.open_session(id, &stored_email, sid)?;
        self.events.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, token: &AccessToken) -> BackendResult<()> {
        let claims = self.authorize(token).await?;
        self.state.write().await.live_sessions.remove(&claims.sid);

        self.events.publish(AuthEvent::SignedOut {
            identity: claims.sub,
        });
        Ok(())
    }

    async fn current_identity(&self, token: &AccessToken) -> BackendResult<Option<Identity>> {
        match self.authorize(token).await {
            Ok(claims) => Ok(Some(Identity {
                id: claims.sub,
                email: claims.email,
            })),
            Err(BackendError::Unauthorized(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> BackendResult<AuthSession> {
        let claims = jwt::validate_token_of_type(refresh_token, &self.secret, TokenType::Refresh)
            .map_err(token_error)?;

        if !self.state.read().await.live_sessions.contains(&claims.sid) {
            return Err(BackendError::Unauthorized("Session has ended".to_string()));
        }

        let email = claims.email.unwrap_or_default();
        let session = self.open_session(claims.sub, &email, claims.sid)?;
        self.events.publish(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }
}

#[async_trait]
impl UserTable for MemoryBackend {
    async fn select_profile(
        &self,
        token: &AccessToken,
        id: Uuid,
    ) -> BackendResult<Option<UserProfile>> {
        self.authorize(token).await?;
        let state = self.state.read().await;
        Ok(state.profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn select_profiles(&self, token: &AccessToken) -> BackendResult<Vec<UserProfile>> {
        self.authorize(token).await?;
        Ok(self.state.read().await.profiles.clone())
    }

    async fn insert_profile(
        &self,
        token: &AccessToken,
        profile: NewProfile,
    ) -> BackendResult<UserProfile> {
        let claims = self.authorize(token).await?;
        if claims.sub != profile.id {
            return Err(BackendError::Rejected(
                "Profiles can only be created for the signed-in identity".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if state.profiles.iter().any(|p| p.id == profile.id) {
            return Err(BackendError::Rejected(
                "duplicate key value violates unique constraint \"users_pkey\"".to_string(),
            ));
        }

        let profile = UserProfile::from(profile);
        state.profiles.push(profile.clone());
        Ok(profile)
    }
}

#[async_trait]
impl TaskTable for MemoryBackend {
    async fn select_tasks(&self, token: &AccessToken, scope: TaskScope) -> BackendResult<Vec<Task>> {
        self.authorize(token).await?;

        let state = self.state.read().await;
        let tasks = match scope {
            TaskScope::All => state.tasks.clone(),
            TaskScope::AssignedTo(user) => state
                .tasks
                .iter()
                .filter(|t| t.assignee == user)
                .cloned()
                .collect(),
        };
        Ok(tasks)
    }

    async fn insert_task(&self, token: &AccessToken, task: NewTask) -> BackendResult<Task> {
        self.authorize(token).await?;

        let task = Task {
            id: Uuid::new_v4(),
            title: task.title,
            description: task.description,
            assignee: task.assignee,
            status: TaskStatus::default(),
            priority: task.priority,
            due_date: task.due_date,
            created_by: task.created_by,
            progress: Progress::default(),
        };

        self.state.write().await.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(
        &self,
        token: &AccessToken,
        id: Uuid,
        update: TaskUpdate,
    ) -> BackendResult<Option<Task>> {
        self.authorize(token).await?;

        let mut state = self.state.write().await;
        let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };

        match update {
            TaskUpdate::Details(draft) => {
                task.title = draft.title;
                task.description = draft.description;
                task.assignee = draft.assignee;
                task.due_date = draft.due_date;
                task.priority = draft.priority;
            }
            TaskUpdate::Progress(progress) => task.progress = progress,
        }

        Ok(Some(task.clone()))
    }

    async fn delete_task(&self, token: &AccessToken, id: Uuid) -> BackendResult<bool> {
        self.authorize(token).await?;

        let mut state = self.state.write().await;
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != id);
        Ok(state.tasks.len() < before)
    }
}

impl Backend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }
}
