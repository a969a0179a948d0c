//! PostgreSQL backend
//!
//! Stores profiles and tasks in the `users` / `tasks` tables and runs its own
//! auth on `auth_identities` + `auth_sessions` (see `migrations/`). Tokens are
//! HS256 JWTs carrying the session ID; sign-out stamps `revoked_at`, after
//! which every token of that login is refused.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AccessToken, AuthApi, AuthEvent, AuthEvents, AuthSession, AuthSubscription, Backend,
    BackendError, BackendResult, Identity, SignUp, TaskTable, UserTable,
};
use crate::auth::{
    jwt::{self, Claims, JwtError, TokenType},
    password,
};
use crate::models::{
    task::{NewTask, Task, TaskRecord, TaskScope, TaskUpdate},
    user::{NewProfile, ProfileRecord, UserProfile},
};

const TASK_COLUMNS: &str =
    "id, title, description, assignee, status, priority, due_date, created_by, progress";

/// Backend on a PostgreSQL pool
pub struct PgBackend {
    pool: PgPool,
    jwt_secret: String,
    events: AuthEvents,
}

impl PgBackend {
    /// Wraps a migrated pool; `jwt_secret` signs session tokens
    pub fn new(pool: PgPool, jwt_secret: impl Into<String>) -> Self {
        Self {
            pool,
            jwt_secret: jwt_secret.into(),
            events: AuthEvents::default(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn session_is_live(&self, sid: Uuid) -> BackendResult<bool> {
        let live: Option<bool> = sqlx::query_scalar(
            "SELECT revoked_at IS NULL FROM auth_sessions WHERE id = $1",
        )
        .bind(sid)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(live.unwrap_or(false))
    }

    async fn authorize(&self, token: &AccessToken) -> BackendResult<Claims> {
        if token.is_anonymous() {
            return Err(BackendError::Unauthorized("No session".to_string()));
        }

        let claims =
            jwt::validate_token_of_type(token.as_str(), &self.jwt_secret, TokenType::Access)
                .map_err(token_error)?;

        if !self.session_is_live(claims.sid).await? {
            return Err(BackendError::Unauthorized("Session has ended".to_string()));
        }

        Ok(claims)
    }

    async fn start_session(&self, id: Uuid, email: &str) -> BackendResult<AuthSession> {
        let sid = Uuid::new_v4();
        sqlx::query("INSERT INTO auth_sessions (id, identity_id) VALUES ($1, $2)")
            .bind(sid)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        self.session_tokens(id, email, sid)
    }

    fn session_tokens(&self, id: Uuid, email: &str, sid: Uuid) -> BackendResult<AuthSession> {
        let pair = jwt::issue_pair(id, Some(email.to_string()), sid, &self.jwt_secret)
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
}

fn token_error(err: JwtError) -> BackendError {
    match err {
        JwtError::Expired => BackendError::Unauthorized("Token expired".to_string()),
        other => BackendError::Unauthorized(other.to_string()),
    }
}

fn db_error(err: sqlx::Error) -> BackendError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            BackendError::Rejected(db.message().to_string())
        }
        sqlx::Error::Database(db) if db.is_check_violation() => {
            BackendError::Rejected(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            BackendError::Transport(err.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            BackendError::MalformedResponse(err.to_string())
        }
        _ => BackendError::Internal(err.to_string()),
    }
}

#[async_trait]
impl AuthApi for PgBackend {
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<SignUp> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(BackendError::Rejected("Email is required".to_string()));
        }

        let hash = password::hash_password(password)
            .map_err(|e| BackendError::Internal(e.to_string()))?;

        let id = Uuid::new_v4();
        let inserted = sqlx::query(
            "INSERT INTO auth_identities (id, email, password_hash) VALUES ($1, $2, $3)
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(id)
        .bind(&email)
        .bind(&hash)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if inserted.rows_affected() == 0 {
            return Err(BackendError::Rejected("User already registered".to_string()));
        }

        tracing::info!(user_id = %id, "Identity created");

        let session = self.start_session(id, &email).await?;
        Ok(SignUp {
            identity: session.identity.clone(),
            session: Some(session),
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        let email = email.trim().to_lowercase();
        let invalid = || BackendError::InvalidCredentials("Invalid login credentials".to_string());

        let row: Option<(Uuid, String)> =
            sqlx::query_as("SELECT id, password_hash FROM auth_identities WHERE email = $1")
                .bind(&email)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        let (id, hash) = row.ok_or_else(invalid)?;
        let valid = password::verify_password(password, &hash)
            .map_err(|e| BackendError::Internal(e.to_string()))?;
        if !valid {
            return Err(invalid());
        }

        let session = self.start_session(id, &email).await?;
        self.events.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, token: &AccessToken) -> BackendResult<()> {
        let claims = self.authorize(token).await?;

        sqlx::query("UPDATE auth_sessions SET revoked_at = NOW() WHERE id = $1")
            .bind(claims.sid)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

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
        let claims =
            jwt::validate_token_of_type(refresh_token, &self.jwt_secret, TokenType::Refresh)
                .map_err(token_error)?;

        if !self.session_is_live(claims.sid).await? {
            return Err(BackendError::Unauthorized("Session has ended".to_string()));
        }

        let email = claims.email.unwrap_or_default();
        let session = self.session_tokens(claims.sub, &email, claims.sid)?;
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
impl UserTable for PgBackend {
    async fn select_profile(
        &self,
        token: &AccessToken,
        id: Uuid,
    ) -> BackendResult<Option<UserProfile>> {
        self.authorize(token).await?;

        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT id, email, username, role FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        record
            .map(UserProfile::try_from)
            .transpose()
            .map_err(BackendError::from)
    }

    async fn select_profiles(&self, token: &AccessToken) -> BackendResult<Vec<UserProfile>> {
        self.authorize(token).await?;

        let records = sqlx::query_as::<_, ProfileRecord>(
            "SELECT id, email, username, role FROM users ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        records
            .into_iter()
            .map(|r| UserProfile::try_from(r).map_err(BackendError::from))
            .collect()
    }

    /// Only the identity itself may create its profile row
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

        let record = sqlx::query_as::<_, ProfileRecord>(
            "INSERT INTO users (id, email, username, role) VALUES ($1, $2, $3, $4)
             RETURNING id, email, username, role",
        )
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.username)
        .bind(profile.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(UserProfile::try_from(record)?)
    }
}

#[async_trait]
impl TaskTable for PgBackend {
    async fn select_tasks(&self, token: &AccessToken, scope: TaskScope) -> BackendResult<Vec<Task>> {
        self.authorize(token).await?;

        let records = match scope {
            TaskScope::All => {
                sqlx::query_as::<_, TaskRecord>(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at"
                ))
                .fetch_all(&self.pool)
                .await
            }
            TaskScope::AssignedTo(user) => {
                sqlx::query_as::<_, TaskRecord>(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE assignee = $1 ORDER BY created_at"
                ))
                .bind(user)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_error)?;

        records
            .into_iter()
            .map(|r| Task::try_from(r).map_err(BackendError::from))
            .collect()
    }

    async fn insert_task(&self, token: &AccessToken, task: NewTask) -> BackendResult<Task> {
        self.authorize(token).await?;

        let record = sqlx::query_as::<_, TaskRecord>(&format!(
            "INSERT INTO tasks (title, description, assignee, priority, due_date, created_by)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.assignee)
        .bind(task.priority.as_str())
        .bind(task.due_date)
        .bind(task.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(Task::try_from(record)?)
    }

    async fn update_task(
        &self,
        token: &AccessToken,
        id: Uuid,
        update: TaskUpdate,
    ) -> BackendResult<Option<Task>> {
        self.authorize(token).await?;

        let record = match update {
            TaskUpdate::Details(draft) => {
                sqlx::query_as::<_, TaskRecord>(&format!(
                    "UPDATE tasks
                     SET title = $2, description = $3, assignee = $4, due_date = $5, priority = $6
                     WHERE id = $1
                     RETURNING {TASK_COLUMNS}"
                ))
                .bind(id)
                .bind(&draft.title)
                .bind(&draft.description)
                .bind(draft.assignee)
                .bind(draft.due_date)
                .bind(draft.priority.as_str())
                .fetch_optional(&self.pool)
                .await
            }
            TaskUpdate::Progress(progress) => {
                sqlx::query_as::<_, TaskRecord>(&format!(
                    "UPDATE tasks SET progress = $2 WHERE id = $1 RETURNING {TASK_COLUMNS}"
                ))
                .bind(id)
                .bind(i32::from(progress.value()))
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(db_error)?;

        record
            .map(Task::try_from)
            .transpose()
            .map_err(BackendError::from)
    }

    async fn delete_task(&self, token: &AccessToken, id: Uuid) -> BackendResult<bool> {
        self.authorize(token).await?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }
}

impl Backend for PgBackend {
    fn kind(&self) -> &'static str {
        "postgres"
    }
}
