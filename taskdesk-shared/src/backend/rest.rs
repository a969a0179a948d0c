//! Hosted backend over HTTP
//!
//! Auth goes to the GoTrue-style endpoints under `/auth/v1`, table access to
//! the PostgREST-style endpoints under `/rest/v1`. Every request carries the
//! project API key in `apikey`; the bearer is the caller's access token, or
//! the API key itself for anonymous calls.

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use super::{
    AccessToken, AuthApi, AuthEvent, AuthEvents, AuthSession, AuthSubscription, Backend,
    BackendError, BackendResult, Identity, SignUp, TaskTable, UserTable,
};
use crate::models::{
    task::{NewTask, Task, TaskRecord, TaskScope, TaskUpdate},
    user::{NewProfile, ProfileRecord, UserProfile},
};

/// Where the hosted backend lives
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project URL, e.g. `https://abc.example.co`
    pub url: String,

    /// Public (anon) project key
    pub api_key: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl RestConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Backend speaking to the hosted service
pub struct RestBackend {
    client: Client,
    base: String,
    api_key: String,
    events: AuthEvents,
}

/// User object returned by the auth endpoints
#[derive(Debug, Deserialize)]
struct UserBody {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserBody> for Identity {
    fn from(u: UserBody) -> Self {
        Identity {
            id: u.id,
            email: u.email,
        }
    }
}

/// Session object returned by the token endpoint (and by sign-up when no
/// confirmation is required)
#[derive(Debug, Deserialize)]
struct SessionBody {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserBody,
}

impl From<SessionBody> for AuthSession {
    fn from(s: SessionBody) -> Self {
        AuthSession {
            access_token: AccessToken::new(s.access_token),
            refresh_token: s.refresh_token,
            expires_at: s.expires_at,
            identity: s.user.into(),
        }
    }
}

/// Sign-up answers with a session or, pending confirmation, a bare user
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpBody {
    Session(SessionBody),
    User(UserBody),
}

impl From<SignUpBody> for SignUp {
    fn from(body: SignUpBody) -> Self {
        match body {
            SignUpBody::Session(s) => {
                let session = AuthSession::from(s);
                SignUp {
                    identity: session.identity.clone(),
                    session: Some(session),
                }
            }
            SignUpBody::User(u) => SignUp {
                identity: u.into(),
                session: None,
            },
        }
    }
}

/// Error payloads; auth and table endpoints use different field names
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self, status: StatusCode) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| status.to_string())
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .unwrap_or_default()
        .into_message(status)
}

fn status_error(status: StatusCode, body: &str) -> BackendError {
    let message = error_message(status, body);
    match status {
        StatusCode::UNAUTHORIZED => BackendError::Unauthorized(message),
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        s if s.is_client_error() => BackendError::Rejected(message),
        _ => BackendError::Internal(message),
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> BackendResult<T> {
    serde_json::from_str(body).map_err(|e| BackendError::MalformedResponse(e.to_string()))
}

fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Transport(err.to_string())
}

fn into_tasks(records: Vec<TaskRecord>) -> BackendResult<Vec<Task>> {
    records
        .into_iter()
        .map(|r| Task::try_from(r).map_err(BackendError::from))
        .collect()
}

fn into_profiles(records: Vec<ProfileRecord>) -> BackendResult<Vec<UserProfile>> {
    records
        .into_iter()
        .map(|r| UserProfile::try_from(r).map_err(BackendError::from))
        .collect()
}

/// Exactly one row out of a `return=representation` write
fn single<T>(mut rows: Vec<T>) -> BackendResult<T> {
    match rows.len() {
        1 => Ok(rows.remove(0)),
        n => Err(BackendError::MalformedResponse(format!(
            "expected 1 row, got {}",
            n
        ))),
    }
}

impl RestBackend {
    pub fn new(config: RestConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            events: AuthEvents::default(),
        })
    }

    fn request(&self, method: Method, path: &str, token: &AccessToken) -> RequestBuilder {
        let bearer = if token.is_anonymous() {
            self.api_key.as_str()
        } else {
            token.as_str()
        };

        self.client
            .request(method, format!("{}{}", self.base, path))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    /// Table request that asks for the affected rows back
    fn write(&self, method: Method, path: &str, token: &AccessToken) -> RequestBuilder {
        self.request(method, path, token)
            .header("Prefer", "return=representation")
            .header(header::CONTENT_TYPE, "application/json")
    }

    /// Sends a request and returns the body of a 2xx answer
    async fn send(&self, request: RequestBuilder) -> BackendResult<String> {
        let response: Response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if status.is_success() {
            Ok(body)
        } else {
            tracing::debug!(%status, "Backend request refused");
            Err(status_error(status, &body))
        }
    }

    async fn token_grant(&self, grant: &str, body: serde_json::Value) -> BackendResult<AuthSession> {
        let request = self
            .request(
                Method::POST,
                &format!("/auth/v1/token?grant_type={}", grant),
                &AccessToken::anonymous(),
            )
            .json(&body);

        let body = self.send(request).await?;
        Ok(decode::<SessionBody>(&body)?.into())
    }
}

#[async_trait]
impl AuthApi for RestBackend {
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<SignUp> {
        let request = self
            .request(Method::POST, "/auth/v1/signup", &AccessToken::anonymous())
            .json(&json!({ "email": email, "password": password }));

        let body = self.send(request).await?;
        Ok(decode::<SignUpBody>(&body)?.into())
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await
            .map_err(|e| match e {
                BackendError::Rejected(msg) | BackendError::Unauthorized(msg) => {
                    BackendError::InvalidCredentials(msg)
                }
                other => other,
            })?;

        self.events.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, token: &AccessToken) -> BackendResult<()> {
        let identity = self
            .current_identity(token)
            .await?
            .ok_or_else(|| BackendError::Unauthorized("No session".to_string()))?;

        self.send(self.request(Method::POST, "/auth/v1/logout", token))
            .await?;

        self.events.publish(AuthEvent::SignedOut {
            identity: identity.id,
        });
        Ok(())
    }

    async fn current_identity(&self, token: &AccessToken) -> BackendResult<Option<Identity>> {
        if token.is_anonymous() {
            return Ok(None);
        }

        match self.send(self.request(Method::GET, "/auth/v1/user", token)).await {
            Ok(body) => Ok(Some(decode::<UserBody>(&body)?.into())),
            Err(BackendError::Unauthorized(_)) | Err(BackendError::Rejected(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> BackendResult<AuthSession> {
        let session = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
            .map_err(|e| match e {
                BackendError::Rejected(msg) => BackendError::Unauthorized(msg),
                other => other,
            })?;

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
impl UserTable for RestBackend {
    async fn select_profile(
        &self,
        token: &AccessToken,
        id: Uuid,
    ) -> BackendResult<Option<UserProfile>> {
        let path = format!("/rest/v1/users?select=*&id=eq.{}", id);
        let body = self.send(self.request(Method::GET, &path, token)).await?;

        let mut profiles = into_profiles(decode(&body)?)?;
        Ok(if profiles.is_empty() {
            None
        } else {
            Some(profiles.remove(0))
        })
    }

    async fn select_profiles(&self, token: &AccessToken) -> BackendResult<Vec<UserProfile>> {
        let body = self
            .send(self.request(Method::GET, "/rest/v1/users?select=*", token))
            .await?;
        into_profiles(decode(&body)?)
    }

    async fn insert_profile(
        &self,
        token: &AccessToken,
        profile: NewProfile,
    ) -> BackendResult<UserProfile> {
        let request = self
            .write(Method::POST, "/rest/v1/users", token)
            .json(&[profile]);

        let body = self.send(request).await?;
        single(into_profiles(decode(&body)?)?)
    }
}

#[async_trait]
impl TaskTable for RestBackend {
    async fn select_tasks(&self, token: &AccessToken, scope: TaskScope) -> BackendResult<Vec<Task>> {
        let path = match scope {
            TaskScope::All => "/rest/v1/tasks?select=*".to_string(),
            TaskScope::AssignedTo(user) => format!("/rest/v1/tasks?select=*&assignee=eq.{}", user),
        };

        let body = self.send(self.request(Method::GET, &path, token)).await?;
        into_tasks(decode(&body)?)
    }

    async fn insert_task(&self, token: &AccessToken, task: NewTask) -> BackendResult<Task> {
        let request = self
            .write(Method::POST, "/rest/v1/tasks", token)
            .json(&[task]);

        let body = self.send(request).await?;
        single(into_tasks(decode(&body)?)?)
    }

    async fn update_task(
        &self,
        token: &AccessToken,
        id: Uuid,
        update: TaskUpdate,
    ) -> BackendResult<Option<Task>> {
        let patch = match update {
            TaskUpdate::Details(draft) => serde_json::to_value(draft)
                .map_err(|e| BackendError::Internal(e.to_string()))?,
            TaskUpdate::Progress(progress) => json!({ "progress": progress.value() }),
        };

        let path = format!("/rest/v1/tasks?id=eq.{}", id);
        let body = self
            .send(self.write(Method::PATCH, &path, token).json(&patch))
            .await?;

        let mut tasks = into_tasks(decode(&body)?)?;
        Ok(if tasks.is_empty() {
            None
        } else {
            Some(tasks.remove(0))
        })
    }

    async fn delete_task(&self, token: &AccessToken, id: Uuid) -> BackendResult<bool> {
        let path = format!("/rest/v1/tasks?id=eq.{}", id);
        let body = self.send(self.write(Method::DELETE, &path, token)).await?;

        let deleted: Vec<serde_json::Value> = decode(&body)?;
        Ok(!deleted.is_empty())
    }
}

impl Backend for RestBackend {
    fn kind(&self) -> &'static str {
        "hosted"
    }
}
