/// Common test utilities for integration tests
///
/// Builds the full router over an in-memory backend and offers helpers to
/// call it, register users and log them in.

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use taskdesk_api::app::{build_router, AppState};
use taskdesk_api::config::Config;
use taskdesk_shared::backend::memory::MemoryBackend;
use tower::Service as _;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret-at-least-32-bytes";

/// A response, with the body parsed as JSON when it is JSON
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// `message` of an error body, or of the `notice` of a mutation
    pub fn message(&self) -> &str {
        self.body["message"]
            .as_str()
            .or_else(|| self.body["notice"]["message"].as_str())
            .unwrap_or_default()
    }
}

/// A logged-in user
pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

/// Test context: router plus the backend behind it
pub struct TestContext {
    pub app: axum::Router,
    pub backend: Arc<MemoryBackend>,
}

impl TestContext {
    /// Router over a fresh in-memory backend, every role open to registration
    pub fn new() -> Self {
        Self::with_env(&[])
    }

    /// Same, with extra configuration variables
    pub fn with_env(extra: &[(&str, &str)]) -> Self {
        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("BACKEND_KIND".to_string(), "memory".to_string());
        vars.insert("JWT_SECRET".to_string(), JWT_SECRET.to_string());
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }

        let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        let backend = Arc::new(MemoryBackend::new(JWT_SECRET));
        let app = build_router(AppState::new(backend.clone(), config));

        Self { app, backend }
    }

    /// Calls the router
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().call(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    /// Registers through `POST /register`
    pub async fn register(&self, username: &str, role: &str) -> TestResponse {
        self.post(
            "/register",
            None,
            json!({
                "email": format!("{}@example.com", username),
                "username": username,
                "password": "correct-horse",
                "role": role,
            }),
        )
        .await
    }

    /// Registers and logs in
    pub async fn user(&self, username: &str, role: &str) -> TestUser {
        let registered = self.register(username, role).await;
        assert_eq!(registered.status, StatusCode::OK, "{}", registered.body);

        let login = self
            .post(
                "/login",
                None,
                json!({
                    "email": format!("{}@example.com", username),
                    "password": "correct-horse",
                }),
            )
            .await;
        assert_eq!(login.status, StatusCode::OK, "{}", login.body);

        TestUser {
            id: login.body["user"]["id"].as_str().unwrap().parse().unwrap(),
            token: login.body["access_token"].as_str().unwrap().to_string(),
        }
    }

    /// Creates a task from the admin dashboard; returns its ID
    pub async fn create_task(&self, admin: &TestUser, title: &str, assignee: Uuid) -> Uuid {
        let response = self
            .post(
                "/admin-dashboard/tasks",
                Some(&admin.token),
                json!({
                    "title": title,
                    "description": "",
                    "assignee": assignee.to_string(),
                    "due_date": "2025-03-01",
                    "priority": "high",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);

        response.body["view"]["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["title"] == title)
            .and_then(|t| t["id"].as_str())
            .unwrap()
            .parse()
            .unwrap()
    }
}
