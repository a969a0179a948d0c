/// Authentication endpoints
///
/// # Endpoints
///
/// - `GET  /login`, `GET /register` - Form descriptors; always rendered
/// - `POST /login` - Sign in, returns tokens and the landing route
/// - `POST /register` - Create an account with a profile and role
/// - `POST /logout` - End the bearer's session

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::session::bearer_token,
};
use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use taskdesk_shared::{
    backend::{AccessToken, AuthApi},
    forms::{self, LoginForm, RegisterForm},
    models::user::Role,
    routing::Route,
    session::CurrentUser,
};
use uuid::Uuid;

/// Form descriptor served on the public pages
#[derive(Debug, Serialize)]
pub struct FormPage {
    pub route: Route,
    pub fields: &'static [&'static str],

    /// Roles offered at registration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Role>>,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: AccessToken,
    pub refresh_token: String,

    /// Access-token expiry (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    pub user: CurrentUser,

    /// Landing page for the user's role
    pub redirect_to: &'static str,
}

/// Register response
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,

    /// Confirmation shown on the form
    pub message: &'static str,

    /// Page to return to once `redirect_after_ms` has passed
    pub redirect_to: &'static str,
    pub redirect_after_ms: u64,
}

/// Logout response
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub redirect_to: &'static str,
}

fn form_page(route: Route, fields: &'static [&'static str], roles: Option<Vec<Role>>) -> FormPage {
    FormPage {
        route,
        fields,
        roles,
    }
}

/// `GET /login`
pub async fn login_page() -> Json<FormPage> {
    Json(form_page(Route::Login, &["email", "password"], None))
}

/// `GET /register`
pub async fn register_page(State(state): State<AppState>) -> Json<FormPage> {
    let roles = state.config.registration.policy.roles().to_vec();
    Json(form_page(
        Route::Register,
        &["email", "username", "password", "role"],
        Some(roles),
    ))
}

/// Sign in
///
/// # Endpoint
///
/// ```text
/// POST /login
/// Content-Type: application/json
///
/// { "email": "ana@example.com", "password": "..." }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: credentials refused, or the profile/role could not
///   be read (the user stays on the login page)
/// - `422 Unprocessable Entity`: a field is empty
pub async fn login(
    State(state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = forms::login(state.backend.as_ref(), &form).await?;

    Ok(Json(LoginResponse {
        access_token: outcome.session.access_token,
        refresh_token: outcome.session.refresh_token,
        expires_at: outcome.session.expires_at,
        user: outcome.user,
        redirect_to: outcome.landing.path(),
    }))
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /register
/// Content-Type: application/json
///
/// {
///   "email": "ana@example.com",
///   "username": "ana",
///   "password": "...",
///   "role": "team_member"
/// }
/// ```
///
/// # Errors
///
/// - `403 Forbidden`: the role is not open to self-registration
/// - `409 Conflict`: the email is already registered
/// - `422 Unprocessable Entity`: a field failed validation
pub async fn register(
    State(state): State<AppState>,
    Json(form): Json<RegisterForm>,
) -> ApiResult<Json<RegisterResponse>> {
    let registration = &state.config.registration;
    let outcome = forms::register(state.backend.as_ref(), &form, &registration.policy).await?;

    Ok(Json(RegisterResponse {
        user_id: outcome.profile.id,
        username: outcome.profile.username,
        role: outcome.profile.role,
        message: outcome.message,
        redirect_to: outcome.redirect_to.path(),
        redirect_after_ms: u64::try_from(registration.redirect_delay.as_millis())
            .unwrap_or(u64::MAX),
    }))
}

/// `POST /logout`
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<LogoutResponse>> {
    let token = bearer_token(&headers)?
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    state.backend.sign_out(&token).await?;
    tracing::info!("Signed out");

    Ok(Json(LogoutResponse {
        redirect_to: Route::Login.path(),
    }))
}
