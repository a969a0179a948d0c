/// Session resolution middleware
///
/// Reads the bearer token, resolves it into a [`SessionState`] and stores a
/// [`SessionContext`] in the request extensions. Handlers behind the layer
/// decide from that context whether to render, redirect or refuse.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use taskdesk_shared::{
    backend::AccessToken,
    routing::{gate, Decision, Gate, Route},
    session::{self, CurrentUser, SessionState},
};

/// Resolved session of the current request
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub token: Option<AccessToken>,
    pub state: SessionState,
}

/// Outcome of gating a page
#[derive(Debug)]
pub enum PageAccess {
    Granted { token: AccessToken, user: CurrentUser },
    Redirect(Route),
}

impl SessionContext {
    /// Gates a page visit
    ///
    /// # Errors
    ///
    /// `503` while the session is still loading.
    pub fn page(&self, route: Route) -> ApiResult<PageAccess> {
        match gate(&self.state, route.path()) {
            Gate::Pending => Err(ApiError::ServiceUnavailable(
                "Session is still loading".to_string(),
            )),
            Gate::Decided(Decision::Render(rendered)) if rendered == route => {
                match (self.token.clone(), self.state.user().cloned()) {
                    (Some(token), Some(user)) => Ok(PageAccess::Granted { token, user }),
                    _ => Ok(PageAccess::Redirect(Route::Login)),
                }
            }
            Gate::Decided(decision) => Ok(PageAccess::Redirect(decision.target())),
        }
    }

    /// Caller of a mutation on `route`'s dashboard
    ///
    /// # Errors
    ///
    /// - `401` without a ready session
    /// - `403` when the role is routed away from `route`
    pub fn authorize(&self, route: Route) -> ApiResult<(AccessToken, CurrentUser)> {
        match self.page(route)? {
            PageAccess::Granted { token, user } => Ok((token, user)),
            PageAccess::Redirect(_) => match (&self.state, self.state.user()) {
                (_, Some(user)) => {
                    tracing::warn!(user_id = %user.id, role = %user.role, route = %route, "Role may not use this dashboard");
                    Err(ApiError::Forbidden(
                        "You do not have access to this dashboard.".to_string(),
                    ))
                }
                (SessionState::ProfileMissing { message }, None)
                | (SessionState::Failed { message }, None) => {
                    Err(ApiError::Unauthorized(message.clone()))
                }
                _ => Err(ApiError::Unauthorized("Authentication required".to_string())),
            },
        }
    }
}

/// Extracts the bearer token; a missing header is an anonymous request
///
/// # Errors
///
/// `400` when an `Authorization` header is present but is not a bearer token.
pub fn bearer_token(headers: &HeaderMap) -> ApiResult<Option<AccessToken>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| ApiError::BadRequest("Expected Bearer token".to_string()))?;

    if token.is_empty() {
        return Ok(None);
    }
    Ok(Some(AccessToken::new(token)))
}

/// Resolves the caller's session into the request extensions
pub async fn session_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?;
    let resolved: SessionState = session::resolve(state.backend.as_ref(), token.as_ref())
        .await
        .into();

    tracing::debug!(session = ?resolved, "Session resolved");

    req.extensions_mut().insert(SessionContext {
        token,
        state: resolved,
    });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use taskdesk_shared::models::user::Role;
    use uuid::Uuid;

    fn ready(role: Role) -> SessionContext {
        SessionContext {
            token: Some(AccessToken::new("t")),
            state: SessionState::Ready(CurrentUser {
                id: Uuid::new_v4(),
                email: None,
                username: "u".to_string(),
                role,
            }),
        }
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).unwrap().is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).unwrap(), Some(AccessToken::new("abc")));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer_token(&headers), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_page_access_follows_role() {
        assert!(matches!(
            ready(Role::Manager).page(Route::AdminDashboard).unwrap(),
            PageAccess::Granted { .. }
        ));
        assert!(matches!(
            ready(Role::TeamMember).page(Route::AdminDashboard).unwrap(),
            PageAccess::Redirect(Route::Dashboard)
        ));
        assert!(matches!(
            ready(Role::Admin).page(Route::Dashboard).unwrap(),
            PageAccess::Redirect(Route::AdminDashboard)
        ));
    }

    #[test]
    fn test_loading_session_is_held_back() {
        let ctx = SessionContext {
            token: None,
            state: SessionState::Loading,
        };
        assert!(matches!(
            ctx.page(Route::Dashboard),
            Err(ApiError::ServiceUnavailable(_))
        ));
    }

    #[test]
    fn test_authorize_status() {
        let anonymous = SessionContext {
            token: None,
            state: SessionState::Unauthenticated,
        };
        assert!(matches!(
            anonymous.authorize(Route::AdminDashboard),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            ready(Role::TeamMember).authorize(Route::AdminDashboard),
            Err(ApiError::Forbidden(_))
        ));
        assert!(ready(Role::TeamMember).authorize(Route::Dashboard).is_ok());
    }
}
