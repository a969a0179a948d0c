//! Login and registration
//!
//! Both flows check their input before calling the backend. Login signs in
//! and then reads the profile row a second time to pick the landing route.
//! Registration signs up, stores the profile with exactly the requested role
//! and sends the user back to the login page.
//!
//! # Self-selected roles
//!
//! The register form lets the user pick any role. [`RegistrationPolicy`]
//! decides which of those picks are honoured: [`RegistrationPolicy::open`]
//! (the default) accepts all three, [`RegistrationPolicy::restricted`] limits
//! self-service sign-up to a subset, leaving the other roles to be assigned
//! directly in the backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::{Validate, ValidationErrors};

use crate::backend::{AccessToken, AuthSession, Backend, BackendError};
use crate::models::user::{NewProfile, Role, UnknownRole, UserProfile};
use crate::routing::{landing_for, Route};
use crate::session::CurrentUser;

/// Shown after a successful registration
pub const REGISTRATION_MESSAGE: &str =
    "Registration successful! Please check your email to confirm your account.";

/// Delay before the register page sends the user to the login page
pub const REGISTER_REDIRECT_DELAY: Duration = Duration::from_millis(3000);

/// Fallback when the backend gives no reason for a failed sign-in
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please try again.";

/// Login form fields
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Register form fields
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 100, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    pub role: Role,
}

impl RegisterForm {
    /// Copy with surrounding whitespace removed from email and username
    ///
    /// Validation runs on this copy, so a blank username is rejected rather
    /// than stored empty.
    pub fn trimmed(&self) -> Self {
        Self {
            email: self.email.trim().to_string(),
            username: self.username.trim().to_string(),
            password: self.password.clone(),
            role: self.role,
        }
    }
}

/// One rejected form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Flattens `validator` output into field/message pairs
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| FieldError {
                field: field.to_string(),
                message: error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field)),
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

/// Failure of a form submission; `Display` is the inline error text
#[derive(Debug, Clone, thiserror::Error)]
pub enum FormError {
    #[error("{}", first_message(.0))]
    Invalid(Vec<FieldError>),

    /// Sign-in or sign-up refused
    #[error("{0}")]
    Credentials(String),

    #[error("Failed to fetch user role.")]
    RoleLookup(#[source] Option<BackendError>),

    #[error("Registration as {0} is not permitted.")]
    RoleNotPermitted(Role),

    #[error("Failed to save user details.")]
    ProfileSave(#[source] BackendError),

    /// The backend could not be reached or failed internally
    #[error("{0}")]
    Backend(#[source] BackendError),
}

fn first_message(errors: &[FieldError]) -> &str {
    errors
        .first()
        .map(|e| e.message.as_str())
        .unwrap_or("Please fill all required fields.")
}

impl From<ValidationErrors> for FormError {
    fn from(errors: ValidationErrors) -> Self {
        FormError::Invalid(field_errors(&errors))
    }
}

/// Roles a user may pick for themselves at registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationPolicy {
    /// Kept in the order of [`Role::ALL`]
    roles: Vec<Role>,
}

impl RegistrationPolicy {
    /// Every role may be self-selected
    pub fn open() -> Self {
        Self::restricted(Role::ALL)
    }

    /// Only `roles` may be self-selected
    pub fn restricted(roles: impl IntoIterator<Item = Role>) -> Self {
        let wanted: Vec<Role> = roles.into_iter().collect();
        Self {
            roles: Role::ALL
                .into_iter()
                .filter(|r| wanted.contains(r))
                .collect(),
        }
    }

    pub fn allows(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Allowed roles in offer order
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn is_open(&self) -> bool {
        self.roles.len() == Role::ALL.len()
    }
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self::open()
    }
}

/// Parses a comma-separated role list such as `"team_member,manager"`
impl FromStr for RegistrationPolicy {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let roles = s
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(Role::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::restricted(roles))
    }
}

impl fmt::Display for RegistrationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.roles().iter().map(Role::as_str).collect();
        f.write_str(&names.join(","))
    }
}

/// Successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: AuthSession,
    pub user: CurrentUser,
    pub landing: Route,
}

/// Successful registration
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub profile: UserProfile,
    pub message: &'static str,
    pub redirect_to: Route,
    pub redirect_after: Duration,
}

/// Signs in and picks the landing route from the profile's role
///
/// # Errors
///
/// - [`FormError::Credentials`] when the backend refuses the credentials
/// - [`FormError::RoleLookup`] when the profile row is missing, unreadable
///   or carries a role this service does not know; the fresh session is
///   signed out again
pub async fn login(backend: &dyn Backend, form: &LoginForm) -> Result<LoginOutcome, FormError> {
    form.validate()?;

    let session = backend
        .sign_in(form.email.trim(), &form.password)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Login failed");
            match e {
                BackendError::InvalidCredentials(msg) if !msg.is_empty() => {
                    FormError::Credentials(msg)
                }
                e if e.is_auth_failure() => FormError::Credentials(LOGIN_FAILED_MESSAGE.to_string()),
                BackendError::Rejected(msg) => FormError::Credentials(msg),
                other => FormError::Backend(other),
            }
        })?;

    let profile = match backend
        .select_profile(&session.access_token, session.identity.id)
        .await
    {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            tracing::warn!(user_id = %session.identity.id, "User role fetch error: no profile");
            discard(backend, &session.access_token).await;
            return Err(FormError::RoleLookup(None));
        }
        Err(e) => {
            tracing::warn!(user_id = %session.identity.id, error = %e, "User role fetch error");
            discard(backend, &session.access_token).await;
            return Err(FormError::RoleLookup(Some(e)));
        }
    };

    let landing = landing_for(profile.role);
    tracing::info!(user_id = %profile.id, role = %profile.role, landing = %landing, "Login succeeded");

    Ok(LoginOutcome {
        session,
        user: profile.into(),
        landing,
    })
}

/// Signs up and stores the profile with the requested role
///
/// The password only ever goes to the auth side; the profile row holds
/// email, username and role. A session handed out by sign-up is used for
/// the profile insert and then ended: the user logs in afterwards.
pub async fn register(
    backend: &dyn Backend,
    form: &RegisterForm,
    policy: &RegistrationPolicy,
) -> Result<RegisterOutcome, FormError> {
    let form = &form.trimmed();
    form.validate()?;

    if !policy.allows(form.role) {
        tracing::warn!(role = %form.role, "Self-service registration refused for role");
        return Err(FormError::RoleNotPermitted(form.role));
    }

    let signup = backend
        .sign_up(&form.email, &form.password)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Sign-up failed");
            match e {
                BackendError::Rejected(msg) | BackendError::InvalidCredentials(msg) => {
                    FormError::Credentials(msg)
                }
                other => FormError::Backend(other),
            }
        })?;

    let token = signup
        .session
        .as_ref()
        .map(|s| s.access_token.clone())
        .unwrap_or_else(AccessToken::anonymous);

    let new_profile = NewProfile {
        id: signup.identity.id,
        email: signup
            .identity
            .email
            .clone()
            .or_else(|| Some(form.email.clone())),
        username: form.username.clone(),
        role: form.role,
    };

    let inserted = backend.insert_profile(&token, new_profile).await;
    if signup.session.is_some() {
        discard(backend, &token).await;
    }

    let profile = inserted.map_err(|e| {
        tracing::error!(user_id = %signup.identity.id, error = %e, "Failed to save user details");
        FormError::ProfileSave(e)
    })?;

    tracing::info!(user_id = %profile.id, role = %profile.role, "User registered");

    Ok(RegisterOutcome {
        profile,
        message: REGISTRATION_MESSAGE,
        redirect_to: Route::Login,
        redirect_after: REGISTER_REDIRECT_DELAY,
    })
}

/// Best-effort sign-out of a session the flow no longer needs
async fn discard(backend: &dyn Backend, token: &AccessToken) {
    if let Err(e) = backend.sign_out(token).await {
        tracing::debug!(error = %e, "Could not end temporary session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        let policy: RegistrationPolicy = "team_member, manager".parse().unwrap();
        assert!(policy.allows(Role::TeamMember));
        assert!(policy.allows(Role::Manager));
        assert!(!policy.allows(Role::Admin));
        assert_eq!(policy.roles(), &[Role::Manager, Role::TeamMember]);
        assert_eq!(policy.to_string(), "manager,team_member");
        assert!(!policy.is_open());

        assert!("team_member,owner".parse::<RegistrationPolicy>().is_err());
    }

    #[test]
    fn test_default_policy_is_open() {
        let policy = RegistrationPolicy::default();
        assert!(policy.is_open());
        for role in Role::ALL {
            assert!(policy.allows(role));
        }
    }

    #[test]
    fn test_register_form_validation() {
        let form = RegisterForm {
            email: "not-an-email".to_string(),
            username: String::new(),
            password: "pw".to_string(),
            role: Role::TeamMember,
        };

        let err = FormError::from(form.validate().unwrap_err());
        match &err {
            FormError::Invalid(fields) => {
                let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["email", "username"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.to_string(), "Invalid email format");
    }

    #[test]
    fn test_blank_username_is_rejected_after_trimming() {
        let form = RegisterForm {
            email: "  sam@example.com ".to_string(),
            username: "   ".to_string(),
            password: "pw".to_string(),
            role: Role::TeamMember,
        };

        let trimmed = form.trimmed();
        assert_eq!(trimmed.email, "sam@example.com");
        match FormError::from(trimmed.validate().unwrap_err()) {
            FormError::Invalid(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "username");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_refuses_blank_username() {
        use crate::backend::{memory::MemoryBackend, AuthApi};

        let backend = MemoryBackend::new("forms-test-secret-at-least-32-bytes");
        let form = RegisterForm {
            email: "sam@example.com".to_string(),
            username: " \t ".to_string(),
            password: "pw".to_string(),
            role: Role::TeamMember,
        };

        let err = register(&backend, &form, &RegistrationPolicy::open())
            .await
            .unwrap_err();
        assert!(matches!(err, FormError::Invalid(_)));
        assert_eq!(err.to_string(), "Username is required");

        // Nothing reached the auth side
        assert!(backend.sign_in("sam@example.com", "pw").await.is_err());
    }

    #[test]
    fn test_login_form_requires_fields() {
        assert!(LoginForm::default().validate().is_err());
    }
}
