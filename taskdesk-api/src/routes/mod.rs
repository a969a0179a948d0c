/// API route handlers
///
/// Organized by page:
///
/// - `health`: Health check endpoint
/// - `auth`: Login, registration and logout
/// - `session`: Current session, token refresh and the session event stream
/// - `admin`: Admin dashboard (admin and manager)
/// - `member`: Member dashboard (team member)

pub mod admin;
pub mod auth;
pub mod health;
pub mod member;
pub mod session;

use serde::Serialize;
use taskdesk_shared::console::Notice;

/// Result of a dashboard mutation: the notice plus the refreshed view
#[derive(Debug, Serialize)]
pub struct Mutation<V> {
    pub notice: Notice,
    pub view: V,
}
