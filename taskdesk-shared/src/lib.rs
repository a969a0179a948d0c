//! # taskdesk shared library
//!
//! Domain core of the taskdesk service: everything except the HTTP server.
//!
//! ## Module Organization
//!
//! - `models`: users, roles, tasks and the wire records they are parsed from
//! - `backend`: the auth + table collaborator and its hosted, Postgres and
//!   in-memory adapters
//! - `auth`: password hashing and session tokens for the self-hosted adapters
//! - `db`: connection pool and migrations for the Postgres adapter
//! - `session`: resolves a token into the current user and tracks changes
//! - `routing`: role-gated route decisions
//! - `store`: validating task store client
//! - `console`: admin and member console view models
//! - `forms`: login and registration flows

pub mod auth;
pub mod backend;
pub mod console;
pub mod db;
pub mod forms;
pub mod models;
pub mod routing;
pub mod session;
pub mod store;

/// Current version of the taskdesk shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
