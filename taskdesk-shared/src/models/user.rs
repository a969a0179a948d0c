//! User profile model
//!
//! A profile row joins an authenticated identity to a username and a role.
//! The role is authoritative for access control: it decides which dashboard a
//! session may open and which task operations it may perform.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE users (
//!     id UUID PRIMARY KEY,
//!     email TEXT,
//!     username TEXT NOT NULL,
//!     role TEXT NOT NULL CHECK (role IN ('admin', 'manager', 'team_member'))
//! );
//! ```
//!
//! Profiles are created at registration and never deleted by this system.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::MalformedRecord;

/// Access-control role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access to the admin console
    Admin,

    /// Same console access as an admin
    Manager,

    /// Sees only the tasks assigned to them and reports progress
    TeamMember,
}

impl Role {
    /// All roles, in the order they are offered at registration
    pub const ALL: [Role; 3] = [Role::Admin, Role::Manager, Role::TeamMember];

    /// Converts role to its stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::TeamMember => "team_member",
        }
    }

    /// Whether the role may use the admin console
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role string is not one of the known roles
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "team_member" => Ok(Role::TeamMember),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A validated profile row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Identity ID issued by the auth backend
    pub id: Uuid,

    /// Email address, if the backend exposes it
    pub email: Option<String>,

    /// Display name chosen at registration
    pub username: String,

    /// Access-control role
    pub role: Role,
}

/// Input for inserting a profile row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    /// Identity ID returned by sign-up
    pub id: Uuid,

    /// Email address used at sign-up
    pub email: Option<String>,

    /// Display name
    pub username: String,

    /// Role chosen at registration
    pub role: Role,
}

impl From<NewProfile> for UserProfile {
    fn from(p: NewProfile) -> Self {
        Self {
            id: p.id,
            email: p.email,
            username: p.username,
            role: p.role,
        }
    }
}

/// Profile row as it comes off the wire or out of the database
///
/// Every column is optional here; [`UserProfile::try_from`] is where missing
/// or unrecognised values are rejected.
#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct ProfileRecord {
    pub id: Option<Uuid>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub role: Option<String>,
}

impl TryFrom<ProfileRecord> for UserProfile {
    type Error = MalformedRecord;

    fn try_from(rec: ProfileRecord) -> Result<Self, Self::Error> {
        let id = rec.id.ok_or(MalformedRecord::MissingField("users.id"))?;
        let username = rec
            .username
            .ok_or(MalformedRecord::MissingField("users.username"))?;
        let role = rec
            .role
            .ok_or(MalformedRecord::MissingField("users.role"))?
            .parse::<Role>()
            .map_err(|e| MalformedRecord::InvalidValue {
                field: "users.role",
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            email: rec.email,
            username,
            role,
        })
    }
}
