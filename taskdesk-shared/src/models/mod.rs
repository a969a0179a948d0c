//! Domain models for taskdesk
//!
//! # Models
//!
//! - `user`: profile rows and the [`Role`](user::Role) used for access control
//! - `task`: tasks, drafts entered in the admin form, and progress
//!
//! Rows read from a backend arrive as loosely-typed `*Record` structs and are
//! converted into the validated models with `TryFrom`. A conversion failure is
//! a [`MalformedRecord`], which backends surface as a malformed-response error.

pub mod task;
pub mod user;

/// A backend row that could not be turned into a model
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRecord {
    /// A required column was absent or null
    #[error("missing field {0}")]
    MissingField(&'static str),

    /// A column held a value the model does not accept
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
