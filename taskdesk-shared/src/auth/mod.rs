//! Credential primitives for the self-hosted backends
//!
//! # Modules
//!
//! - [`password`]: Argon2id password hashing
//! - [`jwt`]: HS256 session tokens (access + refresh)
//!
//! The hosted backend performs both concerns itself; these are used by
//! [`PgBackend`](crate::backend::postgres::PgBackend) and
//! [`MemoryBackend`](crate::backend::memory::MemoryBackend) so that they issue
//! tokens with the same shape and lifetime rules.

pub mod jwt;
pub mod password;
