//! # taskdesk API Server Library
//!
//! HTTP surface of taskdesk: login and registration, session tracking and
//! the role-gated admin and member dashboards.
//!
//! ## Modules
//!
//! - `app`: Application state, backend wiring and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Security headers and session resolution
//! - `routes`: Route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
