//! PostgreSQL plumbing for the self-hosted backend
//!
//! # Modules
//!
//! - `pool`: connection pool with a startup health check
//! - `migrations`: embedded schema migrations (`users`, `tasks`, auth tables)
//!
//! Queries themselves live in [`crate::backend::postgres`].
//!
//! # Example
//!
//! ```no_run
//! use taskdesk_shared::db::{migrations::run_migrations, pool::{create_pool, DatabaseConfig}};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = create_pool(DatabaseConfig {
//!     url: std::env::var("DATABASE_URL")?,
//!     ..Default::default()
//! })
//! .await?;
//! run_migrations(&pool).await?;
//! # Ok(())
//! # }
//! ```

pub mod migrations;
pub mod pool;
