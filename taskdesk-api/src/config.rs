//! Configuration management for the API server
//!
//! Loaded from environment variables (a `.env` file is read first when
//! present).
//!
//! # Environment Variables
//!
//! - `API_HOST`: host to bind to (default: 0.0.0.0)
//! - `API_PORT`: port to bind to (default: 8080)
//! - `API_PRODUCTION`: enables HSTS and strict CORS (default: false)
//! - `CORS_ORIGINS`: comma-separated allowed origins (default: any)
//! - `BACKEND_KIND`: `hosted`, `postgres` or `memory` (default: hosted)
//! - `BACKEND_URL` / `BACKEND_API_KEY`: hosted backend project (hosted only)
//! - `DATABASE_URL` / `DATABASE_MAX_CONNECTIONS`: PostgreSQL (postgres only)
//! - `JWT_SECRET`: token signing secret, at least 32 characters
//!   (postgres and memory)
//! - `REGISTRATION_ROLES`: roles open to self-registration (default: all)
//! - `REGISTER_REDIRECT_DELAY_MS`: delay before the register page returns to
//!   login (default: 3000)
//! - `RUST_LOG`: log filter

use anyhow::Context;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use taskdesk_shared::forms::{RegistrationPolicy, REGISTER_REDIRECT_DELAY};

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub backend: BackendConfig,
    pub registration: RegistrationConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Production mode: HSTS header, CORS limited to `cors_origins`
    pub production: bool,

    /// Allowed CORS origins; empty allows any origin outside production
    pub cors_origins: Vec<String>,
}

/// Which backend the service talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Hosted,
    Postgres,
    Memory,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hosted" => Ok(BackendKind::Hosted),
            "postgres" => Ok(BackendKind::Postgres),
            "memory" => Ok(BackendKind::Memory),
            other => anyhow::bail!("unknown BACKEND_KIND: {}", other),
        }
    }
}

/// Backend connection settings
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Hosted { url: String, api_key: String },
    Postgres {
        database_url: String,
        max_connections: u32,
        jwt_secret: String,
    },
    Memory { jwt_secret: String },
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Hosted { .. } => BackendKind::Hosted,
            BackendConfig::Postgres { .. } => BackendKind::Postgres,
            BackendConfig::Memory { .. } => BackendKind::Memory,
        }
    }
}

/// Registration form settings
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub policy: RegistrationPolicy,
    pub redirect_delay: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            policy: RegistrationPolicy::open(),
            redirect_delay: REGISTER_REDIRECT_DELAY,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`
    ///
    /// # Errors
    ///
    /// Fails when a variable the selected backend needs is missing or a value
    /// does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).with_context(|| format!("{} environment variable is required", key))
        };

        let host = var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("API_PORT")
            .map(|p| p.parse::<u16>())
            .transpose()
            .context("API_PORT must be a port number")?
            .unwrap_or(8080);
        let production = var("API_PRODUCTION")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let cors_origins = var("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let kind = var("BACKEND_KIND")
            .map(|k| k.parse::<BackendKind>())
            .transpose()?
            .unwrap_or(BackendKind::Hosted);

        let jwt_secret = || -> anyhow::Result<String> {
            let secret = required("JWT_SECRET")?;
            if secret.len() < 32 {
                anyhow::bail!("JWT_SECRET must be at least 32 characters long");
            }
            Ok(secret)
        };

        let backend = match kind {
            BackendKind::Hosted => BackendConfig::Hosted {
                url: required("BACKEND_URL")?,
                api_key: required("BACKEND_API_KEY")?,
            },
            BackendKind::Postgres => BackendConfig::Postgres {
                database_url: required("DATABASE_URL")?,
                max_connections: var("DATABASE_MAX_CONNECTIONS")
                    .map(|v| v.parse::<u32>())
                    .transpose()
                    .context("DATABASE_MAX_CONNECTIONS must be a number")?
                    .unwrap_or(10),
                jwt_secret: jwt_secret()?,
            },
            BackendKind::Memory => BackendConfig::Memory {
                jwt_secret: jwt_secret()?,
            },
        };

        let policy = var("REGISTRATION_ROLES")
            .map(|v| v.parse::<RegistrationPolicy>())
            .transpose()
            .context("REGISTRATION_ROLES must list admin, manager or team_member")?
            .unwrap_or_default();
        if policy.roles().is_empty() {
            anyhow::bail!("REGISTRATION_ROLES must allow at least one role");
        }

        let redirect_delay = var("REGISTER_REDIRECT_DELAY_MS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("REGISTER_REDIRECT_DELAY_MS must be a number")?
            .map(Duration::from_millis)
            .unwrap_or(REGISTER_REDIRECT_DELAY);

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                production,
                cors_origins,
            },
            backend,
            registration: RegistrationConfig {
                policy,
                redirect_delay,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use taskdesk_shared::models::user::Role;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_hosted_defaults() {
        let config = load(&[
            ("BACKEND_URL", "https://x.example.co"),
            ("BACKEND_API_KEY", "anon"),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(!config.api.production);
        assert_eq!(config.backend.kind(), BackendKind::Hosted);
        assert!(config.registration.policy.is_open());
        assert_eq!(config.registration.redirect_delay, Duration::from_millis(3000));
    }

    #[test]
    fn test_hosted_requires_url_and_key() {
        let err = load(&[("BACKEND_URL", "https://x.example.co")]).unwrap_err();
        assert!(err.to_string().contains("BACKEND_API_KEY"));
    }

    #[test]
    fn test_memory_requires_long_secret() {
        assert!(load(&[("BACKEND_KIND", "memory"), ("JWT_SECRET", "short")]).is_err());

        let config = load(&[
            ("BACKEND_KIND", "memory"),
            ("JWT_SECRET", "0123456789abcdef0123456789abcdef"),
        ])
        .unwrap();
        assert_eq!(config.backend.kind(), BackendKind::Memory);
    }

    #[test]
    fn test_postgres_settings() {
        let config = load(&[
            ("BACKEND_KIND", "Postgres"),
            ("DATABASE_URL", "postgresql://localhost/taskdesk"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("JWT_SECRET", "0123456789abcdef0123456789abcdef"),
        ])
        .unwrap();

        match config.backend {
            BackendConfig::Postgres {
                max_connections, ..
            } => assert_eq!(max_connections, 4),
            other => panic!("unexpected backend: {:?}", other),
        }
    }

    #[test]
    fn test_server_and_registration_settings() {
        let config = load(&[
            ("API_HOST", "127.0.0.1"),
            ("API_PORT", "3000"),
            ("API_PRODUCTION", "true"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
            ("BACKEND_KIND", "memory"),
            ("JWT_SECRET", "0123456789abcdef0123456789abcdef"),
            ("REGISTRATION_ROLES", "team_member"),
            ("REGISTER_REDIRECT_DELAY_MS", "500"),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:3000");
        assert!(config.api.production);
        assert_eq!(config.api.cors_origins.len(), 2);
        assert!(config.registration.policy.allows(Role::TeamMember));
        assert!(!config.registration.policy.allows(Role::Admin));
        assert_eq!(config.registration.redirect_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("BACKEND_KIND", "sqlite")]).is_err());
        assert!(load(&[
            ("API_PORT", "eighty"),
            ("BACKEND_URL", "u"),
            ("BACKEND_API_KEY", "k")
        ])
        .is_err());
    }
}
