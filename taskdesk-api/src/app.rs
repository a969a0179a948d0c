/// Application state and router builder
///
/// Defines the shared application state, connects the configured backend
/// and builds the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use taskdesk_api::{app, config::Config};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let connection = app::connect_backend(&config.backend).await?;
/// let router = app::build_router(app::AppState::new(connection.backend.clone(), config));
/// // ... serve ...
/// connection.close().await;
/// # Ok(())
/// # }
/// ```

use crate::{
    config::{BackendConfig, Config},
    middleware::{security::SecurityHeadersLayer, session::session_layer},
};
use axum::{
    http::{header, HeaderValue, Method},
    response::Redirect,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use taskdesk_shared::{
    backend::{
        memory::MemoryBackend,
        postgres::PgBackend,
        rest::{RestBackend, RestConfig},
        Backend,
    },
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool, DatabaseConfig},
    },
    routing::Route,
};
use sqlx::PgPool;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Auth and table backend
    pub backend: Arc<dyn Backend>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, config: Config) -> Self {
        Self {
            backend,
            config: Arc::new(config),
        }
    }
}

/// A connected backend and the resources to release on shutdown
pub struct Connection {
    pub backend: Arc<dyn Backend>,
    pool: Option<PgPool>,
}

impl Connection {
    /// Closes the database pool, if the backend has one
    pub async fn close(self) {
        if let Some(pool) = self.pool {
            close_pool(pool).await;
        }
    }
}

/// Connects the backend selected in configuration
///
/// The Postgres backend has its migrations applied before it is returned.
pub async fn connect_backend(config: &BackendConfig) -> anyhow::Result<Connection> {
    let connection = match config {
        BackendConfig::Hosted { url, api_key } => {
            tracing::info!(url = %url, "Using hosted backend");
            Connection {
                backend: Arc::new(RestBackend::new(RestConfig::new(
                    url.as_str(),
                    api_key.as_str(),
                ))?),
                pool: None,
            }
        }
        BackendConfig::Postgres {
            database_url,
            max_connections,
            jwt_secret,
        } => {
            let pool = create_pool(DatabaseConfig {
                url: database_url.clone(),
                max_connections: *max_connections,
                ..Default::default()
            })
            .await?;
            run_migrations(&pool).await?;
            Connection {
                backend: Arc::new(PgBackend::new(pool.clone(), jwt_secret.as_str())),
                pool: Some(pool),
            }
        }
        BackendConfig::Memory { jwt_secret } => {
            tracing::warn!("Using in-memory backend; data is lost on restart");
            Connection {
                backend: Arc::new(MemoryBackend::new(jwt_secret.as_str())),
                pool: None,
            }
        }
    };

    Ok(connection)
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health
/// ├── GET|POST /login, /register         # auth forms (public)
/// ├── POST /logout                        # bearer
/// ├── POST /session/refresh
/// ├── GET  /session/events                # SSE, one watcher per connection
/// ├── GET  /session                       # session layer
/// ├── /admin-dashboard                    # session layer, admin + manager
/// │   ├── GET    /
/// │   ├── POST   /tasks
/// │   ├── PUT    /tasks/:id
/// │   └── DELETE /tasks/:id
/// ├── /dashboard                          # session layer, team member
/// │   ├── GET  /
/// │   └── POST /tasks/:id/progress
/// └── *                                   # 303 to /login
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Session resolution (gated routes only)
/// 2. Logging (tower-http TraceLayer)
/// 3. CORS (tower-http CorsLayer)
/// 4. Security headers
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let public_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/login",
            get(routes::auth::login_page).post(routes::auth::login),
        )
        .route(
            "/register",
            get(routes::auth::register_page).post(routes::auth::register),
        )
        .route("/logout", post(routes::auth::logout))
        .route("/session/refresh", post(routes::session::refresh))
        .route("/session/events", get(routes::session::events));

    let gated_routes = Router::new()
        .route("/session", get(routes::session::current))
        .route(Route::AdminDashboard.path(), get(routes::admin::dashboard))
        .route("/admin-dashboard/tasks", post(routes::admin::create_task))
        .route(
            "/admin-dashboard/tasks/:id",
            put(routes::admin::update_task).delete(routes::admin::delete_task),
        )
        .route(Route::Dashboard.path(), get(routes::member::dashboard))
        .route(
            "/dashboard/tasks/:id/progress",
            post(routes::member::update_progress),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session_layer,
        ));

    Router::new()
        .merge(public_routes)
        .merge(gated_routes)
        .fallback(|| async { Redirect::to(Route::Login.path()) })
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// CORS: any origin in development unless origins are listed
fn cors_layer(config: &Config) -> CorsLayer {
    let origins = &config.api.cors_origins;
    if origins.is_empty() && !config.api.production {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
