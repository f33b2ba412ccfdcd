//! # emporium: a self-hostable marketplace backend
//!
//! `emporium` is the backend for a marketplace-style application: user
//! accounts with JWT authentication, email activation and password reset
//! flows, dispatched-email records, an append-only access log, and a proxy
//! onto a public brewery directory. It exposes a RESTful API plus a
//! read-only GraphQL endpoint over the same resources.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and uses PostgreSQL for all persistence.
//!
//! The **API layer** ([`api`]) follows RESTful conventions for CRUD
//! operations. Resource endpoints share one generic controller
//! ([`api::controller`]) that composes the behavior every resource needs:
//! per-operation permission policies, response caching, pagination,
//! filtering and soft deletion. Mutations run inside a transaction per
//! request and invalidate the response cache for their resource type.
//!
//! The **authentication layer** ([`auth`]) issues stateless JWT
//! access/refresh pairs with rotation-on-refresh and a database-backed
//! refresh blacklist. Passwords and one-time tokens (email activation,
//! password reset) are hashed with Argon2.
//!
//! The **database layer** ([`db`]) uses the repository pattern: each entity
//! has a repository handling queries and mutations over a borrowed
//! connection, so handlers choose whether work runs on a pool connection or
//! inside a transaction. Deletion is always soft: rows are flagged and
//! stamped, never removed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use emporium::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = emporium::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     emporium::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod email;
pub mod errors;
pub mod graphql;
pub mod request_log;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::net::SocketAddr;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use bon::Builder;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, instrument, Level};

use crate::{
    api::models::users::Role,
    auth::password,
    cache::ResponseCache,
    db::handlers::{Repository, RevokedTokens, Users},
    db::models::users::UserCreateDBRequest,
    types::UserId,
};
pub use config::Config;

/// Application state shared across all request handlers.
///
/// - `db`: PostgreSQL connection pool
/// - `config`: application configuration
/// - `cache`: response cache for list/retrieve payloads, shared for the
///   process lifetime (initialized at startup, no teardown required)
/// - `graphql_schema`: the read-only GraphQL schema
/// - `http`: outbound HTTP client for the brewery directory proxy
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub cache: ResponseCache,
    pub graphql_schema: graphql::ApiSchema,
    #[builder(default)]
    pub http: reqwest::Client,
}

/// Get the database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: creates the admin account on first startup, or updates its
/// password when one is configured and the account already exists.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, db: &PgPool) -> anyhow::Result<UserId> {
    let password_hash = match password {
        Some(pwd) => Some(password::hash_string(pwd).map_err(|e| anyhow::anyhow!("Failed to hash admin password: {e}"))?),
        None => None,
    };

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    if let Some(existing) = user_repo
        .get_by_email(email)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to check existing admin user: {e}"))?
    {
        if password_hash.is_some() {
            user_repo
                .update(
                    existing.id,
                    &crate::db::models::users::UserUpdateDBRequest {
                        password_hash,
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| anyhow::anyhow!("Failed to update admin password: {e}"))?;
        }
        tx.commit().await?;
        return Ok(existing.id);
    }

    let created = user_repo
        .create(&UserCreateDBRequest {
            username: email.to_string(),
            email: email.to_string(),
            first_name: None,
            last_name: None,
            role: Role::Admin,
            is_active: true,
            password_hash,
            created_by: None,
        })
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create admin user: {e}"))?;

    tx.commit().await?;
    Ok(created.id)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let wildcard = config.cors.allowed_origins.iter().any(|o| o == "*");

    let mut cors = if wildcard && !config.cors.allow_credentials {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if origin == "*" {
                continue;
            }
            origins.push(origin.parse::<HeaderValue>()?);
        }
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
            ])
            .allow_headers([axum::http::header::AUTHORIZATION, axum::http::header::CONTENT_TYPE])
            .allow_credentials(config.cors.allow_credentials)
    };

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    // Authentication and token lifecycle
    let auth_routes = Router::new()
        .route("/api/register", post(api::handlers::auth::register))
        .route("/api/login", post(api::handlers::auth::login))
        .route("/api/token", post(api::handlers::auth::login))
        .route("/api/token/refresh", post(api::handlers::auth::refresh_token))
        .route("/api/token/verify", post(api::handlers::auth::verify_token))
        .route("/api/token/blacklist", post(api::handlers::auth::blacklist_token))
        .route("/api/logout", post(api::handlers::auth::logout))
        .route("/api/verify/email", put(api::handlers::auth::verify_email));

    // User administration and self-service routes. Static segments are
    // registered alongside the {id} capture; axum prefers the static match.
    let user_routes = Router::new()
        .route("/api/users", get(api::handlers::users::list_users).post(api::handlers::users::create_user))
        .route("/api/users/get-many", get(api::handlers::users::get_many_users))
        .route("/api/users/delete-many", delete(api::handlers::users::delete_many_users))
        .route("/api/users/me", get(api::handlers::users::me))
        .route("/api/users/me/update", put(api::handlers::users::me_update))
        .route("/api/users/change-password", put(api::handlers::auth::change_password))
        .route("/api/users/forget-password", post(api::handlers::auth::forget_password))
        .route("/api/users/forget-password-done", post(api::handlers::auth::forget_password_done))
        .route(
            "/api/users/{id}",
            get(api::handlers::users::get_user)
                .put(api::handlers::users::update_user)
                .patch(api::handlers::users::update_user)
                .delete(api::handlers::users::delete_user),
        );

    let mail_routes = Router::new()
        .route("/api/mails", get(api::handlers::mails::list_mails).post(api::handlers::mails::create_mail))
        .route("/api/mails/get-many", get(api::handlers::mails::get_many_mails))
        .route("/api/mails/delete-many", delete(api::handlers::mails::delete_many_mails))
        .route(
            "/api/mails/{id}",
            get(api::handlers::mails::get_mail)
                .put(api::handlers::mails::update_mail)
                .patch(api::handlers::mails::update_mail)
                .delete(api::handlers::mails::delete_mail),
        );

    let brewery_routes = Router::new()
        .route("/api/breweries", get(api::handlers::breweries::list_breweries))
        .route("/api/breweries/{id}", get(api::handlers::breweries::get_brewery));

    let graphql_routes = Router::new().route("/graphql", get(graphql::graphiql).post(graphql::graphql_handler));

    let api_router = auth_routes
        .merge(user_routes)
        .merge(mail_routes)
        .merge(brewery_routes)
        .merge(graphql_routes)
        // One access-log row per inbound API request
        .layer(from_fn_with_state(state.clone(), request_log::access_log_middleware))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(api_router)
        .layer(create_cors_layer(&state.config)?)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects to the database, runs
///    migrations, ensures the admin account and starts background tasks
/// 2. **Serve**: [`Application::serve`] binds a TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: tokio_util::sync::CancellationToken,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Like [`Application::new`] but reusing an existing pool (tests).
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        let pool = match pool {
            Some(pool) => pool,
            None => PgPool::connect(config.database.url()).await?,
        };

        migrator().run(&pool).await?;

        create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool).await?;

        let shutdown_token = tokio_util::sync::CancellationToken::new();
        let mut background_tasks = Vec::new();

        // Periodically drop blacklist rows for refresh tokens that have
        // expired anyway
        {
            let purge_pool = pool.clone();
            let purge_shutdown = shutdown_token.clone();
            background_tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
                loop {
                    tokio::select! {
                        _ = purge_shutdown.cancelled() => break,
                        _ = interval.tick() => {
                            let mut conn = match purge_pool.acquire().await {
                                Ok(conn) => conn,
                                Err(e) => {
                                    tracing::warn!("Blacklist purge skipped, no connection: {e}");
                                    continue;
                                }
                            };
                            match RevokedTokens::new(&mut conn).purge_expired().await {
                                Ok(0) => {}
                                Ok(purged) => info!("Purged {purged} expired blacklist rows"),
                                Err(e) => tracing::warn!("Blacklist purge failed: {e}"),
                            }
                        }
                    }
                }
            }));
        }

        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .cache(ResponseCache::new(&config.cache))
            .graphql_schema(graphql::create_schema(pool.clone()))
            .build();

        let router = build_router(&state)?;

        Ok(Self {
            router,
            config,
            pool,
            background_tasks,
            shutdown_token,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Stop background tasks and wait for them
        self.shutdown_token.cancel();
        for handle in self.background_tasks {
            let _ = handle.await;
        }

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_initial_admin_user_is_idempotent(pool: PgPool) {
        let first = create_initial_admin_user("admin@example.com", Some("hunter22"), &pool).await.unwrap();
        let second = create_initial_admin_user("admin@example.com", Some("hunter22"), &pool).await.unwrap();
        assert_eq!(first, second);

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let admin = repo.get_by_email("admin@example.com").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.is_active);
        assert!(admin.password_hash.is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_healthz(pool: PgPool) {
        let server = crate::test_utils::create_test_app(pool).await;
        let response = server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_text("OK");
    }
}
