//! # profilectl
//!
//! User profile management service for a modular CMS: registration, profile
//! upserts with associated-entity reconciliation, password changes and profile
//! media.
//!
//! ## Architecture
//!
//! - [`api`]: axum handlers and request/response models. Create/update are
//!   multi-entity orchestrations run inside one database transaction.
//! - [`reconcile`]: pure routines computing membership diffs and per-child
//!   create/update/delete actions.
//! - [`db`]: sqlx repositories over PostgreSQL, one per entity.
//! - [`auth`]: JWT session cookies, argon2 password hashing, typed permission
//!   extractors.
//! - [`storage`]: media storage behind a trait, with a local-disk backend.
//!
//! ## Running
//!
//! ```ignore
//! let config = Config::load(&args)?;
//! profilectl::run(config, shutdown_signal()).await?;
//! ```

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use bon::Builder;
use sqlx::PgPool;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, instrument, warn};

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod reconcile;
pub mod storage;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;

use crate::{
    auth::password,
    db::handlers::{Departments, Repository, Roles, Users},
    db::models::users::UserCreateDBRequest,
    storage::{LocalMediaStorage, MediaStorage},
    types::UserId,
};

/// Shared application state passed to all handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub storage: Arc<dyn MediaStorage>,
}

/// Get the database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: creates the admin when missing, refreshes the password when a
/// password is configured, and does nothing otherwise. Called on startup so a
/// fresh deployment always has an admin account.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(config: &Config, db: &PgPool) -> anyhow::Result<Option<UserId>> {
    let email = config.admin_email.to_lowercase();

    let password_hash = match config.admin_password.as_deref() {
        Some(password) => Some(password::hash_string(password).map_err(|e| anyhow::anyhow!("hash admin password: {e}"))?),
        None => None,
    };

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    if let Some(existing) = user_repo
        .get_user_by_email(&email)
        .await
        .context("check for existing admin user")?
    {
        if let Some(password_hash) = password_hash {
            sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
                .bind(password_hash)
                .bind(existing.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        return Ok(Some(existing.id));
    }

    let Some(password_hash) = password_hash else {
        warn!("No admin user exists and no admin_password is configured; skipping admin bootstrap");
        return Ok(None);
    };

    let role = Roles::new(&mut tx)
        .find_by_slug("admin")
        .await
        .context("resolve seeded admin role")?;
    let department = Departments::new(&mut tx)
        .find_by_slug(&config.defaults.department_slug)
        .await
        .context("resolve default department")?;

    let created = Users::new(&mut tx)
        .create(&UserCreateDBRequest {
            first_name: "Admin".to_string(),
            last_name: "User".to_string(),
            email,
            password_hash,
            activated: true,
            is_admin: true,
            role_ids: vec![role.id],
            department_ids: vec![department.id],
        })
        .await
        .context("create initial admin user")?;

    tx.commit().await?;
    info!("Created initial admin user {}", created.id);
    Ok(Some(created.id))
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;

    let allow_origin = if cors_config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins = cors_config
            .allowed_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .context("parse CORS allowed origins")?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(cors_config.allow_credentials))
}

/// Build the application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route(
            "/users",
            get(api::handlers::users::list_users).post(api::handlers::users::create_user),
        )
        .route("/users/register", post(api::handlers::users::register))
        .route("/users/change-password", post(api::handlers::users::change_password))
        .route(
            "/users/media",
            post(api::handlers::media::upload_media).delete(api::handlers::media::delete_media),
        )
        .route(
            "/users/{user_id}",
            get(api::handlers::users::get_user)
                .put(api::handlers::users::update_user)
                .delete(api::handlers::users::delete_user),
        )
        .route("/auth/login", post(api::handlers::auth::login))
        .route("/auth/logout", post(api::handlers::auth::logout))
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Connect to the database, migrate, bootstrap the admin user and serve until
/// `shutdown` resolves.
pub async fn run(config: Config, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
    let database_url = config
        .database_url
        .as_deref()
        .context("database_url is not configured (set PROFILECTL_DATABASE_URL)")?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to PostgreSQL")?;

    migrator().run(&pool).await.context("run database migrations")?;

    create_initial_admin_user(&config, &pool).await?;

    let storage = Arc::new(LocalMediaStorage::new(config.media.root.clone()));
    let bind_address = config.bind_address();

    let state = AppState::builder().db(pool).config(config).storage(storage).build();
    let router = build_router(state)?;

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("bind {bind_address}"))?;
    info!("Listening on {bind_address}");

    axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;

    Ok(())
}
