//! # idctl - identity and profile management backend
//!
//! A multi-tenant identity service exposing user accounts, permission groups,
//! and person profiles over a JWT-authenticated HTTP API backed by PostgreSQL.
//!
//! ## Architecture
//!
//! **Authentication** is JWT-based with short-lived access tokens and rotating
//! refresh tokens. Refresh tokens are revoked by token id (`jti`) on logout and
//! on every refresh, so a stolen refresh token stops working the moment the
//! legitimate client rotates it. Password resets are delivered by email as
//! single-use, time-limited tokens.
//!
//! **Authorization** maps HTTP verbs to permission codenames per resource
//! (GET maps to `view_*`, POST to `add_*`, PATCH to `change_*`, DELETE to
//! `delete_*`). Permissions are granted to groups, and users inherit the union
//! of their groups' permissions. Active superusers bypass permission checks.
//! Owner-scoped endpoints (your own account, your own person profile) are
//! always available to the owner and gated by `*_other_*` codenames for
//! everyone else.
//!
//! **Persistence** uses sqlx against PostgreSQL with migrations embedded in
//! the binary. Database access goes through repository types in
//! [`db::handlers`] that borrow a connection, so handlers can compose them
//! inside transactions.
//!
//! ## Example
//!
//! ```no_run
//! use idctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
mod email;
pub mod errors;
mod openapi;
pub mod telemetry;
mod types;
mod validation;

#[cfg(test)]
pub mod test_utils;

use crate::{
    auth::password,
    db::handlers::{Repository, Users},
    db::models::users::UserCreateDBRequest,
    openapi::ApiDoc,
};
use axum::{
    Router, http,
    http::HeaderValue,
    routing::{delete, get, patch, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

pub use types::{AddressId, GroupId, PermissionId, PersonId, PhoneId, UserId};

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
}

/// Get the idctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial superuser if it doesn't exist.
///
/// Idempotent: creates the account on first startup, updates the password on
/// subsequent startups. The email doubles as the username.
#[instrument(skip_all)]
pub async fn create_initial_superuser(email: &str, password: &str, db: &PgPool) -> Result<UserId, errors::Error> {
    let password_hash = password::hash_string(password)?;

    let mut tx = db.begin().await.map_err(db::errors::DbError::from)?;
    let mut user_repo = Users::new(&mut tx);

    if let Some(existing_user) = user_repo.get_user_by_email(email).await? {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE email = $2")
            .bind(&password_hash)
            .bind(email)
            .execute(&mut *tx)
            .await
            .map_err(db::errors::DbError::from)?;
        tx.commit().await.map_err(db::errors::DbError::from)?;
        return Ok(existing_user.id);
    }

    let user_create = UserCreateDBRequest {
        username: Some(email.to_string()),
        email: Some(email.to_string()),
        password_hash: Some(password_hash),
        is_active: true,
        is_staff: true,
        is_superuser: true,
    };

    let created_user = user_repo.create(&user_create).await?;
    tx.commit().await.map_err(db::errors::DbError::from)?;

    info!(email, "Initial superuser ready");
    Ok(created_user.id)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;

    let mut cors = if cors_config.allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(tower_http::cors::Any)
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            origins.push(origin.parse::<HeaderValue>()?);
        }
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(cors_config.allow_credentials)
    };

    cors = cors
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(vec![http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// Authentication is enforced per-handler by the `CurrentUser` and
/// `Protected` extractors rather than by route-level middleware, so public
/// and authenticated routes live in the same router.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    // Signup, login and password resets are reachable without a token
    let auth_routes = Router::new()
        .route("/signup", post(api::handlers::auth::signup))
        .route("/login", post(api::handlers::auth::login))
        .route("/token", post(api::handlers::auth::login))
        .route("/token/refresh", post(api::handlers::auth::refresh_token))
        .route("/logout", post(api::handlers::auth::logout))
        .route("/password-resets", post(api::handlers::auth::request_password_reset))
        .route(
            "/password-resets/{token_id}/confirm",
            post(api::handlers::auth::confirm_password_reset),
        );

    let user_routes = Router::new()
        .route("/users", get(api::handlers::users::list_users))
        .route("/users", post(api::handlers::users::create_user))
        .route("/users/{user_id}", get(api::handlers::users::get_user))
        .route("/users/{user_id}", patch(api::handlers::users::update_user))
        .route("/users/{user_id}", delete(api::handlers::users::delete_user))
        .route("/users/{user_id}/change-password", patch(api::handlers::users::change_password));

    let group_routes = Router::new()
        .route("/groups", get(api::handlers::groups::list_groups))
        .route("/groups", post(api::handlers::groups::create_group))
        .route("/groups/{group_id}", get(api::handlers::groups::get_group))
        .route("/groups/{group_id}", patch(api::handlers::groups::update_group))
        .route("/groups/{group_id}", delete(api::handlers::groups::delete_group))
        .route(
            "/groups/{group_id}/add-permissions",
            patch(api::handlers::groups::add_permissions_to_group),
        )
        .route(
            "/groups/{group_id}/remove-permissions",
            patch(api::handlers::groups::remove_permissions_from_group),
        )
        .route("/groups/{group_id}/add-user", patch(api::handlers::groups::add_user_to_group))
        .route("/groups/{group_id}/remove-user", patch(api::handlers::groups::remove_user_from_group));

    let person_routes = Router::new()
        .route("/persons", get(api::handlers::persons::list_persons))
        .route("/persons", post(api::handlers::persons::create_person))
        .route("/persons/{person_id}", get(api::handlers::persons::get_person))
        .route("/persons/{person_id}", patch(api::handlers::persons::update_person))
        .route("/persons/{person_id}", delete(api::handlers::persons::delete_person))
        .route("/persons/{person_id}/add-user", patch(api::handlers::persons::link_user))
        .route("/persons/{person_id}/remove-user", patch(api::handlers::persons::unlink_user))
        .route("/persons/{person_id}/add-phone", patch(api::handlers::persons::add_phone))
        .route("/persons/{person_id}/remove-phone", patch(api::handlers::persons::remove_phone))
        .route("/persons/{person_id}/add-address", patch(api::handlers::persons::add_address))
        .route("/persons/{person_id}/remove-address", patch(api::handlers::persons::remove_address));

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(auth_routes)
        .merge(user_routes)
        .merge(group_routes)
        .merge(person_routes)
        .route("/permissions", get(api::handlers::permissions::list_permissions))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/docs"))
        .with_state(state.clone());

    let cors_layer = create_cors_layer(&state.config)?;

    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns the router, configuration and pool.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] connects to the database, runs
///    migrations and creates the initial superuser if configured
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting identity service with configuration: {:#?}", config);

        let pool = PgPool::connect(&config.database_url).await?;
        migrator().run(&pool).await?;

        if let (Some(email), Some(password)) = (config.admin_email.as_deref(), config.admin_password.as_deref()) {
            create_initial_superuser(email, password, &pool).await?;
        }

        let state = AppState::builder().db(pool.clone()).config(config.clone()).build();
        let router = build_router(state)?;

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Identity service listening on http://{}", bind_addr);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{auth_headers, create_test_app, create_test_user};

    #[sqlx::test]
    #[test_log::test]
    async fn test_healthz_is_public(pool: PgPool) {
        let server = create_test_app(pool).await;

        let response = server.get("/healthz").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "OK");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_protected_routes_require_a_token(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;

        for path in ["/users", "/groups", "/persons", "/permissions"] {
            let response = server.get(path).await;
            response.assert_status_unauthorized();
        }

        // The same routes answer once a valid token is attached
        let user = create_test_user(&pool).await;
        let (name, value) = auth_headers(&user);
        let response = server.get("/permissions").add_header(name, value).await;
        response.assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_initial_superuser_is_idempotent(pool: PgPool) {
        let first = create_initial_superuser("admin@example.com", "first-password", &pool)
            .await
            .unwrap();
        let second = create_initial_superuser("admin@example.com", "second-password", &pool)
            .await
            .unwrap();
        assert_eq!(first, second);

        // The password is rotated in place
        let mut conn = pool.acquire().await.unwrap();
        let user = Users::new(&mut conn)
            .get_user_by_email("admin@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_superuser);
        let hash = user.password_hash.unwrap();
        assert!(crate::auth::password::verify_string("second-password", &hash).unwrap());
    }
}
