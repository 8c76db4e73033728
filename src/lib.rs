use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use http::{header, HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

pub mod config;
pub mod db;
pub mod error;
pub mod limiter;
pub mod state;

pub mod crypto {
    pub mod cipher;
    pub mod csrf;
    pub mod digest;
    pub mod password;
    pub mod token;
}

pub mod models {
    pub mod audit;
    pub mod identity;
    pub mod license;
    pub mod role;
    pub mod user;
}

pub mod repositories {
    pub mod audit;
    pub mod license;
    pub mod memory;
    pub mod role;
    pub mod user;
}

pub mod services {
    pub mod audit;
    pub mod auth;
    pub mod license;
    pub mod maintenance;
    pub mod roles;
    pub mod users;
}

pub mod handlers {
    pub mod audit;
    pub mod auth;
    pub mod health;
    pub mod license;
    pub mod response;
    pub mod roles;
    pub mod users;
}

pub mod middleware_layer {
    pub mod audit;
    pub mod auth;
    pub mod csrf;
    pub mod rate_limit;
}

pub mod validation {
    pub mod auth;
    pub mod request;
}

use config::Config;
use middleware_layer::auth::{PermissionGate, RoleGate};
use models::role::{permissions, ADMIN_ROLES, SUPERVISOR_ROLES};
use state::AppState;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

const ADMIN_GATE: RoleGate = RoleGate::new(ADMIN_ROLES);
const SUPERVISOR_GATE: RoleGate = RoleGate::new(SUPERVISOR_ROLES);

/// Builds the CORS policy for the configured frontend origin.
fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    Ok(CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.frontend_url)?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
            HeaderName::from_static(middleware_layer::csrf::CSRF_HEADER),
        ])
        .allow_credentials(true)
        .expose_headers([HeaderName::from_static(middleware_layer::csrf::CSRF_HEADER)])
        .max_age(Duration::from_secs(86400)))
}

/// Builds the application router.
///
/// Layers on a route group run bottom-up: the last `route_layer` added is
/// the first to see the request.
///
/// # Arguments
///
/// * `state` - The application state.
///
/// # Returns
///
/// A `Result` containing the `Router`.
pub fn router(state: AppState) -> anyhow::Result<Router> {
    let public_license_routes = Router::new()
        .route("/api/license/activate", post(handlers::license::activate))
        .route("/api/license/validate", get(handlers::license::validate))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::audit::audit_trail,
        ))
        .with_state(state.clone());

    let license_routes = Router::new()
        .route("/api/license/deactivate", post(handlers::license::deactivate))
        .route("/api/license/renew", post(handlers::license::renew))
        .route(
            "/api/license/expiry-notification",
            get(handlers::license::expiry_notification),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::audit::audit_trail,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::authenticate,
        ))
        .with_state(state.clone());

    let license_admin_routes = Router::new()
        .route("/api/license/analytics", get(handlers::license::analytics))
        .route("/api/license/admin/create", post(handlers::license::create))
        .route(
            "/api/license/admin/delete/{id}",
            delete(handlers::license::delete),
        )
        .route("/api/license/admin/list", get(handlers::license::list))
        .route("/api/license/admin/dashboard", get(handlers::license::list))
        .route("/api/license/admin/search", get(handlers::license::search))
        .route(
            "/api/license/admin/usage-history/{id}",
            get(handlers::license::usage_history),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::audit::audit_trail,
        ))
        .route_layer(from_fn_with_state(ADMIN_GATE, middleware_layer::auth::require_role))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::authenticate,
        ))
        .with_state(state.clone());

    let register_routes = Router::new()
        .route("/api/auth/csrf-token", get(handlers::auth::csrf_token))
        .route("/api/auth/register", post(handlers::auth::register))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::audit::audit_trail,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::csrf::verify_csrf,
        ))
        .with_state(state.clone());

    let login_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::audit::audit_trail,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::throttle_login,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::csrf::verify_csrf,
        ))
        .with_state(state.clone());

    let account_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/refresh-token", post(handlers::auth::refresh_token))
        .route(
            "/api/auth/profile",
            get(handlers::auth::profile).put(handlers::auth::update_profile),
        )
        .route(
            "/api/auth/profile/deactivate",
            put(handlers::auth::deactivate_profile),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::audit::audit_trail,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::csrf::verify_csrf,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::authenticate,
        ))
        .with_state(state.clone());

    let user_admin_routes = Router::new()
        .route("/api/auth/users", get(handlers::users::list))
        .route(
            "/api/auth/users/{id}",
            get(handlers::users::get).delete(handlers::users::delete),
        )
        .route("/api/auth/users/{id}/role", put(handlers::users::change_role))
        .route(
            "/api/auth/users/{id}/deactivate",
            put(handlers::users::deactivate),
        )
        .route(
            "/api/auth/users/{id}/reactivate",
            put(handlers::users::reactivate),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::audit::audit_trail,
        ))
        .route_layer(from_fn_with_state(ADMIN_GATE, middleware_layer::auth::require_role))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::csrf::verify_csrf,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::authenticate,
        ))
        .with_state(state.clone());

    let user_supervisor_routes = Router::new()
        .route("/api/auth/users/{id}/suspend", put(handlers::users::suspend))
        .route(
            "/api/auth/users/{id}/unsuspend",
            put(handlers::users::unsuspend),
        )
        .route(
            "/api/auth/users/{id}/delegate-role",
            put(handlers::users::delegate_role).delete(handlers::users::revoke_delegation),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::audit::audit_trail,
        ))
        .route_layer(from_fn_with_state(
            SUPERVISOR_GATE,
            middleware_layer::auth::require_role,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::csrf::verify_csrf,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::authenticate,
        ))
        .with_state(state.clone());

    let role_routes = Router::new()
        .route(
            "/api/roles",
            get(handlers::roles::list).post(handlers::roles::create),
        )
        .route("/api/roles/initialize", post(handlers::roles::initialize))
        .route(
            "/api/roles/{id}",
            put(handlers::roles::update).delete(handlers::roles::delete),
        )
        .route(
            "/api/roles/{id}/permissions",
            get(handlers::roles::permissions).put(handlers::roles::set_permissions),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::audit::audit_trail,
        ))
        .route_layer(from_fn_with_state(
            PermissionGate {
                state: state.clone(),
                permission: permissions::MANAGE_ROLES,
            },
            middleware_layer::auth::require_permission,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::authenticate,
        ))
        .with_state(state.clone());

    let audit_routes = Router::new()
        .route("/api/audit-logs", get(handlers::audit::list))
        .route(
            "/api/audit-logs/by-user/{user_id}",
            get(handlers::audit::by_user),
        )
        .route_layer(from_fn_with_state(
            PermissionGate {
                state: state.clone(),
                permission: permissions::VIEW_AUDIT_LOGS,
            },
            middleware_layer::auth::require_permission,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::authenticate,
        ))
        .with_state(state.clone());

    let app = Router::new()
        .route("/api/health", get(handlers::health::health))
        .merge(public_license_routes)
        .merge(license_routes)
        .merge(license_admin_routes)
        .merge(register_routes)
        .merge(login_routes)
        .merge(account_routes)
        .merge(user_admin_routes)
        .merge(user_supervisor_routes)
        .merge(role_routes)
        .merge(audit_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&state.config)?);

    Ok(app)
}
