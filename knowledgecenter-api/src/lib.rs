pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use service_core::observability::make_request_span;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::middleware::{authenticate, authorize, optional_authenticate, require_roles, RoleRequirement};
use crate::models::FULL_ACCESS_ROLE;
use crate::services::{
    store::StoreResult, CredentialVault, IdentityStore, JwtService, PermissionTable,
    SessionService, TokenAuthority,
};
use crate::utils::RefreshCookie;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn IdentityStore>,
    pub jwt: JwtService,
    pub sessions: SessionService,
    pub permissions: Arc<PermissionTable>,
    pub refresh_cookie: RefreshCookie,
    pub auth_rate_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn IdentityStore>) -> Result<Self, anyhow::Error> {
        let jwt = JwtService::new(&config.jwt_secret)?;
        let vault = CredentialVault::new(config.argon2.clone(), config.password_hash_concurrency);
        let tokens = TokenAuthority::new(store.clone(), jwt.clone());

        let refresh_cookie = RefreshCookie::new(
            config.refresh_cookie_path(),
            config.secure_cookies(),
            tokens.refresh_ttl_seconds(),
        );
        let auth_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.auth_attempts,
            config.rate_limit.auth_window_seconds,
        );
        let permissions = Arc::new(PermissionTable::new(config.unlisted_routes));

        Ok(Self {
            sessions: SessionService::new(store.clone(), vault, tokens),
            config: Arc::new(config),
            store,
            jwt,
            permissions,
            refresh_cookie,
            auth_rate_limiter,
        })
    }

    /// Fill the permission table from the store.
    pub async fn load_permissions(&self) -> StoreResult<usize> {
        self.permissions.reload(self.store.as_ref()).await
    }
}

pub fn build_router(state: AppState) -> Router {
    build_router_with_resources(state, Router::new())
}

/// Full router, with `resources` mounted under the API prefix behind the
/// permission table. Resource routes are reachable anonymously unless a rule
/// lists them.
pub fn build_router_with_resources(state: AppState, resources: Router<AppState>) -> Router {
    let rate_limited = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route_layer(from_fn_with_state(
            state.auth_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let cookie_routes = Router::new()
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout));

    // Layers run bottom-up: authenticate, then authorize.
    let authenticated = Router::new()
        .route("/auth/me", get(handlers::user::get_me))
        .route("/auth/logout-all", post(handlers::user::logout_all))
        .route_layer(from_fn_with_state(state.clone(), authorize))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let admin = Router::new()
        .route(
            "/admin/refresh-permissions",
            post(handlers::admin::refresh_permissions),
        )
        .route("/admin/permissions", get(handlers::admin::list_permissions))
        .route_layer(from_fn_with_state(state.clone(), authorize))
        .route_layer(from_fn_with_state(
            RoleRequirement::any([FULL_ACCESS_ROLE]),
            require_roles,
        ))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let resources = resources
        .layer(from_fn_with_state(state.clone(), authorize))
        .layer(from_fn_with_state(state.clone(), optional_authenticate));

    let api = Router::new()
        .merge(rate_limited)
        .merge(cookie_routes)
        .merge(authenticated)
        .merge(admin)
        .merge(resources);

    let app = match state.config.api_prefix.as_str() {
        "" => api,
        prefix => Router::new().nest(prefix, api),
    };

    app.route("/health", get(handlers::health::health_check))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
