//! Test helpers: the full router over the in-memory identity store.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    routing::get,
    Router,
};
use knowledgecenter_api::{
    build_router_with_resources,
    config::{AppConfig, DatabaseConfig, Environment, RateLimitConfig},
    models::{LocalizedText, NewUser, User},
    services::{IdentityStore, MemoryIdentityStore, UnlistedRoutePolicy},
    utils::{cookies::REFRESH_COOKIE_NAME, Argon2Settings},
    AppState,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use service_core::observability::init_test_tracing;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-integration-test";
pub const PASSWORD: &str = "passw0rd!";

pub fn test_config() -> AppConfig {
    AppConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Local,
        service_name: "knowledgecenter-api".to_string(),
        service_version: "test".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        api_prefix: "/api".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 0,
        },
        jwt_secret: SecretString::new(TEST_JWT_SECRET.to_string()),
        allowed_origins: vec!["http://localhost:3000".to_string()],
        rate_limit: RateLimitConfig {
            auth_attempts: 1000,
            auth_window_seconds: 60,
        },
        password_hash_concurrency: 4,
        // Cheap parameters; the production defaults are covered by unit tests.
        argon2: Argon2Settings {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
            output_len: 32,
        },
        unlisted_routes: UnlistedRoutePolicy::Open,
    }
}

/// Stand-ins for the CRUD routes the permission table protects.
pub fn resource_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            get(|| async { "listed" }).post(|| async { "created" }),
        )
        .route("/users/:user_id", get(|| async { "user" }))
        .route("/unknown", get(|| async { "open" }))
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryIdentityStore>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        init_test_tracing();

        let mut config = test_config();
        customize(&mut config);

        let store = Arc::new(MemoryIdentityStore::new());
        let state = AppState::new(config, store.clone()).unwrap();
        state.load_permissions().await.unwrap();

        Self {
            router: build_router_with_resources(state.clone(), resource_routes()),
            state,
            store,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
        refresh: Option<&str>,
    ) -> Response<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.10");
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(secret) = refresh {
            req = req.header(
                header::COOKIE,
                format!("{}={}", REFRESH_COOKIE_NAME, secret),
            );
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        self.send(req).await
    }

    /// Register `email` with [`PASSWORD`]; returns the body and the refresh secret.
    pub async fn register(&self, email: &str) -> (Value, String) {
        let res = self
            .call(
                "POST",
                "/api/auth/register",
                Some(json!({"email": email, "password": PASSWORD, "name": {"en-US": "A"}})),
                None,
                None,
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let secret = refresh_cookie(&res).expect("refresh cookie");
        (body_json(res).await, secret)
    }

    pub async fn grant_public_role(&self, role: &str) {
        let public = self
            .store
            .get_group_by_public_id("public")
            .await
            .unwrap()
            .unwrap();
        self.store.grant_group_role(public.id, role).unwrap();
    }

    /// A user holding exactly `roles`, and an access token for them.
    pub async fn user_with_roles(&self, login_id: &str, roles: &[&str]) -> (User, String) {
        let user = self
            .store
            .create_user(NewUser {
                login_id: login_id.to_string(),
                email: format!("{}@x.io", login_id),
                name: LocalizedText::from([("en-US".to_string(), login_id.to_string())]),
                password_hash: String::new(),
            })
            .await
            .unwrap();
        for role in roles {
            self.store.grant_user_role(user.id, role).unwrap();
        }

        let roles = self.store.get_effective_roles(user.id).await.unwrap();
        let token = self
            .state
            .jwt
            .issue_access_token(&user, &roles)
            .unwrap()
            .token;
        (user, token)
    }
}

pub async fn body_json(res: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn set_cookie_header(res: &Response<Body>) -> Option<String> {
    let prefix = format!("{}=", REFRESH_COOKIE_NAME);
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
        .map(str::to_string)
}

/// Refresh secret set by the response; `None` when absent or cleared.
pub fn refresh_cookie(res: &Response<Body>) -> Option<String> {
    let header = set_cookie_header(res)?;
    let pair = header.split(';').next()?;
    let value = pair.split_once('=')?.1.trim().to_string();
    (!value.is_empty()).then_some(value)
}

pub fn is_cleared(res: &Response<Body>) -> bool {
    set_cookie_header(res).is_some_and(|h| h.contains("Max-Age=-1"))
        && refresh_cookie(res).is_none()
}
