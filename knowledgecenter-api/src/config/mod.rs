use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

use crate::services::UnlistedRoutePolicy;
use crate::utils::Argon2Settings;

/// Minimum JWT secret length accepted in production.
const MIN_PROD_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Mount point of every API route, `/api` by default; empty mounts at the root.
    pub api_prefix: String,
    pub database: DatabaseConfig,
    pub jwt_secret: SecretString,
    pub allowed_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub password_hash_concurrency: usize,
    pub argon2: Argon2Settings,
    pub unlisted_routes: UnlistedRoutePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub auth_attempts: u32,
    pub auth_window_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_source(common, |key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup, `from_env` passes the
    /// process environment.
    pub fn from_source<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment: Environment = lookup("ENVIRONMENT")
            .unwrap_or_else(|| "local".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;
        let get = |key: &str, default: Option<&str>| get_env(&lookup, key, default, is_prod);

        let defaults = Argon2Settings::default();

        let config = AppConfig {
            common,
            environment,
            service_name: get("SERVICE_NAME", Some("knowledgecenter-api"))?,
            service_version: get("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get("LOG_LEVEL", Some("info"))?,
            otlp_endpoint: lookup("OTLP_ENDPOINT").filter(|s| !s.trim().is_empty()),
            api_prefix: normalize_prefix(&get("API_PREFIX", Some("/api"))?),
            database: DatabaseConfig {
                url: get("DATABASE_URL", None)?,
                max_connections: parse(
                    "DATABASE_MAX_CONNECTIONS",
                    &get("DATABASE_MAX_CONNECTIONS", Some("10"))?,
                )?,
                min_connections: parse(
                    "DATABASE_MIN_CONNECTIONS",
                    &get("DATABASE_MIN_CONNECTIONS", Some("1"))?,
                )?,
            },
            jwt_secret: SecretString::new(get_env(&lookup, "JWT_SECRET", None, true)?),
            allowed_origins: get("ALLOWED_ORIGINS", Some("http://localhost:3000"))?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            rate_limit: RateLimitConfig {
                auth_attempts: parse(
                    "RATE_LIMIT_AUTH_ATTEMPTS",
                    &get("RATE_LIMIT_AUTH_ATTEMPTS", Some("10"))?,
                )?,
                auth_window_seconds: parse(
                    "RATE_LIMIT_AUTH_WINDOW_SECONDS",
                    &get("RATE_LIMIT_AUTH_WINDOW_SECONDS", Some("60"))?,
                )?,
            },
            password_hash_concurrency: parse(
                "PASSWORD_HASH_CONCURRENCY",
                &get("PASSWORD_HASH_CONCURRENCY", Some("4"))?,
            )?,
            argon2: Argon2Settings {
                memory_kib: parse(
                    "ARGON2_MEMORY_KIB",
                    &get("ARGON2_MEMORY_KIB", Some(&defaults.memory_kib.to_string()))?,
                )?,
                iterations: parse(
                    "ARGON2_ITERATIONS",
                    &get("ARGON2_ITERATIONS", Some(&defaults.iterations.to_string()))?,
                )?,
                parallelism: parse(
                    "ARGON2_PARALLELISM",
                    &get("ARGON2_PARALLELISM", Some(&defaults.parallelism.to_string()))?,
                )?,
                output_len: defaults.output_len,
            },
            unlisted_routes: get("PERMISSIONS_DEFAULT_POLICY", Some("open"))?
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }
        if self.jwt_secret.expose_secret().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must not be empty"
            )));
        }
        if self.rate_limit.auth_attempts == 0 || self.rate_limit.auth_window_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RATE_LIMIT_AUTH_ATTEMPTS and RATE_LIMIT_AUTH_WINDOW_SECONDS must be positive"
            )));
        }
        if self.password_hash_concurrency == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PASSWORD_HASH_CONCURRENCY must be positive"
            )));
        }
        self.argon2.params().map_err(AppError::ConfigError)?;
        if self.database.max_connections == 0
            || self.database.min_connections > self.database.max_connections
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS must not exceed a positive DATABASE_MAX_CONNECTIONS"
            )));
        }

        if self.environment == Environment::Prod {
            if self.jwt_secret.expose_secret().len() < MIN_PROD_SECRET_BYTES {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be at least {} bytes in production",
                    MIN_PROD_SECRET_BYTES
                )));
            }
            if self.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
        }
        Ok(())
    }

    /// Refresh cookies carry `Secure` everywhere except local development.
    pub fn secure_cookies(&self) -> bool {
        self.environment != Environment::Local
    }

    /// Path of the refresh cookie: the auth routes under the API prefix.
    pub fn refresh_cookie_path(&self) -> String {
        format!("{}/auth", self.api_prefix)
    }
}

fn get_env<F>(lookup: &F, key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => Ok(val),
        None => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e)))
}

/// `api/` -> `/api`, `/` -> ``.
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
