// src/config.rs
use crate::services::rate_limiter::{DEFAULT_MAX_MESSAGES, DEFAULT_WINDOW_SECS};
use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub bcrypt_cost: u32,
    pub ai_api_url: String,
    pub ai_api_key: Option<String>,
    pub ai_timeout_secs: u64,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_addr: "0.0.0.0:3000".to_string(),
            store_backend: StoreBackend::Postgres,
            database_url: None,
            db_max_connections: 5,
            db_acquire_timeout_secs: 30,
            jwt_secret: String::new(),
            jwt_expiry_hours: 96,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            ai_api_url: "http://0.0.0.0:8000/Trustness/".to_string(),
            ai_api_key: None,
            ai_timeout_secs: 30,
            rate_limit_max: DEFAULT_MAX_MESSAGES,
            rate_limit_window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

impl AppConfig {
    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let store_backend = parse_or(&get, "STORE_BACKEND", defaults.store_backend)?;
        let database_url = get("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        Ok(AppConfig {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            store_backend,
            database_url,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            db_acquire_timeout_secs: parse_or(
                &get,
                "DB_ACQUIRE_TIMEOUT_SECS",
                defaults.db_acquire_timeout_secs,
            )?,
            jwt_secret,
            jwt_expiry_hours: parse_or(&get, "JWT_EXPIRY_HOURS", defaults.jwt_expiry_hours)?,
            bcrypt_cost: parse_or(&get, "BCRYPT_COST", defaults.bcrypt_cost)?,
            ai_api_url: get("AI_MODEL_API_URL").unwrap_or(defaults.ai_api_url),
            ai_api_key: get("AI_MODEL_API_KEY"),
            ai_timeout_secs: parse_or(&get, "AI_MODEL_TIMEOUT_SECS", defaults.ai_timeout_secs)?,
            rate_limit_max: parse_or(&get, "RATE_LIMIT_MAX", defaults.rate_limit_max)?,
            rate_limit_window_secs: parse_or(
                &get,
                "RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            )?,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
