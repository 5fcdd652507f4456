// lib.rs - Chat backend library: stores, services and HTTP surface
pub mod ai_client;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

#[cfg(test)]
mod test_support;

use crate::config::AppConfig;
use crate::services::chat_service::ChatService;
use crate::services::rate_limiter::RateLimiter;
use crate::store::Stores;
use std::sync::Arc;

// AppState holds the optional database pool, the store handles and the chat service
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Option<sqlx::PgPool>,
    pub stores: Stores,
    pub chat: Arc<ChatService>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}
