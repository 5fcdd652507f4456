// src/handlers/mod.rs
pub mod auth;
pub mod chat;

use crate::middleware::logging::request_logging_middleware;
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Builds the full application router with shared state attached.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(auth::auth_routes())
        .merge(chat::chat_routes())
        .route("/api/docs", get(api_documentation))
        .route("/api/status", get(api_status))
        .layer(axum::middleware::from_fn(request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let db_status = match &state.db_pool {
        Some(pool) => match sqlx::query("SELECT 1").fetch_one(pool).await {
            Ok(_) => "healthy",
            Err(e) => {
                tracing::warn!(error = %e, "database health check failed");
                "unhealthy"
            }
        },
        None => "in_memory",
    };

    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_status,
            "ai_model": state.config.ai_api_url,
        },
        "limits": {
            "messages_per_window": state.config.rate_limit_max,
            "window_secs": state.config.rate_limit_window_secs,
            "tracked_clients": state.rate_limiter.tracked_keys(),
        },
        "endpoints": {
            "documentation": "/api/docs",
            "status": "/api/status",
            "auth": "/api/auth/*",
            "messages": "/api/messages/*",
            "list": "/api/list/*",
        }
    }))
}

async fn api_documentation() -> Json<Value> {
    Json(json!({
        "auth": [
            { "method": "POST", "path": "/api/auth/register", "auth": false },
            { "method": "POST", "path": "/api/auth/login", "auth": false },
            { "method": "GET", "path": "/api/auth/verify", "auth": true },
        ],
        "messages": [
            { "method": "POST", "path": "/api/messages/session", "body": { "title": "string?" } },
            {
                "method": "POST",
                "path": "/api/messages/send-message/:session_id",
                "body": {
                    "content": "string",
                    "type": "TEXT|IMAGE|VIDEO|FILE|AUDIO|DOCUMENT|LOCATION|COMMAND",
                    "metadata": "object?",
                    "fileName": "string?",
                    "messageReturn": "bool?"
                }
            },
            { "method": "GET", "path": "/api/messages/get-message/:session_id", "query": { "page": "int?", "limit": "int? (max 100)" } },
            { "method": "GET", "path": "/api/messages/chat-session-info/:session_id" },
            { "method": "GET", "path": "/api/messages/analytics/:session_id" },
            { "method": "PATCH", "path": "/api/messages/rename-session/:session_id", "body": { "title": "string" } },
            { "method": "DELETE", "path": "/api/messages/delete-session/:session_id" },
            { "method": "PUT", "path": "/api/messages/:session_id/end" },
            { "method": "DELETE", "path": "/api/messages/:session_id/:message_id" },
            { "method": "PATCH", "path": "/api/messages/:session_id/:message_id/read", "body": { "isRead": "bool" } },
        ],
        "list": [
            { "method": "GET", "path": "/api/list/chat-sessions" },
            { "method": "GET", "path": "/api/list/chat-session-info/:session_id" },
        ],
        "envelope": { "success": "bool", "message": "string", "data": "any|null" },
    }))
}
