pub mod analytics;
pub mod chat_service;
pub mod rate_limiter;
