//! Fixtures shared by the unit tests.

use crate::ai_client::{AiError, AiResponder};
use crate::config::AppConfig;
use crate::models::auth::{NewUser, Role, User};
use crate::models::chat::MessageType;
use crate::services::analytics::PlaceholderTagger;
use crate::services::chat_service::ChatService;
use crate::services::rate_limiter::InMemoryRateLimiter;
use crate::store::{MemoryStore, Stores, UserStore};
use crate::AppState;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// AI responder double: fixed reply, queued failures, recorded prompts.
pub struct ScriptedResponder {
    reply: String,
    failures: Mutex<VecDeque<AiError>>,
    prompts: Mutex<Vec<(String, MessageType)>>,
}

impl ScriptedResponder {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            failures: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self, err: AiError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn prompts(&self) -> Vec<(String, MessageType)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiResponder for ScriptedResponder {
    async fn ask(&self, content: &str, message_type: MessageType) -> Result<String, AiError> {
        self.prompts
            .lock()
            .unwrap()
            .push((content.to_string(), message_type));
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.reply.clone())
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: "test-secret".to_string(),
        bcrypt_cost: 4,
        ..AppConfig::default()
    }
}

/// App state over a fresh in-memory store and a responder replying "Hi there".
pub fn test_state() -> (Arc<AppState>, Arc<MemoryStore>, Arc<ScriptedResponder>) {
    let store = Arc::new(MemoryStore::new());
    let responder = Arc::new(ScriptedResponder::replying("Hi there"));
    let config = test_config();
    let stores = Stores::from_backend(store.clone());
    let rate_limiter = Arc::new(InMemoryRateLimiter::new(
        config.rate_limit_max,
        config.rate_limit_window_secs,
    ));
    let chat = Arc::new(ChatService::new(
        &stores,
        rate_limiter.clone(),
        responder.clone(),
        Arc::new(PlaceholderTagger),
    ));
    let state = Arc::new(AppState {
        config,
        db_pool: None,
        stores,
        chat,
        rate_limiter,
    });
    (state, store, responder)
}

/// Creates an active user with a cheap bcrypt cost.
pub async fn seed_user(store: &MemoryStore, email: &str, password: &str) -> User {
    let password_hash = bcrypt::hash(password, 4).unwrap();
    store
        .create_user(NewUser {
            email: email.to_string(),
            username: email.split('@').next().unwrap_or(email).to_string(),
            password_hash,
            role: Role::User,
        })
        .await
        .unwrap()
}
