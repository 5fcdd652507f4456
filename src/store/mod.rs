//! Persistence seams for users, chat sessions, messages and analytics.
//!
//! Every trait is implemented by `PgStore` (PostgreSQL via sqlx) and by
//! `MemoryStore` (process-local, used by tests and `STORE_BACKEND=memory`).

pub mod memory;
pub mod postgres;

use crate::error::StoreError;
use crate::models::auth::{NewUser, User};
use crate::models::chat::{ChatSession, ConversationAnalytics, Message, NewMessage, Pagination};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `StoreError::Conflict` when the email or username is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates the session and its zeroed analytics record together.
    async fn create_session(&self, user_id: Uuid, title: &str) -> Result<ChatSession, StoreError>;
    /// Looks a session up within the owner's scope.
    async fn find_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ChatSession>, StoreError>;
    /// Newest first.
    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<ChatSession>, StoreError>;
    async fn update_title(
        &self,
        session_id: Uuid,
        title: &str,
    ) -> Result<Option<ChatSession>, StoreError>;
    /// Marks an active owned session ended. Returns `None` when no active
    /// session matched.
    async fn end_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<ChatSession>, StoreError>;
    /// Removes the session row only; children must already be gone.
    async fn delete_session(&self, session_id: Uuid) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError>;
    async fn count(&self, session_id: Uuid) -> Result<i64, StoreError>;
    /// Ordered by creation time, oldest first.
    async fn list(&self, session_id: Uuid, page: Pagination) -> Result<Vec<Message>, StoreError>;
    async fn find(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Message>, StoreError>;
    /// Flips every unread bot message in the session to read.
    async fn mark_bot_messages_read(&self, session_id: Uuid, user_id: Uuid)
        -> Result<u64, StoreError>;
    async fn set_read(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        is_read: bool,
    ) -> Result<Option<Message>, StoreError>;
    /// Returns false when nothing matched the scope.
    async fn delete(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, StoreError>;
    async fn delete_all(&self, session_id: Uuid) -> Result<u64, StoreError>;
}

/// Counter updates return whether a record existed.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn find_analytics(
        &self,
        session_id: Uuid,
    ) -> Result<Option<ConversationAnalytics>, StoreError>;
    async fn record_pair(&self, session_id: Uuid, topic: &str) -> Result<bool, StoreError>;
    /// Decrements the message count, never below zero.
    async fn record_deletion(&self, session_id: Uuid) -> Result<bool, StoreError>;
    async fn record_duration(&self, session_id: Uuid, seconds: i32) -> Result<bool, StoreError>;
    async fn delete_analytics(&self, session_id: Uuid) -> Result<u64, StoreError>;
}

/// One backend seen through each of its store traits.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub messages: Arc<dyn MessageStore>,
    pub analytics: Arc<dyn AnalyticsStore>,
}

impl Stores {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserStore + SessionStore + MessageStore + AnalyticsStore + 'static,
    {
        Stores {
            users: backend.clone(),
            sessions: backend.clone(),
            messages: backend.clone(),
            analytics: backend,
        }
    }
}
