//! PostgreSQL implementation of the store traits.
//!
//! Runtime-checked `sqlx::query`/`query_as` against the schema in
//! `migrations/`. Messages carry a `seq` column that breaks ties between
//! rows sharing a `created_at`.

use super::{AnalyticsStore, MessageStore, SessionStore, UserStore};
use crate::error::StoreError;
use crate::models::auth::{NewUser, User};
use crate::models::chat::{ChatSession, ConversationAnalytics, Message, NewMessage, Pagination};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, email, username, password_hash, role, is_active, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, user_id, title, is_active, created_at, updated_at, ended_at";
const MESSAGE_COLUMNS: &str = "id, session_id, user_id, content, is_from_bot, message_type, \
     metadata, file_name, is_read, created_at";
const ANALYTICS_COLUMNS: &str =
    "id, session_id, user_id, message_count, topics, duration, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    session_id: Uuid,
    user_id: Uuid,
    content: String,
    is_from_bot: bool,
    message_type: String,
    metadata: Json<Value>,
    file_name: Option<String>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let message_type = row.message_type.parse().map_err(StoreError::Corrupt)?;
        Ok(Message {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            content: row.content,
            is_from_bot: row.is_from_bot,
            message_type,
            metadata: row.metadata.0,
            file_name: row.file_name,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users (id, email, username, password_hash, role, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, TRUE, NOW(), NOW())
             RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("user {} / {}", user.email, user.username))
                } else {
                    StoreError::Database(e)
                }
            })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, user_id: Uuid, title: &str) -> Result<ChatSession, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO chat_sessions (id, user_id, title, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, TRUE, $4, $4)
             RETURNING {}",
            SESSION_COLUMNS
        );
        let session = sqlx::query_as::<_, ChatSession>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(title)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO conversation_analytics (id, session_id, user_id, message_count, topics, created_at, updated_at)
             VALUES ($1, $2, $3, 0, '{}', $4, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(session.id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session)
    }

    async fn find_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ChatSession>, StoreError> {
        let sql = format!(
            "SELECT {} FROM chat_sessions WHERE id = $1 AND user_id = $2",
            SESSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, ChatSession>(&sql)
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<ChatSession>, StoreError> {
        let sql = format!(
            "SELECT {} FROM chat_sessions WHERE user_id = $1 ORDER BY created_at DESC",
            SESSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, ChatSession>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_title(
        &self,
        session_id: Uuid,
        title: &str,
    ) -> Result<Option<ChatSession>, StoreError> {
        let sql = format!(
            "UPDATE chat_sessions SET title = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, ChatSession>(&sql)
            .bind(session_id)
            .bind(title)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn end_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<ChatSession>, StoreError> {
        let sql = format!(
            "UPDATE chat_sessions
             SET is_active = FALSE, ended_at = $3, updated_at = $3
             WHERE id = $1 AND user_id = $2 AND is_active = TRUE
             RETURNING {}",
            SESSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, ChatSession>(&sql)
            .bind(session_id)
            .bind(user_id)
            .bind(ended_at)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        let sql = format!(
            "INSERT INTO messages (id, session_id, user_id, content, is_from_bot, message_type, metadata, file_name, is_read, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {}",
            MESSAGE_COLUMNS
        );
        let is_read = message.is_read();
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(message.session_id)
            .bind(message.user_id)
            .bind(&message.content)
            .bind(message.is_from_bot)
            .bind(message.message_type.as_str())
            .bind(Json(&message.metadata))
            .bind(&message.file_name)
            .bind(is_read)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn count(&self, session_id: Uuid) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list(&self, session_id: Uuid, page: Pagination) -> Result<Vec<Message>, StoreError> {
        let sql = format!(
            "SELECT {} FROM messages
             WHERE session_id = $1
             ORDER BY created_at ASC, seq ASC
             LIMIT $2 OFFSET $3",
            MESSAGE_COLUMNS
        );
        sqlx::query_as::<_, MessageRow>(&sql)
            .bind(session_id)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Message::try_from)
            .collect()
    }

    async fn find(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Message>, StoreError> {
        let sql = format!(
            "SELECT {} FROM messages WHERE id = $1 AND session_id = $2 AND user_id = $3",
            MESSAGE_COLUMNS
        );
        sqlx::query_as::<_, MessageRow>(&sql)
            .bind(message_id)
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Message::try_from)
            .transpose()
    }

    async fn mark_bot_messages_read(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = TRUE
             WHERE session_id = $1 AND user_id = $2 AND is_from_bot = TRUE AND is_read = FALSE",
        )
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_read(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        is_read: bool,
    ) -> Result<Option<Message>, StoreError> {
        let sql = format!(
            "UPDATE messages SET is_read = $4
             WHERE id = $1 AND session_id = $2 AND user_id = $3
             RETURNING {}",
            MESSAGE_COLUMNS
        );
        sqlx::query_as::<_, MessageRow>(&sql)
            .bind(message_id)
            .bind(session_id)
            .bind(user_id)
            .bind(is_read)
            .fetch_optional(&self.pool)
            .await?
            .map(Message::try_from)
            .transpose()
    }

    async fn delete(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM messages WHERE id = $1 AND session_id = $2 AND user_id = $3")
                .bind(message_id)
                .bind(session_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, session_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AnalyticsStore for PgStore {
    async fn find_analytics(
        &self,
        session_id: Uuid,
    ) -> Result<Option<ConversationAnalytics>, StoreError> {
        let sql = format!(
            "SELECT {} FROM conversation_analytics WHERE session_id = $1",
            ANALYTICS_COLUMNS
        );
        Ok(sqlx::query_as::<_, ConversationAnalytics>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn record_pair(&self, session_id: Uuid, topic: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE conversation_analytics
             SET message_count = message_count + 2,
                 topics = array_append(topics, $2),
                 updated_at = NOW()
             WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(topic)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_deletion(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE conversation_analytics
             SET message_count = GREATEST(message_count - 1, 0), updated_at = NOW()
             WHERE session_id = $1",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_duration(&self, session_id: Uuid, seconds: i32) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE conversation_analytics SET duration = $2, updated_at = NOW() WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(seconds)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_analytics(&self, session_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM conversation_analytics WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
