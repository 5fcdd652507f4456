//! Chat session lifecycle and message exchange.
//!
//! Ownership failures are reported as `NotFound`, never as a distinct
//! "forbidden", so callers cannot probe for other users' sessions.

use crate::ai_client::AiResponder;
use crate::error::ChatError;
use crate::models::chat::{
    ChatSession, ConversationAnalytics, MessageBrief, MessageType, MessageView, NewMessage,
    Pagination, SentMessages, SessionInfo, SessionSummary, SessionTitle, DEFAULT_SESSION_TITLE,
    MAX_TITLE_LEN,
};
use crate::services::analytics::{AnalyticsTracker, TopicTagger};
use crate::services::rate_limiter::{RateLimitKey, RateLimiter};
use crate::store::{AnalyticsStore, MessageStore, SessionStore, Stores};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Auto-generated titles keep this many characters of the first message.
pub const AUTO_TITLE_LEN: usize = 50;
pub const UNTITLED_SESSION_TITLE: &str = "Untitled Chat";

const TITLE_ERROR: &str = "Title must be a string with max length of 100 characters";
const SESSION_NOT_FOUND: &str = "Chat session not found";

/// Input for [`ChatService::send_message`].
#[derive(Debug, Clone)]
pub struct SendMessage {
    pub content: String,
    pub message_type: String,
    pub metadata: Value,
    pub file_name: Option<String>,
    /// When false only the bot reply is returned.
    pub return_both: bool,
}

impl Default for SendMessage {
    fn default() -> Self {
        SendMessage {
            content: String::new(),
            message_type: MessageType::Text.as_str().to_string(),
            metadata: Value::Object(Default::default()),
            file_name: None,
            return_both: true,
        }
    }
}

pub struct ChatService {
    sessions: Arc<dyn SessionStore>,
    messages: Arc<dyn MessageStore>,
    analytics_store: Arc<dyn AnalyticsStore>,
    analytics: AnalyticsTracker,
    rate_limiter: Arc<dyn RateLimiter>,
    ai: Arc<dyn AiResponder>,
}

impl ChatService {
    pub fn new(
        stores: &Stores,
        rate_limiter: Arc<dyn RateLimiter>,
        ai: Arc<dyn AiResponder>,
        tagger: Arc<dyn TopicTagger>,
    ) -> Self {
        Self {
            sessions: stores.sessions.clone(),
            messages: stores.messages.clone(),
            analytics_store: stores.analytics.clone(),
            analytics: AnalyticsTracker::new(stores.analytics.clone(), tagger),
            rate_limiter,
            ai,
        }
    }

    async fn owned_session(&self, owner_id: Uuid, session_id: Uuid) -> Result<ChatSession, ChatError> {
        self.sessions
            .find_session(session_id, owner_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(SESSION_NOT_FOUND.to_string()))
    }

    pub async fn start_session(
        &self,
        owner_id: Uuid,
        title: Option<String>,
    ) -> Result<SessionTitle, ChatError> {
        let title = title.unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(ChatError::Validation(TITLE_ERROR.to_string()));
        }

        let session = self.sessions.create_session(owner_id, &title).await?;
        tracing::info!(session_id = %session.id, user_id = %owner_id, "chat session started");

        Ok(SessionTitle {
            session_id: session.id,
            title: session.title,
        })
    }

    pub async fn end_session(&self, owner_id: Uuid, session_id: Uuid) -> Result<ChatSession, ChatError> {
        let now = Utc::now();
        let session = self
            .sessions
            .end_session(session_id, owner_id, now)
            .await?
            .ok_or_else(|| {
                ChatError::NotFound("Chat session not found or already ended".to_string())
            })?;

        let elapsed = (now - session.created_at).num_seconds().max(0);
        let duration = i32::try_from(elapsed).unwrap_or(i32::MAX);
        self.analytics.on_session_ended(session_id, duration).await;

        tracing::info!(%session_id, duration, "chat session ended");
        Ok(session)
    }

    pub async fn rename_session(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
        title: Option<String>,
    ) -> Result<SessionTitle, ChatError> {
        let title = title.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(ChatError::Validation(TITLE_ERROR.to_string()));
        }

        self.owned_session(owner_id, session_id).await?;
        let updated = self
            .sessions
            .update_title(session_id, title)
            .await?
            .ok_or_else(|| ChatError::NotFound(SESSION_NOT_FOUND.to_string()))?;

        Ok(SessionTitle {
            session_id: updated.id,
            title: updated.title,
        })
    }

    /// Children go first: messages, then analytics, then the session row.
    pub async fn delete_session(&self, owner_id: Uuid, session_id: Uuid) -> Result<(), ChatError> {
        self.owned_session(owner_id, session_id).await?;

        let removed_messages = self.messages.delete_all(session_id).await?;
        self.analytics_store.delete_analytics(session_id).await?;
        self.sessions.delete_session(session_id).await?;

        tracing::info!(%session_id, removed_messages, "chat session deleted");
        Ok(())
    }

    pub async fn session_info(&self, owner_id: Uuid, session_id: Uuid) -> Result<SessionInfo, ChatError> {
        Ok(self.owned_session(owner_id, session_id).await?.into())
    }

    pub async fn list_sessions(&self, owner_id: Uuid) -> Result<Vec<SessionSummary>, ChatError> {
        let sessions = self.sessions.list_sessions(owner_id).await?;
        Ok(sessions.into_iter().map(SessionSummary::from).collect())
    }

    pub async fn session_analytics(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
    ) -> Result<ConversationAnalytics, ChatError> {
        self.owned_session(owner_id, session_id).await?;
        self.analytics_store
            .find_analytics(session_id)
            .await?
            .ok_or_else(|| ChatError::NotFound("Conversation analytics not found".to_string()))
    }

    pub async fn send_message(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
        request: SendMessage,
    ) -> Result<SentMessages, ChatError> {
        let file_name = request
            .file_name
            .filter(|name| !name.trim().is_empty());
        if request.content.trim().is_empty() && file_name.is_none() {
            return Err(ChatError::Validation(
                "Message content or file is required".to_string(),
            ));
        }
        let message_type: MessageType = request.message_type.parse().map_err(|_| {
            let allowed: Vec<&str> = MessageType::ALL.iter().map(MessageType::as_str).collect();
            ChatError::Validation(format!(
                "Invalid message type. Must be one of {}",
                allowed.join(", ")
            ))
        })?;
        if !request.metadata.is_object() {
            return Err(ChatError::Validation("Metadata must be an object".to_string()));
        }

        let session = self
            .sessions
            .find_session(session_id, owner_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| ChatError::NotFound("Chat session not found or inactive".to_string()))?;

        if !self
            .rate_limiter
            .check_and_consume(&RateLimitKey::new(owner_id, session_id))
            .await
        {
            tracing::warn!(%session_id, user_id = %owner_id, "message rate limit exceeded");
            return Err(ChatError::RateLimited);
        }

        let existing = self.messages.count(session_id).await?;

        let user_message = self
            .messages
            .append(NewMessage {
                session_id,
                user_id: owner_id,
                content: request.content.clone(),
                message_type,
                metadata: request.metadata,
                is_from_bot: false,
                file_name: file_name.clone(),
            })
            .await?;

        if existing == 0 && !request.content.is_empty() && message_type == MessageType::Text {
            let title = auto_title(&request.content);
            if let Err(e) = self.sessions.update_title(session.id, &title).await {
                tracing::warn!(%session_id, error = %e, "failed to set title from first message");
            }
        }

        // The user message stays committed if the responder fails.
        let reply = self.ai.ask(&request.content, message_type).await?;

        let bot_message = self
            .messages
            .append(NewMessage {
                session_id,
                user_id: owner_id,
                content: reply,
                message_type: MessageType::Text,
                metadata: Value::Object(Default::default()),
                is_from_bot: true,
                file_name: file_name.clone(),
            })
            .await?;

        self.analytics
            .on_message_pair_sent(session_id, &request.content, message_type)
            .await;

        let file_name = file_name.as_deref();
        Ok(SentMessages {
            user_message: request
                .return_both
                .then(|| MessageBrief::from_message(&user_message, file_name)),
            bot_message: MessageBrief::from_message(&bot_message, file_name),
        })
    }

    /// Lists a page of messages, then marks the session's bot replies read.
    pub async fn get_messages(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<MessageView>, ChatError> {
        let page = Pagination::new(
            page.unwrap_or(Pagination::DEFAULT_PAGE),
            limit.unwrap_or(Pagination::DEFAULT_LIMIT),
        )
        .ok_or_else(|| ChatError::Validation("Invalid pagination parameters".to_string()))?;

        self.owned_session(owner_id, session_id).await?;
        let messages = self.messages.list(session_id, page).await?;

        match self.messages.mark_bot_messages_read(session_id, owner_id).await {
            Ok(updated) if updated > 0 => {
                tracing::debug!(%session_id, updated, "marked bot messages read")
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(%session_id, error = %e, "failed to mark bot messages read"),
        }

        Ok(messages.into_iter().map(MessageView::from).collect())
    }

    pub async fn delete_message(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
        message_id: Uuid,
    ) -> Result<(), ChatError> {
        self.owned_session(owner_id, session_id).await?;
        let message = self
            .messages
            .find(session_id, message_id, owner_id)
            .await?
            .ok_or_else(|| ChatError::NotFound("Message not found".to_string()))?;

        // A concurrent delete can win between the lookup and this call.
        if !self.messages.delete(session_id, message.id, owner_id).await? {
            return Err(ChatError::NotFound("Message not found".to_string()));
        }
        tracing::debug!(%session_id, message_id = %message.id, is_from_bot = message.is_from_bot, "message deleted");
        self.analytics.on_message_deleted(session_id).await;
        Ok(())
    }

    pub async fn set_message_read(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
        message_id: Uuid,
        is_read: bool,
    ) -> Result<MessageView, ChatError> {
        self.owned_session(owner_id, session_id).await?;
        self.messages
            .set_read(session_id, message_id, owner_id, is_read)
            .await?
            .map(MessageView::from)
            .ok_or_else(|| ChatError::NotFound("Message not found".to_string()))
    }
}

fn auto_title(content: &str) -> String {
    let title: String = content.trim().chars().take(AUTO_TITLE_LEN).collect();
    if title.is_empty() {
        UNTITLED_SESSION_TITLE.to_string()
    } else {
        title
    }
}
