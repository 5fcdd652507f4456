// src/models/chat.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length of a session title, counted in characters.
pub const MAX_TITLE_LEN: usize = 100;
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Image,
    Video,
    File,
    Audio,
    Document,
    Location,
    Command,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        MessageType::Text,
        MessageType::Image,
        MessageType::Video,
        MessageType::File,
        MessageType::Audio,
        MessageType::Document,
        MessageType::Location,
        MessageType::Command,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "TEXT",
            MessageType::Image => "IMAGE",
            MessageType::Video => "VIDEO",
            MessageType::File => "FILE",
            MessageType::Audio => "AUDIO",
            MessageType::Document => "DOCUMENT",
            MessageType::Location => "LOCATION",
            MessageType::Command => "COMMAND",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown message type: {}", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Row shape returned by the session listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<ChatSession> for SessionSummary {
    fn from(session: ChatSession) -> Self {
        SessionSummary {
            id: session.id,
            title: session.title,
            is_active: session.is_active,
            created_at: session.created_at,
            updated_at: session.updated_at,
            ended_at: session.ended_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<ChatSession> for SessionInfo {
    fn from(session: ChatSession) -> Self {
        SessionInfo {
            id: session.id,
            title: session.title,
            created_at: session.created_at,
            updated_at: session.updated_at,
            ended_at: session.ended_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTitle {
    pub session_id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndedSession {
    pub session: ChatSession,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub is_from_bot: bool,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub metadata: Value,
    pub file_name: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A message that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub metadata: Value,
    pub is_from_bot: bool,
    pub file_name: Option<String>,
}

impl NewMessage {
    /// Senders have seen their own messages; bot replies start unread.
    pub fn is_read(&self) -> bool {
        !self.is_from_bot
    }
}

/// Message as exposed by the retrieval endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub content: String,
    pub is_from_bot: bool,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub metadata: Value,
    pub file_name: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        MessageView {
            id: message.id,
            content: message.content,
            is_from_bot: message.is_from_bot,
            message_type: message.message_type,
            metadata: message.metadata,
            file_name: message.file_name,
            is_read: message.is_read,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBrief {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl MessageBrief {
    pub fn from_message(message: &Message, file_name: Option<&str>) -> Self {
        MessageBrief {
            id: message.id,
            content: message.content.clone(),
            created_at: message.created_at,
            file_name: file_name.map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessages {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<MessageBrief>,
    pub bot_message: MessageBrief,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAnalytics {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub message_count: i32,
    pub topics: Vec<String>,
    pub duration: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated page/limit pair for message listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub const DEFAULT_PAGE: i64 = 1;
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(page: i64, limit: i64) -> Option<Self> {
        if page < 1 || limit < 1 || limit > Self::MAX_LIMIT {
            return None;
        }
        // offset() must stay representable.
        (page - 1).checked_mul(limit)?;
        Some(Pagination { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            page: Self::DEFAULT_PAGE,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

// Request payloads

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RenameSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub metadata: Option<Value>,
    pub file_name: Option<String>,
    pub message_return: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReadRequest {
    pub is_read: bool,
}
