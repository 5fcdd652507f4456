use super::{AnalyticsStore, MessageStore, SessionStore, UserStore};
use crate::error::StoreError;
use crate::models::auth::{NewUser, User};
use crate::models::chat::{ChatSession, ConversationAnalytics, Message, NewMessage, Pagination};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
struct StoredMessage {
    seq: u64,
    message: Message,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, ChatSession>,
    messages: Vec<StoredMessage>,
    analytics: HashMap<Uuid, ConversationAnalytics>,
    next_seq: u64,
}

/// Process-local backend. Everything lives behind a single lock so the
/// session + analytics pair is created in one critical section.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a user row as-is; used to seed fixtures.
    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Drops the analytics record without touching the session.
    pub async fn remove_analytics(&self, session_id: Uuid) {
        self.state.write().await.analytics.remove(&session_id);
    }
}

fn in_scope(stored: &StoredMessage, session_id: Uuid, message_id: Uuid, user_id: Uuid) -> bool {
    stored.message.id == message_id
        && stored.message.session_id == session_id
        && stored.message.user_id == user_id
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|u| u.email == user.email || u.username == user.username)
        {
            return Err(StoreError::Conflict(format!(
                "user {} / {} already exists",
                user.email, user.username
            )));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role.as_str().to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, user_id: Uuid, title: &str) -> Result<ChatSession, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
            ended_at: None,
        };
        let analytics = ConversationAnalytics {
            id: Uuid::new_v4(),
            session_id: session.id,
            user_id,
            message_count: 0,
            topics: Vec::new(),
            duration: None,
            created_at: now,
            updated_at: now,
        };
        state.sessions.insert(session.id, session.clone());
        state.analytics.insert(session.id, analytics);
        Ok(session)
    }

    async fn find_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ChatSession>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .get(&session_id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<ChatSession>, StoreError> {
        let state = self.state.read().await;
        let mut sessions: Vec<ChatSession> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn update_title(
        &self,
        session_id: Uuid,
        title: &str,
    ) -> Result<Option<ChatSession>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.sessions.get_mut(&session_id).map(|session| {
            session.title = title.to_string();
            session.updated_at = Utc::now();
            session.clone()
        }))
    }

    async fn end_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<ChatSession>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .sessions
            .get_mut(&session_id)
            .filter(|s| s.user_id == user_id && s.is_active)
            .map(|session| {
                session.is_active = false;
                session.ended_at = Some(ended_at);
                session.updated_at = ended_at;
                session.clone()
            }))
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.sessions.remove(&session_id).map_or(0, |_| 1))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut state = self.state.write().await;
        let is_read = message.is_read();
        let created = Message {
            id: Uuid::new_v4(),
            session_id: message.session_id,
            user_id: message.user_id,
            content: message.content,
            is_from_bot: message.is_from_bot,
            message_type: message.message_type,
            metadata: message.metadata,
            file_name: message.file_name,
            is_read,
            created_at: Utc::now(),
        };
        state.next_seq += 1;
        let seq = state.next_seq;
        state.messages.push(StoredMessage {
            seq,
            message: created.clone(),
        });
        Ok(created)
    }

    async fn count(&self, session_id: Uuid) -> Result<i64, StoreError> {
        let state = self.state.read().await;
        let count = state
            .messages
            .iter()
            .filter(|m| m.message.session_id == session_id)
            .count();
        Ok(count as i64)
    }

    async fn list(&self, session_id: Uuid, page: Pagination) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read().await;
        let mut matching: Vec<&StoredMessage> = state
            .messages
            .iter()
            .filter(|m| m.message.session_id == session_id)
            .collect();
        matching.sort_by(|a, b| {
            a.message
                .created_at
                .cmp(&b.message.created_at)
                .then(a.seq.cmp(&b.seq))
        });
        Ok(matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .map(|m| m.message.clone())
            .collect())
    }

    async fn find(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Message>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .find(|m| in_scope(m, session_id, message_id, user_id))
            .map(|m| m.message.clone()))
    }

    async fn mark_bot_messages_read(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for stored in state.messages.iter_mut() {
            let m = &mut stored.message;
            if m.session_id == session_id && m.user_id == user_id && m.is_from_bot && !m.is_read {
                m.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn set_read(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        is_read: bool,
    ) -> Result<Option<Message>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .messages
            .iter_mut()
            .find(|m| in_scope(m, session_id, message_id, user_id))
            .map(|stored| {
                stored.message.is_read = is_read;
                stored.message.clone()
            }))
    }

    async fn delete(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let before = state.messages.len();
        state
            .messages
            .retain(|m| !in_scope(m, session_id, message_id, user_id));
        Ok(state.messages.len() < before)
    }

    async fn delete_all(&self, session_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.messages.len();
        state.messages.retain(|m| m.message.session_id != session_id);
        Ok((before - state.messages.len()) as u64)
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn find_analytics(
        &self,
        session_id: Uuid,
    ) -> Result<Option<ConversationAnalytics>, StoreError> {
        Ok(self.state.read().await.analytics.get(&session_id).cloned())
    }

    async fn record_pair(&self, session_id: Uuid, topic: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.analytics.get_mut(&session_id) {
            Some(record) => {
                record.message_count += 2;
                record.topics.push(topic.to_string());
                record.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn record_deletion(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.analytics.get_mut(&session_id) {
            Some(record) => {
                record.message_count = (record.message_count - 1).max(0);
                record.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn record_duration(&self, session_id: Uuid, seconds: i32) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.analytics.get_mut(&session_id) {
            Some(record) => {
                record.duration = Some(seconds);
                record.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn delete_analytics(&self, session_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.analytics.remove(&session_id).map_or(0, |_| 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::Role;
    use crate::models::chat::MessageType;

    fn new_message(session_id: Uuid, user_id: Uuid, content: &str, is_from_bot: bool) -> NewMessage {
        NewMessage {
            session_id,
            user_id,
            content: content.to_string(),
            message_type: MessageType::Text,
            metadata: serde_json::json!({}),
            is_from_bot,
            file_name: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_users_conflict() {
        let store = MemoryStore::new();
        let user = NewUser {
            email: "a@example.com".into(),
            username: "a".into(),
            password_hash: "hash".into(),
            role: Role::User,
        };
        store.create_user(user.clone()).await.unwrap();
        let err = store.create_user(user).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_session_scope_is_per_owner() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let session = store.create_session(owner, "mine").await.unwrap();
        assert!(store.find_session(session.id, owner).await.unwrap().is_some());
        assert!(store
            .find_session(session.id, Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_messages_keep_insertion_order() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        for i in 0..5 {
            store
                .append(new_message(session_id, owner, &format!("m{}", i), i % 2 == 1))
                .await
                .unwrap();
        }
        let listed = store.list(session_id, Pagination::default()).await.unwrap();
        let contents: Vec<&str> = listed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_find_is_scoped_to_session_and_owner() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let stored = store
            .append(new_message(session_id, owner, "hello", false))
            .await
            .unwrap();

        let found = store.find(session_id, stored.id, owner).await.unwrap();
        assert_eq!(found.map(|m| m.content), Some("hello".to_string()));
        assert!(store
            .find(Uuid::new_v4(), stored.id, owner)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find(session_id, stored.id, Uuid::new_v4())
            .await
            .unwrap()
            .is_none());

        assert!(store.delete(session_id, stored.id, owner).await.unwrap());
        assert!(store.find(session_id, stored.id, owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_bot_messages_read_only_touches_unread_bot_messages() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        store.append(new_message(session_id, owner, "q", false)).await.unwrap();
        store.append(new_message(session_id, owner, "a", true)).await.unwrap();
        store.append(new_message(Uuid::new_v4(), owner, "other", true)).await.unwrap();

        assert_eq!(store.mark_bot_messages_read(session_id, owner).await.unwrap(), 1);
        assert_eq!(store.mark_bot_messages_read(session_id, owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deletion_count_is_clamped() {
        let store = MemoryStore::new();
        let session = store.create_session(Uuid::new_v4(), "t").await.unwrap();
        assert!(store.record_deletion(session.id).await.unwrap());
        let analytics = store.find_analytics(session.id).await.unwrap().unwrap();
        assert_eq!(analytics.message_count, 0);
        assert!(!store.record_deletion(Uuid::new_v4()).await.unwrap());
    }
}
