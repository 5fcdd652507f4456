//! Best-effort per-session counters.
//!
//! Nothing here fails the caller: a missing record is a no-op and store
//! errors are logged and swallowed.

use crate::models::chat::MessageType;
use crate::store::AnalyticsStore;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_TOPIC: &str = "General";

/// Picks the topic tag recorded for a message pair.
pub trait TopicTagger: Send + Sync {
    fn tag(&self, content: &str, message_type: MessageType) -> String;
}

/// Tags every pair with the same placeholder topic.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderTagger;

impl TopicTagger for PlaceholderTagger {
    fn tag(&self, _content: &str, _message_type: MessageType) -> String {
        DEFAULT_TOPIC.to_string()
    }
}

#[derive(Clone)]
pub struct AnalyticsTracker {
    store: Arc<dyn AnalyticsStore>,
    tagger: Arc<dyn TopicTagger>,
}

impl AnalyticsTracker {
    pub fn new(store: Arc<dyn AnalyticsStore>, tagger: Arc<dyn TopicTagger>) -> Self {
        Self { store, tagger }
    }

    /// Adds the user message and its reply to the count and appends a topic.
    pub async fn on_message_pair_sent(
        &self,
        session_id: Uuid,
        content: &str,
        message_type: MessageType,
    ) {
        let topic = self.tagger.tag(content, message_type);
        match self.store.record_pair(session_id, &topic).await {
            Ok(true) => tracing::debug!(%session_id, %topic, "analytics: message pair recorded"),
            Ok(false) => tracing::debug!(%session_id, "analytics: no record, pair skipped"),
            Err(e) => tracing::warn!(%session_id, error = %e, "analytics: failed to record pair"),
        }
    }

    pub async fn on_message_deleted(&self, session_id: Uuid) {
        match self.store.record_deletion(session_id).await {
            Ok(_) => {}
            Err(e) => tracing::warn!(%session_id, error = %e, "analytics: failed to record deletion"),
        }
    }

    pub async fn on_session_ended(&self, session_id: Uuid, duration_seconds: i32) {
        match self.store.record_duration(session_id, duration_seconds).await {
            Ok(true) => {
                tracing::debug!(%session_id, duration_seconds, "analytics: duration recorded")
            }
            Ok(false) => tracing::warn!(%session_id, "analytics: no record for ended session"),
            Err(e) => tracing::warn!(%session_id, error = %e, "analytics: failed to record duration"),
        }
    }
}
