use crate::models::chat::MessageType;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Reply used when the responder answers but has nothing to say.
pub const FALLBACK_REPLY: &str = "Sorry, I could not process your request.";

#[derive(Error, Debug)]
pub enum AiError {
    #[error("AI responder request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("AI responder error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("Failed to parse AI responder response: {0}")]
    Decode(String),
}

/// External service that produces the bot reply for a user message.
#[async_trait]
pub trait AiResponder: Send + Sync {
    async fn ask(&self, content: &str, message_type: MessageType) -> Result<String, AiError>;
}

#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    inpt_str: &'a str,
    #[serde(rename = "type")]
    message_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    trusted_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpAiResponder {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpAiResponder {
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            api_key,
        })
    }
}

#[async_trait]
impl AiResponder for HttpAiResponder {
    async fn ask(&self, content: &str, message_type: MessageType) -> Result<String, AiError> {
        let request = AskRequest {
            inpt_str: content,
            message_type: message_type.as_str(),
        };

        let mut builder = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let reply = parse_reply(&body)?;
        tracing::debug!(reply_chars = reply.chars().count(), "AI responder answered");
        Ok(reply)
    }
}

fn parse_reply(body: &str) -> Result<String, AiError> {
    let parsed: AskResponse =
        serde_json::from_str(body).map_err(|e| AiError::Decode(e.to_string()))?;
    Ok(parsed
        .trusted_text
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_REPLY.to_string()))
}
