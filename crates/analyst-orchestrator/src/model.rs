use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn in the conversation the Orchestrator builds up across rounds:
/// the assembled prompt, the model's replies, and execution observations
/// fed back as user turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// The model's reply to one `complete` call. Whether it represents
/// generated code or a textual answer is decided by the caller via
/// [`crate::codeblock::extract_code_block`] over `content` — the client
/// itself doesn't interpret the reply.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// Drives one request/response turn against a language model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, conversation: &[Message]) -> Result<ModelReply, ModelError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<UsageField>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct UsageField {
    total_tokens: u32,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Speaks to an OpenAI-compatible chat-completion endpoint over plain
/// `reqwest` — no SDK, matching how the rest of this stack calls external
/// HTTP services.
pub struct OpenAiModelClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    request_timeout: Duration,
}

impl OpenAiModelClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            request_timeout,
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiModelClient {
    async fn complete(&self, conversation: &[Message]) -> Result<ModelReply, ModelError> {
        let request = ChatRequest {
            model: &self.model,
            messages: conversation
                .iter()
                .map(|m| WireMessage { role: role_str(m.role), content: &m.content })
                .collect(),
        };

        let response = tokio::time::timeout(
            self.request_timeout,
            self.client
                .post(format!("{}/chat/completions", self.endpoint.trim_end_matches('/')))
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| ModelError::Timeout)?
        .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Unavailable(format!("{status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::ProtocolError(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::ProtocolError("no choices in response".to_string()))?
            .message
            .content;

        Ok(ModelReply {
            content,
            tokens_used: parsed.usage.map(|u| u.total_tokens),
        })
    }
}
