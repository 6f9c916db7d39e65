use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Path of the relay endpoint every client request goes through.
pub const RELAY_ENDPOINT_PATH: &str = "/api/analyze-circuit";

#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    /// Full URL the chat-completion body is POSTed to.
    pub endpoint: String,
    /// `None` means the request may hang for as long as the server does.
    pub timeout: Option<Duration>,
    pub max_error_body_bytes: usize,
}

impl ChatClientConfig {
    pub fn for_relay(base_url: &str) -> Self {
        Self {
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), RELAY_ENDPOINT_PATH),
            timeout: None,
            max_error_body_bytes: 8 * 1024,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("API error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("API error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },

    #[error("No content in API response")]
    EmptyCompletion,
}

/// A black-box text completion service.
///
/// Views only ever need the assistant text of the first choice, so that is all
/// the seam exposes.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<String, ChatClientError>;
}

/// Single-shot chat-completion caller. No retries: every failure goes straight
/// back to the caller, which decides whether the user tries again.
#[derive(Clone)]
pub struct ChatClient {
    config: ChatClientConfig,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self, ChatClientError> {
        let http = reqwest::Client::builder()
            .user_agent("maxwell/client")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ChatClientConfig {
        &self.config
    }

    pub async fn chat_completions(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ChatClientError> {
        let mut builder = self.http.post(&self.config.endpoint).json(request);
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        let resp = builder.send().await?;
        debug!(status = %resp.status(), endpoint = %self.config.endpoint, "chat completion answered");

        if !resp.status().is_success() {
            return Err(Self::to_upstream_error(resp, self.config.max_error_body_bytes).await);
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice::<ChatCompletionResponse>(&bytes)?)
    }

    async fn to_upstream_error(resp: reqwest::Response, max_error_body_bytes: usize) -> ChatClientError {
        let status = resp.status();
        let body = read_limited_text(resp, max_error_body_bytes).await;
        match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(ErrorEnvelope::Relay { error }) => ChatClientError::Upstream {
                status,
                message: error,
            },
            Ok(ErrorEnvelope::OpenAi { error }) => ChatClientError::Upstream {
                status,
                message: error
                    .message
                    .unwrap_or_else(|| "unknown upstream error".to_string()),
            },
            Err(_) => ChatClientError::UpstreamBody { status, body },
        }
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<String, ChatClientError> {
        let response = self.chat_completions(&request).await?;
        response
            .first_content()
            .map(str::to_string)
            .ok_or(ChatClientError::EmptyCompletion)
    }
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            "<failed to read error body>".to_string()
        }
    }
}

/// Error bodies come either from the relay (`{"error": "..."}`) or straight from an
/// OpenAI-compatible host (`{"error": {"message": ...}}`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorEnvelope {
    Relay { error: String },
    OpenAi { error: OpenAiErrorObject },
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorObject {
    message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub object: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Option<ChatCompletionUsage>,
}

impl ChatCompletionResponse {
    /// Text of `choices[0].message.content`, if present and non-empty.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: Option<u32>,
    pub message: ChatCompletionMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}
