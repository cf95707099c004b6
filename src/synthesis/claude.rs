use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{prompt, Synthesizer};
use crate::config::LlmConfig;
use crate::error::{AppError, Result};
use crate::pipeline::state::{Role, TranscriptMessage};

const API_VERSION: &str = "2023-06-01";

pub struct ClaudeClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ClaudeClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub async fn send_message(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| AppError::LlmApi(format!("invalid response body: {e}")))
    }

    fn build_request(
        &self,
        instructions: &str,
        context: &str,
        transcript: &[TranscriptMessage],
    ) -> MessagesRequest {
        let mut messages: Vec<Message> = transcript
            .iter()
            .map(|m| Message {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect();

        let content = if context.trim().is_empty() {
            instructions.to_string()
        } else {
            format!("{instructions}\n\n{context}")
        };
        messages.push(Message {
            role: "user".to_string(),
            content,
        });

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: prompt::SYSTEM_PROMPT.to_string(),
            messages,
        }
    }
}

#[async_trait]
impl Synthesizer for ClaudeClient {
    async fn complete(
        &self,
        instructions: &str,
        context: &str,
        transcript: &[TranscriptMessage],
    ) -> Result<String> {
        let request = self.build_request(instructions, context, transcript);
        let response = self.send_message(&request).await?;

        tracing::debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "Completion received"
        );

        Ok(extract_text(&response.content))
    }
}

/// Map a non-success status to an error, keeping retryable statuses transient.
fn classify_status(status: StatusCode, body: &str) -> AppError {
    let message = format!("API returned {status}: {body}");
    match status.as_u16() {
        429 => AppError::RateLimited(message),
        408 | 500..=599 => AppError::Transient(message),
        _ => AppError::LlmApi(message),
    }
}

fn extract_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// --- Request types ---

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

// --- Response types ---

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
