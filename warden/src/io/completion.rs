//! Completion backend used by the ledger and the model-backed participants.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::capabilities::ModelInfo;
use crate::core::types::Message;
use crate::io::config::ModelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Render a transcript as user turns labelled with their source.
pub fn transcript_messages(transcript: &[Message]) -> Vec<ChatMessage> {
    transcript
        .iter()
        .map(|m| ChatMessage::user(format!("{}:\n{}", m.source, m.content)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Ask the backend to return a JSON object.
    pub json_output: bool,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    fn model_info(&self) -> ModelInfo;
}

/// Client for OpenAI-compatible `chat/completions` endpoints.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    config: ModelConfig,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiCompatClient {
    /// Build a client; the API key is read from `config.api_key_env` if set.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            debug!(var = %config.api_key_env, "no api key in environment");
        }
        Ok(Self {
            http,
            config: config.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    #[instrument(
        skip_all,
        fields(
            model = %self.config.model,
            messages = request.messages.len(),
            json = request.json_output
        )
    )]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatBody {
            model: &self.config.model,
            messages: &request.messages,
            temperature: self.config.temperature,
            response_format: request.json_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut builder = self.http.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .with_context(|| format!("POST {}", self.config.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("completion backend returned {status}: {}", text.trim());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("decode completion response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("completion response has no message content"))?;
        debug!(bytes = content.len(), "completion received");
        Ok(content)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model: self.config.model.clone(),
            vision: self.config.vision,
            function_calling: self.config.function_calling,
            json_output: self.config.json_output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_body_requests_json_object_when_asked() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body = ChatBody {
            model: "gpt-4o",
            messages: &messages,
            temperature: 0.0,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
    }

    #[test]
    fn chat_body_omits_response_format_by_default() {
        let body = ChatBody {
            model: "gpt-4o",
            messages: &[],
            temperature: 0.0,
            response_format: None,
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn transcript_is_labelled_by_source() {
        let messages =
            transcript_messages(&[Message::new("user", "do it"), Message::new("Coder", "done")]);
        assert_eq!(messages[1], ChatMessage::user("Coder:\ndone"));
    }

    #[test]
    fn model_info_reflects_config() {
        let config = ModelConfig {
            model: "local-llm".to_string(),
            json_output: false,
            api_key_env: "WARDEN_TEST_UNSET_KEY".to_string(),
            ..ModelConfig::default()
        };
        let client = OpenAiCompatClient::from_config(&config).expect("client");
        let info = client.model_info();
        assert_eq!(info.model, "local-llm");
        assert!(!info.json_output);
    }
}
