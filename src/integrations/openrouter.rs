//! OpenRouter chat-completions client (OpenAI-compatible API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{Config, DEFAULT_LLM_MODEL, DEFAULT_LLM_URL, OPENROUTER_API_KEY_ENV};
use crate::humor::Humorist;
use crate::{Error, Result};

/// Instruction prepended to every humor request.
pub const HUMOR_INSTRUCTION: &str = "add humor to this: ";

/// Prefix of every user-visible model failure.
pub const LLM_ERROR_PREFIX: &str = "Error fetching response from LLM AI";

/// OpenRouter client.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenRouterClient {
    /// Create client with API key against the public endpoint.
    pub fn new<S: Into<String>>(api_key: S, timeout: Duration) -> Result<Self> {
        Self::with_endpoint(api_key, DEFAULT_LLM_URL, DEFAULT_LLM_MODEL, timeout)
    }

    /// Create client with explicit base URL and model.
    pub fn with_endpoint<S: Into<String>>(
        api_key: S,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::MissingCredential(OPENROUTER_API_KEY_ENV.to_string()));
        }

        let http = Client::builder()
            .user_agent(crate::config::DEFAULT_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidArgument(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_endpoint(
            config.require_llm_api_key()?,
            &config.llm_base_url,
            &config.llm_model,
            config.http_timeout,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Chat completion.
    pub async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Llm(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::LlmStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Llm("empty response".to_string()))
    }
}

#[async_trait]
impl Humorist for OpenRouterClient {
    async fn add_humor(&self, text: &str) -> String {
        let messages = vec![ChatMessage::user(format!("{}{}", HUMOR_INSTRUCTION, text))];

        match self.chat_completion(messages).await {
            Ok(reply) => reply,
            Err(Error::LlmStatus { status, body }) => {
                warn!(status, %body, "LLM returned non-success status");
                format!("{}. Status code:{}", LLM_ERROR_PREFIX, status)
            }
            Err(err) => {
                warn!(error = %err, "LLM call failed");
                format!("{}: {}", LLM_ERROR_PREFIX, err)
            }
        }
    }
}

/// Chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_new_rejects_empty_key() {
        let err = OpenRouterClient::new("   ", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::MissingCredential(_)));
    }

    #[test]
    fn test_new_uses_default_model() {
        let client = OpenRouterClient::new("key", Duration::from_secs(1)).unwrap();
        assert_eq!(client.model(), "openai/gpt-3.5-turbo");
    }

    fn client(server: &MockServer) -> OpenRouterClient {
        OpenRouterClient::with_endpoint(
            "test_key",
            &server.base_url(),
            DEFAULT_LLM_MODEL,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn add_humor_sends_instruction_and_returns_content() {
        let server = MockServer::start_async().await;

        let completion_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("Authorization", "Bearer test_key")
                .json_body(json!({
                    "model": "openai/gpt-3.5-turbo",
                    "messages": [
                        { "role": "user", "content": "add humor to this: tell me a fact about Mars" }
                    ]
                }));
            then.status(200).json_body(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "Mars: the planet that ghosted Earth 4.6 billion years ago." } }
                ]
            }));
        });

        let reply = client(&server)
            .add_humor("tell me a fact about Mars")
            .await;

        assert_eq!(reply, "Mars: the planet that ghosted Earth 4.6 billion years ago.");
        completion_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn add_humor_reports_status_code_on_failure() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("internal error");
        });

        let reply = client(&server).add_humor("anything").await;

        assert_eq!(reply, "Error fetching response from LLM AI. Status code:500");
    }

    #[tokio::test]
    async fn add_humor_reports_empty_choices() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({ "choices": [] }));
        });

        let reply = client(&server).add_humor("anything").await;

        assert!(reply.starts_with(LLM_ERROR_PREFIX));
        assert!(reply.contains("empty response"));
    }

    #[tokio::test]
    async fn chat_completion_returns_status_error() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("rate limited");
        });

        let err = client(&server)
            .chat_completion(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LlmStatus { status: 429, ref body } if body == "rate limited"));
    }

    #[tokio::test]
    async fn chat_completion_returns_error_on_invalid_json() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).body("not json");
        });

        let err = client(&server)
            .chat_completion(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn chat_completion_returns_error_on_missing_message_content() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": null } }
                ]
            }));
        });

        let err = client(&server)
            .chat_completion(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("empty response"));
    }
}
