//! HTTP client for a locally hosted Ollama server.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AiError, LlmError};

/// An opaque text-in, text-out classifier.
#[async_trait]
pub trait LanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Model identifier recorded alongside every response.
    fn model_name(&self) -> &str;
}

/// Which Ollama endpoint to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OllamaApi {
    /// `POST /api/generate` with a bare prompt.
    #[default]
    Generate,
    /// `POST /api/chat` with a single user message.
    Chat,
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Like `http://localhost:11434`; a trailing slash is ignored.
    pub base_url: String,
    pub model: String,
    pub api: OllamaApi,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "codellama:34b".into(),
            api: OllamaApi::Generate,
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatReply,
}

/// Non-streaming Ollama client. One request per prompt, no retries.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api: OllamaApi,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(AiError::Client)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            api: config.api,
        })
    }

    pub fn endpoint(&self) -> String {
        match self.api {
            OllamaApi::Generate => format!("{}/api/generate", self.base_url),
            OllamaApi::Chat => format!("{}/api/chat", self.base_url),
        }
    }

    async fn post<B: Serialize + Sync>(&self, body: &B) -> Result<reqwest::Response, LlmError> {
        let url = self.endpoint();
        debug!(url = %url, model = %self.model, "querying language model");
        let resp = self.client.post(&url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        match self.api {
            OllamaApi::Generate => {
                let req = GenerateRequest {
                    model: &self.model,
                    prompt,
                    stream: false,
                };
                let bytes = self.post(&req).await?.bytes().await?;
                let parsed: GenerateResponse = serde_json::from_slice(&bytes)?;
                Ok(parsed.response)
            }
            OllamaApi::Chat => {
                let req = ChatRequest {
                    model: &self.model,
                    messages: [ChatMessage {
                        role: "user",
                        content: prompt,
                    }],
                    stream: false,
                };
                let bytes = self.post(&req).await?.bytes().await?;
                let parsed: ChatResponse = serde_json::from_slice(&bytes)?;
                Ok(parsed.message.content)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let client = OllamaClient::new(OllamaConfig {
            base_url: "http://gpu-box:11434/".into(),
            api: OllamaApi::Chat,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.endpoint(), "http://gpu-box:11434/api/chat");
        assert_eq!(client.model_name(), "codellama:34b");
    }

    #[test]
    fn generate_request_shape() {
        let req = GenerateRequest {
            model: "codellama:34b",
            prompt: "Does this code ...",
            stream: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["prompt"], "Does this code ...");
    }

    #[test]
    fn chat_request_and_reply_shape() {
        let req = ChatRequest {
            model: "gemma3",
            messages: [ChatMessage {
                role: "user",
                content: "quoted text",
            }],
            stream: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");

        let reply: ChatResponse = serde_json::from_str(
            r#"{"model": "gemma3", "message": {"role": "assistant", "content": "[Yes] We use Steps"}, "done": true}"#,
        )
        .unwrap();
        assert_eq!(reply.message.content, "[Yes] We use Steps");
    }

    #[test]
    fn generate_reply_ignores_extra_fields() {
        let reply: GenerateResponse =
            serde_json::from_str(r#"{"model": "m", "response": "Answer: No", "done": true, "context": [1, 2]}"#)
                .unwrap();
        assert_eq!(reply.response, "Answer: No");
    }
}
