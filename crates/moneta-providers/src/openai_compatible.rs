//! `LanguageModel` over an OpenAI-style HTTP API.
//!
//! Works against any endpoint exposing `/v1/chat/completions` and
//! `/v1/embeddings`. Rate limits and server errors map to transient
//! failures so the orchestrator's retry policy applies; other API errors
//! are permanent.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use moneta_orchestrator::{CapabilityError, CompletionRequest, LanguageModel};

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleLm {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    embedding_model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
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
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiCompatibleLm {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            embedding_model: embedding_model.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        if self.base_url.ends_with("/v1") {
            format!("{}/{path}", self.base_url)
        } else {
            format!("{}/v1/{path}", self.base_url)
        }
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, CapabilityError> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            // Connection-level failures are worth a retry.
            CapabilityError::transient(format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "LM API error");
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(CapabilityError::transient(format!("{status}: {body}")))
            } else {
                Err(CapabilityError::permanent(format!("{status}: {body}")))
            };
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| CapabilityError::permanent(format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleLm {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CapabilityError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response: ChatResponse = self.post("chat/completions", &body).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CapabilityError::permanent("completion had no choices"))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };
        let response: EmbeddingResponse = self.post("embeddings", &body).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| CapabilityError::permanent("embedding response was empty"))
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_handles_versioned_and_bare_bases() {
        let lm = OpenAiCompatibleLm::new("https://api.example.com/v1/", None, "m", "e");
        assert_eq!(
            lm.url("chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );

        let lm = OpenAiCompatibleLm::new("https://api.example.com", None, "m", "e");
        assert_eq!(lm.url("embeddings"), "https://api.example.com/v1/embeddings");
    }

    #[test]
    fn chat_request_serializes_both_roles() {
        let body = ChatRequest {
            model: "gpt-4o",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "분류기",
                },
                ChatMessage {
                    role: "user",
                    content: "삼성전자 주가",
                },
            ],
            temperature: 0.1,
            max_tokens: 300,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "삼성전자 주가");
    }
}
