//! OpenAI-compatible HTTP generation backend.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Generation, GenerationBackend, GenerationRequest};
use crate::errors::GenerationError;

/// `POST {base_url}/chat/completions` with a single user message.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// 429 and 5xx are worth retrying; any other failure status is final.
fn classify_status(status: StatusCode, body: &str) -> GenerationError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        GenerationError::Transient(message)
    } else {
        GenerationError::Rejected(message)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        self.generate_detailed(request).await.map(|g| g.text)
    }

    async fn generate_detailed(
        &self,
        request: GenerationRequest,
    ) -> Result<Generation, GenerationError> {
        debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            max_tokens = request.max_tokens,
            temperature = request.temperature,
            "Invoking HTTP backend"
        );

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::Transient(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Transient(format!("Malformed response body: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Transient("Response missing choices[0].content".into()))?;

        debug!(response_chars = content.len(), usage = ?parsed.usage, "HTTP backend responded");
        let generation = Generation::new(content);
        Ok(match parsed.usage {
            Some(usage) => generation.with_tokens(usage.prompt_tokens, usage.completion_tokens),
            None => generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let backend =
            HttpBackend::new("http://localhost:8080/v1/", "m", None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down").is_retryable());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
    }

    #[test]
    fn test_client_errors_are_rejected() {
        let err = classify_status(StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, GenerationError::Rejected(_)));
        assert!(err.to_string().contains("401"));
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_retryable());
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
            max_tokens: 10,
            temperature: 0.5,
            stream: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["max_tokens"], 10);
        assert_eq!(value["stream"], false);
    }

    #[test]
    fn test_response_parsing_tolerates_extra_fields() {
        let json = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"[]"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("[]"));
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn test_response_usage_is_read() {
        let json = r#"{"choices":[{"message":{"content":"ok"}}],"usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        let usage = parsed.usage.unwrap();
        assert_eq!((usage.prompt_tokens, usage.completion_tokens), (12, 3));
    }
}
