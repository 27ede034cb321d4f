use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{ChatProvider, ChatRequest, ChatResponse, FinishReason, ResponseFormat, Usage};
use remedy_types::RemedyError;

const PROVIDER: &str = "azure-openai";

// ---------------------------------------------------------------------------
// AzureOpenAiConfig
// ---------------------------------------------------------------------------

/// Connection settings for an Azure OpenAI deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureOpenAiConfig {
    pub api_key: String,
    pub api_version: String,
    pub endpoint: String,
    pub deployment: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for AzureOpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_version: "2024-02-15-preview".to_string(),
            endpoint: String::new(),
            deployment: String::new(),
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 30,
        }
    }
}

impl AzureOpenAiConfig {
    /// Whether enough is configured to attempt a request.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.endpoint.is_empty() && !self.deployment.is_empty()
    }
}

// ---------------------------------------------------------------------------
// AzureOpenAiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AzureOpenAiAdapter {
    config: AzureOpenAiConfig,
    client: reqwest::Client,
}

impl AzureOpenAiAdapter {
    pub fn new(config: AzureOpenAiConfig) -> Result<Self, RemedyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemedyError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.deployment,
            self.config.api_version
        )
    }

    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = json!({
            "messages": request.messages,
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
        });

        if request.response_format == ResponseFormat::JsonObject {
            body["response_format"] = json!({ "type": "json_object" });
        }

        body
    }

    fn parse_response(&self, body: serde_json::Value) -> Result<ChatResponse, RemedyError> {
        let id = body["id"].as_str().unwrap_or("").to_string();
        let model = body["model"]
            .as_str()
            .unwrap_or(&self.config.model)
            .to_string();

        let choice = body["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .ok_or_else(|| RemedyError::MalformedResponse {
                provider: PROVIDER.into(),
                message: "response has no choices".into(),
            })?;

        let text = choice["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let finish_reason = match choice["finish_reason"].as_str() {
            Some("length") => FinishReason::MaxTokens,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::EndTurn,
        };

        let usage_obj = &body["usage"];
        let input_tokens = usage_obj["prompt_tokens"].as_u64().unwrap_or(0);
        let output_tokens = usage_obj["completion_tokens"].as_u64().unwrap_or(0);
        let usage = Usage {
            input_tokens,
            output_tokens,
            total_tokens: usage_obj["total_tokens"]
                .as_u64()
                .unwrap_or(input_tokens + output_tokens),
        };

        Ok(ChatResponse {
            id,
            text,
            usage,
            model,
            finish_reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> RemedyError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v["error"]["retry_after"].as_f64())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            RemedyError::RateLimited {
                provider: PROVIDER.into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => RemedyError::AuthError {
            provider: PROVIDER.into(),
        },
        500 | 502 | 503 => RemedyError::ProviderError {
            provider: PROVIDER.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => RemedyError::ProviderError {
            provider: PROVIDER.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

fn map_transport_error(err: reqwest::Error, timeout_secs: u64) -> RemedyError {
    if err.is_timeout() {
        RemedyError::RequestTimeout {
            provider: PROVIDER.into(),
            timeout_ms: timeout_secs * 1000,
        }
    } else {
        RemedyError::ProviderError {
            provider: PROVIDER.into(),
            status: 0,
            message: err.to_string(),
            retryable: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ChatProvider implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ChatProvider for AzureOpenAiAdapter {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, RemedyError> {
        let body = self.build_request_body(request);

        let resp = self
            .client
            .post(self.completions_url())
            .header("api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.config.timeout_secs))?;

        let status = resp.status();
        let response_body = resp
            .text()
            .await
            .map_err(|e| map_transport_error(e, self.config.timeout_secs))?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| RemedyError::MalformedResponse {
                provider: PROVIDER.into(),
                message: format!("Failed to parse response JSON: {e}"),
            })?;

        self.parse_response(json)
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> AzureOpenAiAdapter {
        AzureOpenAiAdapter::new(AzureOpenAiConfig {
            api_key: "test-key".into(),
            endpoint: "https://example.openai.azure.com/".into(),
            deployment: "analysis".into(),
            ..AzureOpenAiConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn config_defaults_match_service_defaults() {
        let config = AzureOpenAiConfig::default();
        assert_eq!(config.api_version, "2024-02-15-preview");
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.max_tokens, 2000);
        assert!(!config.is_configured());
    }

    #[test]
    fn completions_url_trims_trailing_slash() {
        assert_eq!(
            adapter().completions_url(),
            "https://example.openai.azure.com/openai/deployments/analysis/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn build_request_body_uses_config_defaults() {
        let body = adapter().build_request_body(&ChatRequest::new("sys", "hello"));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["max_tokens"], 2000);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn build_request_body_json_mode() {
        let req = ChatRequest::new("sys", "hello")
            .with_temperature(0.5)
            .with_max_tokens(1000)
            .json();
        let body = adapter().build_request_body(&req);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["temperature"], 0.5);
    }

    #[test]
    fn parse_response_extracts_first_choice() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4",
            "choices": [
                {"message": {"role": "assistant", "content": "{\"recommendation\":\"retry\"}"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
        });
        let resp = adapter().parse_response(body).unwrap();
        assert_eq!(resp.id, "chatcmpl-1");
        assert_eq!(resp.text, "{\"recommendation\":\"retry\"}");
        assert_eq!(resp.finish_reason, FinishReason::EndTurn);
        assert_eq!(resp.usage.total_tokens, 20);
    }

    #[test]
    fn parse_response_length_finish() {
        let body = json!({
            "choices": [{"message": {"content": "partial"}, "finish_reason": "length"}]
        });
        let resp = adapter().parse_response(body).unwrap();
        assert_eq!(resp.finish_reason, FinishReason::MaxTokens);
        assert_eq!(resp.model, "gpt-4");
    }

    #[test]
    fn parse_response_without_choices_is_malformed() {
        let err = adapter().parse_response(json!({"choices": []})).unwrap_err();
        assert!(matches!(err, RemedyError::MalformedResponse { .. }));
    }

    #[test]
    fn map_error_variants() {
        let rate = map_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"retry_after":2.5}}"#,
        );
        assert!(matches!(rate, RemedyError::RateLimited { retry_after_ms: 2500, .. }));

        let auth = map_error(reqwest::StatusCode::UNAUTHORIZED, "");
        assert!(matches!(auth, RemedyError::AuthError { .. }));

        let server = map_error(
            reqwest::StatusCode::BAD_GATEWAY,
            r#"{"error":{"message":"upstream"}}"#,
        );
        match server {
            RemedyError::ProviderError {
                status,
                message,
                retryable,
                ..
            } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream");
                assert!(retryable);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
