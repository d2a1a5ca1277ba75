use async_trait::async_trait;
use gemini_rust::Gemini;
use serde_json::Value;

use crate::clients::models::requests::{LlmMessage, MessageRole};
use crate::clients::models::responses::{LlmResponse, TokenUsage};
use crate::error::{PlannerError, Result};

/// Chat-style completion over an ordered message list.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, messages: &[LlmMessage]) -> Result<LlmResponse>;
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Gemini,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let model_path = if model.starts_with("models/") {
            model.clone()
        } else {
            format!("models/{}", model)
        };

        let client = Gemini::with_model(api_key, model_path)
            .map_err(|e| PlannerError::llm(format!("failed to build Gemini client: {}", e)))?;

        Ok(Self { client, model })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn invoke(&self, messages: &[LlmMessage]) -> Result<LlmResponse> {
        let system_prompt = messages
            .iter()
            .filter(|message| message.role == MessageRole::System)
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut request = self.client.generate_content();
        if !system_prompt.is_empty() {
            request = request.with_system_prompt(system_prompt);
        }
        for message in messages {
            request = match message.role {
                MessageRole::System => request,
                MessageRole::Human => request.with_user_message(message.content.clone()),
                MessageRole::Ai => request.with_model_message(message.content.clone()),
            };
        }

        tracing::debug!(model = %self.model, message_count = messages.len(), "gemini.request");

        let response = request
            .execute()
            .await
            .map_err(|e| PlannerError::llm(format!("Gemini request failed: {}", e)))?;

        let content = response.text();
        let usage = serde_json::to_value(&response)
            .ok()
            .map(|body| usage_from_body(&body))
            .unwrap_or_default();

        tracing::debug!(
            model = %self.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "gemini.response"
        );

        Ok(LlmResponse { content, usage })
    }
}

/// Read `usageMetadata` off a serialized response body. Missing counts are zero.
fn usage_from_body(body: &Value) -> TokenUsage {
    let metadata = body
        .get("usageMetadata")
        .or_else(|| body.get("usage_metadata"));

    let count = |camel: &str, snake: &str| -> u32 {
        metadata
            .and_then(|m| m.get(camel).or_else(|| m.get(snake)))
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };

    let prompt_tokens = count("promptTokenCount", "prompt_token_count");
    let completion_tokens = count("candidatesTokenCount", "candidates_token_count");
    let total_tokens = match count("totalTokenCount", "total_token_count") {
        0 => prompt_tokens + completion_tokens,
        total => total,
    };

    TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_from_camel_case_body() {
        let body = json!({
            "candidates": [],
            "usageMetadata": {
                "promptTokenCount": 1200,
                "candidatesTokenCount": 300,
                "totalTokenCount": 1500
            }
        });

        let usage = usage_from_body(&body);
        assert_eq!(usage.prompt_tokens, 1200);
        assert_eq!(usage.completion_tokens, 300);
        assert_eq!(usage.total_tokens, 1500);
    }

    #[test]
    fn test_usage_total_falls_back_to_sum() {
        let body = json!({
            "usage_metadata": {"prompt_token_count": 10, "candidates_token_count": 5}
        });
        assert_eq!(usage_from_body(&body).total_tokens, 15);
    }

    #[test]
    fn test_usage_missing_is_zero() {
        assert_eq!(usage_from_body(&json!({})), TokenUsage::default());
    }
}
