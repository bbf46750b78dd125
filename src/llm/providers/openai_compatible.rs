use async_trait::async_trait;

use crate::errors::{AndroidUseError, AndroidUseResult};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Provider for any OpenAI-compatible chat endpoint (OpenAI, OpenRouter,
/// Ollama, ...). `api_base` is the versioned root, e.g.
/// `https://api.openai.com/v1`; the completions path is appended here.
pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        cfg: &CallConfig,
    ) -> AndroidUseResult<LlmResponse> {
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "temperature": cfg.temperature,
            "max_tokens": cfg.max_tokens,
        });

        if cfg.json_response {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            "sending LLM request"
        );
        tracing::debug!(
            body = %{
                // Clone body and sanitize only for logging so the actual request
                // still contains the real image payloads.
                let mut log_body = body.clone();
                if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
                    for msg in msgs {
                        if let Some(content) = msg.get_mut("content") {
                            // content can be string or array of parts; we only touch the array case.
                            if let Some(parts) = content.as_array_mut() {
                                for part in parts {
                                    if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                                        if let Some(image_url) = part.get_mut("image_url") {
                                            if let Some(url) = image_url.get_mut("url") {
                                                *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                serde_json::to_string(&log_body).unwrap_or_default()
            },
            "request body (sanitized, base64 omitted)"
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(AndroidUseError::LlmProvider(format!(
                "{}: {}",
                status, err_body
            )));
        }

        let json: serde_json::Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        if content.is_empty() {
            return Err(AndroidUseError::LlmProvider(
                "response carried no message content".into(),
            ));
        }

        tracing::info!(
            provider = %self.id,
            content_len = content.len(),
            "LLM response received"
        );

        Ok(LlmResponse { content })
    }
}
