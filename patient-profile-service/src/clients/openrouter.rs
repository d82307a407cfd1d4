use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("LLM API request failed: {status} {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response format from LLM: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Raw OpenRouter chat-completions client, used for calls that carry images.
#[derive(Clone)]
pub struct OpenRouterClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Send one user message made of `content` parts and return the reply text.
    pub async fn chat(
        &self,
        model: &str,
        content: Vec<Value>,
        max_tokens: u32,
    ) -> Result<String, ChatError> {
        let payload = json!({
            "model": model,
            "messages": [
                {
                    "role": "user",
                    "content": content
                }
            ],
            "max_tokens": max_tokens
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| ChatError::InvalidResponse(e.to_string()))?;
        debug!(model, "Received chat completion");

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ChatError::InvalidResponse("missing choices[0].message.content".to_string()))?;

        Ok(content.to_string())
    }
}

pub fn text_part(text: impl Into<String>) -> Value {
    json!({ "type": "text", "text": text.into() })
}

pub fn png_part(base64_png: &str) -> Value {
    json!({
        "type": "image_url",
        "image_url": {
            "url": format!("data:image/png;base64,{}", base64_png)
        }
    })
}
