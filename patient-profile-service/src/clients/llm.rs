use async_trait::async_trait;
use rig::{agent::Agent, client::CompletionClient, completion::Prompt, providers::openrouter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Text-in, text-out model used by the merge and advice stages.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, preamble: &str, prompt: &str) -> anyhow::Result<String>;
}

/// OpenRouter-backed model built on rig agents
pub struct OpenRouterModel {
    client: openrouter::Client,
    model: String,
}

impl OpenRouterModel {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        Self {
            client: openrouter::Client::new(api_key),
            model: model.into(),
        }
    }

    fn agent(&self, preamble: &str) -> Agent<openrouter::CompletionModel> {
        self.client
            .agent(&self.model)
            .preamble(preamble)
            .temperature(0.2)
            .build()
    }
}

#[async_trait]
impl LanguageModel for OpenRouterModel {
    async fn complete(&self, preamble: &str, prompt: &str) -> anyhow::Result<String> {
        let response = self.agent(preamble).prompt(prompt).await?;
        info!(
            model = %self.model,
            chars = response.len(),
            "LLM completion received"
        );
        Ok(response)
    }
}

/// Bounds every completion of the wrapped model by `timeout`.
pub struct TimeoutModel {
    inner: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl TimeoutModel {
    pub fn new(inner: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl LanguageModel for TimeoutModel {
    async fn complete(&self, preamble: &str, prompt: &str) -> anyhow::Result<String> {
        match tokio::time::timeout(self.timeout, self.inner.complete(preamble, prompt)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.timeout, "LLM request timed out");
                Err(anyhow::anyhow!("LLM request timed out after {:?}", self.timeout))
            }
        }
    }
}
