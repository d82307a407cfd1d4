pub mod extraction;
pub mod json_reply;
pub mod llm;
pub mod markdown_fields;
pub mod openrouter;

pub use extraction::{AgenticDocExtractor, DocumentExtractor, ExtractionError, VisionLlmExtractor};
pub use llm::{LanguageModel, OpenRouterModel, TimeoutModel};
pub use openrouter::OpenRouterClient;

use std::sync::Arc;

use crate::config::{Config, ExtractionBackend};

/// The two external services the pipeline talks to
#[derive(Clone)]
pub struct PipelineClients {
    pub extractor: Arc<dyn DocumentExtractor>,
    pub llm: Arc<dyn LanguageModel>,
}

impl PipelineClients {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let extractor: Arc<dyn DocumentExtractor> = match &config.extraction {
            ExtractionBackend::AgenticDoc { api_key, api_url } => Arc::new(
                AgenticDocExtractor::new(http.clone(), api_url.clone(), api_key.clone()),
            ),
            ExtractionBackend::VisionLlm { model } => {
                let client = OpenRouterClient::new(
                    http.clone(),
                    config.openrouter_base_url.clone(),
                    config.openrouter_api_key.clone(),
                );
                Arc::new(VisionLlmExtractor::new(client, model.clone()))
            }
        };

        let model = OpenRouterModel::new(&config.openrouter_api_key, config.llm_model.clone());
        let llm = Arc::new(TimeoutModel::new(Arc::new(model), config.request_timeout));

        Ok(Self { extractor, llm })
    }
}
