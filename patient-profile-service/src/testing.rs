//! In-process stand-ins for the extraction API and the LLM.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::clients::{DocumentExtractor, ExtractionError, LanguageModel};
use crate::models::{DocumentKind, ExtractedDocument, FieldMap, UploadedDocument};

pub fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn document(file_name: &str) -> UploadedDocument {
    UploadedDocument {
        id: format!("id-{}", file_name),
        file_name: file_name.to_string(),
        kind: DocumentKind::detect(file_name, b"").unwrap_or(DocumentKind::Pdf),
        bytes: b"%PDF-1.4 test".to_vec(),
    }
}

/// Returns canned fields per file name; unknown or failing names error out.
#[derive(Default)]
pub struct FakeExtractor {
    results: HashMap<String, Option<FieldMap>>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file_name: &str, fields: FieldMap) -> Self {
        self.results.insert(file_name.to_string(), Some(fields));
        self
    }

    pub fn failing(mut self, file_name: &str) -> Self {
        self.results.insert(file_name.to_string(), None);
        self
    }
}

#[async_trait]
impl DocumentExtractor for FakeExtractor {
    fn name(&self) -> &str {
        "fake"
    }

    async fn extract(&self, document: &UploadedDocument) -> Result<ExtractedDocument, ExtractionError> {
        match self.results.get(&document.file_name) {
            Some(Some(fields)) => Ok(ExtractedDocument {
                document_id: document.id.clone(),
                file_name: document.file_name.clone(),
                fields: fields.clone(),
                markdown: None,
            }),
            _ => Err(ExtractionError::Api {
                status: 500,
                body: "extraction service unavailable".to_string(),
            }),
        }
    }
}

/// Replies with queued responses in order and records every prompt it sees.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _preamble: &str, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("LLM API request failed: 503 Service Unavailable"))
    }
}

/// Never answers; stands in for a hung LLM connection.
pub struct StalledModel;

#[async_trait]
impl LanguageModel for StalledModel {
    async fn complete(&self, _preamble: &str, _prompt: &str) -> anyhow::Result<String> {
        std::future::pending().await
    }
}
