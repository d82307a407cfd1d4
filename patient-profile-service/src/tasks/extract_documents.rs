use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{error, info};

use crate::clients::DocumentExtractor;
use crate::models::{ExtractedDocument, UploadedDocument, session_keys};

/// Sends every uploaded document to the extraction backend, one at a time.
/// The first failure stops the flow before anything is merged.
pub struct ExtractDocumentsTask {
    extractor: Arc<dyn DocumentExtractor>,
}

impl ExtractDocumentsTask {
    pub fn new(extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Task for ExtractDocumentsTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let documents: Vec<UploadedDocument> = context
            .get(session_keys::DOCUMENTS)
            .await
            .ok_or_else(|| GraphError::ContextError("documents not found".to_string()))?;

        if documents.is_empty() {
            return Err(GraphError::TaskExecutionFailed(
                "No documents to extract".to_string(),
            ));
        }

        info!(
            task_id = %self.id(),
            backend = %self.extractor.name(),
            document_count = documents.len(),
            "Starting document extraction"
        );

        let mut extracted: Vec<ExtractedDocument> = Vec::with_capacity(documents.len());
        for document in &documents {
            match self.extractor.extract(document).await {
                Ok(result) => {
                    info!(
                        document = %document.file_name,
                        field_count = result.fields.len(),
                        "Document extracted"
                    );
                    extracted.push(result);
                }
                Err(e) => {
                    error!(document = %document.file_name, "Extraction failed: {}", e);
                    return Err(GraphError::TaskExecutionFailed(format!(
                        "Extraction failed for '{}': {}",
                        document.file_name, e
                    )));
                }
            }
        }

        let field_count: usize = extracted.iter().map(|d| d.fields.len()).sum();
        let file_names: Vec<String> = documents.iter().map(|d| d.file_name.clone()).collect();

        context.set(session_keys::EXTRACTED_DOCUMENTS, &extracted).await;
        context.set(session_keys::PROCESSED_DOCUMENTS, &file_names).await;
        // Raw uploads are not needed past this point
        context.remove(session_keys::DOCUMENTS).await;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(format!(
                "Extracted {} field(s) from {} document(s)",
                field_count,
                extracted.len()
            )),
        ))
    }
}
