use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::prompts::{MERGE_PREAMBLE, has_content, merge_prompt};
use crate::clients::LanguageModel;
use crate::clients::json_reply::{flatten_fields, parse_json_object};
use crate::models::{ExtractedDocument, FieldMap, PatientProfile, session_keys};

/// Asks the LLM to fold every document's fields into one profile, then stops
/// so the profile can be reviewed before advice is generated.
pub struct MergeProfileTask {
    llm: Arc<dyn LanguageModel>,
}

impl MergeProfileTask {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Task for MergeProfileTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let extracted: Vec<ExtractedDocument> = context
            .get(session_keys::EXTRACTED_DOCUMENTS)
            .await
            .ok_or_else(|| GraphError::ContextError("extracted_documents not found".to_string()))?;

        info!(
            task_id = %self.id(),
            document_count = extracted.len(),
            "Merging extracted fields into patient profile"
        );

        let fields = if !extracted.iter().any(has_content) {
            warn!("No fields were extracted from any document, skipping merge");
            FieldMap::new()
        } else {
            match merge_field_maps(self.llm.as_ref(), &extracted).await {
                Ok(fields) => fields,
                Err(e) => {
                    error!("Failed to merge profile: {}", e);
                    return Err(GraphError::TaskExecutionFailed(format!(
                        "Profile merge failed: {}",
                        e
                    )));
                }
            }
        };

        let sources = extracted.iter().map(|d| d.file_name.clone()).collect();
        let profile = PatientProfile::new(fields, sources);
        let field_count = profile.fields.len();

        context.set(session_keys::PROFILE, &profile).await;
        // Advice from an earlier profile no longer applies
        context.remove(session_keys::ADVICE).await;

        info!(field_count, "Patient profile merged");

        Ok(TaskResult::new_with_status(
            Some(format!("Patient profile ready with {} field(s)", field_count)),
            NextAction::Continue,
            Some("Profile ready for review".to_string()),
        ))
    }
}

pub async fn merge_field_maps(
    llm: &dyn LanguageModel,
    documents: &[ExtractedDocument],
) -> anyhow::Result<FieldMap> {
    let prompt = merge_prompt(documents);
    let response = llm.complete(MERGE_PREAMBLE, &prompt).await?;

    let object = parse_json_object(&response)?;
    Ok(flatten_fields(&object))
}
