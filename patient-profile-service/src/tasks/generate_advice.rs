use async_trait::async_trait;
use chrono::Utc;
use graph_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::prompts::{ADVICE_PREAMBLE, advice_prompt};
use crate::clients::LanguageModel;
use crate::clients::json_reply::strip_code_fences;
use crate::models::{Advice, PatientProfile, session_keys};

const MAX_QUICK_TIPS: usize = 5;

pub const INSUFFICIENT_DATA_ADVICE: &str = "Insufficient data: no patient information could be \
extracted from the uploaded documents, so no personalized recommendations were generated. \
Upload clearer or more complete documents, or add details to the profile, and try again.";

/// Final stage. Running the session again regenerates the advice.
pub struct GenerateAdviceTask {
    llm: Arc<dyn LanguageModel>,
}

impl GenerateAdviceTask {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Task for GenerateAdviceTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        info!(task_id = %self.id(), "Generating health recommendations");

        let profile: PatientProfile = context
            .get(session_keys::PROFILE)
            .await
            .ok_or_else(|| GraphError::ContextError("patient profile not found".to_string()))?;

        let advice = if profile.is_empty() {
            warn!("Patient profile is empty, declining to generate advice");
            Advice {
                text: INSUFFICIENT_DATA_ADVICE.to_string(),
                sufficient_data: false,
                quick_tips: Vec::new(),
                generated_at: Utc::now(),
            }
        } else {
            match generate_advice(self.llm.as_ref(), &profile).await {
                Ok(advice) => advice,
                Err(e) => {
                    error!("Failed to generate advice: {}", e);
                    return Err(GraphError::TaskExecutionFailed(format!(
                        "Advice generation failed: {}",
                        e
                    )));
                }
            }
        };

        context.set(session_keys::ADVICE, &advice).await;

        let status = if advice.sufficient_data {
            "Recommendations generated"
        } else {
            "Not enough profile data for recommendations"
        };

        Ok(TaskResult::new_with_status(
            Some(advice.text),
            NextAction::End,
            Some(status.to_string()),
        ))
    }
}

pub async fn generate_advice(
    llm: &dyn LanguageModel,
    profile: &PatientProfile,
) -> anyhow::Result<Advice> {
    let response = llm.complete(ADVICE_PREAMBLE, &advice_prompt(profile)).await?;

    let text = strip_code_fences(&response);
    if text.is_empty() {
        return Err(anyhow::anyhow!("LLM returned empty advice"));
    }

    info!(chars = text.len(), "Advice generated");

    Ok(Advice {
        quick_tips: quick_tips(&text),
        text,
        sufficient_data: true,
        generated_at: Utc::now(),
    })
}

/// First few bullet points of the advice, without list markers or bold.
pub fn quick_tips(advice: &str) -> Vec<String> {
    advice
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| line.strip_prefix("• "))
        })
        .map(|tip| tip.replace("**", "").trim().to_string())
        .filter(|tip| !tip.is_empty())
        .take(MAX_QUICK_TIPS)
        .collect()
}
