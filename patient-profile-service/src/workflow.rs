use graph_flow::{FlowRunner, Graph, GraphBuilder, Session, SessionStorage, Task};
use std::sync::Arc;
use uuid::Uuid;

use crate::clients::PipelineClients;
use crate::models::{UploadedDocument, session_keys};
use crate::tasks::*;

pub const PROFILE_WORKFLOW_ID: &str = "patient_profile_workflow";

/// extract → merge → advise
pub fn build_profile_workflow(clients: &PipelineClients) -> Graph {
    let extract_task = Arc::new(ExtractDocumentsTask::new(clients.extractor.clone()));
    let extract_id = extract_task.id().to_string();

    let merge_task = Arc::new(MergeProfileTask::new(clients.llm.clone()));
    let merge_id = merge_task.id().to_string();

    let advice_task = Arc::new(GenerateAdviceTask::new(clients.llm.clone()));
    let advice_id = advice_task.id().to_string();

    GraphBuilder::new(PROFILE_WORKFLOW_ID)
        .add_task(extract_task)
        .add_task(merge_task)
        .add_task(advice_task)
        .add_edge(&extract_id, &merge_id)
        .add_edge(&merge_id, &advice_id)
        .build()
}

pub async fn create_profile_session(graph: &Graph, documents: Vec<UploadedDocument>) -> Session {
    let session_id = Uuid::new_v4().to_string();
    let start_task = graph
        .start_task_id()
        .unwrap_or(std::any::type_name::<ExtractDocumentsTask>());

    let mut session = Session::new_from_task(session_id, start_task);
    session.graph_id = graph.id.clone();
    session.context.set(session_keys::DOCUMENTS, documents).await;

    session
}

pub fn create_flow_runner(
    session_storage: Arc<dyn SessionStorage>,
    clients: &PipelineClients,
) -> FlowRunner {
    let graph = Arc::new(build_profile_workflow(clients));
    FlowRunner::new(graph, session_storage)
}

pub fn advice_task_id() -> &'static str {
    std::any::type_name::<GenerateAdviceTask>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Advice, FieldMap, PatientProfile};
    use crate::clients::TimeoutModel;
    use crate::testing::{FakeExtractor, ScriptedModel, StalledModel, document, fields};
    use std::time::Duration;
    use graph_flow::{ExecutionStatus, GraphError, InMemorySessionStorage};

    struct Harness {
        runner: FlowRunner,
        storage: Arc<dyn SessionStorage>,
        llm: Arc<ScriptedModel>,
    }

    fn harness(extractor: FakeExtractor, llm: ScriptedModel) -> Harness {
        let llm = Arc::new(llm);
        let clients = PipelineClients {
            extractor: Arc::new(extractor),
            llm: llm.clone(),
        };
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        Harness {
            runner: create_flow_runner(storage.clone(), &clients),
            storage,
            llm,
        }
    }

    async fn start(h: &Harness, documents: Vec<UploadedDocument>) -> String {
        let session = create_profile_session(h.runner.graph(), documents).await;
        let id = session.id.clone();
        h.storage.save(session).await.unwrap();
        id
    }

    async fn profile_of(h: &Harness, id: &str) -> Option<PatientProfile> {
        let session = h.storage.get(id).await.unwrap().unwrap();
        session.context.get(session_keys::PROFILE).await
    }

    #[tokio::test]
    async fn overlapping_fields_merge_into_one_canonical_key() {
        let h = harness(
            FakeExtractor::new()
                .with("consent.pdf", fields(&[("Signature", "John Doe")]))
                .with("intake.pdf", fields(&[("Name", "John Doe"), ("Age", "54")])),
            ScriptedModel::new(vec!["```json\n{\"Name\": \"John Doe\", \"Age\": \"54\"}\n```"]),
        );
        let id = start(&h, vec![document("consent.pdf"), document("intake.pdf")]).await;

        let result = h.runner.run(&id).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::WaitingForInput);

        let profile = profile_of(&h, &id).await.unwrap();
        assert_eq!(profile.fields.len(), 2);
        assert_eq!(profile.fields["Name"], "John Doe");
        assert_eq!(profile.sources, vec!["consent.pdf", "intake.pdf"]);

        // Both documents reach the merge prompt
        let prompts = h.llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("\"Signature\": \"John Doe\""));
        assert!(prompts[0].contains("Document 2 (intake.pdf)"));

        // Session now waits on the advice stage and the raw uploads are gone
        let session = h.storage.get(&id).await.unwrap().unwrap();
        assert_eq!(session.current_task_id, advice_task_id());
        assert!(!session.context.contains(session_keys::DOCUMENTS).await);
    }

    #[tokio::test]
    async fn extraction_failure_stops_before_merge() {
        let h = harness(
            FakeExtractor::new()
                .with("ok.pdf", fields(&[("Name", "Jane")]))
                .failing("broken.pdf"),
            ScriptedModel::new(vec!["{\"Name\": \"Jane\"}"]),
        );
        let id = start(&h, vec![document("ok.pdf"), document("broken.pdf")]).await;

        let err = h.runner.run(&id).await.unwrap_err();

        assert!(matches!(err, GraphError::TaskExecutionFailed(ref m) if m.contains("broken.pdf")));
        assert!(h.llm.prompts().is_empty());
        assert!(profile_of(&h, &id).await.is_none());
    }

    #[tokio::test]
    async fn hung_merge_call_fails_the_run() {
        let clients = PipelineClients {
            extractor: Arc::new(FakeExtractor::new().with("a.pdf", fields(&[("Name", "Jane")]))),
            llm: Arc::new(TimeoutModel::new(
                Arc::new(StalledModel),
                Duration::from_millis(50),
            )),
        };
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let runner = create_flow_runner(storage.clone(), &clients);
        let session = create_profile_session(runner.graph(), vec![document("a.pdf")]).await;
        let id = session.id.clone();
        storage.save(session).await.unwrap();

        let err = runner.run(&id).await.unwrap_err();

        assert!(matches!(err, GraphError::TaskExecutionFailed(ref m) if m.contains("timed out")));
        let session = storage.get(&id).await.unwrap().unwrap();
        assert!(!session.context.contains(session_keys::PROFILE).await);
    }

    #[tokio::test]
    async fn malformed_merge_reply_is_an_error() {
        let h = harness(
            FakeExtractor::new().with("a.pdf", fields(&[("Name", "Jane")])),
            ScriptedModel::new(vec!["Sorry, I cannot help with that."]),
        );
        let id = start(&h, vec![document("a.pdf")]).await;

        let err = h.runner.run(&id).await.unwrap_err();
        assert!(matches!(err, GraphError::TaskExecutionFailed(ref m) if m.contains("Profile merge failed")));
    }

    #[tokio::test]
    async fn empty_profile_is_flagged_instead_of_advised() {
        let h = harness(
            FakeExtractor::new().with("blank.png", FieldMap::new()),
            ScriptedModel::new(vec![]),
        );
        let id = start(&h, vec![document("blank.png")]).await;

        h.runner.run(&id).await.unwrap();
        assert!(profile_of(&h, &id).await.unwrap().is_empty());

        let result = h.runner.run(&id).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);

        let session = h.storage.get(&id).await.unwrap().unwrap();
        let advice: Advice = session.context.get(session_keys::ADVICE).await.unwrap();
        assert!(!advice.sufficient_data);
        assert!(advice.text.starts_with("Insufficient data"));
        // Neither merge nor advice reached the model
        assert!(h.llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn advice_is_generated_and_can_be_regenerated() {
        let h = harness(
            FakeExtractor::new().with("a.pdf", fields(&[("Name", "Jane"), ("Condition", "Type 2 diabetes")])),
            ScriptedModel::new(vec![
                "{\"Name\": \"Jane\", \"Condition\": \"Type 2 diabetes\"}",
                "# Health Goals & Recommendations\n\n## Daily Goals\n- Check fasting glucose.",
                "```markdown\n# Health Goals & Recommendations\n\n## Daily Goals\n- Walk after lunch.\n```",
            ]),
        );
        let id = start(&h, vec![document("a.pdf")]).await;
        h.runner.run(&id).await.unwrap();

        let first = h.runner.run(&id).await.unwrap();
        assert_eq!(first.status, ExecutionStatus::Completed);
        assert!(first.response.unwrap().contains("Check fasting glucose"));

        let second = h.runner.run(&id).await.unwrap();
        let session = h.storage.get(&id).await.unwrap().unwrap();
        let advice: Advice = session.context.get(session_keys::ADVICE).await.unwrap();

        assert!(second.response.unwrap().contains("Walk after lunch"));
        assert!(advice.sufficient_data);
        assert!(!advice.text.starts_with("```"));
        assert_eq!(advice.quick_tips, vec!["Walk after lunch."]);
        assert!(h.llm.prompts()[1].contains("Type 2 diabetes"));
    }

    #[tokio::test]
    async fn same_documents_produce_the_same_key_set() {
        let reply = "{\"Name\": \"John Doe\", \"Blood Pressure\": \"120/80\"}";
        let reworded = "{\"Name\": \"John A. Doe\", \"Blood Pressure\": \"120 / 80\"}";
        let h = harness(
            FakeExtractor::new()
                .with("exam.pdf", fields(&[("Patient", "John Doe"), ("BP", "120/80")]))
                .with("nutrition.pdf", fields(&[("Last Name", "Doe"), ("First Name", "John")])),
            ScriptedModel::new(vec![reply, reworded]),
        );

        let mut key_sets = Vec::new();
        for _ in 0..2 {
            let id = start(&h, vec![document("exam.pdf"), document("nutrition.pdf")]).await;
            h.runner.run(&id).await.unwrap();
            let profile = profile_of(&h, &id).await.unwrap();
            key_sets.push(profile.fields.keys().cloned().collect::<Vec<_>>());
        }

        assert_eq!(key_sets[0], key_sets[1]);
    }
}
