pub mod context;
pub mod error;
pub mod graph;
pub mod runner;
pub mod storage;
pub mod task;

// Re-export commonly used types
pub use context::Context;
pub use error::{GraphError, Result};
pub use graph::{ExecutionResult, ExecutionStatus, Graph, GraphBuilder};
pub use runner::FlowRunner;
pub use storage::{InMemorySessionStorage, Session, SessionStorage};
pub use task::{NextAction, Task, TaskResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct AppendTask {
        id: &'static str,
        next: NextAction,
    }

    #[async_trait]
    impl Task for AppendTask {
        fn id(&self) -> &str {
            self.id
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            let mut trail: Vec<String> = context.get("trail").await.unwrap_or_default();
            trail.push(self.id.to_string());
            context.set("trail", trail).await;

            Ok(TaskResult::new_with_status(
                Some(format!("{} done", self.id)),
                self.next.clone(),
                Some(format!("ran {}", self.id)),
            ))
        }
    }

    struct FailingTask;

    #[async_trait]
    impl Task for FailingTask {
        fn id(&self) -> &str {
            "failing"
        }

        async fn run(&self, _context: Context) -> Result<TaskResult> {
            Err(GraphError::TaskExecutionFailed("upstream unavailable".to_string()))
        }
    }

    /// Writes to its context, then deletes or re-saves its own stored session.
    struct InterferingTask {
        storage: Arc<dyn SessionStorage>,
        delete: bool,
    }

    #[async_trait]
    impl Task for InterferingTask {
        fn id(&self) -> &str {
            "interfering"
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            context.set("written", true).await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            if self.delete {
                self.storage.delete("s1").await?;
            } else if let Some(session) = self.storage.get("s1").await? {
                self.storage.save(session).await?;
            }
            Ok(TaskResult::new(None, NextAction::End))
        }
    }

    async fn interfering_runner(delete: bool) -> (FlowRunner, Arc<dyn SessionStorage>) {
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        storage
            .save(Session::new_from_task("s1".to_string(), "interfering"))
            .await
            .unwrap();
        let graph = GraphBuilder::new("interfering")
            .add_task(Arc::new(InterferingTask {
                storage: storage.clone(),
                delete,
            }))
            .build();
        (FlowRunner::new(Arc::new(graph), storage.clone()), storage)
    }

    fn task(id: &'static str, next: NextAction) -> Arc<dyn Task> {
        Arc::new(AppendTask { id, next })
    }

    fn three_stage_graph() -> Graph {
        GraphBuilder::new("stages")
            .add_task(task("extract", NextAction::ContinueAndExecute))
            .add_task(task("merge", NextAction::Continue))
            .add_task(task("advise", NextAction::End))
            .add_edge("extract", "merge")
            .add_edge("merge", "advise")
            .build()
    }

    #[tokio::test]
    async fn continue_and_execute_chains_until_continue() {
        let graph = three_stage_graph();
        let mut session = Session::new_from_task("s1".to_string(), "extract");

        let result = graph.execute_session(&mut session).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::WaitingForInput);
        assert_eq!(result.response.as_deref(), Some("merge done"));
        assert_eq!(session.current_task_id, "advise");
        assert_eq!(session.status_message.as_deref(), Some("ran merge"));

        let trail: Vec<String> = session.context.get("trail").await.unwrap();
        assert_eq!(trail, vec!["extract", "merge"]);
    }

    #[tokio::test]
    async fn end_keeps_task_current_so_rerun_repeats_it() {
        let graph = three_stage_graph();
        let mut session = Session::new_from_task("s1".to_string(), "advise");

        let first = graph.execute_session(&mut session).await.unwrap();
        let second = graph.execute_session(&mut session).await.unwrap();

        assert_eq!(first.status, ExecutionStatus::Completed);
        assert_eq!(second.status, ExecutionStatus::Completed);
        assert_eq!(session.current_task_id, "advise");

        let trail: Vec<String> = session.context.get("trail").await.unwrap();
        assert_eq!(trail, vec!["advise", "advise"]);
    }

    #[tokio::test]
    async fn failure_stops_the_chain_on_the_failing_task() {
        let graph = GraphBuilder::new("failing")
            .add_task(Arc::new(FailingTask))
            .add_task(task("merge", NextAction::End))
            .add_edge("failing", "merge")
            .build();
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        storage
            .save(Session::new_from_task("s1".to_string(), "failing"))
            .await
            .unwrap();

        let runner = FlowRunner::new(Arc::new(graph), storage.clone());
        let err = runner.run("s1").await.unwrap_err();
        assert!(matches!(err, GraphError::TaskExecutionFailed(_)));

        let session = storage.get("s1").await.unwrap().unwrap();
        assert_eq!(session.current_task_id, "failing");
        assert!(!session.context.contains("trail").await);
    }

    #[tokio::test]
    async fn deleted_session_is_not_brought_back() {
        let (runner, storage) = interfering_runner(true).await;

        let err = runner.run("s1").await.unwrap_err();

        assert!(matches!(err, GraphError::SessionNotFound(_)));
        assert!(storage.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_save_wins_over_the_run() {
        let (runner, storage) = interfering_runner(false).await;

        let err = runner.run("s1").await.unwrap_err();

        assert!(matches!(err, GraphError::SessionConflict(_)));
        let session = storage.get("s1").await.unwrap().unwrap();
        assert!(!session.context.contains("written").await);
    }

    #[tokio::test]
    async fn loaded_sessions_do_not_share_context_with_storage() {
        let storage = InMemorySessionStorage::new();
        storage
            .save(Session::new_from_task("s1".to_string(), "extract"))
            .await
            .unwrap();

        let loaded = storage.get("s1").await.unwrap().unwrap();
        loaded.context.set("draft", 1u8).await;

        let again = storage.get("s1").await.unwrap().unwrap();
        assert!(!again.context.contains("draft").await);

        storage.save(loaded).await.unwrap();
        let saved = storage.get("s1").await.unwrap().unwrap();
        assert_eq!(saved.context.get::<u8>("draft").await, Some(1));
    }

    #[tokio::test]
    async fn runner_reports_unknown_sessions() {
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(Arc::new(three_stage_graph()), storage);

        let err = runner.run("missing").await.unwrap_err();
        assert!(matches!(err, GraphError::SessionNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn unknown_current_task_is_an_error() {
        let graph = three_stage_graph();
        let mut session = Session::new_from_task("s1".to_string(), "nowhere");

        let err = graph.execute_session(&mut session).await.unwrap_err();
        assert!(matches!(err, GraphError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn first_task_is_the_start_task() {
        let graph = three_stage_graph();
        assert_eq!(graph.start_task_id(), Some("extract"));
        assert_eq!(graph.find_next_task("advise"), None);
    }

    #[tokio::test]
    async fn purge_idle_drops_only_stale_sessions() {
        let storage = InMemorySessionStorage::new();
        storage
            .save(Session::new_from_task("fresh".to_string(), "extract"))
            .await
            .unwrap();

        let removed = storage
            .purge_idle(chrono::Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(storage.len(), 1);

        let removed = storage
            .purge_idle(chrono::Duration::seconds(-1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn context_round_trips_typed_values() {
        let context = Context::new();
        context.set("count", 3u32).await;

        assert_eq!(context.get::<u32>("count").await, Some(3));
        assert_eq!(context.get::<String>("count").await, None);
        assert!(context.remove("count").await.is_some());
        assert!(!context.contains("count").await);
    }
}
