//! FlowRunner – loads a session, executes the graph from its current task and
//! persists the updated session back to storage.
//!
//! Create it once at startup and share it across request handlers:
//!
//! ```ignore
//! let result = state.flow_runner.run(&session_id).await?;
//! ```
//!
//! When a task fails the session is still saved, so the caller can record
//! the error on it and a later run retries from the failing task.
//!
//! The session is only written back if nobody else saved or deleted it while
//! the tasks were running; otherwise the run's changes are dropped.

use std::sync::Arc;
use tracing::warn;

use crate::{
    error::{GraphError, Result},
    graph::{ExecutionResult, Graph},
    storage::SessionStorage,
};

/// High-level helper that orchestrates the common _load → execute → save_ pattern.
#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
    storage: Arc<dyn SessionStorage>,
}

impl FlowRunner {
    pub fn new(graph: Arc<Graph>, storage: Arc<dyn SessionStorage>) -> Self {
        Self { graph, storage }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub async fn run(&self, session_id: &str) -> Result<ExecutionResult> {
        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| GraphError::SessionNotFound(session_id.to_string()))?;

        let loaded_at = session.updated_at;
        let result = self.graph.execute_session(&mut session).await;

        match self.storage.get(session_id).await? {
            Some(current) if current.updated_at == loaded_at => {
                self.storage.save(session).await?;
            }
            Some(_) => {
                warn!(session_id, "Session changed during run, discarding results");
                return Err(GraphError::SessionConflict(session_id.to_string()));
            }
            None => {
                warn!(session_id, "Session removed during run, discarding results");
                return Err(GraphError::SessionNotFound(session_id.to_string()));
            }
        }

        result
    }
}
