use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Context for sharing data between tasks in a graph execution.
///
/// Values are stored as JSON, so anything `Serialize` can go in and anything
/// `DeserializeOwned` can come out. Clones share the same underlying map;
/// use [`Context::fork`] for an independent copy.
#[derive(Clone, Debug)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: impl serde::Serialize) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.data.insert(key, value);
            }
            Err(e) => warn!(key = %key, "Failed to serialize context value: {}", e),
        }
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    /// Copy of the current values that no longer shares storage with `self`.
    pub fn fork(&self) -> Self {
        let data = DashMap::with_capacity(self.data.len());
        for entry in self.data.iter() {
            data.insert(entry.key().clone(), entry.value().clone());
        }
        Self {
            data: Arc::new(data),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
