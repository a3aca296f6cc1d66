use std::{collections::HashMap, sync::Arc};

use bedrock_process::RunId;
use tokio::sync::RwLock;

use crate::{
    error::{Result, SupervisorError},
    world_process::WorldProcess,
};

/// Entries that belong to one run of a world.
pub trait RunScoped {
    fn run_id(&self) -> &RunId;
}

/// Live worlds keyed by name. At most one entry per name.
pub struct ProcessRegistry<T = WorldProcess> {
    inner: Arc<RwLock<HashMap<String, Arc<T>>>>,
}

impl<T> Clone for ProcessRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for ProcessRegistry<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: RunScoped> ProcessRegistry<T> {
    pub async fn register(&self, name: &str, entry: Arc<T>) -> Result<()> {
        let mut map = self.inner.write().await;
        if map.contains_key(name) {
            return Err(SupervisorError::AlreadyRunning(name.to_string()));
        }
        map.insert(name.to_string(), entry);
        Ok(())
    }

    pub async fn lookup(&self, name: &str) -> Result<Arc<T>> {
        self.inner
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(format!("world {name}")))
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.inner.read().await.contains_key(name)
    }

    /// Removes the entry if present.
    pub async fn remove(&self, name: &str) -> Option<Arc<T>> {
        self.inner.write().await.remove(name)
    }

    /// Removes the entry only while it still belongs to `run_id`, so a finished
    /// run never evicts a newer one.
    pub async fn remove_run(&self, name: &str, run_id: &RunId) -> bool {
        let mut map = self.inner.write().await;
        match map.get(name) {
            Some(entry) if entry.run_id() == run_id => {
                map.remove(name);
                true
            }
            _ => false,
        }
    }

    pub async fn snapshot(&self) -> Vec<Arc<T>> {
        self.inner.read().await.values().cloned().collect()
    }
}
