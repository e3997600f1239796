//! Per-node mutual exclusion for whoever schedules workflow runs.
//!
//! Two runs issuing verbs against the same node would fight each other, and
//! the engine does nothing to prevent it. Hold a [`NodeGuard`] for the
//! node's id around every run.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

type LockTable = DashMap<String, Arc<Mutex<()>>>;

#[derive(Debug, Clone, Default)]
pub struct NodeLocks {
    table: Arc<LockTable>,
}

impl NodeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `node_id`.
    pub async fn acquire(&self, node_id: &str) -> NodeGuard {
        let mutex = self.table.entry(node_id.to_string()).or_default().clone();
        if mutex.try_lock().is_err() {
            debug!(node = %node_id, "Waiting for another run on this node to finish");
        }
        let guard = mutex.lock_owned().await;
        NodeGuard {
            node_id: node_id.to_string(),
            table: self.table.clone(),
            guard: Some(guard),
        }
    }

    /// Run `work` while holding the lock for `node_id`.
    pub async fn run_exclusive<F, T>(&self, node_id: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire(node_id).await;
        work.await
    }

    /// Number of nodes with a holder or waiter.
    pub fn active(&self) -> usize {
        self.table.len()
    }
}

/// Releases the node on drop and forgets the entry once nobody else wants it.
#[derive(Debug)]
pub struct NodeGuard {
    node_id: String,
    table: Arc<LockTable>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl NodeGuard {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the table's own handle left means no holder and no waiter.
        self.table
            .remove_if(&self.node_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
