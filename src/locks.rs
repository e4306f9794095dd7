use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::ToolId;

/// One async mutex per tool. Different tools never contend.
///
/// Not reentrant: a holder must not lock the same tool on the same instance again.
///
/// Entries are never evicted. Memory grows with the number of distinct tools
/// ever locked, which the tool catalog bounds.
#[derive(Default)]
pub struct ToolLocks {
    locks: DashMap<ToolId, Arc<Mutex<()>>>,
}

impl ToolLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, tool_id: ToolId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the DashMap shard is released before awaiting.
        let mutex = self.locks.entry(tool_id).or_default().value().clone();
        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.len()
    }
}
