use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use crate::model::{ToolId, ToolRef, UserId};

/// Read-only view of the tool catalog and user accounts, both owned elsewhere.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn tool(&self, id: ToolId) -> Option<ToolRef>;
    async fn user_exists(&self, id: UserId) -> bool;
}

/// Directory kept in process memory, for embedding and tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    tools: DashMap<ToolId, ToolRef>,
    users: DashSet<UserId>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, id: UserId) {
        self.users.insert(id);
    }

    /// Registers (or re-homes) a tool. The owner is not implicitly added as a user.
    pub fn add_tool(&self, id: ToolId, owner_id: UserId) -> ToolRef {
        let tool = ToolRef { id, owner_id };
        self.tools.insert(id, tool);
        tool
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn tool(&self, id: ToolId) -> Option<ToolRef> {
        self.tools.get(&id).map(|e| *e.value())
    }

    async fn user_exists(&self, id: UserId) -> bool {
        self.users.contains(&id)
    }
}
