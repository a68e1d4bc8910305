use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

use crate::core::store::{ErrorStore, NewWorkOrder, WorkOrderStart};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum Priority {
    P0,
    P1,
    P2,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a work order is assigned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerRef {
    /// The operator. An empty name means the default user.
    User(String),
    Agent(String),
}

impl OwnerRef {
    /// Accepts `user`, `user:<name>`, `agent:<id>` and bare `<name>` (a user),
    /// ignoring case and surrounding whitespace of the prefix.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        let (prefix, rest) = match value.split_once(':') {
            Some((p, r)) => (p.trim().to_ascii_lowercase(), r.trim()),
            None => (value.to_ascii_lowercase(), ""),
        };
        match prefix.as_str() {
            "agent" if !rest.is_empty() => OwnerRef::Agent(rest.to_string()),
            "user" | "" => OwnerRef::User(rest.to_string()),
            _ => OwnerRef::User(value.to_string()),
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerRef::User(name) if name.is_empty() => f.write_str("user"),
            OwnerRef::User(name) => write!(f, "user:{name}"),
            OwnerRef::Agent(id) => write!(f, "agent:{id}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkOrderRequest {
    pub title: String,
    pub goal_md: String,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub owner: OwnerRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedWorkOrder {
    pub id: String,
    pub code: String,
    pub workflow_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartRequest {
    pub source: String,
    pub signature_hash: String,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedWorkOrder {
    pub operation_id: String,
    pub workflow_id: String,
    pub agent_id: Option<String>,
}

/// Creates trackable units of work and can kick one off. Work orders are
/// owned by the tracker; the pipeline never edits one after creating it.
#[async_trait]
pub trait WorkTracker: Send + Sync {
    async fn create(&self, request: WorkOrderRequest) -> Result<CreatedWorkOrder>;
    async fn start(&self, work_order_id: &str, request: StartRequest) -> Result<StartedWorkOrder>;
}

/// Work orders kept in the local store. Starting one marks it in progress
/// and hands it to the owning agent, if any.
pub struct LocalWorkTracker {
    store: ErrorStore,
}

impl LocalWorkTracker {
    pub fn new(store: ErrorStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl WorkTracker for LocalWorkTracker {
    async fn create(&self, request: WorkOrderRequest) -> Result<CreatedWorkOrder> {
        let record = self
            .store
            .create_work_order(&NewWorkOrder {
                title: request.title,
                goal_md: request.goal_md,
                priority: request.priority.to_string(),
                tags: request.tags,
                owner_id: Some(request.owner.to_string()),
            })
            .await?;
        Ok(CreatedWorkOrder {
            id: record.id,
            code: record.code,
            workflow_id: record.workflow_id,
        })
    }

    async fn start(&self, work_order_id: &str, request: StartRequest) -> Result<StartedWorkOrder> {
        let existing = self
            .store
            .get_work_order(work_order_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Work order {} not found", work_order_id))?;
        let agent_id = existing
            .owner_id
            .as_deref()
            .and_then(|owner| match OwnerRef::parse(owner) {
                OwnerRef::Agent(id) => Some(id),
                OwnerRef::User(_) => None,
            });
        let start = WorkOrderStart {
            workflow_id: uuid::Uuid::new_v4().to_string(),
            operation_id: uuid::Uuid::new_v4().to_string(),
            agent_id,
            source: format!("{}:{}", request.source, request.signature_hash),
        };
        let record = self
            .store
            .start_work_order(work_order_id, &start, request.force)
            .await?;
        Ok(StartedWorkOrder {
            operation_id: record.operation_id.unwrap_or(start.operation_id),
            workflow_id: record.workflow_id.unwrap_or(start.workflow_id),
            agent_id: record.agent_id,
        })
    }
}
