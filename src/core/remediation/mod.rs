//! Turns an error signature into a tracked work order, optionally started.

pub mod goal;
pub mod priority;

use anyhow::{Result, bail};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::audit::{AuditSink, record_best_effort};
use crate::core::classifier::Classification;
use crate::core::store::{InsightRecord, SignatureAggregate};
use crate::core::trend::Spike;
use crate::core::work::{OwnerRef, Priority, StartRequest, WorkOrderRequest, WorkTracker};

pub use priority::priority_for;

pub const START_SOURCE: &str = "error_remediation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationMode {
    #[default]
    Create,
    CreateAndStart,
}

impl RemediationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RemediationMode::Create => "create",
            RemediationMode::CreateAndStart => "create_and_start",
        }
    }
}

impl fmt::Display for RemediationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemediationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "create" => Ok(RemediationMode::Create),
            "create_and_start" => Ok(RemediationMode::CreateAndStart),
            other => bail!("Unknown remediation mode '{}'", other),
        }
    }
}

/// What the orchestrator needs to know about one signature.
#[derive(Debug, Clone)]
pub struct RemediationContext {
    pub signature: SignatureAggregate,
    pub classification: Classification,
    pub window_count: i64,
    pub window_days: u32,
    pub spike: Spike,
    pub insight: Option<InsightRecord>,
}

impl RemediationContext {
    pub fn priority(&self) -> Priority {
        priority_for(
            self.classification.severity,
            self.classification.actionable,
            self.spike.detected,
            self.window_count,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RemediationResult {
    pub work_order_id: String,
    pub code: String,
    pub mode: RemediationMode,
    pub priority: Priority,
    pub started: bool,
    pub operation_id: Option<String>,
    pub workflow_id: Option<String>,
    pub agent_id: Option<String>,
    pub start_error: Option<String>,
}

pub struct RemediationOrchestrator {
    tracker: Arc<dyn WorkTracker>,
    audit: Arc<dyn AuditSink>,
    owner: OwnerRef,
}

impl RemediationOrchestrator {
    pub fn new(tracker: Arc<dyn WorkTracker>, audit: Arc<dyn AuditSink>, owner: &str) -> Self {
        Self {
            tracker,
            audit,
            owner: OwnerRef::parse(owner),
        }
    }

    /// Creates the work order and, in `CreateAndStart` mode, asks the tracker
    /// to start it. A failed start is reported in the result; the created
    /// order is kept either way.
    pub async fn remediate(
        &self,
        ctx: &RemediationContext,
        mode: RemediationMode,
    ) -> Result<RemediationResult> {
        let hash = &ctx.signature.signature_hash;
        let priority = ctx.priority();
        let request = WorkOrderRequest {
            title: goal::build_title(ctx),
            goal_md: goal::build_goal(ctx),
            priority,
            tags: goal::build_tags(ctx),
            owner: self.owner.clone(),
        };
        let title = request.title.clone();
        let created = self.tracker.create(request).await?;
        info!(
            "Created work order {} ({}) for error signature {}",
            created.code, priority, hash
        );

        record_best_effort(
            self.audit.as_ref(),
            "work_order.created",
            &format!("Work order {} created: {}", created.code, title),
            serde_json::json!({
                "workOrderId": created.id,
                "code": created.code,
                "priority": priority,
            }),
        )
        .await;
        record_best_effort(
            self.audit.as_ref(),
            "error_remediation.created",
            &format!("Remediation work order {} created for error signature", created.code),
            serde_json::json!({
                "workOrderId": created.id,
                "mode": mode,
                "priority": priority,
                "category": ctx.classification.category,
                "severity": ctx.classification.severity,
                "signatureHash": hash,
                "workflowId": created.workflow_id,
            }),
        )
        .await;

        let mut result = RemediationResult {
            work_order_id: created.id.clone(),
            code: created.code.clone(),
            mode,
            priority,
            started: false,
            operation_id: None,
            workflow_id: created.workflow_id.clone(),
            agent_id: None,
            start_error: None,
        };
        if mode == RemediationMode::Create {
            return Ok(result);
        }

        let start = StartRequest {
            source: START_SOURCE.to_string(),
            signature_hash: hash.clone(),
            force: false,
        };
        match self.tracker.start(&created.id, start).await {
            Ok(started) => {
                info!("Started work order {} (operation {})", created.code, started.operation_id);
                record_best_effort(
                    self.audit.as_ref(),
                    "error_remediation.started",
                    &format!("Remediation work order {} started", created.code),
                    serde_json::json!({
                        "workOrderId": created.id,
                        "signatureHash": hash,
                        "operationId": started.operation_id,
                        "workflowId": started.workflow_id,
                        "agentId": started.agent_id,
                    }),
                )
                .await;
                result.started = true;
                result.operation_id = Some(started.operation_id);
                result.workflow_id = Some(started.workflow_id);
                result.agent_id = started.agent_id;
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Failed to start work order {}: {}", created.code, message);
                record_best_effort(
                    self.audit.as_ref(),
                    "error_remediation.start_failed",
                    &format!("Remediation work order {} could not be started", created.code),
                    serde_json::json!({
                        "workOrderId": created.id,
                        "signatureHash": hash,
                        "error": message,
                    }),
                )
                .await;
                result.start_error = Some(message);
            }
        }
        Ok(result)
    }
}
