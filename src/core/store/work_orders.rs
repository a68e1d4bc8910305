use anyhow::{Result, bail};
use rusqlite::{OptionalExtension, Row, params};

use super::ErrorStore;
use super::types::WorkOrderRecord;

/// Fields the caller supplies when opening a work order.
#[derive(Debug, Clone)]
pub struct NewWorkOrder {
    pub title: String,
    pub goal_md: String,
    pub priority: String,
    pub tags: Vec<String>,
    pub owner_id: Option<String>,
}

/// Identifiers assigned when a work order is started.
#[derive(Debug, Clone)]
pub struct WorkOrderStart {
    pub workflow_id: String,
    pub operation_id: String,
    pub agent_id: Option<String>,
    pub source: String,
}

const WORK_ORDER_COLUMNS: &str = "id, code, title, goal_md, priority, tags_json, owner_id, status, \
     workflow_id, operation_id, agent_id, start_source, created_at, started_at";

fn work_order_from_row(row: &Row<'_>) -> rusqlite::Result<WorkOrderRecord> {
    let tags_json: String = row.get(5)?;
    Ok(WorkOrderRecord {
        id: row.get(0)?,
        code: row.get(1)?,
        title: row.get(2)?,
        goal_md: row.get(3)?,
        priority: row.get(4)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        owner_id: row.get(6)?,
        status: row.get(7)?,
        workflow_id: row.get(8)?,
        operation_id: row.get(9)?,
        agent_id: row.get(10)?,
        start_source: row.get(11)?,
        created_at: row.get(12)?,
        started_at: row.get(13)?,
    })
}

impl ErrorStore {
    /// Inserts a `todo` work order and assigns it the next `WO-<n>` code.
    pub async fn create_work_order(&self, order: &NewWorkOrder) -> Result<WorkOrderRecord> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();
        let next_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM work_orders",
            [],
            |row| row.get(0),
        )?;
        let code = format!("WO-{next_seq}");
        tx.execute(
            "INSERT INTO work_orders
                (seq, id, code, title, goal_md, priority, tags_json, owner_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'todo', ?9)",
            params![
                next_seq,
                id,
                code,
                order.title,
                order.goal_md,
                order.priority,
                serde_json::to_string(&order.tags)?,
                order.owner_id,
                now
            ],
        )?;
        let record = tx.query_row(
            &format!("SELECT {WORK_ORDER_COLUMNS} FROM work_orders WHERE id = ?1"),
            params![id],
            work_order_from_row,
        )?;
        tx.commit()?;
        Ok(record)
    }

    pub async fn get_work_order(&self, id: &str) -> Result<Option<WorkOrderRecord>> {
        let db = self.db.lock().await;
        let record = db
            .query_row(
                &format!("SELECT {WORK_ORDER_COLUMNS} FROM work_orders WHERE id = ?1"),
                params![id],
                work_order_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Moves a work order to `in_progress`. Orders that are no longer `todo`
    /// are refused unless `force` is set.
    pub async fn start_work_order(
        &self,
        id: &str,
        start: &WorkOrderStart,
        force: bool,
    ) -> Result<WorkOrderRecord> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM work_orders WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match status.as_deref() {
            None => bail!("Work order {} not found", id),
            Some("todo") => {}
            Some(other) if !force => {
                bail!("Work order {} is already {} and cannot be started", id, other)
            }
            Some(_) => {}
        }
        tx.execute(
            "UPDATE work_orders SET
                status = 'in_progress',
                workflow_id = ?2,
                operation_id = ?3,
                agent_id = ?4,
                start_source = ?5,
                started_at = ?6
             WHERE id = ?1",
            params![
                id,
                start.workflow_id,
                start.operation_id,
                start.agent_id,
                start.source,
                chrono::Utc::now().timestamp_millis()
            ],
        )?;
        let record = tx.query_row(
            &format!("SELECT {WORK_ORDER_COLUMNS} FROM work_orders WHERE id = ?1"),
            params![id],
            work_order_from_row,
        )?;
        tx.commit()?;
        Ok(record)
    }
}
