mod activity;
mod aggregates;
mod cursor;
mod insights;
mod leases;
pub mod types;
mod work_orders;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::platform::{NativePlatform, Platform};

pub use types::{
    ActivityRecord, DailyCount, DayWindow, IngestionCursor, InsightRecord, InsightStatus, MergeOutcome,
    SignatureAggregate, SignatureWindowRow, WorkOrderRecord,
};
pub use work_orders::{NewWorkOrder, WorkOrderStart};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS ingestion_cursors (
        source_path TEXT PRIMARY KEY,
        device_id INTEGER NOT NULL,
        inode INTEGER NOT NULL,
        offset_bytes INTEGER NOT NULL,
        file_mtime_ms INTEGER NOT NULL,
        file_size_bytes INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS error_signatures (
        signature_hash TEXT PRIMARY KEY,
        signature_text TEXT NOT NULL,
        count INTEGER NOT NULL,
        first_seen_at INTEGER NOT NULL,
        last_seen_at INTEGER NOT NULL,
        last_sample_sanitized TEXT NOT NULL DEFAULT '',
        last_sample_raw_redacted TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS error_daily (
        day TEXT PRIMARY KEY,
        count INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS error_signature_daily (
        signature_hash TEXT NOT NULL,
        day TEXT NOT NULL,
        count INTEGER NOT NULL,
        PRIMARY KEY (signature_hash, day)
    )",
    "CREATE INDEX IF NOT EXISTS idx_error_signature_daily_day ON error_signature_daily(day)",
    "CREATE TABLE IF NOT EXISTS error_insights (
        signature_hash TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        input_hash TEXT NOT NULL,
        diagnosis_md TEXT,
        failure_reason TEXT,
        source_agent_id TEXT,
        source_agent_name TEXT,
        generated_at INTEGER,
        last_attempt_at INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS leases (
        name TEXT PRIMARY KEY,
        holder TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS activity_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        message TEXT NOT NULL,
        payload_json TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS work_orders (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        code TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        goal_md TEXT NOT NULL,
        priority TEXT NOT NULL,
        tags_json TEXT NOT NULL,
        owner_id TEXT,
        status TEXT NOT NULL,
        workflow_id TEXT,
        operation_id TEXT,
        agent_id TEXT,
        start_source TEXT,
        created_at INTEGER NOT NULL,
        started_at INTEGER
    )",
];

/// SQLite-backed home of every row the error pipeline owns, plus the local
/// audit and work-order tables used when no external service is wired in.
#[derive(Clone)]
pub struct ErrorStore {
    db: Arc<Mutex<Connection>>,
}

impl ErrorStore {
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tokio::fs::create_dir_all(parent).await?;
            NativePlatform::restrict_dir_permissions(parent);
        }

        let db = Connection::open(&db_path)?;
        NativePlatform::restrict_file_permissions(&db_path);
        // Readers and the syncer share the file; wait instead of failing on a busy lock.
        db.busy_timeout(std::time::Duration::from_secs(5))?;

        let store = Self {
            db: Arc::new(Mutex::new(db)),
        };
        store.ensure_schema().await?;
        info!("Error store opened at {:?}", db_path);
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Idempotent; safe to call at the start of every operation.
    pub async fn ensure_schema(&self) -> Result<()> {
        let db = self.db.lock().await;
        for stmt in SCHEMA {
            db.execute(stmt, [])?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn get_db(&self) -> Arc<Mutex<Connection>> {
        self.db.clone()
    }
}

/// In-memory store with the schema applied. Avoids filesystem side-effects.
#[cfg(test)]
pub async fn test_store() -> ErrorStore {
    let store = ErrorStore::open_in_memory().expect("open in-memory store");
    store.ensure_schema().await.expect("apply schema");
    store
}
