use anyhow::Result;
use rusqlite::{Row, params, params_from_iter};
use std::collections::HashMap;

use super::ErrorStore;
use super::types::{InsightRecord, InsightStatus};

fn insight_from_row(row: &Row<'_>) -> rusqlite::Result<InsightRecord> {
    let status: String = row.get(1)?;
    Ok(InsightRecord {
        signature_hash: row.get(0)?,
        // Unknown statuses only appear if the row was edited by hand; treat
        // them as failed so the retry rule picks them up.
        status: InsightStatus::from_status(&status).unwrap_or(InsightStatus::Failed),
        input_hash: row.get(2)?,
        diagnosis_md: row.get(3)?,
        failure_reason: row.get(4)?,
        source_agent_id: row.get(5)?,
        source_agent_name: row.get(6)?,
        generated_at: row.get(7)?,
        last_attempt_at: row.get(8)?,
    })
}

const INSIGHT_COLUMNS: &str = "signature_hash, status, input_hash, diagnosis_md, failure_reason, \
     source_agent_id, source_agent_name, generated_at, last_attempt_at";

impl ErrorStore {
    pub async fn get_insight(&self, signature_hash: &str) -> Result<Option<InsightRecord>> {
        let db = self.db.lock().await;
        let sql = format!("SELECT {INSIGHT_COLUMNS} FROM error_insights WHERE signature_hash = ?1");
        let mut stmt = db.prepare(&sql)?;
        let mut rows = stmt.query_map(params![signature_hash], insight_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub async fn get_insights(
        &self,
        signature_hashes: &[String],
    ) -> Result<HashMap<String, InsightRecord>> {
        let mut out = HashMap::new();
        if signature_hashes.is_empty() {
            return Ok(out);
        }
        let db = self.db.lock().await;
        let placeholders = vec!["?"; signature_hashes.len()].join(", ");
        let sql = format!(
            "SELECT {INSIGHT_COLUMNS} FROM error_insights WHERE signature_hash IN ({placeholders})"
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(signature_hashes.iter()), insight_from_row)?;
        for row in rows {
            let rec = row?;
            out.insert(rec.signature_hash.clone(), rec);
        }
        Ok(out)
    }

    /// Records the start of a generation attempt. Keeps any previous diagnosis
    /// so a `ready` row that is being refreshed does not lose its text.
    pub async fn mark_insight_pending(
        &self,
        signature_hash: &str,
        input_hash: &str,
        now_ms: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO error_insights (signature_hash, status, input_hash, last_attempt_at)
             VALUES (?1, 'pending', ?2, ?3)
             ON CONFLICT(signature_hash) DO UPDATE SET
                status = 'pending',
                input_hash = excluded.input_hash,
                last_attempt_at = excluded.last_attempt_at",
            params![signature_hash, input_hash, now_ms],
        )?;
        Ok(())
    }

    pub async fn mark_insight_ready(
        &self,
        signature_hash: &str,
        input_hash: &str,
        diagnosis_md: &str,
        agent_id: &str,
        agent_name: &str,
        now_ms: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO error_insights
                (signature_hash, status, input_hash, diagnosis_md, failure_reason,
                 source_agent_id, source_agent_name, generated_at, last_attempt_at)
             VALUES (?1, 'ready', ?2, ?3, NULL, ?4, ?5, ?6, ?6)
             ON CONFLICT(signature_hash) DO UPDATE SET
                status = 'ready',
                input_hash = excluded.input_hash,
                diagnosis_md = excluded.diagnosis_md,
                failure_reason = NULL,
                source_agent_id = excluded.source_agent_id,
                source_agent_name = excluded.source_agent_name,
                generated_at = excluded.generated_at,
                last_attempt_at = excluded.last_attempt_at",
            params![
                signature_hash,
                input_hash,
                diagnosis_md,
                agent_id,
                agent_name,
                now_ms
            ],
        )?;
        Ok(())
    }

    pub async fn mark_insight_failed(
        &self,
        signature_hash: &str,
        input_hash: &str,
        reason: &str,
        agent: Option<(&str, &str)>,
        now_ms: i64,
    ) -> Result<()> {
        let (agent_id, agent_name) = match agent {
            Some((id, name)) => (Some(id), Some(name)),
            None => (None, None),
        };
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO error_insights
                (signature_hash, status, input_hash, failure_reason,
                 source_agent_id, source_agent_name, last_attempt_at)
             VALUES (?1, 'failed', ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(signature_hash) DO UPDATE SET
                status = 'failed',
                input_hash = excluded.input_hash,
                failure_reason = excluded.failure_reason,
                source_agent_id = COALESCE(excluded.source_agent_id, source_agent_id),
                source_agent_name = COALESCE(excluded.source_agent_name, source_agent_name),
                last_attempt_at = excluded.last_attempt_at",
            params![
                signature_hash,
                input_hash,
                reason,
                agent_id,
                agent_name,
                now_ms
            ],
        )?;
        Ok(())
    }
}
