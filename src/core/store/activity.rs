use anyhow::Result;
use rusqlite::params;

use super::ErrorStore;
use super::types::ActivityRecord;

impl ErrorStore {
    pub async fn add_activity(
        &self,
        kind: &str,
        message: &str,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO activity_events (kind, message, payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                kind,
                message,
                serde_json::to_string(payload)?,
                chrono::Utc::now().timestamp_millis()
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Newest first.
    pub async fn list_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, kind, message, payload_json, created_at
             FROM activity_events ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let payload: String = row.get(3)?;
            Ok(ActivityRecord {
                id: row.get(0)?,
                kind: row.get(1)?,
                message: row.get(2)?,
                payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                created_at: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
