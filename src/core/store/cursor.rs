use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use super::ErrorStore;
use super::types::IngestionCursor;

impl ErrorStore {
    pub async fn get_cursor(&self, source_path: &str) -> Result<Option<IngestionCursor>> {
        let db = self.db.lock().await;
        let cursor = db
            .query_row(
                "SELECT source_path, device_id, inode, offset_bytes, file_mtime_ms, file_size_bytes
                 FROM ingestion_cursors WHERE source_path = ?1",
                params![source_path],
                |row| {
                    Ok(IngestionCursor {
                        source_path: row.get(0)?,
                        device_id: row.get(1)?,
                        inode: row.get(2)?,
                        offset_bytes: row.get(3)?,
                        file_mtime_ms: row.get(4)?,
                        file_size_bytes: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(cursor)
    }

    pub async fn put_cursor(&self, cursor: &IngestionCursor) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO ingestion_cursors
                (source_path, device_id, inode, offset_bytes, file_mtime_ms, file_size_bytes, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(source_path) DO UPDATE SET
                device_id = excluded.device_id,
                inode = excluded.inode,
                offset_bytes = excluded.offset_bytes,
                file_mtime_ms = excluded.file_mtime_ms,
                file_size_bytes = excluded.file_size_bytes,
                updated_at = excluded.updated_at",
            params![
                cursor.source_path,
                cursor.device_id,
                cursor.inode,
                cursor.offset_bytes,
                cursor.file_mtime_ms,
                cursor.file_size_bytes,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }
}
