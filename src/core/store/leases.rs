use anyhow::Result;
use rusqlite::params;

use super::ErrorStore;

impl ErrorStore {
    /// Takes the named lease for `holder` if nobody holds it or the previous
    /// holder's lease has run out. Returns whether the lease is now ours.
    pub async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        ttl_ms: i64,
        now_ms: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let changed = db.execute(
            "INSERT INTO leases (name, holder, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                holder = excluded.holder,
                expires_at = excluded.expires_at
             WHERE leases.expires_at <= ?4",
            params![name, holder, now_ms + ttl_ms, now_ms],
        )?;
        Ok(changed == 1)
    }

    /// Drops the lease only if `holder` still owns it.
    pub async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "DELETE FROM leases WHERE name = ?1 AND holder = ?2",
            params![name, holder],
        )?;
        Ok(())
    }
}
