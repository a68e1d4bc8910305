use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use super::ErrorStore;
use super::types::{
    DailyCount, DayWindow, MergeOutcome, SignatureAggregate, SignatureWindowRow, day_key,
    parse_day_key,
};
use crate::core::ingest::AggregateDeltas;

const SIGNATURE_COLUMNS: &str = "s.signature_hash, s.signature_text, s.count, s.first_seen_at, \
     s.last_seen_at, s.last_sample_sanitized, s.last_sample_raw_redacted";

fn signature_from_row(row: &Row<'_>) -> rusqlite::Result<SignatureAggregate> {
    Ok(SignatureAggregate {
        signature_hash: row.get(0)?,
        signature_text: row.get(1)?,
        count: row.get(2)?,
        first_seen_at: row.get(3)?,
        last_seen_at: row.get(4)?,
        last_sample_sanitized: row.get(5)?,
        last_sample_raw_redacted: row.get(6)?,
    })
}

fn daily_from_row(row: &Row<'_>) -> rusqlite::Result<Option<DailyCount>> {
    let day: String = row.get(0)?;
    let count: i64 = row.get(1)?;
    Ok(parse_day_key(&day).map(|day| DailyCount { day, count }))
}

impl ErrorStore {
    /// Folds one sync pass into the lifetime, daily and signature-daily totals.
    /// Counts add; first/last seen only ever widen. All-or-nothing.
    pub async fn merge_deltas(&self, deltas: &AggregateDeltas) -> Result<MergeOutcome> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        {
            let mut upsert_signature = tx.prepare(
                "INSERT INTO error_signatures
                    (signature_hash, signature_text, count, first_seen_at, last_seen_at,
                     last_sample_sanitized, last_sample_raw_redacted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(signature_hash) DO UPDATE SET
                    signature_text = excluded.signature_text,
                    count = count + excluded.count,
                    first_seen_at = MIN(first_seen_at, excluded.first_seen_at),
                    last_seen_at = MAX(last_seen_at, excluded.last_seen_at),
                    last_sample_sanitized =
                        COALESCE(NULLIF(excluded.last_sample_sanitized, ''), last_sample_sanitized),
                    last_sample_raw_redacted =
                        COALESCE(NULLIF(excluded.last_sample_raw_redacted, ''), last_sample_raw_redacted)",
            )?;
            for delta in deltas.by_signature.values() {
                upsert_signature.execute(params![
                    delta.signature_hash,
                    delta.signature_text,
                    delta.count,
                    delta.first_seen_ms,
                    delta.last_seen_ms,
                    delta.sample,
                    delta.raw_sample_redacted,
                ])?;
            }

            let mut upsert_day = tx.prepare(
                "INSERT INTO error_daily (day, count) VALUES (?1, ?2)
                 ON CONFLICT(day) DO UPDATE SET count = count + excluded.count",
            )?;
            for (day, count) in &deltas.by_day {
                upsert_day.execute(params![day_key(*day), count])?;
            }

            let mut upsert_signature_day = tx.prepare(
                "INSERT INTO error_signature_daily (signature_hash, day, count) VALUES (?1, ?2, ?3)
                 ON CONFLICT(signature_hash, day) DO UPDATE SET count = count + excluded.count",
            )?;
            for ((hash, day), count) in &deltas.by_signature_day {
                upsert_signature_day.execute(params![hash, day_key(*day), count])?;
            }
        }
        tx.commit()?;

        Ok(MergeOutcome {
            signatures_updated: deltas.by_signature.len(),
            days_updated: deltas.by_day.len(),
        })
    }

    pub async fn get_signature(&self, signature_hash: &str) -> Result<Option<SignatureAggregate>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {SIGNATURE_COLUMNS} FROM error_signatures s WHERE s.signature_hash = ?1"
        );
        let row = db
            .query_row(&sql, params![signature_hash], signature_from_row)
            .optional()?;
        Ok(row)
    }

    /// Signatures with at least one event inside `window`, busiest first.
    pub async fn list_window_signatures(
        &self,
        window: DayWindow,
        limit: usize,
    ) -> Result<Vec<SignatureWindowRow>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {SIGNATURE_COLUMNS}, w.window_count
             FROM error_signatures s
             JOIN (
                SELECT signature_hash, SUM(count) AS window_count
                FROM error_signature_daily
                WHERE day >= ?1 AND day <= ?2
                GROUP BY signature_hash
             ) w ON w.signature_hash = s.signature_hash
             WHERE w.window_count > 0
             ORDER BY w.window_count DESC, s.last_seen_at DESC, s.signature_hash ASC
             LIMIT ?3"
        );
        let mut stmt = db.prepare(&sql)?;
        let bounds = (day_key(window.start), day_key(window.end));
        let rows = stmt.query_map(params![bounds.0, bounds.1, limit as i64], |row| {
            Ok(SignatureWindowRow {
                aggregate: signature_from_row(row)?,
                window_count: row.get(7)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn count_window_signatures(&self, window: DayWindow) -> Result<i64> {
        let db = self.db.lock().await;
        let n = db.query_row(
            "SELECT COUNT(DISTINCT signature_hash) FROM error_signature_daily
             WHERE day >= ?1 AND day <= ?2 AND count > 0",
            params![day_key(window.start), day_key(window.end)],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub async fn signature_window_count(
        &self,
        signature_hash: &str,
        window: DayWindow,
    ) -> Result<i64> {
        let db = self.db.lock().await;
        let n = db.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM error_signature_daily
             WHERE signature_hash = ?1 AND day >= ?2 AND day <= ?3",
            params![signature_hash, day_key(window.start), day_key(window.end)],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub async fn daily_counts(&self, window: DayWindow) -> Result<Vec<DailyCount>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT day, count FROM error_daily WHERE day >= ?1 AND day <= ?2 ORDER BY day ASC",
        )?;
        let rows = stmt.query_map(
            params![day_key(window.start), day_key(window.end)],
            daily_from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            if let Some(daily) = row? {
                out.push(daily);
            }
        }
        Ok(out)
    }

    pub async fn signature_daily_counts(
        &self,
        signature_hash: &str,
        window: DayWindow,
    ) -> Result<Vec<DailyCount>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT day, count FROM error_signature_daily
             WHERE signature_hash = ?1 AND day >= ?2 AND day <= ?3 ORDER BY day ASC",
        )?;
        let rows = stmt.query_map(
            params![signature_hash, day_key(window.start), day_key(window.end)],
            daily_from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            if let Some(daily) = row? {
                out.push(daily);
            }
        }
        Ok(out)
    }

    pub async fn all_time_error_count(&self) -> Result<i64> {
        let db = self.db.lock().await;
        let n = db.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM error_signatures",
            [],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::core::ingest::{AggregateDeltas, SignatureDelta};
    use crate::core::store::{DayWindow, test_store};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn window(start: u32, end: u32) -> DayWindow {
        DayWindow {
            start: day(start),
            end: day(end),
        }
    }

    fn deltas_for(
        hash: &str,
        count: i64,
        first: i64,
        last: i64,
        sample: &str,
        on: NaiveDate,
    ) -> AggregateDeltas {
        let mut deltas = AggregateDeltas::default();
        deltas.by_signature.insert(
            hash.to_string(),
            SignatureDelta {
                signature_hash: hash.to_string(),
                signature_text: format!("text for {hash}"),
                count,
                first_seen_ms: first,
                last_seen_ms: last,
                sample: sample.to_string(),
                raw_sample_redacted: sample.to_string(),
            },
        );
        deltas.by_day.insert(on, count);
        deltas.by_signature_day.insert((hash.to_string(), on), count);
        deltas
    }

    #[tokio::test]
    async fn first_merge_inserts_lifetime_totals() {
        let store = test_store().await;
        let outcome = store
            .merge_deltas(&deltas_for("a", 3, 1_000, 5_000, "boom", day(1)))
            .await
            .unwrap();
        assert_eq!(outcome.signatures_updated, 1);
        assert_eq!(outcome.days_updated, 1);

        let agg = store.get_signature("a").await.unwrap().unwrap();
        assert_eq!(agg.count, 3);
        assert_eq!(agg.first_seen_at, 1_000);
        assert_eq!(agg.last_seen_at, 5_000);
        assert_eq!(agg.last_sample_sanitized, "boom");
    }

    #[tokio::test]
    async fn second_merge_adds_and_widens_never_narrows() {
        let store = test_store().await;
        store
            .merge_deltas(&deltas_for("a", 3, 1_000, 5_000, "first", day(1)))
            .await
            .unwrap();
        // Inside the existing bounds: must not narrow them.
        store
            .merge_deltas(&deltas_for("a", 2, 2_000, 3_000, "second", day(1)))
            .await
            .unwrap();
        let agg = store.get_signature("a").await.unwrap().unwrap();
        assert_eq!(agg.count, 5);
        assert_eq!(agg.first_seen_at, 1_000);
        assert_eq!(agg.last_seen_at, 5_000);
        assert_eq!(agg.last_sample_sanitized, "second");

        // Outside on both ends: widens.
        store
            .merge_deltas(&deltas_for("a", 1, 500, 9_000, "", day(2)))
            .await
            .unwrap();
        let agg = store.get_signature("a").await.unwrap().unwrap();
        assert_eq!(agg.count, 6);
        assert_eq!(agg.first_seen_at, 500);
        assert_eq!(agg.last_seen_at, 9_000);
        // Empty samples never clobber a stored one.
        assert_eq!(agg.last_sample_sanitized, "second");
    }

    #[tokio::test]
    async fn daily_counts_are_additive() {
        let store = test_store().await;
        store
            .merge_deltas(&deltas_for("a", 3, 1, 2, "x", day(1)))
            .await
            .unwrap();
        store
            .merge_deltas(&deltas_for("b", 4, 1, 2, "y", day(1)))
            .await
            .unwrap();
        store
            .merge_deltas(&deltas_for("a", 1, 1, 2, "x", day(2)))
            .await
            .unwrap();

        let daily = store.daily_counts(window(1, 31)).await.unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].count, 7);
        assert_eq!(daily[1].count, 1);

        let per_sig = store.signature_daily_counts("a", window(1, 31)).await.unwrap();
        assert_eq!(per_sig.iter().map(|d| d.count).sum::<i64>(), 4);
        assert_eq!(store.all_time_error_count().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn window_listing_ranks_by_window_count() {
        let store = test_store().await;
        // "old" is busy overall but only before the window.
        store
            .merge_deltas(&deltas_for("old", 50, 1, 2, "o", day(1)))
            .await
            .unwrap();
        store
            .merge_deltas(&deltas_for("a", 2, 1, 2, "a", day(10)))
            .await
            .unwrap();
        store
            .merge_deltas(&deltas_for("b", 5, 1, 2, "b", day(11)))
            .await
            .unwrap();

        let rows = store.list_window_signatures(window(5, 31), 10).await.unwrap();
        let hashes: Vec<_> = rows
            .iter()
            .map(|r| r.aggregate.signature_hash.as_str())
            .collect();
        assert_eq!(hashes, vec!["b", "a"]);
        assert_eq!(rows[0].window_count, 5);
        assert_eq!(store.count_window_signatures(window(5, 31)).await.unwrap(), 2);
        assert_eq!(store.signature_window_count("old", window(5, 31)).await.unwrap(), 0);

        let limited = store.list_window_signatures(window(1, 31), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].aggregate.signature_hash, "old");
    }

    #[tokio::test]
    async fn days_after_the_window_end_are_excluded() {
        let store = test_store().await;
        store
            .merge_deltas(&deltas_for("a", 1, 1, 2, "a", day(10)))
            .await
            .unwrap();
        store
            .merge_deltas(&deltas_for("a", 4, 1, 2, "a", day(12)))
            .await
            .unwrap();
        store
            .merge_deltas(&deltas_for("late", 2, 1, 2, "l", day(12)))
            .await
            .unwrap();

        let w = window(5, 10);
        let rows = store.list_window_signatures(w, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].window_count, 1);
        assert_eq!(store.count_window_signatures(w).await.unwrap(), 1);
        assert_eq!(store.signature_window_count("a", w).await.unwrap(), 1);
        let daily = store.daily_counts(w).await.unwrap();
        assert_eq!(daily.iter().map(|d| d.count).sum::<i64>(), 1);
        assert_eq!(store.signature_daily_counts("a", w).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn counts_beyond_32_bits_stay_exact() {
        let store = test_store().await;
        let big = i64::from(u32::MAX) + 10;
        store
            .merge_deltas(&deltas_for("a", big, 1, 2, "x", day(1)))
            .await
            .unwrap();
        store
            .merge_deltas(&deltas_for("a", big, 1, 2, "x", day(1)))
            .await
            .unwrap();
        let agg = store.get_signature("a").await.unwrap().unwrap();
        assert_eq!(agg.count, big * 2);
    }
}
