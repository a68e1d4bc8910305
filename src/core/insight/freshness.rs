use crate::core::config::InsightConfig;
use crate::core::store::{InsightRecord, InsightStatus};

/// How long each insight state stays valid, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub ready_ttl_ms: i64,
    pub failed_retry_ms: i64,
    pub pending_stale_ms: i64,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from_config(&InsightConfig::default())
    }
}

impl FreshnessPolicy {
    pub fn from_config(config: &InsightConfig) -> Self {
        Self {
            ready_ttl_ms: config.ready_ttl_secs.saturating_mul(1000),
            failed_retry_ms: config.failed_retry_secs.saturating_mul(1000),
            pending_stale_ms: config.pending_stale_secs.saturating_mul(1000),
        }
    }

    /// Whether a diagnosis should be (re)generated for `input_hash`.
    ///
    /// A pending row younger than the stale window belongs to an attempt that
    /// is still running somewhere, so it is left alone.
    pub fn needs_generation(
        &self,
        existing: Option<&InsightRecord>,
        input_hash: &str,
        now_ms: i64,
    ) -> bool {
        let Some(row) = existing else {
            return true;
        };
        if row.input_hash != input_hash {
            return true;
        }
        let older_than = |at: Option<i64>, limit_ms: i64| match at {
            Some(at) => now_ms - at > limit_ms,
            None => true,
        };
        match row.status {
            InsightStatus::Ready => older_than(row.generated_at, self.ready_ttl_ms),
            InsightStatus::Failed => older_than(row.last_attempt_at, self.failed_retry_ms),
            InsightStatus::Pending => older_than(row.last_attempt_at, self.pending_stale_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 60 * 60 * 1000;
    const MINUTE: i64 = 60 * 1000;

    fn row(status: InsightStatus, generated_at: Option<i64>, last_attempt_at: Option<i64>) -> InsightRecord {
        InsightRecord {
            signature_hash: "sig".to_string(),
            status,
            input_hash: "in-1".to_string(),
            diagnosis_md: None,
            failure_reason: None,
            source_agent_id: None,
            source_agent_name: None,
            generated_at,
            last_attempt_at,
        }
    }

    #[test]
    fn missing_row_or_changed_input_regenerates() {
        let p = FreshnessPolicy::default();
        assert!(p.needs_generation(None, "in-1", 0));
        let r = row(InsightStatus::Ready, Some(0), Some(0));
        assert!(p.needs_generation(Some(&r), "in-2", 1));
        assert!(!p.needs_generation(Some(&r), "in-1", 1));
    }

    #[test]
    fn ready_expires_after_six_hours() {
        let p = FreshnessPolicy::default();
        let r = row(InsightStatus::Ready, Some(0), Some(0));
        assert!(!p.needs_generation(Some(&r), "in-1", 6 * HOUR));
        assert!(p.needs_generation(Some(&r), "in-1", 6 * HOUR + 1));
        let undated = row(InsightStatus::Ready, None, Some(0));
        assert!(p.needs_generation(Some(&undated), "in-1", 1));
    }

    #[test]
    fn failed_retries_after_fifteen_minutes() {
        let p = FreshnessPolicy::default();
        let r = row(InsightStatus::Failed, None, Some(0));
        assert!(!p.needs_generation(Some(&r), "in-1", 15 * MINUTE));
        assert!(p.needs_generation(Some(&r), "in-1", 15 * MINUTE + 1));
    }

    #[test]
    fn pending_is_left_alone_until_stale() {
        let p = FreshnessPolicy::default();
        let r = row(InsightStatus::Pending, None, Some(1_000));
        assert!(!p.needs_generation(Some(&r), "in-1", 13_000));
        assert!(p.needs_generation(Some(&r), "in-1", 13_001));
    }
}
