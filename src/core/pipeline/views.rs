//! Request and response shapes of the pipeline operations. Counts serialize
//! as decimal strings, timestamps as RFC 3339.

use chrono::NaiveDate;
use serde::Deserialize;

use super::error::PipelineError;
use crate::core::classifier::{Classification, Severity};
use crate::core::insight::InsightAttempt;
use crate::core::store::{InsightRecord, InsightStatus, SignatureWindowRow};
use crate::core::trend::{Spike, TrendPoint};

pub const DEFAULT_DAYS: u32 = 14;
pub const MAX_DAYS: u32 = 90;
pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;
pub const TOP_SIGNATURES: usize = 15;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub days: Option<u32>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub include_raw: bool,
    /// Generate missing diagnoses before answering.
    #[serde(default)]
    pub insights: bool,
    #[serde(default)]
    pub insight_limit: Option<usize>,
}

pub fn validate_days(days: Option<u32>) -> Result<u32, PipelineError> {
    let days = days.unwrap_or(DEFAULT_DAYS);
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(PipelineError::InvalidArgument(format!(
            "days must be between 1 and {MAX_DAYS}, got {days}"
        )));
    }
    Ok(days)
}

pub fn validate_limit(limit: Option<usize>) -> Result<usize, PipelineError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(PipelineError::InvalidArgument(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }
    Ok(limit)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncResult {
    pub source_path: String,
    #[serde(serialize_with = "crate::core::wire::count_string_u64")]
    pub processed_events: u64,
    pub signatures_updated: usize,
    pub days_updated: usize,
    pub cursor_reset: bool,
    pub duration_ms: u64,
    pub stopped_early: bool,
}

impl SyncResult {
    pub fn idle(source_path: String, duration_ms: u64) -> Self {
        Self {
            source_path,
            processed_events: 0,
            signatures_updated: 0,
            days_updated: 0,
            cursor_reset: false,
            duration_ms,
            stopped_early: false,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct InsightView {
    pub status: InsightStatus,
    pub diagnosis_md: Option<String>,
    pub failure_reason: Option<String>,
    pub source_agent_id: Option<String>,
    pub source_agent_name: Option<String>,
    #[serde(serialize_with = "crate::core::wire::opt_ms_rfc3339")]
    pub generated_at: Option<i64>,
    #[serde(serialize_with = "crate::core::wire::opt_ms_rfc3339")]
    pub last_attempt_at: Option<i64>,
}

impl From<InsightRecord> for InsightView {
    fn from(r: InsightRecord) -> Self {
        Self {
            status: r.status,
            diagnosis_md: r.diagnosis_md,
            failure_reason: r.failure_reason,
            source_agent_id: r.source_agent_id,
            source_agent_name: r.source_agent_name,
            generated_at: r.generated_at,
            last_attempt_at: r.last_attempt_at,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SignatureView {
    pub signature_hash: String,
    pub signature_text: String,
    #[serde(serialize_with = "crate::core::wire::count_string")]
    pub count: i64,
    #[serde(serialize_with = "crate::core::wire::count_string")]
    pub window_count: i64,
    #[serde(serialize_with = "crate::core::wire::ms_rfc3339")]
    pub first_seen_at: i64,
    #[serde(serialize_with = "crate::core::wire::ms_rfc3339")]
    pub last_seen_at: i64,
    pub sample: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_sample: Option<String>,
    pub classification: Classification,
    pub insight: Option<InsightView>,
}

impl SignatureView {
    pub fn new(
        row: SignatureWindowRow,
        classification: Classification,
        insight: Option<InsightRecord>,
        include_raw: bool,
    ) -> Self {
        let agg = row.aggregate;
        Self {
            signature_hash: agg.signature_hash,
            signature_text: agg.signature_text,
            count: agg.count,
            window_count: row.window_count,
            first_seen_at: agg.first_seen_at,
            last_seen_at: agg.last_seen_at,
            sample: agg.last_sample_sanitized,
            raw_sample: include_raw.then_some(agg.last_sample_raw_redacted),
            classification,
            insight: insight.map(InsightView::from),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ListMeta {
    pub days: u32,
    pub window_start: NaiveDate,
    #[serde(serialize_with = "crate::core::wire::count_string")]
    pub window_unique_signatures: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub insight_attempts: Vec<InsightAttempt>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SignatureList {
    pub signatures: Vec<SignatureView>,
    pub meta: ListMeta,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Totals {
    #[serde(serialize_with = "crate::core::wire::count_string")]
    pub total_errors: i64,
    #[serde(serialize_with = "crate::core::wire::count_string")]
    pub unique_signatures: i64,
    #[serde(serialize_with = "crate::core::wire::count_string")]
    pub all_time_errors: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TopSignature {
    pub signature_hash: String,
    pub signature_text: String,
    #[serde(serialize_with = "crate::core::wire::count_string")]
    pub window_count: i64,
    #[serde(serialize_with = "crate::core::wire::ms_rfc3339")]
    pub last_seen_at: i64,
    pub category: String,
    pub severity: Severity,
    pub actionable: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Summary {
    pub days: u32,
    pub window_start: NaiveDate,
    pub trend: Vec<TrendPoint>,
    pub totals: Totals,
    pub top_signatures: Vec<TopSignature>,
    pub spike: Spike,
}
