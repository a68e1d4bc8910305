use chrono::{DateTime, NaiveDate, Utc};

/// Per-source read position plus the fingerprint of the file it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionCursor {
    pub source_path: String,
    pub device_id: i64,
    pub inode: i64,
    pub offset_bytes: i64,
    pub file_mtime_ms: i64,
    pub file_size_bytes: i64,
}

/// Lifetime totals for one signature. Timestamps are UTC epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureAggregate {
    pub signature_hash: String,
    pub signature_text: String,
    pub count: i64,
    pub first_seen_at: i64,
    pub last_seen_at: i64,
    pub last_sample_sanitized: String,
    pub last_sample_raw_redacted: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: i64,
}

/// Inclusive range of UTC days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// A signature ranked by how often it occurred inside a day window.
#[derive(Debug, Clone)]
pub struct SignatureWindowRow {
    pub aggregate: SignatureAggregate,
    pub window_count: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub signatures_updated: usize,
    pub days_updated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    Pending,
    Ready,
    Failed,
}

impl InsightStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InsightStatus::Pending => "pending",
            InsightStatus::Ready => "ready",
            InsightStatus::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(InsightStatus::Pending),
            "ready" => Some(InsightStatus::Ready),
            "failed" => Some(InsightStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightRecord {
    pub signature_hash: String,
    pub status: InsightStatus,
    pub input_hash: String,
    pub diagnosis_md: Option<String>,
    pub failure_reason: Option<String>,
    pub source_agent_id: Option<String>,
    pub source_agent_name: Option<String>,
    pub generated_at: Option<i64>,
    pub last_attempt_at: Option<i64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub kind: String,
    pub message: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOrderRecord {
    pub id: String,
    pub code: String,
    pub title: String,
    pub goal_md: String,
    pub priority: String,
    pub tags: Vec<String>,
    pub owner_id: Option<String>,
    pub status: String,
    pub workflow_id: Option<String>,
    pub operation_id: Option<String>,
    pub agent_id: Option<String>,
    pub start_source: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
}

pub const DAY_FORMAT: &str = "%Y-%m-%d";

pub fn day_key(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

pub fn parse_day_key(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DAY_FORMAT).ok()
}

pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}
