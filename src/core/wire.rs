//! JSON conventions shared by every outward-facing payload.

use serde::Serializer;

/// Counts go over the wire as decimal strings so 64-bit values survive
/// JavaScript clients.
pub fn count_string<S: Serializer>(count: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(count)
}

pub fn count_string_u64<S: Serializer>(count: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(count)
}

/// Epoch milliseconds rendered as RFC 3339 UTC.
pub fn ms_rfc3339<S: Serializer>(ms: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&crate::core::store::types::ms_to_datetime(*ms).to_rfc3339())
}

pub fn opt_ms_rfc3339<S: Serializer>(ms: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
    match ms {
        Some(ms) => ms_rfc3339(ms, serializer),
        None => serializer.serialize_none(),
    }
}
