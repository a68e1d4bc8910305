use std::time::UNIX_EPOCH;

use crate::core::store::IngestionCursor;
use crate::platform::{NativePlatform, Platform};

/// Identity and shape of the log file as it is right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFingerprint {
    pub device_id: i64,
    pub inode: i64,
    pub size_bytes: i64,
    pub mtime_ms: i64,
}

impl FileFingerprint {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let (device, inode) = NativePlatform::file_identity(meta);
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self {
            // SQLite integers are signed; the bit pattern round-trips.
            device_id: device as i64,
            inode: inode as i64,
            size_bytes: meta.len() as i64,
            mtime_ms,
        }
    }

    pub fn to_cursor(self, source_path: &str, offset_bytes: i64) -> IngestionCursor {
        IngestionCursor {
            source_path: source_path.to_string(),
            device_id: self.device_id,
            inode: self.inode,
            offset_bytes,
            file_mtime_ms: self.mtime_ms,
            file_size_bytes: self.size_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    Rotated,
    Truncated,
    Replaced,
}

impl std::fmt::Display for ResetReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetReason::Rotated => write!(f, "file identity changed"),
            ResetReason::Truncated => write!(f, "file shrank below the stored offset"),
            ResetReason::Replaced => write!(f, "older mtime with a different size"),
        }
    }
}

/// Where the next read should begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorDecision {
    /// No cursor stored yet; read from the top.
    Fresh,
    Resume(u64),
    Reset(ResetReason),
    /// Nothing new past the stored offset.
    UpToDate(u64),
}

impl CursorDecision {
    /// Offset to start reading from, or `None` when there is nothing to read.
    pub fn start_offset(self) -> Option<u64> {
        match self {
            CursorDecision::Fresh | CursorDecision::Reset(_) => Some(0),
            CursorDecision::Resume(offset) => Some(offset),
            CursorDecision::UpToDate(_) => None,
        }
    }

    pub fn is_reset(self) -> bool {
        matches!(self, CursorDecision::Reset(_))
    }
}

pub fn decide(stored: Option<&IngestionCursor>, current: &FileFingerprint) -> CursorDecision {
    let Some(stored) = stored else {
        return CursorDecision::Fresh;
    };
    if stored.device_id != current.device_id || stored.inode != current.inode {
        return CursorDecision::Reset(ResetReason::Rotated);
    }
    if current.size_bytes < stored.offset_bytes {
        return CursorDecision::Reset(ResetReason::Truncated);
    }
    // An mtime going backwards alone is metadata noise; combined with a size
    // change it means the file was swapped out.
    if current.mtime_ms < stored.file_mtime_ms && current.size_bytes != stored.file_size_bytes {
        return CursorDecision::Reset(ResetReason::Replaced);
    }
    let offset = stored.offset_bytes.max(0) as u64;
    if current.size_bytes <= stored.offset_bytes {
        return CursorDecision::UpToDate(offset);
    }
    CursorDecision::Resume(offset)
}
