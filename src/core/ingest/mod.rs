//! Log ingestion: where to resume, how lines become entries, and how entries
//! fold into counters.

pub mod aggregator;
pub mod cursor;
pub mod parser;
pub mod signature;

use anyhow::Result;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

pub use aggregator::{AggregateDeltas, SignatureDelta};
pub use cursor::{CursorDecision, FileFingerprint, ResetReason, decide};
pub use parser::{EntryReader, ParsedEvent, RawEntry};
pub use signature::{DefaultNormalizer, NormalizedSignature, SignatureNormalizer};

/// Result of reading one byte range of a log.
#[derive(Debug, Default)]
pub struct ReadPass {
    pub deltas: AggregateDeltas,
    pub processed_events: u64,
    /// Offset the cursor should advance to once `deltas` are committed.
    pub end_offset: u64,
    pub stopped_early: bool,
}

/// Reads `[start_offset, end_limit)` of `path` and folds every complete entry.
///
/// Blocking; run it on a blocking thread. Bytes past `end_limit` are ignored so
/// the resulting offset never exceeds the size that was fingerprinted.
pub fn read_range(
    path: &Path,
    start_offset: u64,
    end_limit: u64,
    normalizer: &dyn SignatureNormalizer,
    should_stop: impl FnMut() -> bool,
) -> Result<ReadPass> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start_offset))?;
    let window = file.take(end_limit.saturating_sub(start_offset));
    let mut reader = EntryReader::new(BufReader::new(window), start_offset, should_stop);

    let mut pass = ReadPass::default();
    for entry in reader.by_ref() {
        let entry = entry?;
        pass.deltas.record(ParsedEvent::from_entry(&entry, normalizer));
        pass.processed_events += 1;
    }
    pass.end_offset = reader.resume_offset();
    pass.stopped_early = reader.stopped_early();
    Ok(pass)
}
