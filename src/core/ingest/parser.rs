use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::io::{self, BufRead};
use std::sync::LazyLock;

use super::signature::{NormalizedSignature, SignatureNormalizer};

/// Lines past this are still consumed but no longer appended to the entry.
const MAX_ENTRY_LINES: usize = 500;

/// One reassembled log entry, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub text: String,
    pub occurred_at: DateTime<Utc>,
    /// Byte offset of the entry's first line in the source.
    pub start_offset: u64,
}

/// An entry after signature normalization; the unit the aggregator folds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub occurred_at: DateTime<Utc>,
    pub signature: NormalizedSignature,
}

impl ParsedEvent {
    pub fn from_entry(entry: &RawEntry, normalizer: &dyn SignatureNormalizer) -> Self {
        Self {
            occurred_at: entry.occurred_at,
            signature: normalizer.normalize(&entry.text),
        }
    }
}

static ENTRY_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*(?:",
        r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}",
        r"|",
        r"\[\d{4}[-/]\d{2}[-/]\d{2}",
        r"|",
        r"(?i:ERROR|ERR|FATAL|CRITICAL)\b",
        r")",
    ))
    .expect("entry start regex is valid")
});

static ISO_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(\d{4})[-/](\d{2})[-/](\d{2})[T ]",
        r"(\d{2}):(\d{2})(?::(\d{2})(?:[.,](\d{1,9}))?)?",
        r"\s?(Z|[+-]\d{2}:?\d{2})?",
    ))
    .expect("timestamp regex is valid")
});

const JSON_ENTRY_KEYS: [&str; 4] = ["level", "time", "ts", "timestamp"];

fn json_entry(line: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed).ok()? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Whether `line` opens a new entry rather than continuing the current one.
pub fn starts_entry(line: &str) -> bool {
    if ENTRY_START.is_match(line) {
        return true;
    }
    json_entry(line).is_some_and(|map| JSON_ENTRY_KEYS.iter().any(|k| map.contains_key(*k)))
}

/// Occurrence time of an entry, read from its first line. Never fails: an
/// entry with no recognisable timestamp is stamped with `now`.
pub fn extract_timestamp(first_line: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(map) = json_entry(first_line) {
        for key in ["timestamp", "time", "ts"] {
            let parsed = match map.get(key) {
                Some(serde_json::Value::Number(n)) => n.as_f64().and_then(from_epoch_number),
                Some(serde_json::Value::String(s)) => scan_iso(s),
                _ => None,
            };
            if let Some(ts) = parsed {
                return ts;
            }
        }
        return now;
    }
    scan_iso(first_line).unwrap_or(now)
}

/// Values above 10^10 are taken as milliseconds, the rest as seconds.
fn from_epoch_number(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let millis = if value > 1e10 { value } else { value * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64)
}

fn scan_iso(text: &str) -> Option<DateTime<Utc>> {
    let caps = ISO_TIMESTAMP.captures(text)?;
    let fraction = caps.get(7).map(|m| m.as_str()).unwrap_or("0");
    let naive = format!(
        "{}-{}-{}T{}:{}:{}.{}",
        &caps[1],
        &caps[2],
        &caps[3],
        &caps[4],
        &caps[5],
        caps.get(6).map(|m| m.as_str()).unwrap_or("00"),
        fraction,
    );
    let naive = NaiveDateTime::parse_from_str(&naive, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    let offset_secs = match caps.get(8).map(|m| m.as_str()) {
        None | Some("Z") => 0,
        Some(offset) => {
            let sign = if offset.starts_with('-') { -1 } else { 1 };
            let digits: String = offset.chars().filter(char::is_ascii_digit).collect();
            let hours: i64 = digits.get(..2)?.parse().ok()?;
            let minutes: i64 = digits.get(2..4)?.parse().ok()?;
            sign * (hours * 3600 + minutes * 60)
        }
    };
    // Naive timestamps are taken as UTC.
    Some(naive.and_utc() - chrono::Duration::seconds(offset_secs))
}

struct PendingEntry {
    text: String,
    first_line: String,
    start_offset: u64,
    lines: usize,
}

impl PendingEntry {
    fn new(line: String, start_offset: u64) -> Self {
        Self {
            text: line.clone(),
            first_line: line,
            start_offset,
            lines: 1,
        }
    }

    fn push(&mut self, line: &str) {
        if self.lines >= MAX_ENTRY_LINES {
            return;
        }
        self.text.push('\n');
        self.text.push_str(line);
        self.lines += 1;
    }

    fn finish(self, now: DateTime<Utc>) -> RawEntry {
        RawEntry {
            occurred_at: extract_timestamp(&self.first_line, now),
            text: self.text,
            start_offset: self.start_offset,
        }
    }
}

/// Streams complete entries out of a log, starting at `start_offset`.
///
/// Only newline-terminated lines are consumed; an unterminated tail is left
/// for the next pass. When `should_stop` returns true (checked before every
/// line) iteration ends and the entry still being assembled is dropped, with
/// [`EntryReader::resume_offset`] pointing back at its first byte.
pub struct EntryReader<R, F> {
    reader: R,
    should_stop: F,
    position: u64,
    current: Option<PendingEntry>,
    line: Vec<u8>,
    finished: bool,
    stopped: bool,
}

impl<R: BufRead, F: FnMut() -> bool> EntryReader<R, F> {
    pub fn new(reader: R, start_offset: u64, should_stop: F) -> Self {
        Self {
            reader,
            should_stop,
            position: start_offset,
            current: None,
            line: Vec::with_capacity(256),
            finished: false,
            stopped: false,
        }
    }

    /// Offset from which the next pass should continue. Never points inside
    /// an entry that was not emitted.
    pub fn resume_offset(&self) -> u64 {
        self.current
            .as_ref()
            .map(|p| p.start_offset)
            .unwrap_or(self.position)
    }

    pub fn stopped_early(&self) -> bool {
        self.stopped
    }

    fn flush(&mut self) -> Option<RawEntry> {
        self.current.take().map(|p| p.finish(Utc::now()))
    }
}

impl<R: BufRead, F: FnMut() -> bool> Iterator for EntryReader<R, F> {
    type Item = io::Result<RawEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if (self.should_stop)() {
                self.finished = true;
                self.stopped = true;
                if let Some(pending) = self.current.take() {
                    self.position = pending.start_offset;
                }
                return None;
            }

            self.line.clear();
            let n = match self.reader.read_until(b'\n', &mut self.line) {
                Ok(n) => n,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            if n == 0 || self.line.last() != Some(&b'\n') {
                // End of stream, or a line still being written.
                self.finished = true;
                return self.flush().map(Ok);
            }

            let line_start = self.position;
            self.position += n as u64;
            let text = String::from_utf8_lossy(&self.line)
                .trim_end_matches(['\n', '\r'])
                .to_string();

            if text.trim().is_empty() {
                if let Some(entry) = self.flush() {
                    return Some(Ok(entry));
                }
                continue;
            }

            if starts_entry(&text) {
                let previous = self.current.replace(PendingEntry::new(text, line_start));
                if let Some(previous) = previous {
                    return Some(Ok(previous.finish(Utc::now())));
                }
                continue;
            }

            match self.current.as_mut() {
                Some(pending) => pending.push(&text),
                // A continuation with nothing to continue: keep it as its own entry.
                None => self.current = Some(PendingEntry::new(text, line_start)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn read_all(input: &str) -> (Vec<RawEntry>, u64) {
        let mut reader = EntryReader::new(Cursor::new(input.as_bytes().to_vec()), 0, || false);
        let entries: Vec<_> = reader.by_ref().map(|e| e.unwrap()).collect();
        (entries, reader.resume_offset())
    }

    #[test]
    fn stack_trace_is_one_entry() {
        let input = "ERROR Unhandled exception in worker\n\
            \x20   at a (/app/a.js:1:1)\n\
            \x20   at b (/app/b.js:2:2)\n\
            \x20   at c (/app/c.js:3:3)\n\
            \x20   at d (/app/d.js:4:4)\n\
            \x20   at e (/app/e.js:5:5)\n";
        let (entries, offset) = read_all(input);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text.lines().count(), 6);
        assert_eq!(offset, input.len() as u64);
    }

    #[test]
    fn each_timestamped_line_starts_an_entry() {
        let input = "2026-03-01T10:00:00Z first\n2026-03-01T10:00:01Z second\n[2026-03-01 10:00:02] third\n";
        let (entries, _) = read_all(input);
        let texts: Vec<_> = entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "2026-03-01T10:00:00Z first",
                "2026-03-01T10:00:01Z second",
                "[2026-03-01 10:00:02] third"
            ]
        );
        assert_eq!(entries[1].start_offset, 27);
    }

    #[test]
    fn blank_line_flushes_without_starting() {
        let input = "ERROR one\ncontinued\n\norphan line\nmore\n";
        let (entries, _) = read_all(input);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "ERROR one\ncontinued");
        assert_eq!(entries[1].text, "orphan line\nmore");
    }

    #[test]
    fn multi_line_json_payload_is_reassembled() {
        let input = "{\"level\":\"error\",\"ts\":1700000000,\"msg\":\"bad payload\"}\n{\n  \"detail\": 1\n}\nFATAL next\n";
        let (entries, _) = read_all(input);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].text.ends_with('}'));
        assert_eq!(entries[0].occurred_at.timestamp(), 1_700_000_000);
        assert_eq!(entries[1].text, "FATAL next");
    }

    #[test]
    fn unterminated_tail_is_left_for_next_pass() {
        let input = "ERROR done\nERROR half writ";
        let (entries, offset) = read_all(input);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "ERROR done");
        assert_eq!(offset, "ERROR done\n".len() as u64);
    }

    #[test]
    fn crlf_line_endings_are_trimmed() {
        let (entries, _) = read_all("ERROR windows\r\n  at x\r\n");
        assert_eq!(entries[0].text, "ERROR windows\n  at x");
    }

    #[test]
    fn stop_discards_partial_entry_and_rewinds() {
        let input = "ERROR one\nERROR two\n  at frame\n  at frame\n";
        let mut checks = 0;
        let mut reader = EntryReader::new(Cursor::new(input.as_bytes().to_vec()), 100, || {
            checks += 1;
            checks > 3
        });
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.text, "ERROR one");
        assert!(reader.next().is_none());
        assert!(reader.stopped_early());
        // "ERROR two" was in progress; resume at its first byte.
        assert_eq!(reader.resume_offset(), 100 + "ERROR one\n".len() as u64);
    }

    #[test]
    fn offsets_are_relative_to_start() {
        let input = "ERROR a\n";
        let mut reader = EntryReader::new(Cursor::new(input.as_bytes().to_vec()), 40, || false);
        let entry = reader.next().unwrap().unwrap();
        assert_eq!(entry.start_offset, 40);
        assert!(reader.next().is_none());
        assert_eq!(reader.resume_offset(), 48);
    }

    #[test]
    fn entry_start_detection() {
        assert!(starts_entry("2026-03-01 10:00:00 boom"));
        assert!(starts_entry("  [2026/03/01 10:00] boom"));
        assert!(starts_entry("err: something"));
        assert!(starts_entry("CRITICAL disk"));
        assert!(starts_entry(r#"{"time":"2026-03-01T00:00:00Z","msg":"x"}"#));
        assert!(!starts_entry(r#"{"detail":"no level key"}"#));
        assert!(!starts_entry("Errors are fun"));
        assert!(!starts_entry("    at frame (file.js:1:1)"));
    }

    #[test]
    fn timestamp_extraction_priority() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

        let ms = extract_timestamp(r#"{"level":"error","timestamp":1700000000123}"#, now);
        assert_eq!(ms.timestamp_millis(), 1_700_000_000_123);

        let secs = extract_timestamp(r#"{"level":"error","time":1700000000}"#, now);
        assert_eq!(secs.timestamp(), 1_700_000_000);

        let json_iso = extract_timestamp(r#"{"ts":"2026-03-01T10:00:00+02:00"}"#, now);
        assert_eq!(json_iso, Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap());

        let text = extract_timestamp("[2026/03/01 10:00:05] ERROR boom", now);
        assert_eq!(text, Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 5).unwrap());

        let frac = extract_timestamp("2026-03-01T10:00:05.250Z ERROR", now);
        assert_eq!(frac.timestamp_millis() % 1000, 250);

        assert_eq!(extract_timestamp("ERROR no time here", now), now);
        assert_eq!(extract_timestamp(r#"{"level":"error"}"#, now), now);
        assert_eq!(extract_timestamp("2026-13-45T99:99 bogus", now), now);
    }
}
