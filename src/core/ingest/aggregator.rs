use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::parser::ParsedEvent;

/// Per-signature running totals for one sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDelta {
    pub signature_hash: String,
    pub signature_text: String,
    pub count: i64,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
    pub sample: String,
    pub raw_sample_redacted: String,
}

/// The three counter maps one pass produces. Day keys are UTC calendar days.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateDeltas {
    pub by_signature: BTreeMap<String, SignatureDelta>,
    pub by_day: BTreeMap<NaiveDate, i64>,
    pub by_signature_day: BTreeMap<(String, NaiveDate), i64>,
}

impl AggregateDeltas {
    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }

    /// Folds one event in. Events are expected in file order.
    pub fn record(&mut self, event: ParsedEvent) {
        let at_ms = event.occurred_at.timestamp_millis();
        let day = event.occurred_at.date_naive();
        let sig = event.signature;

        *self.by_day.entry(day).or_insert(0) += 1;
        *self
            .by_signature_day
            .entry((sig.signature_hash.clone(), day))
            .or_insert(0) += 1;

        match self.by_signature.get_mut(&sig.signature_hash) {
            Some(delta) => {
                delta.count += 1;
                delta.first_seen_ms = delta.first_seen_ms.min(at_ms);
                delta.last_seen_ms = delta.last_seen_ms.max(at_ms);
                // Most recent non-empty sample wins.
                if !sig.sample.is_empty() {
                    delta.sample = sig.sample;
                }
                if !sig.raw_sample_redacted.is_empty() {
                    delta.raw_sample_redacted = sig.raw_sample_redacted;
                }
            }
            None => {
                self.by_signature.insert(
                    sig.signature_hash.clone(),
                    SignatureDelta {
                        signature_hash: sig.signature_hash,
                        signature_text: sig.signature_text,
                        count: 1,
                        first_seen_ms: at_ms,
                        last_seen_ms: at_ms,
                        sample: sig.sample,
                        raw_sample_redacted: sig.raw_sample_redacted,
                    },
                );
            }
        }
    }
}

impl FromIterator<ParsedEvent> for AggregateDeltas {
    fn from_iter<I: IntoIterator<Item = ParsedEvent>>(iter: I) -> Self {
        let mut deltas = AggregateDeltas::default();
        for event in iter {
            deltas.record(event);
        }
        deltas
    }
}
