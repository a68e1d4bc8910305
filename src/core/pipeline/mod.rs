//! The error pipeline as callers see it: sync the log, list and summarise
//! signatures, generate diagnoses, open remediation work.

pub mod error;
#[cfg(test)]
pub(crate) mod testkit;
pub mod views;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::agents::{AgentGateway, HttpAgentGateway, NoAgents};
use crate::core::audit::{AuditSink, StoreAuditSink};
use crate::core::classifier::{Classification, Classifier};
use crate::core::config::Config;
use crate::core::ingest::{self, CursorDecision, DefaultNormalizer, FileFingerprint, SignatureNormalizer};
use crate::core::insight::{InsightAttempt, InsightCandidate, InsightGenerator, InsightSettings};
use crate::core::remediation::{
    RemediationContext, RemediationMode, RemediationOrchestrator, RemediationResult,
};
use crate::core::store::{
    ActivityRecord, DayWindow, ErrorStore, MergeOutcome, SignatureWindowRow,
};
use crate::core::trend::{build_trend, compute_spike, window_start};
use crate::core::work::{LocalWorkTracker, WorkTracker};

pub use error::PipelineError;
pub use views::{ListQuery, SignatureList, Summary, SyncResult};

/// The services the pipeline talks to but does not own.
pub struct Collaborators {
    pub agents: Arc<dyn AgentGateway>,
    pub work: Arc<dyn WorkTracker>,
    pub audit: Arc<dyn AuditSink>,
}

impl Collaborators {
    /// Store-backed work orders and audit log, plus the configured agent
    /// gateway if there is one.
    pub fn local(store: &ErrorStore, config: &Config) -> Result<Self> {
        let agents: Arc<dyn AgentGateway> = match &config.agents.gateway_url {
            Some(url) => Arc::new(HttpAgentGateway::new(
                url,
                config.agents.api_token.clone(),
                Duration::from_secs(config.agents.timeout_secs),
            )?),
            None => {
                info!("No agent gateway configured; diagnoses will be marked failed.");
                Arc::new(NoAgents)
            }
        };
        Ok(Self {
            agents,
            work: Arc::new(LocalWorkTracker::new(store.clone())),
            audit: Arc::new(StoreAuditSink::new(store.clone())),
        })
    }
}

pub struct ErrorPipeline {
    store: ErrorStore,
    source_path: PathBuf,
    normalizer: Arc<dyn SignatureNormalizer>,
    classifier: Classifier,
    insights: InsightGenerator,
    remediation: RemediationOrchestrator,
    max_sync_duration: Duration,
    default_insight_batch: usize,
    max_insight_batch: usize,
    /// One sync at a time per process.
    sync_lock: Mutex<()>,
}

impl ErrorPipeline {
    pub fn new(store: ErrorStore, config: &Config, collaborators: Collaborators) -> Self {
        let insights = InsightGenerator::new(
            store.clone(),
            collaborators.agents,
            collaborators.audit.clone(),
            InsightSettings::from_config(config),
        );
        let remediation = RemediationOrchestrator::new(
            collaborators.work,
            collaborators.audit,
            &config.remediation.owner,
        );
        Self {
            store,
            source_path: config.log_path(),
            normalizer: Arc::new(DefaultNormalizer),
            classifier: Classifier::new(&config.classifier.rules),
            insights,
            remediation,
            max_sync_duration: Duration::from_millis(config.source.max_sync_duration_ms),
            default_insight_batch: config.insights.default_batch,
            max_insight_batch: config.insights.max_batch,
            sync_lock: Mutex::new(()),
        }
    }

    /// Opens the configured database and wires the local collaborators.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = ErrorStore::open(config.database_path()).await?;
        let collaborators = Collaborators::local(&store, config)?;
        Ok(Self::new(store, config, collaborators))
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn SignatureNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Reads whatever the log gained since the last sync and folds it into the
    /// aggregates. Stops early, keeping what it has, when `cancel` fires or
    /// the configured duration runs out.
    pub async fn sync(&self, cancel: CancellationToken) -> Result<SyncResult> {
        let _guard = self.sync_lock.lock().await;
        let started = Instant::now();
        self.store.ensure_schema().await?;

        let source = self.source_path.to_string_lossy().to_string();
        let meta = match tokio::fs::metadata(&self.source_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Error log {} does not exist yet", source);
                return Ok(SyncResult::idle(source, elapsed_ms(started)));
            }
            Err(e) => return Err(e.into()),
        };
        let fingerprint = FileFingerprint::from_metadata(&meta);
        let stored = self.store.get_cursor(&source).await?;
        let decision = ingest::decide(stored.as_ref(), &fingerprint);
        if let CursorDecision::Reset(reason) = decision {
            info!("Resetting cursor for {}: {}", source, reason);
        }

        let Some(start_offset) = decision.start_offset() else {
            // Nothing new; refresh the fingerprint so mtime noise is absorbed.
            let offset = stored.map(|c| c.offset_bytes).unwrap_or(0);
            self.store
                .put_cursor(&fingerprint.to_cursor(&source, offset))
                .await?;
            return Ok(SyncResult::idle(source, elapsed_ms(started)));
        };

        let path = self.source_path.clone();
        let end_limit = fingerprint.size_bytes.max(0) as u64;
        let normalizer = self.normalizer.clone();
        let deadline = started + self.max_sync_duration;
        let stop = cancel;
        let pass = tokio::task::spawn_blocking(move || {
            ingest::read_range(&path, start_offset, end_limit, normalizer.as_ref(), || {
                stop.is_cancelled() || Instant::now() >= deadline
            })
        })
        .await??;

        // Aggregates first, cursor second: a crash in between re-reads the range.
        let outcome = if pass.deltas.is_empty() {
            MergeOutcome::default()
        } else {
            self.store.merge_deltas(&pass.deltas).await?
        };
        self.store
            .put_cursor(&fingerprint.to_cursor(&source, pass.end_offset as i64))
            .await?;

        let result = SyncResult {
            source_path: source,
            processed_events: pass.processed_events,
            signatures_updated: outcome.signatures_updated,
            days_updated: outcome.days_updated,
            cursor_reset: decision.is_reset(),
            duration_ms: elapsed_ms(started),
            stopped_early: pass.stopped_early,
        };
        if result.stopped_early {
            warn!(
                "Sync of {} stopped early at offset {} after {}ms",
                result.source_path, pass.end_offset, result.duration_ms
            );
        }
        info!(
            "Synced {} error events from {} ({} signatures, {} days) in {}ms",
            result.processed_events,
            result.source_path,
            result.signatures_updated,
            result.days_updated,
            result.duration_ms
        );
        Ok(result)
    }

    /// Signatures seen in the window, busiest first, each with its
    /// classification and whatever diagnosis is stored for it.
    pub async fn list(&self, query: &ListQuery) -> Result<SignatureList> {
        self.store.ensure_schema().await?;
        let days = views::validate_days(query.days)?;
        let limit = views::validate_limit(query.limit)?;
        let window = day_window(days);

        let rows = self.store.list_window_signatures(window, limit).await?;
        let unique = self.store.count_window_signatures(window).await?;
        let classified: Vec<_> = rows
            .into_iter()
            .map(|row| {
                let c = self.classify(&row);
                (row, c)
            })
            .collect();

        let mut insight_attempts = Vec::new();
        if query.insights {
            let batch = self.insight_batch(query.insight_limit);
            let candidates = self.candidates(&classified).await?;
            insight_attempts = self.insights.generate_batch(&candidates, batch).await?;
        }

        // Read back from the store so rows written by other callers show up too.
        let hashes: Vec<String> = classified
            .iter()
            .map(|(row, _)| row.aggregate.signature_hash.clone())
            .collect();
        let mut insights = self.store.get_insights(&hashes).await?;

        let signatures = classified
            .into_iter()
            .map(|(row, c)| {
                let insight = insights.remove(&row.aggregate.signature_hash);
                views::SignatureView::new(row, c, insight, query.include_raw)
            })
            .collect();
        Ok(SignatureList {
            signatures,
            meta: views::ListMeta {
                days,
                window_start: window.start,
                window_unique_signatures: unique,
                insight_attempts,
            },
        })
    }

    /// Runs one diagnosis batch over the busiest signatures of the default window.
    pub async fn generate_insights(&self, limit: Option<usize>) -> Result<Vec<InsightAttempt>> {
        let list = self
            .list(&ListQuery {
                insights: true,
                insight_limit: limit,
                ..ListQuery::default()
            })
            .await?;
        Ok(list.meta.insight_attempts)
    }

    pub async fn summary(&self, days: Option<u32>) -> Result<Summary> {
        self.store.ensure_schema().await?;
        let days = views::validate_days(days)?;
        let window = day_window(days);

        let daily = self.store.daily_counts(window).await?;
        let trend = build_trend(window.start, days, &daily);
        let total_errors: i64 = trend.iter().map(|p| p.count).sum();
        let unique_signatures = self.store.count_window_signatures(window).await?;
        let all_time_errors = self.store.all_time_error_count().await?;

        let top_signatures = self
            .store
            .list_window_signatures(window, views::TOP_SIGNATURES)
            .await?
            .into_iter()
            .map(|row| {
                let c = self.classify(&row);
                views::TopSignature {
                    signature_hash: row.aggregate.signature_hash,
                    signature_text: row.aggregate.signature_text,
                    window_count: row.window_count,
                    last_seen_at: row.aggregate.last_seen_at,
                    category: c.category,
                    severity: c.severity,
                    actionable: c.actionable,
                }
            })
            .collect();

        Ok(Summary {
            days,
            window_start: window.start,
            spike: compute_spike(&trend),
            trend,
            totals: views::Totals {
                total_errors,
                unique_signatures,
                all_time_errors,
            },
            top_signatures,
        })
    }

    pub async fn remediate(
        &self,
        signature_hash: &str,
        mode: RemediationMode,
    ) -> Result<RemediationResult> {
        self.store.ensure_schema().await?;
        let Some(signature) = self.store.get_signature(signature_hash).await? else {
            return Err(PipelineError::UnknownSignature(signature_hash.to_string()).into());
        };
        let days = views::DEFAULT_DAYS;
        let window = day_window(days);
        let window_count = self
            .store
            .signature_window_count(signature_hash, window)
            .await?;
        let daily = self
            .store
            .signature_daily_counts(signature_hash, window)
            .await?;
        let spike = compute_spike(&build_trend(window.start, days, &daily));
        let insight = self.store.get_insight(signature_hash).await?;
        let classification = self.classifier.classify(
            &signature.signature_text,
            &signature.last_sample_sanitized,
            &signature.last_sample_raw_redacted,
        );

        let ctx = RemediationContext {
            signature,
            classification,
            window_count,
            window_days: days,
            spike,
            insight,
        };
        self.remediation.remediate(&ctx, mode).await
    }

    /// Newest audit events first, capped at `MAX_LIMIT`.
    pub async fn recent_activity(&self, limit: Option<usize>) -> Result<Vec<ActivityRecord>> {
        self.store.ensure_schema().await?;
        let limit = views::validate_limit(limit)?;
        self.store.list_activity(limit).await
    }

    fn classify(&self, row: &SignatureWindowRow) -> Classification {
        let agg = &row.aggregate;
        self.classifier.classify(
            &agg.signature_text,
            &agg.last_sample_sanitized,
            &agg.last_sample_raw_redacted,
        )
    }

    fn insight_batch(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_insight_batch)
            .clamp(1, self.max_insight_batch)
    }

    async fn candidates(
        &self,
        classified: &[(SignatureWindowRow, Classification)],
    ) -> Result<Vec<InsightCandidate>> {
        let all_time_count = self.store.all_time_error_count().await?;
        Ok(classified
            .iter()
            .map(|(row, c)| InsightCandidate {
                signature: row.aggregate.clone(),
                classification: c.clone(),
                window_count: row.window_count,
                all_time_count,
            })
            .collect())
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// The last `days` UTC days, ending today.
fn day_window(days: u32) -> DayWindow {
    let end = today();
    DayWindow {
        start: window_start(end, days),
        end,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests;
