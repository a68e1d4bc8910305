use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

use crate::core::pipeline::testkit::{Harness, line, line_at};
use crate::core::pipeline::{ListQuery, PipelineError};
use crate::core::store::InsightStatus;

async fn seeded() -> Harness {
    let h = Harness::new().await;
    for port in [5432, 5433, 5434] {
        h.append(&line(&format!("connect ECONNREFUSED 10.0.0.1:{port}")));
    }
    h.append(&line("SqliteError: database is locked"));
    h.pipeline.sync(CancellationToken::new()).await.unwrap();
    h
}

#[tokio::test]
async fn summary_end_to_end() {
    let h = seeded().await;
    let summary = h.pipeline.summary(Some(14)).await.unwrap();
    assert_eq!(summary.trend.len(), 14);
    assert_eq!(summary.totals.total_errors, 4);
    assert_eq!(summary.totals.unique_signatures, 2);
    assert_eq!(summary.top_signatures.len(), 2);
    assert_eq!(summary.top_signatures[0].window_count, 3);
    assert_eq!(summary.top_signatures[0].category, "network");
    assert_eq!(summary.top_signatures[1].window_count, 1);
    assert!(!summary.spike.detected);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["totals"]["total_errors"], "4");
    assert_eq!(json["trend"][13]["count"], "4");
    assert_eq!(json["trend"][0]["count"], "0");
}

#[tokio::test]
async fn old_events_count_all_time_only() {
    let h = Harness::new().await;
    h.append(&line_at(Utc::now() - Duration::days(30), "socket hang up"));
    h.append(&line("socket hang up"));
    h.pipeline.sync(CancellationToken::new()).await.unwrap();

    let summary = h.pipeline.summary(None).await.unwrap();
    assert_eq!(summary.totals.total_errors, 1);
    assert_eq!(summary.totals.all_time_errors, 2);
    let list = h.pipeline.list(&ListQuery::default()).await.unwrap();
    assert_eq!(list.signatures[0].count, 2);
    assert_eq!(list.signatures[0].window_count, 1);
}

#[tokio::test]
async fn future_dated_events_stay_out_of_the_window() {
    let h = Harness::new().await;
    h.append(&line("socket hang up"));
    h.append(&line_at(Utc::now() + Duration::days(2), "socket hang up"));
    h.pipeline.sync(CancellationToken::new()).await.unwrap();

    let summary = h.pipeline.summary(Some(14)).await.unwrap();
    assert_eq!(summary.totals.total_errors, 1);
    assert_eq!(summary.totals.all_time_errors, 2);
    assert_eq!(summary.top_signatures[0].window_count, 1);
    let list = h.pipeline.list(&ListQuery::default()).await.unwrap();
    assert_eq!(list.signatures[0].window_count, 1);
    assert_eq!(list.signatures[0].count, 2);
}

#[tokio::test]
async fn list_ranks_and_classifies() {
    let h = seeded().await;
    let list = h.pipeline.list(&ListQuery::default()).await.unwrap();
    assert_eq!(list.meta.days, 14);
    assert_eq!(list.meta.window_unique_signatures, 2);
    assert_eq!(list.signatures.len(), 2);
    assert_eq!(list.signatures[0].window_count, 3);
    assert_eq!(list.signatures[1].classification.category, "database");
    assert!(list.signatures.iter().all(|s| s.raw_sample.is_none()));
    assert!(list.signatures.iter().all(|s| s.insight.is_none()));
    assert_eq!(h.agents.calls(), 0);

    let limited = h
        .pipeline
        .list(&ListQuery {
            limit: Some(1),
            include_raw: true,
            ..ListQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.signatures.len(), 1);
    assert_eq!(limited.meta.window_unique_signatures, 2);
    assert!(limited.signatures[0].raw_sample.is_some());
}

#[tokio::test]
async fn out_of_range_arguments_are_rejected() {
    let h = seeded().await;
    let err = h
        .pipeline
        .list(&ListQuery {
            days: Some(91),
            ..ListQuery::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(
        PipelineError::of(&err),
        Some(PipelineError::InvalidArgument(_))
    ));
    assert!(h.pipeline.summary(Some(0)).await.is_err());
}

#[tokio::test]
async fn list_with_insights_generates_once() {
    let h = seeded().await;
    let query = ListQuery {
        insights: true,
        ..ListQuery::default()
    };
    let first = h.pipeline.list(&query).await.unwrap();
    assert_eq!(h.agents.calls(), 2);
    assert_eq!(first.meta.insight_attempts.len(), 2);
    for sig in &first.signatures {
        let insight = sig.insight.as_ref().unwrap();
        assert_eq!(insight.status, InsightStatus::Ready);
        assert!(insight.diagnosis_md.as_deref().unwrap().contains("database is down"));
    }

    let second = h.pipeline.list(&query).await.unwrap();
    assert_eq!(h.agents.calls(), 2);
    assert!(second.meta.insight_attempts.is_empty());
    assert!(second.signatures.iter().all(|s| s.insight.is_some()));
}

#[tokio::test]
async fn insight_limit_bounds_the_batch() {
    let h = seeded().await;
    let attempts = h.pipeline.generate_insights(Some(1)).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(h.agents.calls(), 1);

    // The next batch picks up the signature the first one left out.
    let attempts = h.pipeline.generate_insights(Some(1)).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(h.agents.calls(), 2);
}
