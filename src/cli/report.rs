use chrono::DateTime;
use console::style;

use crate::core::insight::{InsightAttempt, InsightOutcome};
use crate::core::pipeline::{SignatureList, Summary, SyncResult};
use crate::core::remediation::RemediationResult;
use crate::core::store::InsightStatus;
use crate::core::terminal::{self, clip, severity_label, sparkline};

fn when(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub(super) fn print_sync(result: &SyncResult) {
    if result.processed_events == 0 && !result.cursor_reset {
        terminal::print_info(&format!("No new errors in {}", result.source_path));
    } else {
        terminal::print_success(&format!(
            "Synced {} error events ({} signatures, {} days) in {}ms",
            result.processed_events,
            result.signatures_updated,
            result.days_updated,
            result.duration_ms
        ));
    }
    if result.cursor_reset {
        terminal::print_warn("Log was rotated or truncated; read from the start.");
    }
    if result.stopped_early {
        terminal::print_warn("Stopped before the end of the log; run sync again to continue.");
    }
}

pub(super) fn print_list(list: &SignatureList) {
    if list.signatures.is_empty() {
        terminal::print_info(&format!("No errors in the last {} days.", list.meta.days));
        return;
    }
    terminal::print_step(&format!(
        "{} of {} signatures in the last {} days",
        list.signatures.len(),
        list.meta.window_unique_signatures,
        list.meta.days
    ));
    for sig in &list.signatures {
        let c = &sig.classification;
        println!(
            "\n {}  {}  {} {}",
            style(format!("{:>6}", sig.window_count)).bold(),
            clip(&sig.signature_text, 100),
            severity_label(c.severity),
            style(&c.category).dim()
        );
        println!(
            "         {}  total {}  last seen {}",
            style(&sig.signature_hash[..sig.signature_hash.len().min(12)]).cyan(),
            sig.count,
            when(sig.last_seen_at)
        );
        if let Some(raw) = &sig.raw_sample {
            for line in raw.lines().take(6) {
                println!("         {}", style(clip(line, 120)).dim());
            }
        }
        match &sig.insight {
            Some(i) if i.status == InsightStatus::Ready => {
                if let Some(diagnosis) = &i.diagnosis_md {
                    for line in diagnosis.lines().filter(|l| !l.trim().is_empty()).take(4) {
                        println!("         {}", style(clip(line, 120)).green());
                    }
                }
            }
            Some(i) if i.status == InsightStatus::Failed => {
                let reason = i.failure_reason.as_deref().unwrap_or("unknown");
                println!("         {}", style(format!("diagnosis failed: {reason}")).yellow());
            }
            Some(_) => println!("         {}", style("diagnosis pending").dim()),
            None => {}
        }
    }
    println!();
}

pub(super) fn print_summary(summary: &Summary) {
    terminal::print_step(&format!(
        "Gateway errors since {} ({} days)",
        summary.window_start, summary.days
    ));
    terminal::print_status("Trend", &sparkline(&summary.trend));
    terminal::print_status("Errors in window", &summary.totals.total_errors.to_string());
    terminal::print_status(
        "Unique signatures",
        &summary.totals.unique_signatures.to_string(),
    );
    terminal::print_status("All time", &summary.totals.all_time_errors.to_string());
    if summary.spike.detected {
        terminal::print_spike(summary.spike.yesterday, summary.spike.baseline);
    }
    if summary.top_signatures.is_empty() {
        return;
    }
    println!();
    for top in &summary.top_signatures {
        println!(
            " {}  {}  {} {}",
            style(format!("{:>6}", top.window_count)).bold(),
            clip(&top.signature_text, 90),
            severity_label(top.severity),
            style(&top.category).dim()
        );
    }
    println!();
}

pub(super) fn print_attempts(attempts: &[InsightAttempt]) {
    if attempts.is_empty() {
        terminal::print_info("All diagnoses are current.");
        return;
    }
    for attempt in attempts {
        let hash = &attempt.signature_hash[..attempt.signature_hash.len().min(12)];
        match attempt.outcome {
            InsightOutcome::Ready => terminal::print_success(&format!("{hash}: diagnosed")),
            InsightOutcome::Failed => terminal::print_warn(&format!("{hash}: diagnosis failed")),
            other => terminal::print_info(&format!("{hash}: {}", other.as_str())),
        }
    }
}

pub(super) fn print_remediation(result: &RemediationResult) {
    terminal::print_success(&format!(
        "Created work order {} ({})",
        result.code, result.priority
    ));
    terminal::print_status("Id", &result.work_order_id);
    if result.started {
        if let Some(workflow) = &result.workflow_id {
            terminal::print_status("Workflow", workflow);
        }
        if let Some(agent) = &result.agent_id {
            terminal::print_status("Agent", agent);
        }
    }
    if let Some(err) = &result.start_error {
        terminal::print_warn(&format!("Work order was created but not started: {err}"));
    }
}
