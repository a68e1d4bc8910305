use std::fmt::Write;

use super::RemediationContext;
use crate::core::ingest::signature::truncate_chars;
use crate::core::store::InsightStatus;
use crate::core::store::types::ms_to_datetime;

const TITLE_TEXT_MAX_CHARS: usize = 90;
pub const NO_EVIDENCE: &str = "(no sample captured)";

pub const ACCEPTANCE_CRITERIA: [&str; 4] = [
    "Root cause documented",
    "Concrete fix applied",
    "Signature trend declining over 24h",
    "Validation evidence attached",
];

pub fn build_title(ctx: &RemediationContext) -> String {
    format!(
        "Fix {} gateway error: {}",
        ctx.classification.category,
        truncate_chars(&ctx.signature.signature_text, TITLE_TEXT_MAX_CHARS)
    )
}

pub fn build_tags(ctx: &RemediationContext) -> Vec<String> {
    vec![
        "bug".to_string(),
        "incident".to_string(),
        "gateway-error".to_string(),
        format!("signature:{}", ctx.signature.signature_hash),
        format!("category:{}", ctx.classification.category),
    ]
}

fn evidence(ctx: &RemediationContext) -> &str {
    let sig = &ctx.signature;
    [&sig.last_sample_raw_redacted, &sig.last_sample_sanitized]
        .into_iter()
        .find(|s| !s.trim().is_empty())
        .map(String::as_str)
        .unwrap_or(NO_EVIDENCE)
}

fn diagnosis(ctx: &RemediationContext) -> String {
    let ready = ctx
        .insight
        .as_ref()
        .filter(|i| i.status == InsightStatus::Ready)
        .and_then(|i| i.diagnosis_md.as_deref())
        .filter(|d| !d.trim().is_empty());
    match ready {
        Some(d) => d.trim().to_string(),
        None => format!(
            "No AI diagnosis yet. Classifier assessment: {}",
            ctx.classification.explanation
        ),
    }
}

pub fn build_goal(ctx: &RemediationContext) -> String {
    let sig = &ctx.signature;
    let c = &ctx.classification;
    let mut g = String::new();

    let _ = writeln!(g, "## Error signature");
    let _ = writeln!(g, "- Hash: `{}`", sig.signature_hash);
    let _ = writeln!(g, "- Text: {}", sig.signature_text);
    let _ = writeln!(
        g,
        "- Category: {} (severity {}, {}, confidence {:.2})",
        c.category,
        c.severity.as_str(),
        c.detectability.as_str(),
        c.confidence
    );
    let _ = writeln!(
        g,
        "- Occurrences: {} in the last {} days, {} all time",
        ctx.window_count, ctx.window_days, sig.count
    );
    let _ = writeln!(g, "- First seen: {}", ms_to_datetime(sig.first_seen_at).to_rfc3339());
    let _ = writeln!(g, "- Last seen: {}", ms_to_datetime(sig.last_seen_at).to_rfc3339());
    let _ = writeln!(g);

    let _ = writeln!(g, "## Spike");
    let _ = writeln!(g, "- Detected: {}", if ctx.spike.detected { "yes" } else { "no" });
    let _ = writeln!(g, "- Yesterday: {}", ctx.spike.yesterday);
    let _ = writeln!(g, "- Baseline: {:.2}", ctx.spike.baseline);
    let _ = writeln!(g);

    let _ = writeln!(g, "## Evidence (redacted)");
    let _ = writeln!(g, "```");
    let _ = writeln!(g, "{}", evidence(ctx));
    let _ = writeln!(g, "```");
    let _ = writeln!(g);

    let _ = writeln!(g, "## Diagnosis");
    let _ = writeln!(g, "{}", diagnosis(ctx));
    let _ = writeln!(g);

    let _ = writeln!(g, "## Suggested actions");
    for action in &c.suggested_actions {
        let _ = writeln!(
            g,
            "- **{}** ({}): {}",
            action.label,
            action.target(),
            action.description
        );
    }
    let _ = writeln!(g);

    let _ = writeln!(g, "## Acceptance criteria");
    for item in ACCEPTANCE_CRITERIA {
        let _ = writeln!(g, "- [ ] {item}");
    }
    g
}
