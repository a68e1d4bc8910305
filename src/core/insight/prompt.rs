use std::fmt::Write;

use super::InsightCandidate;
use crate::core::agents::AgentDescriptor;
use crate::core::store::types::ms_to_datetime;

pub const REQUIRED_HEADINGS: [&str; 4] = [
    "Likely Cause",
    "Action Plan",
    "Verification",
    "Escalation Trigger",
];

pub const MAX_WORDS: usize = 220;

/// Picks the agent that should write the diagnosis.
///
/// The configured main agent wins, matched by runtime id, then slug, then
/// display name, then session key prefix. Otherwise the most recently updated
/// agent that accepts work and is not in an error state.
pub fn select_agent<'a>(agents: &'a [AgentDescriptor], main: &str) -> Option<&'a AgentDescriptor> {
    let main = main.trim();
    if !main.is_empty() {
        let best = agents
            .iter()
            .filter_map(|a| main_match_rank(a, main).map(|rank| (rank, a)))
            .min_by_key(|(rank, _)| *rank);
        if let Some((_, agent)) = best {
            return Some(agent);
        }
    }

    agents
        .iter()
        .filter(|a| a.dispatch_eligible && !a.is_errored())
        .max_by_key(|a| a.updated_at.unwrap_or(i64::MIN))
}

fn main_match_rank(agent: &AgentDescriptor, main: &str) -> Option<u8> {
    let eq = |v: Option<&str>| v.is_some_and(|v| v.eq_ignore_ascii_case(main));
    if eq(agent.runtime_id.as_deref()) {
        return Some(0);
    }
    if eq(agent.slug.as_deref()) {
        return Some(1);
    }
    if eq(Some(agent.name())) {
        return Some(2);
    }
    let main = main.to_ascii_lowercase();
    let session = agent.session_key.as_deref()?.to_ascii_lowercase();
    if session.starts_with(&format!("agent:{main}:")) || session.starts_with(&format!("{main}:")) {
        return Some(3);
    }
    None
}

pub fn build_prompt(candidate: &InsightCandidate) -> String {
    let sig = &candidate.signature;
    let c = &candidate.classification;
    let mut p = String::new();

    let _ = writeln!(
        p,
        "You are diagnosing a recurring error from the gateway error log. \
         Reply in markdown with exactly these headings, in order:"
    );
    for heading in REQUIRED_HEADINGS {
        let _ = writeln!(p, "## {heading}");
    }
    let _ = writeln!(p);
    let _ = writeln!(p, "Constraints:");
    let _ = writeln!(p, "- At most {MAX_WORDS} words in total.");
    let _ = writeln!(
        p,
        "- Only use the evidence below. Do not invent internals, file names or config keys you cannot see."
    );
    let _ = writeln!(p, "- Never include secrets, tokens or credentials.");
    let _ = writeln!(p);

    let _ = writeln!(p, "# Signature");
    let _ = writeln!(p, "- Hash: {}", sig.signature_hash);
    let _ = writeln!(p, "- Text: {}", sig.signature_text);
    let _ = writeln!(p, "- Category: {}", c.category);
    let _ = writeln!(p, "- Severity: {}", c.severity.as_str());
    let _ = writeln!(p, "- Detectability: {}", c.detectability.as_str());
    let _ = writeln!(p, "- Confidence: {:.2}", c.confidence);
    let _ = writeln!(p, "- Occurrences in window: {}", candidate.window_count);
    let _ = writeln!(p, "- Occurrences all time: {}", sig.count);
    let _ = writeln!(p, "- Gateway errors all time: {}", candidate.all_time_count);
    let _ = writeln!(p, "- Last seen: {}", ms_to_datetime(sig.last_seen_at).to_rfc3339());
    let _ = writeln!(p);

    let _ = writeln!(p, "# Deterministic suggestions");
    if c.suggested_actions.is_empty() {
        let _ = writeln!(p, "- none");
    }
    for action in &c.suggested_actions {
        let _ = writeln!(p, "- {} ({}): {}", action.label, action.target(), action.description);
    }
    let _ = writeln!(p);

    let _ = writeln!(p, "# Evidence (redacted)");
    let _ = writeln!(p, "```");
    let _ = writeln!(p, "{}", evidence(candidate));
    let _ = writeln!(p, "```");
    p
}

fn evidence(candidate: &InsightCandidate) -> &str {
    let sig = &candidate.signature;
    if !sig.last_sample_raw_redacted.trim().is_empty() {
        &sig.last_sample_raw_redacted
    } else if !sig.last_sample_sanitized.trim().is_empty() {
        &sig.last_sample_sanitized
    } else {
        "(no sample captured)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::insight::tests::candidate;

    fn agent(id: &str) -> AgentDescriptor {
        AgentDescriptor::named(id)
    }

    #[test]
    fn main_agent_matches_in_priority_order() {
        let mut by_session = agent("s");
        by_session.session_key = Some("agent:main:default".to_string());
        let mut by_name = agent("n");
        by_name.display_name = Some("MAIN".to_string());
        let mut by_slug = agent("x");
        by_slug.slug = Some("main".to_string());
        let mut by_runtime = agent("r");
        by_runtime.runtime_id = Some("main".to_string());

        let all = vec![by_session, by_name, by_slug, by_runtime];
        assert_eq!(select_agent(&all, "main").unwrap().id, "r");
        assert_eq!(select_agent(&all[..3], "main").unwrap().id, "x");
        assert_eq!(select_agent(&all[..2], "main").unwrap().id, "n");
        assert_eq!(select_agent(&all[..1], "main").unwrap().id, "s");
    }

    #[test]
    fn falls_back_to_most_recent_eligible_agent() {
        let mut old = agent("old");
        old.updated_at = Some(10);
        let mut newest_broken = agent("broken");
        newest_broken.updated_at = Some(30);
        newest_broken.status = Some("error".to_string());
        let mut parked = agent("parked");
        parked.updated_at = Some(40);
        parked.dispatch_eligible = false;
        let mut fresh = agent("fresh");
        fresh.updated_at = Some(20);

        let all = vec![old, newest_broken, parked, fresh];
        assert_eq!(select_agent(&all, "main").unwrap().id, "fresh");
    }

    #[test]
    fn no_eligible_agent() {
        let mut parked = agent("parked");
        parked.dispatch_eligible = false;
        assert!(select_agent(&[], "main").is_none());
        assert!(select_agent(&[parked], "main").is_none());
    }

    #[test]
    fn prompt_carries_headings_limits_and_evidence() {
        let c = candidate("disk full: no space left on device", 4);
        let prompt = build_prompt(&c);
        for heading in REQUIRED_HEADINGS {
            assert!(prompt.contains(&format!("## {heading}")), "{heading}");
        }
        assert!(prompt.contains("At most 220 words"));
        assert!(prompt.contains(&c.signature.signature_hash));
        assert!(prompt.contains("Category: disk"));
        assert!(prompt.contains("Occurrences in window: 4"));
        assert!(prompt.contains("`df -h`"));
        assert!(prompt.contains("no space left on device"));
    }

    #[test]
    fn prompt_never_carries_a_secret_from_the_entry() {
        let c = candidate("ERROR upstream rejected key sk-proj-AbCdEfGhIjKlMnOp for tenant", 2);
        let prompt = build_prompt(&c);
        assert!(!prompt.contains("AbCdEfGhIjKlMnOp"));
        assert!(prompt.contains("[REDACTED]"));
    }

    #[test]
    fn evidence_falls_back_to_placeholder() {
        let mut c = candidate("x", 1);
        c.signature.last_sample_raw_redacted.clear();
        c.signature.last_sample_sanitized.clear();
        assert!(build_prompt(&c).contains("(no sample captured)"));
    }
}
