use crate::core::classifier::Severity;
use crate::core::work::Priority;

/// First matching rule wins.
pub fn priority_for(
    severity: Severity,
    actionable: bool,
    spike_detected: bool,
    window_count: i64,
) -> Priority {
    if severity == Severity::Critical {
        return Priority::P0;
    }
    if spike_detected && window_count >= 10 {
        return Priority::P0;
    }
    if window_count >= 500 {
        return Priority::P0;
    }
    if severity == Severity::High {
        return Priority::P1;
    }
    if actionable && window_count >= 25 {
        return Priority::P1;
    }
    Priority::P2
}
