use regex::Regex;

use super::{Detectability, Severity, SuggestedAction};

pub(super) struct Rule {
    pub category: String,
    pub severity: Severity,
    pub detectability: Detectability,
    pub confidence: f64,
    pub actionable: bool,
    pub explanation: String,
    pub pattern: Regex,
    pub actions: Vec<SuggestedAction>,
}

struct BuiltinRule {
    category: &'static str,
    severity: Severity,
    detectability: Detectability,
    confidence: f64,
    pattern: &'static str,
    explanation: &'static str,
    actions: fn() -> Vec<SuggestedAction>,
}

/// Evaluated top to bottom; the first match wins. More specific categories
/// sit above the broad ones that would also match (database before network,
/// rate limit before provider).
const BUILTIN: &[BuiltinRule] = &[
    BuiltinRule {
        category: "crash",
        severity: Severity::Critical,
        detectability: Detectability::Deterministic,
        confidence: 0.9,
        pattern: r"(?i)\b(panic(ked)?|segfault|segmentation fault|uncaught exception|unhandled (promise )?rejection|fatal error|core dumped|SIGSEGV|SIGABRT)\b",
        explanation: "The gateway process crashed or hit an unhandled failure path.",
        actions: || {
            vec![
                SuggestedAction::maintenance(
                    "Restart gateway",
                    "Restart the gateway so in-flight work resumes on a clean process.",
                    "restart_gateway",
                ),
                SuggestedAction::investigate(
                    "Capture the stack trace",
                    "Attach the full stack trace and the request that triggered it to the incident.",
                ),
            ]
        },
    },
    BuiltinRule {
        category: "memory",
        severity: Severity::Critical,
        detectability: Detectability::Deterministic,
        confidence: 0.9,
        pattern: r"(?i)(out of memory|\bOOM\b|heap out of memory|cannot allocate memory|ENOMEM|memory limit exceeded)",
        explanation: "The process ran out of memory.",
        actions: || {
            vec![
                SuggestedAction::command(
                    "Check memory pressure",
                    "Inspect resident memory of the gateway and its workers.",
                    "ps -o pid,rss,command -C node",
                ),
                SuggestedAction::config(
                    "Raise the memory limit",
                    "Increase the heap or container memory limit, or reduce concurrency.",
                ),
            ]
        },
    },
    BuiltinRule {
        category: "disk",
        severity: Severity::Critical,
        detectability: Detectability::Deterministic,
        confidence: 0.9,
        pattern: r"(?i)(no space left on device|ENOSPC|disk (is )?full|read-only file system|EROFS)",
        explanation: "Writes are failing because the disk is full or read-only.",
        actions: || {
            vec![
                SuggestedAction::command(
                    "Check free space",
                    "Find which volume is full.",
                    "df -h",
                ),
                SuggestedAction::maintenance(
                    "Prune old logs",
                    "Rotate and delete archived logs to reclaim space.",
                    "prune_logs",
                ),
            ]
        },
    },
    BuiltinRule {
        category: "database",
        severity: Severity::High,
        detectability: Detectability::Deterministic,
        confidence: 0.85,
        pattern: r#"(?i)(SQLITE_BUSY|SQLITE_CORRUPT|SQLITE_LOCKED|database (is )?locked|database disk image is malformed|deadlock detected|too many connections|connection pool (timed out|exhausted)|relation "[^"]*" does not exist|no such table)"#,
        explanation: "The database rejected or stalled a query.",
        actions: || {
            vec![
                SuggestedAction::maintenance(
                    "Run database integrity check",
                    "Verify the database file and rebuild indexes if needed.",
                    "db_integrity_check",
                ),
                SuggestedAction::investigate(
                    "Look for long-running writers",
                    "Identify the transaction holding the lock when the error fired.",
                ),
            ]
        },
    },
    BuiltinRule {
        category: "auth",
        severity: Severity::High,
        detectability: Detectability::Deterministic,
        confidence: 0.85,
        pattern: r"(?i)(\b401\b|unauthori[sz]ed|invalid[ _]api[ _]key|incorrect api key|authentication (failed|error)|invalid[ _]token|token (has )?expired|jwt expired)",
        explanation: "A credential was rejected by the service it was sent to.",
        actions: || {
            vec![
                SuggestedAction::config(
                    "Rotate the credential",
                    "Check which key or token is in use and replace it if it was revoked or expired.",
                ),
                SuggestedAction::command(
                    "Verify configured keys",
                    "List the credentials the gateway currently resolves.",
                    "printenv | cut -d= -f1 | grep -Ei 'key|token'",
                ),
            ]
        },
    },
    BuiltinRule {
        category: "permission",
        severity: Severity::Medium,
        detectability: Detectability::Deterministic,
        confidence: 0.8,
        pattern: r"(?i)(EACCES|EPERM|permission denied|operation not permitted|\b403\b|\bforbidden\b)",
        explanation: "The process lacks permission for a file, socket or remote resource.",
        actions: || {
            vec![SuggestedAction::investigate(
                "Check ownership and scopes",
                "Compare the path or API scope in the error with what the gateway user is granted.",
            )]
        },
    },
    BuiltinRule {
        category: "rate_limit",
        severity: Severity::Medium,
        detectability: Detectability::Deterministic,
        confidence: 0.85,
        pattern: r"(?i)(\b429\b|rate[ _-]?limit|too many requests|quota exceeded|resource[_ ]exhausted|throttl)",
        explanation: "An upstream service is throttling requests.",
        actions: || {
            vec![
                SuggestedAction::config(
                    "Add backoff",
                    "Enable retry with exponential backoff for the throttled client.",
                ),
                SuggestedAction::investigate(
                    "Check provider quota",
                    "Compare current usage with the plan's limits.",
                ),
            ]
        },
    },
    BuiltinRule {
        category: "provider",
        severity: Severity::High,
        detectability: Detectability::Heuristic,
        confidence: 0.7,
        pattern: r"(?i)(overloaded_error|model not found|context length exceeded|maximum context length|\b(openai|anthropic|gemini|provider|upstream|model)\b.*\b(overloaded|unavailable|50[0234]|bad gateway|internal server error)\b)",
        explanation: "The model provider returned an error or was unavailable.",
        actions: || {
            vec![
                SuggestedAction::config(
                    "Configure a fallback provider",
                    "Route requests to a secondary model while the primary is degraded.",
                ),
                SuggestedAction::investigate(
                    "Check provider status",
                    "Confirm whether the provider reports an ongoing incident.",
                ),
            ]
        },
    },
    BuiltinRule {
        category: "network",
        severity: Severity::Medium,
        detectability: Detectability::Deterministic,
        confidence: 0.8,
        pattern: r"(?i)(ECONNREFUSED|ECONNRESET|ETIMEDOUT|EHOSTUNREACH|ENOTFOUND|EAI_AGAIN|connection (refused|reset|timed out|closed)|socket hang up|network (is )?unreachable|getaddrinfo|dns (lookup|resolution) failed|tls handshake|certificate (verify failed|has expired)|\btimed? ?out\b)",
        explanation: "A network call failed before a response arrived.",
        actions: || {
            vec![
                SuggestedAction::command(
                    "Probe the endpoint",
                    "Check reachability of the host named in the error.",
                    "curl -sv --max-time 5 <host>",
                ),
                SuggestedAction::investigate(
                    "Correlate with upstream health",
                    "See whether the failures cluster around a deploy or provider incident.",
                ),
            ]
        },
    },
    BuiltinRule {
        category: "config",
        severity: Severity::High,
        detectability: Detectability::Heuristic,
        confidence: 0.75,
        pattern: r"(?i)(missing (required )?(config|configuration|setting|env|environment variable)|invalid (config|configuration|setting)|config(uration)? (error|invalid)|failed to (load|read|parse) config|environment variable .* (is )?(not set|missing)|unknown (option|setting))",
        explanation: "The gateway's configuration is missing or invalid.",
        actions: || {
            vec![
                SuggestedAction::maintenance(
                    "Validate configuration",
                    "Re-run configuration validation and fix the reported keys.",
                    "validate_config",
                ),
            ]
        },
    },
    BuiltinRule {
        category: "parse",
        severity: Severity::Low,
        detectability: Detectability::Heuristic,
        confidence: 0.65,
        pattern: r"(?i)(SyntaxError|unexpected token|JSON\.parse|invalid json|failed to (parse|deserialize)|parse error|unexpected end of (json )?input|deserializ)",
        explanation: "A payload could not be parsed.",
        actions: || {
            vec![SuggestedAction::investigate(
                "Capture the offending payload",
                "Log the raw payload (redacted) that failed to parse and check its producer.",
            )]
        },
    },
];

pub(super) fn builtin_rules() -> Vec<Rule> {
    BUILTIN
        .iter()
        .map(|r| Rule {
            category: r.category.to_string(),
            severity: r.severity,
            detectability: r.detectability,
            confidence: r.confidence,
            actionable: true,
            explanation: r.explanation.to_string(),
            pattern: Regex::new(r.pattern).expect("built-in classifier pattern is valid"),
            actions: (r.actions)(),
        })
        .collect()
}
