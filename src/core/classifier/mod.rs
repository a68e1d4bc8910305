//! Deterministic mapping from a signature to a category, severity and the
//! actions worth suggesting. Pure: the same input always yields the same
//! classification, so it is recomputed on every read.

mod rules;

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::warn;

use rules::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/// How directly the evidence identifies the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Detectability {
    /// A well-known error code or message.
    Deterministic,
    /// Keyword or configured match.
    Heuristic,
    Unclassified,
}

impl Detectability {
    pub fn as_str(self) -> &'static str {
        match self {
            Detectability::Deterministic => "deterministic",
            Detectability::Heuristic => "heuristic",
            Detectability::Unclassified => "unclassified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Maintenance,
    Command,
    Config,
    Investigate,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Maintenance => "maintenance",
            ActionKind::Command => "command",
            ActionKind::Config => "config",
            ActionKind::Investigate => "investigate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SuggestedAction {
    pub kind: ActionKind,
    pub label: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_action: Option<String>,
}

impl SuggestedAction {
    fn new(kind: ActionKind, label: &str, description: &str) -> Self {
        Self {
            kind,
            label: label.to_string(),
            description: description.to_string(),
            command: None,
            maintenance_action: None,
        }
    }

    pub fn maintenance(label: &str, description: &str, action_id: &str) -> Self {
        Self {
            maintenance_action: Some(action_id.to_string()),
            ..Self::new(ActionKind::Maintenance, label, description)
        }
    }

    pub fn command(label: &str, description: &str, command: &str) -> Self {
        Self {
            command: Some(command.to_string()),
            ..Self::new(ActionKind::Command, label, description)
        }
    }

    pub fn config(label: &str, description: &str) -> Self {
        Self::new(ActionKind::Config, label, description)
    }

    pub fn investigate(label: &str, description: &str) -> Self {
        Self::new(ActionKind::Investigate, label, description)
    }

    /// What the action points at: a maintenance action id, a command, or its kind.
    pub fn target(&self) -> String {
        if let Some(id) = &self.maintenance_action {
            return format!("maintenance:{id}");
        }
        if let Some(cmd) = &self.command {
            return format!("`{cmd}`");
        }
        self.kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Classification {
    pub category: String,
    pub severity: Severity,
    pub detectability: Detectability,
    pub confidence: f64,
    pub actionable: bool,
    pub explanation: String,
    pub suggested_actions: Vec<SuggestedAction>,
}

/// An extra rule from `[[classifier.rules]]`, checked before the built-in table.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub category: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    pub pattern: String,
    #[serde(default = "default_actionable")]
    pub actionable: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub explanation: Option<String>,
}

fn default_actionable() -> bool {
    true
}

impl RuleConfig {
    pub fn severity_or_default(&self) -> Severity {
        self.severity.unwrap_or(Severity::Medium)
    }

    fn compile(&self) -> Result<Rule, regex::Error> {
        Ok(Rule {
            category: self.category.clone(),
            severity: self.severity_or_default(),
            detectability: Detectability::Heuristic,
            confidence: self.confidence.unwrap_or(0.7).clamp(0.0, 1.0),
            actionable: self.actionable,
            explanation: self
                .explanation
                .clone()
                .unwrap_or_else(|| format!("Matched the configured {} rule.", self.category)),
            pattern: Regex::new(&self.pattern)?,
            actions: vec![SuggestedAction::investigate(
                "Follow the team runbook",
                &format!("Apply the runbook for {} errors.", self.category),
            )],
        })
    }
}

static BUILTIN_RULES: LazyLock<Vec<Rule>> = LazyLock::new(rules::builtin_rules);

#[derive(Default)]
pub struct Classifier {
    custom: Vec<Rule>,
}

impl Classifier {
    /// Compiles configured rules; a rule whose pattern does not compile is
    /// skipped with a warning rather than failing startup.
    pub fn new(configured: &[RuleConfig]) -> Self {
        let mut custom = Vec::with_capacity(configured.len());
        for rule in configured {
            match rule.compile() {
                Ok(compiled) => custom.push(compiled),
                Err(e) => warn!(
                    "Ignoring classifier rule for '{}': invalid pattern: {}",
                    rule.category, e
                ),
            }
        }
        Self { custom }
    }

    pub fn classify(&self, signature_text: &str, sample: &str, raw_sample: &str) -> Classification {
        let haystack = format!("{signature_text}\n{sample}\n{raw_sample}");
        let matched = self
            .custom
            .iter()
            .chain(BUILTIN_RULES.iter())
            .find(|rule| rule.pattern.is_match(&haystack));

        match matched {
            Some(rule) => Classification {
                category: rule.category.clone(),
                severity: rule.severity,
                detectability: rule.detectability,
                confidence: rule.confidence,
                actionable: rule.actionable,
                explanation: rule.explanation.clone(),
                suggested_actions: rule.actions.clone(),
            },
            None => unclassified(),
        }
    }
}

fn unclassified() -> Classification {
    Classification {
        category: "unknown".to_string(),
        severity: Severity::Low,
        detectability: Detectability::Unclassified,
        confidence: 0.2,
        actionable: false,
        explanation: "No known failure pattern matched this signature.".to_string(),
        suggested_actions: vec![SuggestedAction::investigate(
            "Review the raw entry",
            "Read the redacted sample and add a classifier rule if this recurs.",
        )],
    }
}
