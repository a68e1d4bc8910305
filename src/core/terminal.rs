use console::{Emoji, StyledObject, style};

use crate::core::classifier::Severity;
use crate::core::trend::TrendPoint;

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static FIRE: Emoji<'_, '_> = Emoji("🔥 ", "! ");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

pub fn print_spike(yesterday: i64, baseline: f64) {
    println!(
        "{} {}",
        FIRE,
        style(format!(
            "Spike: {} errors yesterday against a 7-day mean of {:.2}",
            yesterday, baseline
        ))
        .red()
        .bold()
    );
}

pub fn severity_label(severity: Severity) -> StyledObject<&'static str> {
    let s = style(severity.as_str());
    match severity {
        Severity::Critical => s.red().bold(),
        Severity::High => s.red(),
        Severity::Medium => s.yellow(),
        Severity::Low => s.dim(),
    }
}

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One character per day, scaled to the busiest day in the window.
pub fn sparkline(trend: &[TrendPoint]) -> String {
    let max = trend.iter().map(|p| p.count).max().unwrap_or(0);
    trend
        .iter()
        .map(|p| {
            if max <= 0 || p.count <= 0 {
                ' '
            } else {
                let idx = ((p.count * (BARS.len() as i64 - 1)) / max) as usize;
                BARS[idx.min(BARS.len() - 1)]
            }
        })
        .collect()
}

/// Cuts `text` to `max` characters, marking the cut with an ellipsis.
pub fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

enum GuideRow {
    Command(String, String),
    Status(String, String),
}

/// A titled block of aligned rows for help and status screens.
pub struct GuideSection {
    title: String,
    rows: Vec<GuideRow>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, about: &str) -> Self {
        self.rows
            .push(GuideRow::Command(name.to_string(), about.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.rows
            .push(GuideRow::Status(label.to_string(), value.to_string()));
        self
    }

    pub fn print(&self) {
        println!("\n {}", style(&self.title).bold().underlined());
        let width = self
            .rows
            .iter()
            .map(|row| match row {
                GuideRow::Command(name, _) | GuideRow::Status(name, _) => name.chars().count(),
            })
            .max()
            .unwrap_or(0);
        for row in &self.rows {
            match row {
                GuideRow::Command(name, about) => {
                    println!("   {}  {}", style(format!("{name:<width$}")).green(), about)
                }
                GuideRow::Status(label, value) => {
                    println!("   {}  {}", style(format!("{label:<width$}")).cyan(), value)
                }
            }
        }
    }
}

pub fn print_goodbye() {
    println!("\n{} {}", SPARKLE, style("errsight stopped.").bold().cyan());
}
