mod report;
mod serve;

use anyhow::{Context, Result, bail};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::core::config::Config;
use crate::core::pipeline::{ErrorPipeline, ListQuery};
use crate::core::remediation::RemediationMode;
use crate::core::terminal::{self, GuideSection};
use crate::logging::{self, BroadcastMakeWriter};
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    GuideSection::new("Errors")
        .command("sync", "Read new gateway error log lines into the store")
        .command("list", "Show the busiest error signatures")
        .command("summary", "Show the daily trend, totals and spike status")
        .command("insights", "Ask the main agent to diagnose top signatures")
        .command("remediate <hash>", "Open a work order for a signature")
        .print();

    GuideSection::new("Service")
        .command("serve", "Run the HTTP API and the scheduled sync")
        .command("help", "Show this help")
        .print();

    GuideSection::new("Flags")
        .command("--json", "Print machine-readable output")
        .command("--log <path>", "Error log to read (overrides config)")
        .command("--days <n>", "Window length in days (1-90, default 14)")
        .command("--limit <n>", "Rows for list, batch size for insights")
        .command("--raw", "Include the redacted raw sample in list output")
        .command("--insights", "Generate missing diagnoses before listing")
        .command("--start", "Start the work order right after creating it")
        .command("--api-host <host>", "API bind host for serve")
        .command("--api-port <port>", "API bind port for serve")
        .command("--verbose", "Debug logging")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("errsight").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CommandFlags {
    pub json: bool,
    pub verbose: bool,
    pub log: Option<PathBuf>,
    pub days: Option<u32>,
    pub limit: Option<usize>,
    pub include_raw: bool,
    pub insights: bool,
    pub start: bool,
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
    pub positional: Vec<String>,
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("{flag} needs a value"))
}

pub(crate) fn parse_command_flags(args: &[String], start: usize) -> Result<CommandFlags> {
    let mut flags = CommandFlags::default();
    let mut i = start;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--json" => flags.json = true,
            "--verbose" | "-v" => flags.verbose = true,
            "--raw" | "--include-raw" => flags.include_raw = true,
            "--insights" => flags.insights = true,
            "--start" => flags.start = true,
            "--log" => {
                flags.log = Some(PathBuf::from(flag_value(args, i, arg)?));
                i += 1;
            }
            "--days" => {
                let v = flag_value(args, i, arg)?;
                flags.days = Some(v.parse().with_context(|| format!("Invalid --days '{v}'"))?);
                i += 1;
            }
            "--limit" => {
                let v = flag_value(args, i, arg)?;
                flags.limit = Some(v.parse().with_context(|| format!("Invalid --limit '{v}'"))?);
                i += 1;
            }
            "--api-host" => {
                flags.api_host = Some(flag_value(args, i, arg)?.to_string());
                i += 1;
            }
            "--api-port" => {
                let v = flag_value(args, i, arg)?;
                flags.api_port = Some(v.parse().with_context(|| format!("Invalid --api-port '{v}'"))?);
                i += 1;
            }
            other if other.starts_with("--") => bail!("Unknown flag '{}'", other),
            other => flags.positional.push(other.to_string()),
        }
        i += 1;
    }
    Ok(flags)
}

impl CommandFlags {
    fn apply_to(&self, config: &mut Config) {
        // A path typed on the command line is relative to where it was typed.
        if let Some(log) = &self.log {
            config.source.log_path = Some(std::path::absolute(log).unwrap_or_else(|_| log.clone()));
        }
        if let Some(host) = &self.api_host {
            config.api.host = host.clone();
        }
        if let Some(port) = self.api_port {
            config.api.port = port;
        }
    }

    fn list_query(&self) -> ListQuery {
        ListQuery {
            days: self.days,
            limit: self.limit,
            include_raw: self.include_raw,
            insights: self.insights,
            insight_limit: None,
        }
    }
}

/// Cancels `token` on Ctrl+C so a long sync stops at the next entry boundary.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("help");
    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let flags = parse_command_flags(&args, 2)?;
    let mut config = Config::load(NativePlatform::data_dir()).await?;
    flags.apply_to(&mut config);

    let (log_tx, _) = broadcast::channel(500);
    let level = if flags.verbose {
        tracing::Level::DEBUG
    } else {
        config.tracing_level()
    };
    // One-shot commands print their own output; log lines would interleave.
    let suppress_stdout = cmd != "serve" && (flags.json || !flags.verbose);
    logging::init(
        level,
        BroadcastMakeWriter {
            sender: log_tx.clone(),
            suppress_stdout,
        },
    );

    match cmd {
        "sync" => {
            let pipeline = ErrorPipeline::open(&config).await?;
            let token = CancellationToken::new();
            cancel_on_ctrl_c(token.clone());
            let result = pipeline.sync(token).await?;
            if flags.json {
                print_json(&result)
            } else {
                report::print_sync(&result);
                Ok(())
            }
        }
        "list" => {
            let pipeline = ErrorPipeline::open(&config).await?;
            let list = pipeline.list(&flags.list_query()).await?;
            if flags.json {
                print_json(&list)
            } else {
                report::print_list(&list);
                Ok(())
            }
        }
        "summary" => {
            let pipeline = ErrorPipeline::open(&config).await?;
            let summary = pipeline.summary(flags.days).await?;
            if flags.json {
                print_json(&summary)
            } else {
                report::print_summary(&summary);
                Ok(())
            }
        }
        "insights" => {
            let pipeline = ErrorPipeline::open(&config).await?;
            let attempts = pipeline.generate_insights(flags.limit).await?;
            if flags.json {
                print_json(&attempts)
            } else {
                report::print_attempts(&attempts);
                Ok(())
            }
        }
        "remediate" => {
            let Some(hash) = flags.positional.first() else {
                bail!("Usage: errsight remediate <signature-hash> [--start]");
            };
            let mode = if flags.start {
                RemediationMode::CreateAndStart
            } else {
                RemediationMode::Create
            };
            let pipeline = ErrorPipeline::open(&config).await?;
            let result = pipeline.remediate(hash, mode).await?;
            if flags.json {
                print_json(&result)
            } else {
                report::print_remediation(&result);
                Ok(())
            }
        }
        "serve" => {
            let pipeline = Arc::new(ErrorPipeline::open(&config).await?);
            serve::run(pipeline, &config, log_tx).await?;
            terminal::print_goodbye();
            Ok(())
        }
        other => {
            print_help();
            bail!("Unknown command '{}'", other)
        }
    }
}
