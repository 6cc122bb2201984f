//! altd - run allowlisted commands requested through an access log.

use std::path::PathBuf;

use altd::{CommandRegistry, Config, Dispatcher, FileTail, RegistryError};
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "altd <file> -w <commands...>";

/// Follow an access log and run allowlisted commands requested through it
#[derive(Debug, Parser)]
#[command(name = "altd", version, about, long_about = None)]
struct Cli {
    /// Access log to follow
    file: Option<PathBuf>,

    /// Comma-separated command allowlist
    #[arg(short = 'w', long = "whitelist", value_name = "COMMANDS")]
    whitelist: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter directive (e.g. "info", "altd=trace")
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Executions accepted per rate window
    #[arg(long)]
    max_per_window: Option<u32>,

    /// Rate window length in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Processes allowed in flight at once
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Minimum milliseconds between accepted executions
    #[arg(long)]
    min_interval_ms: Option<u64>,

    /// Per-process timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Combined stdout+stderr bytes before a process is killed
    #[arg(long)]
    max_output_bytes: Option<usize>,

    /// Discard command output instead of forwarding it
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        let g = &mut config.governor;
        if let Some(v) = self.max_per_window {
            g.max_per_window = v;
        }
        if let Some(v) = self.window_ms {
            g.window_ms = v;
        }
        if let Some(v) = self.max_concurrent {
            g.max_concurrent = v;
        }
        if let Some(v) = self.min_interval_ms {
            g.min_interval_ms = v;
        }
        if let Some(v) = self.timeout_ms {
            g.timeout_ms = v;
        }
        if let Some(v) = self.max_output_bytes {
            g.max_output_bytes = v;
        }
        if self.quiet {
            g.forward_output = false;
        }
    }
}

/// Split a comma-separated allowlist, trimming and dropping empty entries.
fn parse_allowlist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn usage_exit() -> ! {
    println!("{USAGE}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let (Some(file), Some(whitelist)) = (cli.file.clone(), cli.whitelist.as_deref()) else {
        usage_exit();
    };
    let allowlist = parse_allowlist(whitelist);
    if allowlist.is_empty() {
        usage_exit();
    }

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate()?;

    let dispatch_config = config.dispatch_config();
    let mut builder = CommandRegistry::builder()
        .search_path(dispatch_config.env.search_path())
        .max_arg_len(dispatch_config.parse.max_segment_len);
    for name in &allowlist {
        builder = builder.allow_with(name.clone(), config.policy_for(name)?);
    }
    let registry = match builder.build() {
        Ok(registry) => registry,
        Err(RegistryError::Empty) => {
            tracing::error!(allowlist = ?allowlist, "no allowlisted command resolved to an executable");
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    };

    let (lines, _tail) = FileTail::new(&file)
        .poll_interval(config.poll_interval())
        .max_line_len(dispatch_config.parse.max_line_len)
        .start()
        .await
        .with_context(|| format!("open {}", file.display()))?;

    let handle = Dispatcher::new(registry, dispatch_config).watch(lines);

    let stopper = handle.stopper();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.request_stop();
        }
    });

    let reason = handle.wait().await;
    tracing::debug!(reason = ?reason, "exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_trimmed() {
        assert_eq!(parse_allowlist(" echo, ls ,,"), vec!["echo", "ls"]);
        assert!(parse_allowlist(" , ,").is_empty());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "altd",
            "/var/log/access.log",
            "-w",
            "echo",
            "--max-per-window",
            "9",
            "--quiet",
        ]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.governor.max_per_window, 9);
        assert!(!config.governor.forward_output);
        assert_eq!(cli.whitelist.as_deref(), Some("echo"));
    }

    #[test]
    fn test_missing_arguments_parse() {
        // Missing operands are handled by the usage check, not by clap
        let cli = Cli::parse_from(["altd", "/var/log/access.log"]);
        assert!(cli.whitelist.is_none());
    }
}
