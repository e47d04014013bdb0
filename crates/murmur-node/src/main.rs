//! `murmur`: a broadcast node speaking JSON lines on stdin/stdout
//!
//! Logs go to stderr; stdout carries protocol traffic only.

use anyhow::{Context, Result};
use clap::Parser;
use murmur_core::{NodeConfig, NodeId, StrategyKind};
use murmur_node::StdioRuntime;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(about = "Broadcast dissemination node for JSON-lines message substrates", long_about = None)]
struct Cli {
    /// Config file path (defaults apply when it does not exist)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fan-out strategy: flood or leader-batch
    #[arg(short, long)]
    strategy: Option<StrategyKind>,

    /// Leader node id for leader-batch mode
    #[arg(long)]
    leader: Option<String>,

    /// Leader flush interval in milliseconds
    #[arg(long)]
    flush_interval_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Tracing filter directives, e.g. `murmur_broadcast=trace,info`
    #[arg(long)]
    log_filter: Option<String>,
}

impl Cli {
    /// File, then `MURMUR_*` variables, then flags
    fn resolve_config<I>(&self, vars: I) -> Result<NodeConfig>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load_or_default(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::default(),
        };
        config.merge_with_vars(vars).context("applying environment overrides")?;

        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(leader) = &self.leader {
            config.leader = NodeId::new(leader.as_str());
        }
        if let Some(interval) = self.flush_interval_ms {
            config.flush_interval_ms = interval;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn log_filter(&self) -> Result<EnvFilter> {
        let directives = match &self.log_filter {
            Some(directives) => directives.as_str(),
            None if self.verbose => "debug",
            None => "info",
        };
        EnvFilter::try_new(directives).with_context(|| format!("invalid log filter `{directives}`"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.log_filter()?)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.resolve_config(std::env::vars())?;
    tracing::info!(
        strategy = %config.strategy,
        leader = %config.leader,
        flush_interval_ms = config.flush_interval_ms,
        "Starting murmur node"
    );

    let runtime = StdioRuntime::new(&config);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let report = runtime
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown)
        .await?;

    tracing::info!(
        drained = report.drained,
        aborted = report.aborted,
        "Node stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_flags() {
        let cli = Cli::try_parse_from(["murmur"]).unwrap();
        let config = cli.resolve_config(Vec::new()).unwrap();
        assert_eq!(config, NodeConfig::default());
    }

    #[test]
    fn flags_override_file_and_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "strategy = \"flood\"\nleader = \"n3\"\nflush_interval_ms = 50").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::try_parse_from([
            "murmur",
            "--config",
            &path,
            "--strategy",
            "leader-batch",
            "--flush-interval-ms",
            "75",
        ])
        .unwrap();
        let config = cli
            .resolve_config(vars(&[("MURMUR_LEADER", "n2"), ("MURMUR_RETRY_MAX_ATTEMPTS", "7")]))
            .unwrap();

        assert_eq!(config.strategy, StrategyKind::LeaderBatch);
        assert_eq!(config.leader, NodeId::from("n2"));
        assert_eq!(config.flush_interval_ms, 75);
        assert_eq!(config.retry.max_attempts, 7);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Cli::try_parse_from(["murmur", "--strategy", "gossip"]).is_err());

        let cli = Cli::try_parse_from(["murmur", "--flush-interval-ms", "0"]).unwrap();
        assert!(cli.resolve_config(Vec::new()).is_err());
    }

    #[test]
    fn log_filter_precedence() {
        let cli = Cli::try_parse_from(["murmur", "-v"]).unwrap();
        assert!(cli.log_filter().unwrap().to_string().contains("debug"));

        let cli = Cli::try_parse_from(["murmur", "-v", "--log-filter", "murmur_broadcast=trace"]).unwrap();
        assert!(cli
            .log_filter()
            .unwrap()
            .to_string()
            .contains("murmur_broadcast=trace"));
    }
}
