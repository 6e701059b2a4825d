//! Loki shipper binary: pushes standard input lines to Loki

use clap::Parser;
use loki_shipper::{Config, Context, LogLevel, LogShipper, LogSource, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "loki-shipper", version, about = "Ship standard input lines to Loki")]
/// Flags override whatever `Config::from_env` loaded
struct Args {
    /// Loki push endpoint
    #[arg(long)]
    url: Option<String>,

    /// Value of the `app` stream label
    #[arg(long)]
    app: Option<String>,

    /// Entries buffered before a push
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seconds between timer flushes
    #[arg(long)]
    flush_interval: Option<f64>,

    /// Level given to every line
    #[arg(long, default_value = "info")]
    level: LogLevel,

    /// Mirror lines to standard output
    #[arg(long)]
    echo: bool,
}

impl Args {
    fn config(&self, mut config: Config) -> Config {

        if let Some(url) = &self.url {
            config.endpoint = url.clone();
        }
        if let Some(app) = &self.app {
            config.app_label = app.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(interval) = self
            .flush_interval
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        {
            config.flush_interval = interval;
        }
        if self.echo {
            config.console_echo = true;
        }

        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    initialize_tracing();

    let args = Args::parse();
    let config = args.config(Config::from_env());

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    info!(
        "Shipping stdin to {} as app {} (batch size {}, flush every {:?})",
        config.endpoint, config.app_label, config.batch_size, config.flush_interval
    );

    let shipper = LogShipper::new(config)?;
    shipper.setup(Handle::current())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => shipper.log(args.level, LogSource::Print, line, Context::new()),
                None => break,
            },
            _ = &mut ctrl_c => {
                info!("Interrupted, flushing remaining lines");
                break;
            }
        }
    }

    shipper.shutdown().await;

    let stats = shipper.stats();
    info!(
        "Session {} done: {} lines in {} pushes, {} failed pushes",
        stats.session_id, stats.entries_dispatched, stats.flushes_dispatched, stats.transport_failures
    );

    Ok(())
}

/// Initialize structured logging on stderr, keeping stdout for echoed lines
fn initialize_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use loki_shipper::config::DEFAULT_BATCH_SIZE;

    #[test]
    fn test_flags_do_not_read_environment() {
        let command = Args::command();
        assert!(command.get_arguments().all(|arg| arg.get_env().is_none()));
    }

    #[test]
    fn test_unparsable_env_keeps_default() {
        let args = Args::try_parse_from(["loki-shipper"]).unwrap();
        let base = Config::from_lookup(|key: &str| {
            (key == "LOKI_BATCH_SIZE").then(|| "lots".to_string())
        });

        let config = args.config(base);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "loki-shipper",
            "--batch-size",
            "25",
            "--flush-interval",
            "0.5",
            "--app",
            "forest",
            "--echo",
        ])
        .unwrap();
        let base = Config::from_lookup(|key: &str| {
            (key == "LOKI_BATCH_SIZE").then(|| "40".to_string())
        });

        let config = args.config(base);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.flush_interval, Duration::from_millis(500));
        assert_eq!(config.app_label, "forest");
        assert!(config.console_echo);
        assert_eq!(args.level, LogLevel::Info);
    }
}
