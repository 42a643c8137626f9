//! PDVState agent
//!
//! Watches a point-of-sale terminal's logs and reports sales, operator
//! changes and rule-matched events to the monitoring collector.

mod agent;
mod config;
mod shutdown;

use agent::{AgentSettings, bootstrap, run_agent};
use anyhow::Context;
use clap::Parser;
use config::ConfigLoader;
use shutdown::spawn_shutdown_handler;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use time::UtcOffset;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// PDVState - point-of-sale log monitoring agent
#[derive(Parser, Debug)]
#[command(name = "pdvstate-agent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Monitoring agent config holding the `Server=` entry
    #[arg(
        long,
        env = "PDVSTATE_AGENT_CONFIG",
        default_value = "/ariusmonitor/conf/zabbix_agentd.conf"
    )]
    agent_config: PathBuf,

    /// Point-of-sale config holding PDV_NROLOJA and PDV_NROCPU
    #[arg(long, env = "PDVSTATE_PDV_CONFIG", default_value = "/posnet/pdv.conf")]
    pdv_config: PathBuf,

    /// Directory of the daily `<channel><MMDD>.txt` logs
    #[arg(long, env = "PDVSTATE_LOG_DIR", default_value = "/posnet")]
    log_dir: PathBuf,

    /// Directory of the `OPER_<id>.pdv` operator markers
    #[arg(long, env = "PDVSTATE_MARKER_DIR", default_value = "/posnet")]
    marker_dir: PathBuf,

    /// Channel whose lines drive the sale state machine
    #[arg(long, env = "PDVSTATE_SALE_CHANNEL", default_value = pdvstate_core::processors::SALE_CHANNEL)]
    sale_channel: String,

    /// Seconds between rule version checks
    #[arg(
        long,
        env = "PDVSTATE_RULE_UPDATE_SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    rule_update_secs: u64,

    /// Seconds between operator marker scans
    #[arg(
        long,
        env = "PDVSTATE_OPERATOR_SECS",
        default_value_t = 15,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    operator_secs: u64,

    /// Milliseconds between log file polls
    #[arg(
        long,
        env = "PDVSTATE_LOG_POLL_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    log_poll_ms: u64,

    /// Seconds between startup attempts
    #[arg(
        long,
        env = "PDVSTATE_RETRY_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    retry_secs: u64,

    /// Collector request timeout in seconds
    #[arg(
        long,
        env = "PDVSTATE_HTTP_TIMEOUT_SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    http_timeout_secs: u64,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "PDVSTATE_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Validate the collector's TLS certificate
    #[arg(long, env = "PDVSTATE_VERIFY_TLS", default_value = "false")]
    verify_tls: bool,
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // The local offset can only be read while the process is single threaded.
    let local_offset = UtcOffset::current_local_offset();

    // Initialize tracing
    init_tracing(args.log_file.as_deref());

    let local_offset = local_offset.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Local UTC offset unavailable, using UTC for log file names");
        UtcOffset::UTC
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build the tokio runtime")?;

    runtime.block_on(run(args, local_offset))
}

async fn run(args: Args, local_offset: UtcOffset) -> anyhow::Result<()> {
    tracing::info!("Starting pdvstate-agent v{}", env!("CARGO_PKG_VERSION"));

    let mut shutdown_rx = spawn_shutdown_handler();

    if !args.verify_tls {
        tracing::warn!("TLS certificate validation is disabled for the collector");
    }
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.http_timeout_secs))
        .danger_accept_invalid_certs(!args.verify_tls)
        .build()
        .context("failed to build the HTTP client")?;

    let loader = ConfigLoader::new(&args.agent_config, &args.pdv_config);
    let retry_interval = Duration::from_secs(args.retry_secs);
    let Some((config, initial_rules)) =
        bootstrap(&loader, &http, retry_interval, &mut shutdown_rx).await
    else {
        tracing::info!("Shutdown requested before startup completed");
        return Ok(());
    };

    let settings = AgentSettings {
        log_dir: args.log_dir,
        marker_dir: args.marker_dir,
        sale_channel: args.sale_channel,
        rule_update_interval: Duration::from_secs(args.rule_update_secs),
        operator_interval: Duration::from_secs(args.operator_secs),
        log_poll_interval: Duration::from_millis(args.log_poll_ms),
        local_offset,
    };

    run_agent(config, initial_rules, http, &settings, shutdown_rx).await;

    tracing::info!("Agent shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
///
/// Logs go to `log_file` when it can be opened and to stderr otherwise.
fn init_tracing(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));

    let (file, open_error) = open_log_file(log_file);
    let stderr_layer = file.is_none().then(|| fmt::layer());
    let file_layer = file.map(|file| fmt::layer().with_ansi(false).with_writer(Mutex::new(file)));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    if let Some((path, e)) = open_error {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to open log file, logging to stderr"
        );
    }
}

/// Open `log_file` for appending, keeping the error for later reporting.
fn open_log_file(log_file: Option<&Path>) -> (Option<File>, Option<(PathBuf, io::Error)>) {
    let Some(path) = log_file else {
        return (None, None);
    };
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => (Some(file), None),
        Err(e) => (None, Some((path.to_path_buf(), e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["pdvstate-agent"]).unwrap();
        assert_eq!(args.agent_config, PathBuf::from("/ariusmonitor/conf/zabbix_agentd.conf"));
        assert_eq!(args.pdv_config, PathBuf::from("/posnet/pdv.conf"));
        assert_eq!(args.sale_channel, "logpdv");
        assert_eq!(args.rule_update_secs, 300);
        assert_eq!(args.operator_secs, 15);
        assert_eq!(args.retry_secs, 60);
        assert!(!args.verify_tls);
        assert!(args.log_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "pdvstate-agent",
            "--log-dir",
            "/tmp/logs",
            "--verify-tls",
            "--log-file",
            "/tmp/pdvstate.log",
        ])
        .unwrap();
        assert_eq!(args.log_dir, PathBuf::from("/tmp/logs"));
        assert!(args.verify_tls);
        assert_eq!(args.log_file, Some(PathBuf::from("/tmp/pdvstate.log")));
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        for flag in [
            "--rule-update-secs",
            "--operator-secs",
            "--log-poll-ms",
            "--retry-secs",
            "--http-timeout-secs",
        ] {
            let result = Args::try_parse_from(["pdvstate-agent", flag, "0"]);
            assert!(result.is_err(), "{flag} accepted 0");

            assert!(Args::try_parse_from(["pdvstate-agent", flag, "1"]).is_ok());
        }
    }

    #[test]
    fn test_log_file_falls_back_when_unopenable() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent").join("pdvstate.log");

        let (file, open_error) = open_log_file(Some(&missing));

        assert!(file.is_none());
        let (path, e) = open_error.unwrap();
        assert_eq!(path, missing);
        assert_eq!(e.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_log_file_is_opened_for_append() {
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pdvstate.log");
        std::fs::write(&path, "previous run\n").unwrap();

        let (file, open_error) = open_log_file(Some(&path));

        assert!(open_error.is_none());
        file.unwrap().write_all(b"this run\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous run\nthis run\n");
        assert!(matches!(open_log_file(None), (None, None)));
    }
}
