//! Timed command probe entry point.
//!
//! Opens a radio, issues a run of scheduled gain changes, and shows how
//! promptly each call returns. Calls return immediately while the device's
//! command queue has room and slow down to the command spacing once it is
//! full.

mod report;
mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use cmdq_common::config::{DeviceBackend, OutputFormat, ProbeConfig};
use cmdq_common::time::MonotonicClock;
use cmdq_radio::{open_device, RadioDevice};
use cmdq_runtime::probe::{CommandProbe, ProbeSchedule};
use cmdq_runtime::realtime::init_realtime;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::report::{ConsoleObserver, ConsolePrinter, RunSummary};
use crate::signals::StopSignal;

/// Probe command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "cmdq-probe",
    about = "Mini-example to illustrate timed command queuing",
    long_about = None,
    version
)]
struct Args {
    /// Device address args, e.g. "type=b200,serial=31A4" (empty: first device found).
    #[arg(long, value_name = "ARGS")]
    args: Option<String>,

    /// Path to a probe configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Device backend (simulated, soapy).
    #[arg(long, short = 'b')]
    backend: Option<DeviceBackend>,

    /// Number of timed commands to issue.
    #[arg(long, short = 'n')]
    iterations: Option<u32>,

    /// Receive channel whose gain is toggled.
    #[arg(long)]
    channel: Option<usize>,

    /// Print a JSON report instead of progress lines.
    #[arg(long)]
    json: bool,

    /// Do not try to raise the thread priority.
    #[arg(long)]
    no_realtime: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting timed command probe");

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    let stop = StopSignal::install().context("Failed to set up signal handlers")?;

    run_probe(&config, &stop, std::io::stdout().lock())
}

/// Initialize logging on stderr, leaving stdout to the probe output.
fn init_logging(level: &str) {
    let filter = format!(
        "cmdq_probe={level},cmdq_runtime={level},cmdq_radio={level},cmdq_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `CMDQ_CONFIG_PATH` environment variable
/// 3. `/etc/cmdq/probe.toml` (system path)
/// 4. `config/probe.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<ProbeConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return ProbeConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    if let Ok(env_path) = std::env::var("CMDQ_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from CMDQ_CONFIG_PATH");
            return ProbeConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from CMDQ_CONFIG_PATH={env_path}"));
        }
        warn!(
            path = %env_path,
            "CMDQ_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    for candidate in ["/etc/cmdq/probe.toml", "config/probe.toml"] {
        let config_path = PathBuf::from(candidate);
        if config_path.exists() {
            info!(?config_path, "Loading config");
            return ProbeConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from {candidate}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(ProbeConfig::default())
}

/// Command-line flags win over file values.
fn apply_overrides(config: &mut ProbeConfig, args: &Args) {
    if let Some(device_args) = &args.args {
        config.device.args.clone_from(device_args);
    }
    if let Some(backend) = args.backend {
        config.device.backend = backend;
    }
    if let Some(channel) = args.channel {
        config.device.channel = channel;
    }
    if let Some(iterations) = args.iterations {
        config.schedule.iterations = iterations;
    }
    if args.json {
        config.output.format = OutputFormat::Json;
    }
    if args.no_realtime {
        config.realtime.enabled = false;
    }
}

/// Open the device, run the schedule, and print the results to `out`.
fn run_probe<W: Write>(config: &ProbeConfig, stop: &StopSignal, out: W) -> Result<()> {
    let realtime = init_realtime(&config.realtime).context("Failed to set up real-time priority")?;

    let text_mode = config.output.format == OutputFormat::Text;
    let mut printer = ConsolePrinter::new(out, text_mode, config.output.overwrite_fast);

    printer.print_opening(&config.device.args)?;
    let device = open_device(&config.device, &config.simulated).with_context(|| {
        format!(
            "Failed to open {} device with args '{}'",
            config.device.backend, config.device.args
        )
    })?;
    info!(device = %device.name(), "Device opened");

    let schedule = ProbeSchedule::from_config(&config.schedule, config.device.channel)?;
    let mut probe = CommandProbe::new(device, MonotonicClock::new(), schedule, &config.metrics);

    let report = {
        let mut observer = ConsoleObserver::new(&mut printer, || stop.requested());
        probe.run(&mut observer).context("Timed command probe failed")?
    };

    if let Some(signal) = stop.received() {
        warn!(%signal, completed = report.iterations_run, "Probe interrupted");
    }

    let mut device = probe.into_device();
    if let Err(e) = device.shutdown() {
        warn!(error = %e, "Device shutdown failed");
    }

    match config.output.format {
        OutputFormat::Text => printer.print_summary(&report)?,
        OutputFormat::Json => printer.print_json(&RunSummary {
            args: &config.device.args,
            backend: config.device.backend,
            realtime: &realtime,
            report: &report,
        })?,
    }

    for (percentile, ns) in &report.metrics.percentiles_ns {
        info!(percentile, latency_us = ns / 1_000, "Call latency percentile");
    }
    if let Some(jitter_ns) = report.metrics.jitter_ns() {
        info!(jitter_us = jitter_ns / 1_000, "Call latency spread");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["cmdq-probe"]);
        assert!(args.args.is_none());
        assert!(args.config.is_none());
        assert!(!args.json);
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from([
            "cmdq-probe",
            "--args",
            "type=b200,serial=31A4",
            "-b",
            "soapy",
            "-n",
            "25",
            "--json",
        ]);
        assert_eq!(args.args.as_deref(), Some("type=b200,serial=31A4"));
        assert_eq!(args.backend, Some(DeviceBackend::Soapy));
        assert_eq!(args.iterations, Some(25));
        assert!(args.json);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Args::try_parse_from(["cmdq-probe", "--backend", "uhd"]).is_err());
    }

    #[test]
    fn test_help_flag() {
        let err = Args::try_parse_from(["cmdq-probe", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        // Help is a successful run, unlike the classic tool's ~0 status
        assert_eq!(err.exit_code(), 0);
        assert!(err.to_string().contains("timed command queuing"));
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "cmdq-probe",
            "--args",
            "queue_depth=4",
            "--channel",
            "1",
            "--no-realtime",
        ]);
        let mut config = ProbeConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.device.args, "queue_depth=4");
        assert_eq!(config.device.channel, 1);
        assert!(!config.realtime.enabled);
        assert_eq!(config.schedule.iterations, 100);
        assert_eq!(config.output.format, OutputFormat::Text);
    }

    #[test]
    fn test_load_config_from_argument() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        std::fs::write(&path, "[schedule]\nincrement = \"20ms\"\n").unwrap();

        let args = Args::parse_from(["cmdq-probe", "-c", path.to_str().unwrap()]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.schedule.increment, Duration::from_millis(20));
    }

    #[test]
    fn test_load_config_missing_file_fails() {
        let args = Args::parse_from(["cmdq-probe", "-c", "/nonexistent/probe.toml"]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_run_probe_text_output() {
        let mut config = ProbeConfig::default();
        config.realtime.enabled = false;
        config.schedule.initial_lead = Duration::from_millis(20);
        config.schedule.increment = Duration::from_millis(20);
        config.schedule.fast_fraction = 0.5;

        let mut out = Vec::new();
        run_probe(&config, &StopSignal::default(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("\nCreating the radio device with: ...\n"));
        assert_eq!(text.matches("timed command issued: ").count(), 100);
        assert!(text.contains("timed command issued: 0099 (delay "));
        // The queue holds 16 commands, so only the first 16 calls return at once
        assert_eq!(text.matches("\rtimed command issued: ").count(), 16);
        assert!(text.ends_with("\n-------------------\nwithout delay: 16 out of 100\n"));
    }

    #[test]
    fn test_run_probe_json_output() {
        let mut config = ProbeConfig::default();
        config.realtime.enabled = false;
        config.schedule.iterations = 3;
        config.schedule.increment = Duration::from_millis(1);
        config.schedule.initial_lead = Duration::from_millis(1);
        config.output.format = OutputFormat::Json;

        let mut out = Vec::new();
        run_probe(&config, &StopSignal::default(), &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["backend"], "simulated");
        assert_eq!(value["report"]["iterations_run"], 3);
        assert_eq!(value["report"]["requested"], 3);
        assert_eq!(value["report"]["aborted"], false);
    }
}
