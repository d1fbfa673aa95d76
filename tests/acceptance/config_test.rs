//! Configuration-driven probe runs.

use super::common::run_with;
use cmdq_common::config::{ProbeConfig, SchedPolicy};
use cmdq_common::time::ManualClock;
use cmdq_radio::{DeviceArgs, SimulatedRadio};
use cmdq_runtime::ProbeSchedule;
use std::time::Duration;

const PROBE_TOML: &str = r#"
    [device]
    args = "queue_depth=8, call_latency_us=0"

    [schedule]
    iterations = 30
    initial_lead = "200ms"
    increment = "20ms"
    fast_fraction = 0.25
    gains = [0.0, 10.0, 20.0]

    [realtime]
    enabled = false
    policy = "fifo"

    [metrics]
    percentiles = [50.0, 99.0]
"#;

fn radio_from(config: &ProbeConfig, clock: &ManualClock) -> SimulatedRadio<ManualClock> {
    let args: DeviceArgs = config.device.args.parse().expect("device args");
    SimulatedRadio::from_args(clock.clone(), &config.simulated, &args).expect("simulated radio")
}

#[test]
fn test_config_file_drives_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("probe.toml");
    std::fs::write(&path, PROBE_TOML).unwrap();

    let config = ProbeConfig::from_file(&path).unwrap();
    assert!(!config.realtime.enabled);
    assert_eq!(config.realtime.policy, SchedPolicy::Fifo);
    assert_eq!(config.schedule.fast_threshold(), Duration::from_millis(5));

    let clock = ManualClock::new();
    let radio = radio_from(&config, &clock);
    assert_eq!(radio.queue_depth(), 8);

    let schedule = ProbeSchedule::from_config(&config.schedule, config.device.channel).unwrap();
    let (report, records) = run_with(radio, clock, schedule);

    assert_eq!(report.iterations_run, 30);
    assert_eq!(report.fast_count, 8);
    assert_eq!(records[8].delay, Duration::from_millis(200));
    assert!(records[9..]
        .iter()
        .all(|r| r.delay == Duration::from_millis(20)));

    let gains: Vec<f64> = records.iter().take(4).map(|r| r.gain).collect();
    assert_eq!(gains, vec![0.0, 10.0, 20.0, 0.0]);
}

#[test]
fn test_report_json_shape() {
    let config = ProbeConfig::from_toml(PROBE_TOML).unwrap();
    let clock = ManualClock::new();
    let radio = radio_from(&config, &clock);
    let schedule = ProbeSchedule::from_config(&config.schedule, 0).unwrap();
    let (report, _) = run_with(radio, clock, schedule);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["requested"], 30);
    assert_eq!(json["fast_count"], 8);
    assert_eq!(json["last_fast_index"], 7);
    assert_eq!(json["aborted"], false);
    assert_eq!(json["first_command_time"], 200_000_000);
    assert_eq!(json["metrics"]["delayed_calls"], 22);
    assert_eq!(json["metrics"]["threshold_ns"], 5_000_000);
}

#[test]
fn test_default_config_roundtrip_runs_identically() {
    let default = ProbeConfig::default();
    let reparsed = ProbeConfig::from_toml(&default.to_toml().unwrap()).unwrap();

    let run = |config: &ProbeConfig| {
        let clock = ManualClock::new();
        let radio = radio_from(config, &clock);
        let schedule = ProbeSchedule::from_config(&config.schedule, 0).unwrap();
        run_with(radio, clock, schedule).0
    };

    assert_eq!(run(&default), run(&reparsed));
}

#[test]
fn test_shipped_config_matches_defaults() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/probe.toml");
    let shipped = ProbeConfig::from_file(&path).unwrap();
    assert_eq!(shipped, ProbeConfig::default());
}
