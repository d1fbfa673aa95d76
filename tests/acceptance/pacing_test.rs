//! Command queue pacing as seen by the probe.

use super::common::{run_manual, run_with, sim_config};
use cmdq_common::config::{MetricsConfig, SimulatedConfig};
use cmdq_common::time::{HostClock, MonotonicClock, TimeSpec};
use cmdq_radio::{RadioDevice, SimulatedRadio};
use cmdq_runtime::{CommandProbe, IterationRecord, ProbeSchedule};
use std::ops::ControlFlow;
use std::time::Duration;

/// The classic run: 100 commands, 50 ms apart, default simulated radio.
#[test]
fn test_default_run_fills_queue_then_paces() {
    let (report, records) = run_manual(&SimulatedConfig::default(), ProbeSchedule::default());

    assert_eq!(report.iterations_run, 100);
    assert_eq!(report.fast_count, 16);
    assert_eq!(report.last_fast_index, Some(15));
    assert_eq!(report.delayed_count(), 84);

    // Each fast call only paid the transport cost
    for record in &records[..16] {
        assert!(record.fast);
        assert_eq!(record.delay, Duration::from_micros(20));
    }

    // The first blocked call waits until the first command (100 ms) executes
    let first_blocked = records[16].delay;
    assert!(first_blocked > Duration::from_millis(99) && first_blocked <= Duration::from_millis(100));

    // From then on the queue drains one command per increment
    for record in &records[17..] {
        assert!(!record.fast);
        assert_eq!(record.delay, Duration::from_millis(50));
    }
}

#[test]
fn test_fast_count_tracks_queue_depth() {
    for depth in [1usize, 4, 8, 32, 99, 100, 250] {
        let (report, _) = run_manual(
            &sim_config(depth, Duration::from_micros(5)),
            ProbeSchedule::default(),
        );
        assert_eq!(
            report.fast_count as usize,
            depth.min(100),
            "queue depth {depth}"
        );
    }
}

#[test]
fn test_command_times_advance_by_increment() {
    let schedule = ProbeSchedule {
        iterations: 10,
        initial_lead: Duration::from_millis(250),
        increment: Duration::from_millis(10),
        fast_threshold: Duration::from_millis(1),
        ..Default::default()
    };
    let (_, records) = run_manual(&sim_config(64, Duration::ZERO), schedule);

    let times: Vec<i64> = records.iter().map(|r| r.command_time.as_nanos()).collect();
    let expected: Vec<i64> = (0..10).map(|i| 250_000_000 + i * 10_000_000).collect();
    assert_eq!(times, expected);
}

#[test]
fn test_gain_commands_execute_on_schedule() {
    let clock = cmdq_common::time::ManualClock::new();
    let radio = SimulatedRadio::new(clock.clone(), &sim_config(4, Duration::ZERO)).unwrap();
    let schedule = ProbeSchedule {
        iterations: 6,
        gains: vec![3.0, 9.0],
        ..Default::default()
    };

    let mut probe = CommandProbe::new(radio, clock.clone(), schedule, &MetricsConfig::default());
    probe
        .run(&mut |_: &IterationRecord| Ok(ControlFlow::Continue(())))
        .unwrap();

    // Two of six commands ran while the queue drained; the rest are pending
    let radio = probe.device_mut();
    assert_eq!(radio.pending(), 4);
    assert_eq!(radio.rx_gain(0).unwrap(), 9.0);

    // The clock stopped at 150 ms; the last command (index 5, gain 9.0)
    // lands at 100 ms + 5 * 50 ms
    clock.advance(Duration::from_millis(199));
    assert_eq!(radio.rx_gain(0).unwrap(), 3.0);
    assert_eq!(radio.pending(), 1);
    clock.advance(Duration::from_millis(1));
    assert_eq!(radio.rx_gain(0).unwrap(), 9.0);
    assert_eq!(radio.pending(), 0);

    let stats = radio.stats();
    assert_eq!(stats.issued, 6);
    assert_eq!(stats.stalls, 2);
    assert_eq!(stats.late, 0);
}

/// Real clock smoke test: a full queue really blocks the caller.
#[test]
fn test_wall_clock_run_blocks_on_full_queue() {
    let clock = MonotonicClock::new();
    let started = clock.now();
    let mut radio = SimulatedRadio::new(clock, &sim_config(4, Duration::ZERO)).unwrap();
    radio.set_time_now(TimeSpec::ZERO).unwrap();

    let schedule = ProbeSchedule {
        iterations: 10,
        initial_lead: Duration::from_millis(2),
        increment: Duration::from_millis(2),
        fast_threshold: Duration::from_millis(1),
        ..Default::default()
    };

    let (report, _) = run_with(radio, clock, schedule);
    let elapsed = clock.now() - started;

    assert_eq!(report.iterations_run, 10);
    assert_eq!(report.metrics.total_calls, 10);
    // The tenth command could only be queued once the sixth (2 ms + 5 * 2 ms) had run
    assert!(elapsed >= Duration::from_millis(12), "elapsed {elapsed:?}");
}
