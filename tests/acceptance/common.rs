//! Shared helpers for acceptance tests.

#![allow(dead_code)]

use cmdq_common::config::{MetricsConfig, SimulatedConfig};
use cmdq_common::time::{HostClock, ManualClock};
use cmdq_common::CmdqResult;
use cmdq_radio::SimulatedRadio;
use cmdq_runtime::{CommandProbe, IterationRecord, ProbeReport, ProbeSchedule};
use std::ops::ControlFlow;
use std::time::Duration;

/// Simulated radio config with the given depth and call cost.
pub fn sim_config(queue_depth: usize, call_latency: Duration) -> SimulatedConfig {
    SimulatedConfig {
        queue_depth,
        call_latency,
        ..Default::default()
    }
}

/// Run `schedule` on a simulated radio with a manual clock.
///
/// Returns the report and every iteration record.
pub fn run_manual(
    config: &SimulatedConfig,
    schedule: ProbeSchedule,
) -> (ProbeReport, Vec<IterationRecord>) {
    let clock = ManualClock::new();
    let radio = SimulatedRadio::new(clock.clone(), config).expect("valid simulated config");
    run_with(radio, clock, schedule)
}

/// Run `schedule` on any simulated radio and collect records.
pub fn run_with<C: HostClock>(
    radio: SimulatedRadio<C>,
    clock: C,
    schedule: ProbeSchedule,
) -> (ProbeReport, Vec<IterationRecord>) {
    let mut probe = CommandProbe::new(radio, clock, schedule, &MetricsConfig::default());
    let mut records = Vec::new();
    let mut collect = |r: &IterationRecord| -> CmdqResult<ControlFlow<()>> {
        records.push(*r);
        Ok(ControlFlow::Continue(()))
    };
    let report = probe.run(&mut collect).expect("probe run");
    (report, records)
}
