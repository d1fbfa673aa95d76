//! Timed command pacing probe.
//!
//! Issues a sequence of gain changes, each scheduled one increment after the
//! previous one on the device clock, and times how long every iteration
//! takes to return on the host clock:
//! 1. Set the command time
//! 2. Set the receive gain (queued on the device for that time)
//! 3. Sample the host clock and classify the iteration as fast or delayed
//! 4. Notify the observer (printing happens here)
//! 5. Advance the command time and resample the host clock
//!
//! The host clock is resampled after the observer returns, so output
//! formatting never counts towards the next iteration's delay.

use cmdq_common::config::{MetricsConfig, ScheduleConfig};
use cmdq_common::metrics::{CallMetrics, CallMetricsSnapshot};
use cmdq_common::time::{HostClock, TimeSpec};
use cmdq_common::{CmdqError, CmdqResult};
use cmdq_radio::RadioDevice;
use serde::Serialize;
use std::ops::ControlFlow;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// What the probe issues and how it classifies calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSchedule {
    /// Number of timed commands.
    pub iterations: u32,
    /// Offset from current device time to the first command.
    pub initial_lead: Duration,
    /// Spacing between command times.
    pub increment: Duration,
    /// Host-side delay below which an iteration is fast.
    pub fast_threshold: Duration,
    /// Gains applied round-robin.
    pub gains: Vec<f64>,
    /// Receive channel.
    pub channel: usize,
}

impl ProbeSchedule {
    /// Build a schedule from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CmdqError::Config`] for zero iterations, a zero increment,
    /// a fast fraction outside (0, 1], or an empty gain list.
    pub fn from_config(config: &ScheduleConfig, channel: usize) -> CmdqResult<Self> {
        if config.iterations == 0 {
            return Err(CmdqError::Config("iterations must be > 0".into()));
        }
        if config.increment.is_zero() {
            return Err(CmdqError::Config("increment must be > 0".into()));
        }
        if !(config.fast_fraction > 0.0 && config.fast_fraction <= 1.0) {
            return Err(CmdqError::Config(format!(
                "fast fraction must be in (0, 1], got {}",
                config.fast_fraction
            )));
        }
        if config.gains.is_empty() {
            return Err(CmdqError::Config("gain list must not be empty".into()));
        }

        Ok(Self {
            iterations: config.iterations,
            initial_lead: config.initial_lead,
            increment: config.increment,
            fast_threshold: config.fast_threshold(),
            gains: config.gains.clone(),
            channel,
        })
    }

    /// Gain issued at iteration `index`.
    #[must_use]
    pub fn gain_for(&self, index: u32) -> f64 {
        self.gains[index as usize % self.gains.len()]
    }
}

impl Default for ProbeSchedule {
    fn default() -> Self {
        let config = ScheduleConfig::default();
        Self {
            iterations: config.iterations,
            initial_lead: config.initial_lead,
            increment: config.increment,
            fast_threshold: config.fast_threshold(),
            gains: config.gains,
            channel: 0,
        }
    }
}

/// Outcome of one probe iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationRecord {
    /// Zero-based iteration number.
    pub index: u32,
    /// Device time the command was scheduled for.
    pub command_time: TimeSpec,
    /// Gain that was requested.
    pub gain: f64,
    /// Host time from the end of the previous iteration to the return of this one.
    #[serde(serialize_with = "serialize_secs")]
    pub delay: Duration,
    /// Whether `delay` stayed under the fast threshold.
    pub fast: bool,
}

/// Receives every iteration as it completes.
pub trait IterationObserver {
    /// Called once before the first command with its scheduled time.
    fn on_start(&mut self, _first_command_time: TimeSpec) -> CmdqResult<()> {
        Ok(())
    }

    /// Called after each iteration; `Break` stops the probe early.
    fn on_iteration(&mut self, record: &IterationRecord) -> CmdqResult<ControlFlow<()>>;
}

impl<F> IterationObserver for F
where
    F: FnMut(&IterationRecord) -> CmdqResult<ControlFlow<()>>,
{
    fn on_iteration(&mut self, record: &IterationRecord) -> CmdqResult<ControlFlow<()>> {
        self(record)
    }
}

/// Summary of a probe run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    /// Device description.
    pub device: String,
    /// Iterations requested by the schedule.
    pub requested: u32,
    /// Iterations actually run.
    pub iterations_run: u32,
    /// Iterations that returned under the fast threshold.
    pub fast_count: u32,
    /// Index of the last fast iteration.
    pub last_fast_index: Option<u32>,
    /// Whether the observer stopped the run early.
    pub aborted: bool,
    /// Device time of the first command.
    pub first_command_time: TimeSpec,
    /// Call latency statistics.
    pub metrics: CallMetricsSnapshot,
}

impl ProbeReport {
    /// Iterations that did not return under the fast threshold.
    #[must_use]
    pub fn delayed_count(&self) -> u32 {
        self.iterations_run - self.fast_count
    }
}

/// Drives a [`RadioDevice`] through a [`ProbeSchedule`].
pub struct CommandProbe<D: RadioDevice, C: HostClock> {
    device: D,
    clock: C,
    schedule: ProbeSchedule,
    metrics: CallMetrics,
    percentiles: Vec<f64>,
}

impl<D: RadioDevice, C: HostClock> CommandProbe<D, C> {
    /// Create a probe.
    pub fn new(device: D, clock: C, schedule: ProbeSchedule, metrics: &MetricsConfig) -> Self {
        let call_metrics = CallMetrics::new(metrics.histogram_size, schedule.fast_threshold);
        Self {
            device,
            clock,
            schedule,
            metrics: call_metrics,
            percentiles: metrics.percentiles.clone(),
        }
    }

    /// Access the device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Give the device back.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Run the schedule, reporting each iteration to `observer`.
    ///
    /// The command time is cleared afterwards, also when a driver call fails.
    ///
    /// # Errors
    ///
    /// Propagates the first device or observer error; there is no retry.
    pub fn run<O: IterationObserver + ?Sized>(
        &mut self,
        observer: &mut O,
    ) -> CmdqResult<ProbeReport> {
        self.metrics.reset();

        let result = self.run_inner(observer);

        if let Err(e) = self.device.clear_command_time() {
            warn!(error = %e, "Failed to clear command time");
            if result.is_ok() {
                return Err(e);
            }
        }

        result
    }

    fn run_inner<O: IterationObserver + ?Sized>(
        &mut self,
        observer: &mut O,
    ) -> CmdqResult<ProbeReport> {
        if self.schedule.gains.is_empty() {
            return Err(CmdqError::Config("gain list must not be empty".into()));
        }

        let increment = TimeSpec::from_duration(self.schedule.increment);
        let first = self.device.time_now()? + TimeSpec::from_duration(self.schedule.initial_lead);
        let mut next = first;

        info!(
            device = %self.device.name(),
            iterations = self.schedule.iterations,
            first_command_time = %first,
            increment_ms = self.schedule.increment.as_millis(),
            threshold_us = self.schedule.fast_threshold.as_micros(),
            "Starting timed command probe"
        );
        observer.on_start(first)?;

        let mut fast_count = 0u32;
        let mut last_fast_index = None;
        let mut iterations_run = 0u32;
        let mut aborted = false;
        let mut last = self.clock.now();

        for index in 0..self.schedule.iterations {
            let gain = self.schedule.gain_for(index);

            self.device.set_command_time(next)?;
            self.device.set_rx_gain(gain, self.schedule.channel)?;

            let now = self.clock.now();
            let delay = now.saturating_sub(last);
            let fast = delay < self.schedule.fast_threshold;
            if fast {
                fast_count += 1;
                last_fast_index = Some(index);
            }
            self.metrics.record(delay);
            iterations_run += 1;

            let record = IterationRecord {
                index,
                command_time: next,
                gain,
                delay,
                fast,
            };
            trace!(index, delay_us = delay.as_micros(), fast, "Timed command issued");

            if observer.on_iteration(&record)?.is_break() {
                debug!(index, "Probe stopped by observer");
                aborted = true;
                break;
            }

            next += increment;
            last = self.clock.now();
        }

        let report = ProbeReport {
            device: self.device.name(),
            requested: self.schedule.iterations,
            iterations_run,
            fast_count,
            last_fast_index,
            aborted,
            first_command_time: first,
            metrics: self.metrics.snapshot(&self.percentiles),
        };

        info!(
            iterations = report.iterations_run,
            fast = report.fast_count,
            delayed = report.delayed_count(),
            max_us = self.metrics.max().map_or(0, |d| d.as_micros()),
            aborted = report.aborted,
            "Timed command probe finished"
        );

        Ok(report)
    }
}

fn serialize_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}
