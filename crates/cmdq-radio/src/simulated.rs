//! In-process radio with a bounded timed-command FIFO.
//!
//! Models the part of a real radio that the probe observes: timed setter
//! calls go into a fixed-depth queue on the device and are applied when the
//! device clock reaches their time. A call made while the queue is full
//! blocks until the oldest command has executed, which is what makes the
//! probe's later iterations slow.

use crate::args::DeviceArgs;
use crate::RadioDevice;
use cmdq_common::config::SimulatedConfig;
use cmdq_common::time::{HostClock, TimeSpec};
use cmdq_common::{CmdqError, CmdqResult};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Device-args keys understood by the simulated backend.
const RECOGNIZED_KEYS: [&str; 4] = ["queue_depth", "channels", "max_gain", "call_latency_us"];

/// A command waiting in the device FIFO.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingCommand {
    time: TimeSpec,
    action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    RxGain { channel: usize, gain: f64 },
}

/// Counters describing how the command queue behaved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatedStats {
    /// Timed commands accepted into the queue.
    pub issued: u64,
    /// Commands applied to the device state (timed or immediate).
    pub executed: u64,
    /// Timed commands whose time had already passed when issued.
    pub late: u64,
    /// Calls that blocked on a full queue.
    pub stalls: u64,
    /// Total time spent blocked on a full queue.
    pub stall_time: Duration,
}

/// Simulated radio driven by a [`HostClock`].
///
/// The device clock is the host clock plus an offset, so with a
/// [`cmdq_common::ManualClock`] the whole queue is deterministic.
#[derive(Debug)]
pub struct SimulatedRadio<C: HostClock> {
    clock: C,
    /// Device time minus host time.
    offset: TimeSpec,
    queue_depth: usize,
    call_latency: Duration,
    max_gain: f64,
    command_time: Option<TimeSpec>,
    pending: VecDeque<PendingCommand>,
    gains: Vec<f64>,
    stats: SimulatedStats,
}

impl<C: HostClock> SimulatedRadio<C> {
    /// Create a radio from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue depth or channel count is zero.
    pub fn new(clock: C, config: &SimulatedConfig) -> CmdqResult<Self> {
        if config.queue_depth == 0 {
            return Err(CmdqError::Config("queue depth must be > 0".into()));
        }
        if config.channels == 0 {
            return Err(CmdqError::Config("channel count must be > 0".into()));
        }

        Ok(Self {
            clock,
            offset: TimeSpec::ZERO,
            queue_depth: config.queue_depth,
            call_latency: config.call_latency,
            max_gain: config.max_gain.max(0.0),
            command_time: None,
            pending: VecDeque::with_capacity(config.queue_depth),
            gains: vec![0.0; config.channels],
            stats: SimulatedStats::default(),
        })
    }

    /// Create a radio from configuration with device-args overrides.
    ///
    /// Recognized keys: `queue_depth`, `channels`, `max_gain`,
    /// `call_latency_us`. Other keys (e.g. `type`, `serial`) are ignored
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error for unparsable override values or a zero depth/channel count.
    pub fn from_args(clock: C, config: &SimulatedConfig, args: &DeviceArgs) -> CmdqResult<Self> {
        for (key, value) in args.iter() {
            if !RECOGNIZED_KEYS.contains(&key) {
                warn!(key, value, "Device arg not used by the simulated radio");
            }
        }

        let mut config = config.clone();
        if let Some(depth) = args.get_parsed("queue_depth")? {
            config.queue_depth = depth;
        }
        if let Some(channels) = args.get_parsed("channels")? {
            config.channels = channels;
        }
        if let Some(max_gain) = args.get_parsed("max_gain")? {
            config.max_gain = max_gain;
        }
        if let Some(us) = args.get_parsed("call_latency_us")? {
            config.call_latency = Duration::from_micros(us);
        }
        Self::new(clock, &config)
    }

    /// Queue behaviour so far.
    #[must_use]
    pub fn stats(&self) -> SimulatedStats {
        self.stats
    }

    /// Commands still waiting for their time.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Configured FIFO depth.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    fn device_now(&self) -> TimeSpec {
        TimeSpec::from_duration(self.clock.now()) + self.offset
    }

    fn check_channel(&self, channel: usize) -> CmdqResult<()> {
        if channel < self.gains.len() {
            Ok(())
        } else {
            Err(CmdqError::InvalidChannel {
                channel,
                available: self.gains.len(),
            })
        }
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::RxGain { channel, gain } => self.gains[channel] = gain,
        }
        self.stats.executed += 1;
    }

    /// Apply every queued command whose time has come, in FIFO order.
    fn retire_due(&mut self) {
        let now = self.device_now();
        while let Some(front) = self.pending.front() {
            if front.time > now {
                break;
            }
            let action = front.action;
            self.pending.pop_front();
            self.apply(action);
        }
    }

    fn enqueue(&mut self, time: TimeSpec, action: Action) {
        self.retire_due();

        let now = self.device_now();
        if time < now {
            self.stats.late += 1;
            debug!(command_time = %time, device_time = %now, "Timed command is late");
        }

        if self.pending.len() >= self.queue_depth {
            self.stats.stalls += 1;
            while self.pending.len() >= self.queue_depth {
                let Some(front) = self.pending.front() else {
                    break;
                };
                let wait = (front.time - self.device_now()).to_duration();
                trace!(wait_us = wait.as_micros(), "Command queue full, waiting");
                self.clock.sleep(wait);
                self.stats.stall_time += wait;
                self.retire_due();
            }
        }

        self.pending.push_back(PendingCommand { time, action });
        self.stats.issued += 1;
    }

    /// Run or queue an action depending on the command time.
    fn submit(&mut self, action: Action) {
        self.clock.sleep(self.call_latency);
        match self.command_time {
            Some(time) => self.enqueue(time, action),
            None => {
                self.retire_due();
                self.apply(action);
            }
        }
    }
}

impl<C: HostClock> RadioDevice for SimulatedRadio<C> {
    fn name(&self) -> String {
        format!(
            "simulated radio ({} ch, queue depth {})",
            self.gains.len(),
            self.queue_depth
        )
    }

    fn time_now(&mut self) -> CmdqResult<TimeSpec> {
        Ok(self.device_now())
    }

    fn set_time_now(&mut self, time: TimeSpec) -> CmdqResult<()> {
        self.offset = time - TimeSpec::from_duration(self.clock.now());
        debug!(device_time = %time, "Device time set");
        Ok(())
    }

    fn set_command_time(&mut self, time: TimeSpec) -> CmdqResult<()> {
        self.command_time = Some(time);
        Ok(())
    }

    fn clear_command_time(&mut self) -> CmdqResult<()> {
        self.command_time = None;
        Ok(())
    }

    fn set_rx_gain(&mut self, gain: f64, channel: usize) -> CmdqResult<()> {
        self.check_channel(channel)?;
        if !gain.is_finite() {
            return Err(CmdqError::Device(format!("gain must be finite, got {gain}")));
        }

        let clipped = gain.clamp(0.0, self.max_gain);
        if (clipped - gain).abs() > f64::EPSILON {
            debug!(requested = gain, applied = clipped, "Gain clipped to device range");
        }

        self.submit(Action::RxGain {
            channel,
            gain: clipped,
        });
        Ok(())
    }

    fn rx_gain(&mut self, channel: usize) -> CmdqResult<f64> {
        self.check_channel(channel)?;
        self.retire_due();
        Ok(self.gains[channel])
    }

    fn shutdown(&mut self) -> CmdqResult<()> {
        info!(
            issued = self.stats.issued,
            executed = self.stats.executed,
            late = self.stats.late,
            stalls = self.stats.stalls,
            dropped = self.pending.len(),
            "Simulated radio shut down"
        );
        self.pending.clear();
        self.command_time = None;
        Ok(())
    }
}
