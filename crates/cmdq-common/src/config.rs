//! Configuration structures for the timed command probe.
//!
//! Supports TOML deserialization with defaults that reproduce the classic
//! run: 100 gain commands, 100 ms initial lead, 50 ms apart.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level probe configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Which radio to open and how.
    pub device: DeviceConfig,

    /// Command schedule for the probe loop.
    pub schedule: ScheduleConfig,

    /// Simulated backend parameters.
    pub simulated: SimulatedConfig,

    /// Real-time thread configuration.
    pub realtime: RealtimeConfig,

    /// Call latency metrics configuration.
    pub metrics: MetricsConfig,

    /// Console output configuration.
    pub output: OutputConfig,
}

/// Radio device selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Driver address string, e.g. `"type=b200,serial=1234"`.
    pub args: String,

    /// Backend used to reach the device.
    pub backend: DeviceBackend,

    /// Receive channel whose gain is toggled.
    pub channel: usize,
}

/// Supported device backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceBackend {
    /// In-process radio model with a bounded command FIFO.
    #[default]
    Simulated,
    /// Hardware via SoapySDR (requires the `soapy` feature).
    Soapy,
}

impl std::fmt::Display for DeviceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceBackend::Simulated => write!(f, "simulated"),
            DeviceBackend::Soapy => write!(f, "soapy"),
        }
    }
}

impl std::str::FromStr for DeviceBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(DeviceBackend::Simulated),
            "soapy" | "soapysdr" => Ok(DeviceBackend::Soapy),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// Timed command schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Number of timed commands to issue.
    pub iterations: u32,

    /// Offset from the current device time to the first command.
    #[serde(with = "humantime_serde")]
    pub initial_lead: Duration,

    /// Spacing between consecutive command times.
    #[serde(with = "humantime_serde")]
    pub increment: Duration,

    /// A call counts as fast when it returns within this fraction of `increment`.
    pub fast_fraction: f64,

    /// Gain values applied round-robin, one per command.
    pub gains: Vec<f64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            initial_lead: Duration::from_millis(100),
            increment: Duration::from_millis(50),
            fast_fraction: 0.1,
            gains: vec![0.0, 1.0],
        }
    }
}

impl ScheduleConfig {
    /// Host-side threshold below which a call is classified as fast.
    #[must_use]
    pub fn fast_threshold(&self) -> Duration {
        self.increment.mul_f64(self.fast_fraction)
    }
}

/// Parameters of the simulated radio's command queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Number of pending timed commands the device can hold.
    pub queue_depth: usize,

    /// Cost of every setter call (transport round trip).
    #[serde(with = "humantime_serde")]
    pub call_latency: Duration,

    /// Number of receive channels.
    pub channels: usize,

    /// Upper end of the gain range in dB.
    pub max_gain: f64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            queue_depth: 16,
            call_latency: Duration::from_micros(20),
            channels: 1,
            max_gain: 76.0,
        }
    }
}

/// Real-time scheduling configuration for the probe thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Try to raise the thread priority before the loop.
    pub enabled: bool,

    /// Scheduler policy: "fifo", "rr" (round-robin) or "other".
    pub policy: SchedPolicy,

    /// Scheduler priority (1-99 for RT policies).
    pub priority: u8,

    /// CPUs to pin the probe thread to; empty leaves placement to the OS.
    pub cpus: Vec<usize>,

    /// Lock all memory pages (mlockall).
    pub lock_memory: bool,

    /// Fail at startup if RT privileges are missing instead of warning.
    pub fail_fast: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: SchedPolicy::Rr,
            priority: 50,
            cpus: Vec::new(),
            lock_memory: false,
            fail_fast: false,
        }
    }
}

/// Scheduler policy for real-time threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// SCHED_FIFO: First-in-first-out real-time.
    Fifo,
    /// SCHED_RR: Round-robin real-time.
    #[default]
    Rr,
    /// SCHED_OTHER: Normal time-sharing (non-RT).
    Other,
}

/// Call latency metrics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Size of the latency ring buffer.
    pub histogram_size: usize,

    /// Percentiles reported at the end of a run.
    pub percentiles: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            histogram_size: 1024,
            percentiles: vec![50.0, 90.0, 99.0],
        }
    }
}

/// How results are written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Text progress lines or a single JSON report.
    pub format: OutputFormat,

    /// Fast iterations overwrite the previous progress line.
    pub overwrite_fast: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            overwrite_fast: true,
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable progress lines.
    #[default]
    Text,
    /// Machine-readable report.
    Json,
}

impl ProbeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let schedule = &self.schedule;
        if schedule.iterations == 0 {
            return Err(ConfigError::invalid("schedule.iterations", "must be > 0"));
        }
        if schedule.increment.is_zero() {
            return Err(ConfigError::invalid("schedule.increment", "must be > 0"));
        }
        if !(schedule.fast_fraction > 0.0 && schedule.fast_fraction <= 1.0) {
            return Err(ConfigError::invalid(
                "schedule.fast_fraction",
                "must be in (0, 1]",
            ));
        }
        if schedule.gains.is_empty() {
            return Err(ConfigError::invalid("schedule.gains", "must not be empty"));
        }
        if schedule.gains.iter().any(|g| !g.is_finite()) {
            return Err(ConfigError::invalid("schedule.gains", "must be finite"));
        }
        if self.simulated.queue_depth == 0 {
            return Err(ConfigError::invalid("simulated.queue_depth", "must be > 0"));
        }
        if self.simulated.channels == 0 {
            return Err(ConfigError::invalid("simulated.channels", "must be > 0"));
        }
        if self.metrics.histogram_size == 0 {
            return Err(ConfigError::invalid("metrics.histogram_size", "must be > 0"));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value outside its allowed range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        ConfigError::Invalid { field, reason }
    }
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
