//! Radio device abstractions for the timed command probe.
//!
//! This crate provides:
//! - [`RadioDevice`] trait, the seam between the probe and a radio driver
//! - [`args`] module with driver address string parsing
//! - [`simulated`] module with an in-process radio and bounded command FIFO
//! - `soapy` module (feature `soapy`) forwarding to a SoapySDR device

pub mod args;
pub mod simulated;
#[cfg(feature = "soapy")]
pub mod soapy;

pub use args::DeviceArgs;
pub use simulated::{SimulatedRadio, SimulatedStats};
#[cfg(feature = "soapy")]
pub use soapy::SoapyRadio;

use cmdq_common::config::{DeviceBackend, DeviceConfig, SimulatedConfig};
use cmdq_common::time::{MonotonicClock, TimeSpec};
use cmdq_common::{CmdqError, CmdqResult};
use tracing::info;

/// Radio driver abstraction.
///
/// Covers the subset of a driver's control API the probe needs: the
/// device clock, the command-time register, and receive gain. Setters
/// issued while a command time is set are timed commands; the driver
/// decides how long the call takes to return.
pub trait RadioDevice {
    /// Human-readable description of the opened device.
    fn name(&self) -> String;

    /// Current device clock.
    fn time_now(&mut self) -> CmdqResult<TimeSpec>;

    /// Set the device clock.
    fn set_time_now(&mut self, time: TimeSpec) -> CmdqResult<()>;

    /// Schedule subsequent setter calls for `time` on the device clock.
    fn set_command_time(&mut self, time: TimeSpec) -> CmdqResult<()>;

    /// Return to immediate execution of setter calls.
    fn clear_command_time(&mut self) -> CmdqResult<()>;

    /// Set the receive gain (dB) on `channel`.
    fn set_rx_gain(&mut self, gain: f64, channel: usize) -> CmdqResult<()>;

    /// Receive gain currently in effect on `channel`.
    fn rx_gain(&mut self, channel: usize) -> CmdqResult<f64>;

    /// Release the device.
    fn shutdown(&mut self) -> CmdqResult<()> {
        Ok(())
    }
}

impl<D: RadioDevice + ?Sized> RadioDevice for Box<D> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn time_now(&mut self) -> CmdqResult<TimeSpec> {
        (**self).time_now()
    }

    fn set_time_now(&mut self, time: TimeSpec) -> CmdqResult<()> {
        (**self).set_time_now(time)
    }

    fn set_command_time(&mut self, time: TimeSpec) -> CmdqResult<()> {
        (**self).set_command_time(time)
    }

    fn clear_command_time(&mut self) -> CmdqResult<()> {
        (**self).clear_command_time()
    }

    fn set_rx_gain(&mut self, gain: f64, channel: usize) -> CmdqResult<()> {
        (**self).set_rx_gain(gain, channel)
    }

    fn rx_gain(&mut self, channel: usize) -> CmdqResult<f64> {
        (**self).rx_gain(channel)
    }

    fn shutdown(&mut self) -> CmdqResult<()> {
        (**self).shutdown()
    }
}

/// Open the device described by `device`.
///
/// # Errors
///
/// Fails if the args cannot be parsed, the backend is not compiled in, or
/// the driver refuses to open the device.
pub fn open_device(
    device: &DeviceConfig,
    simulated: &SimulatedConfig,
) -> CmdqResult<Box<dyn RadioDevice>> {
    let args: DeviceArgs = device.args.parse()?;

    match device.backend {
        DeviceBackend::Simulated => {
            info!(%args, "Using simulated radio");
            let radio = SimulatedRadio::from_args(MonotonicClock::new(), simulated, &args)?;
            Ok(Box::new(radio))
        }
        DeviceBackend::Soapy => open_soapy(&args),
    }
}

#[cfg(feature = "soapy")]
fn open_soapy(args: &DeviceArgs) -> CmdqResult<Box<dyn RadioDevice>> {
    info!(%args, "Opening SoapySDR device");
    Ok(Box::new(SoapyRadio::open(args)?))
}

#[cfg(not(feature = "soapy"))]
fn open_soapy(_args: &DeviceArgs) -> CmdqResult<Box<dyn RadioDevice>> {
    Err(CmdqError::Unsupported(
        "SoapySDR backend not compiled in (enable the `soapy` feature)".into(),
    ))
}
