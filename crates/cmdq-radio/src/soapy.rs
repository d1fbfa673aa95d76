//! SoapySDR hardware backend.
//!
//! Forwards [`RadioDevice`] calls to a `soapysdr::Device`. The command time
//! is written through the `"CMD"` hardware time source, which SoapyUHD maps
//! to the USRP command time; writing zero clears it.

use crate::args::DeviceArgs;
use crate::RadioDevice;
use cmdq_common::time::TimeSpec;
use cmdq_common::{CmdqError, CmdqResult};
use soapysdr::{Device, Direction};
use tracing::{debug, info};

/// Hardware time source that sets the driver's command time.
const COMMAND_TIME_SOURCE: &str = "CMD";

/// Radio reached through SoapySDR.
pub struct SoapyRadio {
    device: Device,
    label: String,
}

impl SoapyRadio {
    /// Open the first device matching `args`.
    ///
    /// # Errors
    ///
    /// Returns [`CmdqError::Device`] if SoapySDR cannot open a device.
    pub fn open(args: &DeviceArgs) -> CmdqResult<Self> {
        let markup = args.to_string();
        let device = Device::new(markup.as_str()).map_err(device_err)?;

        let driver = device.driver_key().map_err(device_err)?;
        let hardware = device.hardware_key().map_err(device_err)?;
        let label = format!("{driver} ({hardware})");
        info!(device = %label, "SoapySDR device opened");

        Ok(Self { device, label })
    }
}

fn device_err(err: soapysdr::Error) -> CmdqError {
    CmdqError::Device(err.to_string())
}

impl RadioDevice for SoapyRadio {
    fn name(&self) -> String {
        self.label.clone()
    }

    fn time_now(&mut self) -> CmdqResult<TimeSpec> {
        let ns = self.device.get_hardware_time(None).map_err(device_err)?;
        Ok(TimeSpec::from_nanos(ns))
    }

    fn set_time_now(&mut self, time: TimeSpec) -> CmdqResult<()> {
        self.device
            .set_hardware_time(None, time.as_nanos())
            .map_err(device_err)
    }

    fn set_command_time(&mut self, time: TimeSpec) -> CmdqResult<()> {
        self.device
            .set_hardware_time(Some(COMMAND_TIME_SOURCE), time.as_nanos())
            .map_err(device_err)
    }

    fn clear_command_time(&mut self) -> CmdqResult<()> {
        debug!("Clearing command time");
        self.device
            .set_hardware_time(Some(COMMAND_TIME_SOURCE), 0)
            .map_err(device_err)
    }

    fn set_rx_gain(&mut self, gain: f64, channel: usize) -> CmdqResult<()> {
        self.device
            .set_gain(Direction::Rx, channel, gain)
            .map_err(device_err)
    }

    fn rx_gain(&mut self, channel: usize) -> CmdqResult<f64> {
        self.device.gain(Direction::Rx, channel).map_err(device_err)
    }

    fn shutdown(&mut self) -> CmdqResult<()> {
        info!(device = %self.label, "Releasing SoapySDR device");
        Ok(())
    }
}
