//! Siglent SPD1000X series programmable DC power supplies.

use super::capabilities::{parse_f64, DcPowerSupply};
use super::types::DcChannel;
use super::DeviceModel;
use crate::command::{ExecArgs, SubArg};
use crate::device::{Device, DeviceConfig, DeviceKind, Instrument};
use crate::error::{InstrumentError, InstrumentResult};
use async_trait::async_trait;

/// Model name reported by [`Device::name`].
pub const DEVICE_NAME: &str = "DC Power Supply";

/// Siglent SPD1305X.
#[derive(Debug)]
pub struct Spd1305 {
    device: Device,
}

impl Spd1305 {
    /// Unconnected supply.
    pub fn new(config: DeviceConfig) -> Self {
        Self::from_device(Device::new(config))
    }

    /// Wrap an existing device.
    pub fn from_device(mut device: Device) -> Self {
        device.set_name(DEVICE_NAME);
        Self { device }
    }

    fn channel(channel: DcChannel) -> SubArg {
        SubArg::new("CH").elem(channel)
    }

    async fn set_quantity(&mut self, channel: DcChannel, quantity: &str, value: f64) -> InstrumentResult<()> {
        if !value.is_finite() || value < 0.0 {
            return self.device.record(Err(InstrumentError::InvalidArguments(format!(
                "{quantity} setpoint must be a non-negative number, got {value}"
            ))));
        }
        let target = Self::channel(channel).elem_with(quantity, ":", "");
        self.device
            .exec("", &ExecArgs::new().arg(target, value, " "))
            .await
    }

    async fn query_quantity(&mut self, channel: DcChannel, quantity: &str) -> InstrumentResult<f64> {
        let query = Self::channel(channel).elem_with(quantity, ":", "?");
        let response = self.device.query("", &ExecArgs::new().raw(query)).await?;
        let result = parse_f64(&response);
        self.device.record(result)
    }

    async fn output(&mut self, channel: DcChannel, on: bool) -> InstrumentResult<()> {
        let state = if on { "ON" } else { "OFF" };
        self.device
            .exec("OUTPut ", &ExecArgs::new().arg(Self::channel(channel), state, ","))
            .await
    }
}

impl Instrument for Spd1305 {
    fn device(&self) -> &Device {
        &self.device
    }

    fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::DcPowerSupply
    }

    fn model(&self) -> Option<DeviceModel> {
        Some(DeviceModel::Spd1305)
    }
}

#[async_trait]
impl DcPowerSupply for Spd1305 {
    async fn turn_on(&mut self, channel: DcChannel) -> InstrumentResult<()> {
        self.output(channel, true).await
    }

    async fn turn_off(&mut self, channel: DcChannel) -> InstrumentResult<()> {
        self.output(channel, false).await
    }

    async fn set_current(&mut self, channel: DcChannel, amperes: f64) -> InstrumentResult<()> {
        self.set_quantity(channel, "CURRent", amperes).await
    }

    async fn current(&mut self, channel: DcChannel) -> InstrumentResult<f64> {
        self.query_quantity(channel, "CURRent").await
    }

    async fn set_voltage(&mut self, channel: DcChannel, volts: f64) -> InstrumentResult<()> {
        self.set_quantity(channel, "VOLTage", volts).await
    }

    async fn voltage(&mut self, channel: DcChannel) -> InstrumentResult<f64> {
        self.query_quantity(channel, "VOLTage").await
    }
}
