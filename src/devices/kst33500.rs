//! Keysight 33500B series waveform generators.

use super::capabilities::FunctionGenerator;
use super::types::{AmplitudeLevel, FuncChannel, FunctionType};
use super::DeviceModel;
use crate::command::{ExecArgs, SubArg};
use crate::device::{Device, DeviceConfig, DeviceKind, Instrument};
use crate::error::{InstrumentError, InstrumentResult};
use async_trait::async_trait;
use std::time::Duration;

/// Model name reported by [`Device::name`].
pub const DEVICE_NAME: &str = "Keysight 33500B Waveform Generator";

/// How long the connection banner stays on screen.
pub const DISPLAY_CONNECTION_PAUSE: Duration = Duration::from_secs(2);

/// Output state last confirmed by the instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelState {
    /// Waveform shape
    pub function: FunctionType,
    /// Output relay closed
    pub enabled: bool,
    /// Amplitude in volts
    pub amplitude: f64,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            function: FunctionType::Sine,
            enabled: false,
            amplitude: 0.0,
        }
    }
}

/// Keysight 33500B function / arbitrary waveform generator.
#[derive(Debug)]
pub struct Kst33500 {
    device: Device,
    channels: [ChannelState; 2],
}

impl Kst33500 {
    /// Unconnected generator.
    pub fn new(config: DeviceConfig) -> Self {
        Self::from_device(Device::new(config))
    }

    /// Wrap an existing device.
    pub fn from_device(mut device: Device) -> Self {
        device.set_name(DEVICE_NAME);
        Self {
            device,
            channels: [ChannelState::default(); 2],
        }
    }

    /// Cached state of `channel`.
    pub fn channel_state(&self, channel: FuncChannel) -> ChannelState {
        self.channels[Self::index(channel)]
    }

    fn index(channel: FuncChannel) -> usize {
        match channel {
            FuncChannel::A => 0,
            FuncChannel::B => 1,
        }
    }

    fn source(channel: FuncChannel) -> SubArg {
        SubArg::new("SOURce").elem(channel)
    }

    async fn exec(&mut self, args: ExecArgs) -> InstrumentResult<()> {
        self.device.exec("", &args).await
    }

    async fn output(&mut self, channel: FuncChannel, on: bool) -> InstrumentResult<()> {
        let state = if on { "ON" } else { "OFF" };
        self.exec(ExecArgs::new().arg(SubArg::new("OUTPut").elem(channel), state, " "))
            .await?;
        self.channels[Self::index(channel)].enabled = on;
        Ok(())
    }

    /// Show `text` on the front panel.
    pub async fn display_text(&mut self, text: &str) -> InstrumentResult<()> {
        if text.contains('\'') {
            return self.device.record(Err(InstrumentError::InvalidArguments(
                "display text must not contain single quotes".to_string(),
            )));
        }
        self.exec(ExecArgs::new().arg("DISP:TEXT", SubArg::with_affixes(text, "'", "'"), " "))
            .await
    }

    /// Show a confirmation text on the screen, then restore the display.
    pub async fn display_connection(&mut self) -> InstrumentResult<()> {
        self.device
            .exec_str("DISP:TEXT 'Connected Successfully. Returning...'")
            .await?;
        tokio::time::sleep(DISPLAY_CONNECTION_PAUSE).await;
        self.device.exec_str("DISP ON").await?;
        self.device.exec_str("DISPlay:TEXT:CLEar").await
    }

    /// Pulse width in milliseconds, used by the pulse function.
    pub async fn set_pulse_width(&mut self, channel: FuncChannel, millis: f64) -> InstrumentResult<()> {
        if millis <= 0.0 {
            return self.device.record(Err(InstrumentError::InvalidArguments(format!(
                "pulse width must be positive, got {millis}"
            ))));
        }
        let target = Self::source(channel).elem_with("FUNCtion:PULSe:WIDTh", ":", "");
        self.exec(ExecArgs::new().arg(target, SubArg::with_affixes(millis, "", " ms"), " "))
            .await
    }
}

impl Instrument for Kst33500 {
    fn device(&self) -> &Device {
        &self.device
    }

    fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::FunctionGenerator
    }

    fn model(&self) -> Option<DeviceModel> {
        Some(DeviceModel::Kst33500)
    }
}

#[async_trait]
impl FunctionGenerator for Kst33500 {
    async fn turn_on(&mut self, channel: FuncChannel) -> InstrumentResult<()> {
        self.output(channel, true).await
    }

    async fn turn_off(&mut self, channel: FuncChannel) -> InstrumentResult<()> {
        self.output(channel, false).await
    }

    async fn set_frequency(&mut self, channel: FuncChannel, hertz: f64) -> InstrumentResult<()> {
        let target = Self::source(channel).elem_with("FREQuency", ":", "");
        self.exec(ExecArgs::new().arg(target, hertz, " ")).await
    }

    async fn set_amplitude(
        &mut self,
        channel: FuncChannel,
        volts: f64,
        level: Option<AmplitudeLevel>,
    ) -> InstrumentResult<()> {
        let mut target = Self::source(channel).elem_with("VOLTage", ":", "");
        if let Some(level) = level {
            target = target.elem_with(level, ":", "");
        }
        self.exec(ExecArgs::new().arg(target, volts, " ")).await?;
        self.channels[Self::index(channel)].amplitude = volts;
        Ok(())
    }

    async fn set_phase(&mut self, channel: FuncChannel, degrees: f64) -> InstrumentResult<()> {
        let target = Self::source(channel).elem_with("PHASe", ":", "");
        self.exec(ExecArgs::new().arg(target, degrees, " ")).await
    }

    async fn set_function(
        &mut self,
        channel: FuncChannel,
        function: FunctionType,
    ) -> InstrumentResult<()> {
        let target = Self::source(channel).elem_with("FUNCtion", ":", "");
        self.exec(ExecArgs::new().arg(target, function, " ")).await?;
        self.channels[Self::index(channel)].function = function;
        Ok(())
    }

    async fn set_offset(&mut self, channel: FuncChannel, volts: f64) -> InstrumentResult<()> {
        let target = Self::source(channel).elem_with("VOLTage:OFFSet", ":", "");
        self.exec(ExecArgs::new().arg(target, volts, " ")).await
    }

    fn output_function(&self, channel: FuncChannel) -> FunctionType {
        self.channel_state(channel).function
    }

    fn is_output_enabled(&self, channel: FuncChannel) -> bool {
        self.channel_state(channel).enabled
    }

    fn current_amplitude(&self, channel: FuncChannel) -> f64 {
        self.channel_state(channel).amplitude
    }
}
