//! Instrument capability traits.
//!
//! Each category of instrument is a trait on top of [`Instrument`]. A driver
//! implements the one matching its hardware; code that only needs, say, a
//! voltage source can then be written against `impl Smu` and run with any
//! SMU model.
//!
//! # Design
//!
//! Every capability trait:
//! - Is async (uses `#[async_trait]`)
//! - Takes `&mut self`, commands on one connection are strictly sequential
//! - Returns [`InstrumentResult`]
//!
//! # Example
//!
//! ```rust,ignore
//! async fn source_voltage(smu: &mut impl Smu, volts: f64) -> InstrumentResult<Option<f64>> {
//!     smu.set_level(Unit::Voltage, SmuChannel::A, volts).await?;
//!     smu.turn_on(SmuChannel::A).await?;
//!     smu.measure(Unit::Current, SmuChannel::A).await
//! }
//! ```

use super::types::{
    AmplitudeLevel, DcChannel, FuncChannel, FunctionType, OscChannel, SmuChannel, TriggerEdge,
    Unit, VoltageUnit,
};
use crate::device::Instrument;
use crate::error::InstrumentResult;
use async_trait::async_trait;

/// Source-measure unit.
#[async_trait]
pub trait Smu: Instrument {
    /// Measure `unit` on `channel`.
    ///
    /// # Returns
    /// * `Ok(Some(value))` in direct mode
    /// * `Ok(None)` while buffering, the reading goes to the channel buffer
    async fn measure(&mut self, unit: Unit, channel: SmuChannel) -> InstrumentResult<Option<f64>>;

    /// Switch the output of `channel` on.
    async fn turn_on(&mut self, channel: SmuChannel) -> InstrumentResult<()>;

    /// Switch the output of `channel` off.
    async fn turn_off(&mut self, channel: SmuChannel) -> InstrumentResult<()>;

    /// Set the compliance limit for `unit`.
    async fn set_limit(&mut self, unit: Unit, channel: SmuChannel, limit: f64)
        -> InstrumentResult<()>;

    /// Set the source level for `unit`.
    async fn set_level(&mut self, unit: Unit, channel: SmuChannel, level: f64)
        -> InstrumentResult<()>;
}

/// Digital storage oscilloscope.
#[async_trait]
pub trait Oscilloscope: Instrument {
    /// Start continuous acquisition.
    async fn run(&mut self) -> InstrumentResult<()>;

    /// Stop acquisition.
    async fn stop(&mut self) -> InstrumentResult<()>;

    /// Acquire a single trigger.
    async fn single(&mut self) -> InstrumentResult<()>;

    /// Let the instrument pick scales and trigger.
    async fn auto_scale(&mut self) -> InstrumentResult<()>;

    /// Full-scale horizontal time in seconds.
    async fn set_time_range(&mut self, seconds: f64) -> InstrumentResult<()>;

    /// Vertical offset of `channel` in volts.
    async fn set_channel_offset(&mut self, channel: OscChannel, offset: f64)
        -> InstrumentResult<()>;

    /// Vertical scale of `channel` in volts per division.
    async fn set_channel_scale(&mut self, channel: OscChannel, scale: f64)
        -> InstrumentResult<()>;

    /// Full-scale vertical range of `channel`.
    async fn set_channel_range(
        &mut self,
        channel: OscChannel,
        range: f64,
        unit: VoltageUnit,
    ) -> InstrumentResult<()>;

    /// Trigger slope.
    async fn set_trigger_edge(&mut self, edge: TriggerEdge) -> InstrumentResult<()>;

    /// Trigger source channel.
    async fn set_trigger_source(&mut self, channel: OscChannel) -> InstrumentResult<()>;
}

/// Function / arbitrary waveform generator.
///
/// Setters update the cached output state only when the instrument accepted
/// the command.
#[async_trait]
pub trait FunctionGenerator: Instrument {
    /// Enable the output of `channel`.
    async fn turn_on(&mut self, channel: FuncChannel) -> InstrumentResult<()>;

    /// Disable the output of `channel`.
    async fn turn_off(&mut self, channel: FuncChannel) -> InstrumentResult<()>;

    /// Output frequency in hertz.
    async fn set_frequency(&mut self, channel: FuncChannel, hertz: f64) -> InstrumentResult<()>;

    /// Amplitude in volts, or the high/low level when `level` is given.
    async fn set_amplitude(
        &mut self,
        channel: FuncChannel,
        volts: f64,
        level: Option<AmplitudeLevel>,
    ) -> InstrumentResult<()>;

    /// Phase in degrees.
    async fn set_phase(&mut self, channel: FuncChannel, degrees: f64) -> InstrumentResult<()>;

    /// Waveform shape.
    async fn set_function(
        &mut self,
        channel: FuncChannel,
        function: FunctionType,
    ) -> InstrumentResult<()>;

    /// DC offset in volts.
    async fn set_offset(&mut self, channel: FuncChannel, volts: f64) -> InstrumentResult<()>;

    /// Last waveform shape set on `channel`.
    fn output_function(&self, channel: FuncChannel) -> FunctionType;

    /// Whether `channel` was last switched on.
    fn is_output_enabled(&self, channel: FuncChannel) -> bool;

    /// Last amplitude set on `channel`.
    fn current_amplitude(&self, channel: FuncChannel) -> f64;
}

/// Programmable DC power supply.
#[async_trait]
pub trait DcPowerSupply: Instrument {
    /// Enable `channel`.
    async fn turn_on(&mut self, channel: DcChannel) -> InstrumentResult<()>;

    /// Disable `channel`.
    async fn turn_off(&mut self, channel: DcChannel) -> InstrumentResult<()>;

    /// Current setpoint in amperes.
    async fn set_current(&mut self, channel: DcChannel, amperes: f64) -> InstrumentResult<()>;

    /// Current setpoint read back from the instrument.
    async fn current(&mut self, channel: DcChannel) -> InstrumentResult<f64>;

    /// Voltage setpoint in volts.
    async fn set_voltage(&mut self, channel: DcChannel, volts: f64) -> InstrumentResult<()>;

    /// Voltage setpoint read back from the instrument.
    async fn voltage(&mut self, channel: DcChannel) -> InstrumentResult<f64>;
}

/// Parse a numeric instrument response.
pub(crate) fn parse_f64(response: &str) -> InstrumentResult<f64> {
    response
        .trim()
        .parse::<f64>()
        .map_err(|_| crate::error::InstrumentError::parse("number", response))
}
