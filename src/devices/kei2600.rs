//! Keithley 2600 series source-measure units.
//!
//! The 2600 family is programmed in TSP, a Lua dialect: attributes are assigned
//! (`smua.source.levelv = 1.2`) and values are read back by printing them
//! (`print(reading)`). Besides line-by-line control the instrument stores and
//! runs whole scripts. Scripts are uploaded through the web interface at
//! `http://<host>/HttpCommand`, which is how [`SendMode::Buffered`] sequences
//! are executed.
//!
//! When buffering, readings are stored on the instrument in the reading
//! buffers [`CHANNEL_A_BUFFER`] and [`CHANNEL_B_BUFFER`]. Every buffered script
//! starts by creating these buffers with room for the measurements it takes.

use super::capabilities::{parse_f64, Smu};
use super::types::{
    AutoZero, SmuChannel, SmuDisplay, SmuSense, SourceFunction, SourceOffMode, SourceSettling,
    Unit,
};
use super::DeviceModel;
use crate::command::{ExecArgs, SubArg};
use crate::device::{Device, DeviceConfig, DeviceKind, Instrument, SendMode};
use crate::error::{InstrumentError, InstrumentResult};
use crate::http::{HttpClient, HttpError, HttpTransport, Request, Uri};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Model name reported by [`Device::name`].
pub const DEVICE_NAME: &str = "Keithley SMU 2600B";

/// Reading buffer of channel A.
pub const CHANNEL_A_BUFFER: &str = "A_M_BUFFER";

/// Reading buffer of channel B.
pub const CHANNEL_B_BUFFER: &str = "B_M_BUFFER";

/// Name the buffered script is stored under on the instrument.
pub const BUFFERED_SCRIPT_NAME: &str = "bufferedScript";

const A_BUFFER_SIZE_PLACEHOLDER: &str = "%A_M_BUFFER_SIZE%";
const B_BUFFER_SIZE_PLACEHOLDER: &str = "%B_M_BUFFER_SIZE%";

/// Lines per `shellInput` request.
const UPLOAD_BATCH_LINES: usize = 32;

/// Values per `printbuffer` call, keeps each answer below 1 KiB.
const READ_BATCH_ENTRIES: usize = 1024 / 15;

/// Voltage increment of a linear sweep.
const SWEEP_STEP_VOLTS: f64 = 0.001;

const NPLC_RANGE: std::ops::RangeInclusive<f64> = 0.001..=25.0;

const BUFFERING_NOTICE: &str =
    "Currently Buffering, currently only accumulating buffered script.";

/// Pauses the web interface needs between script upload requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptUploadTiming {
    /// Pause after entering and before leaving the script shell
    pub settle: Duration,
    /// Pause after every payload
    pub per_payload: Duration,
}

impl Default for ScriptUploadTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(300),
            per_payload: Duration::from_millis(100),
        }
    }
}

impl ScriptUploadTiming {
    /// No pauses, for instruments that do not need them and for tests.
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            per_payload: Duration::ZERO,
        }
    }
}

/// Reading buffer that stores measurements of `channel`.
pub fn buffer_name(channel: SmuChannel) -> &'static str {
    match channel {
        SmuChannel::A => CHANNEL_A_BUFFER,
        SmuChannel::B => CHANNEL_B_BUFFER,
    }
}

fn default_preamble() -> Vec<String> {
    vec![
        format!("{CHANNEL_A_BUFFER} = smua.makebuffer({A_BUFFER_SIZE_PLACEHOLDER})"),
        format!("{CHANNEL_B_BUFFER} = smub.makebuffer({B_BUFFER_SIZE_PLACEHOLDER})"),
        format!("{CHANNEL_A_BUFFER}.appendmode = 1"),
        format!("{CHANNEL_B_BUFFER}.appendmode = 1"),
    ]
}

/// `{"command": "shellInput", "value": ...}`
fn shell_input(value: &str) -> Value {
    json!({ "command": "shellInput", "value": value })
}

/// `{"command": "keyInput", "value": "K"}`, leaves the script shell.
fn exit_payload() -> Value {
    json!({ "command": "keyInput", "value": "K" })
}

/// Build the request bodies that store `lines` as script `name`.
pub fn script_payloads(name: &str, lines: &[String]) -> Vec<Value> {
    let mut script = Vec::with_capacity(lines.len() + 2);
    script.push(format!("loadscript {name}"));
    script.extend(lines.iter().cloned());
    script.push("endscript".to_string());

    let mut payloads: Vec<Value> = script
        .chunks(UPLOAD_BATCH_LINES)
        .map(|batch| {
            let value: String = batch.iter().map(|line| format!("{line}\n")).collect();
            shell_input(&value)
        })
        .collect();
    payloads.push(shell_input(&format!("{name}.save()")));
    payloads
}

/// Keithley 2600 series SMU.
pub struct Kei2600 {
    device: Device,
    http: Option<Arc<dyn HttpTransport>>,
    upload_timing: ScriptUploadTiming,
    check_error_buffer: bool,
    buffer_entries: [u32; 2],
}

impl fmt::Debug for Kei2600 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kei2600")
            .field("device", &self.device)
            .field("check_error_buffer", &self.check_error_buffer)
            .field("buffer_entries", &self.buffer_entries)
            .finish_non_exhaustive()
    }
}

impl Kei2600 {
    /// Unconnected SMU.
    pub fn new(config: DeviceConfig) -> Self {
        Self::from_device(Device::new(config))
    }

    /// Wrap an existing device, connected or not.
    pub fn from_device(mut device: Device) -> Self {
        device.set_name(DEVICE_NAME);
        device.set_script_preamble(default_preamble());
        Self {
            device,
            http: None,
            upload_timing: ScriptUploadTiming::default(),
            check_error_buffer: false,
            buffer_entries: [0; 2],
        }
    }

    /// Use `http` for script uploads instead of a reqwest client.
    #[must_use]
    pub fn with_http(mut self, http: Arc<dyn HttpTransport>) -> Self {
        self.http = Some(http);
        self
    }

    /// Change the pauses between upload requests.
    #[must_use]
    pub fn with_upload_timing(mut self, timing: ScriptUploadTiming) -> Self {
        self.upload_timing = timing;
        self
    }

    /// Query the error queue after every successful command sent in direct mode.
    pub fn set_check_error_buffer(&mut self, enabled: bool) {
        self.check_error_buffer = enabled;
    }

    /// Whether the error queue is queried after each command.
    pub fn checks_error_buffer(&self) -> bool {
        self.check_error_buffer
    }

    /// Measurements buffered for `channel` since the last buffer reset.
    pub fn buffered_entries(&self, channel: SmuChannel) -> u32 {
        self.buffer_entries[channel_index(channel)]
    }

    // ------------------------------------------------------------------------
    // Command helpers
    // ------------------------------------------------------------------------

    fn invalid<T>(&mut self, message: impl Into<String>) -> InstrumentResult<T> {
        self.device
            .record(Err(InstrumentError::InvalidArguments(message.into())))
    }

    async fn check_errors(&mut self) -> InstrumentResult<()> {
        if self.check_error_buffer && !self.device.is_buffered() {
            self.error_buffer_status().await
        } else {
            Ok(())
        }
    }

    async fn exec_checked(&mut self, args: &ExecArgs) -> InstrumentResult<()> {
        self.device.exec("", args).await?;
        self.check_errors().await
    }

    /// `smuX.<attribute> = <value>`
    async fn set_attribute(
        &mut self,
        channel: SmuChannel,
        attribute: &str,
        value: impl fmt::Display + Send,
    ) -> InstrumentResult<()> {
        let smu = SubArg::new("smu").elem(channel);
        let args = ExecArgs::new().arg(SubArg::new(&smu).elem_with(attribute, ".", ""), value, " = ");
        self.exec_checked(&args).await
    }

    /// `smuX.<attribute> = smuX.<constant>`
    async fn set_constant(
        &mut self,
        channel: SmuChannel,
        attribute: &str,
        constant: &str,
    ) -> InstrumentResult<()> {
        let smu = SubArg::new("smu").elem(channel);
        let value = SubArg::new(&smu).elem_with(constant, ".", "");
        self.set_attribute(channel, attribute, value).await
    }

    fn voltage_or_current(&mut self, unit: Unit, what: &str) -> InstrumentResult<&'static str> {
        match unit {
            Unit::Voltage | Unit::Current => Ok(unit.mnemonic()),
            other => self.invalid(format!("{what} is only available for voltage and current, got {other:?}")),
        }
    }

    // ------------------------------------------------------------------------
    // Measurement configuration
    // ------------------------------------------------------------------------

    async fn set_measure_autorange(
        &mut self,
        unit: Unit,
        channel: SmuChannel,
        enabled: bool,
    ) -> InstrumentResult<()> {
        let letter = self.voltage_or_current(unit, "measure autorange")?;
        self.set_attribute(channel, &format!("measure.autorange{letter}"), u8::from(enabled))
            .await
    }

    /// `smuX.measure.autorangeY = 1`
    pub async fn enable_measure_autorange(
        &mut self,
        unit: Unit,
        channel: SmuChannel,
    ) -> InstrumentResult<()> {
        self.set_measure_autorange(unit, channel, true).await
    }

    /// `smuX.measure.autorangeY = 0`
    pub async fn disable_measure_autorange(
        &mut self,
        unit: Unit,
        channel: SmuChannel,
    ) -> InstrumentResult<()> {
        self.set_measure_autorange(unit, channel, false).await
    }

    async fn set_source_autorange(
        &mut self,
        unit: Unit,
        channel: SmuChannel,
        enabled: bool,
    ) -> InstrumentResult<()> {
        let letter = self.voltage_or_current(unit, "source autorange")?;
        let constant = if enabled { "AUTORANGE_ON" } else { "AUTORANGE_OFF" };
        self.set_constant(channel, &format!("source.autorange{letter}"), constant)
            .await
    }

    /// `smuX.source.autorangeY = smuX.AUTORANGE_ON`
    pub async fn enable_source_autorange(
        &mut self,
        unit: Unit,
        channel: SmuChannel,
    ) -> InstrumentResult<()> {
        self.set_source_autorange(unit, channel, true).await
    }

    /// `smuX.source.autorangeY = smuX.AUTORANGE_OFF`
    pub async fn disable_source_autorange(
        &mut self,
        unit: Unit,
        channel: SmuChannel,
    ) -> InstrumentResult<()> {
        self.set_source_autorange(unit, channel, false).await
    }

    /// Analog filter on the low current ranges.
    pub async fn set_analog_filter(
        &mut self,
        channel: SmuChannel,
        enabled: bool,
    ) -> InstrumentResult<()> {
        self.set_attribute(channel, "measure.analogfilter", u8::from(enabled))
            .await
    }

    /// Sink mode, limits the power the output can absorb.
    pub async fn set_source_sink(&mut self, channel: SmuChannel, enabled: bool) -> InstrumentResult<()> {
        self.set_attribute(channel, "source.sink", u8::from(enabled))
            .await
    }

    /// Fixed measurement range.
    pub async fn set_measure_range(
        &mut self,
        unit: Unit,
        channel: SmuChannel,
        range: f64,
    ) -> InstrumentResult<()> {
        let letter = self.voltage_or_current(unit, "measure range")?;
        self.set_attribute(channel, &format!("measure.range{letter}"), range)
            .await
    }

    /// Fixed source range.
    pub async fn set_source_range(
        &mut self,
        unit: Unit,
        channel: SmuChannel,
        range: f64,
    ) -> InstrumentResult<()> {
        let letter = self.voltage_or_current(unit, "source range")?;
        self.set_attribute(channel, &format!("source.range{letter}"), range)
            .await
    }

    /// 2-wire, 4-wire or calibration sensing.
    pub async fn set_sense_mode(&mut self, channel: SmuChannel, sense: SmuSense) -> InstrumentResult<()> {
        self.set_constant(channel, "sense", sense.mnemonic()).await
    }

    /// Integration aperture in power line cycles, 0.001 to 25.
    pub async fn set_measure_plc(&mut self, channel: SmuChannel, nplc: f64) -> InstrumentResult<()> {
        if !NPLC_RANGE.contains(&nplc) {
            return self.invalid(format!("nplc must be within 0.001..=25, got {nplc}"));
        }
        self.set_attribute(channel, "measure.nplc", nplc).await
    }

    /// Lowest range autorange may select.
    pub async fn set_measure_low_range(
        &mut self,
        unit: Unit,
        channel: SmuChannel,
        range: f64,
    ) -> InstrumentResult<()> {
        let letter = self.voltage_or_current(unit, "measure low range")?;
        self.set_attribute(channel, &format!("measure.lowrange{letter}"), range)
            .await
    }

    /// Autozero behaviour.
    pub async fn set_measure_auto_zero(
        &mut self,
        channel: SmuChannel,
        auto_zero: AutoZero,
    ) -> InstrumentResult<()> {
        self.set_constant(channel, "measure.autozero", auto_zero.mnemonic())
            .await
    }

    /// Number of readings per measurement call.
    pub async fn set_measure_count(&mut self, channel: SmuChannel, count: u32) -> InstrumentResult<()> {
        if count == 0 {
            return self.invalid("measure count must be at least 1");
        }
        self.set_attribute(channel, "measure.count", count).await
    }

    // ------------------------------------------------------------------------
    // Source configuration
    // ------------------------------------------------------------------------

    /// Source voltage or current.
    pub async fn set_source_function(
        &mut self,
        channel: SmuChannel,
        function: SourceFunction,
    ) -> InstrumentResult<()> {
        self.set_constant(channel, "source.func", function.mnemonic())
            .await
    }

    /// Output state while switched off.
    pub async fn set_source_off_mode(
        &mut self,
        channel: SmuChannel,
        mode: SourceOffMode,
    ) -> InstrumentResult<()> {
        self.set_constant(channel, "source.offmode", mode.mnemonic())
            .await
    }

    /// Settling behaviour when changing ranges or polarity.
    pub async fn set_source_settling(
        &mut self,
        channel: SmuChannel,
        settling: SourceSettling,
    ) -> InstrumentResult<()> {
        self.set_constant(channel, "source.settling", settling.mnemonic())
            .await
    }

    /// Front panel measurement display.
    pub async fn display_measure_function(
        &mut self,
        channel: SmuChannel,
        display: SmuDisplay,
    ) -> InstrumentResult<()> {
        let target = SubArg::new("display")
            .elem_with("smu", ".", "")
            .elem(channel)
            .elem(".measure.func");
        let args = ExecArgs::new().arg(target, SubArg::new("display").elem_with(display, ".", ""), " = ");
        self.exec_checked(&args).await
    }

    // ------------------------------------------------------------------------
    // Beeper
    // ------------------------------------------------------------------------

    async fn set_beeper(&mut self, enabled: bool) -> InstrumentResult<()> {
        let state = if enabled { "beeper.ON" } else { "beeper.OFF" };
        let args = ExecArgs::new().arg("beeper.enable", state, " = ");
        self.exec_checked(&args).await
    }

    /// Enable the beeper, required before [`Kei2600::beep`].
    pub async fn enable_beep(&mut self) -> InstrumentResult<()> {
        self.set_beeper(true).await
    }

    /// Disable the beeper.
    pub async fn disable_beep(&mut self) -> InstrumentResult<()> {
        self.set_beeper(false).await
    }

    /// Beep for `seconds` at `frequency` hertz.
    pub async fn beep(&mut self, seconds: f64, frequency: u32) -> InstrumentResult<()> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return self.invalid(format!("beep duration must be positive, got {seconds}"));
        }
        let args = ExecArgs::new().raw(
            SubArg::new("beeper.beep").elem_with(format!("{seconds},{frequency}"), "(", ")"),
        );
        self.exec_checked(&args).await
    }

    // ------------------------------------------------------------------------
    // Error queue
    // ------------------------------------------------------------------------

    /// Pop the oldest entry of the error queue as `"<code>\t<message>"`.
    ///
    /// While buffering nothing is sent and a notice is returned instead.
    pub async fn last_error(&mut self) -> InstrumentResult<String> {
        if self.device.is_buffered() {
            return Ok(BUFFERING_NOTICE.to_string());
        }
        self.device
            .exec_str("errorcode, message = errorqueue.next()")
            .await?;
        let response = self.device.query_str("print(errorcode, message)").await?;
        Ok(response.lines().next().unwrap_or_default().to_string())
    }

    /// Empty the error queue.
    pub async fn clear_error_buffer(&mut self) -> InstrumentResult<()> {
        self.device.exec_str("errorqueue.clear()").await
    }

    /// Fail with [`InstrumentError::ErrorQueueNotEmpty`] if the queue holds entries.
    pub async fn error_buffer_status(&mut self) -> InstrumentResult<()> {
        if self.device.is_buffered() {
            return Ok(());
        }
        self.device.exec_str("count = errorqueue.count").await?;
        let response = self.device.query_str("print(count)").await?;
        let count = parse_f64(&response)?;
        if count > 0.0 {
            return self
                .device
                .record(Err(InstrumentError::ErrorQueueNotEmpty(count as u32)));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reading buffers
    // ------------------------------------------------------------------------

    /// `<name>.clear()`
    pub async fn clear_buffer(&mut self, name: &str) -> InstrumentResult<()> {
        let args = ExecArgs::new().raw(SubArg::new(name).elem_with("clear", ".", "()"));
        self.exec_checked(&args).await
    }

    /// Number of readings stored in buffer `name`.
    pub async fn buffer_size(&mut self, name: &str) -> InstrumentResult<usize> {
        let response = self
            .device
            .query_str(&format!("print({name}.n)"))
            .await?;
        let size = parse_f64(&response)?;
        if size < 0.0 {
            return Err(InstrumentError::parse("buffer size", response));
        }
        Ok(size as usize)
    }

    /// Readings `start..=end` (1-based) of buffer `name`.
    pub async fn read_buffer_range(
        &mut self,
        name: &str,
        start: usize,
        end: usize,
    ) -> InstrumentResult<Vec<f64>> {
        let args = ExecArgs::new().raw(
            SubArg::new("printbuffer").elem_with(format!("{start}, {end}, {name}"), "(", ")"),
        );
        let response = self.device.query("", &args).await?;
        response
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(parse_f64)
            .collect()
    }

    /// Read every reading of buffer `name`, then clear it.
    pub async fn read_buffer(&mut self, name: &str) -> InstrumentResult<Vec<f64>> {
        let size = self.buffer_size(name).await?;
        let mut values = Vec::with_capacity(size);

        let mut start = 1;
        while start <= size {
            let end = (start + READ_BATCH_ENTRIES - 1).min(size);
            values.extend(self.read_buffer_range(name, start, end).await?);
            start = end + 1;
        }
        tracing::debug!(buffer = name, readings = values.len(), "Read reading buffer");

        self.clear_buffer(name).await?;
        Ok(values)
    }

    // ------------------------------------------------------------------------
    // Scripts
    // ------------------------------------------------------------------------

    fn http(&mut self) -> InstrumentResult<Arc<dyn HttpTransport>> {
        if let Some(http) = &self.http {
            return Ok(Arc::clone(http));
        }
        let client = HttpClient::new(self.device.timeout()).map_err(HttpError::from)?;
        let http: Arc<dyn HttpTransport> = Arc::new(client);
        self.http = Some(Arc::clone(&http));
        Ok(http)
    }

    async fn post(http: &dyn HttpTransport, uri: &Uri, payload: &Value) -> Result<(), HttpError> {
        let request = Request::post(uri.clone()).json(payload)?;
        http.send(request).await?.error_for_status()?;
        Ok(())
    }

    /// Store `script` on the instrument as `name` without running it.
    pub async fn send_script(&mut self, name: &str, script: &str) -> InstrumentResult<()> {
        let lines: Vec<String> = script.lines().map(str::to_owned).collect();
        self.send_script_lines(name, &lines).await
    }

    /// Store `lines` on the instrument as script `name` without running it.
    pub async fn send_script_lines(&mut self, name: &str, lines: &[String]) -> InstrumentResult<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return self.invalid(format!("invalid script name '{name}'"));
        }

        let uri = Uri::http(self.device.host(), "HttpCommand").map_err(HttpError::from)?;
        let http = self.http()?;
        let timing = self.upload_timing;
        let payloads = script_payloads(name, lines);
        let exit = exit_payload();

        tracing::info!(device = %self.device.name(), script = name, lines = lines.len(), "Uploading script");
        let result: Result<(), HttpError> = async {
            Self::post(http.as_ref(), &uri, &exit).await?;
            tokio::time::sleep(timing.settle).await;
            for payload in &payloads {
                Self::post(http.as_ref(), &uri, payload).await?;
                tokio::time::sleep(timing.per_payload).await;
            }
            tokio::time::sleep(timing.settle).await;
            Self::post(http.as_ref(), &uri, &exit).await
        }
        .await;

        self.device.record(result.map_err(InstrumentError::from))?;
        self.check_errors().await
    }

    /// Run the stored script `name`.
    pub async fn execute_script(&mut self, name: &str) -> InstrumentResult<()> {
        let args = ExecArgs::new().raw(SubArg::new(name).elem("()"));
        self.exec_checked(&args).await
    }

    /// Store and run `script` as `name`.
    pub async fn send_and_execute_script(&mut self, name: &str, script: &str) -> InstrumentResult<()> {
        self.send_script(name, script).await?;
        self.execute_script(name).await
    }

    async fn send_and_execute_lines(&mut self, name: &str, lines: &[String]) -> InstrumentResult<()> {
        self.send_script_lines(name, lines).await?;
        self.execute_script(name).await
    }

    /// Upload and run everything buffered so far, then start a fresh buffer.
    ///
    /// The reading buffers are sized to the number of buffered measurements.
    pub async fn execute_buffered_script(&mut self) -> InstrumentResult<()> {
        let previous = self.device.send_mode();
        self.device.change_send_mode(SendMode::Direct);

        let a_size = self.buffer_entries[0].max(1).to_string();
        let b_size = self.buffer_entries[1].max(1).to_string();
        let lines: Vec<String> = self
            .device
            .buffered_lines()
            .iter()
            .map(|line| {
                line.replace(A_BUFFER_SIZE_PLACEHOLDER, &a_size)
                    .replace(B_BUFFER_SIZE_PLACEHOLDER, &b_size)
            })
            .collect();

        let result = self.send_and_execute_lines(BUFFERED_SCRIPT_NAME, &lines).await;
        self.device.change_send_mode(previous);
        self.clear_buffered_script();
        result
    }

    /// Drop all buffered commands and reset the measurement counters.
    pub fn clear_buffered_script(&mut self) {
        self.device.clear_buffered_script();
        self.buffer_entries = [0; 2];
    }

    /// Ramp the voltage of `channel` from `start` to `stop` volts at
    /// `rate_mv_per_s` while sourcing `current` amperes.
    ///
    /// The ramp is unrolled into a script and run on the instrument. The send
    /// mode and any pending buffered commands are left as they were.
    pub async fn perform_linear_voltage_sweep(
        &mut self,
        channel: SmuChannel,
        start: f64,
        stop: f64,
        rate_mv_per_s: u32,
        current: f64,
    ) -> InstrumentResult<()> {
        if rate_mv_per_s == 0 {
            return self.invalid("sweep rate must be positive");
        }
        if !start.is_finite() || !stop.is_finite() || start > stop {
            return self.invalid(format!("invalid sweep range {start}..{stop}"));
        }

        let previous_mode = self.device.send_mode();
        let previous_lines = self.device.replace_buffered_lines(Vec::new());
        let previous_entries = self.buffer_entries;
        self.device.change_send_mode(SendMode::Buffered);

        let result = self
            .run_sweep(channel, start, stop, rate_mv_per_s, current)
            .await;

        self.device.change_send_mode(previous_mode);
        self.device.replace_buffered_lines(previous_lines);
        self.buffer_entries = previous_entries;
        result
    }

    async fn run_sweep(
        &mut self,
        channel: SmuChannel,
        start: f64,
        stop: f64,
        rate_mv_per_s: u32,
        current: f64,
    ) -> InstrumentResult<()> {
        let step_delay = 1.0 / f64::from(rate_mv_per_s);

        self.set_source_function(channel, SourceFunction::DcVolts).await?;
        self.turn_on(channel).await?;
        self.set_limit(Unit::Voltage, channel, round_micro(stop + 0.1)).await?;
        self.set_limit(Unit::Current, channel, round_micro(current + 0.001)).await?;
        self.set_level(Unit::Current, channel, current).await?;

        let mut step = 0u32;
        loop {
            let voltage = round_micro(start + f64::from(step) * SWEEP_STEP_VOLTS);
            if voltage >= stop {
                break;
            }
            self.set_level(Unit::Voltage, channel, voltage).await?;
            self.device.delay(step_delay).await?;
            step += 1;
        }
        self.set_level(Unit::Voltage, channel, stop).await?;
        self.turn_off(channel).await?;

        tracing::info!(
            device = %self.device.name(),
            steps = step,
            "Executing linear voltage sweep"
        );
        self.execute_buffered_script().await
    }

    async fn set_output(&mut self, channel: SmuChannel, on: bool) -> InstrumentResult<()> {
        let constant = if on { "OUTPUT_ON" } else { "OUTPUT_OFF" };
        self.set_constant(channel, "source.output", constant).await
    }
}

/// Keep float noise (`0.30000000000000004`) out of generated scripts.
fn round_micro(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

fn channel_index(channel: SmuChannel) -> usize {
    match channel {
        SmuChannel::A => 0,
        SmuChannel::B => 1,
    }
}

impl Instrument for Kei2600 {
    fn device(&self) -> &Device {
        &self.device
    }

    fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Smu
    }

    fn model(&self) -> Option<DeviceModel> {
        Some(DeviceModel::Kei2600)
    }
}

#[async_trait]
impl Smu for Kei2600 {
    async fn measure(&mut self, unit: Unit, channel: SmuChannel) -> InstrumentResult<Option<f64>> {
        let buffered = self.device.is_buffered();
        let storage = if buffered { buffer_name(channel) } else { "" };

        let measurement = SubArg::new("smu")
            .elem(channel)
            .elem_with("measure", ".", "")
            .elem_with(unit, ".", "")
            .elem_with(storage, "(", ")");
        let args = ExecArgs::new().arg("reading", measurement, " = ");
        self.device.exec("", &args).await?;

        if buffered {
            self.buffer_entries[channel_index(channel)] += 1;
            return Ok(None);
        }

        let response = self.device.query_str("print(reading)").await?;
        let value = parse_f64(&response)?;
        tracing::debug!(device = %self.device.name(), ?unit, ?channel, value, "Measured");
        self.check_errors().await?;
        Ok(Some(value))
    }

    async fn turn_on(&mut self, channel: SmuChannel) -> InstrumentResult<()> {
        self.set_output(channel, true).await
    }

    async fn turn_off(&mut self, channel: SmuChannel) -> InstrumentResult<()> {
        self.set_output(channel, false).await
    }

    async fn set_limit(&mut self, unit: Unit, channel: SmuChannel, limit: f64) -> InstrumentResult<()> {
        let letter = match unit {
            Unit::Voltage | Unit::Current | Unit::Power => unit.mnemonic(),
            Unit::Resistance => return self.invalid("no limit exists for resistance"),
        };
        self.set_attribute(channel, &format!("source.limit{letter}"), limit)
            .await
    }

    async fn set_level(&mut self, unit: Unit, channel: SmuChannel, level: f64) -> InstrumentResult<()> {
        let letter = self.voltage_or_current(unit, "source level")?;
        self.set_attribute(channel, &format!("source.level{letter}"), level)
            .await
    }
}
