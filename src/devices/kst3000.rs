//! Keysight InfiniiVision 3000 X-series oscilloscopes.

use super::capabilities::{parse_f64, Oscilloscope};
use super::types::{DisplayMode, OscChannel, PointsMode, TriggerEdge, VoltageUnit, WaveformFormat};
use super::DeviceModel;
use crate::command::{ExecArgs, SubArg};
use crate::device::{Device, DeviceConfig, DeviceKind, Instrument};
use crate::error::{InstrumentError, InstrumentResult};
use async_trait::async_trait;
use std::time::Duration;

/// Model name reported by [`Device::name`].
pub const DEVICE_NAME: &str = "Keysight 3000 X-Series Oscilloscope";

/// How long the connection banner stays on screen.
pub const DISPLAY_CONNECTION_PAUSE: Duration = Duration::from_secs(2);

/// Format code of BYTE data in the waveform preamble.
const PREAMBLE_FORMAT_BYTE: i32 = 0;

/// Scaling information returned by `WAVeform:PREamble?`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformPreamble {
    /// 0 = BYTE, 1 = WORD, 4 = ASCII
    pub format: i32,
    /// 0 = NORMal, 1 = PEAK, 2 = AVERage, 3 = HRESolution
    pub acquisition_type: i32,
    /// Number of data points transferred
    pub points: u64,
    /// Averages per point (1 unless averaging)
    pub count: u64,
    /// Time between points in seconds
    pub x_increment: f64,
    /// Time of the first point in seconds
    pub x_origin: f64,
    /// Data point associated with `x_origin`
    pub x_reference: f64,
    /// Volts per code
    pub y_increment: f64,
    /// Voltage at `y_reference`
    pub y_origin: f64,
    /// Code associated with `y_origin`
    pub y_reference: f64,
}

impl WaveformPreamble {
    /// Parse the ten comma separated preamble fields.
    pub fn parse(response: &str) -> InstrumentResult<Self> {
        let fields: Vec<&str> = response.trim().split(',').map(str::trim).collect();
        if fields.len() < 10 {
            return Err(InstrumentError::parse("waveform preamble", response));
        }
        let int = |i: usize| -> InstrumentResult<i64> {
            // integers are sent in NR1 or NR3 depending on firmware
            parse_f64(fields[i]).map(|v| v as i64)
        };
        Ok(Self {
            format: int(0)? as i32,
            acquisition_type: int(1)? as i32,
            points: int(2)?.max(0) as u64,
            count: int(3)?.max(0) as u64,
            x_increment: parse_f64(fields[4])?,
            x_origin: parse_f64(fields[5])?,
            x_reference: parse_f64(fields[6])?,
            y_increment: parse_f64(fields[7])?,
            y_origin: parse_f64(fields[8])?,
            y_reference: parse_f64(fields[9])?,
        })
    }

    /// Time of sample `index` in seconds.
    pub fn time_at(&self, index: usize) -> f64 {
        (index as f64 - self.x_reference) * self.x_increment + self.x_origin
    }

    /// Voltage of a raw byte sample, `None` for holes (code 0).
    pub fn voltage_of(&self, raw: u8) -> Option<f64> {
        if raw == 0 {
            return None;
        }
        Some((f64::from(raw) - self.y_reference) * self.y_increment + self.y_origin)
    }
}

/// One converted waveform point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformSample {
    /// Seconds relative to the trigger
    pub time: f64,
    /// Volts, `None` where no data was acquired yet
    pub voltage: Option<f64>,
}

/// Convert raw BYTE samples into time/voltage pairs.
pub fn convert_samples(preamble: &WaveformPreamble, data: &[u8]) -> Vec<WaveformSample> {
    data.iter()
        .enumerate()
        .map(|(index, raw)| WaveformSample {
            time: preamble.time_at(index),
            voltage: preamble.voltage_of(*raw),
        })
        .collect()
}

/// Write `time(ms),voltage(V)` rows, leaving out holes.
#[cfg(feature = "storage_csv")]
pub fn write_waveform_csv<W: std::io::Write>(
    samples: &[WaveformSample],
    writer: W,
) -> InstrumentResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["time(ms)", "voltage(V)"])?;
    for sample in samples {
        if let Some(voltage) = sample.voltage {
            csv.write_record([(sample.time * 1000.0).to_string(), voltage.to_string()])?;
        }
    }
    csv.flush()?;
    Ok(())
}

/// Keysight 3000 X-series oscilloscope.
#[derive(Debug)]
pub struct Kst3000 {
    device: Device,
}

impl Kst3000 {
    /// Unconnected oscilloscope.
    pub fn new(config: DeviceConfig) -> Self {
        Self::from_device(Device::new(config))
    }

    /// Wrap an existing device.
    pub fn from_device(mut device: Device) -> Self {
        device.set_name(DEVICE_NAME);
        Self { device }
    }

    async fn exec(&mut self, args: ExecArgs) -> InstrumentResult<()> {
        self.device.exec("", &args).await
    }

    fn channel(channel: OscChannel) -> SubArg {
        SubArg::new("CHANnel").elem(channel)
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

    /// Horizontal position of the trigger in seconds.
    pub async fn set_time_delay(&mut self, seconds: f64) -> InstrumentResult<()> {
        self.exec(ExecArgs::new().arg("TIMebase:DELay", seconds, " "))
            .await
    }

    /// Show or hide `channel`.
    pub async fn set_channel_display(&mut self, channel: OscChannel, on: bool) -> InstrumentResult<()> {
        let target = Self::channel(channel).elem_with("DISPlay", ":", "");
        self.exec(ExecArgs::new().arg(target, u8::from(on), " ")).await
    }

    /// Channel transferred by `WAVeform:DATA?`.
    pub async fn set_waveform_source(&mut self, channel: OscChannel) -> InstrumentResult<()> {
        self.exec(ExecArgs::new().arg("WAVeform:SOURce", Self::channel(channel), " "))
            .await
    }

    /// Scaling information of the current waveform source.
    pub async fn waveform_preamble(&mut self) -> InstrumentResult<WaveformPreamble> {
        let response = self.device.query_str("WAVeform:PREamble?").await?;
        WaveformPreamble::parse(&response)
    }

    /// Number of points `WAVeform:DATA?` will return.
    pub async fn waveform_points(&mut self) -> InstrumentResult<u64> {
        let response = self.device.query_str("WAVeform:POINts?").await?;
        let points = parse_f64(&response)?;
        if points < 0.0 {
            return Err(InstrumentError::parse("waveform points", response));
        }
        Ok(points as u64)
    }

    /// Request `points` points per transfer.
    pub async fn set_waveform_points(&mut self, points: u64) -> InstrumentResult<()> {
        if points == 0 {
            return self.device.record(Err(InstrumentError::InvalidArguments(
                "waveform points must be positive".to_string(),
            )));
        }
        self.exec(ExecArgs::new().arg("WAVeform:POINts", points, " "))
            .await
    }

    /// Record that transfers read from.
    pub async fn set_waveform_points_mode(&mut self, mode: PointsMode) -> InstrumentResult<()> {
        self.exec(ExecArgs::new().arg("WAVeform:POINts:MODE", mode, " "))
            .await
    }

    /// Transfer encoding.
    pub async fn set_waveform_format(&mut self, format: WaveformFormat) -> InstrumentResult<()> {
        self.exec(ExecArgs::new().arg("WAVeform:FORMat", format, " "))
            .await
    }

    /// Raw samples of the current waveform source.
    pub async fn waveform_data(&mut self) -> InstrumentResult<Vec<u8>> {
        self.device.query_block_str("WAVeform:DATA?").await
    }

    /// Current waveform converted to time and voltage. Requires BYTE format.
    pub async fn real_data(&mut self) -> InstrumentResult<Vec<WaveformSample>> {
        let preamble = self.waveform_preamble().await?;
        if preamble.format != PREAMBLE_FORMAT_BYTE {
            return self.device.record(Err(InstrumentError::Unsupported(format!(
                "waveform conversion needs BYTE format, preamble reports format {}",
                preamble.format
            ))));
        }
        let data = self.waveform_data().await?;
        tracing::debug!(device = %self.device.name(), points = data.len(), "Waveform transferred");
        Ok(convert_samples(&preamble, &data))
    }

    /// Transfer the current waveform and store it as CSV at `path`.
    #[cfg(feature = "storage_csv")]
    pub async fn save_waveform_csv(&mut self, path: impl AsRef<std::path::Path>) -> InstrumentResult<usize> {
        let samples = self.real_data().await?;
        let file = std::fs::File::create(path.as_ref())?;
        write_waveform_csv(&samples, std::io::BufWriter::new(file))?;
        tracing::info!(path = %path.as_ref().display(), samples = samples.len(), "Waveform saved");
        Ok(samples.len())
    }

    /// Timebase mode, must be `Main` before digitizing.
    pub async fn set_display_mode(&mut self, mode: DisplayMode) -> InstrumentResult<()> {
        self.exec(ExecArgs::new().arg("TIMebase:MODE", mode, " "))
            .await
    }

    /// Acquire once, either all displayed channels or only `channel`.
    pub async fn digitize(&mut self, channel: Option<OscChannel>) -> InstrumentResult<()> {
        let mut args = ExecArgs::new().raw("DIGitize");
        if let Some(channel) = channel {
            args = args.arg("", Self::channel(channel), " ");
        }
        self.exec(args).await
    }

    /// Learn string describing the complete instrument setup.
    pub async fn system_setup(&mut self) -> InstrumentResult<Vec<u8>> {
        self.device.query_block_str("SYSTem:SETup?").await
    }
}

impl Instrument for Kst3000 {
    fn device(&self) -> &Device {
        &self.device
    }

    fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Oscilloscope
    }

    fn model(&self) -> Option<DeviceModel> {
        Some(DeviceModel::Kst3000)
    }
}

#[async_trait]
impl Oscilloscope for Kst3000 {
    async fn run(&mut self) -> InstrumentResult<()> {
        self.device.exec_str("RUN").await
    }

    async fn stop(&mut self) -> InstrumentResult<()> {
        self.device.exec_str("STOP").await
    }

    async fn single(&mut self) -> InstrumentResult<()> {
        self.device.exec_str("SINGLE").await
    }

    async fn auto_scale(&mut self) -> InstrumentResult<()> {
        self.device.exec_str("AUToscale").await
    }

    async fn set_time_range(&mut self, seconds: f64) -> InstrumentResult<()> {
        self.exec(ExecArgs::new().arg("TIMebase:RANGe", seconds, " "))
            .await
    }

    async fn set_channel_offset(&mut self, channel: OscChannel, offset: f64) -> InstrumentResult<()> {
        let target = Self::channel(channel).elem_with("OFFSet", ":", "");
        self.exec(ExecArgs::new().arg(target, offset, " ")).await
    }

    async fn set_channel_scale(&mut self, channel: OscChannel, scale: f64) -> InstrumentResult<()> {
        let target = Self::channel(channel).elem_with("SCALe", ":", "");
        self.exec(ExecArgs::new().arg(target, scale, " ")).await
    }

    async fn set_channel_range(
        &mut self,
        channel: OscChannel,
        range: f64,
        unit: VoltageUnit,
    ) -> InstrumentResult<()> {
        let target = Self::channel(channel).elem_with("RANGe", ":", "");
        let value = match unit {
            VoltageUnit::Volt => SubArg::new(range),
            VoltageUnit::MilliVolt => SubArg::new(range).elem(unit),
        };
        self.exec(ExecArgs::new().arg(target, value, " ")).await
    }

    async fn set_trigger_edge(&mut self, edge: TriggerEdge) -> InstrumentResult<()> {
        self.exec(ExecArgs::new().arg("TRIGger:SLOPe", edge, " "))
            .await
    }

    async fn set_trigger_source(&mut self, channel: OscChannel) -> InstrumentResult<()> {
        self.exec(ExecArgs::new().arg("TRIGger:SOURce", SubArg::new("CHAN").elem(channel), " "))
            .await
    }
}
