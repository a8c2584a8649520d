//! Base device: connection handling, send modes and command execution.
//!
//! Every instrument driver wraps a [`Device`]. The device owns the transport,
//! formats commands and, in [`SendMode::Buffered`], collects commands into a
//! script instead of sending them so that a driver can upload and run the
//! whole sequence on the instrument at once.
//!
//! # Example
//! ```no_run
//! use instrument_control::device::{Device, DeviceConfig};
//!
//! # async fn demo() -> instrument_control::error::InstrumentResult<()> {
//! let mut device = Device::new(DeviceConfig::new("192.168.1.20"));
//! device.connect().await?;
//! println!("{}", device.identify().await?);
//! device.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use crate::command::ExecArgs;
use crate::devices::DeviceModel;
use crate::error::{InstrumentError, InstrumentResult};
use crate::transport::{TcpTransport, Transport, DEFAULT_PORT, DEFAULT_TIMEOUT_MS};
use std::fmt;
use std::time::Duration;

/// How commands leave the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Every command is written to the instrument immediately.
    #[default]
    Direct,
    /// Commands are appended to the buffered script.
    Buffered,
}

/// Broad instrument category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Source-measure unit
    Smu,
    /// Oscilloscope
    Oscilloscope,
    /// Function / waveform generator
    FunctionGenerator,
    /// DC power supply
    DcPowerSupply,
    /// Anything answering `*IDN?` without a dedicated driver
    Generic,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Smu => "SMU",
            Self::Oscilloscope => "Oscilloscope",
            Self::FunctionGenerator => "Function Generator",
            Self::DcPowerSupply => "DC Power Supply",
            Self::Generic => "Device",
        };
        f.write_str(name)
    }
}

/// Connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Connect and read timeout
    pub timeout: Duration,
    /// Initial send mode
    pub send_mode: SendMode,
}

impl DeviceConfig {
    /// Defaults: port 5025, 2 s timeout, direct mode.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            send_mode: SendMode::Direct,
        }
    }

    /// Set the TCP port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the initial send mode.
    #[must_use]
    pub fn with_send_mode(mut self, send_mode: SendMode) -> Self {
        self.send_mode = send_mode;
        self
    }
}

/// A networked instrument speaking a line based command language.
pub struct Device {
    name: String,
    config: DeviceConfig,
    transport: Option<Box<dyn Transport>>,
    send_mode: SendMode,
    script_preamble: Vec<String>,
    buffered_lines: Vec<String>,
    last_error: Option<String>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("open", &self.is_open())
            .field("send_mode", &self.send_mode)
            .field("buffered_lines", &self.buffered_lines.len())
            .finish()
    }
}

impl Device {
    /// Unconnected device.
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            name: config.host.clone(),
            send_mode: config.send_mode,
            config,
            transport: None,
            script_preamble: Vec::new(),
            buffered_lines: Vec::new(),
            last_error: None,
        }
    }

    /// Device already connected through `transport`.
    pub fn with_transport(config: DeviceConfig, transport: impl Transport + 'static) -> Self {
        let mut device = Self::new(config);
        device.transport = Some(Box::new(transport));
        device
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Change the display name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Connection parameters.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Host name or address.
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Connect and read timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Open the TCP connection, replacing an existing one.
    pub async fn connect(&mut self) -> InstrumentResult<()> {
        if let Some(mut old) = self.transport.take() {
            if old.is_open() {
                let _ = old.close().await;
            }
        }

        tracing::info!(device = %self.name, host = %self.config.host, port = self.config.port, "Connecting");
        let result =
            TcpTransport::connect(&self.config.host, self.config.port, self.config.timeout).await;
        let transport = self.record(result)?;
        self.transport = Some(Box::new(transport));
        tracing::info!(device = %self.name, "Connection established");
        Ok(())
    }

    /// Close the connection. Fails with `InterfaceClosed` when not open.
    pub async fn disconnect(&mut self) -> InstrumentResult<()> {
        let result = match self.transport.as_mut() {
            Some(transport) if transport.is_open() => transport.close().await,
            _ => Err(InstrumentError::InterfaceClosed),
        };
        self.record(result)?;
        self.transport = None;
        tracing::info!(device = %self.name, "Disconnected");
        Ok(())
    }

    /// Whether the connection is usable.
    pub fn is_open(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_open())
    }

    /// Whether commands are currently buffered.
    pub fn is_buffered(&self) -> bool {
        self.send_mode == SendMode::Buffered
    }

    /// Current send mode.
    pub fn send_mode(&self) -> SendMode {
        self.send_mode
    }

    /// Switch between direct and buffered sending. The buffer is kept.
    pub fn change_send_mode(&mut self, mode: SendMode) {
        if mode != self.send_mode {
            tracing::debug!(device = %self.name, ?mode, "Send mode changed");
        }
        self.send_mode = mode;
    }

    /// Query the identification string (`*IDN?`).
    pub async fn identify(&mut self) -> InstrumentResult<String> {
        let identity = self.query_str("*IDN?").await?;
        Ok(identity.trim().to_string())
    }

    /// Execute `command` followed by `args`.
    ///
    /// In buffered mode the line is appended to the script and nothing is sent.
    pub async fn exec(&mut self, command: &str, args: &ExecArgs) -> InstrumentResult<()> {
        let message = format!("{command}{args}");
        if self.is_buffered() {
            tracing::trace!(device = %self.name, line = %message, "Buffered");
            self.buffered_lines.push(message);
            return self.record(Ok(()));
        }
        let result = self.write(&message).await;
        self.record(result)
    }

    /// Execute a complete command line.
    pub async fn exec_str(&mut self, command: &str) -> InstrumentResult<()> {
        self.exec(command, &ExecArgs::new()).await
    }

    /// Execute `command` + `args` and read one response line.
    pub async fn query(&mut self, command: &str, args: &ExecArgs) -> InstrumentResult<String> {
        let message = format!("{command}{args}");
        let result = self.query_line(&message).await;
        self.record(result)
    }

    /// Send a complete query line and read one response line.
    pub async fn query_str(&mut self, command: &str) -> InstrumentResult<String> {
        self.query(command, &ExecArgs::new()).await
    }

    /// Send `command` + `args` and read a binary block response.
    pub async fn query_block(&mut self, command: &str, args: &ExecArgs) -> InstrumentResult<Vec<u8>> {
        let message = format!("{command}{args}");
        let result = async {
            self.reject_when_buffered(&message)?;
            self.write(&message).await?;
            self.transport()?.read_block().await
        }
        .await;
        self.record(result)
    }

    /// Send a complete query line and read a binary block response.
    pub async fn query_block_str(&mut self, command: &str) -> InstrumentResult<Vec<u8>> {
        self.query_block(command, &ExecArgs::new()).await
    }

    /// Execute each line of `commands`, stopping at the first failure.
    pub async fn exec_commands(&mut self, commands: &str) -> InstrumentResult<()> {
        for line in commands.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.exec_str(line).await?;
        }
        Ok(())
    }

    /// Wait `seconds`. Buffered: appends `delay(<seconds>)` to the script.
    pub async fn delay(&mut self, seconds: f64) -> InstrumentResult<()> {
        let duration = match Duration::try_from_secs_f64(seconds) {
            Ok(duration) => duration,
            Err(_) => {
                return self.record(Err(InstrumentError::InvalidArguments(format!(
                    "delay must be a non-negative number of seconds within range, got {seconds}"
                ))))
            }
        };
        if self.is_buffered() {
            self.buffered_lines.push(format!("delay({seconds})"));
        } else {
            tokio::time::sleep(duration).await;
        }
        self.record(Ok(()))
    }

    /// Buffered script as newline separated text.
    pub fn buffered_script(&self) -> String {
        self.buffered_lines.join("\n")
    }

    /// Buffered script lines.
    pub fn buffered_lines(&self) -> &[String] {
        &self.buffered_lines
    }

    /// Lines every fresh buffered script starts with. Resets the buffer.
    pub fn set_script_preamble(&mut self, lines: Vec<String>) {
        self.script_preamble = lines;
        self.clear_buffered_script();
    }

    /// Reset the buffered script to the preamble.
    pub fn clear_buffered_script(&mut self) {
        self.buffered_lines = self.script_preamble.clone();
    }

    /// Replace the buffered script, returning the previous lines.
    pub fn replace_buffered_lines(&mut self, lines: Vec<String>) -> Vec<String> {
        std::mem::replace(&mut self.buffered_lines, lines)
    }

    /// Text of the most recent failure, cleared by the next success.
    pub fn last_error_message(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Log and remember the outcome of an operation.
    pub(crate) fn record<T>(&mut self, result: InstrumentResult<T>) -> InstrumentResult<T> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(err) => {
                tracing::warn!(device = %self.name, error = %err, "Operation failed");
                self.last_error = Some(err.to_string());
            }
        }
        result
    }

    fn transport(&mut self) -> InstrumentResult<&mut Box<dyn Transport>> {
        match self.transport.as_mut() {
            Some(transport) if transport.is_open() => Ok(transport),
            _ => Err(InstrumentError::InterfaceClosed),
        }
    }

    fn reject_when_buffered(&self, command: &str) -> InstrumentResult<()> {
        if self.is_buffered() {
            return Err(InstrumentError::InvalidArguments(format!(
                "cannot query '{command}' while buffering"
            )));
        }
        Ok(())
    }

    async fn write(&mut self, message: &str) -> InstrumentResult<()> {
        tracing::debug!(device = %self.name, command = %message, "Exec");
        self.transport()?.write_line(message).await
    }

    async fn query_line(&mut self, message: &str) -> InstrumentResult<String> {
        self.reject_when_buffered(message)?;
        self.write(message).await?;
        let response = self.transport()?.read_line().await?;
        tracing::debug!(device = %self.name, %response, "Response");
        Ok(response)
    }
}

/// Access to the [`Device`] behind a driver.
pub trait Instrument: Send + Sync {
    /// Underlying device.
    fn device(&self) -> &Device;

    /// Underlying device, mutable.
    fn device_mut(&mut self) -> &mut Device;

    /// Instrument category.
    fn kind(&self) -> DeviceKind {
        DeviceKind::Generic
    }

    /// Driver model, `None` for generic devices.
    fn model(&self) -> Option<DeviceModel> {
        None
    }
}

impl Instrument for Device {
    fn device(&self) -> &Device {
        self
    }

    fn device_mut(&mut self) -> &mut Device {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn mock_device() -> (Device, MockTransport) {
        let mock = MockTransport::new();
        let device = Device::with_transport(DeviceConfig::new("10.0.0.7"), mock.clone());
        (device, mock)
    }

    #[test]
    fn test_config_defaults() {
        let config = DeviceConfig::new("10.0.0.7");
        assert_eq!(config.port, 5025);
        assert_eq!(config.timeout, Duration::from_millis(2000));
        assert_eq!(config.send_mode, SendMode::Direct);

        let device = Device::new(config.with_send_mode(SendMode::Buffered));
        assert!(device.is_buffered());
        assert!(!device.is_open());
        assert_eq!(device.name(), "10.0.0.7");
    }

    #[tokio::test]
    async fn test_exec_formats_command_and_args() {
        let (mut device, mock) = mock_device();
        let args = ExecArgs::new().arg("", 0.5, " ");
        device.exec("FREQuency", &args).await.unwrap();
        device.exec_str("RUN").await.unwrap();
        assert_eq!(mock.written(), vec!["FREQuency 0.5", "RUN"]);
    }

    #[tokio::test]
    async fn test_identify_trims() {
        let (mut device, mock) = mock_device();
        mock.push_response("Keithley Instruments Inc., Model 2602B, 1234, 3.2.2 ");
        assert_eq!(
            device.identify().await.unwrap(),
            "Keithley Instruments Inc., Model 2602B, 1234, 3.2.2"
        );
        assert_eq!(mock.last_written().as_deref(), Some("*IDN?"));
    }

    #[tokio::test]
    async fn test_closed_device_rejects_commands() {
        let mut device = Device::new(DeviceConfig::new("10.0.0.7"));
        let err = device.exec_str("RUN").await.unwrap_err();
        assert!(matches!(err, InstrumentError::InterfaceClosed));
        assert_eq!(device.last_error_message(), Some("Interface is closed"));
        assert!(matches!(
            device.disconnect().await,
            Err(InstrumentError::InterfaceClosed)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_twice() {
        let (mut device, mock) = mock_device();
        device.disconnect().await.unwrap();
        assert!(mock.is_closed());
        assert!(!device.is_open());
        assert!(device.disconnect().await.is_err());
    }

    #[tokio::test]
    async fn test_buffered_mode_collects_script() {
        let (mut device, mock) = mock_device();
        device.set_script_preamble(vec!["buf = smua.makebuffer(10)".to_string()]);
        device.change_send_mode(SendMode::Buffered);

        device.exec_str("smua.source.levelv = 1").await.unwrap();
        device.delay(0.5).await.unwrap();
        assert!(mock.written().is_empty());
        assert_eq!(
            device.buffered_script(),
            "buf = smua.makebuffer(10)\nsmua.source.levelv = 1\ndelay(0.5)"
        );

        assert!(device.query_str("print(x)").await.is_err());

        device.clear_buffered_script();
        assert_eq!(device.buffered_lines(), ["buf = smua.makebuffer(10)"]);
    }

    #[tokio::test]
    async fn test_exec_commands_stops_on_failure() {
        let (mut device, mock) = mock_device();
        device.exec_commands("RUN\n\n  STOP  \nSINGLE").await.unwrap();
        assert_eq!(mock.take_written(), vec!["RUN", "STOP", "SINGLE"]);

        device.disconnect().await.unwrap();
        assert!(device.exec_commands("RUN\nSTOP").await.is_err());
    }

    #[tokio::test]
    async fn test_delay_validation() {
        let (mut device, _mock) = mock_device();
        assert!(matches!(
            device.delay(-1.0).await,
            Err(InstrumentError::InvalidArguments(_))
        ));
        assert!(device.last_error_message().is_some());
        device.delay(0.0).await.unwrap();
        assert!(device.last_error_message().is_none());
    }

    #[tokio::test]
    async fn test_delay_out_of_range() {
        let (mut device, _mock) = mock_device();
        assert!(matches!(
            device.delay(1e20).await,
            Err(InstrumentError::InvalidArguments(_))
        ));
        assert!(device.delay(f64::INFINITY).await.is_err());
        assert!(device
            .last_error_message()
            .is_some_and(|m| m.contains("seconds")));
    }

    #[tokio::test]
    async fn test_buffered_delay_rejects_invalid_values() {
        let (mut device, _mock) = mock_device();
        device.change_send_mode(SendMode::Buffered);
        device.delay(0.25).await.unwrap();

        for seconds in [f64::NAN, -0.5] {
            assert!(matches!(
                device.delay(seconds).await,
                Err(InstrumentError::InvalidArguments(_))
            ));
        }
        assert_eq!(device.buffered_script(), "delay(0.25)");
    }

    #[tokio::test]
    async fn test_buffered_exec_clears_last_error() {
        let (mut device, _mock) = mock_device();
        assert!(device.delay(-1.0).await.is_err());
        assert!(device.last_error_message().is_some());

        device.change_send_mode(SendMode::Buffered);
        device.exec_str("smua.source.output = smua.OUTPUT_ON").await.unwrap();
        assert!(device.last_error_message().is_none());
    }

    #[tokio::test]
    async fn test_connect_replaces_open_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let old = MockTransport::new();
        let config = DeviceConfig::new("127.0.0.1")
            .with_port(port)
            .with_timeout(Duration::from_secs(1));
        let mut device = Device::with_transport(config, old.clone());
        device.connect().await.unwrap();

        assert!(old.is_closed());
        assert!(device.is_open());
        assert!(device.last_error_message().is_none());
    }

    #[tokio::test]
    async fn test_query_timeout_is_recorded() {
        let (mut device, _mock) = mock_device();
        let err = device.query_str("print(count)").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(device
            .last_error_message()
            .is_some_and(|m| m.contains("timeout")));
    }

    #[tokio::test]
    async fn test_query_block() {
        let (mut device, mock) = mock_device();
        mock.push_block(b"#14\x10\x20\x30\x40\n".to_vec());
        let data = device.query_block_str("WAVeform:DATA?").await.unwrap();
        assert_eq!(data, vec![0x10, 0x20, 0x30, 0x40]);

        mock.push_block(b"#12\x01\x02\n".to_vec());
        let args = ExecArgs::new().arg(" ", "CHANnel1", "");
        let data = device.query_block("WAVeform:DATA?", &args).await.unwrap();
        assert_eq!(data, vec![1, 2]);
        assert_eq!(mock.last_written().as_deref(), Some("WAVeform:DATA? CHANnel1"));

        device.change_send_mode(SendMode::Buffered);
        assert!(device.query_block_str("SYSTem:SETup?").await.is_err());
    }
}
