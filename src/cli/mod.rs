//! Interactive command line interface.
//!
//! A line based shell over a [`DeviceSession`]: connect to instruments, pick
//! one, send raw commands and read back responses. Output goes to any
//! [`std::io::Write`], which makes the shell scriptable and testable;
//! [`run_shell`] wires it to stdin/stdout and Ctrl-C.
//!
//! ```text
//! $ connect 192.168.1.20
//!     Connect to device IP: 192.168.1.20:5025 ID (0)
//!     Device identified as Keithley Instruments Inc., Model 2636B, ...
//! $ custom_command 0 *IDN?
//!     Returns: Keithley Instruments Inc., Model 2636B, ...
//! ```

pub mod commands;
pub mod session;

pub use commands::BuiltinCommand;
pub use session::{DeviceSession, SessionEntry};

use crate::config::{AppConfig, ConnectionConfig, DeviceDescription, DiscoveryConfig};
use crate::device::{Device, DeviceConfig, Instrument};
use crate::devices::AnyInstrument;
use crate::discovery::{DeviceDiscovery, Ipv4Network};
use crate::error::{InstrumentError, InstrumentResult};
use commands::{parse_endpoint, parse_id, split_arguments, split_command};
use std::future::Future;
use std::io::{self, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Text printed when the shell starts.
pub const STARTUP_TEXT: &str =
    "Instrument control lib command line...\nType 'help' to get a list of available commands";

/// Prompt symbol.
pub const PROMPT: &str = "$ ";

/// Response to unknown commands.
pub const RESPONSE_INVALID_COMMAND: &str =
    "    Command not found. Type 'help' to get list of available commands.";

/// Text printed when the shell ends.
pub const MESSAGE_EXIT: &str = "Exit command line interface";

const HELP_NAME_WIDTH: usize = 22;

/// Handler of a user registered command: whitespace separated arguments and
/// the shell output.
pub type CustomHandler = Box<dyn Fn(&[String], &mut dyn Write) -> io::Result<()> + Send + Sync>;

struct CustomCommand {
    name: String,
    description: String,
    handler: CustomHandler,
}

/// Whether the shell keeps reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line
    Continue,
    /// Leave the shell
    Exit,
}

macro_rules! or_report {
    ($cli:ident, $result:expr) => {
        match $result {
            Ok(value) => value,
            Err(err) => return $cli.report_error(&err),
        }
    };
}

/// Shell state: open devices, registered commands and the output sink.
pub struct CommandLineInterface<W: Write> {
    session: DeviceSession,
    out: W,
    custom: Vec<CustomCommand>,
    supported_devices: Vec<DeviceDescription>,
    connection: ConnectionConfig,
    discovery: DiscoveryConfig,
}

impl<W: Write> CommandLineInterface<W> {
    /// Shell using `config` for connection defaults, writing to `out`.
    pub fn new(config: &AppConfig, out: W) -> Self {
        Self {
            session: DeviceSession::new(),
            out,
            custom: Vec::new(),
            supported_devices: config.supported_devices.clone(),
            connection: config.connection.clone(),
            discovery: config.discovery.clone(),
        }
    }

    /// Register an additional command shown in `help`.
    pub fn add_custom_command(
        &mut self,
        name: &str,
        description: &str,
        handler: CustomHandler,
    ) -> InstrumentResult<()> {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(InstrumentError::InvalidArguments(format!(
                "invalid command name '{name}'"
            )));
        }
        if BuiltinCommand::lookup(name).is_some() || self.custom.iter().any(|c| c.name == name) {
            return Err(InstrumentError::InvalidArguments(format!(
                "command '{name}' already exists"
            )));
        }
        self.custom.push(CustomCommand {
            name: name.to_string(),
            description: description.to_string(),
            handler,
        });
        Ok(())
    }

    /// Devices of this shell.
    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Devices of this shell, mutable.
    pub fn session_mut(&mut self) -> &mut DeviceSession {
        &mut self.session
    }

    /// Output sink.
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Consume the shell and return the output sink.
    pub fn into_output(self) -> W {
        self.out
    }

    /// Read and execute lines from `input` until `quit`, end of input or
    /// `shutdown` resolves. All open devices are closed before returning.
    pub async fn run<R, F>(&mut self, input: R, shutdown: F) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        writeln!(self.out, "{STARTUP_TEXT}")?;
        let mut lines = input.lines();
        tokio::pin!(shutdown);

        loop {
            write!(self.out, "{PROMPT}")?;
            self.out.flush()?;
            tokio::select! {
                _ = &mut shutdown => {
                    writeln!(self.out)?;
                    break;
                }
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if self.execute_line(&line).await? == Flow::Exit {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.close_all().await?;
        writeln!(self.out, "{MESSAGE_EXIT}")?;
        self.out.flush()
    }

    /// Execute one input line.
    pub async fn execute_line(&mut self, line: &str) -> io::Result<Flow> {
        let (word, args) = split_command(line);
        if word.is_empty() {
            return Ok(Flow::Continue);
        }
        tracing::debug!(command = word, args, "Shell command");

        if let Some(command) = BuiltinCommand::lookup(word) {
            return self.run_builtin(command, args).await;
        }
        if let Some(custom) = self.custom.iter().find(|c| c.name == word) {
            (custom.handler)(&split_arguments(args), &mut self.out)?;
            return Ok(Flow::Continue);
        }
        writeln!(self.out, "{RESPONSE_INVALID_COMMAND}")?;
        Ok(Flow::Continue)
    }

    async fn run_builtin(&mut self, command: BuiltinCommand, raw_args: &str) -> io::Result<Flow> {
        let args = split_arguments(raw_args);
        match command {
            BuiltinCommand::Help => self.help(),
            BuiltinCommand::SupportedDevices => self.supported_devices(),
            BuiltinCommand::Connect => self.connect(&args).await,
            BuiltinCommand::Disconnect => self.disconnect(&args).await,
            BuiltinCommand::CustomCommand => self.custom_command(raw_args).await,
            BuiltinCommand::ActiveDevices => self.active_devices(),
            BuiltinCommand::SelectDevice => self.select_device(&args),
            BuiltinCommand::GetDeviceIdentity => self.device_identity(&args).await,
            BuiltinCommand::Discover => self.discover(&args).await,
            BuiltinCommand::Quit => {
                self.close_all().await?;
                Ok(Flow::Exit)
            }
        }
    }

    fn report_error(&mut self, err: &InstrumentError) -> io::Result<Flow> {
        writeln!(self.out, "    Error: {err}")?;
        Ok(Flow::Continue)
    }

    fn help(&mut self) -> io::Result<Flow> {
        writeln!(self.out, "    Available commands:")?;
        let builtins = BuiltinCommand::ALL.iter().map(|c| (c.name(), c.description()));
        let custom = self.custom.iter().map(|c| (c.name.as_str(), c.description.as_str()));
        for (name, description) in builtins.chain(custom) {
            writeln!(
                self.out,
                "        {:<width$}{description}",
                format!("{name}:"),
                width = HELP_NAME_WIDTH
            )?;
        }
        writeln!(self.out)?;
        Ok(Flow::Continue)
    }

    fn supported_devices(&mut self) -> io::Result<Flow> {
        writeln!(self.out, "    List of supported devices")?;
        for device in &self.supported_devices {
            writeln!(self.out, "        {} - {}", device.name, device.description)?;
        }
        Ok(Flow::Continue)
    }

    async fn connect(&mut self, args: &[String]) -> io::Result<Flow> {
        let Some(endpoint) = args.first() else {
            writeln!(self.out, "    Error the argument <ip> must be specified")?;
            return Ok(Flow::Continue);
        };
        let (host, port) = or_report!(self, parse_endpoint(endpoint, self.connection.port));
        let address = format!("{host}:{port}");

        let config = DeviceConfig::new(host)
            .with_port(port)
            .with_timeout(self.connection.timeout());
        let mut device = Device::new(config);
        or_report!(self, device.connect().await);

        let (instrument, identity) = AnyInstrument::identify(device).await;
        let identity = identity.unwrap_or_else(|err| {
            tracing::warn!(%address, error = %err, "Device did not identify");
            "Unknown device".to_string()
        });
        let id = self.session.add(instrument, identity.clone(), address.clone());
        writeln!(self.out, "    Connect to device IP: {address} ID ({id})")?;
        writeln!(self.out, "    Device identified as {identity}")?;
        Ok(Flow::Continue)
    }

    async fn disconnect(&mut self, args: &[String]) -> io::Result<Flow> {
        let Some(target) = args.first() else {
            writeln!(self.out, "    Please specify an ID or 'all' to disconnect all devices")?;
            return Ok(Flow::Continue);
        };
        if target == "all" {
            return self.close_all().await.map(|()| Flow::Continue);
        }
        let id = or_report!(self, parse_id(target));
        or_report!(self, self.session.disconnect(id).await);
        writeln!(self.out, "    Device {id} closed successfully")?;
        Ok(Flow::Continue)
    }

    async fn close_all(&mut self) -> io::Result<()> {
        for (id, outcome) in self.session.disconnect_all().await {
            match outcome {
                Ok(()) => writeln!(self.out, "    Device {id} closed successfully")?,
                Err(err) => writeln!(self.out, "    Error closing device {id}: {err}")?,
            }
        }
        Ok(())
    }

    async fn custom_command(&mut self, raw_args: &str) -> io::Result<Flow> {
        let (first, rest) = split_command(raw_args);
        let (id, command) = match parse_id(first) {
            _ if first.is_empty() => {
                writeln!(self.out, "    Please specify a command")?;
                return Ok(Flow::Continue);
            }
            Ok(id) if !rest.is_empty() => (Some(id), rest),
            _ => (None, raw_args.trim()),
        };
        let id = or_report!(self, self.session.resolve(id));
        let device = or_report!(self, self.session.get_mut(id)).instrument.device_mut();

        if command.ends_with('?') {
            let response = or_report!(self, device.query_str(command).await);
            writeln!(self.out, "    Returns: {response}")?;
        } else {
            or_report!(self, device.exec_str(command).await);
            writeln!(self.out, "    Command executed")?;
        }
        Ok(Flow::Continue)
    }

    fn active_devices(&mut self) -> io::Result<Flow> {
        writeln!(self.out, "    List active devices:")?;
        let selected = self.session.selected();
        for (id, entry) in self.session.iter() {
            writeln!(
                self.out,
                "        ID: {id} {} IP: {} {}{}",
                entry.identity,
                entry.address,
                if entry.is_open() { "Connected" } else { "Disconnected" },
                if selected == Some(id) { " (selected)" } else { "" },
            )?;
        }
        Ok(Flow::Continue)
    }

    fn select_device(&mut self, args: &[String]) -> io::Result<Flow> {
        let Some(arg) = args.first() else {
            writeln!(self.out, "    Error a device number must be selected")?;
            return Ok(Flow::Continue);
        };
        let id = or_report!(self, parse_id(arg));
        or_report!(self, self.session.select(id));
        writeln!(self.out, "    Device with ID {id} selected")?;
        Ok(Flow::Continue)
    }

    async fn device_identity(&mut self, args: &[String]) -> io::Result<Flow> {
        let id = match args.first() {
            Some(arg) => Some(or_report!(self, parse_id(arg))),
            None => None,
        };
        let id = or_report!(self, self.session.resolve(id));
        let entry = or_report!(self, self.session.get_mut(id));
        let identity = or_report!(self, entry.instrument.device_mut().identify().await);
        entry.identity = identity.clone();
        writeln!(self.out, "    Device identity: {identity}")?;
        Ok(Flow::Continue)
    }

    async fn discover(&mut self, args: &[String]) -> io::Result<Flow> {
        let Some(arg) = args.first() else {
            writeln!(self.out, "    Error a network such as 192.168.1.0/24 must be specified")?;
            return Ok(Flow::Continue);
        };
        let network: Ipv4Network = or_report!(self, arg.parse());
        let port = match args.get(1) {
            Some(port) => or_report!(
                self,
                port.parse::<u16>()
                    .map_err(|_| InstrumentError::InvalidArguments(format!("invalid port '{port}'")))
            ),
            None => self.connection.port,
        };

        writeln!(self.out, "    Searching {network} on port {port}...")?;
        let found = DeviceDiscovery::new(network)
            .with_port(port)
            .with_probe_timeout(self.discovery.probe_timeout())
            .with_max_concurrency(self.discovery.max_concurrency)
            .discover()
            .await;
        writeln!(self.out, "    Found {} device(s)", found.len())?;
        for device in found {
            writeln!(self.out, "        {device}")?;
        }
        Ok(Flow::Continue)
    }
}

/// Run the shell on stdin/stdout until `quit`, end of input or Ctrl-C.
pub async fn run_shell(config: &AppConfig) -> io::Result<()> {
    let mut cli = CommandLineInterface::new(config, io::stdout());
    let input = BufReader::new(tokio::io::stdin());
    cli.run(input, async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{into_instrument, DeviceModel};
    use crate::transport::MockTransport;

    fn noop() -> CustomHandler {
        Box::new(|_: &[String], _: &mut dyn Write| Ok(()))
    }

    fn shell() -> CommandLineInterface<Vec<u8>> {
        CommandLineInterface::new(&AppConfig::default(), Vec::new())
    }

    fn output(cli: &CommandLineInterface<Vec<u8>>) -> String {
        String::from_utf8_lossy(cli.output()).into_owned()
    }

    fn add_mock(cli: &mut CommandLineInterface<Vec<u8>>, model: Option<DeviceModel>) -> MockTransport {
        let mock = MockTransport::new();
        let device = Device::with_transport(DeviceConfig::new("10.0.0.9"), mock.clone());
        cli.session_mut()
            .add(into_instrument(device, model), "ACME,X1".to_string(), "10.0.0.9:5025".to_string());
        mock
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let mut cli = shell();
        assert_eq!(cli.execute_line("frobnicate").await.unwrap(), Flow::Continue);
        assert_eq!(cli.execute_line("   ").await.unwrap(), Flow::Continue);
        assert_eq!(output(&cli), format!("{RESPONSE_INVALID_COMMAND}\n"));
    }

    #[tokio::test]
    async fn test_help_lists_builtin_and_custom_commands() {
        let mut cli = shell();
        cli.add_custom_command("sweep", "run a sweep", noop()).unwrap();
        cli.execute_line("help").await.unwrap();
        let text = output(&cli);
        assert!(text.starts_with("    Available commands:\n"));
        for command in BuiltinCommand::ALL {
            assert!(text.contains(&format!("{}:", command.name())), "{}", command.name());
        }
        assert!(text.contains("sweep:"));
        assert!(text.contains("run a sweep"));
    }

    #[tokio::test]
    async fn test_custom_command_handler() {
        let mut cli = shell();
        cli.add_custom_command(
            "echo",
            "print arguments",
            Box::new(|args: &[String], out: &mut dyn Write| writeln!(out, "{}", args.join("|"))),
        )
        .unwrap();
        assert!(cli.add_custom_command("help", "", noop()).is_err());
        assert!(cli.add_custom_command("echo", "", noop()).is_err());
        assert!(cli.add_custom_command("two words", "", noop()).is_err());

        cli.execute_line("echo a  b c").await.unwrap();
        assert_eq!(output(&cli), "a|b|c\n");
    }

    #[tokio::test]
    async fn test_supported_devices_from_config() {
        let mut cli = shell();
        cli.execute_line("supported_devices").await.unwrap();
        let text = output(&cli);
        assert!(text.contains("kei2600 - Keithley SMU 2600B"));
        assert!(text.contains("spd1305 - DC Power Supply"));
    }

    #[tokio::test]
    async fn test_custom_command_with_id_and_selection() {
        let mut cli = shell();
        let mock = add_mock(&mut cli, None);
        mock.reply_to("*IDN?", "ACME,X1,42,1.0");

        cli.execute_line("custom_command 0 *IDN?").await.unwrap();
        cli.execute_line("custom_command *RST").await.unwrap();
        cli.execute_line("select_device 0").await.unwrap();
        cli.execute_line("custom_command OUTP ON").await.unwrap();

        let text = output(&cli);
        assert!(text.contains("    Returns: ACME,X1,42,1.0"));
        assert!(text.contains("no device ID given and no device selected"));
        assert!(text.contains("    Device with ID 0 selected"));
        assert!(text.contains("    Command executed"));
        assert_eq!(mock.written(), vec!["*IDN?", "OUTP ON"]);
    }

    #[tokio::test]
    async fn test_custom_command_keeps_spacing() {
        let mut cli = shell();
        let mock = add_mock(&mut cli, None);
        cli.execute_line("custom_command 0 display.settext(\"a  b\")").await.unwrap();
        cli.execute_line("select_device 0").await.unwrap();
        cli.execute_line("custom_command   print(\"x   y\")  ").await.unwrap();
        cli.execute_line("custom_command").await.unwrap();
        assert_eq!(
            mock.written(),
            vec!["display.settext(\"a  b\")", "print(\"x   y\")"]
        );
        assert!(output(&cli).contains("    Please specify a command"));
    }

    #[tokio::test]
    async fn test_select_unknown_device() {
        let mut cli = shell();
        cli.execute_line("select_device 3").await.unwrap();
        cli.execute_line("select_device").await.unwrap();
        cli.execute_line("disconnect x").await.unwrap();
        let text = output(&cli);
        assert!(text.contains("ID 3 not found"));
        assert!(text.contains("Error a device number must be selected"));
        assert!(text.contains("'x' is not a device ID"));
    }

    #[tokio::test]
    async fn test_active_devices_and_identity() {
        let mut cli = shell();
        let mock = add_mock(&mut cli, Some(DeviceModel::Spd1305));
        mock.push_response("Siglent Technologies,SPD1305X,SPD13X,1.01");
        cli.execute_line("select_device 0").await.unwrap();
        cli.execute_line("get_device_identity").await.unwrap();
        cli.execute_line("active_devices").await.unwrap();
        let text = output(&cli);
        assert!(text.contains("    Device identity: Siglent Technologies,SPD1305X,SPD13X,1.01"));
        assert!(text.contains(
            "        ID: 0 Siglent Technologies,SPD1305X,SPD13X,1.01 IP: 10.0.0.9:5025 Connected (selected)"
        ));
    }

    #[tokio::test]
    async fn test_disconnect_and_quit() {
        let mut cli = shell();
        let first = add_mock(&mut cli, None);
        let second = add_mock(&mut cli, None);
        cli.execute_line("disconnect 0").await.unwrap();
        cli.execute_line("disconnect 0").await.unwrap();
        assert!(first.is_closed());

        assert_eq!(cli.execute_line("quit").await.unwrap(), Flow::Exit);
        assert!(second.is_closed());
        let text = output(&cli);
        assert!(text.contains("    Device 0 closed successfully"));
        assert!(text.contains("    Error: Interface is closed"));
        assert!(text.contains("    Device 1 closed successfully"));
    }

    #[tokio::test]
    async fn test_connect_argument_errors() {
        let mut cli = shell();
        cli.execute_line("connect").await.unwrap();
        cli.execute_line("connect 10.0.0.1:http").await.unwrap();
        cli.execute_line("discover").await.unwrap();
        cli.execute_line("discover 10.0.0.0/40").await.unwrap();
        let text = output(&cli);
        assert!(text.contains("Error the argument <ip> must be specified"));
        assert!(text.contains("invalid port in '10.0.0.1:http'"));
        assert!(text.contains("Error a network such as"));
        assert!(text.contains("prefix length 40 exceeds 32"));
        assert!(cli.session().is_empty());
    }

    #[tokio::test]
    async fn test_run_until_quit() {
        let mut cli = shell();
        let mock = add_mock(&mut cli, None);
        let input: &[u8] = b"help\nquit\nhelp\n";
        cli.run(input, std::future::pending()).await.unwrap();
        let text = output(&cli);
        assert!(text.starts_with(STARTUP_TEXT));
        assert_eq!(text.matches("Available commands").count(), 1);
        assert!(text.ends_with(&format!("{MESSAGE_EXIT}\n")));
        assert!(mock.is_closed());
    }

    #[tokio::test]
    async fn test_run_until_end_of_input() {
        let mut cli = shell();
        let mock = add_mock(&mut cli, None);
        let input: &[u8] = b"active_devices\n";
        cli.run(input, std::future::pending()).await.unwrap();
        assert!(mock.is_closed());
        assert_eq!(output(&cli).matches(PROMPT).count(), 2);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let mut cli = shell();
        let (_writer, reader) = tokio::io::duplex(64);
        cli.run(BufReader::new(reader), async {}).await.unwrap();
        assert!(output(&cli).ends_with(&format!("{MESSAGE_EXIT}\n")));
    }
}
