//! Built-in shell commands and argument helpers.

use crate::error::{InstrumentError, InstrumentResult};

/// Commands every shell understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinCommand {
    /// Print the command overview
    Help,
    /// List the configured supported devices
    SupportedDevices,
    /// Connect to `<ip>[:<port>]`
    Connect,
    /// Disconnect `<id>` or `all`
    Disconnect,
    /// Send a raw command
    CustomCommand,
    /// List connected devices
    ActiveDevices,
    /// Choose the default device
    SelectDevice,
    /// Query `*IDN?`
    GetDeviceIdentity,
    /// Scan a network
    Discover,
    /// Leave the shell
    Quit,
}

impl BuiltinCommand {
    /// All commands in help order.
    pub const ALL: &'static [Self] = &[
        Self::Help,
        Self::SupportedDevices,
        Self::Connect,
        Self::Disconnect,
        Self::CustomCommand,
        Self::ActiveDevices,
        Self::SelectDevice,
        Self::GetDeviceIdentity,
        Self::Discover,
        Self::Quit,
    ];

    /// Word typed in the shell.
    pub fn name(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::SupportedDevices => "supported_devices",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::CustomCommand => "custom_command",
            Self::ActiveDevices => "active_devices",
            Self::SelectDevice => "select_device",
            Self::GetDeviceIdentity => "get_device_identity",
            Self::Discover => "discover",
            Self::Quit => "quit",
        }
    }

    /// Help text.
    pub fn description(self) -> &'static str {
        match self {
            Self::Help => "print list of commands",
            Self::SupportedDevices => "returns a list of supported devices",
            Self::Connect => "(connect <ip>[:<port>]) establish connection with a device",
            Self::Disconnect => {
                "(disconnect <id>|all) disconnects the device specified by id or all devices"
            }
            Self::CustomCommand => {
                "(custom_command [<id>] <command> <parameters>) send a raw command, \
                 commands ending in '?' print the response"
            }
            Self::ActiveDevices => "displays all active devices with their IDs",
            Self::SelectDevice => {
                "(select_device <id>) select the device all following actions are executed on"
            }
            Self::GetDeviceIdentity => "(get_device_identity [<id>]) return the identity of a device",
            Self::Discover => "(discover <ip>/<prefix>) search the network for instruments",
            Self::Quit => "closes the current session",
        }
    }

    /// Look up a command by the word typed.
    pub fn lookup(word: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == word)
    }
}

/// Split an input line into the command word and the rest.
pub fn split_command(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (line, ""),
    }
}

/// Whitespace separated arguments.
pub fn split_arguments(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

/// Parse `host` or `host:port`.
pub fn parse_endpoint(endpoint: &str, default_port: u16) -> InstrumentResult<(String, u16)> {
    let endpoint = endpoint.trim();
    let (host, port) = match endpoint.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                InstrumentError::InvalidArguments(format!("invalid port in '{endpoint}'"))
            })?;
            (host, port)
        }
        None => (endpoint, default_port),
    };
    if host.is_empty() {
        return Err(InstrumentError::InvalidArguments(
            "the argument <ip> must be specified".to_string(),
        ));
    }
    Ok((host.to_string(), port))
}

/// Parse a device ID argument.
pub fn parse_id(arg: &str) -> InstrumentResult<usize> {
    arg.parse()
        .map_err(|_| InstrumentError::InvalidArguments(format!("'{arg}' is not a device ID")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(BuiltinCommand::lookup("connect"), Some(BuiltinCommand::Connect));
        assert_eq!(BuiltinCommand::lookup("Connect"), None);
        assert_eq!(BuiltinCommand::lookup("exit"), None);
        assert_eq!(BuiltinCommand::ALL.len(), 10);
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("  connect 10.0.0.1:5025 "), ("connect", "10.0.0.1:5025"));
        assert_eq!(split_command("help"), ("help", ""));
        assert_eq!(split_command("custom_command  1 *IDN?"), ("custom_command", "1 *IDN?"));
        assert_eq!(split_command(""), ("", ""));
    }

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(parse_endpoint("10.0.0.1", 5025).unwrap(), ("10.0.0.1".to_string(), 5025));
        assert_eq!(parse_endpoint("10.0.0.1:5555", 5025).unwrap(), ("10.0.0.1".to_string(), 5555));
        assert!(parse_endpoint("10.0.0.1:http", 5025).is_err());
        assert!(parse_endpoint(":5025", 5025).is_err());
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("3").unwrap(), 3);
        assert!(parse_id("-1").is_err());
        assert!(parse_id("all").is_err());
    }
}
