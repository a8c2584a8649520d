//! # Instrument Control Library
//!
//! Async drivers for networked laboratory instruments speaking SCPI or TSP
//! over raw TCP sockets, plus an interactive shell to poke at them.
//!
//! ## Crate Structure
//!
//! - **`command`**: `ExecArgs` / `SubArg` builders that assemble command strings.
//! - **`transport`**: the `Transport` trait, the TCP implementation and a mock
//!   for tests. Also IEEE 488.2 binary block parsing.
//! - **`http`**: request/response types and a reqwest-backed client, used to
//!   upload scripts to instruments with a web interface.
//! - **`device`**: the `Device` base every driver wraps. Owns the connection,
//!   switches between direct and buffered sending and records the last error.
//! - **`devices`**: capability traits (`Smu`, `Oscilloscope`,
//!   `FunctionGenerator`, `DcPowerSupply`) and the vendor drivers.
//! - **`discovery`**: concurrent `*IDN?` scan of an IPv4 network.
//! - **`cli`**: the interactive command line interface.
//! - **`config`**: Figment based configuration (TOML file + environment).
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`error`**: the crate wide `InstrumentError`.
//!
//! ## Example
//!
//! ```no_run
//! use instrument_control::device::{DeviceConfig, Instrument};
//! use instrument_control::devices::{types::{SmuChannel, Unit}, Kei2600, Smu};
//!
//! # async fn demo() -> instrument_control::error::InstrumentResult<()> {
//! let mut smu = Kei2600::new(DeviceConfig::new("192.168.1.20"));
//! smu.device_mut().connect().await?;
//! smu.set_level(Unit::Voltage, SmuChannel::A, 0.5).await?;
//! smu.turn_on(SmuChannel::A).await?;
//! let current = smu.measure(Unit::Current, SmuChannel::A).await?;
//! smu.turn_off(SmuChannel::A).await?;
//! # let _ = current;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod command;
pub mod config;
pub mod device;
pub mod devices;
pub mod discovery;
pub mod error;
pub mod http;
pub mod logging;
pub mod transport;

pub use device::{Device, DeviceConfig, DeviceKind, Instrument, SendMode};
pub use error::{InstrumentError, InstrumentResult};
