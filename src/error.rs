//! Error types for instrument control.
//!
//! `InstrumentError` is the single error type returned by the library. Using the
//! `thiserror` crate it maps every failure that can happen while talking to an
//! instrument onto one enum:
//!
//! - **`InvalidArguments`**: a value outside what the command accepts, or a
//!   combination of enum values the instrument has no command for.
//! - **`Timeout`** / **`InterfaceClosed`**: socket level failures.
//! - **`Io`**: any other operating system error (connect refused, reset, ...).
//! - **`ErrorQueueNotEmpty`**: the instrument reported entries in its error queue.
//! - **`Parse`**: the instrument answered, but not with what was asked for.
//! - **`Http`**: script upload failures, see [`crate::http`].
//!
//! By using `#[from]`, lower level errors convert with the `?` operator.

use crate::http::HttpError;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the instrument error type.
pub type InstrumentResult<T> = std::result::Result<T, InstrumentError>;

/// Errors raised by devices, transports and the command line interface.
#[derive(Error, Debug)]
pub enum InstrumentError {
    /// Argument rejected before anything was sent.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// No answer within the configured timeout.
    #[error("Socket timeout after {timeout:?} while {operation}")]
    Timeout {
        /// What was being waited for
        operation: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// The socket is not open, or the peer closed it.
    #[error("Interface is closed")]
    InterfaceClosed,

    /// Operating system level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The instrument holds entries in its error queue.
    #[error("Instrument error queue holds {0} item(s)")]
    ErrorQueueNotEmpty(u32),

    /// A response could not be interpreted.
    #[error("Failed to parse {what} from response '{response}'")]
    Parse {
        /// Expected content
        what: String,
        /// Raw response
        response: String,
    },

    /// Malformed binary block.
    #[error("Malformed binary block: {0}")]
    Block(String),

    /// Operation not available in the current state.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Configuration file could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Semantic configuration error found during validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// HTTP request or response failure.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// CSV export failure.
    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl InstrumentError {
    /// Build a parse error from the expected content and the raw response.
    pub fn parse(what: impl Into<String>, response: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            response: response.into(),
        }
    }

    /// Build a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// True for `Timeout`.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True when the connection is gone and the device must be reconnected.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::InterfaceClosed => true,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

impl From<figment::Error> for InstrumentError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
