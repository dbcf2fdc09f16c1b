use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
/// Crate-level error.
///
/// `Configuration`, `UnknownEntity`, `ReadOnly` and `Validation` are raised before any
/// transport I/O. `Transport` aborts a single poll cycle or write. `Decode` only concerns
/// one entity of an otherwise successful cycle.
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("entity `{0}` is not defined in the register table")]
    UnknownEntity(String),

    #[error("entity `{0}` is read-only")]
    ReadOnly(String),

    #[error("invalid value for `{key}`: {source}")]
    Validation {
        key: String,
        #[source]
        source: ValidationError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to decode `{key}`: {source}")]
    Decode {
        key: String,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Figment(#[from] figment::Error),
}

#[derive(Debug, Clone, PartialEq, Error)]
/// A write value that cannot be encoded for its entity.
pub enum ValidationError {
    #[error("{value} is outside of [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("scale factor must not be zero")]
    ZeroFactor,

    #[error("unknown option `{option}`, allowed: {allowed:?}")]
    UnknownOption {
        option: String,
        allowed: Vec<String>,
    },

    #[error("index {index} is not a valid option, allowed: {allowed:?}")]
    UnknownIndex { index: i64, allowed: Vec<i64> },

    #[error("expected {expected}, got {found}")]
    Malformed {
        expected: &'static str,
        found: String,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("modbus transport failure: {0}")]
    Modbus(#[from] tokio_modbus::Error),

    #[error("device answered with exception: {0}")]
    Exception(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the connection should be dropped and re-established on the next call.
    ///
    /// An exception response proves the device is reachable, so the connection is kept.
    pub fn is_connection_fault(&self) -> bool {
        !matches!(self, TransportError::Exception(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("buffer holds {len} values, cannot read {width} from offset {offset}")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },

    #[error("register class was not part of the bulk read")]
    MissingBuffer,

    #[error("buffer kind does not match the register class")]
    WrongBuffer,
}
