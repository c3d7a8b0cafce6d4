//! The error taxonomy raised by builders, parsers, the transport, and the
//! client façade.

use std::time::Duration;

use thiserror::Error;

/// A single tagged error type covering every failure mode the protocol
/// engine can raise.
#[derive(Error, Debug)]
pub enum ModbusError {
    /// A builder rejected its inputs (out-of-range quantity, address, value,
    /// or unit id).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying sink/source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The per-transaction deadline elapsed before a matching frame was
    /// assembled.
    #[error("transaction timed out after {elapsed:?} (limit {limit:?})")]
    Timeout { elapsed: Duration, limit: Duration },

    /// A candidate frame failed its CRC check and no further resync within
    /// the buffer was possible.
    #[error("CRC mismatch: calculated=0x{calculated:04X}, received=0x{received:04X}, frame={frame_hex}")]
    Crc {
        calculated: u16,
        received: u16,
        frame_hex: String,
    },

    /// The slave answered with `fc | 0x80` and an exception code.
    #[error("Modbus exception 0x{code:02X}: {message}")]
    Exception { code: u8, message: String },

    /// A CRC-valid frame carried a function code that neither matched the
    /// request nor was its exception variant. Only raised when a parser is
    /// invoked directly on arbitrary bytes — the transport filters these out
    /// before they reach a parser.
    #[error("unexpected function code: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedFunctionCode { expected: u8, actual: u8 },

    /// Lengths or internal byte counts are inconsistent.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl ModbusError {
    pub(crate) fn invalid_argument(details: impl Into<String>) -> Self {
        ModbusError::InvalidArgument(details.into())
    }

    pub(crate) fn malformed(details: impl Into<String>) -> Self {
        ModbusError::Malformed(details.into())
    }

    pub(crate) fn crc(calculated: u16, received: u16, frame: &[u8]) -> Self {
        ModbusError::Crc {
            calculated,
            received,
            frame_hex: hex::encode(frame),
        }
    }
}

/// The one-byte exception codes defined by MODBUS Application Protocol
/// V1.1b3 §7, plus the generic fallback for anything unlisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Acknowledge,
    SlaveDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetDeviceFailedToRespond,
    Unknown(u8),
}

impl ExceptionCode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::SlaveDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::SlaveDeviceBusy,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayTargetDeviceFailedToRespond,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::SlaveDeviceFailure => 0x04,
            Self::Acknowledge => 0x05,
            Self::SlaveDeviceBusy => 0x06,
            Self::MemoryParityError => 0x08,
            Self::GatewayPathUnavailable => 0x0A,
            Self::GatewayTargetDeviceFailedToRespond => 0x0B,
            Self::Unknown(code) => *code,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::IllegalFunction => "Illegal Function".to_string(),
            Self::IllegalDataAddress => "Illegal Data Address".to_string(),
            Self::IllegalDataValue => "Illegal Data Value".to_string(),
            Self::SlaveDeviceFailure => "Slave Device Failure".to_string(),
            Self::Acknowledge => "Acknowledge".to_string(),
            Self::SlaveDeviceBusy => "Slave Device Busy".to_string(),
            Self::MemoryParityError => "Memory Parity Error".to_string(),
            Self::GatewayPathUnavailable => "Gateway Path Unavailable".to_string(),
            Self::GatewayTargetDeviceFailedToRespond => {
                "Gateway Target Device Failed to Respond".to_string()
            }
            Self::Unknown(code) => format!("Modbus exception 0x{:02X}", code),
        }
    }

    /// Builds the typed error for an exception response carrying `code`.
    pub fn into_error(self) -> ModbusError {
        ModbusError::Exception {
            code: self.code(),
            message: self.message(),
        }
    }
}
