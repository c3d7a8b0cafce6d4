pub mod buffer;
pub mod client;
pub mod config;
pub mod crc;
pub mod error;
pub mod frame;
pub mod logging;
pub mod serial_port;
pub mod transport;

pub use client::{
    FileRecordResult, MaskWriteResult, ModbusClient, ReadBitsResult, ReadWordsResult,
    WriteCoilResult, WriteFileRecordResult, WriteMultipleResult, WriteRegisterResult,
};
pub use config::{DataBits, Parity, SerialConfig, StopBits};
pub use crc::crc16;
pub use error::{ExceptionCode, ModbusError};
pub use frame::request;
pub use frame::response;
pub use frame::FileSubRequest;
pub use serial_port::{RealSerialPort, SerialPort};
pub use transport::Transport;
