//! The byte sink/source capability the transport state machine needs
//! (spec.md §6), plus the real `serialport`-backed implementation and an
//! in-memory mock for tests.

use std::io;
use std::time::Duration;

use crate::config::SerialConfig;
use crate::error::ModbusError;

/// "Write all of these bytes" / "yield the next available chunk, or
/// signal end-of-stream" — the transport's only dependency on the outside
/// world.
///
/// Reads are expected to return promptly with whatever is currently
/// available (`Ok(0)` for "nothing right now"), not to block indefinitely;
/// `Transport::transact` supplies its own deadline on top.
pub trait SerialPort: Send {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// A real serial line opened through the `serialport` crate.
pub struct RealSerialPort {
    inner: Box<dyn serialport::SerialPort>,
}

impl RealSerialPort {
    pub fn open(config: &SerialConfig) -> Result<Self, ModbusError> {
        let port = serialport::new(&config.device, config.baud_rate)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|err| ModbusError::Io(io::Error::new(io::ErrorKind::Other, err)))?;

        Ok(Self { inner: port })
    }
}

impl SerialPort for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.inner, buf)?;
        self.inner.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match io::Read::read(&mut self.inner, buf) {
            Ok(n) => Ok(n),
            // The underlying serial driver signals "nothing to read yet" as
            // a timeout on its own short internal read timeout; the
            // transport's deadline is the one that actually matters.
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(err) => Err(err),
        }
    }
}

/// An in-memory [`SerialPort`] for tests: reads are served from a queue of
/// pre-scripted chunks (so a test can control exactly how a frame is split
/// or concatenated across reads), and writes are captured for inspection.
#[derive(Default)]
pub struct MockSerialPort {
    pub written: Vec<u8>,
    read_queue: std::collections::VecDeque<Vec<u8>>,
}

impl MockSerialPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a chunk to be handed back by the next `read` call. An empty
    /// chunk models "nothing available yet".
    pub fn push_chunk(&mut self, chunk: impl Into<Vec<u8>>) -> &mut Self {
        self.read_queue.push_back(chunk.into());
        self
    }
}

impl SerialPort for MockSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(buf);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read_queue.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_serves_queued_chunks_in_order() {
        let mut port = MockSerialPort::new();
        port.push_chunk(vec![1, 2]).push_chunk(vec![3]);

        let mut buf = [0u8; 8];
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[1, 2]);
        assert_eq!(port.read(&mut buf).unwrap(), 1);
        assert_eq!(&buf[..1], &[3]);
        assert_eq!(port.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn mock_captures_writes() {
        let mut port = MockSerialPort::new();
        port.write_all(&[0xAA, 0xBB]).unwrap();
        assert_eq!(port.written, vec![0xAA, 0xBB]);
    }
}
