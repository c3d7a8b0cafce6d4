//! The transport state machine (spec.md §4.4): reassembles responses that
//! may arrive split or concatenated, filters out stray frames by function
//! code and unit id, resynchronizes after a bad CRC, and enforces a single
//! per-transaction deadline covering both I/O and buffer scanning.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::buffer::ReceiveBuffer;
use crate::crc::crc16;
use crate::error::ModbusError;
use crate::frame::{classify_frame_len, FrameLen};
use crate::serial_port::SerialPort;

/// Default per-transaction deadline (spec.md §4.4).
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Owns the serial line and the receive buffer for exactly one Modbus RTU
/// line. `transact` takes `&mut self`, so the borrow checker enforces
/// spec.md §5's "one transaction in flight, no cross-transport sharing"
/// rule directly — no internal mutex is needed because this type has no
/// legitimate way to be called from two places at once.
pub struct Transport<P: SerialPort> {
    port: P,
    buffer: ReceiveBuffer,
    timeout: Duration,
}

impl<P: SerialPort> Transport<P> {
    pub fn new(port: P, timeout: Duration) -> Self {
        Self {
            port,
            buffer: ReceiveBuffer::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Writes `request` and returns the first well-formed response whose
    /// unit id and function code match. `request` must be a complete ADU as
    /// produced by `frame::request::build_*` — byte 0 is the unit id, byte
    /// 1 is the function code.
    pub async fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, ModbusError> {
        if request.len() < 2 {
            return Err(ModbusError::malformed("request shorter than a header"));
        }
        let expected_unit = request[0];
        let expected_fc = request[1];

        self.port.write_all(request)?;
        trace!(bytes = request.len(), "wrote request frame");

        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(frame) =
                self.try_take_matching_frame(request.len(), expected_unit, expected_fc)?
            {
                return Ok(frame);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ModbusError::Timeout {
                    elapsed: self.timeout,
                    limit: self.timeout,
                });
            }
            let remaining = deadline - now;

            let mut chunk = [0u8; 256];
            let read = tokio::time::timeout(remaining, async { self.port.read(&mut chunk) }).await;

            match read {
                Err(_elapsed) => {
                    return Err(ModbusError::Timeout {
                        elapsed: self.timeout,
                        limit: self.timeout,
                    })
                }
                Ok(Err(err)) => return Err(ModbusError::Io(err)),
                Ok(Ok(0)) => {
                    // Nothing available yet; give the line a brief moment
                    // before spinning on the deadline check again.
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ModbusError::Timeout {
                            elapsed: self.timeout,
                            limit: self.timeout,
                        });
                    }
                    let nap = (deadline - now).min(Duration::from_millis(1));
                    tokio::time::sleep(nap).await;
                }
                Ok(Ok(n)) => {
                    trace!(bytes = n, "read chunk");
                    self.buffer.extend(&chunk[..n]);
                }
            }
        }
    }

    /// Tries to extract exactly one matching frame from whatever is
    /// currently buffered, discarding stray/corrupt content along the way.
    /// Returns `Ok(None)` when the buffer doesn't (yet) hold a full
    /// candidate frame.
    fn try_take_matching_frame(
        &mut self,
        request_len: usize,
        expected_unit: u8,
        expected_fc: u8,
    ) -> Result<Option<Vec<u8>>, ModbusError> {
        loop {
            let remaining = self.buffer.remaining();
            let len = match classify_frame_len(remaining, request_len) {
                FrameLen::NeedMoreBytes => return Ok(None),
                FrameLen::Unrecognized => {
                    // byte 1 doesn't belong to any supported frame shape at
                    // this offset; it can never resolve into a valid frame
                    // here regardless of how much more data arrives, so
                    // treat it exactly like a CRC failure for resync
                    // purposes instead of waiting on I/O that won't help.
                    warn!("unrecognized function code byte, resynchronizing by one byte");
                    self.buffer.consume(1);
                    continue;
                }
                FrameLen::Known(len) => len,
            };
            if remaining.len() < len {
                return Ok(None);
            }

            let candidate = &remaining[..len];
            let trailer_at = len - 2;
            let calculated = crc16(&candidate[..trailer_at]);
            let received = u16::from_le_bytes([candidate[trailer_at], candidate[trailer_at + 1]]);

            if calculated != received {
                if remaining.len() > len {
                    warn!("CRC mismatch, resynchronizing by one byte");
                    self.buffer.consume(1);
                    continue;
                }
                warn!("CRC mismatch with no slack left to resynchronize");
                let frame = candidate.to_vec();
                self.buffer.consume(len);
                return Err(ModbusError::crc(calculated, received, &frame));
            }

            let unit_id = candidate[0];
            let masked_fc = candidate[1] & 0x7F;
            if unit_id != expected_unit || masked_fc != expected_fc {
                debug!(
                    unit_id,
                    masked_fc, expected_unit, expected_fc, "discarding non-matching frame"
                );
                self.buffer.consume(len);
                continue;
            }

            let frame = candidate.to_vec();
            self.buffer.consume(len);
            return Ok(Some(frame));
        }
    }
}
