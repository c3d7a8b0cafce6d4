//! The thin per-transaction façade client code actually calls (spec.md
//! §6), built on top of `Transport`'s reassembling state machine.

use std::time::Duration;

use tracing::debug;

use crate::error::ModbusError;
use crate::frame::response;
use crate::frame::{request, FileSubRequest};
use crate::serial_port::SerialPort;
use crate::transport::{Transport, DEFAULT_TIMEOUT_MS};

/// `read_coils`/`read_discrete_inputs` result: booleans truncated to the
/// requested quantity, plus the raw response frame (spec.md §4.5, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBitsResult {
    pub values: Vec<bool>,
    pub raw: Vec<u8>,
}

/// `read_holding_registers`/`read_input_registers`/`read_write_registers`/
/// `read_fifo_queue` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadWordsResult {
    pub values: Vec<u16>,
    pub raw: Vec<u8>,
}

/// `write_coil` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCoilResult {
    pub address: u16,
    pub state: bool,
    pub raw: Vec<u8>,
}

/// `write_register` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRegisterResult {
    pub address: u16,
    pub value: u16,
    pub raw: Vec<u8>,
}

/// `write_coils`/`write_registers` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultipleResult {
    pub address: u16,
    pub length: u16,
    pub raw: Vec<u8>,
}

/// `mask_write_register` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskWriteResult {
    pub address: u16,
    pub and_mask: u16,
    pub or_mask: u16,
    pub raw: Vec<u8>,
}

/// `read_file_record` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecordResult {
    pub values: Vec<u16>,
    pub raw: Vec<u8>,
}

/// `write_file_record` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFileRecordResult {
    pub file: u16,
    pub record: u16,
    pub length: u16,
    pub raw: Vec<u8>,
}

/// A single Modbus RTU client bound to one serial transport and a default
/// unit id, exposing one method per supported function code.
///
/// `unit_id` can be changed for the rest of the client's lifetime with
/// `set_unit_id` — most RTU lines only ever talk to one slave, so every
/// operation uses whatever `set_unit_id` last set (1, initially).
pub struct ModbusClient<P: SerialPort> {
    transport: Transport<P>,
    unit_id: u8,
}

impl<P: SerialPort> ModbusClient<P> {
    pub fn new(port: P) -> Self {
        Self::with_timeout(port, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    pub fn with_timeout(port: P, timeout: Duration) -> Self {
        Self {
            transport: Transport::new(port, timeout),
            unit_id: 1,
        }
    }

    /// spec.md §6 configuration surface: `get_unit_id`.
    pub fn get_unit_id(&self) -> u8 {
        self.unit_id
    }

    /// spec.md §6 configuration surface: `set_unit_id`.
    pub fn set_unit_id(&mut self, unit_id: u8) {
        self.unit_id = unit_id;
    }

    /// spec.md §6 configuration surface: `get_timeout_ms`.
    pub fn get_timeout_ms(&self) -> u64 {
        self.transport.timeout().as_millis() as u64
    }

    /// spec.md §6 configuration surface: `set_timeout_ms`.
    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.transport.set_timeout(Duration::from_millis(timeout_ms));
    }

    /// Drops the underlying serial connection. After this call the client
    /// must not be used again; there is no reconnection logic at this
    /// layer (spec.md §1 — reconnection policy is an external collaborator).
    pub fn close(self) {}

    pub async fn read_coils(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<ReadBitsResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, address, quantity, "read_coils");
        let req = request::build_read_coils(unit_id, address, quantity)?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_read_coils(&reply, quantity)?;
        Ok(ReadBitsResult {
            values: parsed.values,
            raw: reply,
        })
    }

    pub async fn read_discrete_inputs(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<ReadBitsResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, address, quantity, "read_discrete_inputs");
        let req = request::build_read_discrete_inputs(unit_id, address, quantity)?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_read_discrete_inputs(&reply, quantity)?;
        Ok(ReadBitsResult {
            values: parsed.values,
            raw: reply,
        })
    }

    pub async fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<ReadWordsResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, address, quantity, "read_holding_registers");
        let req = request::build_read_holding_registers(unit_id, address, quantity)?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_read_holding_registers(&reply)?;
        Ok(ReadWordsResult {
            values: parsed.values,
            raw: reply,
        })
    }

    pub async fn read_input_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<ReadWordsResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, address, quantity, "read_input_registers");
        let req = request::build_read_input_registers(unit_id, address, quantity)?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_read_input_registers(&reply)?;
        Ok(ReadWordsResult {
            values: parsed.values,
            raw: reply,
        })
    }

    pub async fn write_coil(
        &mut self,
        address: u16,
        state: bool,
    ) -> Result<WriteCoilResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, address, state, "write_coil");
        let req = request::build_write_single_coil(unit_id, address, state)?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_write_single_coil(&reply)?;
        Ok(WriteCoilResult {
            address: parsed.address,
            state: parsed.state,
            raw: reply,
        })
    }

    pub async fn write_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<WriteRegisterResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, address, "write_register");
        let req = request::build_write_single_register(unit_id, address, value)?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_write_single_register(&reply)?;
        Ok(WriteRegisterResult {
            address: parsed.address,
            value: parsed.value,
            raw: reply,
        })
    }

    pub async fn write_coils(
        &mut self,
        address: u16,
        states: &[bool],
    ) -> Result<WriteMultipleResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, address, count = states.len(), "write_coils");
        let req = request::build_write_multiple_coils(unit_id, address, states)?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_write_multiple_coils(&reply)?;
        Ok(WriteMultipleResult {
            address: parsed.address,
            length: parsed.length,
            raw: reply,
        })
    }

    pub async fn write_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<WriteMultipleResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, address, count = values.len(), "write_registers");
        let req = request::build_write_multiple_registers(unit_id, address, values)?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_write_multiple_registers(&reply)?;
        Ok(WriteMultipleResult {
            address: parsed.address,
            length: parsed.length,
            raw: reply,
        })
    }

    pub async fn mask_write_register(
        &mut self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<MaskWriteResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, address, "mask_write_register");
        let req = request::build_mask_write_register(unit_id, address, and_mask, or_mask)?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_mask_write_register(&reply)?;
        Ok(MaskWriteResult {
            address: parsed.address,
            and_mask: parsed.and_mask,
            or_mask: parsed.or_mask,
            raw: reply,
        })
    }

    pub async fn read_write_registers(
        &mut self,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        write_values: &[u16],
    ) -> Result<ReadWordsResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, read_address, write_address, "read_write_registers");
        let req = request::build_read_write_multiple_registers(
            unit_id,
            read_address,
            read_quantity,
            write_address,
            write_values,
        )?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_read_write_multiple_registers(&reply)?;
        Ok(ReadWordsResult {
            values: parsed.values,
            raw: reply,
        })
    }

    /// Reads a single file record sub-reference (spec.md §6: `file, record,
    /// length -> words, raw`). The wire PDU can batch several
    /// sub-references in one request (`frame::request::build_read_file_record`
    /// exposes that); this convenience wraps exactly one, matching the
    /// client API surface table.
    pub async fn read_file_record(
        &mut self,
        file: u16,
        record: u16,
        length: u16,
    ) -> Result<FileRecordResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, file, record, length, "read_file_record");
        let sub = FileSubRequest::for_read(file, record, length);
        let req = request::build_read_file_record(unit_id, &[sub])?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_read_file_record(&reply)?;
        let values = parsed
            .sub_responses
            .into_iter()
            .next()
            .ok_or_else(|| ModbusError::malformed("file record reply carried no sub-response"))?;
        Ok(FileRecordResult { values, raw: reply })
    }

    /// Writes a single file record sub-reference (spec.md §6: `file, record,
    /// values -> { file, record, length, raw }`). The slave's echo is
    /// decoded and checked against what was sent rather than trusted
    /// blindly — a CRC-valid reply with a stale or corrupted sub-reference
    /// would otherwise be reported back using the caller's own arguments as
    /// if they had been confirmed.
    pub async fn write_file_record(
        &mut self,
        file: u16,
        record: u16,
        values: &[u16],
    ) -> Result<WriteFileRecordResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, file, record, count = values.len(), "write_file_record");
        let sub = FileSubRequest::for_write(file, record, values.to_vec());
        let req = request::build_write_file_record(unit_id, &[sub])?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_write_file_record(&reply, req.len())?;
        let echo = parsed.sub_responses.into_iter().next().ok_or_else(|| {
            ModbusError::malformed("write file record reply carried no sub-response")
        })?;
        if echo.file_number != file || echo.record_number != record || echo.values != values {
            return Err(ModbusError::malformed(format!(
                "write file record echo mismatch: sent file={} record={} values={:?}, got file={} record={} values={:?}",
                file, record, values, echo.file_number, echo.record_number, echo.values
            )));
        }
        Ok(WriteFileRecordResult {
            file: echo.file_number,
            record: echo.record_number,
            length: echo.values.len() as u16,
            raw: reply,
        })
    }

    pub async fn read_fifo_queue(&mut self, address: u16) -> Result<ReadWordsResult, ModbusError> {
        let unit_id = self.unit_id;
        debug!(unit_id, address, "read_fifo_queue");
        let req = request::build_read_fifo_queue(unit_id, address)?;
        let reply = self.transport.transact(&req).await?;
        let parsed = response::parse_read_fifo_queue(&reply)?;
        Ok(ReadWordsResult {
            values: parsed.values,
            raw: reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;
    use crate::serial_port::MockSerialPort;

    fn framed(mut body: Vec<u8>) -> Vec<u8> {
        let crc = crc16(&body);
        body.extend_from_slice(&crc.to_le_bytes());
        body
    }

    #[tokio::test]
    async fn read_holding_registers_round_trips_scenario_s6() {
        // S6 from spec.md §8.
        let mut port = MockSerialPort::new();
        port.push_chunk(framed(vec![0x01, 0x03, 0x04, 0x00, 0x00, 0x00, 0x01]));
        let mut client = ModbusClient::new(port);

        let result = client.read_holding_registers(0x0010, 2).await.unwrap();
        assert_eq!(result.values, vec![0x0000, 0x0001]);
        assert_eq!(result.raw.len(), 9);
    }

    #[tokio::test]
    async fn write_coil_echo_round_trips_scenario_s3() {
        // S3 from spec.md §8.
        let mut port = MockSerialPort::new();
        port.push_chunk(framed(vec![0x01, 0x05, 0x00, 0x02, 0xFF, 0x00]));
        let mut client = ModbusClient::new(port);

        let result = client.write_coil(0x0002, true).await.unwrap();
        assert_eq!(result.address, 0x0002);
        assert!(result.state);
        assert_eq!(result.raw, framed(vec![0x01, 0x05, 0x00, 0x02, 0xFF, 0x00]));
    }

    #[tokio::test]
    async fn exception_response_surfaces_through_the_facade() {
        // S5 from spec.md §8.
        let mut port = MockSerialPort::new();
        port.push_chunk(framed(vec![0x01, 0x03 | 0x80, 0x02]));
        let mut client = ModbusClient::new(port);

        let err = client.read_holding_registers(0x0010, 3).await.unwrap_err();
        assert!(matches!(err, ModbusError::Exception { code: 0x02, .. }));
    }

    #[tokio::test]
    async fn invalid_argument_never_touches_the_wire() {
        let port = MockSerialPort::new();
        let mut client = ModbusClient::new(port);

        let err = client.read_coils(0, 0).await.unwrap_err();
        assert!(matches!(err, ModbusError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn unit_id_override_is_used_on_the_wire() {
        let mut port = MockSerialPort::new();
        port.push_chunk(framed(vec![0x09, 0x05, 0x00, 0x02, 0xFF, 0x00]));
        let mut client = ModbusClient::new(port);
        client.set_unit_id(9);

        client.write_coil(0x0002, true).await.unwrap();
    }

    #[tokio::test]
    async fn read_file_record_unwraps_single_sub_response() {
        let mut port = MockSerialPort::new();
        // byte count(1)=6, sub-response: resp_len(1)=5 (reftype + 2 words),
        // reftype(1), 2 words.
        let reply = framed(vec![0x01, 0x14, 0x06, 0x05, 0x06, 0x00, 0x11, 0x00, 0x22]);
        port.push_chunk(reply);
        let mut client = ModbusClient::new(port);

        let result = client.read_file_record(4, 1, 2).await.unwrap();
        assert_eq!(result.values, vec![0x0011, 0x0022]);
    }

    #[tokio::test]
    async fn write_file_record_echoes_inputs() {
        // The reply to Write File Record is a verbatim echo of the request.
        let echo = request::build_write_file_record(
            1,
            &[FileSubRequest::for_write(4, 1, vec![0x0011, 0x0022])],
        )
        .unwrap();

        let mut port = MockSerialPort::new();
        port.push_chunk(echo);
        let mut client = ModbusClient::new(port);

        let result = client
            .write_file_record(4, 1, &[0x0011, 0x0022])
            .await
            .unwrap();
        assert_eq!(result.file, 4);
        assert_eq!(result.record, 1);
        assert_eq!(result.length, 2);
    }

    #[tokio::test]
    async fn write_file_record_rejects_echo_with_wrong_record_number() {
        // A CRC-valid, correctly-shaped echo for a *different* sub-reference
        // (stale reply, wrong record number) must not be reported back as
        // if the caller's own record number had been confirmed.
        let stale_echo = request::build_write_file_record(
            1,
            &[FileSubRequest::for_write(4, 9, vec![0x0011, 0x0022])],
        )
        .unwrap();

        let mut port = MockSerialPort::new();
        port.push_chunk(stale_echo);
        let mut client = ModbusClient::new(port);

        let err = client
            .write_file_record(4, 1, &[0x0011, 0x0022])
            .await
            .unwrap_err();
        assert!(matches!(err, ModbusError::Malformed(_)));
    }
}
