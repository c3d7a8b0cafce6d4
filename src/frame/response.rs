//! Pure parsers: `complete response frame -> decoded payload`, the inverse
//! of `frame::request`.

use crate::crc::crc16;
use crate::error::{ExceptionCode, ModbusError};

use super::{
    COIL_OFF, COIL_ON, FC_MASK_WRITE_REGISTER, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
    FC_READ_FIFO_QUEUE, FC_READ_FILE_RECORD, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_READ_WRITE_MULTIPLE_REGISTERS, FC_WRITE_FILE_RECORD, FC_WRITE_MULTIPLE_COILS,
    FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER, MIN_FRAME_LEN,
};

/// `read_coils`/`read_discrete_inputs` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitsResponse {
    pub values: Vec<bool>,
}

/// `read_holding_registers`/`read_input_registers`/`read_write_registers`
/// result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordsResponse {
    pub values: Vec<u16>,
}

/// `write_coil` echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCoilResponse {
    pub address: u16,
    pub state: bool,
}

/// `write_register` echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRegisterResponse {
    pub address: u16,
    pub value: u16,
}

/// `write_coils`/`write_registers` echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleResponse {
    pub address: u16,
    pub length: u16,
}

/// `mask_write_register` echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskWriteResponse {
    pub address: u16,
    pub and_mask: u16,
    pub or_mask: u16,
}

/// `read_file_record` result: one register vector per sub-response, in the
/// order the request listed its sub-references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecordReadResponse {
    pub sub_responses: Vec<Vec<u16>>,
}

/// `read_fifo_queue` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoResponse {
    pub values: Vec<u16>,
}

/// One decoded sub-reference out of a `write_file_record` echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecordWriteEcho {
    pub file_number: u16,
    pub record_number: u16,
    pub values: Vec<u16>,
}

/// `write_file_record` result: the sub-references the slave actually
/// echoed back, decoded the same way a request is built rather than
/// trusted verbatim from the caller's own arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecordWriteResponse {
    pub sub_responses: Vec<FileRecordWriteEcho>,
}

/// Unpacks LSB-first-packed bits, truncated to `quantity`.
fn unpack_bits(data: &[u8], quantity: u16) -> Vec<bool> {
    let mut bits = Vec::with_capacity(quantity as usize);
    for i in 0..quantity as usize {
        let byte = data[i / 8];
        bits.push(byte & (1 << (i % 8)) != 0);
    }
    bits
}

fn decode_words(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// The shared preamble every parser runs first (spec.md §4.3):
///
/// 1. minimum-length check,
/// 2. CRC-16 check over everything but the trailer,
/// 3. exception-response detection,
/// 4. function-code match (masked against the high bit).
///
/// Returns the PDU body — everything between the unit id/function code
/// header and the CRC trailer.
fn decode_header(frame: &[u8], expected_fc: u8, min_len: usize) -> Result<&[u8], ModbusError> {
    // An exception reply is always MIN_FRAME_LEN bytes, regardless of how
    // long a normal reply for `expected_fc` would need to be — the
    // FC-specific `min_len` must not be enforced until it's known the frame
    // isn't one, or every exception shorter than `min_len` would be
    // misreported as `Malformed` instead of surfacing the exception.
    if frame.len() < MIN_FRAME_LEN {
        return Err(ModbusError::malformed(format!(
            "frame too short: {} bytes, need at least {}",
            frame.len(),
            MIN_FRAME_LEN
        )));
    }

    let trailer_at = frame.len() - 2;
    let calculated = crc16(&frame[..trailer_at]);
    let received = u16::from_le_bytes([frame[trailer_at], frame[trailer_at + 1]]);
    if calculated != received {
        return Err(ModbusError::crc(calculated, received, frame));
    }

    let fc_byte = frame[1];
    if fc_byte & 0x80 != 0 {
        let code = frame[2];
        return Err(ExceptionCode::from_code(code).into_error());
    }

    if frame.len() < min_len {
        return Err(ModbusError::malformed(format!(
            "frame too short: {} bytes, need at least {}",
            frame.len(),
            min_len
        )));
    }

    if fc_byte != expected_fc {
        return Err(ModbusError::UnexpectedFunctionCode {
            expected: expected_fc,
            actual: fc_byte,
        });
    }

    Ok(&frame[2..trailer_at])
}

fn parse_bits(frame: &[u8], expected_fc: u8, quantity: u16) -> Result<BitsResponse, ModbusError> {
    let body = decode_header(frame, expected_fc, 5)?;
    let byte_count = *body
        .first()
        .ok_or_else(|| ModbusError::malformed("missing byte count"))?;
    let data = &body[1..];
    if data.len() != byte_count as usize {
        return Err(ModbusError::malformed(format!(
            "byte count {} does not match {} data bytes",
            byte_count,
            data.len()
        )));
    }
    let needed_bytes = ((quantity as usize) + 7) / 8;
    if data.len() < needed_bytes {
        return Err(ModbusError::malformed(
            "not enough data bytes for the requested quantity",
        ));
    }
    Ok(BitsResponse {
        values: unpack_bits(data, quantity),
    })
}

pub fn parse_read_coils(
    frame: &[u8],
    quantity: u16,
) -> Result<BitsResponse, ModbusError> {
    parse_bits(frame, FC_READ_COILS, quantity)
}

pub fn parse_read_discrete_inputs(
    frame: &[u8],
    quantity: u16,
) -> Result<BitsResponse, ModbusError> {
    parse_bits(frame, FC_READ_DISCRETE_INPUTS, quantity)
}

fn parse_words(frame: &[u8], expected_fc: u8) -> Result<WordsResponse, ModbusError> {
    let body = decode_header(frame, expected_fc, 5)?;
    let byte_count = *body
        .first()
        .ok_or_else(|| ModbusError::malformed("missing byte count"))?;
    let data = &body[1..];
    if data.len() != byte_count as usize || byte_count % 2 != 0 {
        return Err(ModbusError::malformed(format!(
            "byte count {} inconsistent with {} data bytes",
            byte_count,
            data.len()
        )));
    }
    Ok(WordsResponse {
        values: decode_words(data),
    })
}

pub fn parse_read_holding_registers(frame: &[u8]) -> Result<WordsResponse, ModbusError> {
    parse_words(frame, FC_READ_HOLDING_REGISTERS)
}

pub fn parse_read_input_registers(frame: &[u8]) -> Result<WordsResponse, ModbusError> {
    parse_words(frame, FC_READ_INPUT_REGISTERS)
}

pub fn parse_write_single_coil(frame: &[u8]) -> Result<WriteCoilResponse, ModbusError> {
    let body = decode_header(frame, FC_WRITE_SINGLE_COIL, 8)?;
    if body.len() != 4 {
        return Err(ModbusError::malformed("write single coil echo wrong size"));
    }
    let address = u16::from_be_bytes([body[0], body[1]]);
    let value = u16::from_be_bytes([body[2], body[3]]);
    let state = match value {
        COIL_ON => true,
        COIL_OFF => false,
        other => {
            return Err(ModbusError::malformed(format!(
                "write single coil echoed value 0x{:04X}, expected 0xFF00 or 0x0000",
                other
            )))
        }
    };
    Ok(WriteCoilResponse { address, state })
}

pub fn parse_write_single_register(frame: &[u8]) -> Result<WriteRegisterResponse, ModbusError> {
    let body = decode_header(frame, FC_WRITE_SINGLE_REGISTER, 8)?;
    if body.len() != 4 {
        return Err(ModbusError::malformed(
            "write single register echo wrong size",
        ));
    }
    Ok(WriteRegisterResponse {
        address: u16::from_be_bytes([body[0], body[1]]),
        value: u16::from_be_bytes([body[2], body[3]]),
    })
}

fn parse_write_multiple(
    frame: &[u8],
    expected_fc: u8,
) -> Result<WriteMultipleResponse, ModbusError> {
    let body = decode_header(frame, expected_fc, 8)?;
    if body.len() != 4 {
        return Err(ModbusError::malformed("write multiple echo wrong size"));
    }
    Ok(WriteMultipleResponse {
        address: u16::from_be_bytes([body[0], body[1]]),
        length: u16::from_be_bytes([body[2], body[3]]),
    })
}

pub fn parse_write_multiple_coils(frame: &[u8]) -> Result<WriteMultipleResponse, ModbusError> {
    parse_write_multiple(frame, FC_WRITE_MULTIPLE_COILS)
}

pub fn parse_write_multiple_registers(frame: &[u8]) -> Result<WriteMultipleResponse, ModbusError> {
    parse_write_multiple(frame, FC_WRITE_MULTIPLE_REGISTERS)
}

pub fn parse_mask_write_register(frame: &[u8]) -> Result<MaskWriteResponse, ModbusError> {
    let body = decode_header(frame, FC_MASK_WRITE_REGISTER, 10)?;
    if body.len() != 6 {
        return Err(ModbusError::malformed("mask write register echo wrong size"));
    }
    Ok(MaskWriteResponse {
        address: u16::from_be_bytes([body[0], body[1]]),
        and_mask: u16::from_be_bytes([body[2], body[3]]),
        or_mask: u16::from_be_bytes([body[4], body[5]]),
    })
}

pub fn parse_read_write_multiple_registers(frame: &[u8]) -> Result<WordsResponse, ModbusError> {
    parse_words(frame, FC_READ_WRITE_MULTIPLE_REGISTERS)
}

pub fn parse_read_file_record(frame: &[u8]) -> Result<FileRecordReadResponse, ModbusError> {
    let body = decode_header(frame, FC_READ_FILE_RECORD, 5)?;
    let byte_count = *body
        .first()
        .ok_or_else(|| ModbusError::malformed("missing byte count"))?;
    let mut data = &body[1..];
    if data.len() != byte_count as usize {
        return Err(ModbusError::malformed(
            "byte count does not match file record data length",
        ));
    }

    let mut sub_responses = Vec::new();
    while !data.is_empty() {
        let resp_len = *data
            .first()
            .ok_or_else(|| ModbusError::malformed("truncated file record sub-response"))?
            as usize;
        if data.len() < 1 + resp_len || resp_len < 1 {
            return Err(ModbusError::malformed(
                "file record sub-response length inconsistent",
            ));
        }
        // resp_len counts the reference-type byte plus the register data.
        let words = decode_words(&data[2..1 + resp_len]);
        sub_responses.push(words);
        data = &data[1 + resp_len..];
    }

    Ok(FileRecordReadResponse { sub_responses })
}

/// Write File Record replies are a verbatim echo of the request (§3), but
/// the echo is decoded field-by-field here rather than trusted blindly: a
/// CRC-valid reply with the right FC and length could still carry a stale
/// or corrupted sub-reference, and the caller needs to be able to tell.
pub fn parse_write_file_record(
    frame: &[u8],
    request_len: usize,
) -> Result<FileRecordWriteResponse, ModbusError> {
    let body = decode_header(frame, FC_WRITE_FILE_RECORD, request_len)?;
    let byte_count = *body
        .first()
        .ok_or_else(|| ModbusError::malformed("missing byte count"))?;
    let mut data = &body[1..];
    if data.len() != byte_count as usize {
        return Err(ModbusError::malformed(
            "byte count does not match file record data length",
        ));
    }

    let mut sub_responses = Vec::new();
    while !data.is_empty() {
        if data.len() < 7 {
            return Err(ModbusError::malformed(
                "truncated write file record sub-response",
            ));
        }
        let file_number = u16::from_be_bytes([data[1], data[2]]);
        let record_number = u16::from_be_bytes([data[3], data[4]]);
        let record_length = u16::from_be_bytes([data[5], data[6]]) as usize;
        let sub_len = 7 + record_length * 2;
        if data.len() < sub_len {
            return Err(ModbusError::malformed(
                "write file record sub-response length inconsistent",
            ));
        }
        sub_responses.push(FileRecordWriteEcho {
            file_number,
            record_number,
            values: decode_words(&data[7..sub_len]),
        });
        data = &data[sub_len..];
    }

    Ok(FileRecordWriteResponse { sub_responses })
}

pub fn parse_read_fifo_queue(frame: &[u8]) -> Result<FifoResponse, ModbusError> {
    let body = decode_header(frame, FC_READ_FIFO_QUEUE, 7)?;
    if body.len() < 4 {
        return Err(ModbusError::malformed("fifo queue reply too short"));
    }
    let byte_count = u16::from_be_bytes([body[0], body[1]]);
    let fifo_count = u16::from_be_bytes([body[2], body[3]]);
    let data = &body[4..];
    if data.len() as u16 != byte_count.saturating_sub(2) {
        return Err(ModbusError::malformed(
            "fifo byte count does not match data length",
        ));
    }
    let values = decode_words(data);
    if values.len() as u16 != fifo_count {
        return Err(ModbusError::malformed(
            "fifo count does not match decoded word count",
        ));
    }
    Ok(FifoResponse { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;

    fn framed(mut body: Vec<u8>) -> Vec<u8> {
        let crc = crc16(&body);
        body.extend_from_slice(&crc.to_le_bytes());
        body
    }

    #[test]
    fn exception_response_matches_scenario_s5() {
        // S5 from spec.md §8.
        let frame = framed(vec![0x01, FC_READ_HOLDING_REGISTERS | 0x80, 0x02]);
        let err = parse_read_holding_registers(&frame).unwrap_err();
        match err {
            ModbusError::Exception { code, message } => {
                assert_eq!(code, 0x02);
                assert_eq!(message, "Illegal Data Address");
            }
            other => panic!("expected Exception, got {:?}", other),
        }
    }

    #[test]
    fn exception_path_covers_every_documented_code() {
        for code in [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x08, 0x0A, 0x0B] {
            let frame = framed(vec![0x01, FC_READ_COILS | 0x80, code]);
            let err = parse_read_coils(&frame, 1).unwrap_err();
            match err {
                ModbusError::Exception { code: got, .. } => assert_eq!(got, code),
                other => panic!("expected Exception for code {:#x}, got {:?}", code, other),
            }
        }

        let frame = framed(vec![0x01, FC_READ_COILS | 0x80, 0x99]);
        match parse_read_coils(&frame, 1).unwrap_err() {
            ModbusError::Exception { code, message } => {
                assert_eq!(code, 0x99);
                assert_eq!(message, "Modbus exception 0x99");
            }
            other => panic!("expected Exception, got {:?}", other),
        }
    }

    #[test]
    fn exception_surfaces_for_function_codes_with_a_longer_normal_reply() {
        // spec.md §8 invariant 5 says "for any FC"; these parsers all have
        // min_len > MIN_FRAME_LEN (8 or 10), so a 5-byte exception frame
        // must still surface Exception rather than being rejected as
        // Malformed for being "too short".
        let write_single_coil = framed(vec![0x01, FC_WRITE_SINGLE_COIL | 0x80, 0x02]);
        assert!(matches!(
            parse_write_single_coil(&write_single_coil).unwrap_err(),
            ModbusError::Exception { code: 0x02, .. }
        ));

        let write_single_register = framed(vec![0x01, FC_WRITE_SINGLE_REGISTER | 0x80, 0x03]);
        assert!(matches!(
            parse_write_single_register(&write_single_register).unwrap_err(),
            ModbusError::Exception { code: 0x03, .. }
        ));

        let write_multiple_coils = framed(vec![0x01, FC_WRITE_MULTIPLE_COILS | 0x80, 0x04]);
        assert!(matches!(
            parse_write_multiple_coils(&write_multiple_coils).unwrap_err(),
            ModbusError::Exception { code: 0x04, .. }
        ));

        let write_multiple_registers =
            framed(vec![0x01, FC_WRITE_MULTIPLE_REGISTERS | 0x80, 0x01]);
        assert!(matches!(
            parse_write_multiple_registers(&write_multiple_registers).unwrap_err(),
            ModbusError::Exception { code: 0x01, .. }
        ));

        let mask_write = framed(vec![0x01, FC_MASK_WRITE_REGISTER | 0x80, 0x02]);
        assert!(matches!(
            parse_mask_write_register(&mask_write).unwrap_err(),
            ModbusError::Exception { code: 0x02, .. }
        ));

        let fifo = framed(vec![0x01, FC_READ_FIFO_QUEUE | 0x80, 0x04]);
        assert!(matches!(
            parse_read_fifo_queue(&fifo).unwrap_err(),
            ModbusError::Exception { code: 0x04, .. }
        ));

        // Write File Record's min_len is the caller's request length, which
        // can be arbitrarily larger than 5.
        let write_file_record = framed(vec![0x01, FC_WRITE_FILE_RECORD | 0x80, 0x02]);
        assert!(matches!(
            parse_write_file_record(&write_file_record, 23).unwrap_err(),
            ModbusError::Exception { code: 0x02, .. }
        ));
    }

    #[test]
    fn unrelated_function_code_is_unexpected_not_malformed() {
        let frame = framed(vec![
            0x01,
            FC_READ_HOLDING_REGISTERS,
            0x02,
            0x00,
            0x01,
            0x00,
        ]);
        let err = parse_write_single_register(&frame).unwrap_err();
        assert!(matches!(err, ModbusError::UnexpectedFunctionCode { .. }));
    }

    #[test]
    fn crc_mismatch_is_reported() {
        let mut frame = framed(vec![0x01, FC_READ_COILS, 0x01, 0xFF]);
        *frame.last_mut().unwrap() ^= 0xFF;
        let err = parse_read_coils(&frame, 8).unwrap_err();
        assert!(matches!(err, ModbusError::Crc { .. }));
    }

    #[test]
    fn read_coils_truncates_to_quantity() {
        // Mock device with holding registers [0..64] style scenario (S6 analog for bits).
        let frame = framed(vec![0x01, FC_READ_COILS, 0x01, 0b0000_0101]);
        let parsed = parse_read_coils(&frame, 3).unwrap();
        assert_eq!(parsed.values, vec![true, false, true]);
    }

    #[test]
    fn read_holding_registers_matches_scenario_s6() {
        // S6 from spec.md §8.
        let frame = framed(vec![
            0x01,
            FC_READ_HOLDING_REGISTERS,
            0x04,
            0x00,
            0x00,
            0x00,
            0x01,
        ]);
        let parsed = parse_read_holding_registers(&frame).unwrap();
        assert_eq!(parsed.values, vec![0x0000, 0x0001]);
    }

    #[test]
    fn write_single_coil_rejects_other_values() {
        let frame = framed(vec![0x01, FC_WRITE_SINGLE_COIL, 0x00, 0x02, 0x12, 0x34]);
        let err = parse_write_single_coil(&frame).unwrap_err();
        assert!(matches!(err, ModbusError::Malformed(_)));
    }

    #[test]
    fn write_single_coil_echo_round_trips() {
        let frame = framed(vec![0x01, FC_WRITE_SINGLE_COIL, 0x00, 0x02, 0xFF, 0x00]);
        let parsed = parse_write_single_coil(&frame).unwrap();
        assert_eq!(parsed.address, 0x0002);
        assert!(parsed.state);
    }

    #[test]
    fn fifo_queue_round_trips() {
        let frame = framed(vec![
            0x01,
            FC_READ_FIFO_QUEUE,
            0x00,
            0x06,
            0x00,
            0x02,
            0x00,
            0x11,
            0x00,
            0x22,
        ]);
        let parsed = parse_read_fifo_queue(&frame).unwrap();
        assert_eq!(parsed.values, vec![0x0011, 0x0022]);
    }
}
