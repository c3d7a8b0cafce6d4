//! Pure builders: `(unit_id, request-specific args) -> complete ADU`.

use crate::crc::crc16;
use crate::error::ModbusError;

use super::{
    FileSubRequest, COIL_OFF, COIL_ON, FC_MASK_WRITE_REGISTER, FC_READ_COILS,
    FC_READ_DISCRETE_INPUTS, FC_READ_FIFO_QUEUE, FC_READ_FILE_RECORD, FC_READ_HOLDING_REGISTERS,
    FC_READ_INPUT_REGISTERS, FC_READ_WRITE_MULTIPLE_REGISTERS, FC_WRITE_FILE_RECORD,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, FILE_RECORD_REFERENCE_TYPE, MAX_FILE_RECORD_LEN, MAX_READ_BITS_QTY,
    MAX_READ_REGISTERS_QTY, MAX_RW_READ_QTY, MAX_RW_WRITE_QTY, MAX_WRITE_COILS_QTY,
    MAX_WRITE_REGISTERS_QTY,
};

fn validate_unit_id(unit_id: u8) -> Result<(), ModbusError> {
    if (1..=247).contains(&unit_id) {
        Ok(())
    } else {
        Err(ModbusError::invalid_argument(format!(
            "unit id {} out of range 1..=247",
            unit_id
        )))
    }
}

fn validate_qty(qty: u16, max: u16, what: &str) -> Result<(), ModbusError> {
    if (1..=max).contains(&qty) {
        Ok(())
    } else {
        Err(ModbusError::invalid_argument(format!(
            "{} quantity {} out of range 1..={}",
            what, qty, max
        )))
    }
}

/// Packs `bits` LSB-first into bytes, zero-padding unused high bits of the
/// last byte.
fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; (bits.len() + 7) / 8];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

fn finish(mut body: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&body);
    body.extend_from_slice(&crc.to_le_bytes());
    body
}

fn read_request(unit_id: u8, fc: u8, addr: u16, qty: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(8);
    body.push(unit_id);
    body.push(fc);
    body.extend_from_slice(&addr.to_be_bytes());
    body.extend_from_slice(&qty.to_be_bytes());
    finish(body)
}

pub fn build_read_coils(unit_id: u8, address: u16, quantity: u16) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    validate_qty(quantity, MAX_READ_BITS_QTY, "read coils")?;
    Ok(read_request(unit_id, FC_READ_COILS, address, quantity))
}

pub fn build_read_discrete_inputs(
    unit_id: u8,
    address: u16,
    quantity: u16,
) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    validate_qty(quantity, MAX_READ_BITS_QTY, "read discrete inputs")?;
    Ok(read_request(
        unit_id,
        FC_READ_DISCRETE_INPUTS,
        address,
        quantity,
    ))
}

pub fn build_read_holding_registers(
    unit_id: u8,
    address: u16,
    quantity: u16,
) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    validate_qty(quantity, MAX_READ_REGISTERS_QTY, "read holding registers")?;
    Ok(read_request(
        unit_id,
        FC_READ_HOLDING_REGISTERS,
        address,
        quantity,
    ))
}

pub fn build_read_input_registers(
    unit_id: u8,
    address: u16,
    quantity: u16,
) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    validate_qty(quantity, MAX_READ_REGISTERS_QTY, "read input registers")?;
    Ok(read_request(
        unit_id,
        FC_READ_INPUT_REGISTERS,
        address,
        quantity,
    ))
}

pub fn build_write_single_coil(
    unit_id: u8,
    address: u16,
    state: bool,
) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    let value = if state { COIL_ON } else { COIL_OFF };
    let mut body = Vec::with_capacity(6);
    body.push(unit_id);
    body.push(FC_WRITE_SINGLE_COIL);
    body.extend_from_slice(&address.to_be_bytes());
    body.extend_from_slice(&value.to_be_bytes());
    Ok(finish(body))
}

pub fn build_write_single_register(
    unit_id: u8,
    address: u16,
    value: u16,
) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    let mut body = Vec::with_capacity(6);
    body.push(unit_id);
    body.push(FC_WRITE_SINGLE_REGISTER);
    body.extend_from_slice(&address.to_be_bytes());
    body.extend_from_slice(&value.to_be_bytes());
    Ok(finish(body))
}

pub fn build_write_multiple_coils(
    unit_id: u8,
    address: u16,
    states: &[bool],
) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    validate_qty(
        states.len() as u16,
        MAX_WRITE_COILS_QTY,
        "write multiple coils",
    )?;

    let packed = pack_bits(states);
    let mut body = Vec::with_capacity(7 + packed.len());
    body.push(unit_id);
    body.push(FC_WRITE_MULTIPLE_COILS);
    body.extend_from_slice(&address.to_be_bytes());
    body.extend_from_slice(&(states.len() as u16).to_be_bytes());
    body.push(packed.len() as u8);
    body.extend_from_slice(&packed);
    Ok(finish(body))
}

pub fn build_write_multiple_registers(
    unit_id: u8,
    address: u16,
    values: &[u16],
) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    validate_qty(
        values.len() as u16,
        MAX_WRITE_REGISTERS_QTY,
        "write multiple registers",
    )?;

    let mut body = Vec::with_capacity(7 + values.len() * 2);
    body.push(unit_id);
    body.push(FC_WRITE_MULTIPLE_REGISTERS);
    body.extend_from_slice(&address.to_be_bytes());
    body.extend_from_slice(&(values.len() as u16).to_be_bytes());
    body.push((values.len() * 2) as u8);
    for value in values {
        body.extend_from_slice(&value.to_be_bytes());
    }
    Ok(finish(body))
}

pub fn build_mask_write_register(
    unit_id: u8,
    address: u16,
    and_mask: u16,
    or_mask: u16,
) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    let mut body = Vec::with_capacity(8);
    body.push(unit_id);
    body.push(FC_MASK_WRITE_REGISTER);
    body.extend_from_slice(&address.to_be_bytes());
    body.extend_from_slice(&and_mask.to_be_bytes());
    body.extend_from_slice(&or_mask.to_be_bytes());
    Ok(finish(body))
}

pub fn build_read_write_multiple_registers(
    unit_id: u8,
    read_address: u16,
    read_quantity: u16,
    write_address: u16,
    write_values: &[u16],
) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    validate_qty(read_quantity, MAX_RW_READ_QTY, "read/write read")?;
    validate_qty(
        write_values.len() as u16,
        MAX_RW_WRITE_QTY,
        "read/write write",
    )?;

    let mut body = Vec::with_capacity(10 + write_values.len() * 2);
    body.push(unit_id);
    body.push(FC_READ_WRITE_MULTIPLE_REGISTERS);
    body.extend_from_slice(&read_address.to_be_bytes());
    body.extend_from_slice(&read_quantity.to_be_bytes());
    body.extend_from_slice(&write_address.to_be_bytes());
    body.extend_from_slice(&(write_values.len() as u16).to_be_bytes());
    body.push((write_values.len() * 2) as u8);
    for value in write_values {
        body.extend_from_slice(&value.to_be_bytes());
    }
    Ok(finish(body))
}

fn validate_file_sub_requests(requests: &[FileSubRequest]) -> Result<(), ModbusError> {
    if requests.is_empty() {
        return Err(ModbusError::invalid_argument(
            "at least one file sub-request is required",
        ));
    }
    for req in requests {
        validate_qty(req.record_length(), MAX_FILE_RECORD_LEN, "file record")?;
    }
    Ok(())
}

pub fn build_read_file_record(
    unit_id: u8,
    requests: &[FileSubRequest],
) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    validate_file_sub_requests(requests)?;

    let byte_count = requests.len() * 7;
    if byte_count > 0xFF {
        return Err(ModbusError::invalid_argument(
            "too many file sub-requests for one PDU",
        ));
    }

    let mut body = Vec::with_capacity(3 + byte_count);
    body.push(unit_id);
    body.push(FC_READ_FILE_RECORD);
    body.push(byte_count as u8);
    for req in requests {
        body.push(FILE_RECORD_REFERENCE_TYPE);
        body.extend_from_slice(&req.file_number.to_be_bytes());
        body.extend_from_slice(&req.record_number.to_be_bytes());
        body.extend_from_slice(&req.record_length().to_be_bytes());
    }
    Ok(finish(body))
}

pub fn build_write_file_record(
    unit_id: u8,
    requests: &[FileSubRequest],
) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    validate_file_sub_requests(requests)?;

    let byte_count: usize = requests
        .iter()
        .map(|req| 7 + req.record_data.len() * 2)
        .sum();
    if byte_count > 0xFF {
        return Err(ModbusError::invalid_argument(
            "too many file sub-requests for one PDU",
        ));
    }

    let mut body = Vec::with_capacity(3 + byte_count);
    body.push(unit_id);
    body.push(FC_WRITE_FILE_RECORD);
    body.push(byte_count as u8);
    for req in requests {
        body.push(FILE_RECORD_REFERENCE_TYPE);
        body.extend_from_slice(&req.file_number.to_be_bytes());
        body.extend_from_slice(&req.record_number.to_be_bytes());
        body.extend_from_slice(&req.record_length().to_be_bytes());
        for value in &req.record_data {
            body.extend_from_slice(&value.to_be_bytes());
        }
    }
    Ok(finish(body))
}

pub fn build_read_fifo_queue(unit_id: u8, address: u16) -> Result<Vec<u8>, ModbusError> {
    validate_unit_id(unit_id)?;
    let mut body = Vec::with_capacity(4);
    body.push(unit_id);
    body.push(FC_READ_FIFO_QUEUE);
    body.extend_from_slice(&address.to_be_bytes());
    Ok(finish(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_holding_registers_matches_scenario_s2() {
        // S2 from spec.md §8.
        let frame = build_read_holding_registers(1, 0x0010, 3).unwrap();
        assert_eq!(&frame[..6], &[0x01, 0x03, 0x00, 0x10, 0x00, 0x03]);
        assert_eq!(frame.len(), 8);
    }

    #[test]
    fn write_single_coil_on_matches_scenario_s3() {
        // S3 from spec.md §8.
        let frame = build_write_single_coil(1, 0x0002, true).unwrap();
        assert_eq!(&frame[..6], &[0x01, 0x05, 0x00, 0x02, 0xFF, 0x00]);
    }

    #[test]
    fn write_single_coil_off() {
        let frame = build_write_single_coil(1, 0x0002, false).unwrap();
        assert_eq!(&frame[4..6], &[0x00, 0x00]);
    }

    #[test]
    fn write_multiple_coils_matches_scenario_s4() {
        // S4 from spec.md §8: body ends `... 0x00, 0x10, 0x00, 0x03, 0x01, 0b00000101, ...`.
        let frame = build_write_multiple_coils(1, 0x0010, &[true, false, true]).unwrap();
        assert_eq!(
            &frame[..8],
            &[0x01, 0x0F, 0x00, 0x10, 0x00, 0x03, 0x01, 0b0000_0101]
        );
    }

    #[test]
    fn every_builder_produces_self_consistent_crc() {
        let frames = vec![
            build_read_coils(1, 0, 10).unwrap(),
            build_read_discrete_inputs(1, 0, 10).unwrap(),
            build_read_holding_registers(1, 0, 10).unwrap(),
            build_read_input_registers(1, 0, 10).unwrap(),
            build_write_single_coil(1, 0, true).unwrap(),
            build_write_single_register(1, 0, 42).unwrap(),
            build_write_multiple_coils(1, 0, &[true, false, true]).unwrap(),
            build_write_multiple_registers(1, 0, &[1, 2, 3]).unwrap(),
            build_mask_write_register(1, 0, 0x00FF, 0x1100).unwrap(),
            build_read_write_multiple_registers(1, 0, 2, 0, &[9, 9]).unwrap(),
            build_read_fifo_queue(1, 0).unwrap(),
        ];
        for frame in frames {
            assert_eq!(crc16(&frame), 0);
        }
    }

    #[test]
    fn quantity_boundaries_for_read_coils() {
        assert!(build_read_coils(1, 0, 0).is_err());
        assert!(build_read_coils(1, 0, 2000).is_ok());
        assert!(build_read_coils(1, 0, 2001).is_err());
    }

    #[test]
    fn quantity_boundaries_for_read_registers() {
        assert!(build_read_holding_registers(1, 0, 0).is_err());
        assert!(build_read_holding_registers(1, 0, 125).is_ok());
        assert!(build_read_holding_registers(1, 0, 126).is_err());
    }

    #[test]
    fn quantity_boundaries_for_write_multiple_coils() {
        let max = vec![true; 1968];
        let over = vec![true; 1969];
        assert!(build_write_multiple_coils(1, 0, &[]).is_err());
        assert!(build_write_multiple_coils(1, 0, &max).is_ok());
        assert!(build_write_multiple_coils(1, 0, &over).is_err());
    }

    #[test]
    fn quantity_boundaries_for_write_multiple_registers() {
        let max = vec![0u16; 123];
        let over = vec![0u16; 124];
        assert!(build_write_multiple_registers(1, 0, &[]).is_err());
        assert!(build_write_multiple_registers(1, 0, &max).is_ok());
        assert!(build_write_multiple_registers(1, 0, &over).is_err());
    }

    #[test]
    fn unit_id_boundaries() {
        assert!(build_read_coils(0, 0, 1).is_err());
        assert!(build_read_coils(1, 0, 1).is_ok());
        assert!(build_read_coils(247, 0, 1).is_ok());
        assert!(build_read_coils(248, 0, 1).is_err());
    }

    #[test]
    fn file_record_length_boundaries() {
        let ok = FileSubRequest::for_read(1, 0, 120);
        let over = FileSubRequest::for_read(1, 0, 121);
        assert!(build_read_file_record(1, &[ok]).is_ok());
        assert!(build_read_file_record(1, &[over]).is_err());
    }
}
