//-----------------------------------------------------------------------------
// Module hex_format
// Intel-Hex line syntax
//
// :BBAAAATT[DD...]CC
//  BB   byte count
//  AAAA 16 bit offset address
//  TT   record type
//  DD   BB data bytes
//  CC   checksum, two's complement of the sum of all preceding bytes
//
// Lenient line parser, checksums and unknown record types are accepted here
// Strict loading additionally validates each line with ihex::Record::from_record_string

use crate::HexError;

pub const RECORD_START: u8 = b':';

// Record types
pub const RECORD_TYPE_DATA: u8 = 0x00;
pub const RECORD_TYPE_END_OF_FILE: u8 = 0x01;
pub const RECORD_TYPE_EXTENDED_SEGMENT_ADDRESS: u8 = 0x02;
pub const RECORD_TYPE_START_SEGMENT_ADDRESS: u8 = 0x03;
pub const RECORD_TYPE_EXTENDED_LINEAR_ADDRESS: u8 = 0x04;
pub const RECORD_TYPE_START_LINEAR_ADDRESS: u8 = 0x05;

// Byte count, offset, type and checksum
const MIN_RECORD_BYTES: usize = 5;

/// One syntactically valid Intel-Hex line, any record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexLine {
    pub offset: u16,
    pub record_type: u8,
    pub data: Vec<u8>,
    pub checksum: u8,
}

impl HexLine {
    /// Parse a line which starts with the record start marker
    /// Whitespace around the line must already be removed
    pub fn parse(line_no: usize, line: &str) -> Result<HexLine, HexError> {
        let text = line.as_bytes();
        if text.first() != Some(&RECORD_START) {
            return Err(HexError::format(line_no, "missing record start ':'"));
        }
        let payload = &text[1..];
        if payload.len() < 2 * MIN_RECORD_BYTES {
            return Err(HexError::format(line_no, format!("record too short ({} hex digits)", payload.len())));
        }
        if payload.len() % 2 != 0 {
            return Err(HexError::format(line_no, format!("odd number of hex digits ({})", payload.len())));
        }

        let mut bytes = Vec::with_capacity(payload.len() / 2);
        for (idx, pair) in payload.chunks_exact(2).enumerate() {
            match (hex_digit(pair[0]), hex_digit(pair[1])) {
                (Some(hi), Some(lo)) => bytes.push((hi << 4) | lo),
                _ => {
                    return Err(HexError::format(line_no, format!("invalid hex digit at column {}", 2 + 2 * idx)));
                }
            }
        }

        let byte_count = bytes[0] as usize;
        let data_len = bytes.len() - MIN_RECORD_BYTES;
        if data_len != byte_count {
            return Err(HexError::format(line_no, format!("byte count 0x{:02X} does not match {} data bytes", byte_count, data_len)));
        }

        Ok(HexLine {
            offset: u16::from_be_bytes([bytes[1], bytes[2]]),
            record_type: bytes[3],
            checksum: bytes[bytes.len() - 1],
            data: bytes[4..bytes.len() - 1].to_vec(),
        })
    }

    /// Checksum as it should be, calculated from byte count, offset, type and data
    pub fn expected_checksum(&self) -> u8 {
        let [hi, lo] = self.offset.to_be_bytes();
        let sum = self
            .data
            .iter()
            .fold((self.data.len() as u8).wrapping_add(hi).wrapping_add(lo).wrapping_add(self.record_type), |acc, b| {
                acc.wrapping_add(*b)
            });
        sum.wrapping_neg()
    }

    pub fn is_known_record_type(&self) -> bool {
        self.record_type <= RECORD_TYPE_START_LINEAR_ADDRESS
    }
}

fn hex_digit(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

//-------------------------------------------------------------------------------------------------
// Test module
