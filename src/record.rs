//! Parsing of single Intel HEX lines.
//!
//! A record line looks like `:LLAAAATT[DD...]CC`. Only the data, end-of-file and
//! extended-linear-address types are interpreted; everything else parses into
//! [`RecordKind::Other`] so the decoder can skip it.

use crate::DecodeError;

/// The record marker every HEX record line starts with
pub const RECORD_MARKER: char = ':';

/// Marker, length, address, type and checksum with an empty payload
const MIN_RECORD_LEN: usize = 11;

const LENGTH_FIELD: core::ops::Range<usize> = 1..3;
const ADDRESS_FIELD: core::ops::Range<usize> = 3..7;
const TYPE_FIELD: core::ops::Range<usize> = 7..9;
const PAYLOAD_START: usize = 9;

pub const DATA: u8 = 0x00;
pub const END_OF_FILE: u8 = 0x01;
pub const EXTENDED_LINEAR_ADDRESS: u8 = 0x04;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Data(Vec<u8>),
    EndOfFile,
    /// The upper 16 bits of every following data address
    ExtendedLinearAddress(u16),
    /// Segment and start address records; parsed, but never applied
    Other { record_type: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    pub byte_count: u8,
    pub address: u16,
    pub kind: RecordKind,
    /// Absent when the line ends right after the payload
    pub checksum: Option<u8>,
    /// Raw payload bytes, whatever the record type
    payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record is shorter than its declared length")]
    Truncated,
    #[error("non-hex digit in record field")]
    NotHex,
    #[error("extended linear address record needs 2 payload bytes, found {0}")]
    ShortExtendedAddress(u8),
}

impl HexRecord {
    /// Parse one line of a HEX file.
    ///
    /// Returns `Ok(None)` for lines that are not records at all: blank lines and
    /// anything that does not start with the record marker.
    pub fn parse(line: &str) -> Result<Option<Self>, RecordError> {
        let line = line.trim();
        if line.is_empty() || !line.starts_with(RECORD_MARKER) {
            return Ok(None);
        }

        let bytes = line.as_bytes();
        if bytes.len() < MIN_RECORD_LEN {
            return Err(RecordError::Truncated);
        }

        let byte_count = hex_byte(&bytes[LENGTH_FIELD])?;
        let address = hex_field(&bytes[ADDRESS_FIELD])? as u16;
        let record_type = hex_byte(&bytes[TYPE_FIELD])?;

        let payload_end = PAYLOAD_START + 2 * byte_count as usize;
        let payload_hex = bytes
            .get(PAYLOAD_START..payload_end)
            .ok_or(RecordError::Truncated)?;

        let payload = payload_hex
            .chunks(2)
            .map(hex_byte)
            .collect::<Result<Vec<u8>, _>>()?;

        // the checksum is positional only; a garbled one is not an error here
        let checksum = bytes
            .get(payload_end..payload_end + 2)
            .and_then(|field| hex_byte(field).ok());

        let kind = match record_type {
            DATA => RecordKind::Data(payload.clone()),
            END_OF_FILE => RecordKind::EndOfFile,
            EXTENDED_LINEAR_ADDRESS => match payload.as_slice() {
                [high, low, ..] => {
                    RecordKind::ExtendedLinearAddress(u16::from_be_bytes([*high, *low]))
                }
                _ => return Err(RecordError::ShortExtendedAddress(byte_count)),
            },
            other => RecordKind::Other { record_type: other },
        };

        Ok(Some(Self {
            byte_count,
            address,
            kind,
            checksum,
            payload,
        }))
    }

    /// The checksum this record should carry: the two's complement of the sum of
    /// every other record byte.
    pub fn expected_checksum(&self) -> u8 {
        let [address_high, address_low] = self.address.to_be_bytes();
        let sum = [self.byte_count, address_high, address_low, self.record_type()]
            .iter()
            .chain(self.payload.iter())
            .fold(0u8, |acc, byte| acc.wrapping_add(*byte));

        sum.wrapping_neg()
    }

    pub fn checksum_is_valid(&self) -> bool {
        self.checksum == Some(self.expected_checksum())
    }

    pub fn record_type(&self) -> u8 {
        match self.kind {
            RecordKind::Data(_) => DATA,
            RecordKind::EndOfFile => END_OF_FILE,
            RecordKind::ExtendedLinearAddress(_) => EXTENDED_LINEAR_ADDRESS,
            RecordKind::Other { record_type } => record_type,
        }
    }
}

fn hex_field(field: &[u8]) -> Result<u32, RecordError> {
    field.iter().try_fold(0u32, |acc, digit| {
        let value = (*digit as char).to_digit(16).ok_or(RecordError::NotHex)?;
        Ok((acc << 4) | value)
    })
}

fn hex_byte(field: &[u8]) -> Result<u8, RecordError> {
    hex_field(field).map(|value| value as u8)
}

/// Lazily turns lines into records, skipping noise lines.
///
/// Every line is visited once, in order. Line numbers are 1-based.
pub struct Records<I> {
    lines: I,
    line_number: usize,
    verify_checksums: bool,
}

impl<I> Records<I> {
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            line_number: 0,
            verify_checksums: false,
        }
    }

    /// Fail on records whose checksum is missing or wrong
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// The number of lines consumed so far
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The lines that have not been looked at yet
    pub fn into_inner(self) -> I {
        self.lines
    }
}

impl<I, S> Iterator for Records<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = Result<(usize, HexRecord), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_number += 1;

            match HexRecord::parse(line.as_ref()) {
                Ok(None) => continue,
                Ok(Some(record)) if self.verify_checksums && !record.checksum_is_valid() => {
                    return Some(Err(DecodeError::Checksum {
                        line_number: self.line_number,
                        line: line.as_ref().trim().to_string(),
                        expected: record.expected_checksum(),
                        found: record.checksum,
                    }));
                }
                Ok(Some(record)) => return Some(Ok((self.line_number, record))),
                Err(e) => {
                    log::debug!("line {}: {}", self.line_number, e);
                    return Some(Err(DecodeError::Format {
                        line_number: self.line_number,
                        line: line.as_ref().trim().to_string(),
                    }));
                }
            }
        }
    }
}
