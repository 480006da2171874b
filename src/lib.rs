use std::collections::BTreeMap;

#[cfg(feature = "flash")]
pub mod flash;
pub mod header;
mod load_firmware_hex;
pub mod record;

use record::{HexRecord, RecordKind, Records};

/// Value of every address in the image that no data record wrote
pub const FILL_BYTE: u8 = 0xFF;
/// The image always starts at absolute address 0, whatever the lowest written address is
pub const BASE_ADDRESS: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A record line that could not be parsed
    #[error("failed to parse HEX record on line {line_number}: {line}")]
    Format { line_number: usize, line: String },
    /// Not a single data byte was found
    #[error("no usable data found in HEX input")]
    EmptyImage,
    /// Only produced when checksums are verified
    #[error(
        "checksum mismatch on line {line_number} (expected {expected:#04X}, found {}): {line}",
        .found.map(|c| format!("{c:#04X}")).unwrap_or_else(|| "none".into())
    )]
    Checksum {
        line_number: usize,
        line: String,
        expected: u8,
        found: Option<u8>,
    },
}

type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject records whose checksum does not match their contents.
    /// Off by default: checksums are read but never checked.
    pub verify_checksums: bool,
}

/// Where the flattened image starts and what goes in the gaps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenPolicy {
    pub base_address: u64,
    pub fill_byte: u8,
}

impl Default for FlattenPolicy {
    fn default() -> Self {
        Self {
            base_address: BASE_ADDRESS,
            fill_byte: FILL_BYTE,
        }
    }
}

/// Absolute address to byte, as written by the data records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparseMemory {
    bytes: BTreeMap<u64, u8>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later writes to the same address replace earlier ones
    pub fn insert(&mut self, address: u64, value: u8) {
        self.bytes.insert(address, value);
    }

    pub fn get(&self, address: u64) -> Option<u8> {
        self.bytes.get(&address).copied()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn min_address(&self) -> Option<u64> {
        self.bytes.keys().next().copied()
    }

    pub fn max_address(&self) -> Option<u64> {
        self.bytes.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u8)> + '_ {
        self.bytes.iter().map(|(address, value)| (*address, *value))
    }

    /// Lay the written bytes out contiguously, from `policy.base_address` up to and
    /// including the highest written address. Unwritten addresses get the fill byte,
    /// addresses below the base are dropped.
    ///
    /// There is no upper bound on the result: a single byte at a high address gives
    /// an image that is mostly fill bytes.
    pub fn flatten(&self, policy: &FlattenPolicy) -> FirmwareImage {
        let size = match self.max_address() {
            // an image wider than the host address space cannot be allocated anyway
            Some(max) if max >= policy.base_address => {
                usize::try_from(max - policy.base_address + 1).unwrap_or(usize::MAX)
            }
            _ => 0,
        };

        let mut bytes = vec![policy.fill_byte; size];
        for (address, value) in self.bytes.range(policy.base_address..) {
            bytes[(address - policy.base_address) as usize] = *value;
        }

        FirmwareImage {
            bytes,
            lowest_written_address: self.min_address(),
        }
    }
}

/// The flat image handed to the header emitter. Index `i` holds the byte at
/// absolute address `BASE_ADDRESS + i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    bytes: Vec<u8>,
    lowest_written_address: Option<u64>,
}

impl FirmwareImage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The lowest address any data record wrote to. Everything below it (down to
    /// the base address) is padding.
    pub fn lowest_written_address(&self) -> Option<u64> {
        self.lowest_written_address
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl AsRef<[u8]> for FirmwareImage {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Everything one decode run needs to remember between records
#[derive(Debug, Default)]
struct DecoderState {
    /// The high 16 bits of a 32-bit linear address, unshifted
    upper_address: u32,
    memory: SparseMemory,
}

enum Step {
    Continue,
    Stop,
}

impl DecoderState {
    fn apply(&mut self, record: &HexRecord, line_number: usize) -> Step {
        match &record.kind {
            RecordKind::Data(payload) => {
                let base = ((self.upper_address as u64) << 16) + record.address as u64;
                log::trace!(
                    "line {}: {} bytes at {:#010X}",
                    line_number,
                    payload.len(),
                    base
                );

                for (i, byte) in payload.iter().enumerate() {
                    self.memory.insert(base + i as u64, *byte);
                }
            }
            RecordKind::EndOfFile => {
                log::debug!("line {}: end of file record", line_number);
                return Step::Stop;
            }
            RecordKind::ExtendedLinearAddress(upper) => {
                log::debug!("line {}: upper address {:#06X}", line_number, upper);
                self.upper_address = *upper as u32;
            }
            RecordKind::Other { record_type } => {
                log::warn!(
                    "line {}: ignoring unsupported record type {:#04X}",
                    line_number,
                    record_type
                );
            }
        }

        Step::Continue
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HexDecoder {
    options: DecodeOptions,
}

impl HexDecoder {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    /// Run the records over a fresh state and return the written bytes.
    ///
    /// Processing stops at the first end-of-file record; anything after it is
    /// never parsed. Running out of lines without one is fine too.
    pub fn decode_memory<I, S>(&self, lines: I) -> DecodeResult<SparseMemory>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = DecoderState::default();
        let mut records =
            Records::new(lines.into_iter()).verify_checksums(self.options.verify_checksums);

        let mut end_of_file = None;
        for item in records.by_ref() {
            let (line_number, record) = item?;

            if let Step::Stop = state.apply(&record, line_number) {
                end_of_file = Some(line_number);
                break;
            }
        }

        log::debug!(
            "processed {} lines, {} bytes written",
            records.line_number(),
            state.memory.len()
        );

        if let Some(line_number) = end_of_file {
            let ignored = count_record_lines(records.into_inner());
            if ignored > 0 {
                log::warn!(
                    "{} record lines after end of file record on line {} ignored",
                    ignored,
                    line_number
                );
            }
        }

        if state.memory.is_empty() {
            return Err(DecodeError::EmptyImage);
        }

        Ok(state.memory)
    }

    pub fn decode<I, S>(&self, lines: I) -> DecodeResult<FirmwareImage>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let memory = self.decode_memory(lines)?;
        let image = memory.flatten(&FlattenPolicy::default());

        log::info!(
            "decoded {} bytes ({} written, lowest address {:#X})",
            image.len(),
            memory.len(),
            image.lowest_written_address().unwrap_or(BASE_ADDRESS)
        );

        Ok(image)
    }

    pub fn decode_str(&self, text: &str) -> DecodeResult<FirmwareImage> {
        self.decode(text.lines())
    }
}

/// Lines that look like records, without parsing them
fn count_record_lines<I, S>(lines: I) -> usize
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .filter(|line| line.as_ref().trim().starts_with(record::RECORD_MARKER))
        .count()
}

/// Decode with the default, permissive options
pub fn decode<I, S>(lines: I) -> DecodeResult<FirmwareImage>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    HexDecoder::default().decode(lines)
}

pub fn decode_str(text: &str) -> DecodeResult<FirmwareImage> {
    HexDecoder::default().decode_str(text)
}
