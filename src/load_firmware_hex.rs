#![cfg(test)]
use crate::{decode_str, DecodeOptions, HexDecoder, FILL_BYTE};

// avr-objcopy output for an ATmega328p sketch, 16 bytes per record
const BLINK: &str = include_str!("../fixtures/blink_atmega328p.hex");

// a bootloader at 0x7E00 plus a few bytes in the second 64K bank, with CRLF line
// endings and segment/start records mixed in
const BANKED: &str = include_str!("../fixtures/banked_bootloader.hex");

fn byte_sum(bytes: &[u8]) -> u64 {
    bytes.iter().map(|b| *b as u64).sum()
}

#[test]
fn blink_atmega328p() {
    let image = decode_str(BLINK).unwrap();

    assert_eq!(image.len(), 422);
    assert_eq!(byte_sum(image.as_bytes()), 46111);

    // interrupt vector table: every entry is `jmp 0x68`
    assert_eq!(&image.as_bytes()[..4], &[0x0C, 0x94, 0x34, 0x00]);
    assert_eq!(&image.as_bytes()[418..], &[0xEB, 0xFF, 0x9B, 0x11]);
}

#[test]
fn blink_atmega328p_checksums() {
    let strict = HexDecoder::new(DecodeOptions {
        verify_checksums: true,
    });

    assert_eq!(strict.decode_str(BLINK), decode_str(BLINK));
}

#[test]
fn banked_bootloader() {
    let image = decode_str(BANKED).unwrap();

    assert_eq!(image.len(), 0x10014);
    assert_eq!(image.lowest_written_address(), Some(0x7E00));

    let bytes = image.as_bytes();
    assert!(bytes[..0x7E00].iter().all(|b| *b == FILL_BYTE));
    assert_eq!(&bytes[0x7E00..0x7E04], &[0xBC, 0x6B, 0x61, 0x4A]);
    assert_eq!(&bytes[0x10010..], &[0xDE, 0xAD, 0xBE, 0xEF]);

    // 44 bytes written, everything else is padding
    let written = 5389;
    let padding = (0x10014 - 44) * FILL_BYTE as u64;
    assert_eq!(byte_sum(bytes), written + padding);
}

#[test]
fn banked_bootloader_memory() {
    let memory = HexDecoder::default().decode_memory(BANKED.lines()).unwrap();

    assert_eq!(memory.len(), 44);
    assert_eq!(memory.min_address(), Some(0x7E00));
    assert_eq!(memory.max_address(), Some(0x10013));
    assert_eq!(memory.iter().map(|(_, b)| b as u64).sum::<u64>(), 5389);
}
