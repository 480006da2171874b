//! Renders a [`FirmwareImage`] as a C header holding a `PROGMEM` byte array.

use std::path::Path;

use crate::FirmwareImage;

pub const DEFAULT_VAR_NAME: &str = "firmware_bin";
pub const DEFAULT_SIZE_NAME: &str = "FIRMWARE_SIZE";

const BYTES_PER_LINE: usize = 16;
const INDENT: &str = "    ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderConfig {
    /// Name of the byte array
    pub var_name: String,
    /// Name of the constant holding the array length
    pub size_name: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            var_name: DEFAULT_VAR_NAME.to_string(),
            size_name: DEFAULT_SIZE_NAME.to_string(),
        }
    }
}

/// Include guard token for the header at `path`: the file name, uppercased, with
/// `.` and `-` turned into `_`.
pub fn guard_name(path: &Path) -> String {
    let file_name = match path.file_name() {
        Some(name) => name.to_string_lossy(),
        None => path.to_string_lossy(),
    };

    file_name.to_uppercase().replace(['.', '-'], "_")
}

pub fn render(image: &FirmwareImage, config: &HeaderConfig, guard: &str) -> String {
    let bytes = image.as_bytes();
    let size = bytes.len();

    let mut out = String::new();

    out.push_str("// Auto-generated from Intel HEX by hex2h\n");
    out.push_str("#pragma once\n");
    out.push_str(&format!("#ifndef {guard}\n"));
    out.push_str(&format!("#define {guard}\n\n"));
    out.push_str("#include <avr/pgmspace.h>\n");
    out.push_str("#include <stdint.h>\n\n");
    out.push_str(&format!("const uint32_t {} = {}UL;\n\n", config.size_name, size));
    out.push_str(&format!("const uint8_t {}[] PROGMEM = {{\n", config.var_name));

    for (i, byte) in bytes.iter().enumerate() {
        if i % BYTES_PER_LINE == 0 {
            out.push_str(INDENT);
        }

        out.push_str(&format!("0x{byte:02X}"));

        if i != size - 1 {
            out.push_str(", ");
        }

        if i % BYTES_PER_LINE == BYTES_PER_LINE - 1 || i == size - 1 {
            out.push('\n');
        }
    }

    out.push_str("};\n\n");
    out.push_str(&format!("#endif // {guard}\n"));

    out
}

/// Render the whole header in memory, then write it out in one go.
pub fn write_header(
    path: &Path,
    image: &FirmwareImage,
    config: &HeaderConfig,
) -> std::io::Result<()> {
    let guard = guard_name(path);
    let contents = render(image, config, &guard);

    log::debug!(
        "writing {} ({} bytes of header for {} bytes of image)",
        path.display(),
        contents.len(),
        image.len()
    );

    std::fs::write(path, contents)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decode_str;

    #[test]
    fn guard_from_file_name() {
        assert_eq!(guard_name(Path::new("slave-fw.h")), "SLAVE_FW_H");
        assert_eq!(
            guard_name(Path::new("build/out/boot.loader-v2.h")),
            "BOOT_LOADER_V2_H"
        );
    }

    #[test]
    fn render_small_image() {
        let image = decode_str(":0100000011EE\n:0100050022D8\n").unwrap();

        let header = render(&image, &HeaderConfig::default(), "FIRMWARE_H");

        let expected = "\
// Auto-generated from Intel HEX by hex2h
#pragma once
#ifndef FIRMWARE_H
#define FIRMWARE_H

#include <avr/pgmspace.h>
#include <stdint.h>

const uint32_t FIRMWARE_SIZE = 6UL;

const uint8_t firmware_bin[] PROGMEM = {
    0x11, 0xFF, 0xFF, 0xFF, 0xFF, 0x22
};

#endif // FIRMWARE_H
";
        assert_eq!(header, expected);
    }

    #[test]
    fn render_exactly_one_full_row() {
        let hex = ":10000000000102030405060708090A0B0C0D0E0F78\n";
        let image = decode_str(hex).unwrap();

        let header = render(&image, &HeaderConfig::default(), "ROW_H");

        assert!(header.contains(
            "= {\n    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, \
             0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F\n};\n"
        ));
        assert!(header.ends_with("};\n\n#endif // ROW_H\n"));
    }

    #[test]
    fn rows_wrap_after_sixteen_values() {
        let hex = ":1100000000000000000000000000000000000000AB44\n";
        let image = decode_str(hex).unwrap();
        let config = HeaderConfig {
            var_name: "slave_fw".to_string(),
            size_name: "SLAVE_FW_SIZE".to_string(),
        };

        let header = render(&image, &config, "SLAVE_H");

        assert!(header.contains("const uint32_t SLAVE_FW_SIZE = 17UL;"));
        assert!(header.contains("const uint8_t slave_fw[] PROGMEM = {"));

        let rows: Vec<&str> = header.lines().filter(|l| l.starts_with(INDENT)).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].matches("0x").count(), 16);
        // a full row keeps its separator, only the very last value has none
        assert!(rows[0].ends_with("0x00, "));
        assert_eq!(rows[1], "    0xAB");
    }

    #[test]
    fn write_header_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.h");
        let image = decode_str(":02000000CAFE36\n:00000001FF\n").unwrap();

        write_header(&path, &image, &HeaderConfig::default()).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("#ifndef PAYLOAD_H"));
        assert!(written.contains("const uint32_t FIRMWARE_SIZE = 2UL;"));
        assert!(written.contains("    0xCA, 0xFE\n};"));
    }
}
