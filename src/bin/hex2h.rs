use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use hex2progmem::header::{self, HeaderConfig, DEFAULT_SIZE_NAME, DEFAULT_VAR_NAME};
use hex2progmem::{DecodeOptions, HexDecoder};

/// Convert an Intel HEX firmware image into a C header with a PROGMEM byte array
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input Intel HEX file (.hex)
    input_hex: PathBuf,

    /// Output header file (.h)
    output_h: PathBuf,

    /// Name of the C array
    #[arg(long = "var", default_value = DEFAULT_VAR_NAME)]
    var_name: String,

    /// Name of the size constant
    #[arg(long = "size-name", default_value = DEFAULT_SIZE_NAME)]
    size_name: String,

    /// Reject records with a wrong checksum
    #[arg(long)]
    strict: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    log::debug!("{:?}", args);

    let raw = std::fs::read(&args.input_hex)
        .with_context(|| format!("failed to read {}", args.input_hex.display()))?;

    // undecodable bytes only matter if they end up inside a record
    let text = String::from_utf8_lossy(&raw);

    let decoder = HexDecoder::new(DecodeOptions {
        verify_checksums: args.strict,
    });
    let image = decoder
        .decode_str(&text)
        .with_context(|| format!("failed to decode {}", args.input_hex.display()))?;

    let config = HeaderConfig {
        var_name: args.var_name,
        size_name: args.size_name,
    };

    header::write_header(&args.output_h, &image, &config)
        .with_context(|| format!("failed to write {}", args.output_h.display()))?;

    log::info!(
        "wrote {} ({} bytes)",
        args.output_h.display(),
        image.len()
    );

    Ok(())
}
