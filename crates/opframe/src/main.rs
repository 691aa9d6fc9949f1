//! opframe - x86 instruction framing
//!
//! Usage:
//!   opframe <file>                     Frame raw machine code from a file
//!   opframe --hex "f3 48 0f 1e fa"     Frame bytes given on the command line
//!   opframe <file> -m 32 -o 0x40 -c 10 Start at an offset, stop after 10 entries

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use opframe_decode::{
    BlockEntry, DecodedInstruction, FieldLengths, InstructionDecoder, Mode, Stage, X86Decoder,
};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opframe")]
#[command(about = "Frame x86 machine code into instructions and their fields", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a file of raw machine code
    input: Option<PathBuf>,

    /// Decode hex bytes instead of a file (whitespace is ignored)
    #[arg(short = 'x', long, conflicts_with = "input")]
    hex: Option<String>,

    /// Addressing mode: 16, 32 or 64
    #[arg(short, long, default_value = "64", value_parser = parse_mode)]
    mode: Mode,

    /// Byte offset into the input to start decoding at
    #[arg(short, long, default_value = "0", value_parser = parse_number)]
    offset: usize,

    /// Maximum number of entries to print
    #[arg(short, long)]
    count: Option<usize>,

    /// Address shown for the first decoded byte
    #[arg(short, long, default_value = "0", value_parser = parse_hex)]
    address: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Exit with an error at the first invalid instruction
    #[arg(long)]
    stop_on_error: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One line per instruction with field splits
    Text,
    /// One JSON object per line
    Json,
}

fn parse_mode(s: &str) -> Result<Mode, String> {
    s.parse()
}

fn parse_hex(s: &str) -> Result<u64, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| e.to_string())
}

fn parse_number(s: &str) -> Result<usize, String> {
    match s.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => s.parse().map_err(|e: std::num::ParseIntError| e.to_string()),
    }
}

/// Parses a hex byte string such as `"f3 48 0f 1e fa"` or `"f3480f1efa"`.
fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let digits: String = s
        .split_whitespace()
        .map(|chunk| chunk.strip_prefix("0x").unwrap_or(chunk))
        .collect();
    if !digits.is_ascii() {
        bail!("hex input contains non-ASCII characters");
    }
    if digits.len() % 2 != 0 {
        bail!("hex input has an odd number of digits: {}", digits.len());
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "opframe=info",
        1 => "opframe=debug,opframe_decode=debug",
        _ => "opframe=trace,opframe_decode=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data = match (&cli.hex, &cli.input) {
        (Some(hex), _) => parse_hex_bytes(hex)?,
        (None, Some(path)) => {
            fs::read(path).with_context(|| format!("Failed to read input: {}", path.display()))?
        }
        (None, None) => bail!("No input. Pass a file path or --hex <bytes>"),
    };

    if cli.offset > data.len() {
        bail!(
            "Offset {:#x} is past the end of the input ({} bytes)",
            cli.offset,
            data.len()
        );
    }

    let mut code = &data[cli.offset..];
    if let Some(count) = cli.count {
        // No instruction is longer than the architectural limit
        let limit = count.saturating_mul(X86Decoder::new(cli.mode).max_instruction_size());
        code = &code[..code.len().min(limit)];
    }

    debug!(mode = %cli.mode, offset = cli.offset, bytes = code.len(), "decoding");
    frame(&cli, code)
}

fn frame(cli: &Cli, code: &[u8]) -> Result<()> {
    let decoder = X86Decoder::new(cli.mode);
    let entries = decoder.decode_block(code);
    let limit = cli.count.unwrap_or(usize::MAX);

    let mut valid = 0;
    let mut invalid = 0;
    for entry in entries.iter().take(limit) {
        let address = cli.address.wrapping_add(entry.offset as u64);
        match cli.format {
            OutputFormat::Text => println!("{}", format_text(entry, code, address)),
            OutputFormat::Json => println!("{}", serde_json::to_string(&Record::new(entry, code, address))?),
        }

        match &entry.result {
            Ok(_) => valid += 1,
            Err(err) => {
                invalid += 1;
                if cli.stop_on_error {
                    bail!("Invalid instruction at {:#x}: {}", address, err.error);
                }
            }
        }
    }

    info!(valid, invalid, "done");
    Ok(())
}

// =============================================================================
// Text output
// =============================================================================

/// Column width of the byte listing.
const BYTES_WIDTH: usize = 44;

fn format_text(entry: &BlockEntry, code: &[u8], address: u64) -> String {
    match &entry.result {
        Ok(inst) => {
            let groups = field_groups(inst)
                .iter()
                .map(|group| hex_string(group))
                .collect::<Vec<_>>()
                .join(" | ");
            format!(
                "{:#010x}  {:<width$} {}",
                address,
                groups,
                describe(inst),
                width = BYTES_WIDTH
            )
        }
        Err(err) => {
            let bytes = invalid_bytes(code, entry.offset, err.consumed);
            format!(
                "{:#010x}  {:<width$} (bad) {} [{}]",
                address,
                hex_string(bytes),
                err.error,
                err.stage,
                width = BYTES_WIDTH
            )
        }
    }
}

/// Splits an instruction into its non-empty fields, in encoding order.
fn field_groups(inst: &DecodedInstruction) -> Vec<&[u8]> {
    let bytes = inst.bytes();
    let single = |offset: usize| &bytes[offset..offset + 1];

    let mut groups = vec![inst.prefix_bytes(), inst.rex_vex_bytes(), inst.opcode_bytes()];
    groups.extend(inst.modrm().map(|m| single(m.offset)));
    groups.extend(inst.sib().map(|s| single(s.offset)));
    groups.extend(inst.displacement_bytes());
    groups.extend(inst.immediate_bytes());
    groups.retain(|group| !group.is_empty());
    groups
}

fn describe(inst: &DecodedInstruction) -> String {
    let opcode = inst.opcode();
    let mut text = format!("{}:{:02x}", opcode.map, opcode.opcode);
    if let Some(vex) = inst.rex_vex().vex() {
        text.push_str(&format!(" vex.{}", vex.vector_size()));
    }
    text.push_str(&format!(" o{} a{}", inst.operand_size(), inst.address_size()));
    text
}

fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bytes shown for an invalid entry: what was consumed, and at least the
/// byte that gets skipped.
fn invalid_bytes(code: &[u8], offset: usize, consumed: usize) -> &[u8] {
    let end = (offset + consumed.max(1)).min(code.len());
    &code[offset..end]
}

// =============================================================================
// JSON output
// =============================================================================

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Record<'a> {
    Valid {
        address: u64,
        bytes: String,
        fields: FieldLengths,
        instruction: &'a DecodedInstruction,
    },
    Invalid {
        address: u64,
        bytes: String,
        stage: Stage,
        consumed: usize,
        error: String,
    },
}

impl<'a> Record<'a> {
    fn new(entry: &'a BlockEntry, code: &[u8], address: u64) -> Self {
        match &entry.result {
            Ok(inst) => Record::Valid {
                address,
                bytes: hex_string(inst.bytes()),
                fields: inst.field_lengths(),
                instruction: inst,
            },
            Err(err) => Record::Invalid {
                address,
                bytes: hex_string(invalid_bytes(code, entry.offset, err.consumed)),
                stage: err.stage,
                consumed: err.consumed,
                error: err.error.to_string(),
            },
        }
    }
}
