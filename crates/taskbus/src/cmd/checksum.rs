use serde::Serialize;
use taskbus_frame::protocol::FRAME_TAG;
use taskbus_frame::{crc16_modbus, MAX_PAYLOAD};

use crate::cmd::ChecksumArgs;
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{hex, OutputFormat};

#[derive(Serialize)]
struct ChecksumOutput {
    payload: String,
    crc: String,
    wire: Option<String>,
}

pub fn run(args: ChecksumArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = parse_hex(&args.payload)?;
    if payload.len() > MAX_PAYLOAD {
        return Err(CliError::new(
            DATA_INVALID,
            format!("payload is {} bytes, limit is {MAX_PAYLOAD}", payload.len()),
        ));
    }

    let crc = crc16_modbus(&payload);
    let wire = args.frame.then(|| {
        let mut wire = vec![FRAME_TAG, payload.len() as u8];
        wire.extend_from_slice(&payload);
        wire.extend_from_slice(&crc.to_be_bytes());
        wire
    });

    match format {
        OutputFormat::Json => {
            let out = ChecksumOutput {
                payload: hex(&payload),
                crc: format!("{crc:04x}"),
                wire: wire.as_deref().map(hex),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Raw => match &wire {
            Some(wire) => println!("{}", hex(wire)),
            None => println!("{crc:04x}"),
        },
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("payload: [{}]", hex(&payload));
            println!("crc16:   0x{crc:04X}");
            if let Some(wire) = &wire {
                println!("wire:    [{}]", hex(wire));
            }
        }
    }

    Ok(SUCCESS)
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(CliError::new(USAGE, "payload must not be empty"));
    }
    if compact.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            "payload hex must have an even number of digits",
        ));
    }
    compact
        .as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).map_err(|_| bad_digit(input))?;
            u8::from_str_radix(pair, 16).map_err(|_| bad_digit(input))
        })
        .collect()
}

fn bad_digit(input: &str) -> CliError {
    CliError::new(USAGE, format!("invalid hex payload: {input}"))
}
