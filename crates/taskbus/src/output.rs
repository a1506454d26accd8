use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use taskbus_frame::protocol::{FRAME_TAG, TEXT_END, TEXT_START};
use taskbus_frame::{crc16_modbus, Command};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One decoded unit of device→bus traffic.
#[derive(Debug, PartialEq, Eq)]
pub enum BusEvent {
    /// A protocol frame that passed its checksum; payload without framing.
    Frame(Vec<u8>),
    /// A protocol frame whose checksum failed; raw wire bytes kept for triage.
    Corrupt(Vec<u8>),
    /// Delimited debug text.
    Text(String),
}

/// Incremental decoder for the device→bus byte stream.
///
/// Two interleaved framings share the stream: `[0xFF][len][payload][crc]`
/// protocol frames and `[0x02]…[0x03]` debug text. Bytes outside either
/// framing are discarded one at a time until a known lead byte appears.
#[derive(Default)]
pub struct WireDecoder {
    buf: Vec<u8>,
}

impl WireDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb raw bytes and return every event that completed.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<BusEvent> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(event) = self.next_event() {
            events.push(event);
        }
        events
    }

    fn next_event(&mut self) -> Option<BusEvent> {
        loop {
            match self.buf.first() {
                Some(&FRAME_TAG) => return self.take_frame(),
                Some(&TEXT_START) => return self.take_text(),
                Some(_) => {
                    self.buf.remove(0);
                }
                None => return None,
            }
        }
    }

    fn take_frame(&mut self) -> Option<BusEvent> {
        let len = usize::from(*self.buf.get(1)?);
        let total = len + 4;
        if self.buf.len() < total {
            return None;
        }
        let wire: Vec<u8> = self.buf.drain(..total).collect();
        let payload = wire[2..2 + len].to_vec();
        let stored = u16::from_be_bytes([wire[2 + len], wire[3 + len]]);
        if stored == crc16_modbus(&payload) {
            Some(BusEvent::Frame(payload))
        } else {
            Some(BusEvent::Corrupt(wire))
        }
    }

    fn take_text(&mut self) -> Option<BusEvent> {
        let end = self.buf.iter().position(|&b| b == TEXT_END)?;
        let wire: Vec<u8> = self.buf.drain(..=end).collect();
        let text = String::from_utf8_lossy(&wire[1..wire.len() - 1]).into_owned();
        Some(BusEvent::Text(text))
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    kind: &'a str,
    command: Option<&'a str>,
    bytes: String,
    text: Option<&'a str>,
}

pub fn print_event(event: &BusEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(event),
        OutputFormat::Table => print_table(event),
        OutputFormat::Pretty => print_pretty(event),
        OutputFormat::Raw => match event {
            BusEvent::Frame(payload) => println!("{}", hex(payload)),
            BusEvent::Corrupt(wire) => println!("{}", hex(wire)),
            BusEvent::Text(text) => print!("{text}"),
        },
    }
}

fn print_json(event: &BusEvent) {
    let out = match event {
        BusEvent::Frame(payload) => EventOutput {
            kind: "frame",
            command: payload.first().map(|&b| command_name(b)),
            bytes: hex(payload),
            text: None,
        },
        BusEvent::Corrupt(wire) => EventOutput {
            kind: "corrupt",
            command: None,
            bytes: hex(wire),
            text: None,
        },
        BusEvent::Text(text) => EventOutput {
            kind: "text",
            command: None,
            bytes: String::new(),
            text: Some(text),
        },
    };
    println!(
        "{}",
        serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_table(event: &BusEvent) {
    match event {
        // GET_STATUS responses carry (id, status) pairs; render them as rows.
        BusEvent::Frame(payload)
            if payload.first() == Some(&(Command::GetStatus as u8)) && payload.len() % 2 == 1 =>
        {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TASK", "PHASE", "DETAIL"]);
            for pair in payload[1..].chunks_exact(2) {
                table.add_row(vec![
                    pair[0].to_string(),
                    phase_name(pair[1] >> 5).to_string(),
                    (pair[1] & 0x1F).to_string(),
                ]);
            }
            println!("{table}");
        }
        BusEvent::Frame(payload) => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "BYTES"])
                .add_row(vec![
                    payload
                        .first()
                        .map(|&b| command_name(b))
                        .unwrap_or("EMPTY")
                        .to_string(),
                    hex(payload.get(1..).unwrap_or(&[])),
                ]);
            println!("{table}");
        }
        BusEvent::Corrupt(wire) => println!("corrupt frame: {}", hex(wire)),
        BusEvent::Text(text) => print!("{text}"),
    }
}

fn print_pretty(event: &BusEvent) {
    match event {
        BusEvent::Frame(payload) => match payload.split_first() {
            Some((&cmd, rest)) => {
                println!("frame command={} bytes=[{}]", command_name(cmd), hex(rest));
            }
            None => println!("frame <empty>"),
        },
        BusEvent::Corrupt(wire) => println!("corrupt frame bytes=[{}]", hex(wire)),
        BusEvent::Text(text) => print!("{text}"),
    }
}

pub fn command_name(byte: u8) -> &'static str {
    match Command::try_from(byte) {
        Ok(Command::GetStatus) => "GET_STATUS",
        Ok(Command::Start) => "START",
        Ok(Command::Delete) => "DELETE",
        Ok(Command::SendData) => "SEND_DATA",
        Ok(Command::Pause) => "PAUSE",
        Ok(Command::Resume) => "RESUME",
        Ok(Command::DataFromTask) => "DATA_FROM_TASK",
        Ok(Command::ReceiveError) => "RECEIVE_ERROR",
        Ok(Command::EmergencyStop) => "EMERGENCY_STOP",
        Err(_) => "UNKNOWN",
    }
}

fn phase_name(phase: u8) -> &'static str {
    match phase {
        0 => "SETUP",
        1 => "RUNNING",
        2 => "WAIT_START",
        3 => "WAIT_ACK",
        4 => "WAIT_INNER",
        5 => "STOPPED",
        6 => "ERROR",
        _ => "UNKNOWN",
    }
}

pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
