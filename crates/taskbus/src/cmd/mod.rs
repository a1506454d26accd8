use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod checksum;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a scripted controller session against an in-memory device.
    Simulate(SimulateArgs),
    /// Compute the wire checksum for a payload.
    Checksum(ChecksumArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Simulate(args) => simulate::run(args, format),
        Command::Checksum(args) => checksum::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of start/status/delete cycles to drive the worker through.
    #[arg(long, default_value = "1")]
    pub cycles: u32,
    /// Loop tick of the simulated device (e.g. 5ms, 1s).
    #[arg(long, default_value = "5ms")]
    pub tick: String,
    /// Blink interval forwarded to the continuous task, in 10 ms units.
    #[arg(long, default_value = "2")]
    pub blink: u8,
}

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// Payload bytes as hex (e.g. "02 05" or "0205").
    pub payload: String,
    /// Print the fully framed wire bytes instead of just the checksum.
    #[arg(long)]
    pub frame: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
