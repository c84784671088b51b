use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod inspect;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show what a host would derive from a frame address.
    Inspect(InspectArgs),
    /// Run a host and guest pair over an in-memory bus and print the trace.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Inspect(args) => inspect::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Frame address, including `_origin` and `_placement`.
    pub frame_src: String,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Frame address loaded by the guest.
    #[arg(long, value_name = "URL")]
    pub frame_src: String,
    /// Address of the hosting document.
    #[arg(long, value_name = "URL", default_value = "http://localhost:8080/")]
    pub host: String,
    /// Rewrite the frame address with this placement and the host's origin.
    #[arg(long, value_name = "NAME")]
    pub placement: Option<String>,
    /// Method the host registers (repeatable).
    #[arg(long = "method", value_name = "NAME")]
    pub methods: Vec<String>,
    /// Event name the host may send (repeatable). None means unrestricted.
    #[arg(long = "listener", value_name = "NAME")]
    pub listeners: Vec<String>,
    /// Script snippet handed to the guest (repeatable).
    #[arg(long = "script", value_name = "SNIPPET")]
    pub scripts: Vec<String>,
    /// Guest invokes a host method, in order (repeatable).
    #[arg(long = "invoke", value_name = "NAME[=JSON]")]
    pub invocations: Vec<String>,
    /// Host sends an event to the guest, in order (repeatable).
    #[arg(long = "emit", value_name = "NAME[=JSON]")]
    pub emits: Vec<String>,
    /// Schema directory for validating payloads the host receives.
    #[arg(long, value_name = "DIR")]
    pub schemas: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
