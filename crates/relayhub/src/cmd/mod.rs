use std::path::PathBuf;

use clap::{ArgGroup, Args, Subcommand};
use relayhub_frame::{DEFAULT_FAST_BUFFERING_THRESHOLD, DEFAULT_MAX_CONTENT};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a hub until interrupted.
    Serve(ServeArgs),
    /// Send a single message to a running hub.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format).await,
        Command::Send(args) => send::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("endpoint").required(true).multiple(true).args(["tcp", "unix"])))]
pub struct ServeArgs {
    /// TCP address to listen on (e.g. 127.0.0.1:7420).
    #[arg(long, value_name = "ADDR", env = "RELAYHUB_TCP")]
    pub tcp: Option<String>,
    /// Unix socket path to listen on.
    #[arg(long, value_name = "PATH", env = "RELAYHUB_UNIX")]
    pub unix: Option<PathBuf>,
    /// Per-connection receive ceiling in bytes per second.
    #[arg(long, value_name = "BYTES", env = "RELAYHUB_RATE_LIMIT")]
    pub rate_limit: Option<u64>,
    /// Maximum content size per message.
    #[arg(long, value_name = "BYTES", env = "RELAYHUB_MAX_CONTENT", default_value_t = DEFAULT_MAX_CONTENT)]
    pub max_content: u64,
    /// Content at or above this size is spooled to a temporary file.
    #[arg(long, value_name = "BYTES", env = "RELAYHUB_SPILL_THRESHOLD", default_value_t = DEFAULT_FAST_BUFFERING_THRESHOLD)]
    pub spill_threshold: u64,
    /// Print connection and traffic events to stdout.
    #[arg(long)]
    pub events: bool,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("endpoint").required(true).args(["tcp", "unix"])))]
pub struct SendArgs {
    /// TCP address of the hub.
    #[arg(long, value_name = "ADDR")]
    pub tcp: Option<String>,
    /// Unix socket path of the hub.
    #[arg(long, value_name = "PATH")]
    pub unix: Option<PathBuf>,
    /// Message verb (letters and underscores).
    #[arg(long, default_value = "MSG")]
    pub verb: String,
    /// Channel: 0 loops back, -1 broadcasts, anything else is relative hex.
    #[arg(long, short = 'c', default_value = "0", allow_hyphen_values = true)]
    pub channel: String,
    /// Content as a string.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read content from a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for one incoming message and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
