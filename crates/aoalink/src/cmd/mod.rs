use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aoalink::session::{Notification, NotificationSink};
use aoalink::transport::{AccessoryPlatform, DevicePlatform, SocketPlatform};
use clap::{Args, Subcommand};
use crossbeam_channel::{Receiver, Sender};
use tracing::info;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod emulate;
pub mod probe;
pub mod stream;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open an accessory, wait for its handshake and report link health.
    Probe(ProbeArgs),
    /// Stream a file to an accessory as video packets.
    Stream(StreamArgs),
    /// Play the accessory side on a Unix socket and print received packets.
    Emulate(EmulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Probe(args) => probe::run(args, format),
        Command::Stream(args) => stream::run(args, format),
        Command::Emulate(args) => emulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Accessory device node, or bridge socket with --socket.
    pub path: PathBuf,
    /// Treat PATH as a Unix socket bridge.
    #[arg(long)]
    pub socket: bool,
    /// How long to wait for the handshake (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Accessory device node, or bridge socket with --socket.
    pub path: PathBuf,
    /// Treat PATH as a Unix socket bridge.
    #[arg(long)]
    pub socket: bool,
    /// File whose contents are sent as encoded video units.
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,
    /// Encoder extra data (e.g. SPS/PPS) sent ahead of the first unit.
    #[arg(long, value_name = "FILE")]
    pub codec_config: Option<PathBuf>,
    /// Bytes per video unit.
    #[arg(long, default_value = "4096")]
    pub chunk_size: usize,
    /// Frame rate used for pacing.
    #[arg(long, default_value = "20")]
    pub fps: u32,
    /// How long to wait for the handshake (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct EmulateArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Interval between heartbeats (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub heartbeat_interval: String,
    /// Stop sending heartbeats after N beats.
    #[arg(long)]
    pub heartbeats: Option<usize>,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn platform_for(path: &Path, socket: bool) -> Arc<dyn AccessoryPlatform> {
    if socket {
        Arc::new(SocketPlatform::new(path))
    } else {
        Arc::new(DevicePlatform::with_path(path))
    }
}

/// Forwards lifecycle notifications to the command loop; logs go to tracing.
pub struct EventFeed {
    tx: Sender<Notification>,
}

impl EventFeed {
    pub fn new() -> (Arc<Self>, Receiver<Notification>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(Self { tx }), rx)
    }
}

impl NotificationSink for EventFeed {
    fn on_connect(&self) {
        let _ = self.tx.send(Notification::Connect);
    }

    fn on_disconnect(&self) {
        let _ = self.tx.send(Notification::Disconnect);
    }

    fn on_log(&self, message: &str) {
        info!("{message}");
    }
}

/// Parse a duration like `5s`, `250ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
