use std::fs::File;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aoalink::session::{
    ConnectionManager, Notification, SessionConfig, StreamSettings, VideoFrame,
};
use aoalink::PacketizingEngine;
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::cmd::{parse_duration, platform_for, EventFeed, StreamArgs};
use crate::exit::{io_error, session_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_fields, print_json, OutputFormat};

#[derive(Serialize)]
struct StreamOutput {
    frames: usize,
    bytes: usize,
    disconnected: bool,
}

pub fn run(args: StreamArgs, format: OutputFormat) -> CliResult<i32> {
    if args.chunk_size == 0 {
        return Err(CliError::new(USAGE, "chunk size must be greater than zero"));
    }
    if args.fps == 0 {
        return Err(CliError::new(USAGE, "fps must be greater than zero"));
    }
    let timeout = parse_duration(&args.timeout)?;
    let mut input = File::open(&args.input)
        .map_err(|err| io_error(&format!("cannot open {}", args.input.display()), err))?;

    let mut engine = PacketizingEngine::new();
    if let Some(path) = &args.codec_config {
        let extra_data = std::fs::read(path)
            .map_err(|err| io_error(&format!("cannot read {}", path.display()), err))?;
        engine = engine.with_codec_config(extra_data);
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let settings = StreamSettings {
        fps: args.fps,
        ..StreamSettings::default()
    };
    let (feed, events) = EventFeed::new();
    let manager = ConnectionManager::builder(
        platform_for(&args.path, args.socket),
        Box::new(engine),
        feed,
    )
    .with_config(SessionConfig::default().with_stream(settings))
    .build()
    .map_err(|err| session_error("engine setup failed", err))?;

    manager
        .discover_and_open()
        .map_err(|err| session_error("open failed", err))?;

    if !matches!(events.recv_timeout(timeout), Ok(Notification::Connect)) {
        let _ = manager.shutdown();
        return Err(CliError::new(
            TIMEOUT,
            format!("no handshake within {timeout:?}"),
        ));
    }

    let started = manager
        .start_outbound_stream()
        .map_err(|err| session_error("stream start failed", err))?;
    if !started {
        let _ = manager.shutdown();
        return Err(CliError::new(FAILURE, "accessory disconnected before streaming"));
    }

    let frame_interval = Duration::from_secs(1) / args.fps;
    let mut chunk = vec![0u8; args.chunk_size];
    let mut out = StreamOutput {
        frames: 0,
        bytes: 0,
        disconnected: false,
    };
    let mut next_frame = Instant::now();

    while running.load(Ordering::SeqCst) {
        if let Ok(Notification::Disconnect) = events.try_recv() {
            warn!("accessory disconnected while streaming");
            out.disconnected = true;
            break;
        }

        let read = read_chunk(&mut input, &mut chunk)
            .map_err(|err| io_error("input read failed", err))?;
        if read == 0 {
            break;
        }

        manager.deliver_frame(VideoFrame {
            pixels: Bytes::copy_from_slice(&chunk[..read]),
            linesize: vec![read],
            width: settings.width,
            height: settings.height,
        });
        out.frames += 1;
        out.bytes += read;

        next_frame += frame_interval;
        if let Some(wait) = next_frame.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    manager.stop_outbound_stream();
    info!(frames = out.frames, bytes = out.bytes, "stream finished");
    manager
        .shutdown()
        .map_err(|err| session_error("shutdown failed", err))?;

    print_stream(&out, format);
    Ok(if out.disconnected { FAILURE } else { SUCCESS })
}

/// Fill `buf` as far as the input allows; a short count means end of input.
fn read_chunk(input: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn print_stream(out: &StreamOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            let rows = [
                ("Frames", out.frames.to_string()),
                ("Bytes", out.bytes.to_string()),
                ("Disconnected", out.disconnected.to_string()),
            ];
            print_fields("Stream summary", &rows, format);
        }
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
