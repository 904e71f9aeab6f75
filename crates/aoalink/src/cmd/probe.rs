use aoalink::session::{ConnectionManager, ConnectionState, Notification, SessionConfig};
use aoalink::PacketizingEngine;
use serde::Serialize;
use tracing::debug;

use crate::cmd::{parse_duration, platform_for, EventFeed, ProbeArgs};
use crate::exit::{session_error, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_fields, print_json, OutputFormat};

#[derive(Serialize)]
struct ProbeOutput {
    accessory: Option<String>,
    state: &'static str,
    handshake: bool,
    heartbeat_age_ms: Option<f64>,
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let platform = platform_for(&args.path, args.socket);
    let (feed, events) = EventFeed::new();

    let config = SessionConfig::default();
    let poll_interval = config.poll_interval;
    let manager = ConnectionManager::builder(platform, Box::new(PacketizingEngine::new()), feed)
        .with_config(config)
        .build()
        .map_err(|err| session_error("engine setup failed", err))?;

    manager
        .discover_and_open()
        .map_err(|err| session_error("open failed", err))?;

    let handshake = matches!(events.recv_timeout(timeout), Ok(Notification::Connect));

    // Give the accessory one poll interval to prove its heartbeat.
    if handshake {
        std::thread::sleep(poll_interval);
    }

    let state = manager.state();
    let out = ProbeOutput {
        accessory: manager.accessory().map(|handle| handle.id().to_string()),
        state: state.name(),
        handshake,
        heartbeat_age_ms: manager
            .since_last_heartbeat()
            .map(|age| (age.as_secs_f64() * 1000.0 * 100.0).round() / 100.0),
    };
    debug!(state = out.state, handshake, "probe finished");

    if let Err(err) = manager.shutdown() {
        return Err(session_error("shutdown failed", err));
    }
    print_probe(&out, format);

    if !handshake {
        return Ok(if state == ConnectionState::AwaitingHandshake {
            TIMEOUT
        } else {
            FAILURE
        });
    }
    Ok(SUCCESS)
}

fn print_probe(out: &ProbeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            let rows = [
                ("Accessory", out.accessory.clone().unwrap_or_else(|| "-".into())),
                ("State", out.state.to_string()),
                ("Handshake", out.handshake.to_string()),
                (
                    "Heartbeat age",
                    out.heartbeat_age_ms
                        .map(|ms| format!("{ms:.2}ms"))
                        .unwrap_or_else(|| "unavailable".into()),
                ),
            ];
            print_fields("Accessory link", &rows, format);
        }
    }
}
