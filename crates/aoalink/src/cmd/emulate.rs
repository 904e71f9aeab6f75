use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use aoalink::frame::{FrameError, PacketReader, HANDSHAKE, HEARTBEAT};
use aoalink::transport::{AccessoryListener, AccessoryStream};
use tracing::{debug, info};

use crate::cmd::{parse_duration, EmulateArgs};
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: EmulateArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.heartbeat_interval)?;
    let listener =
        AccessoryListener::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;

    let mut stream = listener
        .accept()
        .map_err(|err| transport_error("accept failed", err))?;
    stream
        .write_all(&[HANDSHAKE])
        .map_err(|err| io_error("handshake write failed", err))?;
    info!(path = ?listener.path(), "host connected; handshake sent");

    let beating = Arc::new(AtomicBool::new(true));
    let heartbeat = spawn_heartbeat(&stream, interval, args.heartbeats, beating.clone())?;

    let mut reader = PacketReader::new(stream);
    let mut printed = 0usize;
    let result = loop {
        match reader.read_packet() {
            Ok(packet) => {
                print_packet(&packet, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break Ok(SUCCESS);
                }
            }
            Err(FrameError::ConnectionClosed) => {
                info!(packets = printed, "host closed the link");
                break Ok(SUCCESS);
            }
            Err(err) => break Err(frame_error("receive failed", err)),
        }
    };

    beating.store(false, Ordering::SeqCst);
    let _ = reader.get_ref().shutdown();
    let _ = heartbeat.join();
    result
}

fn spawn_heartbeat(
    stream: &AccessoryStream,
    interval: Duration,
    limit: Option<usize>,
    beating: Arc<AtomicBool>,
) -> CliResult<JoinHandle<()>> {
    let mut writer = stream
        .try_clone()
        .map_err(|err| transport_error("stream clone failed", err))?;

    thread::Builder::new()
        .name("aoalink-emulate-heartbeat".into())
        .spawn(move || {
            let mut sent = 0usize;
            while beating.load(Ordering::SeqCst) && limit.is_none_or(|limit| sent < limit) {
                thread::sleep(interval);
                if writer.write_all(&[HEARTBEAT]).is_err() {
                    debug!("heartbeat write failed; host gone");
                    return;
                }
                sent += 1;
            }
            debug!(sent, "heartbeats stopped");
        })
        .map_err(|err| CliError::new(INTERNAL, format!("failed to spawn heartbeat thread: {err}")))
}
