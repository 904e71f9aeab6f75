use std::io::IsTerminal;

use aoalink::frame::MediaPacket;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

#[derive(Serialize)]
struct PacketOutput {
    kind: &'static str,
    pts: Option<i64>,
    codec_config: bool,
    payload_size: usize,
}

impl From<&MediaPacket> for PacketOutput {
    fn from(packet: &MediaPacket) -> Self {
        let codec_config = packet.is_codec_config();
        Self {
            kind: packet.kind.name(),
            pts: (!codec_config).then_some(packet.pts),
            codec_config,
            payload_size: packet.payload.len(),
        }
    }
}

pub fn print_packet(packet: &MediaPacket, format: OutputFormat) {
    let out = PacketOutput::from(packet);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "PTS", "SIZE"])
                .add_row(vec![
                    out.kind.to_string(),
                    pts_label(&out),
                    out.payload_size.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "kind={} pts={} size={}",
                out.kind,
                pts_label(&out),
                out.payload_size
            );
        }
    }
}

/// Print any serializable summary as a single JSON line.
pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Print `rows` as a two-column key/value table.
pub fn print_fields(title: &str, rows: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![title.to_uppercase(), String::new()]);
            for (key, value) in rows {
                table.add_row(vec![key.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Json => {
            println!("{title}:");
            for (key, value) in rows {
                println!("  {key:<16} {value}");
            }
        }
    }
}

fn pts_label(out: &PacketOutput) -> String {
    match out.pts {
        Some(pts) => pts.to_string(),
        None => "config".to_string(),
    }
}
