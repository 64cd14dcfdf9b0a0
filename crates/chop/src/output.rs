use std::io::{IsTerminal, Write};
use std::net::SocketAddr;

use chop_frame::status_name;
use chop_peer::{unix_millis, Notice};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

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

#[derive(Serialize)]
struct PayloadOutput<'a> {
    event: &'static str,
    remote: String,
    payload_size: usize,
    payload: String,
    encoding: &'a str,
    timestamp: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct NoticeOutput {
    pub event: &'static str,
    pub remote: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_name: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enquiry: Option<String>,
    pub timestamp: i64,
}

impl NoticeOutput {
    pub fn new(remote: SocketAddr, notice: &Notice) -> Self {
        let (status, peer_time, enquiry) = match *notice {
            Notice::Acknowledged(status) | Notice::Refused(status) => (Some(status), None, None),
            Notice::PeerTime(millis) => (None, Some(millis), None),
            Notice::Enquired(kind) => (None, None, Some(format!("{kind:?}").to_lowercase())),
        };
        Self {
            event: "notice",
            remote: remote.to_string(),
            kind: notice.kind(),
            status,
            status_name: status.map(status_name),
            peer_time,
            enquiry,
            timestamp: unix_millis(),
        }
    }

    fn detail(&self) -> String {
        match (self.status_name, self.peer_time, &self.enquiry) {
            (Some(name), _, _) => name.to_string(),
            (_, Some(millis), _) => millis.to_string(),
            (_, _, Some(kind)) => kind.clone(),
            _ => String::new(),
        }
    }
}

#[derive(Serialize)]
struct PingOutput {
    event: &'static str,
    remote: String,
    seq: u64,
    rtt_ms: f64,
    sent_at: i64,
}

pub fn print_payload(remote: SocketAddr, payload: &[u8], format: OutputFormat) {
    let (preview, encoding) = payload_preview(payload);
    match format {
        OutputFormat::Json => {
            let out = PayloadOutput {
                event: "text",
                remote: remote.to_string(),
                payload_size: payload.len(),
                payload: preview,
                encoding,
                timestamp: unix_millis(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "REMOTE", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    "text".to_string(),
                    remote.to_string(),
                    payload.len().to_string(),
                    preview,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "text from {} size={} payload={}",
                remote,
                payload.len(),
                preview
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

pub fn print_notice(remote: SocketAddr, notice: &Notice, format: OutputFormat) {
    let out = NoticeOutput::new(remote, notice);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "REMOTE", "KIND", "DETAIL"])
                .add_row(vec![
                    out.event.to_string(),
                    out.remote.clone(),
                    out.kind.to_string(),
                    out.detail(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("{} from {} {}", out.kind, out.remote, out.detail());
        }
    }
}

pub fn print_ping(remote: SocketAddr, seq: u64, rtt_ms: f64, sent_at: i64, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PingOutput {
                event: "ping",
                remote: remote.to_string(),
                seq,
                rtt_ms,
                sent_at,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "REMOTE", "RTT (ms)", "SENT AT"])
                .add_row(vec![
                    seq.to_string(),
                    remote.to_string(),
                    format!("{rtt_ms:.3}"),
                    sent_at.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("ping {remote} seq={seq} rtt={rtt_ms:.3}ms");
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> (String, &'static str) {
    match std::str::from_utf8(payload) {
        Ok(text) => (text.to_string(), "utf8"),
        Err(_) => (format!("<binary {} bytes>", payload.len()), "binary"),
    }
}

#[cfg(test)]
mod tests {
    use chop_frame::Enquiry;

    use super::*;

    fn remote() -> SocketAddr {
        "127.0.0.1:50001".parse().unwrap()
    }

    #[test]
    fn acknowledgement_names_the_status() {
        let out = NoticeOutput::new(remote(), &Notice::Acknowledged(5));
        assert_eq!(out.kind, "acknowledged");
        assert_eq!(out.status, Some(5));
        assert_eq!(out.status_name, Some("ENQUIRY"));
        assert_eq!(out.detail(), "ENQUIRY");
    }

    #[test]
    fn json_omits_absent_fields() {
        let out = NoticeOutput::new(remote(), &Notice::Enquired(Enquiry::ReturnTime));
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["enquiry"], "returntime");
        assert!(json.get("status").is_none());
        assert!(json.get("peer_time").is_none());
    }

    #[test]
    fn binary_payload_preview() {
        assert_eq!(payload_preview(b"hi"), ("hi".to_string(), "utf8"));
        assert_eq!(
            payload_preview(&[0xff, 0xfe]),
            ("<binary 2 bytes>".to_string(), "binary")
        );
    }
}
