use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use relayhub_frame::{Channel, Message};
use relayhub_hub::HubEvent;
use serde::Serialize;

use crate::exit::{io_error, CliResult};

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
struct MessageOutput<'a> {
    verb: &'a str,
    channel: String,
    channel_kind: &'static str,
    size: u64,
    content: String,
    timestamp: String,
}

/// Print a received message. Reads spooled content into memory.
pub async fn print_message(message: &mut Message, format: OutputFormat) -> CliResult<()> {
    let content = message
        .content
        .to_bytes()
        .await
        .map_err(|err| io_error("reading content failed", err))?;

    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                verb: message.verb.as_str(),
                channel: message.channel.to_string(),
                channel_kind: channel_kind(message.channel),
                size: message.content.len(),
                content: content_preview(&content),
                timestamp: now_unix_seconds(),
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
                .set_header(vec!["VERB", "CHANNEL", "SIZE", "CONTENT"])
                .add_row(vec![
                    message.verb.to_string(),
                    format!("{} ({})", message.channel, channel_kind(message.channel)),
                    message.content.len().to_string(),
                    content_preview(&content),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "verb={} channel={} ({}) size={} content={}",
                message.verb,
                message.channel,
                channel_kind(message.channel),
                message.content.len(),
                content_preview(&content)
            );
        }
        OutputFormat::Raw => print_raw(&content),
    }
    Ok(())
}

#[derive(Serialize)]
struct EventOutput {
    event: &'static str,
    identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    transport: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    timestamp: String,
}

impl EventOutput {
    fn from_event(event: &HubEvent) -> Self {
        let mut out = EventOutput {
            event: "",
            identity: event.identity().to_string(),
            transport: None,
            verb: None,
            channel: None,
            size: None,
            reason: None,
            timestamp: now_unix_seconds(),
        };
        match event {
            HubEvent::Connected { kind, .. } => {
                out.event = "connected";
                out.transport = Some(kind.as_str());
            }
            HubEvent::Received {
                verb, channel, len, ..
            } => {
                out.event = "received";
                out.verb = Some(verb.to_string());
                out.channel = Some(channel.to_string());
                out.size = Some(*len);
            }
            HubEvent::Disconnected { reason, .. } => {
                out.event = "disconnected";
                out.reason = Some(reason.as_str());
            }
        }
        out
    }

    fn detail(&self) -> String {
        let mut parts = Vec::new();
        if let Some(transport) = self.transport {
            parts.push(format!("transport={transport}"));
        }
        if let Some(verb) = &self.verb {
            parts.push(format!("verb={verb}"));
        }
        if let Some(channel) = &self.channel {
            parts.push(format!("channel={channel}"));
        }
        if let Some(size) = self.size {
            parts.push(format!("size={size}"));
        }
        if let Some(reason) = self.reason {
            parts.push(format!("reason={reason}"));
        }
        parts.join(" ")
    }
}

pub fn print_event(event: &HubEvent, format: OutputFormat) {
    let out = EventOutput::from_event(event);
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
                .set_header(vec!["EVENT", "IDENTITY", "DETAIL"])
                .add_row(vec![out.event.to_string(), out.identity.clone(), out.detail()]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("{} identity={} {}", out.event, out.identity, out.detail());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn channel_kind(channel: Channel) -> &'static str {
    if channel.is_loopback() {
        "loopback"
    } else if channel.is_broadcast() {
        "broadcast"
    } else {
        "relative"
    }
}

fn content_preview(content: &[u8]) -> String {
    match std::str::from_utf8(content) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", content.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use relayhub_frame::{BROADCAST, LOOPBACK};
    use relayhub_hub::{DisconnectReason, Identity};

    use super::*;

    #[test]
    fn channel_kinds() {
        assert_eq!(channel_kind(LOOPBACK), "loopback");
        assert_eq!(channel_kind(BROADCAST), "broadcast");
        assert_eq!(channel_kind(Channel::new(0x2a)), "relative");
    }

    #[test]
    fn binary_content_is_summarized() {
        assert_eq!(content_preview(b"hi"), "hi");
        assert_eq!(content_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }

    #[test]
    fn event_json_omits_unrelated_fields() {
        let event = HubEvent::Disconnected {
            identity: Identity::new(1),
            reason: DisconnectReason::RateLimited,
        };
        let json = serde_json::to_value(EventOutput::from_event(&event)).unwrap();
        assert_eq!(json["event"], "disconnected");
        assert_eq!(json["identity"], "0000000000000001");
        assert_eq!(json["reason"], "rate_limited");
        assert!(json.get("verb").is_none());
    }
}
