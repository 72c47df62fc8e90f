use serde::Serialize;
use thiserror::Error;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::attachment::{Attachment, format_size};
use crate::config::Config;
use crate::conversation::Message;
use crate::profile::UserProfile;

const ATTACHMENT_NAME_WIDTH: usize = 40;
const SENDER_WIDTH: usize = 9;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Copy)]
pub enum JsonFormat {
    Pretty,
    Compact,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptOutput<'a> {
    pub messages: &'a [Message],
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorOutput<'a> {
    pub cfg: &'a Config,
    pub api_key_configured: bool,
    pub authenticated: bool,
}

pub fn resolve_json_format(compact: bool) -> JsonFormat {
    if compact {
        JsonFormat::Compact
    } else {
        JsonFormat::Pretty
    }
}

pub fn json_string<T: Serialize + ?Sized>(value: &T, format: JsonFormat) -> Result<String, OutputError> {
    let payload = match format {
        JsonFormat::Pretty => serde_json::to_string_pretty(value)?,
        JsonFormat::Compact => serde_json::to_string(value)?,
    };
    Ok(payload)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T, format: JsonFormat) -> Result<(), OutputError> {
    let payload = json_string(value, format)?;
    println!("{payload}");
    Ok(())
}

pub fn print_transcript(
    messages: &[Message],
    json: bool,
    json_format: JsonFormat,
) -> Result<(), OutputError> {
    if json {
        return print_json(&TranscriptOutput { messages }, json_format);
    }
    for message in messages {
        print_message(message);
    }
    Ok(())
}

pub fn print_message(message: &Message) {
    for line in message_lines(message) {
        println!("{line}");
    }
}

pub fn print_profile(
    profile: &UserProfile,
    json: bool,
    json_format: JsonFormat,
) -> Result<(), OutputError> {
    if json {
        return print_json(profile, json_format);
    }
    for (label, value) in profile_rows(profile) {
        println!("{}  {}", pad_right(label, 6), value);
    }
    Ok(())
}

pub fn print_doctor(output: &DoctorOutput<'_>, json: bool, json_format: JsonFormat) -> Result<(), OutputError> {
    if json {
        return print_json(output, json_format);
    }
    let rows = [
        ("api url", output.cfg.api_url.clone()),
        ("model", output.cfg.model.clone()),
        ("api key", yes_no(output.api_key_configured).to_string()),
        ("data dir", output.cfg.data_dir.display().to_string()),
        ("state", output.cfg.state_path.display().to_string()),
        ("session", if output.authenticated { "logged in" } else { "logged out" }.to_string()),
    ];
    for (label, value) in rows {
        println!("{}  {}", pad_right(label, 8), value);
    }
    Ok(())
}

pub fn attachment_line(attachment: &Attachment) -> String {
    let name = truncate_display(&attachment.display_name, ATTACHMENT_NAME_WIDTH);
    match attachment.size_bytes {
        Some(size) => format!("[{}] {} ({})", attachment.kind.as_str(), name, format_size(size)),
        None => format!("[{}] {}", attachment.kind.as_str(), name),
    }
}

fn message_lines(message: &Message) -> Vec<String> {
    let sender = if message.sent_by_user { "you" } else { "assistant" };
    let gutter = " ".repeat(SENDER_WIDTH);
    let mut body = Vec::new();
    if let Some(attachment) = &message.attachment {
        body.push(attachment_line(attachment));
    }
    if message.is_pending {
        body.push("...".to_string());
    } else if !message.text.is_empty() {
        body.extend(message.text.lines().map(str::to_string));
    }
    if body.is_empty() {
        body.push(String::new());
    }

    body.into_iter()
        .enumerate()
        .map(|(index, line)| {
            let label = if index == 0 {
                pad_right(sender, SENDER_WIDTH)
            } else {
                gutter.clone()
            };
            format!("{label}  {line}").trim_end().to_string()
        })
        .collect()
}

fn profile_rows(profile: &UserProfile) -> [(&'static str, String); 5] {
    let or_dash = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    [
        ("name", profile.name.clone()),
        ("email", profile.email.clone()),
        ("avatar", or_dash(&profile.avatar)),
        ("bio", or_dash(&profile.bio)),
        ("phone", or_dash(&profile.phone)),
    ]
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn display_width(value: &str) -> usize {
    UnicodeWidthStr::width(value)
}

fn truncate_display(value: &str, max_width: usize) -> String {
    if display_width(value) <= max_width {
        return value.to_string();
    }
    let ellipsis = "...";
    let mut width = 0usize;
    let mut output = String::new();
    for ch in value.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width + ellipsis.len() > max_width {
            break;
        }
        output.push(ch);
        width += ch_width;
    }
    output.push_str(ellipsis);
    output
}

fn pad_right(value: &str, width: usize) -> String {
    let mut output = value.to_string();
    let current = display_width(value);
    if current < width {
        output.push_str(&" ".repeat(width - current));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::AttachmentKind;

    #[test]
    fn truncation_respects_wide_characters() {
        assert_eq!(truncate_display("short", 10), "short");
        assert_eq!(truncate_display("abcdefghijkl", 8), "abcde...");
        // Each CJK character is two columns wide.
        assert_eq!(truncate_display("日本語のファイル", 7), "日本...");
    }

    #[test]
    fn attachment_line_includes_formatted_size() {
        let attachment = Attachment {
            uri: "file:///tmp/report.pdf".to_string(),
            kind: AttachmentKind::Pdf,
            display_name: "report.pdf".to_string(),
            size_bytes: Some(1_572_864),
            mime_type: Some("application/pdf".to_string()),
        };
        assert_eq!(attachment_line(&attachment), "[pdf] report.pdf (1.5 MB)");
    }

    #[test]
    fn multi_line_messages_align_under_sender() {
        let message = Message::assistant("1".into(), "first\nsecond".into());
        assert_eq!(message_lines(&message), ["assistant  first", "           second"]);
    }

    #[test]
    fn pending_message_renders_ellipsis() {
        assert_eq!(message_lines(&Message::placeholder()), ["assistant  ..."]);
    }

    #[test]
    fn transcript_json_uses_camel_case() {
        let messages = [Message::user("1".into(), "hi".into(), None)];
        let json = json_string(&TranscriptOutput { messages: &messages }, JsonFormat::Compact).unwrap();
        assert_eq!(
            json,
            r#"{"messages":[{"id":"1","text":"hi","sentByUser":true,"isPending":false}]}"#
        );
    }
}
