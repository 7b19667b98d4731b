use base64::{
    alphabet,
    engine::{general_purpose::GeneralPurposeConfig, DecodePaddingMode, GeneralPurpose},
    Engine,
};
use lib_email_clients::gmail::types::{GmailMessage, MessagePart};
use regex::Regex;

/// Gmail emits unpadded base64url but some clients pad it
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const HTML_WRAP_WIDTH: usize = 400;

lazy_static::lazy_static!(
    static ref RE_ANGLE_ADDRESS: Regex = Regex::new(r"<([^<>]+)>").unwrap();
);

/// The parts of a fetched message the classifier and drafter look at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDetail {
    pub id: String,
    pub thread_id: Option<String>,
    pub from: String,
    pub subject: String,
    pub snippet: String,
    /// Plain text body, truncated to the configured character limit
    pub body: String,
    pub label_ids: Vec<String>,
}

impl MessageDetail {
    pub fn from_gmail_message(msg: GmailMessage, body_char_limit: usize) -> Self {
        let from = msg.header("From").unwrap_or_default().to_string();
        let subject = msg.header("Subject").unwrap_or_default().to_string();
        let body = msg
            .payload
            .as_ref()
            .and_then(extract_body)
            .map(|b| truncate_chars(&b, body_char_limit))
            .unwrap_or_default();

        MessageDetail {
            id: msg.id,
            thread_id: msg.thread_id,
            from,
            subject,
            snippet: msg.snippet.unwrap_or_default(),
            body,
            label_ids: msg.label_ids,
        }
    }

    /// Body when there is one, otherwise the snippet
    pub fn content(&self) -> &str {
        if self.body.trim().is_empty() {
            &self.snippet
        } else {
            &self.body
        }
    }

    pub fn sender_address(&self) -> String {
        extract_email_address(&self.from)
    }

    pub fn is_sent_by(&self, email: &str) -> bool {
        self.sender_address().eq_ignore_ascii_case(email.trim())
    }
}

/// `Ann <ann@example.com>` -> `ann@example.com`. Values without angle
/// brackets are returned trimmed.
pub fn extract_email_address(from: &str) -> String {
    RE_ANGLE_ADDRESS
        .captures(from)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| from.trim().to_string())
}

fn decode_body_data(data: &str) -> Option<String> {
    match BODY_ENGINE.decode(data.trim()) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            tracing::warn!("Could not decode message body: {}", e);
            None
        }
    }
}

fn is_html(part: &MessagePart) -> bool {
    part.mime_type
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("text/html"))
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), HTML_WRAP_WIDTH)
}

/// Top level body first, then the first text/plain part found depth-first,
/// then the first text/html part rendered to text
fn extract_body(payload: &MessagePart) -> Option<String> {
    if let Some(data) = payload.body_data() {
        let decoded = decode_body_data(data)?;
        return Some(if is_html(payload) {
            html_to_text(&decoded)
        } else {
            decoded
        });
    }

    find_part(payload, "text/plain")
        .and_then(|p| p.body_data())
        .and_then(decode_body_data)
        .or_else(|| {
            find_part(payload, "text/html")
                .and_then(|p| p.body_data())
                .and_then(decode_body_data)
                .map(|html| html_to_text(&html))
        })
}

fn find_part<'a>(part: &'a MessagePart, mime_type: &str) -> Option<&'a MessagePart> {
    for child in &part.parts {
        let matches = child
            .mime_type
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case(mime_type));
        if matches && child.body_data().is_some() {
            return Some(child);
        }
        if let Some(found) = find_part(child, mime_type) {
            return Some(found);
        }
    }
    None
}

fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::json;

    fn encode(s: &str) -> String {
        URL_SAFE_NO_PAD.encode(s)
    }

    fn message(payload: serde_json::Value) -> GmailMessage {
        serde_json::from_value(json!({
            "id": "msg1",
            "threadId": "t1",
            "labelIds": ["INBOX"],
            "snippet": "Quick question about the report",
            "payload": payload
        }))
        .unwrap()
    }

    #[test]
    fn test_top_level_body() {
        let msg = message(json!({
            "mimeType": "text/plain",
            "headers": [
                {"name": "From", "value": "Bob <bob@x.com>"},
                {"name": "Subject", "value": "Report"}
            ],
            "body": {"data": encode("Can you send the report?")}
        }));
        let detail = MessageDetail::from_gmail_message(msg, 1000);
        assert_eq!(detail.from, "Bob <bob@x.com>");
        assert_eq!(detail.subject, "Report");
        assert_eq!(detail.body, "Can you send the report?");
        assert_eq!(detail.thread_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_nested_plain_part_wins_over_html() {
        let msg = message(json!({
            "mimeType": "multipart/mixed",
            "headers": [],
            "body": {"size": 0},
            "parts": [{
                "mimeType": "multipart/alternative",
                "parts": [
                    {"mimeType": "text/html", "body": {"data": encode("<p>html version</p>")}},
                    {"mimeType": "text/plain", "body": {"data": encode("plain version")}}
                ]
            }]
        }));
        let detail = MessageDetail::from_gmail_message(msg, 1000);
        assert_eq!(detail.body, "plain version");
    }

    #[test]
    fn test_html_only_is_rendered() {
        let msg = message(json!({
            "mimeType": "multipart/alternative",
            "parts": [
                {"mimeType": "text/html", "body": {"data": encode("<p>Hello <b>there</b></p>")}}
            ]
        }));
        let detail = MessageDetail::from_gmail_message(msg, 1000);
        assert!(detail.body.contains("Hello"));
        assert!(!detail.body.contains("<p>"));
    }

    #[test]
    fn test_body_is_truncated_by_chars() {
        let text = "é".repeat(20);
        let msg = message(json!({"mimeType": "text/plain", "body": {"data": encode(&text)}}));
        let detail = MessageDetail::from_gmail_message(msg, 5);
        assert_eq!(detail.body, "ééééé");
    }

    #[test]
    fn test_padded_body_decodes() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode("ab");
        assert!(padded.ends_with('='));
        assert_eq!(decode_body_data(&padded).as_deref(), Some("ab"));
    }

    #[test]
    fn test_missing_body_falls_back_to_snippet() {
        let msg = message(json!({"mimeType": "text/plain", "headers": []}));
        let detail = MessageDetail::from_gmail_message(msg, 1000);
        assert_eq!(detail.body, "");
        assert_eq!(detail.content(), "Quick question about the report");
        assert_eq!(detail.from, "");
    }

    #[test]
    fn test_extract_email_address() {
        assert_eq!(extract_email_address("Ann Lee <ann@x.com>"), "ann@x.com");
        assert_eq!(extract_email_address("  ann@x.com "), "ann@x.com");
        assert_eq!(extract_email_address(""), "");
    }

    #[test]
    fn test_self_sent_is_case_insensitive() {
        let detail = MessageDetail {
            from: "Me <ME@Example.com>".to_string(),
            ..Default::default()
        };
        assert!(detail.is_sent_by("me@example.com"));
        assert!(!detail.is_sent_by("you@example.com"));
    }
}
