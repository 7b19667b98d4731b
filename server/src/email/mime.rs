use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use lettre::{
    message::{header::ContentType, Mailbox},
    Message,
};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// `Re: ` is added unless the subject already carries it (any case)
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("re:")) {
        trimmed.to_string()
    } else {
        format!("Re: {}", trimmed)
    }
}

/// Minimal single-part reply, base64url encoded without padding, ready for
/// the drafts endpoint
pub fn build_reply_mime(to: &str, subject: &str, body: &str) -> String {
    let message = [
        format!("To: {}", to),
        format!("Subject: {}", reply_subject(subject)),
        "MIME-Version: 1.0".to_string(),
        "Content-Type: text/plain; charset=utf-8".to_string(),
        String::new(),
        body.to_string(),
    ]
    .join("\r\n");

    URL_SAFE_NO_PAD.encode(message)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub references: Option<String>,
}

/// Full RFC 5322 message for the manual draft and send routes
pub fn build_outgoing(email: &OutgoingEmail, from: &str) -> AppResult<String> {
    let from_mailbox: Mailbox = from
        .parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid 'from' address '{}': {}", from, e)))?;

    let mut builder = Message::builder()
        .from(from_mailbox)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_PLAIN);

    for recipient in email.to.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        builder = builder.to(recipient.parse().map_err(|e| {
            AppError::BadRequest(format!("Invalid 'to' address '{}': {}", recipient, e))
        })?);
    }

    if let Some(in_reply_to) = &email.in_reply_to {
        builder = builder.in_reply_to(in_reply_to.clone());
    }

    if let Some(references) = &email.references {
        builder = builder.references(references.clone());
    }

    let message = builder
        .body(email.body.clone())
        .map_err(|e| AppError::BadRequest(format!("Failed to build email: {}", e)))?;

    Ok(URL_SAFE_NO_PAD.encode(message.formatted()))
}
