use indoc::formatdoc;

use super::TextGenerator;
use crate::{email::message_detail::MessageDetail, model::settings::DraftSettings};

pub fn draft_prompt(email: &MessageDetail, settings: &DraftSettings) -> String {
    let preferences =
        serde_json::to_string_pretty(settings).unwrap_or_else(|_| "{}".to_string());

    formatdoc! {"
        Generate a professional email reply.

        USER PREFERENCES (apply these):
        {preferences}

        Email to reply to:
        From: {from}
        Subject: {subject}
        Content: {content}

        Write a reply keeping user preferences in mind.
        Return ONLY the reply text.",
        from = email.from,
        subject = email.subject,
        content = email.content(),
    }
}

/// Reply body for `email`, trimmed. `None` when the model answered with
/// nothing usable.
pub async fn generate_reply(
    generator: &dyn TextGenerator,
    email: &MessageDetail,
    settings: &DraftSettings,
    temperature: f32,
) -> anyhow::Result<Option<String>> {
    let prompt = draft_prompt(email, settings);
    let text = generator.generate(&prompt, temperature).await?;
    let reply = text.trim();

    Ok((!reply.is_empty()).then(|| reply.to_string()))
}
