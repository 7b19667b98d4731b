use indexmap::IndexMap;
use indoc::formatdoc;
use regex::Regex;
use serde_json::{Map, Value};

use super::TextGenerator;
use crate::{
    email::message_detail::MessageDetail,
    model::{category::CategorySet, settings::CustomizationRecord},
};

lazy_static::lazy_static!(
    // Greedy: from the first `{` to the last `}`
    static ref RE_JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
);

/// Message id to category key, in input order
pub type Classification = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSummary {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
}

impl From<&MessageDetail> for EmailSummary {
    fn from(detail: &MessageDetail) -> Self {
        EmailSummary {
            id: detail.id.clone(),
            from: detail.from.clone(),
            subject: detail.subject.clone(),
            snippet: detail.snippet.clone(),
        }
    }
}

fn preferences_block(customization: &CustomizationRecord) -> String {
    if customization.is_empty() {
        return String::new();
    }
    let rules = serde_json::to_string(customization).unwrap_or_else(|_| "{}".to_string());
    formatdoc! {"
        USER PREFERENCES (keep these in mind):
        - Label Customization: {rules}
        "}
}

pub fn classification_prompt(
    emails: &[EmailSummary],
    categories: &CategorySet,
    customization: &CustomizationRecord,
) -> String {
    let category_descriptions = categories
        .iter()
        .map(|c| format!("{}: {}", c.key, c.description))
        .collect::<Vec<_>>()
        .join("\n");

    let emails_text = emails
        .iter()
        .enumerate()
        .map(|(idx, email)| {
            format!(
                "Email {}:\nID: {}\nFrom: {}\nSubject: {}\nPreview: {}\n---",
                idx + 1,
                email.id,
                email.from,
                email.subject,
                email.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    formatdoc! {r#"
        You are an email classification assistant.

        {preferences}
        Categorize each email into ONE of these categories:
        {category_descriptions}

        Analyze these emails and respond ONLY with a JSON object mapping email IDs to categories.

        Example response format:
        {{
          "email-id-1": "TO_RESPOND",
          "email-id-2": "MARKETING",
          "email-id-3": "FYI"
        }}

        Emails to categorize:
        {emails_text}

        Return ONLY the JSON object, no other text."#,
        preferences = preferences_block(customization),
    }
}

fn extract_object(text: &str) -> Option<Map<String, Value>> {
    RE_JSON_OBJECT
        .find(text)
        .and_then(|m| serde_json::from_str::<Map<String, Value>>(m.as_str()).ok())
        .or_else(|| serde_json::from_str::<Map<String, Value>>(text.trim()).ok())
}

/// Every input id receives a known key. Unusable output maps to the default.
pub fn parse_classification(text: &str, ids: &[String], categories: &CategorySet) -> Classification {
    let default = categories.default_key();
    let Some(object) = extract_object(text) else {
        tracing::warn!(
            "Could not parse classification, defaulting {} email(s) to {}",
            ids.len(),
            default
        );
        return fallback(ids, categories);
    };

    ids.iter()
        .map(|id| {
            let raw = object.get(id).and_then(Value::as_str);
            let key = match raw.and_then(|r| categories.resolve(r)) {
                Some(key) => key,
                None => {
                    tracing::warn!(
                        "Email {} got unusable category {:?}, using {}",
                        id,
                        raw,
                        default
                    );
                    default
                }
            };
            (id.clone(), key.to_string())
        })
        .collect()
}

pub fn fallback(ids: &[String], categories: &CategorySet) -> Classification {
    ids.iter()
        .map(|id| (id.clone(), categories.default_key().to_string()))
        .collect()
}

/// An empty batch never reaches the model. A failed model call classifies
/// the whole batch with the default category.
pub async fn classify_batch(
    generator: &dyn TextGenerator,
    emails: &[EmailSummary],
    categories: &CategorySet,
    customization: &CustomizationRecord,
    temperature: f32,
) -> Classification {
    if emails.is_empty() {
        return Classification::new();
    }

    let ids = emails.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
    let prompt = classification_prompt(emails, categories, customization);

    match generator.generate(&prompt, temperature).await {
        Ok(text) => parse_classification(&text, &ids, categories),
        Err(e) => {
            tracing::error!("Classification failed, falling back to default: {:?}", e);
            fallback(&ids, categories)
        }
    }
}
