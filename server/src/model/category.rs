use lib_email_clients::gmail::label_colors::PaletteColor;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use super::settings::{CustomizationRecord, LabelsRecord};

/// Built-in classification buckets
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailCategory {
    ToRespond,
    Fyi,
    Comment,
    Notification,
    MeetingUpdate,
    AwaitingReply,
    Actioned,
    Marketing,
}

/// Assigned whenever the model output is missing or unusable
pub const DEFAULT_CATEGORY: EmailCategory = EmailCategory::Fyi;

impl EmailCategory {
    /// Gmail label display name
    pub fn label(&self) -> &'static str {
        match self {
            EmailCategory::ToRespond => "To Respond",
            EmailCategory::Fyi => "FYI",
            EmailCategory::Comment => "Comment",
            EmailCategory::Notification => "Notification",
            EmailCategory::MeetingUpdate => "Meeting Update",
            EmailCategory::AwaitingReply => "Awaiting Reply",
            EmailCategory::Actioned => "Actioned",
            EmailCategory::Marketing => "Marketing",
        }
    }

    pub fn color(&self) -> PaletteColor {
        match self {
            EmailCategory::ToRespond => PaletteColor::Red,
            EmailCategory::Fyi => PaletteColor::Orange,
            EmailCategory::Comment => PaletteColor::Yellow,
            EmailCategory::Notification => PaletteColor::Green,
            EmailCategory::MeetingUpdate => PaletteColor::Blue,
            EmailCategory::AwaitingReply => PaletteColor::Purple,
            EmailCategory::Actioned => PaletteColor::Gray,
            EmailCategory::Marketing => PaletteColor::Pink,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EmailCategory::ToRespond => "Emails you need to respond to",
            EmailCategory::Fyi => "Emails that don't require your response, but are important",
            EmailCategory::Comment => "Team chats in tools like Google Docs or Microsoft Office",
            EmailCategory::Notification => "Automated updates from tools you use",
            EmailCategory::MeetingUpdate => "Calendar updates from Zoom, Google Meet, etc",
            EmailCategory::AwaitingReply => "Emails you're expecting a reply to",
            EmailCategory::Actioned => "Email threads that have been resolved",
            EmailCategory::Marketing => "Marketing or cold emails",
        }
    }
}

/// Key under which a user-created label is stored: lowercased, whitespace
/// runs collapsed to `_`
pub fn custom_label_key(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDefinition {
    pub key: String,
    pub label: String,
    pub color: String,
    pub description: String,
    pub is_custom: bool,
}

impl From<EmailCategory> for CategoryDefinition {
    fn from(category: EmailCategory) -> Self {
        CategoryDefinition {
            key: category.to_string(),
            label: category.label().to_string(),
            color: category.color().to_string(),
            description: category.description().to_string(),
            is_custom: false,
        }
    }
}

/// The keys the classifier may answer with for one user
#[derive(Debug, Clone)]
pub struct CategorySet {
    definitions: Vec<CategoryDefinition>,
}

impl CategorySet {
    pub fn builtin() -> Self {
        Self {
            definitions: EmailCategory::iter().map(CategoryDefinition::from).collect(),
        }
    }

    /// Built-ins plus the user's enabled custom labels
    pub fn for_user(labels: &LabelsRecord, customization: &CustomizationRecord) -> Self {
        let mut set = Self::builtin();
        for (key, label) in labels.iter().filter(|(_, l)| l.is_custom && l.enabled) {
            if set.contains(key) {
                continue;
            }
            let description = customization
                .get(key)
                .and_then(|rules| rules.custom_instructions.clone())
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| format!("Custom category: {}", label.name));
            set.definitions.push(CategoryDefinition {
                key: key.clone(),
                label: label.name.clone(),
                color: label.color.clone(),
                description,
                is_custom: true,
            });
        }
        set
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.definitions.iter().any(|d| d.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&CategoryDefinition> {
        self.definitions.iter().find(|d| d.key == key)
    }

    /// Maps a raw model answer onto a known key. Exact matches win, then a
    /// case-insensitive match on the key.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        let raw = raw.trim().trim_matches('"');
        self.definitions
            .iter()
            .find(|d| d.key == raw)
            .or_else(|| {
                self.definitions
                    .iter()
                    .find(|d| d.key.eq_ignore_ascii_case(raw))
            })
            .map(|d| d.key.as_str())
    }

    pub fn default_key(&self) -> &'static str {
        DEFAULT_CATEGORY.into()
    }
}
