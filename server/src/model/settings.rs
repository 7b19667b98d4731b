use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::category::{CategoryDefinition, CategorySet};

/// Provider-side label a category is mapped to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelConfig {
    pub id: String,
    pub name: String,
    pub color: String,
    pub enabled: bool,
    pub is_custom: bool,
}

pub type LabelsRecord = IndexMap<String, LabelConfig>;

/// Per-category refinement passed to the classifier as guidance. None of
/// these lists are enforced in code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationRules {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_senders: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_senders: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_subject_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_subject_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}

impl CustomizationRules {
    pub fn is_empty(&self) -> bool {
        self == &CustomizationRules::default()
    }
}

pub type CustomizationRecord = IndexMap<String, CustomizationRules>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DraftTone {
    #[default]
    Professional,
    Friendly,
    Casual,
    Formal,
    Direct,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DraftLength {
    Short,
    #[default]
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    Direct,
    Empathetic,
    #[default]
    Detailed,
}

pub const MIN_FORMALITY: u8 = 1;
pub const MAX_FORMALITY: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftSettings {
    pub draft_tone: DraftTone,
    pub draft_length: DraftLength,
    pub include_greeting: bool,
    pub include_closing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_template: Option<String>,
    pub response_style: ResponseStyle,
    pub use_emojis: bool,
    pub formality_level: u8,
    pub avoid_words: Vec<String>,
    pub preferred_phrases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}

impl Default for DraftSettings {
    fn default() -> Self {
        Self {
            draft_tone: DraftTone::Professional,
            draft_length: DraftLength::Medium,
            include_greeting: true,
            include_closing: true,
            signature_template: None,
            response_style: ResponseStyle::Detailed,
            use_emojis: false,
            formality_level: 3,
            avoid_words: vec![],
            preferred_phrases: vec![],
            custom_instructions: None,
        }
    }
}

impl DraftSettings {
    /// Reads a stored JSON blob, filling absent fields with defaults. A blob
    /// that cannot be read at all yields the defaults.
    pub fn from_stored(value: &serde_json::Value) -> Self {
        if value.is_null() {
            return Self::default();
        }
        match serde_json::from_value::<DraftSettings>(value.clone()) {
            Ok(settings) => settings.normalized(),
            Err(e) => {
                tracing::warn!("Stored draft settings are unreadable, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn normalized(mut self) -> Self {
        self.formality_level = self.formality_level.clamp(MIN_FORMALITY, MAX_FORMALITY);
        self.avoid_words.retain(|w| !w.trim().is_empty());
        self.preferred_phrases.retain(|p| !p.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserSettings {
    pub auto_categorize_enabled: bool,
    pub auto_label_enabled: bool,
    pub auto_draft_enabled: bool,
    pub labels: LabelsRecord,
    pub label_customization: CustomizationRecord,
    pub draft_settings: DraftSettings,
    pub draft_language: Option<String>,
    pub draft_tone: Option<String>,
    pub custom_instructions: Option<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            auto_categorize_enabled: true,
            auto_label_enabled: true,
            auto_draft_enabled: true,
            labels: LabelsRecord::new(),
            label_customization: CustomizationRecord::new(),
            draft_settings: DraftSettings::default(),
            draft_language: None,
            draft_tone: None,
            custom_instructions: None,
        }
    }
}

impl UserSettings {
    pub fn categories(&self) -> CategorySet {
        CategorySet::for_user(&self.labels, &self.label_customization)
    }

    /// Customization entries for the categories the classifier can pick
    pub fn active_customization(&self, categories: &CategorySet) -> CustomizationRecord {
        self.label_customization
            .iter()
            .filter(|(key, rules)| categories.contains(key) && !rules.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Draft settings with the account-level language, tone and
    /// instructions folded in
    pub fn effective_draft_settings(&self) -> DraftSettings {
        let mut settings = self.draft_settings.clone();
        if let Some(tone) = self.draft_tone.as_deref().and_then(|t| t.parse::<DraftTone>().ok()) {
            settings.draft_tone = tone;
        }
        let mut instructions = vec![];
        if let Some(language) = self.draft_language.as_deref().filter(|l| !l.trim().is_empty()) {
            instructions.push(format!("Write the reply in {}.", language.trim()));
        }
        if let Some(extra) = self
            .custom_instructions
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            instructions.push(extra.trim().to_string());
        }
        if let Some(own) = settings.custom_instructions.take().filter(|s| !s.trim().is_empty()) {
            instructions.push(own);
        }
        settings.custom_instructions = (!instructions.is_empty()).then(|| instructions.join("\n"));
        settings
    }
}

/// Label mapping for a category that has been provisioned in Gmail
pub fn label_config_for(definition: &CategoryDefinition, id: String, enabled: bool) -> LabelConfig {
    LabelConfig {
        id,
        name: definition.label.clone(),
        color: definition.color.clone(),
        enabled,
        is_custom: definition.is_custom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_draft_settings_defaults_merge() {
        let settings = DraftSettings::from_stored(&json!({"draftTone": "friendly", "useEmojis": true}));
        assert_eq!(settings.draft_tone, DraftTone::Friendly);
        assert!(settings.use_emojis);
        assert_eq!(settings.draft_length, DraftLength::Medium);
        assert_eq!(settings.response_style, ResponseStyle::Detailed);
        assert_eq!(settings.formality_level, 3);
        assert!(settings.include_greeting && settings.include_closing);
    }

    #[test]
    fn test_draft_settings_null_and_garbage() {
        assert_eq!(DraftSettings::from_stored(&json!(null)), DraftSettings::default());
        assert_eq!(
            DraftSettings::from_stored(&json!({"draftTone": "sarcastic"})),
            DraftSettings::default()
        );
    }

    #[test]
    fn test_formality_is_clamped() {
        let settings = DraftSettings::from_stored(&json!({"formalityLevel": 9}));
        assert_eq!(settings.formality_level, 5);
        let settings = DraftSettings::from_stored(&json!({"formalityLevel": 0}));
        assert_eq!(settings.formality_level, 1);
    }

    #[test]
    fn test_draft_settings_serialize_camel_case() {
        let value = serde_json::to_value(DraftSettings::default()).unwrap();
        assert_eq!(value["draftTone"], "professional");
        assert_eq!(value["draftLength"], "medium");
        assert_eq!(value["responseStyle"], "detailed");
        assert_eq!(value["formalityLevel"], 3);
        assert!(value.get("signatureTemplate").is_none());
    }

    #[test]
    fn test_effective_draft_settings() {
        let settings = UserSettings {
            draft_tone: Some("casual".to_string()),
            draft_language: Some("Spanish".to_string()),
            custom_instructions: Some("Sign as Ann".to_string()),
            ..Default::default()
        };
        let effective = settings.effective_draft_settings();
        assert_eq!(effective.draft_tone, DraftTone::Casual);
        assert_eq!(
            effective.custom_instructions.as_deref(),
            Some("Write the reply in Spanish.\nSign as Ann")
        );
    }

    #[test]
    fn test_customization_rules_skip_empty_fields() {
        let rules = CustomizationRules {
            include_domains: vec!["acme.com".to_string()],
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&rules).unwrap(),
            json!({"includeDomains": ["acme.com"]})
        );
        assert!(CustomizationRules::default().is_empty());
    }
}
