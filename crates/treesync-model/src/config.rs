//! Shared display configuration
//!
//! [`SharedConfig`] holds the fields that must be identical on every content node
//! produced for one selection key. The set of fields is fixed ([`ConfigField`])
//! and disjoint from anything that affects list membership or order, so it can
//! be rewritten in place without touching structure.
//!
//! Edits coming from an operator are parsed leniently: a field that fails to
//! parse is treated as unset and falls back to its default, the rest of the
//! record is still accepted.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Reference to an external tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagRef(pub u64);

/// Fields eligible for in-place propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    ShowTitle,
    ShowSummary,
    ShowMedia,
    ShowBadges,
    Heading,
    CallToAction,
    TagRefs,
    Translations,
    Columns,
}

impl ConfigField {
    /// Every propagatable field
    pub const ALL: [ConfigField; 9] = [
        ConfigField::ShowTitle,
        ConfigField::ShowSummary,
        ConfigField::ShowMedia,
        ConfigField::ShowBadges,
        ConfigField::Heading,
        ConfigField::CallToAction,
        ConfigField::TagRefs,
        ConfigField::Translations,
        ConfigField::Columns,
    ];

    /// Wire name of the field
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ShowTitle => "show_title",
            Self::ShowSummary => "show_summary",
            Self::ShowMedia => "show_media",
            Self::ShowBadges => "show_badges",
            Self::Heading => "heading",
            Self::CallToAction => "call_to_action",
            Self::TagRefs => "tag_refs",
            Self::Translations => "translations",
            Self::Columns => "columns",
        }
    }
}

/// Display/behavior configuration replicated across content nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedConfig {
    pub show_title: bool,
    pub show_summary: bool,
    pub show_media: bool,
    pub show_badges: bool,
    pub heading: Option<String>,
    pub call_to_action: Option<String>,
    pub tag_refs: Vec<TagRef>,
    /// Locale -> translated heading
    pub translations: BTreeMap<String, String>,
    pub columns: Option<u32>,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            show_title: true,
            show_summary: true,
            show_media: true,
            show_badges: false,
            heading: None,
            call_to_action: None,
            tag_refs: Vec::new(),
            translations: BTreeMap::new(),
            columns: None,
        }
    }
}

impl SharedConfig {
    /// With heading text
    #[inline]
    #[must_use]
    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    /// With column count
    #[inline]
    #[must_use]
    pub fn with_columns(mut self, columns: u32) -> Self {
        self.columns = Some(columns);
        self
    }

    /// With tag references
    #[inline]
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = u64>) -> Self {
        self.tag_refs = tags.into_iter().map(TagRef).collect();
        self
    }

    /// With one translation
    #[inline]
    #[must_use]
    pub fn with_translation(mut self, locale: impl Into<String>, text: impl Into<String>) -> Self {
        self.translations.insert(locale.into(), text.into());
        self
    }

    /// Parse an operator edit, field by field.
    ///
    /// Unknown keys are ignored. A known key whose value does not parse is
    /// treated as unset; the field keeps its default and a warning is logged.
    #[must_use]
    pub fn from_json_lenient(value: &JsonValue) -> Self {
        let mut config = Self::default();
        let Some(obj) = value.as_object() else {
            tracing::warn!("shared config is not an object; using defaults");
            return config;
        };

        for field in ConfigField::ALL {
            let Some(raw) = obj.get(field.name()) else {
                continue;
            };
            if raw.is_null() {
                continue;
            }
            if !config.apply_field(field, raw) {
                tracing::warn!(
                    field = field.name(),
                    value = %raw,
                    "config field failed to parse; treating as unset"
                );
            }
        }
        config
    }

    /// Returns false if `raw` could not be interpreted for `field`
    fn apply_field(&mut self, field: ConfigField, raw: &JsonValue) -> bool {
        match field {
            ConfigField::ShowTitle => parse_flag(raw).map(|v| self.show_title = v).is_some(),
            ConfigField::ShowSummary => parse_flag(raw).map(|v| self.show_summary = v).is_some(),
            ConfigField::ShowMedia => parse_flag(raw).map(|v| self.show_media = v).is_some(),
            ConfigField::ShowBadges => parse_flag(raw).map(|v| self.show_badges = v).is_some(),
            ConfigField::Heading => parse_text(raw).map(|v| self.heading = v).is_some(),
            ConfigField::CallToAction => {
                parse_text(raw).map(|v| self.call_to_action = v).is_some()
            }
            ConfigField::TagRefs => parse_tags(raw).map(|v| self.tag_refs = v).is_some(),
            ConfigField::Translations => {
                parse_translations(raw).map(|v| self.translations = v).is_some()
            }
            ConfigField::Columns => parse_count(raw).map(|v| self.columns = Some(v)).is_some(),
        }
    }
}

fn parse_flag(raw: &JsonValue) -> Option<bool> {
    match raw {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Number(n) => n.as_u64().and_then(|n| match n {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Empty text counts as "no text"
fn parse_text(raw: &JsonValue) -> Option<Option<String>> {
    match raw {
        JsonValue::String(s) if s.trim().is_empty() => Some(None),
        JsonValue::String(s) => Some(Some(s.clone())),
        _ => None,
    }
}

fn parse_count(raw: &JsonValue) -> Option<u32> {
    match raw {
        JsonValue::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        JsonValue::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn parse_tags(raw: &JsonValue) -> Option<Vec<TagRef>> {
    raw.as_array()?
        .iter()
        .map(|v| match v {
            JsonValue::Number(n) => n.as_u64().map(TagRef),
            JsonValue::String(s) => s.trim().parse::<u64>().ok().map(TagRef),
            _ => None,
        })
        .collect()
}

fn parse_translations(raw: &JsonValue) -> Option<BTreeMap<String, String>> {
    raw.as_object()?
        .iter()
        .map(|(locale, text)| text.as_str().map(|t| (locale.clone(), t.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_parse_accepts_well_formed_record() {
        let config = SharedConfig::from_json_lenient(&json!({
            "show_title": false,
            "show_badges": "yes",
            "heading": "Chef's picks",
            "tag_refs": [1, "2"],
            "translations": {"fr": "Choix du chef"},
            "columns": "3",
        }));
        assert!(!config.show_title);
        assert!(config.show_badges);
        assert_eq!(config.heading.as_deref(), Some("Chef's picks"));
        assert_eq!(config.tag_refs, vec![TagRef(1), TagRef(2)]);
        assert_eq!(config.translations.get("fr").map(String::as_str), Some("Choix du chef"));
        assert_eq!(config.columns, Some(3));
    }

    #[test]
    fn bad_field_falls_back_to_default() {
        let config = SharedConfig::from_json_lenient(&json!({
            "columns": "three",
            "show_media": "maybe",
            "heading": "Kept",
        }));
        assert_eq!(config.columns, None);
        assert!(config.show_media);
        assert_eq!(config.heading.as_deref(), Some("Kept"));
    }

    #[test]
    fn non_object_yields_defaults() {
        assert_eq!(SharedConfig::from_json_lenient(&json!(42)), SharedConfig::default());
    }

    #[test]
    fn bad_tag_list_is_unset_as_a_whole() {
        let config = SharedConfig::from_json_lenient(&json!({"tag_refs": [1, "x"]}));
        assert!(config.tag_refs.is_empty());
    }

    #[test]
    fn empty_heading_is_none() {
        let config = SharedConfig::from_json_lenient(&json!({"heading": "  "}));
        assert_eq!(config.heading, None);
    }

    #[test]
    fn field_names_are_unique() {
        let names: std::collections::HashSet<_> =
            ConfigField::ALL.iter().map(|f| f.name()).collect();
        assert_eq!(names.len(), ConfigField::ALL.len());
        assert!(!names.contains("item_id"));
    }
}
