use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;

/// Plural rule name ("one", "other", ...) to text.
pub type Translations = BTreeMap<String, String>;

/// Rule every entry has; plural entries add more.
pub const DEFAULT_RULE: &str = "other";

/// Presentation class of an entry. Derived on every call, never stored.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    Fuzzy,
    Untranslated,
    Translated,
}

impl Flag {
    pub fn as_str(self) -> &'static str {
        match self {
            Flag::Fuzzy => "fuzzy",
            Flag::Untranslated => "untranslated",
            Flag::Translated => "translated",
        }
    }
}

/// Server message attached to an entry after a save.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Annotation {
    /// Saved, but the server had something to say.
    Warning(String),
    /// Rejected; the entry stays fuzzy.
    Error(String),
}

impl Annotation {
    pub fn message(&self) -> &str {
        match self {
            Annotation::Warning(m) | Annotation::Error(m) => m,
        }
    }
}

/// What a `translate` call did, so the owning set can keep its counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateEffect {
    Unchanged,
    Changed,
    /// First edit since the last save. `was_untranslated` refers to the
    /// saved state the entry leaves.
    FirstModification { was_untranslated: bool },
}

impl TranslateEffect {
    pub fn changed(self) -> bool {
        !matches!(self, TranslateEffect::Unchanged)
    }
}

/// Bucket movement caused by a successful save reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveTransition {
    pub pre_untranslated: bool,
    pub post_untranslated: bool,
    pub was_modified: bool,
    pub still_modified: bool,
}

/// True if there are no slots or any slot is empty.
pub fn is_blank(strings: &Translations) -> bool {
    strings.is_empty() || strings.values().any(|s| s.is_empty())
}

/// One translatable unit.
#[derive(Debug, Serialize, Clone)]
pub struct TranslationString {
    pub id: u64,

    pub source_entity: String,

    #[serde(skip_serializing_if = "Value::is_null")]
    pub context: Value,

    #[serde(skip_serializing_if = "Value::is_null")]
    pub occurrence: Value,

    source_strings: Translations,

    translated_strings: Translations,

    /// Last state the server accepted.
    previous: Translations,

    /// State at page load, restored by undo.
    #[serde(skip)]
    load_default: Translations,

    modified: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    annotation: Option<Annotation>,
}

impl TranslationString {
    /// Every source rule gets a translation slot, empty if the server sent none.
    pub fn new(
        id: u64,
        source_entity: String,
        source_strings: Translations,
        mut translated_strings: Translations,
        context: Value,
        occurrence: Value,
    ) -> Self {
        for rule in source_strings.keys() {
            translated_strings.entry(rule.clone()).or_default();
        }
        if translated_strings.is_empty() {
            translated_strings.insert(DEFAULT_RULE.to_string(), String::new());
        }

        Self {
            id,
            source_entity,
            context,
            occurrence,
            previous: translated_strings.clone(),
            load_default: translated_strings.clone(),
            source_strings,
            translated_strings,
            modified: false,
            annotation: None,
        }
    }

    pub fn source_strings(&self) -> &Translations {
        &self.source_strings
    }

    pub fn translated_strings(&self) -> &Translations {
        &self.translated_strings
    }

    pub fn previous(&self) -> &Translations {
        &self.previous
    }

    pub fn load_default(&self) -> &Translations {
        &self.load_default
    }

    pub fn annotation(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn is_untranslated(&self) -> bool {
        is_blank(&self.translated_strings)
    }

    pub fn is_translated(&self) -> bool {
        !self.is_untranslated()
    }

    pub fn flag(&self) -> Flag {
        if self.modified {
            Flag::Fuzzy
        } else if self.is_untranslated() {
            Flag::Untranslated
        } else {
            Flag::Translated
        }
    }

    pub fn flag_string(&self) -> &'static str {
        self.flag().as_str()
    }

    pub fn rules(&self) -> impl Iterator<Item = &str> {
        self.translated_strings.keys().map(String::as_str)
    }

    /// Source text for a rule, falling back to the default rule.
    pub fn source_for(&self, rule: &str) -> Option<&str> {
        self.source_strings
            .get(rule)
            .or_else(|| self.source_strings.get(DEFAULT_RULE))
            .map(String::as_str)
    }

    /// Auto-save is allowed when plural slots are all filled or all empty.
    pub fn slots_consistent(&self) -> bool {
        let filled = self
            .translated_strings
            .values()
            .filter(|s| !s.is_empty())
            .count();
        filled == 0 || filled == self.translated_strings.len()
    }

    pub fn translate(&mut self, rule: &str, text: &str) -> Result<TranslateEffect, ModelError> {
        let slot = self
            .translated_strings
            .get_mut(rule)
            .ok_or_else(|| ModelError::UnknownRule {
                id: self.id,
                rule: rule.to_string(),
            })?;

        if slot == text {
            return Ok(TranslateEffect::Unchanged);
        }

        slot.clear();
        slot.push_str(text);

        if self.modified {
            return Ok(TranslateEffect::Changed);
        }

        self.modified = true;
        Ok(TranslateEffect::FirstModification {
            was_untranslated: is_blank(&self.previous),
        })
    }

    /// Applies an accepted save of `snapshot`. `modified` is only cleared if
    /// nothing was edited after the snapshot was taken.
    pub(crate) fn mark_saved(
        &mut self,
        snapshot: &Translations,
        warning: Option<String>,
    ) -> SaveTransition {
        let pre_untranslated = is_blank(&self.previous);
        let was_modified = self.modified;

        self.previous = snapshot.clone();
        if self.translated_strings == *snapshot {
            self.modified = false;
        }
        self.annotation = warning.map(Annotation::Warning);

        SaveTransition {
            pre_untranslated,
            post_untranslated: is_blank(&self.previous),
            was_modified,
            still_modified: self.modified,
        }
    }

    /// Attaches the server's refusal. `modified` is left as it is: a
    /// rejected push of an unmodified entry keeps its content flag
    /// (translated or untranslated) and only gains the error annotation.
    pub(crate) fn reject(&mut self, message: String) {
        self.annotation = Some(Annotation::Error(message));
    }
}
