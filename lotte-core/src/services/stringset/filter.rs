use serde::{Deserialize, Serialize};

use crate::model::entry::{Flag, TranslationString};

fn yes() -> bool {
    true
}

/// Status checkboxes plus an optional search string.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StringFilter {
    #[serde(default = "yes")]
    pub fuzzy: bool,

    #[serde(default = "yes")]
    pub translated: bool,

    #[serde(default = "yes")]
    pub untranslated: bool,

    #[serde(default)]
    pub search: Option<String>,
}

impl Default for StringFilter {
    fn default() -> Self {
        Self {
            fuzzy: true,
            translated: true,
            untranslated: true,
            search: None,
        }
    }
}

impl StringFilter {
    pub fn only(flag: Flag) -> Self {
        Self {
            fuzzy: flag == Flag::Fuzzy,
            translated: flag == Flag::Translated,
            untranslated: flag == Flag::Untranslated,
            search: None,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    fn status_selected(&self, flag: Flag) -> bool {
        match flag {
            Flag::Fuzzy => self.fuzzy,
            Flag::Translated => self.translated,
            Flag::Untranslated => self.untranslated,
        }
    }

    /// Case-sensitive substring match on any source or translated rule.
    fn search_matches(&self, s: &TranslationString) -> bool {
        let query = match self.search.as_deref() {
            Some(q) if !q.is_empty() => q,
            _ => return true,
        };

        s.source_strings()
            .values()
            .chain(s.translated_strings().values())
            .any(|text| text.contains(query))
    }

    pub fn matches(&self, s: &TranslationString) -> bool {
        self.status_selected(s.flag()) && self.search_matches(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::Translations;
    use serde_json::Value;

    fn entry(source: &str, translated: &str) -> TranslationString {
        let mut src = Translations::new();
        src.insert("other".into(), source.into());
        let mut tr = Translations::new();
        tr.insert("other".into(), translated.into());
        TranslationString::new(1, String::new(), src, tr, Value::Null, Value::Null)
    }

    #[test]
    fn statuses_are_ored() {
        let f = StringFilter {
            translated: true,
            untranslated: true,
            fuzzy: false,
            search: None,
        };
        assert!(f.matches(&entry("a", "")));
        assert!(f.matches(&entry("a", "b")));

        let mut fuzzy = entry("a", "b");
        fuzzy.translate("other", "c").unwrap();
        assert!(!f.matches(&fuzzy));
    }

    #[test]
    fn search_is_case_sensitive_on_both_sides() {
        let f = StringFilter::default().with_search("Foo");
        assert!(f.matches(&entry("a Foo b", "")));
        assert!(f.matches(&entry("x", "Foo")));
        assert!(!f.matches(&entry("foo", "fOO")));
    }

    #[test]
    fn empty_search_matches_everything() {
        let f = StringFilter::default().with_search("");
        assert!(f.matches(&entry("x", "")));
    }
}
