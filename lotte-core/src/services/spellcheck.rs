//! Spellcheck panel for one entry's default translation.
//!
//! The panel is transient: it splits the text around misspelled words,
//! tracks which ones are still open, and is dropped when it closes. Only
//! an accepted suggestion reaches the entry, through `translate`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AssistError;
use crate::model::entry::DEFAULT_RULE;
use crate::services::api::LotteApi;
use crate::services::stringset::StringSet;

/// One misspelling as reported by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(from = "RawHit")]
pub struct SpellcheckHit {
    /// Offset in characters.
    pub offset: usize,
    pub len: usize,
    pub word: String,
    pub suggestions: Vec<String>,
}

/// Wire form: `[[offset, length], word, [suggestion, ...]]`.
#[derive(Deserialize)]
struct RawHit((usize, usize), String, Vec<String>);

impl From<RawHit> for SpellcheckHit {
    fn from(raw: RawHit) -> Self {
        let RawHit((offset, len), word, suggestions) = raw;
        Self {
            offset,
            len,
            word,
            suggestions,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct BadWord {
    pub word: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct SpellcheckPanel {
    pub entry: usize,
    /// Entry text as last written by this panel.
    base: String,
    segments: Vec<String>,
    /// Segment index to the misspelling it holds.
    bad_words: BTreeMap<usize, BadWord>,
}

impl SpellcheckPanel {
    pub fn build(entry: usize, text: &str, mut hits: Vec<SpellcheckHit>) -> Result<Self, AssistError> {
        hits.sort_by_key(|h| h.offset);

        let chars: Vec<char> = text.chars().collect();
        let mut segments = Vec::with_capacity(hits.len() * 2 + 1);
        let mut bad_words = BTreeMap::new();
        let mut start = 0usize;

        for hit in hits {
            let end = hit
                .offset
                .checked_add(hit.len)
                .filter(|&end| hit.offset >= start && end <= chars.len())
                .ok_or_else(|| {
                    AssistError::BadSpellcheckReply(format!(
                        "range {}+{} does not fit text of {} chars",
                        hit.offset,
                        hit.len,
                        chars.len()
                    ))
                })?;

            segments.push(chars[start..hit.offset].iter().collect());
            segments.push(chars[hit.offset..end].iter().collect());
            bad_words.insert(
                segments.len() - 1,
                BadWord {
                    word: hit.word,
                    suggestions: hit.suggestions,
                },
            );
            start = end;
        }
        segments.push(chars[start..].iter().collect());

        Ok(Self {
            entry,
            base: text.to_string(),
            segments,
            bad_words,
        })
    }

    pub fn text(&self) -> String {
        self.segments.concat()
    }

    pub fn error_indices(&self) -> Vec<usize> {
        self.bad_words.keys().copied().collect()
    }

    pub fn bad_word(&self, index: usize) -> Option<&BadWord> {
        self.bad_words.get(&index)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// No misspellings left; the panel should close.
    pub fn is_done(&self) -> bool {
        self.bad_words.is_empty()
    }

    /// Replaces the word and returns the new full text.
    pub fn accept(&mut self, index: usize, suggestion: &str) -> Result<String, AssistError> {
        let bad = self
            .bad_words
            .get(&index)
            .ok_or(AssistError::UnknownBadWord(index))?;
        if !bad.suggestions.iter().any(|s| s == suggestion) {
            return Err(AssistError::UnknownSuggestion(suggestion.to_string()));
        }

        self.bad_words.remove(&index);
        self.segments[index] = suggestion.to_string();
        self.base = self.text();
        Ok(self.base.clone())
    }

    /// False once the entry was edited outside the panel.
    pub fn matches(&self, current: &str) -> bool {
        self.base == current
    }

    /// Leaves the word as written.
    pub fn ignore(&mut self, index: usize) -> Result<(), AssistError> {
        self.bad_words
            .remove(&index)
            .map(|_| ())
            .ok_or(AssistError::UnknownBadWord(index))
    }

    pub fn ignore_all(&mut self) {
        self.bad_words.clear();
    }
}

impl StringSet {
    pub fn spellcheck_available(&self, index: usize, enabled: bool) -> bool {
        enabled
            && self
                .get(index)
                .and_then(|e| e.translated_strings().get(DEFAULT_RULE))
                .is_some_and(|t| !t.is_empty())
    }

    /// Asks the server about the entry's default translation.
    /// `Ok(None)` means no misspelled words.
    pub fn open_spellcheck(
        &self,
        api: &dyn LotteApi,
        index: usize,
        enabled: bool,
    ) -> Result<Option<SpellcheckPanel>, AssistError> {
        if !enabled {
            return Err(AssistError::SpellcheckDisabled);
        }
        if !self.spellcheck_available(index, enabled) {
            self.entry(index)?;
            return Err(AssistError::NothingToCheck);
        }

        let text = self.default_text(index)?.to_string();

        let hits = api.spellcheck(&text)?;
        if hits.is_empty() {
            log::debug!("no misspelled words in string {index}");
            return Ok(None);
        }

        SpellcheckPanel::build(index, &text, hits).map(Some)
    }

    fn default_text(&self, index: usize) -> Result<&str, AssistError> {
        Ok(self
            .entry(index)?
            .translated_strings()
            .get(DEFAULT_RULE)
            .map(String::as_str)
            .unwrap_or_default())
    }

    /// Applies a suggestion to the panel and to the entry.
    ///
    /// Refused with `SpellcheckOutdated` if the entry no longer holds the
    /// text the panel was built from; the caller should close the panel.
    pub fn spellcheck_accept(
        &mut self,
        panel: &mut SpellcheckPanel,
        bad_index: usize,
        suggestion: &str,
    ) -> Result<(), AssistError> {
        if !panel.matches(self.default_text(panel.entry)?) {
            return Err(AssistError::SpellcheckOutdated);
        }
        let text = panel.accept(bad_index, suggestion)?;
        self.translate(panel.entry, DEFAULT_RULE, &text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hits(v: serde_json::Value) -> Vec<SpellcheckHit> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn splits_text_around_bad_words() {
        let panel = SpellcheckPanel::build(
            0,
            "Teh cat sat on teh mat",
            hits(json!([[[0, 3], "Teh", ["The", "Ten"]], [[15, 3], "teh", ["the"]]])),
        )
        .unwrap();

        assert_eq!(panel.segments(), &["", "Teh", " cat sat on ", "teh", " mat"]);
        assert_eq!(panel.error_indices(), vec![1, 3]);
        assert_eq!(panel.text(), "Teh cat sat on teh mat");
    }

    #[test]
    fn accept_and_ignore_shrink_the_list() {
        let mut panel = SpellcheckPanel::build(
            0,
            "Teh cat sat on teh mat",
            hits(json!([[[0, 3], "Teh", ["The"]], [[15, 3], "teh", ["the"]]])),
        )
        .unwrap();

        assert_eq!(panel.accept(1, "The").unwrap(), "The cat sat on teh mat");
        assert!(!panel.is_done());
        panel.ignore(3).unwrap();
        assert!(panel.is_done());
        assert_eq!(panel.text(), "The cat sat on teh mat");
        assert_eq!(panel.ignore(3), Err(AssistError::UnknownBadWord(3)));
    }

    #[test]
    fn offsets_count_characters() {
        let panel = SpellcheckPanel::build(
            0,
            "Ação rapída",
            hits(json!([[[5, 6], "rapída", ["rápida"]]])),
        )
        .unwrap();
        assert_eq!(panel.bad_word(1).unwrap().word, "rapída");
        assert_eq!(panel.segments()[0], "Ação ");
    }

    #[test]
    fn rejects_out_of_range_hit() {
        let err = SpellcheckPanel::build(0, "short", hits(json!([[[3, 10], "x", []]]))).unwrap_err();
        assert!(matches!(err, AssistError::BadSpellcheckReply(_)));
    }

    #[test]
    fn rejects_overflowing_hit() {
        let err = SpellcheckPanel::build(
            0,
            "abc",
            vec![SpellcheckHit {
                offset: usize::MAX,
                len: 2,
                word: "x".into(),
                suggestions: vec![],
            }],
        )
        .unwrap_err();
        assert!(matches!(err, AssistError::BadSpellcheckReply(_)));
    }

    fn teh_cat_set() -> StringSet {
        use crate::services::debounce::ManualClock;
        use crate::services::stringset::StringSetOptions;
        use std::rc::Rc;

        let snap = json!({"strings": [
            {"id": 1, "source_strings": {"other": "The cat"}, "translations": {"other": "Teh cat"}}
        ]});
        StringSet::from_snapshot(&snap, StringSetOptions::default(), Rc::new(ManualClock::new()))
            .unwrap()
    }

    #[test]
    fn accept_after_outside_edit_is_refused() {
        use crate::services::api::testing::MockApi;

        let mut set = teh_cat_set();
        let api = MockApi::new();
        api.spellcheck_reply(json!([[[0, 3], "Teh", ["The"]]]));
        let mut panel = set.open_spellcheck(&api, 0, true).unwrap().unwrap();

        set.translate(0, "other", "Teh cat sat on the mat").unwrap();
        assert_eq!(
            set.spellcheck_accept(&mut panel, 1, "The"),
            Err(AssistError::SpellcheckOutdated)
        );
        assert_eq!(
            set.entry(0).unwrap().translated_strings()["other"],
            "Teh cat sat on the mat"
        );
    }

    #[test]
    fn successive_accepts_track_their_own_writes() {
        use crate::services::api::testing::MockApi;

        let mut set = teh_cat_set();
        let api = MockApi::new();
        api.spellcheck_reply(json!([[[0, 3], "Teh", ["The"]], [[4, 3], "cat", ["cot"]]]));
        let mut panel = set.open_spellcheck(&api, 0, true).unwrap().unwrap();

        set.spellcheck_accept(&mut panel, 1, "The").unwrap();
        set.spellcheck_accept(&mut panel, 3, "cot").unwrap();
        assert_eq!(set.entry(0).unwrap().translated_strings()["other"], "The cot");
        assert!(panel.is_done());
    }

    #[test]
    fn unavailable_without_text_or_when_disabled() {
        let set = teh_cat_set();
        assert!(set.spellcheck_available(0, true));
        assert!(!set.spellcheck_available(0, false));
        assert!(!set.spellcheck_available(7, true));
    }

    #[test]
    fn unknown_suggestion_is_refused() {
        let mut panel =
            SpellcheckPanel::build(0, "Teh", hits(json!([[[0, 3], "Teh", ["The"]]]))).unwrap();
        assert!(matches!(
            panel.accept(1, "Tea"),
            Err(AssistError::UnknownSuggestion(_))
        ));
        panel.ignore_all();
        assert!(panel.is_done());
    }
}
