use serde::Serialize;

use crate::model::entry::{SaveTransition, TranslationString};

/// Aggregate counts as shown in the stats table.
#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub translated: usize,
    pub untranslated: usize,
    /// Fuzzy entries, i.e. edited and not yet saved.
    pub modified: usize,
}

impl Stats {
    /// Single pass over all entries.
    pub fn scan(strings: &[TranslationString]) -> Self {
        let mut s = Stats {
            total: strings.len(),
            ..Stats::default()
        };
        for e in strings {
            if e.is_modified() {
                s.modified += 1;
            } else if e.is_untranslated() {
                s.untranslated += 1;
            } else {
                s.translated += 1;
            }
        }
        s
    }

    pub fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.total as f64
        }
    }
}

/// Running bucket counters kept in step with edits and save replies.
///
/// `saved_*` classify every entry by its last saved state. The `*_to_modified`
/// counters hold how many fuzzy entries left each saved bucket.
#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct Buckets {
    pub saved_translated: usize,
    pub saved_untranslated: usize,
    pub translated_to_modified: usize,
    pub untranslated_to_modified: usize,
}

impl Buckets {
    pub fn from_strings(strings: &[TranslationString]) -> Self {
        let mut b = Buckets::default();
        for e in strings {
            if crate::model::entry::is_blank(e.previous()) {
                b.saved_untranslated += 1;
            } else {
                b.saved_translated += 1;
            }
        }
        b
    }

    pub fn on_first_modification(&mut self, was_untranslated: bool) {
        if was_untranslated {
            self.untranslated_to_modified += 1;
        } else {
            self.translated_to_modified += 1;
        }
    }

    /// Pre-save emptiness against post-save emptiness decides the move.
    pub fn on_saved(&mut self, t: SaveTransition) {
        if t.was_modified {
            self.leave_modified(t.pre_untranslated);
        }

        if t.pre_untranslated != t.post_untranslated {
            if t.pre_untranslated {
                self.saved_untranslated = self.saved_untranslated.saturating_sub(1);
                self.saved_translated += 1;
            } else {
                self.saved_translated = self.saved_translated.saturating_sub(1);
                self.saved_untranslated += 1;
            }
        }

        if t.still_modified {
            self.on_first_modification(t.post_untranslated);
        }
    }

    fn leave_modified(&mut self, was_untranslated: bool) {
        if was_untranslated {
            self.untranslated_to_modified = self.untranslated_to_modified.saturating_sub(1);
        } else {
            self.translated_to_modified = self.translated_to_modified.saturating_sub(1);
        }
    }

    pub fn translated(&self) -> usize {
        self.saved_translated
            .saturating_sub(self.translated_to_modified)
    }

    pub fn untranslated(&self) -> usize {
        self.saved_untranslated
            .saturating_sub(self.untranslated_to_modified)
    }

    pub fn modified(&self) -> usize {
        self.translated_to_modified + self.untranslated_to_modified
    }

    pub fn agrees_with(&self, stats: &Stats) -> bool {
        self.translated() == stats.translated
            && self.untranslated() == stats.untranslated
            && self.modified() == stats.modified
    }
}
