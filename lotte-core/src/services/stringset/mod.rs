//! The working set of strings behind the editing table.
//!
//! Entries are created once from the server snapshot and are never added or
//! removed afterwards; only their translations and save state change. The
//! save pipeline lives in `services::sync`.

pub mod filter;
pub mod view;

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::config::LotteConfig;
use crate::error::ModelError;
use crate::model::entry::{TranslateEffect, TranslationString};
use crate::model::snapshot::{self, StringRecord};
use crate::model::stats::{Buckets, Stats};
use crate::services::debounce::{Clock, Debouncer};

use filter::StringFilter;
use view::{Pager, RowBinding};

#[derive(Debug, Clone, Copy)]
pub struct StringSetOptions {
    pub rows_per_page: usize,
    pub stats_debounce: Duration,
    pub search_debounce: Duration,
}

impl Default for StringSetOptions {
    fn default() -> Self {
        Self {
            rows_per_page: 25,
            stats_debounce: Duration::from_millis(1000),
            search_debounce: Duration::from_millis(1000),
        }
    }
}

impl StringSetOptions {
    pub fn from_config(cfg: &LotteConfig) -> Self {
        Self {
            rows_per_page: cfg.rows_per_page,
            stats_debounce: Duration::from_millis(cfg.stats_debounce_ms),
            search_debounce: Duration::from_millis(cfg.search_debounce_ms),
        }
    }
}

/// Timers that fired during a `tick`.
#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub filtered: bool,
    pub stats_refreshed: bool,
}

/// Entry that last lost focus, kept for auto-save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FocusState {
    index: usize,
    must_push: bool,
}

pub struct StringSet {
    pub(crate) strings: Vec<TranslationString>,
    index_by_id: HashMap<u64, usize>,

    filtered: Vec<usize>,
    filter: StringFilter,
    pager: Pager,

    pub(crate) buckets: Buckets,
    stats: Stats,
    stats_generation: u64,
    stats_timer: Debouncer,

    search_timer: Debouncer,
    pending_filter: Option<StringFilter>,

    clock: Rc<dyn Clock>,

    /// Entries with a save request on the wire.
    pub(crate) in_flight: HashSet<usize>,
    /// Auto-saves that arrived while a request was outstanding.
    pub(crate) deferred: HashSet<usize>,
    focus: Option<FocusState>,

    /// Set once the server has answered any save.
    pub(crate) updated: bool,
}

impl StringSet {
    pub fn new(records: Vec<StringRecord>, options: StringSetOptions, clock: Rc<dyn Clock>) -> Self {
        let strings: Vec<TranslationString> =
            records.into_iter().map(StringRecord::into_entry).collect();
        let index_by_id = strings.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        let filtered: Vec<usize> = (0..strings.len()).collect();

        let mut pager = Pager::new(options.rows_per_page);
        pager.reset(&filtered);

        debug!("string set built with {} strings", strings.len());

        Self {
            buckets: Buckets::from_strings(&strings),
            stats: Stats::scan(&strings),
            stats_generation: 0,
            stats_timer: Debouncer::new(options.stats_debounce),
            search_timer: Debouncer::new(options.search_debounce),
            pending_filter: None,
            index_by_id,
            filtered,
            filter: StringFilter::default(),
            pager,
            strings,
            clock,
            in_flight: HashSet::new(),
            deferred: HashSet::new(),
            focus: None,
            updated: false,
        }
    }

    pub fn from_snapshot(
        snapshot: &Value,
        options: StringSetOptions,
        clock: Rc<dyn Clock>,
    ) -> Result<Self, ModelError> {
        let records = snapshot::parse(snapshot)?;
        Ok(Self::new(records, options, clock))
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn strings(&self) -> &[TranslationString] {
        &self.strings
    }

    pub fn get(&self, index: usize) -> Option<&TranslationString> {
        self.strings.get(index)
    }

    pub fn entry(&self, index: usize) -> Result<&TranslationString, ModelError> {
        self.strings.get(index).ok_or(ModelError::UnknownIndex(index))
    }

    pub(crate) fn entry_mut(&mut self, index: usize) -> Result<&mut TranslationString, ModelError> {
        self.strings
            .get_mut(index)
            .ok_or(ModelError::UnknownIndex(index))
    }

    pub fn index_of(&self, id: u64) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }

    pub fn updated(&self) -> bool {
        self.updated
    }

    pub fn is_in_flight(&self, index: usize) -> bool {
        self.in_flight.contains(&index)
    }

    /// True if any entry carries a server warning or error.
    pub fn has_annotations(&self) -> bool {
        self.strings.iter().any(|s| s.annotation().is_some())
    }

    pub(crate) fn now(&self) -> std::time::Instant {
        self.clock.now()
    }

    // ---- editing ----

    pub fn translate(
        &mut self,
        index: usize,
        rule: &str,
        text: &str,
    ) -> Result<TranslateEffect, ModelError> {
        let effect = self.entry_mut(index)?.translate(rule, text)?;

        if let TranslateEffect::FirstModification { was_untranslated } = effect {
            self.buckets.on_first_modification(was_untranslated);
        }
        if effect.changed() {
            self.update_stats(true);
        }

        Ok(effect)
    }

    /// Fills each plural slot from the matching source rule.
    pub fn copy_source(&mut self, index: usize) -> Result<bool, ModelError> {
        let entry = self.entry(index)?;
        let fills: Vec<(String, String)> = entry
            .rules()
            .filter_map(|rule| entry.source_for(rule).map(|src| (rule.to_string(), src.to_string())))
            .collect();

        let mut changed = false;
        for (rule, text) in fills {
            changed |= self.translate(index, &rule, &text)?.changed();
        }
        Ok(changed)
    }

    // ---- filtering and paging ----

    /// Rebuilds the filtered view from scratch and goes back to page 0.
    pub fn filter(&mut self, filter: StringFilter) {
        self.search_timer.cancel();
        self.pending_filter = None;

        self.filtered = self
            .strings
            .iter()
            .enumerate()
            .filter(|(_, s)| filter.matches(s))
            .map(|(i, _)| i)
            .collect();
        self.filter = filter;
        self.pager.reset(&self.filtered);

        debug!(
            "filter kept {} of {} strings",
            self.filtered.len(),
            self.strings.len()
        );
    }

    /// Search-box keystroke: filter once typing pauses.
    pub fn schedule_search(&mut self, search: Option<String>) {
        let mut next = self.pending_filter.take().unwrap_or_else(|| self.filter.clone());
        next.search = search;
        self.pending_filter = Some(next);
        let now = self.now();
        self.search_timer.schedule(now);
    }

    pub fn current_filter(&self) -> &StringFilter {
        &self.filter
    }

    pub fn filtered(&self) -> &[usize] {
        &self.filtered
    }

    pub fn page(&self) -> usize {
        self.pager.page()
    }

    pub fn page_count(&self) -> usize {
        self.pager.page_count(self.filtered.len())
    }

    pub fn set_page(&mut self, page: usize) -> Result<(), ModelError> {
        self.pager.set_page(page, &self.filtered)
    }

    pub fn row_entry(&self, row: usize) -> Option<usize> {
        self.pager.bound(row)
    }

    pub fn visible_rows(&self) -> Vec<RowBinding> {
        self.pager
            .bindings()
            .map(|(row, index)| RowBinding {
                row,
                index,
                id: self.strings[index].id,
            })
            .collect()
    }

    // ---- statistics ----

    /// Debounced: (re)start the shared timer. Otherwise recount now.
    pub fn update_stats(&mut self, debounced: bool) {
        if debounced {
            let now = self.now();
            self.stats_timer.schedule(now);
            return;
        }

        self.stats_timer.cancel();
        let stats = Stats::scan(&self.strings);
        if !self.buckets.agrees_with(&stats) {
            log::warn!(
                "stats counters drifted ({:?} vs scan {:?}), resetting",
                self.buckets,
                stats
            );
            self.resync_buckets();
        }
        self.stats = stats;
        self.stats_generation += 1;
    }

    fn resync_buckets(&mut self) {
        let mut b = Buckets::from_strings(&self.strings);
        for s in self.strings.iter().filter(|s| s.is_modified()) {
            b.on_first_modification(crate::model::entry::is_blank(s.previous()));
        }
        self.buckets = b;
    }

    /// Last published counts; may lag edits until the timer fires.
    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn buckets(&self) -> Buckets {
        self.buckets
    }

    pub fn stats_generation(&self) -> u64 {
        self.stats_generation
    }

    pub fn stats_pending(&self) -> bool {
        self.stats_timer.is_pending()
    }

    /// Fires whichever timers are due.
    pub fn tick(&mut self) -> TickReport {
        let now = self.now();
        let mut report = TickReport::default();

        if self.search_timer.fire_if_due(now) {
            if let Some(f) = self.pending_filter.take() {
                self.filter(f);
                report.filtered = true;
            }
        }

        if self.stats_timer.fire_if_due(now) {
            self.update_stats(false);
            report.stats_refreshed = true;
        }

        report
    }

    // ---- focus tracking for auto-save ----

    /// Remembers the entry that lost focus and whether it may be auto-saved.
    pub fn blur(&mut self, index: usize) -> Result<(), ModelError> {
        let must_push = self.entry(index)?.slots_consistent();
        self.focus = Some(FocusState { index, must_push });
        Ok(())
    }

    /// Focus moved to `index`. Returns the entry to auto-save, if any.
    pub fn focus(&mut self, index: usize) -> Result<Option<usize>, ModelError> {
        self.entry(index)?;

        let candidate = match self.focus {
            Some(f) if f.index != index && f.must_push => f.index,
            _ => return Ok(None),
        };

        if self.strings[candidate].is_modified() {
            Ok(Some(candidate))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::Flag;
    use crate::services::debounce::ManualClock;
    use serde_json::json;

    fn set_with(clock: Rc<ManualClock>, rows: usize) -> StringSet {
        let snap = json!({
            "strings": [
                {"id": 1, "source_strings": {"other": "Open file"}, "translations": {"other": ""}},
                {"id": 2, "source_strings": {"other": "Save"}, "translations": {"other": "Salvar"}},
                {"id": 3, "source_strings": {"other": "foo bar"}, "translations": {"other": ""}},
                {"id": 4, "source_strings": {"one": "%d item", "other": "%d items"}, "translations": {"one": "", "other": ""}}
            ]
        });
        let opts = StringSetOptions {
            rows_per_page: rows,
            ..StringSetOptions::default()
        };
        StringSet::from_snapshot(&snap, opts, clock).unwrap()
    }

    #[test]
    fn construction_preserves_order_and_counts() {
        let set = set_with(Rc::new(ManualClock::new()), 25);
        let ids: Vec<u64> = set.strings().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(set.filtered(), &[0, 1, 2, 3]);
        assert_eq!(set.stats().translated, 1);
        assert_eq!(set.stats().untranslated, 3);
        assert_eq!(set.index_of(3), Some(2));
    }

    #[test]
    fn debounced_stats_collapse_to_one_recount() {
        let clock = Rc::new(ManualClock::new());
        let mut set = set_with(clock.clone(), 25);

        for text in ["A", "Ab", "Abr", "Abri"] {
            set.translate(0, "other", text).unwrap();
            clock.advance(Duration::from_millis(200));
            assert_eq!(set.tick(), TickReport::default());
        }
        assert_eq!(set.stats_generation(), 0);
        assert_eq!(set.stats().modified, 0);

        clock.advance(Duration::from_millis(1000));
        assert!(set.tick().stats_refreshed);
        assert_eq!(set.stats_generation(), 1);
        assert_eq!(set.stats().modified, 1);
        assert_eq!(set.stats().untranslated, 2);

        clock.advance(Duration::from_millis(5000));
        assert!(!set.tick().stats_refreshed);
        assert_eq!(set.stats_generation(), 1);
    }

    #[test]
    fn unchanged_translate_does_not_touch_timer() {
        let mut set = set_with(Rc::new(ManualClock::new()), 25);
        let before = set.buckets();
        let effect = set.translate(1, "other", "Salvar").unwrap();
        assert_eq!(effect, TranslateEffect::Unchanged);
        assert!(!set.stats_pending());
        assert_eq!(set.buckets(), before);
        assert!(!set.entry(1).unwrap().is_modified());
    }

    #[test]
    fn filter_by_status_and_search() {
        let mut set = set_with(Rc::new(ManualClock::new()), 25);
        set.filter(StringFilter::only(Flag::Untranslated).with_search("foo"));
        assert_eq!(set.filtered(), &[2]);

        set.filter(StringFilter::only(Flag::Translated));
        assert_eq!(set.filtered(), &[1]);
    }

    #[test]
    fn filter_resets_page() {
        let mut set = set_with(Rc::new(ManualClock::new()), 2);
        set.set_page(1).unwrap();
        assert_eq!(set.row_entry(0), Some(2));

        set.filter(StringFilter::default());
        assert_eq!(set.page(), 0);
        assert_eq!(set.row_entry(0), Some(0));
    }

    #[test]
    fn paging_binds_rows_to_stable_indices() {
        let mut set = set_with(Rc::new(ManualClock::new()), 3);
        assert_eq!(set.page_count(), 2);
        set.set_page(1).unwrap();
        let rows = set.visible_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], RowBinding { row: 0, index: 3, id: 4 });
        assert_eq!(set.row_entry(1), None);
    }

    #[test]
    fn search_waits_for_quiet_period() {
        let clock = Rc::new(ManualClock::new());
        let mut set = set_with(clock.clone(), 25);

        set.schedule_search(Some("Sa".into()));
        clock.advance(Duration::from_millis(500));
        set.schedule_search(Some("Save".into()));
        clock.advance(Duration::from_millis(500));
        assert!(!set.tick().filtered);
        assert_eq!(set.filtered().len(), 4);

        clock.advance(Duration::from_millis(500));
        assert!(set.tick().filtered);
        assert_eq!(set.filtered(), &[1]);
        assert_eq!(set.current_filter().search.as_deref(), Some("Save"));
    }

    #[test]
    fn copy_source_fills_every_rule() {
        let mut set = set_with(Rc::new(ManualClock::new()), 25);
        assert!(set.copy_source(3).unwrap());
        let e = set.entry(3).unwrap();
        assert_eq!(e.translated_strings()["one"], "%d item");
        assert_eq!(e.translated_strings()["other"], "%d items");
        assert!(e.is_modified());
        assert!(!set.copy_source(3).unwrap());
    }

    #[test]
    fn focus_change_picks_pushable_entry() {
        let mut set = set_with(Rc::new(ManualClock::new()), 25);

        set.translate(0, "other", "Abrir arquivo").unwrap();
        set.blur(0).unwrap();
        assert_eq!(set.focus(0).unwrap(), None);
        assert_eq!(set.focus(1).unwrap(), Some(0));

        // half-filled plural is not auto-saved
        set.translate(3, "one", "%d item").unwrap();
        set.blur(3).unwrap();
        assert_eq!(set.focus(1).unwrap(), None);
    }

    #[test]
    fn unknown_index_is_an_error() {
        let mut set = set_with(Rc::new(ManualClock::new()), 25);
        assert_eq!(
            set.translate(9, "other", "x"),
            Err(ModelError::UnknownIndex(9))
        );
    }
}
