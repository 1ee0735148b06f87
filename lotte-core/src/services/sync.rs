//! Save pipeline: build a batch, send it, reconcile the per-entry replies.
//!
//! `begin_save` and `complete_save` are split so a caller can keep editing
//! while a request is pending. `push` runs both back to back.

use log::{debug, error, info, warn};

use crate::error::{LotteResult, ModelError, SyncResult};
use crate::services::api::LotteApi;
use crate::services::stringset::StringSet;
use crate::services::sync_types::{
    ExitStatus, ItemOutcome, ItemResult, SaveBatch, SaveItem, SaveOutcome, SavePlan, SaveReply,
    SaveReport, SaveRequest, SaveResponse, SaveTarget, STATUS_OK,
};

impl StringSet {
    /// Picks the entries to send and marks them in flight.
    pub fn begin_save(&mut self, target: SaveTarget) -> Result<SavePlan, ModelError> {
        let indices: Vec<usize> = match target {
            SaveTarget::Entry(index) => {
                self.entry(index)?;
                if self.in_flight.contains(&index) {
                    debug!("save of {index} coalesced into pending request");
                    return Ok(SavePlan::Coalesced);
                }
                vec![index]
            }
            SaveTarget::Autosave(index) => {
                if !self.entry(index)?.is_modified() {
                    return Ok(SavePlan::NothingToSave);
                }
                if self.in_flight.contains(&index) {
                    debug!("auto-save of {index} deferred, request outstanding");
                    self.deferred.insert(index);
                    return Ok(SavePlan::Deferred);
                }
                vec![index]
            }
            SaveTarget::All => {
                let mut picked = Vec::new();
                for (i, s) in self.strings.iter().enumerate() {
                    if !s.is_modified() {
                        continue;
                    }
                    if self.in_flight.contains(&i) {
                        self.deferred.insert(i);
                    } else {
                        picked.push(i);
                    }
                }
                picked
            }
        };

        if indices.is_empty() {
            return Ok(SavePlan::NothingToSave);
        }

        let strings = indices
            .iter()
            .map(|&i| SaveItem {
                id: self.strings[i].id,
                translations: self.strings[i].translated_strings().clone(),
            })
            .collect();

        self.in_flight.extend(indices.iter().copied());
        debug!("save batch of {} string(s) for {:?}", indices.len(), target);

        Ok(SavePlan::Send(SaveRequest {
            target,
            batch: SaveBatch { strings },
            indices,
        }))
    }

    /// Applies the server answer for `request`.
    ///
    /// A transport failure changes no entry and comes back as the error.
    pub fn complete_save(
        &mut self,
        request: SaveRequest,
        result: SyncResult<SaveResponse>,
    ) -> SyncResult<SaveReport> {
        for i in &request.indices {
            self.in_flight.remove(i);
        }

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                error!("save request failed: {e}");
                for i in &request.indices {
                    self.deferred.remove(i);
                }
                return Err(e);
            }
        };

        self.updated = true;

        let mut report = SaveReport::default();

        for (item, &index) in request.batch.strings.iter().zip(&request.indices) {
            let reply = response.get(&item.id.to_string());
            let outcome = self.reconcile(index, item, reply);
            report.items.push(ItemResult {
                id: item.id,
                index,
                outcome,
            });
        }

        for key in response.keys() {
            if !request.batch.strings.iter().any(|s| s.id.to_string() == *key) {
                warn!("save response has status for unrequested string {key}");
            }
        }

        for &i in &request.indices {
            if self.deferred.remove(&i) && self.strings[i].is_modified() {
                report.follow_up.push(i);
            }
        }

        self.update_stats(true);

        info!(
            "save finished: {} saved, {} rejected, {} stale, {} unanswered",
            report.saved(),
            report.rejected(),
            report.stale(),
            report.missing()
        );

        Ok(report)
    }

    fn reconcile(&mut self, index: usize, item: &SaveItem, reply: Option<&SaveReply>) -> ItemOutcome {
        let Some(reply) = reply else {
            warn!("save response has no status for string {}", item.id);
            return ItemOutcome::Missing;
        };

        let entry = &mut self.strings[index];

        if reply.status != STATUS_OK {
            let message = reply
                .message
                .clone()
                .unwrap_or_else(|| format!("save rejected with status {}", reply.status));
            warn!("string {} rejected: {}", item.id, message);
            entry.reject(message.clone());
            return ItemOutcome::Rejected(message);
        }

        let transition = entry.mark_saved(&item.translations, reply.message.clone());
        self.buckets.on_saved(transition);

        if transition.still_modified {
            debug!("string {} edited while saving, stays fuzzy", item.id);
            ItemOutcome::Stale
        } else if let Some(m) = &reply.message {
            ItemOutcome::SavedWithWarning(m.clone())
        } else {
            ItemOutcome::Saved
        }
    }

    /// Sends and reconciles in one go, then replays deferred auto-saves.
    pub fn push(&mut self, api: &dyn LotteApi, target: SaveTarget) -> LotteResult<SaveOutcome> {
        let request = match self.begin_save(target)? {
            SavePlan::Send(r) => r,
            SavePlan::NothingToSave => {
                if target == SaveTarget::All {
                    info!("all strings have been saved already");
                }
                return Ok(SaveOutcome::NothingToSave);
            }
            SavePlan::Coalesced => return Ok(SaveOutcome::Coalesced),
            SavePlan::Deferred => return Ok(SaveOutcome::Deferred),
        };

        let result = api.save(&request.batch);
        let mut report = self.complete_save(request, result)?;

        for index in std::mem::take(&mut report.follow_up) {
            if let SaveOutcome::Completed(more) = self.push(api, SaveTarget::Autosave(index))? {
                report.items.extend(more.items);
            }
        }

        Ok(SaveOutcome::Completed(report))
    }

    /// Restores the load-time translations and saves right away.
    pub fn undo(&mut self, api: &dyn LotteApi, index: usize) -> LotteResult<SaveOutcome> {
        let defaults: Vec<(String, String)> = self
            .entry(index)?
            .load_default()
            .iter()
            .map(|(rule, text)| (rule.clone(), text.clone()))
            .collect();

        for (rule, text) in defaults {
            self.translate(index, &rule, &text)?;
        }

        self.push(api, SaveTarget::Entry(index))
    }

    /// Focus moved to `index`; auto-saves the entry that lost it if allowed.
    pub fn focus_and_autosave(
        &mut self,
        api: &dyn LotteApi,
        index: usize,
    ) -> LotteResult<Option<SaveOutcome>> {
        match self.focus(index)? {
            Some(previous) => Ok(Some(self.push(api, SaveTarget::Autosave(previous))?)),
            None => Ok(None),
        }
    }

    /// Saves everything and reports whether the editor can close cleanly.
    pub fn save_and_exit(&mut self, api: &dyn LotteApi) -> LotteResult<ExitStatus> {
        let outcome = self.push(api, SaveTarget::All)?;
        Ok(ExitStatus {
            updated: self.updated,
            clean: !self.has_annotations(),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::model::entry::{Annotation, Flag};
    use crate::services::api::testing::MockApi;
    use crate::services::debounce::ManualClock;
    use crate::services::stringset::StringSetOptions;
    use serde_json::json;
    use std::rc::Rc;

    fn three_untranslated() -> StringSet {
        let snap = json!({
            "strings": [
                {"id": 11, "source_strings": {"other": "One"}, "translations": {"other": ""}},
                {"id": 12, "source_strings": {"other": "Two"}, "translations": {"other": ""}},
                {"id": 13, "source_strings": {"other": "Three"}, "translations": {"other": "Três"}}
            ]
        });
        StringSet::from_snapshot(&snap, StringSetOptions::default(), Rc::new(ManualClock::new()))
            .unwrap()
    }

    fn assert_saved_invariant(set: &StringSet) {
        for s in set.strings() {
            if !s.is_modified() {
                assert_eq!(s.translated_strings(), s.previous(), "string {}", s.id);
            }
        }
    }

    #[test]
    fn single_push_success_clears_modified() {
        let mut set = three_untranslated();
        set.translate(0, "other", "Um").unwrap();

        let api = MockApi::new();
        api.reply(json!({"11": {"status": 200, "message": null}}));
        let outcome = set.push(&api, SaveTarget::Entry(0)).unwrap();

        assert_eq!(outcome.report().unwrap().outcome_for(11), Some(&ItemOutcome::Saved));
        let e = set.entry(0).unwrap();
        assert!(!e.is_modified());
        assert_eq!(e.previous(), e.translated_strings());
        assert_eq!(e.flag(), Flag::Translated);
        assert!(set.updated());
        assert_saved_invariant(&set);
    }

    #[test]
    fn single_push_rejection_keeps_fuzzy_with_message() {
        let mut set = three_untranslated();
        set.translate(0, "other", "Um muito longo").unwrap();

        let api = MockApi::new();
        api.reply(json!({"11": {"status": 400, "message": "too long"}}));
        set.push(&api, SaveTarget::Entry(0)).unwrap();

        let e = set.entry(0).unwrap();
        assert!(e.is_modified());
        assert_eq!(e.annotation(), Some(&Annotation::Error("too long".into())));
        assert_eq!(e.previous().get("other").map(String::as_str), Some(""));
        assert_saved_invariant(&set);
    }

    #[test]
    fn warning_is_a_success() {
        let mut set = three_untranslated();
        set.translate(1, "other", "Dois").unwrap();

        let api = MockApi::new();
        api.reply(json!({"12": {"status": 200, "message": "Translation has trailing space"}}));
        let outcome = set.push(&api, SaveTarget::Entry(1)).unwrap();

        assert!(outcome.report().unwrap().has_messages());
        let e = set.entry(1).unwrap();
        assert!(!e.is_modified());
        assert!(matches!(e.annotation(), Some(Annotation::Warning(_))));
    }

    #[test]
    fn empty_bulk_push_sends_nothing() {
        let mut set = three_untranslated();
        let api = MockApi::new();
        assert_eq!(set.push(&api, SaveTarget::All).unwrap(), SaveOutcome::NothingToSave);
        assert_eq!(api.save_calls(), 0);
    }

    #[test]
    fn transport_failure_mutates_nothing() {
        let mut set = three_untranslated();
        set.translate(0, "other", "Um").unwrap();
        set.translate(1, "other", "Dois").unwrap();
        let before: Vec<_> = set.strings().to_vec();

        let api = MockApi::new();
        api.fail(SyncError::Transport("connection refused".into()));
        let err = set.push(&api, SaveTarget::All).unwrap_err();

        assert!(matches!(err, crate::error::LotteError::Sync(SyncError::Transport(_))));
        for (a, b) in before.iter().zip(set.strings()) {
            assert_eq!(a.is_modified(), b.is_modified());
            assert_eq!(a.previous(), b.previous());
            assert_eq!(a.annotation(), b.annotation());
        }
        assert!(!set.is_in_flight(0));
        assert!(!set.updated());
    }

    #[test]
    fn stale_reply_does_not_clear_newer_edit() {
        let mut set = three_untranslated();
        set.translate(0, "other", "Um").unwrap();

        let request = match set.begin_save(SaveTarget::Entry(0)).unwrap() {
            SavePlan::Send(r) => r,
            other => panic!("expected a request, got {other:?}"),
        };
        set.translate(0, "other", "Um!").unwrap();

        let mut response = SaveResponse::new();
        response.insert("11".into(), SaveReply::ok());
        let report = set.complete_save(request, Ok(response)).unwrap();

        assert_eq!(report.outcome_for(11), Some(&ItemOutcome::Stale));
        let e = set.entry(0).unwrap();
        assert!(e.is_modified());
        assert_eq!(e.previous().get("other").map(String::as_str), Some("Um"));
        assert_eq!(e.translated_strings().get("other").map(String::as_str), Some("Um!"));

        set.update_stats(false);
        assert!(set.buckets().agrees_with(&set.stats()));
    }

    #[test]
    fn autosave_while_in_flight_is_deferred_then_replayed() {
        let mut set = three_untranslated();
        set.translate(0, "other", "Um").unwrap();

        let request = match set.begin_save(SaveTarget::Autosave(0)).unwrap() {
            SavePlan::Send(r) => r,
            other => panic!("expected a request, got {other:?}"),
        };
        set.translate(0, "other", "Uma").unwrap();
        assert!(matches!(
            set.begin_save(SaveTarget::Autosave(0)).unwrap(),
            SavePlan::Deferred
        ));
        assert!(matches!(
            set.begin_save(SaveTarget::Entry(0)).unwrap(),
            SavePlan::Coalesced
        ));

        let mut response = SaveResponse::new();
        response.insert("11".into(), SaveReply::ok());
        let report = set.complete_save(request, Ok(response)).unwrap();
        assert_eq!(report.follow_up, vec![0]);
        assert!(set.entry(0).unwrap().is_modified());
    }

    #[test]
    fn push_replays_deferred_autosave() {
        let mut set = three_untranslated();
        set.translate(0, "other", "Um").unwrap();

        let first = match set.begin_save(SaveTarget::Autosave(0)).unwrap() {
            SavePlan::Send(r) => r,
            other => panic!("expected a request, got {other:?}"),
        };
        set.translate(0, "other", "Uma").unwrap();
        set.begin_save(SaveTarget::Autosave(0)).unwrap();

        let mut response = SaveResponse::new();
        response.insert("11".into(), SaveReply::ok());
        let mut report = set.complete_save(first, Ok(response)).unwrap();

        let api = MockApi::new();
        api.reply(json!({"11": {"status": 200}}));
        for i in std::mem::take(&mut report.follow_up) {
            set.push(&api, SaveTarget::Autosave(i)).unwrap();
        }
        assert_eq!(api.save_calls(), 1);
        assert_eq!(api.sent()[0].strings[0].translations["other"], "Uma");
        assert!(!set.entry(0).unwrap().is_modified());
    }

    #[test]
    fn undo_restores_load_state_and_saves_once() {
        let mut set = three_untranslated();
        set.translate(2, "other", "Trës").unwrap();

        let api = MockApi::new();
        api.reply(json!({"13": {"status": 200}}));
        set.undo(&api, 2).unwrap();

        let e = set.entry(2).unwrap();
        assert_eq!(e.translated_strings(), e.load_default());
        assert_eq!(api.save_calls(), 1);
        assert!(!e.is_modified());
    }

    #[test]
    fn save_and_exit_reports_messages() {
        let mut set = three_untranslated();
        set.translate(0, "other", "Um").unwrap();

        let api = MockApi::new();
        api.reply(json!({"11": {"status": 400, "message": "bad placeholder"}}));
        let status = set.save_and_exit(&api).unwrap();
        assert!(status.updated);
        assert!(!status.clean);
    }
}
