use std::rc::Rc;

use log::{debug, warn};
use serde_json::{json, Value};

use crate::config::LotteConfig;
use crate::error::{AssistError, LotteError, LotteResult, ModelError};
use crate::model::entry::DEFAULT_RULE;
use crate::services::api::LotteApi;
use crate::services::debounce::Clock;
use crate::services::machine_translation::MachineTranslator;
use crate::services::spellcheck::SpellcheckPanel;
use crate::services::stringset::filter::StringFilter;
use crate::services::stringset::{StringSet, StringSetOptions};
use crate::services::sync_types::SaveTarget;

mod command;
pub use command::Command;

fn get_cmd(req: &Value) -> &str {
    req.get("cmd").and_then(|v| v.as_str()).unwrap_or("")
}

fn get_id(req: &Value) -> Value {
    req.get("id").cloned().unwrap_or(Value::Null)
}

fn get_payload(req: &Value) -> &Value {
    static EMPTY: Value = Value::Null;
    req.get("payload").unwrap_or(&EMPTY)
}

fn ok(id: Value, payload: Value) -> String {
    json!({
        "id": id,
        "status": "ok",
        "payload": payload
    })
    .to_string()
}

fn err(id: Value, message: impl Into<String>) -> String {
    json!({
        "id": id,
        "status": "error",
        "message": message.into()
    })
    .to_string()
}

fn get_index(payload: &Value, key: &str) -> LotteResult<usize> {
    payload
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| LotteError::BadRequest(format!("payload.{key} must be a non-negative integer")))
}

fn get_str<'a>(payload: &'a Value, key: &str) -> LotteResult<&'a str> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| LotteError::BadRequest(format!("payload.{key} must be a string")))
}

fn to_json<T: serde::Serialize>(value: &T) -> LotteResult<Value> {
    serde_json::to_value(value).map_err(|e| LotteError::BadRequest(e.to_string()))
}

fn loaded(set: &mut Option<StringSet>) -> Result<&mut StringSet, ModelError> {
    set.as_mut().ok_or(ModelError::NotLoaded)
}

/// One editor session driven over the JSON-lines protocol.
pub struct Session {
    config: LotteConfig,
    api: Box<dyn LotteApi>,
    clock: Rc<dyn Clock>,
    set: Option<StringSet>,
    panel: Option<SpellcheckPanel>,
    translator: MachineTranslator,
}

impl Session {
    pub fn new(config: LotteConfig, api: Box<dyn LotteApi>, clock: Rc<dyn Clock>) -> Self {
        let translator = MachineTranslator::from_config(&config);
        Self {
            config,
            api,
            clock,
            set: None,
            panel: None,
            translator,
        }
    }

    pub fn handle(&mut self, input: &str) -> String {
        let req: Value = match serde_json::from_str(input) {
            Ok(v) => v,
            Err(_) => {
                return json!({
                    "status": "error",
                    "message": "invalid json"
                })
                .to_string();
            }
        };

        let id = get_id(&req);
        let cmd_str = get_cmd(&req);
        let payload = get_payload(&req);
        let cmd = Command::from(cmd_str);

        if cmd == Command::Unknown {
            return err(id, "unknown command");
        }

        if !cmd.skips_pretick() {
            if let Some(set) = self.set.as_mut() {
                set.tick();
            }
        }

        match self.dispatch(cmd, payload) {
            Ok(v) => ok(id, v),
            Err(e) => {
                debug!("{cmd_str} failed: {e}");
                err(id, e.user_message())
            }
        }
    }

    fn dispatch(&mut self, cmd: Command, payload: &Value) -> LotteResult<Value> {
        let api = self.api.as_ref();

        match cmd {
            Command::Ping => Ok(json!({ "message": "lotte-core alive" })),

            Command::Load => {
                let snapshot = payload.get("snapshot").unwrap_or(payload);
                let set = StringSet::from_snapshot(
                    snapshot,
                    StringSetOptions::from_config(&self.config),
                    Rc::clone(&self.clock),
                )?;
                let reply = json!({ "total": set.len(), "stats": set.stats() });
                self.set = Some(set);
                self.panel = None;
                Ok(reply)
            }

            Command::Translate => {
                let index = get_index(payload, "index")?;
                let rule = payload.get("rule").and_then(|v| v.as_str()).unwrap_or(DEFAULT_RULE);
                let text = get_str(payload, "text")?;

                let set = loaded(&mut self.set)?;
                let effect = set.translate(index, rule, text)?;
                let entry = set.entry(index)?;
                Ok(json!({
                    "changed": effect.changed(),
                    "modified": entry.is_modified(),
                    "flag": entry.flag_string(),
                }))
            }

            Command::Push => {
                let index = get_index(payload, "index")?;
                let outcome = loaded(&mut self.set)?.push(api, SaveTarget::Entry(index))?;
                to_json(&outcome)
            }

            Command::PushAll => {
                let outcome = loaded(&mut self.set)?.push(api, SaveTarget::All)?;
                to_json(&outcome)
            }

            Command::Undo => {
                let index = get_index(payload, "index")?;
                let outcome = loaded(&mut self.set)?.undo(api, index)?;
                to_json(&outcome)
            }

            Command::CopySource => {
                let index = get_index(payload, "index")?;
                let changed = loaded(&mut self.set)?.copy_source(index)?;
                Ok(json!({ "changed": changed }))
            }

            Command::Filter => {
                let filter: StringFilter = if payload.is_null() {
                    StringFilter::default()
                } else {
                    serde_json::from_value(payload.clone())
                        .map_err(|e| LotteError::BadRequest(format!("invalid filter: {e}")))?
                };
                let set = loaded(&mut self.set)?;
                set.filter(filter);
                Ok(json!({ "filtered": set.filtered().len(), "pages": set.page_count() }))
            }

            Command::Search => {
                let text = payload.get("text").and_then(|v| v.as_str()).unwrap_or("");
                let search = (!text.is_empty()).then(|| text.to_string());
                loaded(&mut self.set)?.schedule_search(search);
                Ok(json!({ "scheduled": true }))
            }

            Command::Page => {
                let page = get_index(payload, "page")?;
                let set = loaded(&mut self.set)?;
                set.set_page(page)?;
                Ok(view(set))
            }

            Command::View => Ok(view(loaded(&mut self.set)?)),

            Command::Stats => {
                let set = loaded(&mut self.set)?;
                let stats = set.stats();
                Ok(json!({
                    "stats": stats,
                    "translated_percent": stats.percent(stats.translated),
                    "untranslated_percent": stats.percent(stats.untranslated),
                    "modified_percent": stats.percent(stats.modified),
                    "pending": set.stats_pending(),
                    "generation": set.stats_generation(),
                }))
            }

            Command::Tick => to_json(&loaded(&mut self.set)?.tick()),

            Command::Focus => {
                let index = get_index(payload, "index")?;
                let autosave = loaded(&mut self.set)?.focus_and_autosave(api, index)?;
                Ok(json!({ "autosave": autosave }))
            }

            Command::Blur => {
                let index = get_index(payload, "index")?;
                loaded(&mut self.set)?.blur(index)?;
                Ok(json!({}))
            }

            Command::SpellcheckOpen => {
                let index = get_index(payload, "index")?;
                let set = loaded(&mut self.set)?;
                self.panel = set.open_spellcheck(api, index, self.config.enable_spellcheck)?;
                Ok(panel_json(self.panel.as_ref()))
            }

            Command::SpellcheckAccept => {
                let bad = get_index(payload, "index")?;
                let suggestion = get_str(payload, "suggestion")?;
                let set = loaded(&mut self.set)?;
                let panel = self.panel.as_mut().ok_or_else(no_panel)?;
                let accepted = set.spellcheck_accept(panel, bad, suggestion);
                if matches!(accepted, Err(AssistError::SpellcheckOutdated)) {
                    self.panel = None;
                }
                accepted?;
                self.close_panel_if_done();
                Ok(panel_json(self.panel.as_ref()))
            }

            Command::SpellcheckIgnore => {
                let bad = get_index(payload, "index")?;
                self.panel.as_mut().ok_or_else(no_panel)?.ignore(bad)?;
                self.close_panel_if_done();
                Ok(panel_json(self.panel.as_ref()))
            }

            Command::SpellcheckIgnoreAll => {
                self.panel.as_mut().ok_or_else(no_panel)?.ignore_all();
                self.close_panel_if_done();
                Ok(panel_json(self.panel.as_ref()))
            }

            Command::SpellcheckClose => {
                self.panel = None;
                Ok(panel_json(None))
            }

            Command::Suggest => {
                let index = get_index(payload, "index")?;
                let set = loaded(&mut self.set)?;
                let report = self.translator.suggest(set, api, index)?;
                to_json(&report)
            }

            Command::SaveAndExit => {
                let status = loaded(&mut self.set)?.save_and_exit(api)?;
                if !status.clean {
                    warn!("leaving with strings that carry messages");
                }
                to_json(&status)
            }

            Command::Unknown => Err(LotteError::BadRequest("unknown command".into())),
        }
    }

    fn close_panel_if_done(&mut self) {
        if self.panel.as_ref().is_some_and(|p| p.is_done()) {
            self.panel = None;
        }
    }
}

fn no_panel() -> LotteError {
    LotteError::BadRequest("no spellcheck panel is open".into())
}

fn panel_json(panel: Option<&SpellcheckPanel>) -> Value {
    match panel {
        Some(p) => json!({
            "open": true,
            "entry": p.entry,
            "segments": p.segments(),
            "errors": p
                .error_indices()
                .into_iter()
                .filter_map(|i| p.bad_word(i).map(|w| json!({
                    "index": i,
                    "word": w.word,
                    "suggestions": w.suggestions,
                })))
                .collect::<Vec<_>>(),
        }),
        None => json!({ "open": false }),
    }
}

fn view(set: &StringSet) -> Value {
    let rows: Vec<Value> = set
        .visible_rows()
        .into_iter()
        .filter_map(|b| {
            set.get(b.index).map(|s| {
                json!({
                    "row": b.row,
                    "index": b.index,
                    "id": b.id,
                    "flag": s.flag_string(),
                    "string": s,
                })
            })
        })
        .collect();

    json!({
        "page": set.page(),
        "pages": set.page_count(),
        "filtered": set.filtered().len(),
        "rows": rows,
    })
}
