use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::entry::Translations;

/// Wire status for an accepted save.
pub const STATUS_OK: i64 = 200;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct SaveItem {
    pub id: u64,
    pub translations: Translations,
}

/// Request body: `{"strings": [{id, translations}, ...]}`.
#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct SaveBatch {
    pub strings: Vec<SaveItem>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SaveReply {
    pub status: i64,

    #[serde(default)]
    pub message: Option<String>,
}

impl SaveReply {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK,
            message: None,
        }
    }

    pub fn rejected(status: i64, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }
}

/// Response body, keyed by the entry id as a string.
pub type SaveResponse = HashMap<String, SaveReply>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTarget {
    /// Save button or undo on one row.
    Entry(usize),
    /// Save-all: every modified entry.
    All,
    /// Focus left a row. At most one request per entry is in flight on this path.
    Autosave(usize),
}

/// A batch on its way to the server. The batch doubles as the snapshot
/// used to detect edits made while the request was pending.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub target: SaveTarget,
    pub batch: SaveBatch,
    pub(crate) indices: Vec<usize>,
}

impl SaveRequest {
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

#[derive(Debug)]
pub enum SavePlan {
    Send(SaveRequest),
    NothingToSave,
    /// Same entry already on the wire; this trigger is folded into it.
    Coalesced,
    /// Auto-save queued until the outstanding request is answered.
    Deferred,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ItemOutcome {
    Saved,
    SavedWithWarning(String),
    /// Server stored the snapshot but the entry was edited meanwhile.
    Stale,
    Rejected(String),
    /// Response had no key for this entry. Left untouched.
    Missing,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub id: u64,
    pub index: usize,
    pub outcome: ItemOutcome,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub items: Vec<ItemResult>,

    /// Deferred auto-saves to send now that the entry is free.
    #[serde(skip)]
    pub follow_up: Vec<usize>,
}

impl SaveReport {
    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }

    pub fn saved(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Saved | ItemOutcome::SavedWithWarning(_)))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Rejected(_)))
    }

    pub fn missing(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Missing))
    }

    pub fn stale(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Stale))
    }

    /// Any warning or error the translator should look at.
    pub fn has_messages(&self) -> bool {
        self.count(|o| {
            matches!(
                o,
                ItemOutcome::SavedWithWarning(_) | ItemOutcome::Rejected(_)
            )
        }) > 0
    }

    pub fn outcome_for(&self, id: u64) -> Option<&ItemOutcome> {
        self.items.iter().find(|i| i.id == id).map(|i| &i.outcome)
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SaveOutcome {
    NothingToSave,
    Coalesced,
    Deferred,
    Completed(SaveReport),
}

impl SaveOutcome {
    pub fn report(&self) -> Option<&SaveReport> {
        match self {
            SaveOutcome::Completed(r) => Some(r),
            _ => None,
        }
    }
}

/// Result of the save-and-exit path.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    /// The server answered at least one save during this session.
    pub updated: bool,
    /// No entry carries a warning or error.
    pub clean: bool,
    pub outcome: SaveOutcome,
}
