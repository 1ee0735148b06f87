//! Error types for the editing core.
//!
//! Every failure stops at the sync boundary and becomes either a message
//! attached to an entry or one notice for the user. Nothing here is fatal
//! to a session.

use std::path::PathBuf;
use thiserror::Error;

/// Umbrella error for everything the driver can report.
#[derive(Error, Debug)]
pub enum LotteError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Assist(#[from] AssistError),

    /// Driver command with a missing or mistyped field.
    #[error("invalid request: {0}")]
    BadRequest(String),
}

/// Request-level failures talking to the server.
///
/// These never mutate an entry. Per-entry rejections are not errors, they
/// come back inside a successful response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read configuration: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration format: {0}")]
    Parse(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("no string at index {0}")]
    UnknownIndex(usize),


    #[error("string {id} has no plural rule '{rule}'")]
    UnknownRule { id: u64, rule: String },

    #[error("duplicate string id {0} in snapshot")]
    DuplicateId(u64),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("page {page} out of range ({pages} pages)")]
    PageOutOfRange { page: usize, pages: usize },

    #[error("no strings loaded")]
    NotLoaded,
}

/// Failures of the spellcheck and machine-translation helpers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssistError {
    #[error("spellcheck is disabled")]
    SpellcheckDisabled,

    #[error("nothing to check, translation is empty")]
    NothingToCheck,

    #[error("invalid spellcheck reply: {0}")]
    BadSpellcheckReply(String),

    #[error("no misspelled word at position {0}")]
    UnknownBadWord(usize),

    #[error("'{0}' is not one of the suggestions")]
    UnknownSuggestion(String),

    #[error("machine translation does not support {source_lang} -> {target_lang}")]
    UnsupportedPair {
        source_lang: String,
        target_lang: String,
    },

    #[error("translation changed since the spellcheck panel opened")]
    SpellcheckOutdated,

    #[error(transparent)]
    Request(#[from] SyncError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type SyncResult<T> = Result<T, SyncError>;

pub type LotteResult<T> = Result<T, LotteError>;

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Timeout
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

impl SyncError {
    /// Message for the one-shot notice shown after a failed request.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Timeout | SyncError::Transport(_) => {
                "Error saving new translation. Check your connection and try again.".to_string()
            }
            SyncError::Http { status, .. } if *status == 403 => {
                "You are not allowed to submit translations here.".to_string()
            }
            SyncError::Http { .. } | SyncError::Malformed(_) => {
                "Error saving new translation.".to_string()
            }
        }
    }
}

impl LotteError {
    pub fn user_message(&self) -> String {
        match self {
            LotteError::Sync(e) => e.user_message(),
            LotteError::Assist(AssistError::Request(_)) => {
                "Sorry, there was an error in processing the request.".to_string()
            }
            other => other.to_string(),
        }
    }
}
