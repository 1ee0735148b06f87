use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::services::machine_translation::MtProvider;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "LOTTE_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "lotte.json";

fn default_push_url() -> String {
    "http://localhost:8000/lotte/push/".to_string()
}

fn default_source_lang() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_rows_per_page() -> usize {
    25
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LotteConfig {
    #[serde(default = "default_push_url")]
    pub push_url: String,

    #[serde(default)]
    pub spellcheck_url: String,

    #[serde(default)]
    pub autotranslate_url: String,

    #[serde(default)]
    pub supportedlangs_url: String,

    #[serde(default, alias = "autotranslate_type")]
    pub autotranslate_provider: MtProvider,

    #[serde(default = "default_source_lang", alias = "source_language")]
    pub source_lang: String,

    #[serde(default, alias = "target_language")]
    pub target_lang: String,

    #[serde(default = "default_true")]
    pub enable_spellcheck: bool,

    #[serde(default = "default_debounce_ms")]
    pub stats_debounce_ms: u64,

    #[serde(default = "default_debounce_ms")]
    pub search_debounce_ms: u64,

    #[serde(default = "default_rows_per_page")]
    pub rows_per_page: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts for read-only assist calls. Saves are never retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for LotteConfig {
    fn default() -> Self {
        Self {
            push_url: default_push_url(),
            spellcheck_url: String::new(),
            autotranslate_url: String::new(),
            supportedlangs_url: String::new(),
            autotranslate_provider: MtProvider::default(),
            source_lang: default_source_lang(),
            target_lang: String::new(),
            enable_spellcheck: true,
            stats_debounce_ms: default_debounce_ms(),
            search_debounce_ms: default_debounce_ms(),
            rows_per_page: default_rows_per_page(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl LotteConfig {
    /// Loads from `$LOTTE_CONFIG`, or `lotte.json` in the working directory.
    /// A missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let cfg: LotteConfig =
            serde_json::from_str(data).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.push_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "push_url".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.rows_per_page == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rows_per_page".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_retries".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = LotteConfig::from_json("{}").unwrap();
        assert_eq!(cfg.stats_debounce_ms, 1000);
        assert_eq!(cfg.rows_per_page, 25);
        assert!(cfg.enable_spellcheck);
        assert_eq!(cfg.autotranslate_provider, MtProvider::Google);
    }

    #[test]
    fn accepts_legacy_keys() {
        let cfg = LotteConfig::from_json(
            r#"{"autotranslate_type": "BT", "target_language": "pt_BR"}"#,
        )
        .unwrap();
        assert_eq!(cfg.autotranslate_provider, MtProvider::Bing);
        assert_eq!(cfg.target_lang, "pt_BR");
    }

    #[test]
    fn rejects_zero_page_size() {
        let err = LotteConfig::from_json(r#"{"rows_per_page": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "rows_per_page"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            LotteConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
