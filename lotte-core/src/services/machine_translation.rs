use std::sync::OnceLock;

use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LotteConfig;
use crate::error::{AssistError, SyncError, SyncResult};
use crate::services::api::LotteApi;
use crate::services::stringset::StringSet;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MtProvider {
    #[default]
    #[serde(alias = "GT")]
    Google,
    #[serde(alias = "BT")]
    Bing,
}

/// Provider reply reduced to the one thing the editor cares about.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MtReply {
    Translation(String),
    Error(String),
}

/// `pt_BR` and `pt-BR` become `pt`; plain codes pass through.
pub fn canonical_lang_code(code: &str) -> &str {
    if code.contains(['_', '-']) {
        match code.char_indices().nth(2) {
            Some((cut, _)) => &code[..cut],
            None => code,
        }
    } else {
        code
    }
}

fn provider_error(v: &Value) -> Option<String> {
    let err = v.get("error")?;
    if err.is_null() {
        return None;
    }
    Some(
        err.get("message")
            .and_then(Value::as_str)
            .or_else(|| err.as_str())
            .unwrap_or("unknown provider error")
            .to_string(),
    )
}

pub fn normalize_translation(provider: MtProvider, v: &Value) -> SyncResult<MtReply> {
    if let Some(message) = provider_error(v) {
        return Ok(MtReply::Error(message));
    }

    let pointer = match provider {
        MtProvider::Google => "/data/translations/0/translatedText",
        MtProvider::Bing => "/0/TranslatedText",
    };

    v.pointer(pointer)
        .and_then(Value::as_str)
        .map(|t| MtReply::Translation(t.to_string()))
        .ok_or_else(|| SyncError::Malformed(format!("no translation at {pointer}")))
}

pub fn normalize_languages(provider: MtProvider, v: &Value) -> SyncResult<Vec<String>> {
    if let Some(message) = provider_error(v) {
        warn!("supported languages lookup failed: {message}");
        return Ok(Vec::new());
    }

    let list = match provider {
        MtProvider::Google => v.pointer("/data/languages").and_then(Value::as_array).map(|langs| {
            langs
                .iter()
                .filter_map(|l| l.get("language").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        }),
        MtProvider::Bing => v.as_array().map(|langs| {
            langs
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        }),
    };

    list.ok_or_else(|| SyncError::Malformed("unexpected supported languages shape".into()))
}

/// Google only lists sources for the requested target; Bing lists both ends.
pub fn pair_supported(provider: MtProvider, langs: &[String], source: &str, target: &str) -> bool {
    let has = |code: &str| langs.iter().any(|l| l == code);
    match provider {
        MtProvider::Google => has(canonical_lang_code(source)),
        MtProvider::Bing => has(canonical_lang_code(source)) && has(canonical_lang_code(target)),
    }
}

fn placeholder_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%\s+(\([^\)]+\))\s*s").ok())
        .as_ref()
}

/// Undo what the providers do to HTML entities and `%(name)s` placeholders.
pub fn postprocess(text: &str) -> String {
    let text = text.replace("&#39;", "'").replace("&quot;", "\"");
    match placeholder_re() {
        Some(re) => re.replace_all(&text, " %${1}s ").into_owned(),
        None => text,
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct RuleError {
    pub rule: String,
    pub message: String,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct SuggestReport {
    /// Plural rules whose slot now holds a suggestion.
    pub applied: Vec<String>,
    pub errors: Vec<RuleError>,
}

/// Suggestion helper bound to one language pair.
pub struct MachineTranslator {
    provider: MtProvider,
    source_lang: String,
    target_lang: String,
    supported: Option<bool>,
}

impl MachineTranslator {
    pub fn new(provider: MtProvider, source_lang: &str, target_lang: &str) -> Self {
        Self {
            provider,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            supported: None,
        }
    }

    pub fn from_config(cfg: &LotteConfig) -> Self {
        Self::new(cfg.autotranslate_provider, &cfg.source_lang, &cfg.target_lang)
    }

    /// Asks the server once; the answer is kept for the session.
    pub fn is_available(&mut self, api: &dyn LotteApi) -> Result<bool, AssistError> {
        if let Some(known) = self.supported {
            return Ok(known);
        }
        if self.target_lang.is_empty() {
            self.supported = Some(false);
            return Ok(false);
        }

        let langs = api.supported_languages(&self.target_lang)?;
        let ok = pair_supported(self.provider, &langs, &self.source_lang, &self.target_lang);
        debug!(
            "machine translation {} -> {}: {}",
            self.source_lang,
            self.target_lang,
            if ok { "supported" } else { "unsupported" }
        );
        self.supported = Some(ok);
        Ok(ok)
    }

    /// Fills every plural slot of the entry with a provider suggestion.
    ///
    /// Each slot is translated from its own source rule, falling back to
    /// `other`. A failure on one slot is reported and the others still apply.
    pub fn suggest(
        &mut self,
        set: &mut StringSet,
        api: &dyn LotteApi,
        index: usize,
    ) -> Result<SuggestReport, AssistError> {
        if !self.is_available(api)? {
            return Err(AssistError::UnsupportedPair {
                source_lang: self.source_lang.clone(),
                target_lang: self.target_lang.clone(),
            });
        }

        let entry = set.entry(index)?;
        let jobs: Vec<(String, String)> = entry
            .rules()
            .filter_map(|rule| entry.source_for(rule).map(|src| (rule.to_string(), src.to_string())))
            .collect();

        let source = canonical_lang_code(&self.source_lang).to_string();
        let mut report = SuggestReport::default();

        for (rule, text) in jobs {
            match api.auto_translate(&text, &source, &self.target_lang) {
                Ok(MtReply::Translation(t)) => {
                    set.translate(index, &rule, &postprocess(&t))?;
                    report.applied.push(rule);
                }
                Ok(MtReply::Error(message)) => {
                    report.errors.push(RuleError { rule, message });
                }
                Err(e) => {
                    warn!("suggestion for string {index} failed: {e}");
                    report.errors.push(RuleError {
                        rule,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_codes() {
        assert_eq!(canonical_lang_code("pt_BR"), "pt");
        assert_eq!(canonical_lang_code("zh-Hant"), "zh");
        assert_eq!(canonical_lang_code("de"), "de");
        assert_eq!(canonical_lang_code("ast"), "ast");
    }

    #[test]
    fn postprocess_fixes_entities_and_placeholders() {
        assert_eq!(postprocess("l&#39;eau &quot;x&quot;"), "l'eau \"x\"");
        assert_eq!(postprocess("Olá % (name) s!"), "Olá  %(name)s !");
        assert_eq!(postprocess("%(n)s ok"), "%(n)s ok");
    }

    #[test]
    fn google_reply_shapes() {
        let ok = json!({"data": {"translations": [{"translatedText": "Olá"}]}});
        assert_eq!(
            normalize_translation(MtProvider::Google, &ok).unwrap(),
            MtReply::Translation("Olá".into())
        );

        let err = json!({"error": {"message": "Bad language pair"}});
        assert_eq!(
            normalize_translation(MtProvider::Google, &err).unwrap(),
            MtReply::Error("Bad language pair".into())
        );

        assert!(normalize_translation(MtProvider::Google, &json!({})).is_err());
    }

    #[test]
    fn bing_reply_shape() {
        let ok = json!([{"TranslatedText": "Hallo"}]);
        assert_eq!(
            normalize_translation(MtProvider::Bing, &ok).unwrap(),
            MtReply::Translation("Hallo".into())
        );
    }

    #[test]
    fn supported_pair_rules() {
        let google = normalize_languages(
            MtProvider::Google,
            &json!({"data": {"languages": [{"language": "en"}, {"language": "fr"}]}}),
        )
        .unwrap();
        assert!(pair_supported(MtProvider::Google, &google, "en_US", "pt_BR"));
        assert!(!pair_supported(MtProvider::Google, &google, "ja", "pt_BR"));

        let bing = normalize_languages(MtProvider::Bing, &json!(["en", "de"])).unwrap();
        assert!(pair_supported(MtProvider::Bing, &bing, "en", "de_AT"));
        assert!(!pair_supported(MtProvider::Bing, &bing, "en", "pt_BR"));
    }

    #[test]
    fn provider_aliases() {
        let p: MtProvider = serde_json::from_value(json!("GT")).unwrap();
        assert_eq!(p, MtProvider::Google);
        let p: MtProvider = serde_json::from_value(json!("bing")).unwrap();
        assert_eq!(p, MtProvider::Bing);
    }
}
