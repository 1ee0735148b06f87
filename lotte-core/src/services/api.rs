use rand::{thread_rng, Rng};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde_json::{json, Value};

use std::{rc::Rc, thread, time::Duration};

use crate::config::LotteConfig;
use crate::error::{SyncError, SyncResult};
use crate::services::machine_translation::{self, MtProvider, MtReply};
use crate::services::spellcheck::SpellcheckHit;
use crate::services::sync_types::{SaveBatch, SaveResponse};

/// Everything the editor needs from the server.
pub trait LotteApi {
    /// One request for the whole batch. Per-entry rejections are in the response.
    fn save(&self, batch: &SaveBatch) -> SyncResult<SaveResponse>;

    fn spellcheck(&self, text: &str) -> SyncResult<Vec<SpellcheckHit>>;

    fn auto_translate(&self, text: &str, source: &str, target: &str) -> SyncResult<MtReply>;

    fn supported_languages(&self, target: &str) -> SyncResult<Vec<String>>;
}

impl<T: LotteApi + ?Sized> LotteApi for Rc<T> {
    fn save(&self, batch: &SaveBatch) -> SyncResult<SaveResponse> {
        (**self).save(batch)
    }

    fn spellcheck(&self, text: &str) -> SyncResult<Vec<SpellcheckHit>> {
        (**self).spellcheck(text)
    }

    fn auto_translate(&self, text: &str, source: &str, target: &str) -> SyncResult<MtReply> {
        (**self).auto_translate(text, source, target)
    }

    fn supported_languages(&self, target: &str) -> SyncResult<Vec<String>> {
        (**self).supported_languages(target)
    }
}

const BASE_DELAY_MS: u64 = 800;

fn backoff(attempt: usize) -> Duration {
    let jitter: u64 = thread_rng().gen_range(0..200);
    let ms = BASE_DELAY_MS * (2_u64.pow(attempt as u32)) + jitter;
    Duration::from_millis(ms)
}

fn should_retry_http(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn extract_error_message(status: StatusCode, body_text: &str) -> SyncError {
    let message = serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .or_else(|| v.get("message").and_then(|m| m.as_str()))
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body_text.trim();
            match trimmed.char_indices().nth(400) {
                Some((cut, _)) => format!("{}...", &trimmed[..cut]),
                None => trimmed.to_string(),
            }
        });

    SyncError::Http {
        status: status.as_u16(),
        message,
    }
}

/// Blocking HTTP client for the lotte endpoints.
pub struct HttpApi {
    client: Client,
    push_url: String,
    spellcheck_url: String,
    autotranslate_url: String,
    supportedlangs_url: String,
    provider: MtProvider,
    max_retries: usize,
}

impl HttpApi {
    pub fn new(cfg: &LotteConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            push_url: cfg.push_url.clone(),
            spellcheck_url: cfg.spellcheck_url.clone(),
            autotranslate_url: cfg.autotranslate_url.clone(),
            supportedlangs_url: cfg.supportedlangs_url.clone(),
            provider: cfg.autotranslate_provider,
            max_retries: cfg.max_retries.max(1),
        })
    }

    fn send_once(&self, req: RequestBuilder) -> SyncResult<String> {
        let resp = req.send()?;
        let status = resp.status();
        let text = resp.text()?;

        if !status.is_success() {
            return Err(extract_error_message(status, &text));
        }
        Ok(text)
    }

    /// For read-only calls: retries transient failures with backoff.
    fn fetch_json(&self, build: impl Fn() -> RequestBuilder) -> SyncResult<Value> {
        let mut last_err = SyncError::Transport("no attempt made".into());

        for attempt in 0..self.max_retries {
            match self.send_once(build()) {
                Ok(text) => {
                    return serde_json::from_str(&text)
                        .map_err(|e| SyncError::Malformed(e.to_string()))
                }
                Err(e) => {
                    let retry = match &e {
                        SyncError::Http { status, .. } => StatusCode::from_u16(*status)
                            .map(should_retry_http)
                            .unwrap_or(false),
                        SyncError::Transport(_) | SyncError::Timeout => true,
                        SyncError::Malformed(_) => false,
                    };
                    last_err = e;
                    if retry && attempt + 1 < self.max_retries {
                        log::debug!("retrying after: {last_err}");
                        thread::sleep(backoff(attempt));
                        continue;
                    }
                    break;
                }
            }
        }

        Err(last_err)
    }
}

impl LotteApi for HttpApi {
    fn save(&self, batch: &SaveBatch) -> SyncResult<SaveResponse> {
        // The server answers with text/html on some errors, so read text first.
        let text = self.send_once(self.client.post(&self.push_url).json(batch))?;
        serde_json::from_str(&text).map_err(|e| SyncError::Malformed(e.to_string()))
    }

    fn spellcheck(&self, text: &str) -> SyncResult<Vec<SpellcheckHit>> {
        let body = json!({ "text": text });
        let v = self.fetch_json(|| self.client.post(&self.spellcheck_url).json(&body))?;
        serde_json::from_value(v).map_err(|e| SyncError::Malformed(e.to_string()))
    }

    fn auto_translate(&self, text: &str, source: &str, target: &str) -> SyncResult<MtReply> {
        let v = self.fetch_json(|| {
            self.client
                .get(&self.autotranslate_url)
                .query(&[("q", text), ("source", source), ("target", target)])
        })?;
        machine_translation::normalize_translation(self.provider, &v)
    }

    fn supported_languages(&self, target: &str) -> SyncResult<Vec<String>> {
        let v = self.fetch_json(|| {
            self.client
                .get(&self.supportedlangs_url)
                .query(&[("target", target)])
        })?;
        machine_translation::normalize_languages(self.provider, &v)
    }
}

/// In-memory server for tests: canned replies, recorded requests.
pub mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use serde_json::Value;

    use super::LotteApi;
    use crate::error::{SyncError, SyncResult};
    use crate::services::machine_translation::MtReply;
    use crate::services::spellcheck::SpellcheckHit;
    use crate::services::sync_types::{SaveBatch, SaveResponse};

    #[derive(Default)]
    pub struct MockApi {
        saves: RefCell<VecDeque<SyncResult<SaveResponse>>>,
        sent: RefCell<Vec<SaveBatch>>,
        spellchecks: RefCell<VecDeque<SyncResult<Vec<SpellcheckHit>>>>,
        spellcheck_texts: RefCell<Vec<String>>,
        translations: RefCell<VecDeque<SyncResult<MtReply>>>,
        translate_calls: RefCell<Vec<(String, String, String)>>,
        languages: RefCell<Vec<String>>,
    }

    impl MockApi {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a save response given as JSON.
        pub fn reply(&self, response: Value) {
            let parsed = serde_json::from_value(response)
                .map_err(|e| SyncError::Malformed(e.to_string()));
            self.saves.borrow_mut().push_back(parsed);
        }

        pub fn fail(&self, err: SyncError) {
            self.saves.borrow_mut().push_back(Err(err));
        }

        pub fn spellcheck_reply(&self, hits: Value) {
            let parsed = serde_json::from_value(hits)
                .map_err(|e| SyncError::Malformed(e.to_string()));
            self.spellchecks.borrow_mut().push_back(parsed);
        }

        pub fn translation_reply(&self, reply: MtReply) {
            self.translations.borrow_mut().push_back(Ok(reply));
        }

        pub fn set_languages(&self, langs: &[&str]) {
            *self.languages.borrow_mut() = langs.iter().map(|s| s.to_string()).collect();
        }

        pub fn save_calls(&self) -> usize {
            self.sent.borrow().len()
        }

        pub fn sent(&self) -> Vec<SaveBatch> {
            self.sent.borrow().clone()
        }

        pub fn spellcheck_texts(&self) -> Vec<String> {
            self.spellcheck_texts.borrow().clone()
        }

        pub fn translate_calls(&self) -> Vec<(String, String, String)> {
            self.translate_calls.borrow().clone()
        }
    }

    fn exhausted<T>(what: &str) -> SyncResult<T> {
        Err(SyncError::Transport(format!("no canned {what} reply")))
    }

    impl LotteApi for MockApi {
        fn save(&self, batch: &SaveBatch) -> SyncResult<SaveResponse> {
            self.sent.borrow_mut().push(batch.clone());
            self.saves
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| exhausted("save"))
        }

        fn spellcheck(&self, text: &str) -> SyncResult<Vec<SpellcheckHit>> {
            self.spellcheck_texts.borrow_mut().push(text.to_string());
            self.spellchecks
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| exhausted("spellcheck"))
        }

        fn auto_translate(&self, text: &str, source: &str, target: &str) -> SyncResult<MtReply> {
            self.translate_calls.borrow_mut().push((
                text.to_string(),
                source.to_string(),
                target.to_string(),
            ));
            self.translations
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| exhausted("translation"))
        }

        fn supported_languages(&self, _target: &str) -> SyncResult<Vec<String>> {
            Ok(self.languages.borrow().clone())
        }
    }
}
