use std::io::{self, BufRead, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use lotte_core::config::LotteConfig;
use lotte_core::protocol::Session;
use lotte_core::services::api::HttpApi;
use lotte_core::services::debounce::SystemClock;

fn main() {
    // stdout carries the protocol; logs go to stderr.
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info,lotte_core=debug"),
    )
    .init();

    let config = match LotteConfig::load() {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}, using defaults");
            LotteConfig::default()
        }
    };

    let api = match HttpApi::new(&config) {
        Ok(a) => a,
        Err(e) => {
            log::error!("cannot build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let mut session = Session::new(config, Box::new(api), Rc::new(SystemClock));

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };

        if line.trim().is_empty() {
            continue;
        }

        let result = catch_unwind(AssertUnwindSafe(|| session.handle(&line)));

        let response = match result {
            Ok(resp) => resp,
            Err(_) => serde_json::json!({
                "status": "error",
                "message": "internal core error"
            })
            .to_string(),
        };

        if writeln!(stdout, "{response}").is_err() {
            break;
        }

        let _ = stdout.flush();
    }
}
