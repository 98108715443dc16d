//! linksync RPC Server: JSON-RPC over stdin/stdout for a UI front end.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"bookmark.add", "params":{"url":"...","category":"..."}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//! Events:   {"event":"collection_changed", ...} / {"event":"notice", ...}, unsolicited.
//!
//! Logs go to stderr; stdout carries protocol lines only.

use std::io::{self, Write};
use std::time::Instant;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use linksync::app::App;
use linksync::platform;
use linksync::rpc_handler::handle_method;
use linksync::services::settings_engine::{SettingsEngine, SettingsEngineTrait};

/// Environment variable holding a `tracing` filter; overrides the settings file.
const LOG_ENV: &str = "LINKSYNC_LOG";

/// Fixed-window limiter: at most `max_per_second` requests per second.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self { window_start: Instant::now(), request_count: 0, max_per_second }
    }

    fn check(&mut self) -> bool {
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

fn emit(line: &Value) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{}", line);
    let _ = stdout.flush();
}

fn init_logging(settings_filter: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(settings_filter));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut settings_engine = SettingsEngine::new(None);
    // A broken settings file is reported once logging is up; defaults apply meanwhile.
    let settings_result = settings_engine.load();
    let log_filter = settings_result
        .as_ref()
        .map(|s| s.logging.filter.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(&log_filter);
    if let Err(e) = &settings_result {
        warn!(path = settings_engine.get_config_path(), error = %e, "settings unreadable, using defaults");
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let data_dir = platform::get_data_dir();
    let app = match App::open(&data_dir, settings_engine, events_tx) {
        Ok(app) => Mutex::new(app),
        Err(e) => {
            error!(error = %e, "failed to initialize linksync");
            emit(&json!({"event": "fatal", "error": e.to_string()}));
            std::process::exit(1);
        }
    };

    emit(&json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")}));

    if let Err(e) = app.lock().await.startup().await {
        error!(error = %e, "could not restore the previous sync session");
    }

    let mut rate_limiter = RateLimiter::new(200);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => {
                match serde_json::to_value(&event) {
                    Ok(value) => emit(&value),
                    Err(e) => warn!(error = %e, "could not encode event"),
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "stdin read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let req: Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        emit(&json!({"id": null, "error": format!("parse error: {}", e)}));
                        continue;
                    }
                };
                let id = req.get("id").cloned().unwrap_or(Value::Null);

                if !rate_limiter.check() {
                    emit(&json!({"id": id, "error": "rate limit exceeded"}));
                    continue;
                }

                let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("");
                let params = req.get("params").cloned().unwrap_or(json!({}));

                let response = match handle_method(&app, method, &params).await {
                    Ok(val) => json!({"id": id, "result": val}),
                    Err(err) => json!({"id": id, "error": err}),
                };
                emit(&response);
            }
        }
    }

    info!("stdin closed, shutting down");
}
