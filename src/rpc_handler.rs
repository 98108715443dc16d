//! RPC method handler for the linksync JSON-RPC protocol.
//!
//! Kept apart from `rpc_server.rs` so it can be tested without stdin/stdout.
//! `handle_method` dispatches one call to the `App`; every error becomes a
//! plain string for the `error` field of the response.

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::app::App;
use crate::managers::bookmark_manager::BookmarkManagerTrait;
use crate::managers::sync_session::JoinOutcome;
use crate::services::settings_engine::SettingsEngineTrait;
use crate::types::bookmark::{BookmarkPatch, RawBookmark};

fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, String> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", name))
}

fn join_result(outcome: &JoinOutcome) -> Value {
    json!({
        "token": outcome.token,
        "count": outcome.collection.len(),
        "bookmarks": outcome.collection,
    })
}

/// Dispatch a JSON-RPC method call.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method(app: &Mutex<App>, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "ping" => Ok(json!({"pong": true})),

        // ─── Bookmarks ───
        "bookmark.add" => {
            let raw: RawBookmark = serde_json::from_value(params.clone()).map_err(|e| format!("invalid params: {}", e))?;
            let a = app.lock().await;
            let applied = a.add_bookmark(&raw).map_err(|e| e.to_string())?;
            Ok(json!(applied.value))
        }
        "bookmark.update" => {
            let url = str_param(params, "url")?;
            let patch: BookmarkPatch = serde_json::from_value(params.clone()).map_err(|e| format!("invalid params: {}", e))?;
            let a = app.lock().await;
            let applied = a.update_bookmark(url, &patch).map_err(|e| e.to_string())?;
            Ok(json!(applied.value))
        }
        "bookmark.delete" => {
            let url = str_param(params, "url")?;
            let a = app.lock().await;
            a.remove_bookmark(url).map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "bookmark.toggle_pin" => {
            let url = str_param(params, "url")?;
            let a = app.lock().await;
            let applied = a.toggle_pin(url).map_err(|e| e.to_string())?;
            Ok(json!({"url": applied.value.url, "pinned": applied.value.pinned}))
        }
        "bookmark.list" => {
            let category = params.get("category").and_then(|v| v.as_str());
            let a = app.lock().await;
            let records = a.bookmarks().list_bookmarks(category).map_err(|e| e.to_string())?;
            Ok(json!(records))
        }
        "bookmark.pinned" => {
            let a = app.lock().await;
            let records = a.bookmarks().pinned_bookmarks().map_err(|e| e.to_string())?;
            Ok(json!(records))
        }
        "bookmark.search" => {
            let query = str_param(params, "query")?;
            let a = app.lock().await;
            let records = a.bookmarks().search_bookmarks(query).map_err(|e| e.to_string())?;
            Ok(json!(records))
        }
        "bookmark.categories" => {
            let a = app.lock().await;
            let categories = a.bookmarks().categories().map_err(|e| e.to_string())?;
            Ok(json!(categories))
        }
        "bookmark.export" => {
            let a = app.lock().await;
            let exported = a.bookmarks().export_json().map_err(|e| e.to_string())?;
            Ok(json!({"json": exported}))
        }
        "bookmark.import" => {
            // Accepts either {"json": "<text>"} or {"bookmarks": [...]}.
            let text = match (params.get("json").and_then(|v| v.as_str()), params.get("bookmarks")) {
                (Some(text), _) => text.to_string(),
                (None, Some(list)) => list.to_string(),
                (None, None) => return Err("missing json or bookmarks".to_string()),
            };
            let a = app.lock().await;
            let applied = a.import_json(&text).map_err(|e| e.to_string())?;
            Ok(json!(applied.value))
        }

        // ─── Sync ───
        "sync.generate" => {
            let mut a = app.lock().await;
            let outcome = a.generate_token().await.map_err(|e| e.to_string())?;
            Ok(join_result(&outcome))
        }
        "sync.join" => {
            let token = str_param(params, "token")?;
            let mut a = app.lock().await;
            let outcome = a.join(token).await.map_err(|e| e.to_string())?;
            Ok(join_result(&outcome))
        }
        "sync.leave" => {
            let mut a = app.lock().await;
            a.leave().await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "sync.status" => {
            let a = app.lock().await;
            let status = a.sync_status().map_err(|e| e.to_string())?;
            serde_json::to_value(status).map_err(|e| e.to_string())
        }

        // ─── Settings ───
        "settings.get" => {
            let key = params.get("key").and_then(|v| v.as_str()).unwrap_or("");
            let a = app.lock().await;
            a.settings_engine.get_value(key).map_err(|e| e.to_string())
        }
        "settings.set" => {
            let key = str_param(params, "key")?;
            let value = params.get("value").cloned().ok_or("missing value")?;
            let mut a = app.lock().await;
            a.set_setting(key, value).map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "settings.reset" => {
            let mut a = app.lock().await;
            a.settings_engine.reset().map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
