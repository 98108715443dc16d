//! Unit tests for the RPC handler, covering every JSON-RPC method dispatched by `handle_method`.
//!
//! These go through the same code path as the `linksync-rpc` binary, with an
//! in-memory store, an in-process relay and a settings file in a temp dir.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex};

use linksync::app::App;
use linksync::rpc_handler::handle_method;
use linksync::services::local_store::LocalStore;
use linksync::services::relay::MemoryRelay;
use linksync::services::settings_engine::SettingsEngine;

/// Create a fresh App over an in-memory store; the relay handle observes publishes.
fn setup() -> (Mutex<App>, MemoryRelay, TempDir) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let settings_path = tmp.path().join("settings.json").to_string_lossy().to_string();
    let relay = MemoryRelay::new();
    let (events, _) = mpsc::unbounded_channel();
    let app = App::with_parts(
        Arc::new(LocalStore::in_memory()),
        Arc::new(relay.clone()),
        SettingsEngine::new(Some(settings_path)),
        events,
    )
    .expect("Failed to init App");
    (Mutex::new(app), relay, tmp)
}

// ─── Ping ───

#[tokio::test]
async fn test_ping() {
    let (app, _relay, _tmp) = setup();
    let res = handle_method(&app, "ping", &json!({})).await.unwrap();
    assert_eq!(res, json!({"pong": true}));
}

// ─── Unknown method ───

#[tokio::test]
async fn test_unknown_method_returns_error() {
    let (app, _relay, _tmp) = setup();
    let res = handle_method(&app, "nonexistent.method", &json!({})).await;
    assert!(res.unwrap_err().contains("unknown method"));
}

// ─── Bookmarks ───

#[tokio::test]
async fn test_bookmark_add_and_list() {
    let (app, _relay, _tmp) = setup();

    let res = handle_method(&app, "bookmark.add", &json!({
        "url": "https://example.com",
        "category": "Work",
        "hashtags": "rust, #async"
    }))
    .await
    .unwrap();
    assert_eq!(res["url"], "https://example.com");
    assert_eq!(res["category"], "Work");
    assert_eq!(res["hashtags"], json!(["rust", "async"]));
    assert_eq!(res["pinned"], false);
    assert!(res["dateAdded"].is_string());

    let list = handle_method(&app, "bookmark.list", &json!({})).await.unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_bookmark_add_invalid_url() {
    let (app, _relay, _tmp) = setup();
    let err = handle_method(&app, "bookmark.add", &json!({"url": "not a url"})).await.unwrap_err();
    assert!(err.contains("Invalid URL"));
}

#[tokio::test]
async fn test_bookmark_add_missing_params() {
    let (app, _relay, _tmp) = setup();
    let err = handle_method(&app, "bookmark.add", &json!({})).await.unwrap_err();
    assert!(err.contains("invalid params"));
}

#[tokio::test]
async fn test_bookmark_add_duplicate() {
    let (app, _relay, _tmp) = setup();
    handle_method(&app, "bookmark.add", &json!({"url": "https://a.example"})).await.unwrap();
    assert!(handle_method(&app, "bookmark.add", &json!({"url": "https://a.example"})).await.is_err());
}

#[tokio::test]
async fn test_bookmark_update_pin_delete() {
    let (app, _relay, _tmp) = setup();
    handle_method(&app, "bookmark.add", &json!({"url": "https://a.example"})).await.unwrap();

    let updated = handle_method(&app, "bookmark.update", &json!({"url": "https://a.example", "category": "Docs"}))
        .await
        .unwrap();
    assert_eq!(updated["category"], "Docs");

    let pinned = handle_method(&app, "bookmark.toggle_pin", &json!({"url": "https://a.example"})).await.unwrap();
    assert_eq!(pinned, json!({"url": "https://a.example", "pinned": true}));
    let list = handle_method(&app, "bookmark.pinned", &json!({})).await.unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);

    let res = handle_method(&app, "bookmark.delete", &json!({"url": "https://a.example"})).await.unwrap();
    assert_eq!(res, json!({"ok": true}));
    let list = handle_method(&app, "bookmark.list", &json!({})).await.unwrap();
    assert!(list.as_array().unwrap().is_empty());

    let err = handle_method(&app, "bookmark.delete", &json!({"url": "https://a.example"})).await.unwrap_err();
    assert!(err.contains("not found"));
}

#[tokio::test]
async fn test_bookmark_delete_missing_url() {
    let (app, _relay, _tmp) = setup();
    let err = handle_method(&app, "bookmark.delete", &json!({})).await.unwrap_err();
    assert_eq!(err, "missing url");
}

#[tokio::test]
async fn test_bookmark_search_and_categories() {
    let (app, _relay, _tmp) = setup();
    handle_method(&app, "bookmark.add", &json!({"url": "https://docs.rs", "category": "Reference"})).await.unwrap();
    handle_method(&app, "bookmark.add", &json!({"url": "https://news.example", "category": "Reading"})).await.unwrap();

    let res = handle_method(&app, "bookmark.search", &json!({"query": "docs"})).await.unwrap();
    assert_eq!(res.as_array().unwrap().len(), 1);
    let res = handle_method(&app, "bookmark.list", &json!({"category": "reading"})).await.unwrap();
    assert_eq!(res.as_array().unwrap().len(), 1);
    let res = handle_method(&app, "bookmark.categories", &json!({})).await.unwrap();
    assert_eq!(res, json!(["Reading", "Reference"]));

    let err = handle_method(&app, "bookmark.search", &json!({})).await.unwrap_err();
    assert_eq!(err, "missing query");
}

#[tokio::test]
async fn test_bookmark_export_import() {
    let (source, _relay, _tmp) = setup();
    handle_method(&source, "bookmark.add", &json!({"url": "https://a.example"})).await.unwrap();
    handle_method(&source, "bookmark.add", &json!({"url": "https://b.example"})).await.unwrap();
    let exported = handle_method(&source, "bookmark.export", &json!({})).await.unwrap();
    let text = exported["json"].as_str().unwrap().to_string();

    let (target, _relay2, _tmp2) = setup();
    let summary = handle_method(&target, "bookmark.import", &json!({"json": text})).await.unwrap();
    assert_eq!(summary["imported"], 2);
    assert_eq!(summary["skipped"], 0);

    let summary = handle_method(&target, "bookmark.import", &json!({"bookmarks": [{"url": "https://c.example"}]}))
        .await
        .unwrap();
    assert_eq!(summary["imported"], 1);

    let err = handle_method(&target, "bookmark.import", &json!({})).await.unwrap_err();
    assert!(err.contains("missing"));
}

// ─── Sync ───

#[tokio::test]
async fn test_sync_status_initially_unbound() {
    let (app, _relay, _tmp) = setup();
    let status = handle_method(&app, "sync.status", &json!({})).await.unwrap();
    assert_eq!(status["state"]["state"], "unbound");
    assert!(status["active_token"].is_null());
    assert!(status["device_id"].is_string());
}

#[tokio::test]
async fn test_sync_join_then_mutation_publishes() {
    let (app, relay, _tmp) = setup();
    let res = handle_method(&app, "sync.join", &json!({"token": "tok1"})).await.unwrap();
    assert_eq!(res["token"], "tok1");
    assert_eq!(res["count"], 0);

    let status = handle_method(&app, "sync.status", &json!({})).await.unwrap();
    assert_eq!(status["state"], json!({"state": "bound", "token": "tok1"}));

    handle_method(&app, "bookmark.add", &json!({"url": "https://a.example"})).await.unwrap();
    for _ in 0..200 {
        if !relay.published().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let published = relay.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].token, "tok1");
    assert_eq!(published[0].bookmarks.len(), 1);
}

#[tokio::test]
async fn test_sync_join_invalid_and_missing_token() {
    let (app, _relay, _tmp) = setup();
    assert!(handle_method(&app, "sync.join", &json!({"token": "no spaces"})).await.is_err());
    assert_eq!(handle_method(&app, "sync.join", &json!({})).await.unwrap_err(), "missing token");
}

#[tokio::test]
async fn test_sync_join_relay_down() {
    let (app, relay, _tmp) = setup();
    relay.set_reachable(false);
    assert!(handle_method(&app, "sync.join", &json!({"token": "tok1"})).await.is_err());

    // Local CRUD is unaffected.
    handle_method(&app, "bookmark.add", &json!({"url": "https://a.example"})).await.unwrap();
    let status = handle_method(&app, "sync.status", &json!({})).await.unwrap();
    assert_eq!(status["state"]["state"], "unbound");
    assert_eq!(status["active_token"], "tok1");
}

#[tokio::test]
async fn test_sync_generate_and_leave() {
    let (app, _relay, _tmp) = setup();
    let res = handle_method(&app, "sync.generate", &json!({})).await.unwrap();
    assert_eq!(res["token"].as_str().unwrap().len(), 32);

    let res = handle_method(&app, "sync.leave", &json!({})).await.unwrap();
    assert_eq!(res, json!({"ok": true}));
    let status = handle_method(&app, "sync.status", &json!({})).await.unwrap();
    assert!(status["active_token"].is_null());
}

// ─── Settings ───

#[tokio::test]
async fn test_settings_get() {
    let (app, _relay, _tmp) = setup();
    let res = handle_method(&app, "settings.get", &json!({"key": "queue.max_attempts"})).await.unwrap();
    assert_eq!(res, json!(3));
    let whole = handle_method(&app, "settings.get", &json!({})).await.unwrap();
    assert!(whole.get("relay").is_some());
}

#[tokio::test]
async fn test_settings_set_and_reset() {
    let (app, _relay, _tmp) = setup();
    let res = handle_method(&app, "settings.set", &json!({"key": "relay.mode", "value": "local"})).await.unwrap();
    assert_eq!(res, json!({"ok": true}));
    let res = handle_method(&app, "settings.get", &json!({"key": "relay.mode"})).await.unwrap();
    assert_eq!(res, "local");

    handle_method(&app, "settings.reset", &json!({})).await.unwrap();
    let res = handle_method(&app, "settings.get", &json!({"key": "relay.mode"})).await.unwrap();
    assert_eq!(res, "disabled");
}

#[tokio::test]
async fn test_settings_set_invalid() {
    let (app, _relay, _tmp) = setup();
    assert!(handle_method(&app, "settings.set", &json!({"key": "relay.mode"})).await.is_err());
    assert!(handle_method(&app, "settings.set", &json!({"key": "nope", "value": 1})).await.is_err());
    assert!(handle_method(&app, "settings.set", &json!({"key": "relay.mode", "value": "smoke-signals"}))
        .await
        .is_err());
}
