//! The list data behind the gateway: `items.json` under the data directory, holding an
//! object of named lists. Items lose any legacy `completed` flag and gain a UUID `id` on
//! the way in and out.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult};
use crate::identity::RequestContext;

use super::AppState;

pub const ITEMS_FILE: &str = "items.json";

pub struct ItemStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on the data file.
    write_lock: Mutex<()>,
}

fn id_missing(item: &Map<String, Value>) -> bool {
    match item.get("id") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

/// Strip `completed` and assign missing ids in place. Returns true if any item changed.
pub fn normalize(items: &mut Value) -> bool {
    let Some(lists) = items.as_object_mut() else { return false };
    let mut changed = false;
    for list in lists.values_mut() {
        let Some(entries) = list.as_array_mut() else { continue };
        for item in entries.iter_mut().filter_map(Value::as_object_mut) {
            if item.remove("completed").is_some() {
                changed = true;
            }
            if id_missing(item) {
                item.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
                changed = true;
            }
        }
    }
    changed
}

/// First shared item with the given id, across all lists.
pub fn find_shared<'a>(items: &'a Value, id: &str) -> Option<&'a Value> {
    items.as_object()?.values().filter_map(Value::as_array).flatten().find(|item| {
        item.get("id").and_then(Value::as_str) == Some(id) && item.get("shared").is_some_and(truthy)
    })
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

impl ItemStore {
    pub fn new(dir: PathBuf) -> Self { Self { dir, write_lock: Mutex::new(()) } }

    pub fn path(&self) -> PathBuf { self.dir.join(ITEMS_FILE) }

    /// Create the data directory and an empty data file if needed, and clean up any
    /// legacy items already on disk.
    pub async fn init(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path();
        if tokio::fs::metadata(&path).await.is_err() {
            tokio::fs::write(&path, "{}").await?;
            info!(path = ?path, "created data file");
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut items = self.read_raw().await?;
        if normalize(&mut items) {
            self.write_raw(&items).await?;
            info!(path = ?path, "normalized existing items");
        }
        Ok(())
    }

    /// A missing file or unparsable content reads as an empty object.
    async fn read_raw(&self) -> std::io::Result<Value> {
        let data = match tokio::fs::read_to_string(self.path()).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Value::Object(Map::new())),
            Err(e) => return Err(e),
        };
        Ok(serde_json::from_str(&data).unwrap_or_else(|e| {
            debug!(error = %e, "items file is not valid json; treating as empty");
            Value::Object(Map::new())
        }))
    }

    async fn write_raw(&self, items: &Value) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(items).map_err(std::io::Error::other)?;
        tokio::fs::write(self.path(), text).await
    }

    pub async fn load(&self) -> std::io::Result<Value> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.read_raw().await?;
        if normalize(&mut items) {
            self.write_raw(&items).await?;
        }
        Ok(items)
    }

    pub async fn save(&self, mut items: Value) -> std::io::Result<()> {
        normalize(&mut items);
        let _guard = self.write_lock.lock().await;
        self.write_raw(&items).await
    }

    pub async fn shared_text(&self, id: &str) -> std::io::Result<Option<Value>> {
        let items = self.read_raw().await?;
        Ok(find_shared(&items, id).map(|item| item.get("text").cloned().unwrap_or(Value::Null)))
    }
}

/// Reachable without a credential so the login page can show the title.
pub async fn site_config(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Value>> {
    state.api_limiter.check(&ctx.client_ip)?;
    Ok(Json(json!({ "siteTitle": state.config.site_title })))
}

pub async fn status(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Value>> {
    state.api_limiter.check(&ctx.client_ip)?;
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    Ok(Json(json!({ "status": "ok", "timestamp": timestamp })))
}

pub async fn get_items(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Value>> {
    state.api_limiter.check(&ctx.client_ip)?;
    let items = state.items.load().await.map_err(|e| {
        error!(error = %e, "failed to read items");
        AppError::Internal("Failed to read items".into())
    })?;
    Ok(Json(items))
}

pub async fn save_items(State(state): State<AppState>, ctx: RequestContext, Json(items): Json<Value>) -> AppResult<Json<Value>> {
    state.api_limiter.check(&ctx.client_ip)?;
    state.items.save(items).await.map_err(|e| {
        error!(error = %e, "failed to save items");
        AppError::Internal("Failed to save items".into())
    })?;
    Ok(Json(json!({ "success": true })))
}

pub async fn shared_item(State(state): State<AppState>, ctx: RequestContext, Path(id): Path<String>) -> AppResult<Json<Value>> {
    state.api_limiter.check(&ctx.client_ip)?;
    let text = state.items.shared_text(&id).await.map_err(|e| {
        error!(error = %e, "failed to fetch shared item");
        AppError::Internal("Failed to fetch shared item".into())
    })?;
    match text {
        Some(text) => Ok(Json(json!({ "text": text }))),
        None => Err(AppError::NotFound("Item not found or not shared".into())),
    }
}
