//! Framework-neutral bridge between JavaScript and the requisition resolver.

use chrono::{Local, Utc};
use requisition_core::{HistoryBundle, HistoryEntry, ResolvedBundle, ViewerConfig, ViewerError};
use requisition_fhir::{HttpTransport, Resolver};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

#[derive(Deserialize)]
struct JsViewerConfig {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    observation_limit: Option<usize>,
    #[serde(default)]
    worklist_window_hours: Option<u32>,
    #[serde(default)]
    worklist_count: Option<u32>,
}

impl From<JsViewerConfig> for ViewerConfig {
    fn from(cfg: JsViewerConfig) -> Self {
        let mut base = ViewerConfig::default();
        if let Some(url) = cfg.base_url.filter(|url| !url.trim().is_empty()) {
            base.base_url = url;
        }
        if let Some(limit) = cfg.observation_limit {
            base.observation_limit = limit;
        }
        if let Some(hours) = cfg.worklist_window_hours {
            base.worklist_window_hours = hours;
        }
        if let Some(count) = cfg.worklist_count {
            base.worklist_count = count;
        }
        base
    }
}

fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

fn read_config(config: Option<JsValue>) -> Result<ViewerConfig, JsValue> {
    match config {
        Some(js_cfg) if !js_cfg.is_undefined() && !js_cfg.is_null() => {
            let cfg: JsViewerConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("Cannot read config: {err}")))?;
            Ok(ViewerConfig::from(cfg))
        }
        _ => Ok(ViewerConfig::default()),
    }
}

fn base_or_default(base_url: Option<String>) -> String {
    base_url
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| ViewerConfig::default().base_url)
}

/// Plain JS objects instead of `Map`s, so results can go straight to JSON.
fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(|err| JsValue::from_str(&format!("Cannot serialize result: {err}")))
}

fn to_js_error(err: ViewerError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Resolves a locator. Returns `{kind: "resolved" | "history", bundle}`.
#[wasm_bindgen]
pub async fn resolve_locator(
    locator: String,
    mode: String,
    base_url: Option<String>,
) -> Result<JsValue, JsValue> {
    init();

    let mode = mode.parse().map_err(to_js_error)?;
    let resolver = Resolver::new(HttpTransport::default(), base_or_default(base_url));
    let resolution = resolver
        .resolve(&locator, mode)
        .await
        .map_err(to_js_error)?;
    to_js(&resolution)
}

/// Resolves one entry returned by `history_entries`.
#[wasm_bindgen]
pub async fn resolve_history_entry(
    entry: JsValue,
    base_url: Option<String>,
) -> Result<JsValue, JsValue> {
    init();

    let entry: HistoryEntry = from_value(entry)
        .map_err(|err| JsValue::from_str(&format!("Cannot read history entry: {err}")))?;
    let resolver = Resolver::new(HttpTransport::default(), base_or_default(base_url));
    let bundle = resolver
        .resolve_history_entry(&entry)
        .await
        .map_err(to_js_error)?;
    to_js(&bundle)
}

/// Lists the versions of a history bundle, in server order.
#[wasm_bindgen]
pub fn history_entries(bundle: JsValue) -> Result<JsValue, JsValue> {
    init();

    let value = from_value::<serde_json::Value>(bundle)
        .map_err(|err| JsValue::from_str(&format!("Cannot read JSON bundle: {err}")))?;
    let history = HistoryBundle::from_value(value).map_err(to_js_error)?;
    to_js(&history.entries())
}

#[wasm_bindgen]
pub fn build_dashboard(bundle: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    init();

    let value = from_value::<serde_json::Value>(bundle)
        .map_err(|err| JsValue::from_str(&format!("Cannot read JSON bundle: {err}")))?;
    let cfg = read_config(config)?;
    let bundle = ResolvedBundle::from_value(value).map_err(to_js_error)?;

    let dashboard = requisition_fhir::build_dashboard(
        &bundle,
        &cfg.base_url,
        Local::now().date_naive(),
        &cfg,
    );
    to_js(&dashboard)
}

/// Orders updated within the configured window, with subject names.
#[wasm_bindgen]
pub async fn recent_orders(config: Option<JsValue>) -> Result<JsValue, JsValue> {
    init();

    let cfg = read_config(config)?;
    let transport = HttpTransport::default();
    let rows = requisition_fhir::recent_orders(&transport, &cfg.base_url, Utc::now(), &cfg)
        .await
        .map_err(to_js_error)?;
    to_js(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_config_overrides_only_given_fields() {
        let cfg: JsViewerConfig =
            serde_json::from_str(r#"{"base_url": "http://localhost:8080/fhir", "worklist_count": 5}"#)
                .unwrap();
        let cfg = ViewerConfig::from(cfg);

        assert_eq!(cfg.base_url, "http://localhost:8080/fhir");
        assert_eq!(cfg.worklist_count, 5);
        assert_eq!(cfg.observation_limit, ViewerConfig::default().observation_limit);
        assert_eq!(
            cfg.worklist_window_hours,
            ViewerConfig::default().worklist_window_hours
        );
    }

    #[test]
    fn blank_base_url_keeps_default() {
        let cfg: JsViewerConfig = serde_json::from_str(r#"{"base_url": "  "}"#).unwrap();
        assert_eq!(ViewerConfig::from(cfg).base_url, ViewerConfig::default().base_url);
        assert_eq!(base_or_default(Some(String::new())), "https://server.fire.ly");
    }
}
