//! Tab-level actions backed by `chrome.tabs`.
//!
//! Document-level actions (click, fill, ...) need the page and are answered
//! with a failure here; the content side runs them.

use js_sys::{Object, Reflect};
use rms_protocol::{BrowserAction, BrowserActionResult, TabId, TabState};
use serde_json::json;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::{cached_context, stringify_js_error, to_js};

pub struct TabInfo {
	pub id: TabId,
	pub window_id: Option<f64>,
	pub url: String,
	pub title: String,
}

impl TabInfo {
	fn from_js(tab: &JsValue) -> Result<Self, String> {
		let id = get(tab, "id")?.as_f64().ok_or("tab has no id")? as TabId;
		Ok(Self {
			id,
			window_id: get(tab, "windowId")?.as_f64(),
			url: get(tab, "url")?.as_string().unwrap_or_default(),
			title: get(tab, "title")?.as_string().unwrap_or_default(),
		})
	}

	pub fn state(&self) -> TabState {
		TabState::new(self.id, self.url.clone(), self.title.clone()).with_context(cached_context(self.id))
	}
}

fn get(target: &JsValue, key: &str) -> Result<JsValue, String> {
	Reflect::get(target, &JsValue::from_str(key)).map_err(stringify_js_error)
}

pub async fn active_tab() -> Result<TabInfo, String> {
	let query = to_js(&json!({"active": true, "currentWindow": true})).map_err(|e| e.to_string())?;
	let tabs = JsFuture::from(tabs_query(&query)).await.map_err(stringify_js_error)?;
	let tab = js_sys::Array::from(&tabs).get(0);
	if tab.is_undefined() {
		return Err("No active tab".into());
	}
	TabInfo::from_js(&tab)
}

async fn tab(id: TabId) -> Result<TabInfo, String> {
	let tab = JsFuture::from(tabs_get(id as f64)).await.map_err(|_| format!("Tab {id} not found"))?;
	TabInfo::from_js(&tab)
}

fn tab_state_result(info: &TabInfo) -> Result<BrowserActionResult, String> {
	let state = info.state();
	let context = serde_json::to_value(state.context).map_err(|e| e.to_string())?;
	Ok(BrowserActionResult::ok()
		.with("tabId", state.id)
		.with("url", state.url)
		.with("title", state.title)
		.with("context", context))
}

async fn run(action: &BrowserAction) -> Result<BrowserActionResult, String> {
	match action {
		BrowserAction::Navigate { url } => {
			let active = active_tab().await?;
			let props = Object::new();
			Reflect::set(&props, &JsValue::from_str("url"), &JsValue::from_str(url)).map_err(stringify_js_error)?;
			JsFuture::from(tabs_update(active.id as f64, &props)).await.map_err(stringify_js_error)?;
			Ok(BrowserActionResult::ok().with("tabId", active.id).with("url", url.as_str()))
		}
		BrowserAction::Screenshot => {
			let active = active_tab().await?;
			let options = to_js(&json!({"format": "png"})).map_err(|e| e.to_string())?;
			let window = active.window_id.map(JsValue::from_f64).unwrap_or(JsValue::NULL);
			let data_url = JsFuture::from(tabs_capture_visible_tab(&window, &options))
				.await
				.map_err(|e| format!("Screenshot capture failed: {}", stringify_js_error(e)))?
				.as_string()
				.ok_or("capture returned no image")?;
			Ok(BrowserActionResult::ok().with("tabId", active.id).with("screenshot", data_url))
		}
		BrowserAction::GetTabState => tab_state_result(&active_tab().await?),
		BrowserAction::GetSpecificTabState { tab_id } => tab_state_result(&tab(*tab_id).await?),
		BrowserAction::ExecuteScript { .. } => Err("Script execution is not supported by the background worker".into()),
		other => Err(format!("{} must run in the page", other.name())),
	}
}

pub async fn execute(action: &BrowserAction) -> BrowserActionResult {
	match run(action).await {
		Ok(result) => result,
		Err(err) => {
			crate::push_log(&format!("{} failed: {err}", action.name()));
			BrowserActionResult::failure(err)
		}
	}
}

#[wasm_bindgen]
extern "C" {
	#[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = query)]
	fn tabs_query(query: &JsValue) -> js_sys::Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = get)]
	fn tabs_get(tab_id: f64) -> js_sys::Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = update)]
	fn tabs_update(tab_id: f64, props: &JsValue) -> js_sys::Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = captureVisibleTab)]
	fn tabs_capture_visible_tab(window_id: &JsValue, options: &JsValue) -> js_sys::Promise;
}
