//! Background service worker of the RMS assistant extension.
//!
//! Owns the backend socket, the toolbar badge and the per-tab context cache.
//! The side panel talks to it with [`HostRequest`]s over
//! `chrome.runtime.sendMessage`; backend frames and status changes are
//! broadcast back as [`HostEvent`]s.

mod state;
mod tabs;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::{Array, Object, Reflect};
use rms_protocol::{
	BrowserActionResult, ConnectionState, HostEvent, HostRequest, HostResponse, InboundMessage, OutboundMessage, PageContext, ReconnectPolicy, TabId, framing,
};
use serde::Serialize;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CloseEvent, ErrorEvent, MessageEvent, WebSocket};

use crate::state::{ContextCache, LogRing, Reconnector, badge};

const ENDPOINT: &str = "ws://localhost:8765/ws";

thread_local! {
	static LOG: RefCell<LogRing> = RefCell::new(LogRing::default());
	static CONTEXTS: RefCell<ContextCache> = RefCell::new(ContextCache::default());
	static SOCKET: RefCell<Option<Rc<WebSocket>>> = const { RefCell::new(None) };
	static STATE: Cell<ConnectionState> = const { Cell::new(ConnectionState::Disconnected) };
	static RECONNECT: RefCell<Reconnector> = RefCell::new(Reconnector::new(ReconnectPolicy::default()));
}

#[wasm_bindgen(start)]
pub fn start() {
	console_error_panic_hook::set_once();
	listen_for_requests();
	listen_for_closed_tabs();
	connect();
}

fn connection_state() -> ConnectionState {
	STATE.with(Cell::get)
}

fn set_state(state: ConnectionState, gave_up: bool) {
	STATE.with(|s| s.set(state));
	let (text, rgba, title) = badge(state, gave_up);
	set_badge(text, rgba, title);
	persist_state(state, title);
	broadcast(&HostEvent::Status { state });
}

fn connect() {
	set_state(ConnectionState::Connecting, false);
	let ws = match WebSocket::new(ENDPOINT) {
		Ok(ws) => Rc::new(ws),
		Err(err) => {
			push_log(&format!("socket rejected: {}", stringify_js_error(err)));
			schedule_reconnect();
			return;
		}
	};

	let onopen = Closure::<dyn FnMut()>::new(|| {
		RECONNECT.with(|r| r.borrow_mut().reset());
		set_state(ConnectionState::Connected, false);
		push_log("connected");
		wasm_bindgen_futures::spawn_local(resend_active_tab_state());
	});
	ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));
	onopen.forget();

	let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(|event: MessageEvent| {
		let Some(text) = event.data().as_string() else {
			push_log("dropped non-text frame");
			return;
		};
		for frame in framing::decode(&text) {
			match frame {
				Ok(InboundMessage::InvalidBrowserAction { action_id, error }) => {
					push_log(&format!("{action_id}: {error}"));
					send_frame(&OutboundMessage::BrowserActionResult {
						action_id,
						result: BrowserActionResult::failure(error),
					});
				}
				Ok(frame) => broadcast(&HostEvent::Frame { frame }),
				Err(err) => push_log(&format!("dropped malformed frame: {err}")),
			}
		}
	});
	ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
	onmessage.forget();

	let onerror = Closure::<dyn FnMut(ErrorEvent)>::new(|e: ErrorEvent| {
		push_log(&format!("socket error: {}", e.message()));
	});
	ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));
	onerror.forget();

	let onclose = Closure::<dyn FnMut(CloseEvent)>::new(|e: CloseEvent| {
		SOCKET.with(|s| s.borrow_mut().take());
		push_log(&format!("disconnected (code {})", e.code()));
		schedule_reconnect();
	});
	ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
	onclose.forget();

	SOCKET.with(|s| *s.borrow_mut() = Some(ws));
}

fn schedule_reconnect() {
	let next = RECONNECT.with(|r| {
		let mut r = r.borrow_mut();
		r.next_delay().map(|delay| (delay, r.attempts()))
	});
	match next {
		Some((delay, attempt)) => {
			set_state(ConnectionState::Disconnected, false);
			push_log(&format!("reconnect attempt {attempt} in {} ms", delay.as_millis()));
			let retry = Closure::once_into_js(connect);
			set_timeout(retry.unchecked_ref(), delay.as_millis() as i32);
		}
		None => {
			let attempts = RECONNECT.with(|r| r.borrow().attempts());
			set_state(ConnectionState::Disconnected, true);
			push_log(&format!("gave up after {attempts} reconnect attempts"));
		}
	}
}

/// Sends `frame` if the socket is open. Returns false when it was not sent.
fn send_frame(frame: &OutboundMessage) -> bool {
	if !connection_state().is_connected() {
		return false;
	}
	let Some(ws) = SOCKET.with(|s| s.borrow().clone()) else {
		return false;
	};
	let text = match serde_json::to_string(frame) {
		Ok(text) => text,
		Err(err) => {
			push_log(&format!("could not encode {}: {err}", frame.kind()));
			return false;
		}
	};
	match ws.send_with_str(&text) {
		Ok(()) => true,
		Err(err) => {
			push_log(&format!("send {} failed: {}", frame.kind(), stringify_js_error(err)));
			false
		}
	}
}

pub(crate) fn cached_context(tab: TabId) -> Option<PageContext> {
	CONTEXTS.with(|c| c.borrow().get(tab).cloned())
}

/// After a reconnect the backend has no tab state; give it the active tab's.
async fn resend_active_tab_state() {
	if let Ok(active) = tabs::active_tab().await {
		send_frame(&OutboundMessage::TabState { tab: active.state() });
	}
}

async fn context_update(tab_id: TabId, context: PageContext) {
	let changed = CONTEXTS.with(|c| c.borrow_mut().update(tab_id, context.clone()));
	if !changed {
		return;
	}
	broadcast(&HostEvent::ContextChanged { tab_id, context });
	if let Ok(active) = tabs::active_tab().await {
		if active.id == tab_id {
			send_frame(&OutboundMessage::TabState { tab: active.state() });
		}
	}
}

async fn handle_request(request: HostRequest) -> HostResponse {
	match request {
		HostRequest::ExecuteAction { action_id, action } => {
			let result = if action.is_tab_level() {
				tabs::execute(&action).await
			} else {
				BrowserActionResult::failure(format!("{} must run in the page", action.name()))
			};
			HostResponse::ActionResult { action_id, result }
		}
		HostRequest::SendFrame { frame } => HostResponse::Sent { ok: send_frame(&frame) },
		HostRequest::ContextUpdate { tab_id, context } => {
			context_update(tab_id, context).await;
			HostResponse::Context {
				tab_id,
				context: cached_context(tab_id),
			}
		}
		HostRequest::GetContext { tab_id } => HostResponse::Context {
			tab_id,
			context: cached_context(tab_id),
		},
		HostRequest::ConnectionStatus => HostResponse::Status { state: connection_state() },
	}
}

fn listen_for_requests() {
	let listener = Closure::<dyn FnMut(JsValue, JsValue, js_sys::Function) -> bool>::new(|message: JsValue, _sender: JsValue, respond: js_sys::Function| {
		let request: HostRequest = match serde_wasm_bindgen::from_value(message) {
			Ok(request) => request,
			// Not ours; other listeners may answer it.
			Err(_) => return false,
		};
		wasm_bindgen_futures::spawn_local(async move {
			let response = handle_request(request).await;
			let response = to_js(&response).unwrap_or(JsValue::NULL);
			let _ = respond.call1(&JsValue::NULL, &response);
		});
		true
	});
	runtime_on_message_add_listener(&listener);
	listener.forget();
}

fn listen_for_closed_tabs() {
	let listener = Closure::<dyn FnMut(JsValue)>::new(|tab_id: JsValue| {
		if let Some(id) = tab_id.as_f64() {
			CONTEXTS.with(|c| c.borrow_mut().remove(id as TabId));
		}
	});
	tabs_on_removed_add_listener(&listener);
	listener.forget();
}

/// Notifies extension pages. Having no listener open is normal.
fn broadcast(event: &HostEvent) {
	let Ok(value) = to_js(event) else {
		return;
	};
	let promise = runtime_send_message(&value);
	let ignore = Closure::<dyn FnMut(JsValue)>::new(|_| {});
	let _ = promise.catch(&ignore);
	ignore.forget();
}

/// Serializes with plain objects for maps so values survive `chrome.runtime` messaging.
pub(crate) fn to_js<T: Serialize>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
	value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

pub(crate) fn stringify_js_error(err: JsValue) -> String {
	err.as_string()
		.or_else(|| js_sys::JSON::stringify(&err).ok()?.as_string())
		.unwrap_or_else(|| format!("{err:?}"))
}

fn set_badge(text: &str, rgba: [u8; 4], title: &str) {
	let color = Array::new();
	for c in rgba {
		color.push(&JsValue::from_f64(c as f64));
	}

	let text_obj = Object::new();
	let _ = Reflect::set(&text_obj, &JsValue::from_str("text"), &JsValue::from_str(text));
	action_set_badge_text(&text_obj);

	let color_obj = Object::new();
	let _ = Reflect::set(&color_obj, &JsValue::from_str("color"), &color);
	action_set_badge_background_color(&color_obj);

	let title_obj = Object::new();
	let _ = Reflect::set(&title_obj, &JsValue::from_str("title"), &JsValue::from_str(title));
	action_set_title(&title_obj);
}

pub(crate) fn push_log(line: &str) {
	LOG.with(|log| {
		let mut log = log.borrow_mut();
		log.push(line);
		let array = Array::new();
		for line in log.lines() {
			array.push(&JsValue::from_str(line));
		}
		let obj = Object::new();
		let _ = Reflect::set(&obj, &JsValue::from_str("rms_log"), &array);
		let _ = storage_local_set(&obj);
	});
}

fn persist_state(state: ConnectionState, title: &str) {
	let obj = Object::new();
	let inner = Object::new();
	let _ = Reflect::set(&inner, &JsValue::from_str("status"), &JsValue::from_str(state.as_str()));
	let _ = Reflect::set(&inner, &JsValue::from_str("message"), &JsValue::from_str(title));
	let _ = Reflect::set(&obj, &JsValue::from_str("rms_connection"), &inner);
	let _ = storage_local_set(&obj);
}

#[wasm_bindgen]
extern "C" {
	#[wasm_bindgen(js_name = setTimeout)]
	fn set_timeout(callback: &js_sys::Function, ms: i32) -> JsValue;

	#[wasm_bindgen(js_namespace = ["chrome", "runtime"], js_name = sendMessage)]
	fn runtime_send_message(message: &JsValue) -> js_sys::Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "runtime", "onMessage"], js_name = addListener)]
	fn runtime_on_message_add_listener(cb: &Closure<dyn FnMut(JsValue, JsValue, js_sys::Function) -> bool>);

	#[wasm_bindgen(js_namespace = ["chrome", "tabs", "onRemoved"], js_name = addListener)]
	fn tabs_on_removed_add_listener(cb: &Closure<dyn FnMut(JsValue)>);

	#[wasm_bindgen(js_namespace = ["chrome", "action"], js_name = setBadgeText)]
	fn action_set_badge_text(details: &JsValue);

	#[wasm_bindgen(js_namespace = ["chrome", "action"], js_name = setBadgeBackgroundColor)]
	fn action_set_badge_background_color(details: &JsValue);

	#[wasm_bindgen(js_namespace = ["chrome", "action"], js_name = setTitle)]
	fn action_set_title(details: &JsValue);

	#[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = set)]
	fn storage_local_set(items: &JsValue) -> js_sys::Promise;
}
