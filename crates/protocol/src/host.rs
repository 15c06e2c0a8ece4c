//! Host-internal messages between the UI surface and the privileged surface.
//!
//! These never travel over the network. The side panel sends [`HostRequest`]s to
//! the background worker, which owns the backend socket, the tabs, and the
//! per-tab context cache, and answers with a [`HostResponse`]. Unsolicited
//! notifications from the background travel as [`HostEvent`]s.

use serde::{Deserialize, Serialize};

use crate::action::{BrowserAction, BrowserActionResult};
use crate::context::PageContext;
use crate::messages::{InboundMessage, OutboundMessage};
use crate::tab::TabId;

/// Connection state of the backend socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
	#[default]
	Disconnected,
	Connecting,
	Connected,
}

impl ConnectionState {
	pub fn is_connected(self) -> bool {
		self == ConnectionState::Connected
	}

	pub fn as_str(self) -> &'static str {
		match self {
			ConnectionState::Disconnected => "disconnected",
			ConnectionState::Connecting => "connecting",
			ConnectionState::Connected => "connected",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HostRequest {
	/// Run a tab-level automation primitive on behalf of the UI surface.
	ExecuteAction { action_id: String, action: BrowserAction },
	/// Forward a frame to the backend over the socket owned by the host.
	SendFrame { frame: OutboundMessage },
	/// The page watcher of a tab extracted a new context.
	ContextUpdate { tab_id: TabId, context: PageContext },
	/// Late subscriber asking for the cached context of a tab.
	GetContext { tab_id: TabId },
	ConnectionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HostResponse {
	ActionResult { action_id: String, result: BrowserActionResult },
	/// `ok` is false when the socket was not connected.
	Sent { ok: bool },
	Context {
		tab_id: TabId,
		#[serde(default)]
		context: Option<PageContext>,
	},
	Status { state: ConnectionState },
	Error { message: String },
}

/// Notification broadcast by the host to every UI surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HostEvent {
	Frame { frame: InboundMessage },
	Status { state: ConnectionState },
	ContextChanged { tab_id: TabId, context: PageContext },
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn execute_action_nests_the_action() {
		let req: HostRequest = serde_json::from_value(json!({
			"type": "execute_action",
			"actionId": "a1",
			"action": {"action": "navigate", "url": "https://app.close.com"}
		}))
		.unwrap();
		assert!(matches!(req, HostRequest::ExecuteAction { action: BrowserAction::Navigate { .. }, .. }));
	}

	#[test]
	fn status_event_shape() {
		let event = HostEvent::Status {
			state: ConnectionState::Connected,
		};
		assert_eq!(serde_json::to_value(&event).unwrap(), json!({"type": "status", "state": "connected"}));
	}
}
