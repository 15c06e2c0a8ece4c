//! Frames exchanged with the backend agent.
//!
//! The protocol is simple:
//!
//! 1. The assistant connects and sends a [`OutboundMessage::TabState`] for the active tab
//! 2. A user message is sent as [`OutboundMessage::Message`] with the current tab state
//! 3. The backend streams the reply as `response_start`, `response_chunk`*, `response_end`,
//!    interleaved with tool lifecycle, action confirmation and browser automation frames
//! 4. The assistant answers `action_request` with `action_response` and every
//!    `browser_action` with `browser_action_result`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{BrowserActionRequest, BrowserActionResult};
use crate::attachment::FileAttachment;
use crate::tab::{TabId, TabState};

/// Frame sent from the backend agent to the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InboundMessage {
	/// Opens a new streamed assistant message.
	ResponseStart,
	/// Appends text to the open streamed message.
	ResponseChunk { content: String },
	/// Closes the open streamed message.
	ResponseEnd,
	/// The backend started a tool invocation.
	ToolCall {
		tool: String,
		#[serde(default)]
		args: Value,
		/// Explicit correlation id. Absent on legacy backends, which serialize tool calls.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		tool_call_id: Option<String>,
	},
	/// The backend finished a tool invocation.
	ToolResult {
		#[serde(default)]
		result: Value,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		tool_call_id: Option<String>,
	},
	/// The backend asks the user to approve an action with side effects.
	ActionRequest {
		action_id: String,
		action: String,
		#[serde(default)]
		target: Value,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		description: Option<String>,
	},
	/// The backend asks the assistant to automate the page.
	BrowserAction(BrowserActionRequest),
	/// A `browser_action` whose action or parameters could not be decoded.
	///
	/// Only produced by [`crate::framing::decode_line`]; it still has to be
	/// answered with a failed `browser_action_result`.
	#[serde(skip_deserializing)]
	InvalidBrowserAction { action_id: String, error: String },
	/// Backend-side failure, rendered as an assistant message.
	Error { message: String },
	StructuredData {
		data_type: String,
		#[serde(default)]
		data: Value,
	},
	SuggestedTask {
		task_id: String,
		description: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		due_date: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		lead_id: Option<String>,
	},
	TaskCreated {
		task_id: String,
		#[serde(default)]
		task_details: Value,
	},
	/// Out-of-band chat message (e.g. from a background quote run).
	AgentMessage { message: String },
	CarrierQuoteProgress {
		carrier: String,
		status: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		tab_id: Option<TabId>,
	},
}

impl InboundMessage {
	/// Wire `type` tag, used in logs.
	pub fn kind(&self) -> &'static str {
		match self {
			InboundMessage::ResponseStart => "response_start",
			InboundMessage::ResponseChunk { .. } => "response_chunk",
			InboundMessage::ResponseEnd => "response_end",
			InboundMessage::ToolCall { .. } => "tool_call",
			InboundMessage::ToolResult { .. } => "tool_result",
			InboundMessage::ActionRequest { .. } => "action_request",
			InboundMessage::BrowserAction(_) | InboundMessage::InvalidBrowserAction { .. } => "browser_action",
			InboundMessage::Error { .. } => "error",
			InboundMessage::StructuredData { .. } => "structured_data",
			InboundMessage::SuggestedTask { .. } => "suggested_task",
			InboundMessage::TaskCreated { .. } => "task_created",
			InboundMessage::AgentMessage { .. } => "agent_message",
			InboundMessage::CarrierQuoteProgress { .. } => "carrier_quote_progress",
		}
	}
}

/// Frame sent from the assistant to the backend agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
	/// A user chat message with the active tab's state.
	Message {
		content: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		tab_state: Option<TabState>,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		files: Vec<FileAttachment>,
	},
	/// The user's decision on an `action_request`.
	ActionResponse { action_id: String, approved: bool },
	/// Out-of-band tab state update.
	TabState { tab: TabState },
	/// Result of a `browser_action`, echoing its id.
	BrowserActionResult { action_id: String, result: BrowserActionResult },
	CreateTask { task_id: String, lead_id: String },
	GetLeadForQuote { lead_id: String },
	SaveQuoteNote { lead_id: String, note: String },
	StartCarrierQuote {
		carrier: String,
		tab_id: TabId,
		#[serde(default)]
		quote_data: Value,
		#[serde(default)]
		config: Value,
	},
}

impl OutboundMessage {
	/// Wire `type` tag, used in logs.
	pub fn kind(&self) -> &'static str {
		match self {
			OutboundMessage::Message { .. } => "message",
			OutboundMessage::ActionResponse { .. } => "action_response",
			OutboundMessage::TabState { .. } => "tab_state",
			OutboundMessage::BrowserActionResult { .. } => "browser_action_result",
			OutboundMessage::CreateTask { .. } => "create_task",
			OutboundMessage::GetLeadForQuote { .. } => "get_lead_for_quote",
			OutboundMessage::SaveQuoteNote { .. } => "save_quote_note",
			OutboundMessage::StartCarrierQuote { .. } => "start_carrier_quote",
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::action::BrowserAction;

	#[test]
	fn parse_streaming_frames() {
		let start: InboundMessage = serde_json::from_str(r#"{"type": "response_start"}"#).unwrap();
		assert_eq!(start, InboundMessage::ResponseStart);

		let chunk: InboundMessage = serde_json::from_str(r#"{"type": "response_chunk", "content": "Hello "}"#).unwrap();
		assert_eq!(chunk, InboundMessage::ResponseChunk { content: "Hello ".into() });
	}

	#[test]
	fn parse_tool_call_without_correlation_id() {
		let msg: InboundMessage = serde_json::from_value(json!({"type": "tool_call", "tool": "search_leads", "args": {"query": "LDJ"}})).unwrap();
		match msg {
			InboundMessage::ToolCall { tool, args, tool_call_id } => {
				assert_eq!(tool, "search_leads");
				assert_eq!(args["query"], "LDJ");
				assert!(tool_call_id.is_none());
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn parse_browser_action_frame() {
		let msg: InboundMessage =
			serde_json::from_value(json!({"type": "browser_action", "actionId": "b-1", "action": "navigate", "url": "https://example.com"})).unwrap();
		match msg {
			InboundMessage::BrowserAction(req) => {
				assert_eq!(req.action_id, "b-1");
				assert_eq!(
					req.action,
					BrowserAction::Navigate {
						url: "https://example.com".into()
					}
				);
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn parse_action_request_with_string_target() {
		let msg: InboundMessage = serde_json::from_value(json!({
			"type": "action_request",
			"actionId": "x1",
			"action": "update_lead",
			"target": "lead_123",
			"description": "Set status to Quoted"
		}))
		.unwrap();
		assert_eq!(msg.kind(), "action_request");
	}

	#[test]
	fn unknown_type_is_rejected() {
		assert!(serde_json::from_str::<InboundMessage>(r#"{"type": "nope"}"#).is_err());
		assert!(serde_json::from_str::<InboundMessage>(r#"{"content": "no tag"}"#).is_err());
	}

	#[test]
	fn outbound_frames_use_camel_case_fields() {
		let frame = OutboundMessage::ActionResponse {
			action_id: "x1".into(),
			approved: true,
		};
		assert_eq!(serde_json::to_value(&frame).unwrap(), json!({"type": "action_response", "actionId": "x1", "approved": true}));

		let frame = OutboundMessage::Message {
			content: "hi".into(),
			tab_state: Some(TabState::new(7, "https://app.close.com/", "Close")),
			files: vec![],
		};
		let value = serde_json::to_value(&frame).unwrap();
		assert_eq!(value["type"], "message");
		assert_eq!(value["tabState"]["id"], 7);
		assert!(value.get("files").is_none());
	}

	#[test]
	fn browser_action_result_echoes_id() {
		let frame = OutboundMessage::BrowserActionResult {
			action_id: "b-1".into(),
			result: BrowserActionResult::failure("No active tab"),
		};
		assert_eq!(
			serde_json::to_value(&frame).unwrap(),
			json!({"type": "browser_action_result", "actionId": "b-1", "result": {"success": false, "error": "No active tab"}})
		);
	}
}
