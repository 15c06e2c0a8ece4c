//! Inbound frame handling.
//!
//! [`Dispatcher::dispatch`] matches every [`InboundMessage`] variant, updates
//! the [`Conversation`], runs browser automation through the
//! [`ActionExecutor`], answers the backend over the [`OutboundSink`] and
//! returns the [`UiEvent`]s a surface needs to render the change.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;

use rms_protocol::{BrowserActionRequest, BrowserActionResult, InboundMessage, OutboundMessage};
use rms_runtime::OutboundSink;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::conversation::{AuxiliaryCard, Conversation, Message, MessageId, PendingAction, ToolInvocation, ToolStatus};
use crate::executor::ActionExecutor;

/// Result text reported for automation that the user declined.
const DENIED: &str = "Action denied by user";

/// What changed, for whoever renders the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
	/// A completed message was appended (user, agent message, or error).
	Message(Message),
	StreamStarted { id: MessageId },
	StreamChunk { id: MessageId, chunk: String },
	StreamEnded(Message),
	ToolStarted(ToolInvocation),
	ToolResolved(ToolInvocation),
	ActionRequested(PendingAction),
	/// A newer `action_request` displaced this one; it was denied.
	ActionSuperseded { action_id: String },
	ActionDecided { action_id: String, approved: bool },
	/// Automation held back until the pending action is decided.
	BrowserActionQueued { action_id: String, action: &'static str },
	BrowserActionDone {
		action_id: String,
		action: &'static str,
		result: BrowserActionResult,
	},
	Card(AuxiliaryCard),
}

/// Summarizes a `tool_result` payload into a status and one line of text.
///
/// Result objects carrying `error` (or `success: false`) are failures. Known
/// collections are counted (`leads` gives "Found 2 leads"); strings are cut
/// to their first line.
pub fn summarize_result(result: &Value) -> (ToolStatus, String) {
	const COLLECTIONS: &[(&str, &str, &str)] = &[
		("leads", "lead", "leads"),
		("insureds", "insured", "insureds"),
		("carriers", "carrier", "carriers"),
		("policies", "policy", "policies"),
		("certificates", "certificate", "certificates"),
		("claims", "claim", "claims"),
		("tasks", "task", "tasks"),
		("results", "result", "results"),
	];

	match result {
		Value::Null => (ToolStatus::Complete, "Done".into()),
		Value::String(text) => {
			let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("Done").trim();
			(ToolStatus::Complete, truncate(line, 80))
		}
		Value::Array(items) => (ToolStatus::Complete, format!("{} item(s)", items.len())),
		Value::Object(map) => {
			if let Some(error) = map.get("error").and_then(Value::as_str).filter(|e| !e.is_empty()) {
				return (ToolStatus::Error, truncate(error, 80));
			}
			if map.get("success") == Some(&Value::Bool(false)) {
				let message = map.get("message").and_then(Value::as_str).unwrap_or("Failed");
				return (ToolStatus::Error, truncate(message, 80));
			}
			for (key, one, many) in COLLECTIONS {
				if let Some(items) = map.get(*key).and_then(Value::as_array) {
					let noun = if items.len() == 1 { one } else { many };
					return (ToolStatus::Complete, format!("Found {} {noun}", items.len()));
				}
			}
			let summary = map
				.get("message")
				.or_else(|| map.get("summary"))
				.and_then(Value::as_str)
				.map(|s| truncate(s, 80))
				.unwrap_or_else(|| "Done".into());
			(ToolStatus::Complete, summary)
		}
		other => (ToolStatus::Complete, truncate(&other.to_string(), 80)),
	}
}

fn truncate(text: &str, limit: usize) -> String {
	if text.chars().count() <= limit {
		return text.to_string();
	}
	let mut cut: String = text.chars().take(limit.saturating_sub(3)).collect();
	cut.push_str("...");
	cut
}

pub struct Dispatcher {
	conversation: Conversation,
	executor: ActionExecutor,
	sink: Rc<dyn OutboundSink>,
	queued: VecDeque<BrowserActionRequest>,
	persist_path: Option<PathBuf>,
}

impl Dispatcher {
	pub fn new(conversation: Conversation, executor: ActionExecutor, sink: Rc<dyn OutboundSink>) -> Self {
		Self {
			conversation,
			executor,
			sink,
			queued: VecDeque::new(),
			persist_path: None,
		}
	}

	/// Saves the conversation to `path` whenever a change completes.
	pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
		self.persist_path = Some(path.into());
		self
	}

	pub fn conversation(&self) -> &Conversation {
		&self.conversation
	}

	pub fn conversation_mut(&mut self) -> &mut Conversation {
		&mut self.conversation
	}

	pub fn executor(&self) -> &ActionExecutor {
		&self.executor
	}

	pub fn sink(&self) -> &Rc<dyn OutboundSink> {
		&self.sink
	}

	/// Browser actions waiting behind the pending action.
	pub fn queued_actions(&self) -> usize {
		self.queued.len()
	}

	pub(crate) fn persist(&self) {
		self.conversation.persist(self.persist_path.as_deref());
	}

	/// Sends a frame, logging instead of failing when the socket is down.
	pub(crate) fn send(&self, message: OutboundMessage) -> bool {
		let kind = message.kind();
		match self.sink.send(message) {
			Ok(()) => true,
			Err(err) => {
				warn!(target = "rms", frame = kind, error = %err, "frame not sent");
				false
			}
		}
	}

	pub async fn dispatch(&mut self, message: InboundMessage) -> Vec<UiEvent> {
		debug!(target = "rms", frame = message.kind(), "inbound frame");
		match message {
			InboundMessage::ResponseStart => {
				let mut events = Vec::new();
				if let Some(closed) = self.conversation.start_stream() {
					warn!(target = "rms", closed, "response_start while streaming; closing previous response");
					if let Some(message) = self.conversation.messages().iter().find(|m| m.id == closed) {
						events.push(UiEvent::StreamEnded(message.clone()));
					}
				}
				if let Some(open) = self.conversation.streaming() {
					events.push(UiEvent::StreamStarted { id: open.id });
				}
				events
			}
			InboundMessage::ResponseChunk { content } => {
				if !self.conversation.append_chunk(&content) {
					warn!(target = "rms", len = content.len(), "response_chunk without an open response; dropped");
					return Vec::new();
				}
				match self.conversation.streaming() {
					Some(open) => vec![UiEvent::StreamChunk { id: open.id, chunk: content }],
					None => Vec::new(),
				}
			}
			InboundMessage::ResponseEnd => {
				let Some(done) = self.conversation.end_stream().cloned() else {
					return Vec::new();
				};
				self.persist();
				vec![UiEvent::StreamEnded(done)]
			}
			InboundMessage::ToolCall { tool, args, tool_call_id } => {
				let started = self.conversation.open_tool(tool, args, tool_call_id).clone();
				info!(target = "rms", tool = %started.tool_key, "tool started");
				vec![UiEvent::ToolStarted(started)]
			}
			InboundMessage::ToolResult { result, tool_call_id } => {
				let (status, summary) = summarize_result(&result);
				let Some(resolved) = self.conversation.resolve_tool(tool_call_id.as_deref(), status, summary).cloned() else {
					debug!(target = "rms", call_id = ?tool_call_id, "tool_result without a matching tool call");
					return Vec::new();
				};
				self.persist();
				vec![UiEvent::ToolResolved(resolved)]
			}
			InboundMessage::ActionRequest {
				action_id,
				action,
				target,
				description,
			} => self.request_action(PendingAction {
				action_id,
				action,
				target,
				description,
			}),
			InboundMessage::BrowserAction(request) => {
				if self.conversation.pending_action().is_some() {
					// The backend gives up on an unanswered approval after about 30 s; the queued
					// result is still delivered once the user decides.
					warn!(
						target = "rms",
						action_id = %request.action_id,
						action = request.action.name(),
						"browser action queued behind pending confirmation; result delayed until the user decides"
					);
					let event = UiEvent::BrowserActionQueued {
						action_id: request.action_id.clone(),
						action: request.action.name(),
					};
					self.queued.push_back(request);
					return vec![event];
				}
				vec![self.run_browser_action(request).await]
			}
			InboundMessage::InvalidBrowserAction { action_id, error } => {
				warn!(target = "rms", action_id = %action_id, error = %error, "undecodable browser action; answering with a failure");
				let result = BrowserActionResult::failure(error);
				self.send(OutboundMessage::BrowserActionResult {
					action_id: action_id.clone(),
					result: result.clone(),
				});
				vec![UiEvent::BrowserActionDone {
					action_id,
					action: "browser_action",
					result,
				}]
			}
			InboundMessage::Error { message } => {
				let mut events = Vec::new();
				if let Some(done) = self.conversation.end_stream().cloned() {
					events.push(UiEvent::StreamEnded(done));
				}
				warn!(target = "rms", error = %message, "backend reported an error");
				events.push(UiEvent::Message(self.conversation.push_assistant(format!("Error: {message}")).clone()));
				self.persist();
				events
			}
			InboundMessage::AgentMessage { message } => {
				let appended = self.conversation.push_assistant(message).clone();
				self.persist();
				vec![UiEvent::Message(appended)]
			}
			InboundMessage::StructuredData { data_type, data } => self.card(AuxiliaryCard::StructuredData { data_type, data }),
			InboundMessage::SuggestedTask {
				task_id,
				description,
				due_date,
				lead_id,
			} => self.card(AuxiliaryCard::SuggestedTask {
				task_id,
				description,
				due_date,
				lead_id,
			}),
			InboundMessage::TaskCreated { task_id, task_details } => self.card(AuxiliaryCard::TaskCreated { task_id, task_details }),
			InboundMessage::CarrierQuoteProgress { carrier, status, tab_id } => self.card(AuxiliaryCard::CarrierQuote { carrier, status, tab_id }),
		}
	}

	fn card(&mut self, card: AuxiliaryCard) -> Vec<UiEvent> {
		self.conversation.push_card(card.clone());
		self.persist();
		vec![UiEvent::Card(card)]
	}

	fn request_action(&mut self, action: PendingAction) -> Vec<UiEvent> {
		let mut events = Vec::new();
		if let Some(older) = self.conversation.replace_pending(action.clone()) {
			warn!(target = "rms", superseded = %older.action_id, by = %action.action_id, "new action request; denying the older one");
			self.send(OutboundMessage::ActionResponse {
				action_id: older.action_id.clone(),
				approved: false,
			});
			events.push(UiEvent::ActionSuperseded { action_id: older.action_id });
		}
		info!(target = "rms", action_id = %action.action_id, action = %action.action, "action awaiting confirmation");
		events.push(UiEvent::ActionRequested(action));
		events
	}

	/// Answers the pending action, then releases the automation queued behind it.
	///
	/// Queued browser actions run when the action was allowed and are reported
	/// as denied otherwise. Returns an empty list when nothing is pending.
	pub async fn decide(&mut self, approved: bool) -> Vec<UiEvent> {
		let Some(pending) = self.conversation.take_pending() else {
			debug!(target = "rms", "no pending action to decide");
			return Vec::new();
		};
		info!(target = "rms", action_id = %pending.action_id, approved, "action decided");
		self.send(OutboundMessage::ActionResponse {
			action_id: pending.action_id.clone(),
			approved,
		});

		let mut events = vec![UiEvent::ActionDecided {
			action_id: pending.action_id,
			approved,
		}];
		while let Some(request) = self.queued.pop_front() {
			let event = if approved {
				self.run_browser_action(request).await
			} else {
				self.reply(request, BrowserActionResult::failure(DENIED))
			};
			events.push(event);
		}
		events
	}

	async fn run_browser_action(&self, request: BrowserActionRequest) -> UiEvent {
		let result = self.executor.execute(&request.action).await;
		self.reply(request, result)
	}

	/// Every browser action gets exactly one `browser_action_result`.
	fn reply(&self, request: BrowserActionRequest, result: BrowserActionResult) -> UiEvent {
		self.send(OutboundMessage::BrowserActionResult {
			action_id: request.action_id.clone(),
			result: result.clone(),
		});
		UiEvent::BrowserActionDone {
			action_id: request.action_id,
			action: request.action.name(),
			result,
		}
	}
}

#[cfg(test)]
mod tests {
	use rms_protocol::{BrowserAction, ElementTarget};
	use rms_runtime::MemorySink;
	use serde_json::json;

	use super::*;
	use crate::executor::AutomationConfig;
	use crate::host::{BrowserHost, StaticHost};

	fn setup() -> (Dispatcher, MemorySink, Rc<StaticHost>) {
		let host = Rc::new(StaticHost::new());
		host.open_tab("https://portal.test/", r#"<title>Portal</title><input id="email">"#);
		let sink = MemorySink::new();
		let executor = ActionExecutor::new(Rc::clone(&host) as Rc<dyn BrowserHost>, AutomationConfig::default());
		let dispatcher = Dispatcher::new(Conversation::new(), executor, Rc::new(sink.clone()));
		(dispatcher, sink, host)
	}

	fn frame(value: Value) -> InboundMessage {
		serde_json::from_value(value).unwrap()
	}

	fn fill_email(id: &str) -> InboundMessage {
		InboundMessage::BrowserAction(BrowserActionRequest {
			action_id: id.into(),
			action: BrowserAction::Fill {
				target: ElementTarget::selector("#email"),
				value: "ops@ldj.test".into(),
			},
		})
	}

	#[tokio::test]
	async fn chunk_without_start_is_dropped() {
		let (mut d, _sink, _host) = setup();
		assert!(d.dispatch(InboundMessage::ResponseChunk { content: "stray".into() }).await.is_empty());
		assert!(d.dispatch(InboundMessage::ResponseEnd).await.is_empty());
		assert!(d.conversation().messages().is_empty());
	}

	#[tokio::test]
	async fn second_start_closes_the_open_stream() {
		let (mut d, _sink, _host) = setup();
		d.dispatch(InboundMessage::ResponseStart).await;
		d.dispatch(InboundMessage::ResponseChunk { content: "one".into() }).await;
		let events = d.dispatch(InboundMessage::ResponseStart).await;
		assert!(matches!(&events[0], UiEvent::StreamEnded(m) if m.content == "one"));
		assert!(matches!(events[1], UiEvent::StreamStarted { .. }));
	}

	#[tokio::test]
	async fn tool_results_correlate_by_id() {
		let (mut d, _sink, _host) = setup();
		d.dispatch(frame(json!({"type": "tool_call", "tool": "search_leads", "args": {}, "toolCallId": "t1"}))).await;
		d.dispatch(frame(json!({"type": "tool_call", "tool": "lookup_dot_number", "args": {}, "toolCallId": "t2"}))).await;

		let events = d
			.dispatch(frame(json!({"type": "tool_result", "toolCallId": "t1", "result": {"leads": [{"id": "lead_1"}, {"id": "lead_2"}]}})))
			.await;
		match &events[..] {
			[UiEvent::ToolResolved(tool)] => {
				assert_eq!(tool.tool_key, "search_leads");
				assert_eq!(tool.result_summary.as_deref(), Some("Found 2 leads"));
			}
			other => panic!("unexpected {other:?}"),
		}
		assert_eq!(d.conversation().tools()[1].status, ToolStatus::Pending);
	}

	#[tokio::test]
	async fn stray_tool_result_is_ignored() {
		let (mut d, _sink, _host) = setup();
		assert!(d.dispatch(frame(json!({"type": "tool_result", "result": "ok"}))).await.is_empty());
	}

	#[tokio::test]
	async fn browser_action_always_answers() {
		let (mut d, sink, host) = setup();
		d.dispatch(fill_email("b1")).await;
		host.close_tab(1);
		d.dispatch(fill_email("b2")).await;

		let results: Vec<(String, bool)> = sink
			.sent()
			.into_iter()
			.filter_map(|m| match m {
				OutboundMessage::BrowserActionResult { action_id, result } => Some((action_id, result.success)),
				_ => None,
			})
			.collect();
		assert_eq!(results, vec![("b1".to_string(), true), ("b2".to_string(), false)]);
	}

	#[tokio::test]
	async fn undecodable_browser_action_still_answers() {
		let (mut d, sink, _host) = setup();
		let message = rms_protocol::framing::decode_line(r#"{"type":"browser_action","actionId":"b9","action":"hover"}"#).unwrap();
		let events = d.dispatch(message).await;
		assert!(matches!(&events[..], [UiEvent::BrowserActionDone { action_id, result, .. }] if action_id == "b9" && !result.success));
		match &sink.sent()[..] {
			[OutboundMessage::BrowserActionResult { action_id, result }] => {
				assert_eq!(action_id, "b9");
				assert!(!result.success);
				assert!(result.error.as_deref().is_some_and(|e| e.starts_with("Unsupported action `hover`")));
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[tokio::test]
	async fn newer_request_denies_the_older() {
		let (mut d, sink, _host) = setup();
		d.dispatch(frame(json!({"type": "action_request", "actionId": "a1", "action": "update_lead", "target": "lead_1"})))
			.await;
		let events = d
			.dispatch(frame(json!({"type": "action_request", "actionId": "a2", "action": "update_lead", "target": "lead_2"})))
			.await;
		assert!(matches!(&events[0], UiEvent::ActionSuperseded { action_id } if action_id == "a1"));
		assert_eq!(
			sink.take(),
			vec![OutboundMessage::ActionResponse {
				action_id: "a1".into(),
				approved: false
			}]
		);
		assert_eq!(d.conversation().pending_action().unwrap().action_id, "a2");
	}

	#[tokio::test]
	async fn automation_waits_for_the_decision() {
		let (mut d, sink, host) = setup();
		d.dispatch(frame(json!({"type": "action_request", "actionId": "a1", "action": "fill_quote", "target": "form"})))
			.await;
		let queued = d.dispatch(fill_email("b1")).await;
		assert!(matches!(queued[0], UiEvent::BrowserActionQueued { .. }));
		assert!(sink.sent().is_empty());
		assert_eq!(d.queued_actions(), 1);

		let events = d.decide(true).await;
		assert_eq!(events.len(), 2);
		assert_eq!(
			sink.sent()[0],
			OutboundMessage::ActionResponse {
				action_id: "a1".into(),
				approved: true
			}
		);
		assert!(matches!(&sink.sent()[1], OutboundMessage::BrowserActionResult { action_id, result } if action_id == "b1" && result.success));

		let doc = host.document(1).unwrap();
		let email = doc.borrow().select_first("#email").unwrap().unwrap();
		assert_eq!(doc.borrow().value(email), "ops@ldj.test");
		assert!(d.decide(true).await.is_empty());
	}

	#[tokio::test]
	async fn denial_fails_queued_automation() {
		let (mut d, sink, _host) = setup();
		d.dispatch(frame(json!({"type": "action_request", "actionId": "a1", "action": "fill_quote"}))).await;
		d.dispatch(fill_email("b1")).await;
		d.decide(false).await;
		match &sink.sent()[1] {
			OutboundMessage::BrowserActionResult { result, .. } => {
				assert!(!result.success);
				assert_eq!(result.error.as_deref(), Some(DENIED));
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[tokio::test]
	async fn error_and_agent_message_become_assistant_messages() {
		let (mut d, _sink, _host) = setup();
		d.dispatch(InboundMessage::ResponseStart).await;
		let events = d.dispatch(InboundMessage::Error { message: "CRM unavailable".into() }).await;
		assert_eq!(events.len(), 2);
		d.dispatch(InboundMessage::AgentMessage { message: "Quote saved".into() }).await;

		let contents: Vec<&str> = d.conversation().messages().iter().map(|m| m.content.as_str()).collect();
		assert_eq!(contents, vec!["", "Error: CRM unavailable", "Quote saved"]);
		assert!(d.conversation().streaming().is_none());
	}

	#[tokio::test]
	async fn agent_message_does_not_break_the_open_stream() {
		let (mut d, _sink, _host) = setup();
		d.dispatch(InboundMessage::ResponseStart).await;
		d.dispatch(InboundMessage::ResponseChunk { content: "Hello".into() }).await;
		d.dispatch(InboundMessage::AgentMessage { message: "Quote saved".into() }).await;
		let chunk = d.dispatch(InboundMessage::ResponseChunk { content: " world".into() }).await;
		assert!(matches!(&chunk[..], [UiEvent::StreamChunk { chunk, .. }] if chunk == " world"));

		let ended = d.dispatch(InboundMessage::ResponseEnd).await;
		assert!(matches!(&ended[..], [UiEvent::StreamEnded(m)] if m.content == "Hello world" && !m.is_streaming()));
	}

	#[tokio::test]
	async fn side_channel_frames_only_touch_cards() {
		let (mut d, _sink, _host) = setup();
		d.dispatch(frame(json!({"type": "structured_data", "dataType": "carrier", "data": {"dot": "123"}}))).await;
		d.dispatch(frame(json!({"type": "suggested_task", "taskId": "t1", "description": "Call back"}))).await;
		d.dispatch(frame(json!({"type": "task_created", "taskId": "t1", "taskDetails": {}}))).await;
		d.dispatch(frame(json!({"type": "carrier_quote_progress", "carrier": "geico", "status": "started", "tabId": 4})))
			.await;
		assert!(d.conversation().messages().is_empty());
		assert_eq!(d.conversation().cards().len(), 4);
	}

	#[test]
	fn summaries() {
		assert_eq!(summarize_result(&json!({"leads": [{}]})), (ToolStatus::Complete, "Found 1 lead".into()));
		assert_eq!(summarize_result(&json!({"policies": []})), (ToolStatus::Complete, "Found 0 policies".into()));
		assert_eq!(summarize_result(&json!({"error": "rate limited"})), (ToolStatus::Error, "rate limited".into()));
		assert_eq!(summarize_result(&json!("\nFound 3 leads matching your search.\n...")).1, "Found 3 leads matching your search.");
		assert_eq!(summarize_result(&Value::Null).1, "Done");
	}
}
