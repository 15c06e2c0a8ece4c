//! Conversation state: the ordered message log, tool invocations, the single
//! pending action and the auxiliary cards, plus JSON persistence.

use std::fs;
use std::path::Path;

use rms_protocol::{TabId, now_millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;

pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	User,
	Assistant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Streaming {
	#[default]
	None,
	InProgress,
	Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
	pub id: MessageId,
	pub role: Role,
	pub content: String,
	pub timestamp: i64,
	#[serde(default)]
	pub streaming: Streaming,
}

impl Message {
	pub fn is_streaming(&self) -> bool {
		self.streaming == Streaming::InProgress
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
	Pending,
	Complete,
	Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
	pub tool_key: String,
	pub label: String,
	pub status: ToolStatus,
	#[serde(default)]
	pub args: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result_summary: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub call_id: Option<String>,
}

/// Backend action waiting for the user's allow/deny decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
	pub action_id: String,
	pub action: String,
	#[serde(default)]
	pub target: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

/// Structured side-channel output kept apart from the chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AuxiliaryCard {
	StructuredData {
		data_type: String,
		data: Value,
	},
	SuggestedTask {
		task_id: String,
		description: String,
		due_date: Option<String>,
		lead_id: Option<String>,
	},
	TaskCreated {
		task_id: String,
		task_details: Value,
	},
	CarrierQuote {
		carrier: String,
		status: String,
		tab_id: Option<TabId>,
	},
}

/// Display label for a backend tool key.
pub fn tool_label(tool_key: &str) -> String {
	let known = match tool_key {
		"search_leads" => Some("Searching leads"),
		"create_lead" => Some("Creating lead"),
		"add_note_to_lead" => Some("Adding note"),
		"update_lead_status" => Some("Updating lead status"),
		"log_call" => Some("Logging call"),
		"lookup_dot_number" => Some("Looking up DOT number"),
		"search_carriers" => Some("Searching carriers"),
		"check_safety_rating" => Some("Checking safety rating"),
		"search_insured" => Some("Searching insureds"),
		"get_policy_details" => Some("Loading policy"),
		"list_certificates" => Some("Listing certificates"),
		"check_policy_status" => Some("Checking policy status"),
		"get_claims_history" => Some("Loading claims history"),
		"read_pdf" | "read_pdf_page" | "get_pdf_info" => Some("Reading PDF"),
		"carrier_snapshot" => Some("Building carrier snapshot"),
		_ => None,
	};
	match known {
		Some(label) => label.to_string(),
		None => {
			let spaced = tool_key.replace('_', " ");
			let mut chars = spaced.chars();
			match chars.next() {
				Some(first) => first.to_uppercase().chain(chars).collect(),
				None => String::new(),
			}
		}
	}
}

/// Chat history and interaction state of one session.
///
/// Messages are append-only except the single in-progress assistant message,
/// which stays open while other messages are appended after it. The pending
/// action, the open stream and the positional "current tool" are transient
/// and never persisted.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
	#[serde(default)]
	messages: Vec<Message>,
	#[serde(default)]
	tools: Vec<ToolInvocation>,
	#[serde(default)]
	cards: Vec<AuxiliaryCard>,
	#[serde(default)]
	next_id: MessageId,
	#[serde(skip)]
	pending: Option<PendingAction>,
	#[serde(skip)]
	current_tool: Option<usize>,
	#[serde(skip)]
	open_stream: Option<MessageId>,
}

impl Conversation {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn messages(&self) -> &[Message] {
		&self.messages
	}

	pub fn tools(&self) -> &[ToolInvocation] {
		&self.tools
	}

	pub fn cards(&self) -> &[AuxiliaryCard] {
		&self.cards
	}

	pub fn is_empty(&self) -> bool {
		self.messages.is_empty() && self.tools.is_empty() && self.cards.is_empty()
	}

	fn push(&mut self, role: Role, content: String, streaming: Streaming) -> &Message {
		self.next_id += 1;
		self.messages.push(Message {
			id: self.next_id,
			role,
			content,
			timestamp: now_millis(),
			streaming,
		});
		&self.messages[self.messages.len() - 1]
	}

	pub fn push_user(&mut self, content: impl Into<String>) -> &Message {
		self.push(Role::User, content.into(), Streaming::None)
	}

	/// Appends a completed assistant message.
	pub fn push_assistant(&mut self, content: impl Into<String>) -> &Message {
		self.push(Role::Assistant, content.into(), Streaming::Done)
	}

	fn open_index(&self) -> Option<usize> {
		let id = self.open_stream?;
		self.messages.iter().rposition(|m| m.id == id && m.is_streaming())
	}

	/// The open in-progress message, if any.
	pub fn streaming(&self) -> Option<&Message> {
		self.open_index().map(|i| &self.messages[i])
	}

	/// Opens a new in-progress assistant message.
	///
	/// An already open stream is closed first; its id is returned.
	pub fn start_stream(&mut self) -> Option<MessageId> {
		let closed = self.end_stream().map(|m| m.id);
		let id = self.push(Role::Assistant, String::new(), Streaming::InProgress).id;
		self.open_stream = Some(id);
		closed
	}

	/// Appends to the open stream. Returns false when no stream is open.
	pub fn append_chunk(&mut self, chunk: &str) -> bool {
		match self.open_index() {
			Some(index) => {
				self.messages[index].content.push_str(chunk);
				true
			}
			None => false,
		}
	}

	/// Closes the open stream, returning the finished message.
	pub fn end_stream(&mut self) -> Option<&Message> {
		let index = self.open_index();
		self.open_stream = None;
		let message = &mut self.messages[index?];
		message.streaming = Streaming::Done;
		Some(&*message)
	}

	/// Records a new pending tool invocation and makes it current.
	pub fn open_tool(&mut self, tool_key: impl Into<String>, args: Value, call_id: Option<String>) -> &ToolInvocation {
		let tool_key = tool_key.into();
		self.tools.push(ToolInvocation {
			label: tool_label(&tool_key),
			tool_key,
			status: ToolStatus::Pending,
			args,
			result_summary: None,
			call_id,
		});
		let index = self.tools.len() - 1;
		self.current_tool = Some(index);
		&self.tools[index]
	}

	/// Resolves the invocation with `call_id`, or the current one when the
	/// backend sent no id. Returns `None` when nothing matches.
	pub fn resolve_tool(&mut self, call_id: Option<&str>, status: ToolStatus, summary: impl Into<String>) -> Option<&ToolInvocation> {
		let index = match call_id {
			Some(id) => self
				.tools
				.iter()
				.rposition(|tool| tool.call_id.as_deref() == Some(id) && tool.status == ToolStatus::Pending)?,
			None => self.current_tool.filter(|&i| self.tools[i].status == ToolStatus::Pending)?,
		};
		if self.current_tool == Some(index) {
			self.current_tool = None;
		}
		let tool = &mut self.tools[index];
		tool.status = status;
		tool.result_summary = Some(summary.into());
		Some(&*tool)
	}

	pub fn pending_action(&self) -> Option<&PendingAction> {
		self.pending.as_ref()
	}

	/// Installs a new pending action, returning the one it displaces.
	pub fn replace_pending(&mut self, action: PendingAction) -> Option<PendingAction> {
		self.pending.replace(action)
	}

	pub fn take_pending(&mut self) -> Option<PendingAction> {
		self.pending.take()
	}

	/// Adds a card. Carrier quote progress replaces the card of the same carrier.
	pub fn push_card(&mut self, card: AuxiliaryCard) {
		if let AuxiliaryCard::CarrierQuote { carrier, .. } = &card {
			let existing = self
				.cards
				.iter_mut()
				.find(|c| matches!(c, AuxiliaryCard::CarrierQuote { carrier: other, .. } if other == carrier));
			if let Some(existing) = existing {
				*existing = card;
				return;
			}
		}
		self.cards.push(card);
	}

	pub fn clear(&mut self) {
		*self = Self::default();
	}

	/// Loads a saved conversation, or an empty one when `path` does not exist.
	///
	/// A stream cut off by shutdown is marked done and unresolved tools are
	/// marked as interrupted.
	pub fn load(path: &Path) -> Result<Self> {
		if !path.exists() {
			return Ok(Self::new());
		}
		let text = fs::read_to_string(path)?;
		let mut conversation: Conversation = serde_json::from_str(&text)?;
		conversation.recover();
		debug!(target = "rms", path = %path.display(), messages = conversation.messages.len(), "conversation loaded");
		Ok(conversation)
	}

	fn recover(&mut self) {
		for message in self.messages.iter_mut().filter(|m| m.is_streaming()) {
			message.streaming = Streaming::Done;
		}
		self.open_stream = None;
		for tool in self.tools.iter_mut().filter(|t| t.status == ToolStatus::Pending) {
			tool.status = ToolStatus::Error;
			tool.result_summary = Some("interrupted".into());
		}
		self.next_id = self.next_id.max(self.messages.iter().map(|m| m.id).max().unwrap_or(0));
	}

	pub fn save(&self, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		fs::write(path, serde_json::to_string_pretty(self)?)?;
		Ok(())
	}

	/// Saves, logging instead of failing. Persistence never interrupts the chat.
	pub fn persist(&self, path: Option<&Path>) {
		let Some(path) = path else {
			return;
		};
		if let Err(err) = self.save(path) {
			warn!(target = "rms", path = %path.display(), error = %err, "failed to save conversation");
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn stream_accumulates_chunks() {
		let mut conv = Conversation::new();
		assert_eq!(conv.start_stream(), None);
		assert!(conv.append_chunk("Found "));
		assert!(conv.append_chunk("it."));
		let done = conv.end_stream().unwrap();
		assert_eq!(done.content, "Found it.");
		assert_eq!(done.streaming, Streaming::Done);
		assert!(!conv.append_chunk("late"));
		assert!(conv.end_stream().is_none());
	}

	#[test]
	fn second_start_force_closes_the_first() {
		let mut conv = Conversation::new();
		conv.start_stream();
		conv.append_chunk("partial");
		let closed = conv.start_stream().unwrap();
		assert_eq!(conv.messages()[0].id, closed);
		assert_eq!(conv.messages()[0].streaming, Streaming::Done);
		assert!(conv.streaming().is_some());
		assert_eq!(conv.messages().len(), 2);
	}

	#[test]
	fn stream_stays_open_across_interleaved_messages() {
		let mut conv = Conversation::new();
		conv.start_stream();
		conv.append_chunk("Hello");
		conv.push_assistant("Checking the lead.");
		conv.push_user("thanks");
		assert!(conv.append_chunk(" world"));
		assert_eq!(conv.streaming().map(|m| m.content.as_str()), Some("Hello world"));

		let done = conv.end_stream().unwrap();
		assert_eq!(done.content, "Hello world");
		assert_eq!(done.streaming, Streaming::Done);
		assert_eq!(conv.messages().len(), 3);
		assert!(conv.messages().iter().all(|m| !m.is_streaming()));
	}

	#[test]
	fn tools_resolve_by_id_or_position() {
		let mut conv = Conversation::new();
		conv.open_tool("search_leads", json!({"query": "LDJ"}), Some("c1".into()));
		conv.open_tool("lookup_dot_number", json!({}), Some("c2".into()));

		let first = conv.resolve_tool(Some("c1"), ToolStatus::Complete, "Found 1 lead").unwrap();
		assert_eq!(first.tool_key, "search_leads");
		assert!(conv.resolve_tool(Some("c1"), ToolStatus::Complete, "again").is_none());

		conv.open_tool("read_pdf", json!({}), None);
		let positional = conv.resolve_tool(None, ToolStatus::Error, "failed").unwrap();
		assert_eq!(positional.label, "Reading PDF");
		assert!(conv.resolve_tool(None, ToolStatus::Complete, "none left").is_none());
		assert_eq!(conv.tools()[1].status, ToolStatus::Pending);
	}

	#[test]
	fn carrier_progress_updates_in_place() {
		let mut conv = Conversation::new();
		let progress = |status: &str| AuxiliaryCard::CarrierQuote {
			carrier: "progressive".into(),
			status: status.into(),
			tab_id: Some(3),
		};
		conv.push_card(progress("started"));
		conv.push_card(progress("filling"));
		assert_eq!(conv.cards(), &[progress("filling")]);
	}

	#[test]
	fn labels_fall_back_to_the_key() {
		assert_eq!(tool_label("search_leads"), "Searching leads");
		assert_eq!(tool_label("recall"), "Recall");
		assert_eq!(tool_label("list_carrier_notes"), "List carrier notes");
	}

	#[test]
	fn reload_recovers_interrupted_state() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("conversation.json");

		let mut conv = Conversation::new();
		conv.push_user("find LDJ");
		conv.open_tool("search_leads", json!({"query": "LDJ"}), None);
		conv.start_stream();
		conv.append_chunk("Looking");
		conv.replace_pending(PendingAction {
			action_id: "a1".into(),
			action: "update_lead".into(),
			target: json!("lead_1"),
			description: None,
		});
		conv.save(&path).unwrap();

		let mut loaded = Conversation::load(&path).unwrap();
		assert_eq!(loaded.messages().len(), 2);
		assert!(loaded.streaming().is_none());
		assert_eq!(loaded.messages()[1].content, "Looking");
		assert_eq!(loaded.tools()[0].status, ToolStatus::Error);
		assert_eq!(loaded.tools()[0].result_summary.as_deref(), Some("interrupted"));
		assert!(loaded.pending_action().is_none());

		let next = loaded.push_user("again").id;
		assert_eq!(next, 3);
	}

	#[test]
	fn missing_file_loads_empty() {
		let dir = tempfile::tempdir().unwrap();
		let conv = Conversation::load(&dir.path().join("none.json")).unwrap();
		assert!(conv.is_empty());
	}
}
