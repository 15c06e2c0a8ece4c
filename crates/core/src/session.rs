//! One assistant lifetime: the conversation, the dispatcher, staged
//! attachments, and the user-initiated requests.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use rms_protocol::{FileAttachment, InboundMessage, OutboundMessage, PageContext, TabId, TabState};
use rms_runtime::OutboundSink;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::context::{ContextUpdate, WatcherConfig};
use crate::conversation::{Conversation, Message};
use crate::dispatcher::{Dispatcher, UiEvent};
use crate::error::{Error, Result};
use crate::executor::{ActionExecutor, AutomationConfig};
use crate::host::BrowserHost;

/// Context fields forwarded as carrier quote data.
const QUOTE_FIELDS: &[&str] = &["companyName", "contactName", "dotNumber", "mcNumber", "phone", "email"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
	pub automation: AutomationConfig,
	pub watcher: WatcherConfig,
}

/// Builds `quoteData` for `start_carrier_quote` from a lead and the page it is shown on.
pub fn quote_data(lead_id: &str, context: Option<&PageContext>) -> Value {
	let mut data = Map::new();
	data.insert("leadId".into(), lead_id.into());
	if let Some(context) = context {
		for name in QUOTE_FIELDS {
			if let Some(value) = context.field(name) {
				data.insert((*name).into(), value.into());
			}
		}
	}
	Value::Object(data)
}

pub struct AssistantSession {
	host: Rc<dyn BrowserHost>,
	dispatcher: Dispatcher,
	config: SessionConfig,
	attachments: Vec<FileAttachment>,
}

impl AssistantSession {
	pub fn new(host: Rc<dyn BrowserHost>, sink: Rc<dyn OutboundSink>, conversation: Conversation, config: SessionConfig) -> Self {
		let executor = ActionExecutor::new(Rc::clone(&host), config.automation);
		Self {
			dispatcher: Dispatcher::new(conversation, executor, sink),
			host,
			config,
			attachments: Vec::new(),
		}
	}

	/// Saves the conversation to `path` after every completed change.
	pub fn with_persistence(mut self, path: impl Into<std::path::PathBuf>) -> Self {
		self.dispatcher = self.dispatcher.with_persistence(path);
		self
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	pub fn host(&self) -> &Rc<dyn BrowserHost> {
		&self.host
	}

	pub fn conversation(&self) -> &Conversation {
		self.dispatcher.conversation()
	}

	pub fn sink(&self) -> &Rc<dyn OutboundSink> {
		self.dispatcher.sink()
	}

	/// Files staged for the next message.
	pub fn attachments(&self) -> &[FileAttachment] {
		&self.attachments
	}

	/// Validates and stages a file for the next message.
	pub fn attach(&mut self, name: impl Into<String>, bytes: &[u8]) -> Result<&FileAttachment> {
		let attachment = FileAttachment::from_bytes(name, bytes)?;
		info!(target = "rms", name = %attachment.name, size = attachment.size, mime = %attachment.mime_type, "attachment staged");
		self.attachments.push(attachment);
		Ok(&self.attachments[self.attachments.len() - 1])
	}

	pub fn attach_path(&mut self, path: &Path) -> Result<&FileAttachment> {
		let bytes = fs::read(path)?;
		let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.display().to_string());
		self.attach(name, &bytes)
	}

	/// Snapshot of the focused tab with its cached context.
	pub async fn active_tab_state(&self) -> Option<TabState> {
		let id = self.host.active_tab().await?;
		self.host.tab(id).await
	}

	async fn active_context(&self) -> Option<PageContext> {
		let id = self.host.active_tab().await?;
		self.host.cached_context(id)
	}

	/// Sends a user message with the active tab state and staged files.
	///
	/// On a send failure nothing is recorded and the files stay staged.
	pub async fn send_message(&mut self, content: &str) -> Result<Message> {
		let frame = OutboundMessage::Message {
			content: content.to_string(),
			tab_state: self.active_tab_state().await,
			files: self.attachments.clone(),
		};
		self.dispatcher.sink().send(frame)?;
		self.attachments.clear();
		let message = self.dispatcher.conversation_mut().push_user(content).clone();
		self.dispatcher.persist();
		Ok(message)
	}

	pub async fn handle_frame(&mut self, frame: InboundMessage) -> Vec<UiEvent> {
		self.dispatcher.dispatch(frame).await
	}

	/// Allows or denies the pending action.
	pub async fn decide(&mut self, approved: bool) -> Vec<UiEvent> {
		self.dispatcher.decide(approved).await
	}

	/// Caches a freshly detected context and forwards the tab state when the
	/// tab is focused. Returns the published state.
	pub async fn handle_context_update(&mut self, update: ContextUpdate) -> Option<TabState> {
		let ContextUpdate { tab_id, context } = update;
		self.host.cache_context(tab_id, context);
		if self.host.active_tab().await != Some(tab_id) {
			debug!(target = "rms", tab = tab_id, "context cached for background tab");
			return None;
		}
		let state = self.host.tab(tab_id).await?;
		if let Err(err) = self.dispatcher.sink().publish_tab_state(state.clone()) {
			debug!(target = "rms", tab = tab_id, error = %err, "tab state recorded for replay on reconnect");
		}
		Some(state)
	}

	fn lead_id(&self, explicit: Option<&str>, context: Option<&PageContext>) -> Result<String> {
		explicit
			.or_else(|| context.and_then(|c| c.field("leadId")))
			.map(str::to_string)
			.ok_or(Error::NoLead)
	}

	/// Asks the backend to create a suggested task for a lead (defaults to the lead on screen).
	pub async fn create_task(&self, task_id: &str, lead_id: Option<&str>) -> Result<()> {
		let context = self.active_context().await;
		let lead_id = self.lead_id(lead_id, context.as_ref())?;
		self.send(OutboundMessage::CreateTask {
			task_id: task_id.to_string(),
			lead_id,
		})
	}

	pub async fn get_lead_for_quote(&self, lead_id: Option<&str>) -> Result<()> {
		let context = self.active_context().await;
		let lead_id = self.lead_id(lead_id, context.as_ref())?;
		self.send(OutboundMessage::GetLeadForQuote { lead_id })
	}

	pub async fn save_quote_note(&self, lead_id: Option<&str>, note: &str) -> Result<()> {
		let context = self.active_context().await;
		let lead_id = self.lead_id(lead_id, context.as_ref())?;
		self.send(OutboundMessage::SaveQuoteNote {
			lead_id,
			note: note.to_string(),
		})
	}

	/// Starts carrier quote automation in the focused tab.
	pub async fn start_carrier_quote(&self, carrier: &str, lead_id: Option<&str>, config: Value) -> Result<TabId> {
		let tab_id = self.host.active_tab().await.ok_or(Error::NoActiveTab)?;
		let context = self.host.cached_context(tab_id);
		let lead_id = self.lead_id(lead_id, context.as_ref())?;
		self.send(OutboundMessage::StartCarrierQuote {
			carrier: carrier.to_string(),
			tab_id,
			quote_data: quote_data(&lead_id, context.as_ref()),
			config,
		})?;
		Ok(tab_id)
	}

	fn send(&self, frame: OutboundMessage) -> Result<()> {
		let kind = frame.kind();
		self.dispatcher.sink().send(frame).map_err(|err| {
			warn!(target = "rms", frame = kind, error = %err, "request not sent");
			Error::from(err)
		})
	}

	/// Clears the conversation and staged files.
	pub fn clear(&mut self) {
		self.attachments.clear();
		self.dispatcher.conversation_mut().clear();
		self.dispatcher.persist();
	}
}

#[cfg(test)]
mod tests {
	use rms_protocol::Site;
	use rms_runtime::MemorySink;
	use serde_json::json;

	use super::*;
	use crate::host::StaticHost;

	fn lead_context() -> PageContext {
		let mut context = PageContext {
			site: Site::CloseCrm,
			url: "https://app.close.com/lead/lead_7/".into(),
			..Default::default()
		};
		context.fields.set("leadId", "lead_7");
		context.fields.set("companyName", "LDJ Trucking");
		context.fields.set("dotNumber", "1234567");
		context
	}

	fn setup() -> (AssistantSession, MemorySink, Rc<StaticHost>, TabId) {
		let host = Rc::new(StaticHost::new());
		let tab = host.open_tab("https://app.close.com/lead/lead_7/", "<title>LDJ Trucking</title>");
		let sink = MemorySink::new();
		let session = AssistantSession::new(
			Rc::clone(&host) as Rc<dyn BrowserHost>,
			Rc::new(sink.clone()),
			Conversation::new(),
			SessionConfig::default(),
		);
		(session, sink, host, tab)
	}

	#[tokio::test]
	async fn message_carries_tab_state_and_files() {
		let (mut session, sink, _host, tab) = setup();
		session.attach("dec-page.pdf", b"%PDF-1.4").unwrap();
		session.send_message("Summarize this").await.unwrap();

		match &sink.sent()[0] {
			OutboundMessage::Message { content, tab_state, files } => {
				assert_eq!(content, "Summarize this");
				assert_eq!(tab_state.as_ref().map(|t| t.id), Some(tab));
				assert_eq!(files.len(), 1);
			}
			other => panic!("unexpected {other:?}"),
		}
		assert!(session.attachments().is_empty());
		assert_eq!(session.conversation().messages().len(), 1);
	}

	#[tokio::test]
	async fn disconnected_send_keeps_state() {
		let (mut session, sink, _host, _tab) = setup();
		session.attach("photo.png", &[0x89, b'P', b'N', b'G']).unwrap();
		sink.set_connected(false);
		assert!(matches!(session.send_message("hello").await, Err(Error::Transport(_))));
		assert_eq!(session.attachments().len(), 1);
		assert!(session.conversation().messages().is_empty());
	}

	#[tokio::test]
	async fn user_message_mid_stream_keeps_the_reply_open() {
		let (mut session, _sink, _host, _tab) = setup();
		session.handle_frame(InboundMessage::ResponseStart).await;
		session.handle_frame(InboundMessage::ResponseChunk { content: "Hello".into() }).await;
		session.handle_frame(InboundMessage::AgentMessage { message: "Quote saved".into() }).await;
		session.send_message("are you there?").await.unwrap();
		session.handle_frame(InboundMessage::ResponseChunk { content: " world".into() }).await;

		let ended = session.handle_frame(InboundMessage::ResponseEnd).await;
		match &ended[..] {
			[UiEvent::StreamEnded(message)] => {
				assert_eq!(message.content, "Hello world");
				assert!(!message.is_streaming());
			}
			other => panic!("unexpected {other:?}"),
		}
		let contents: Vec<&str> = session.conversation().messages().iter().map(|m| m.content.as_str()).collect();
		assert_eq!(contents, vec!["Hello world", "Quote saved", "are you there?"]);
	}

	#[tokio::test]
	async fn unsupported_attachment_is_user_facing() {
		let (mut session, _sink, _host, _tab) = setup();
		let err = session.attach("notes.docx", b"PK").unwrap_err();
		assert!(err.is_user_facing());
		assert!(err.to_string().contains("Only PDF, PNG and JPEG"));
	}

	#[tokio::test]
	async fn context_update_for_active_tab_is_published() {
		let (mut session, sink, host, tab) = setup();
		let background = host.open_tab("https://example.com/", "");
		host.activate(tab).unwrap();

		assert!(
			session
				.handle_context_update(ContextUpdate {
					tab_id: background,
					context: PageContext::default(),
				})
				.await
				.is_none()
		);
		let published = session
			.handle_context_update(ContextUpdate {
				tab_id: tab,
				context: lead_context(),
			})
			.await
			.unwrap();
		assert_eq!(published.context.as_ref().and_then(|c| c.field("leadId")), Some("lead_7"));
		assert_eq!(sink.tab_state(), Some(published));
		assert!(host.cached_context(background).is_some());
	}

	#[tokio::test]
	async fn requests_default_to_the_lead_on_screen() {
		let (mut session, sink, _host, tab) = setup();
		session
			.handle_context_update(ContextUpdate {
				tab_id: tab,
				context: lead_context(),
			})
			.await;
		sink.take();

		session.create_task("task_1", None).await.unwrap();
		session.save_quote_note(Some("lead_9"), "Quoted at $12k").await.unwrap();
		let quoted_tab = session.start_carrier_quote("progressive", None, json!({})).await.unwrap();
		assert_eq!(quoted_tab, tab);

		let sent = sink.take();
		assert_eq!(
			sent[0],
			OutboundMessage::CreateTask {
				task_id: "task_1".into(),
				lead_id: "lead_7".into()
			}
		);
		assert!(matches!(&sent[1], OutboundMessage::SaveQuoteNote { lead_id, .. } if lead_id == "lead_9"));
		match &sent[2] {
			OutboundMessage::StartCarrierQuote { quote_data, .. } => {
				assert_eq!(quote_data["leadId"], "lead_7");
				assert_eq!(quote_data["dotNumber"], "1234567");
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[tokio::test]
	async fn requests_without_a_lead_fail() {
		let (session, _sink, _host, _tab) = setup();
		assert!(matches!(session.get_lead_for_quote(None).await, Err(Error::NoLead)));
	}
}
