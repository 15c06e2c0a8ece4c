//! Sending side of the backend connection.
//!
//! [`ConnectionHandle`] is shared between the [`Transport`](crate::Transport)
//! loop, which installs a writer while the socket is open, and the session
//! layer, which sends frames and records the latest tab state. The tab state is
//! replayed by the transport on every (re)connect.

use std::sync::Arc;

use parking_lot::Mutex;
use rms_protocol::{ConnectionState, OutboundMessage, TabState};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::codec;
use crate::error::{Error, Result};

/// Where the session layer sends outbound frames.
///
/// Sends are best-effort: while disconnected they fail with
/// [`Error::NotConnected`] and the frame is dropped.
pub trait OutboundSink {
	fn send(&self, message: OutboundMessage) -> Result<()>;

	fn connection_state(&self) -> ConnectionState;

	/// Records the latest tab state and sends it if connected.
	///
	/// The recorded state is replayed after every reconnect.
	fn publish_tab_state(&self, tab: TabState) -> Result<()>;
}

struct Shared {
	state: Mutex<ConnectionState>,
	writer: Mutex<Option<mpsc::UnboundedSender<String>>>,
	tab_state: Mutex<Option<TabState>>,
	shutdown: watch::Sender<bool>,
}

/// Cloneable handle to the backend connection.
#[derive(Clone)]
pub struct ConnectionHandle {
	shared: Arc<Shared>,
}

impl ConnectionHandle {
	pub(crate) fn new() -> Self {
		let (shutdown, _) = watch::channel(false);
		Self {
			shared: Arc::new(Shared {
				state: Mutex::new(ConnectionState::Disconnected),
				writer: Mutex::new(None),
				tab_state: Mutex::new(None),
				shutdown,
			}),
		}
	}

	pub fn state(&self) -> ConnectionState {
		*self.shared.state.lock()
	}

	pub fn is_connected(&self) -> bool {
		self.state().is_connected()
	}

	/// Latest tab state recorded with [`OutboundSink::publish_tab_state`].
	pub fn tab_state(&self) -> Option<TabState> {
		self.shared.tab_state.lock().clone()
	}

	/// Asks the transport loop to close the socket and stop reconnecting.
	pub fn shutdown(&self) {
		let _ = self.shared.shutdown.send(true);
	}

	pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
		self.shared.shutdown.subscribe()
	}

	pub(crate) fn is_shutting_down(&self) -> bool {
		*self.shared.shutdown.borrow()
	}

	/// Returns true when the state actually changed.
	pub(crate) fn set_state(&self, state: ConnectionState) -> bool {
		let mut current = self.shared.state.lock();
		if *current == state {
			return false;
		}
		*current = state;
		true
	}

	pub(crate) fn attach_writer(&self, writer: mpsc::UnboundedSender<String>) {
		*self.shared.writer.lock() = Some(writer);
	}

	pub(crate) fn detach_writer(&self) {
		self.shared.writer.lock().take();
	}

	fn send_text(&self, text: String) -> Result<()> {
		if !self.is_connected() {
			return Err(Error::NotConnected);
		}
		let writer = self.shared.writer.lock();
		match writer.as_ref() {
			Some(tx) => tx.send(text).map_err(|_| Error::NotConnected),
			None => Err(Error::NotConnected),
		}
	}
}

impl OutboundSink for ConnectionHandle {
	fn send(&self, message: OutboundMessage) -> Result<()> {
		let kind = message.kind();
		let text = codec::encode(&message)?;
		let result = self.send_text(text);
		if result.is_err() {
			debug!(target = "rms", kind, "dropping outbound frame while disconnected");
		}
		result
	}

	fn connection_state(&self) -> ConnectionState {
		self.state()
	}

	fn publish_tab_state(&self, tab: TabState) -> Result<()> {
		*self.shared.tab_state.lock() = Some(tab.clone());
		self.send(OutboundMessage::TabState { tab })
	}
}

/// In-memory [`OutboundSink`] that records every frame it accepts.
///
/// Starts connected; flip it with [`MemorySink::set_connected`] to exercise
/// the disconnected paths.
#[derive(Clone, Default)]
pub struct MemorySink {
	sent: Arc<Mutex<Vec<OutboundMessage>>>,
	tab_state: Arc<Mutex<Option<TabState>>>,
	disconnected: Arc<Mutex<bool>>,
}

impl MemorySink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_connected(&self, connected: bool) {
		*self.disconnected.lock() = !connected;
	}

	/// Frames accepted so far, oldest first.
	pub fn sent(&self) -> Vec<OutboundMessage> {
		self.sent.lock().clone()
	}

	/// Removes and returns the accepted frames.
	pub fn take(&self) -> Vec<OutboundMessage> {
		std::mem::take(&mut *self.sent.lock())
	}

	pub fn tab_state(&self) -> Option<TabState> {
		self.tab_state.lock().clone()
	}
}

impl OutboundSink for MemorySink {
	fn send(&self, message: OutboundMessage) -> Result<()> {
		if *self.disconnected.lock() {
			return Err(Error::NotConnected);
		}
		self.sent.lock().push(message);
		Ok(())
	}

	fn connection_state(&self) -> ConnectionState {
		if *self.disconnected.lock() { ConnectionState::Disconnected } else { ConnectionState::Connected }
	}

	fn publish_tab_state(&self, tab: TabState) -> Result<()> {
		*self.tab_state.lock() = Some(tab.clone());
		self.send(OutboundMessage::TabState { tab })
	}
}
