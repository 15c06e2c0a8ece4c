//! Websocket loop for the backend connection.

use futures_util::{SinkExt, StreamExt};
use rms_protocol::{ConnectionState, InboundMessage, OutboundMessage, ReconnectPolicy};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::codec;
use crate::connection::{ConnectionHandle, OutboundSink};
use crate::error::{Error, Result};

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8765/ws";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
	pub endpoint: String,
	pub reconnect: ReconnectPolicy,
}

impl Default for TransportConfig {
	fn default() -> Self {
		Self {
			endpoint: DEFAULT_ENDPOINT.to_string(),
			reconnect: ReconnectPolicy::default(),
		}
	}
}

impl TransportConfig {
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self {
			endpoint: endpoint.into(),
			..Self::default()
		}
	}

	pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
		self.reconnect = reconnect;
		self
	}
}

/// What the transport loop reports to the session layer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
	/// Emitted on every state transition, never twice in a row for the same state.
	State(ConnectionState),
	Frame(InboundMessage),
	/// The reconnect policy is exhausted; the loop has stopped.
	GaveUp { attempts: u32 },
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns the socket. Drive it with [`Transport::run`] and talk to it through the
/// [`ConnectionHandle`] returned by [`Transport::new`].
pub struct Transport {
	config: TransportConfig,
	handle: ConnectionHandle,
	events: mpsc::UnboundedSender<TransportEvent>,
}

impl Transport {
	pub fn new(config: TransportConfig) -> (Self, ConnectionHandle, mpsc::UnboundedReceiver<TransportEvent>) {
		let handle = ConnectionHandle::new();
		let (events, rx) = mpsc::unbounded_channel();
		let transport = Self {
			config,
			handle: handle.clone(),
			events,
		};
		(transport, handle, rx)
	}

	/// Connects, serves, and reconnects until shutdown or until the reconnect
	/// policy gives up.
	///
	/// The attempt counter resets after each successful connect, so a
	/// connection that later drops gets the full retry budget again.
	pub async fn run(self) -> Result<()> {
		let endpoint = self.config.endpoint.as_str();
		if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
			return Err(Error::InvalidEndpoint(endpoint.to_string()));
		}

		let mut shutdown = self.handle.shutdown_signal();
		let mut failures: u32 = 0;

		loop {
			if self.handle.is_shutting_down() {
				break;
			}

			self.set_state(ConnectionState::Connecting);
			match connect_async(endpoint).await {
				Ok((socket, _)) => {
					info!(target = "rms", endpoint, "connected to assistant backend");
					failures = 0;
					self.serve(socket, &mut shutdown).await;
				}
				Err(err) => {
					warn!(target = "rms", endpoint, error = %err, "backend connection failed");
				}
			}
			self.set_state(ConnectionState::Disconnected);

			if self.handle.is_shutting_down() {
				break;
			}

			failures += 1;
			let Some(delay) = self.config.reconnect.delay_for(failures) else {
				let attempts = failures - 1;
				warn!(target = "rms", attempts, "giving up on backend connection");
				self.emit(TransportEvent::GaveUp { attempts });
				return Err(Error::RetriesExhausted { attempts });
			};

			debug!(target = "rms", attempt = failures, delay_ms = delay.as_millis() as u64, "reconnecting");
			tokio::select! {
				_ = tokio::time::sleep(delay) => {}
				_ = shutdown.changed() => {}
			}
		}

		info!(target = "rms", "transport stopped");
		Ok(())
	}

	async fn serve(&self, socket: Socket, shutdown: &mut watch::Receiver<bool>) {
		let (mut write, mut read) = socket.split();
		let (tx, mut outbound) = mpsc::unbounded_channel::<String>();
		self.handle.attach_writer(tx);
		self.set_state(ConnectionState::Connected);

		if let Some(tab) = self.handle.tab_state() {
			let _ = self.handle.send(OutboundMessage::TabState { tab });
		}

		loop {
			tokio::select! {
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						let _ = write.send(Message::Close(None)).await;
						break;
					}
				}
				Some(text) = outbound.recv() => {
					if let Err(err) = write.send(Message::Text(text)).await {
						warn!(target = "rms", error = %err, "failed to write frame");
						break;
					}
				}
				incoming = read.next() => match incoming {
					Some(Ok(Message::Text(text))) => {
						for frame in codec::decode_lossy(&text) {
							debug!(target = "rms", kind = frame.kind(), "frame received");
							self.emit(TransportEvent::Frame(frame));
						}
					}
					Some(Ok(Message::Ping(data))) => {
						if let Err(err) = write.send(Message::Pong(data)).await {
							warn!(target = "rms", error = %err, "failed to answer ping");
							break;
						}
					}
					Some(Ok(Message::Close(_))) | None => {
						info!(target = "rms", "backend closed the connection");
						break;
					}
					Some(Ok(_)) => {}
					Some(Err(err)) => {
						warn!(target = "rms", error = %err, "backend read failed");
						break;
					}
				},
			}
		}

		self.handle.detach_writer();
	}

	fn set_state(&self, state: ConnectionState) {
		if self.handle.set_state(state) {
			self.emit(TransportEvent::State(state));
		}
	}

	fn emit(&self, event: TransportEvent) {
		let _ = self.events.send(event);
	}
}
