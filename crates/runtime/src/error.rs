use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// The socket is not open; the frame was not sent.
	#[error("not connected to the assistant backend")]
	NotConnected,

	#[error("invalid backend endpoint: {0}")]
	InvalidEndpoint(String),

	#[error("gave up reconnecting after {attempts} attempts")]
	RetriesExhausted { attempts: u32 },

	#[error("websocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Connection-level failures that the reconnect loop absorbs silently.
	pub fn is_transient(&self) -> bool {
		matches!(self, Error::NotConnected | Error::WebSocket(_))
	}
}
