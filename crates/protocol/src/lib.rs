//! Wire types for the RMS assistant socket protocol.
//!
//! Every frame exchanged with the backend agent is a JSON object carrying a
//! `type` tag. The two directions are modelled as closed enums so that the
//! dispatcher can match exhaustively:
//!
//! * [`InboundMessage`] - frames sent by the backend (streaming text, tool
//!   lifecycle, action confirmation, browser automation, auxiliary cards)
//! * [`OutboundMessage`] - frames sent by the assistant (user messages, action
//!   decisions, tab state, automation results, task and quote requests)
//!
//! The browser automation vocabulary ([`BrowserAction`], [`ElementTarget`],
//! [`BrowserActionResult`]) is shared with the host IPC messages in [`host`],
//! which hand automation work from the UI surface to the privileged surface
//! that owns the tabs.

pub mod action;
pub mod attachment;
pub mod context;
pub mod framing;
pub mod host;
pub mod messages;
pub mod reconnect;
pub mod tab;

pub use action::{BrowserAction, BrowserActionRequest, BrowserActionResult, ElementTarget, YesNo};
pub use attachment::{ALLOWED_MIME_TYPES, AttachmentError, FileAttachment, MAX_ATTACHMENT_BYTES};
pub use context::{ContextFields, PageContext, Site};
pub use host::{ConnectionState, HostEvent, HostRequest, HostResponse};
pub use messages::{InboundMessage, OutboundMessage};
pub use reconnect::{Backoff, ReconnectPolicy};
pub use tab::{TabId, TabState};

/// Milliseconds since the Unix epoch, used for message and context timestamps.
pub fn now_millis() -> i64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_millis() as i64)
		.unwrap_or_default()
}
