//! Error types for the assistant core.

use rms_protocol::{AttachmentError, TabId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// No tab is focused in the host.
	#[error("No active tab")]
	NoActiveTab,

	/// A lead-scoped request without an explicit lead and no lead on screen.
	#[error("No lead selected; open a lead in Close or pass its id")]
	NoLead,

	/// The tab was closed or never existed.
	#[error("Tab {0} not found")]
	TabNotFound(TabId),

	/// None of the target hints matched an element on the page.
	///
	/// Carries the target description for the failure result.
	#[error("Element not found: {0}")]
	ElementNotFound(String),

	#[error("Invalid selector `{0}`")]
	InvalidSelector(String),

	/// The resolved element cannot take the requested operation
	/// (e.g. `selectOption` on a text input).
	#[error("{0}")]
	InvalidElement(String),

	/// The host does not offer this capability (script engine, capture).
	#[error("{0} is not supported by this host")]
	Unsupported(&'static str),

	/// The host refused the operation.
	#[error("{0}")]
	Host(String),

	#[error(transparent)]
	Attachment(#[from] AttachmentError),

	#[error(transparent)]
	Transport(#[from] rms_runtime::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Failures the user should see verbatim, as opposed to ones that are only logged.
	pub fn is_user_facing(&self) -> bool {
		matches!(self, Error::Attachment(_) | Error::NoLead)
	}
}
