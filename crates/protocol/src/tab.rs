use serde::{Deserialize, Serialize};

use crate::context::PageContext;

/// Browser tab identifier as assigned by the host.
pub type TabId = i64;

/// Snapshot of a tab sent alongside user messages and as `tab_state` frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabState {
	pub id: TabId,
	pub url: String,
	#[serde(default)]
	pub title: String,
	/// Latest context extracted from the page, if the watcher recognised it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub context: Option<PageContext>,
}

impl TabState {
	pub fn new(id: TabId, url: impl Into<String>, title: impl Into<String>) -> Self {
		Self {
			id,
			url: url.into(),
			title: title.into(),
			context: None,
		}
	}

	pub fn with_context(mut self, context: Option<PageContext>) -> Self {
		self.context = context;
		self
	}
}
