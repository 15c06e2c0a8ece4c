//! Assistant configuration file.
//!
//! `~/.config/rms-assistant/config.json`, camelCase, every field optional.
//! A missing or unreadable file yields the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rms::{AutomationConfig, SessionConfig, WatcherConfig};
use rms_protocol::ReconnectPolicy;
use rms_runtime::{DEFAULT_ENDPOINT, TransportConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

const APP_DIR: &str = "rms-assistant";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssistantConfig {
	pub endpoint: String,
	pub reconnect: ReconnectPolicy,
	pub watcher: WatcherConfig,
	pub automation: AutomationConfig,
	/// Where the conversation is saved; defaults to the user data directory.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub conversation_path: Option<PathBuf>,
}

impl Default for AssistantConfig {
	fn default() -> Self {
		Self {
			endpoint: DEFAULT_ENDPOINT.to_string(),
			reconnect: ReconnectPolicy::default(),
			watcher: WatcherConfig::default(),
			automation: AutomationConfig::default(),
			conversation_path: None,
		}
	}
}

impl AssistantConfig {
	pub fn default_path() -> PathBuf {
		dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR).join("config.json")
	}

	pub fn default_conversation_path() -> PathBuf {
		dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR).join("conversation.json")
	}

	/// Reads `path`, falling back to defaults (with a warning when the file exists but is invalid).
	pub fn load(path: &Path) -> Self {
		let content = match fs::read_to_string(path) {
			Ok(content) => content,
			Err(_) => return Self::default(),
		};
		match serde_json::from_str(&content) {
			Ok(config) => config,
			Err(err) => {
				warn!(target = "rms", path = %path.display(), error = %err, "invalid config file; using defaults");
				Self::default()
			}
		}
	}

	pub fn save(&self, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
		}
		fs::write(path, serde_json::to_string_pretty(self)?).with_context(|| format!("writing {}", path.display()))?;
		Ok(())
	}

	/// Checks what the file format cannot express.
	pub fn validate(&self) -> Result<()> {
		let endpoint = url::Url::parse(&self.endpoint).with_context(|| format!("invalid endpoint `{}`", self.endpoint))?;
		if !matches!(endpoint.scheme(), "ws" | "wss") {
			bail!("endpoint `{}` must use ws:// or wss://", self.endpoint);
		}
		Ok(())
	}

	pub fn conversation_path(&self) -> PathBuf {
		self.conversation_path.clone().unwrap_or_else(Self::default_conversation_path)
	}

	pub fn transport(&self) -> TransportConfig {
		TransportConfig::new(self.endpoint.clone()).with_reconnect(self.reconnect)
	}

	pub fn session(&self) -> SessionConfig {
		SessionConfig {
			automation: self.automation,
			watcher: self.watcher,
		}
	}
}
