//! Worker state that does not touch browser APIs.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use rms_protocol::{ConnectionState, PageContext, ReconnectPolicy, TabId};

pub const LOG_LIMIT: usize = 40;

/// Most recent log lines, oldest first.
#[derive(Debug, Default)]
pub struct LogRing {
	lines: VecDeque<String>,
}

impl LogRing {
	pub fn push(&mut self, line: impl Into<String>) {
		self.lines.push_back(line.into());
		while self.lines.len() > LOG_LIMIT {
			self.lines.pop_front();
		}
	}

	pub fn lines(&self) -> impl Iterator<Item = &str> {
		self.lines.iter().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.lines.len()
	}
}

/// Counts reconnect attempts against the policy; reset on every successful open.
#[derive(Debug)]
pub struct Reconnector {
	policy: ReconnectPolicy,
	attempts: u32,
}

impl Reconnector {
	pub fn new(policy: ReconnectPolicy) -> Self {
		Self { policy, attempts: 0 }
	}

	/// Delay before the next attempt, or `None` once the policy gives up.
	pub fn next_delay(&mut self) -> Option<Duration> {
		let delay = self.policy.delay_for(self.attempts + 1)?;
		self.attempts += 1;
		Some(delay)
	}

	pub fn attempts(&self) -> u32 {
		self.attempts
	}

	pub fn reset(&mut self) {
		self.attempts = 0;
	}
}

/// Badge text, colour and title for a connection state.
pub fn badge(state: ConnectionState, gave_up: bool) -> (&'static str, [u8; 4], &'static str) {
	match state {
		ConnectionState::Connected => ("ON", [30, 170, 80, 255], "RMS assistant connected"),
		ConnectionState::Connecting => ("...", [160, 160, 160, 255], "RMS assistant connecting"),
		ConnectionState::Disconnected if gave_up => ("ERR", [200, 40, 40, 255], "RMS assistant offline (reload to retry)"),
		ConnectionState::Disconnected => ("OFF", [120, 120, 120, 255], "RMS assistant disconnected"),
	}
}

#[derive(Debug, Default)]
pub struct ContextCache {
	tabs: HashMap<TabId, PageContext>,
}

impl ContextCache {
	/// Stores `context`, returning false when it matches what is already cached.
	pub fn update(&mut self, tab: TabId, context: PageContext) -> bool {
		if self.tabs.get(&tab).is_some_and(|cached| cached.site == context.site && cached.fields == context.fields && cached.url == context.url) {
			return false;
		}
		self.tabs.insert(tab, context);
		true
	}

	pub fn get(&self, tab: TabId) -> Option<&PageContext> {
		self.tabs.get(&tab)
	}

	pub fn remove(&mut self, tab: TabId) {
		self.tabs.remove(&tab);
	}
}

#[cfg(test)]
mod tests {
	use rms_protocol::Site;

	use super::*;

	#[test]
	fn log_ring_keeps_latest() {
		let mut log = LogRing::default();
		for i in 0..(LOG_LIMIT + 5) {
			log.push(format!("line {i}"));
		}
		assert_eq!(log.len(), LOG_LIMIT);
		assert_eq!(log.lines().next(), Some("line 5"));
	}

	#[test]
	fn reconnector_gives_up_and_resets() {
		let mut reconnect = Reconnector::new(ReconnectPolicy::fixed(Duration::from_secs(3), 2));
		assert_eq!(reconnect.next_delay(), Some(Duration::from_secs(3)));
		assert_eq!(reconnect.next_delay(), Some(Duration::from_secs(3)));
		assert_eq!(reconnect.next_delay(), None);
		assert_eq!(reconnect.attempts(), 2);
		reconnect.reset();
		assert!(reconnect.next_delay().is_some());
	}

	#[test]
	fn cache_ignores_identical_context() {
		let mut cache = ContextCache::default();
		let mut context = PageContext {
			site: Site::CloseCrm,
			url: "https://app.close.com/lead/lead_1/".into(),
			..Default::default()
		};
		context.fields.set("leadId", "lead_1");
		assert!(cache.update(7, context.clone()));
		context.timestamp += 500;
		assert!(!cache.update(7, context.clone()));
		context.fields.set("leadId", "lead_2");
		assert!(cache.update(7, context));
		assert_eq!(cache.get(7).and_then(|c| c.field("leadId")), Some("lead_2"));
	}

	#[test]
	fn badge_reflects_give_up() {
		assert_eq!(badge(ConnectionState::Disconnected, true).0, "ERR");
		assert_eq!(badge(ConnectionState::Connected, false).0, "ON");
	}
}
