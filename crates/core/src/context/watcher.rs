//! Re-runs detection when the page changes.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rms_protocol::{PageContext, TabId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::mutation::{MutationRecord, any_significant};
use super::tracker::ContextTracker;
use crate::dom::Document;

/// What the host tells the watcher about its page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSignal {
	/// The document finished loading.
	Loaded,
	/// Native navigation notification (including same-document navigations).
	Navigated { url: String },
	Mutations(Vec<MutationRecord>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatcherConfig {
	/// Quiet period after the last significant mutation before re-extracting.
	pub debounce_ms: u64,
	/// URL polling interval, the fallback for hosts without navigation signals.
	pub url_poll_ms: u64,
}

impl Default for WatcherConfig {
	fn default() -> Self {
		Self {
			debounce_ms: 150,
			url_poll_ms: 1_000,
		}
	}
}

/// Emitted context for a tab.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextUpdate {
	pub tab_id: TabId,
	pub context: PageContext,
}

/// Per-tab watcher. Owns the tracker; shares the document with the host.
pub struct ContextWatcher {
	tab_id: TabId,
	doc: Rc<RefCell<Document>>,
	config: WatcherConfig,
	tracker: ContextTracker,
}

impl ContextWatcher {
	pub fn new(tab_id: TabId, doc: Rc<RefCell<Document>>, config: WatcherConfig) -> Self {
		Self {
			tab_id,
			doc,
			config,
			tracker: ContextTracker::new(),
		}
	}

	/// Runs one detection cycle, returning the context if it is news.
	pub fn detect(&mut self) -> Option<PageContext> {
		let context = super::extract(&self.doc.borrow());
		let emitted = self.tracker.observe(context);
		match &emitted {
			Some(context) => debug!(
				target = "rms",
				tab = self.tab_id,
				site = %context.site,
				changed = ?context.changed_fields,
				"page context changed"
			),
			None => trace!(target = "rms", tab = self.tab_id, "page context unchanged"),
		}
		emitted
	}

	/// Drives detection until `signals` closes or `updates` is dropped.
	///
	/// Detection runs immediately, on every load/navigation signal, when the
	/// polled URL differs from the last seen one, and once a burst of
	/// significant mutations has been quiet for the debounce window.
	pub async fn run(mut self, mut signals: mpsc::UnboundedReceiver<PageSignal>, updates: mpsc::UnboundedSender<ContextUpdate>) {
		let debounce = Duration::from_millis(self.config.debounce_ms);
		let mut poll = tokio::time::interval(Duration::from_millis(self.config.url_poll_ms.max(1)));
		poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

		let mut last_url = self.doc.borrow().url().to_string();
		let mut deadline: Option<Instant> = None;

		if !self.cycle(&updates) {
			return;
		}

		loop {
			let pending = deadline;
			let quiet = async move {
				match pending {
					Some(at) => tokio::time::sleep_until(at).await,
					None => std::future::pending::<()>().await,
				}
			};

			let alive = tokio::select! {
				signal = signals.recv() => match signal {
					None => break,
					Some(PageSignal::Loaded) | Some(PageSignal::Navigated { .. }) => {
						deadline = None;
						last_url = self.doc.borrow().url().to_string();
						self.cycle(&updates)
					}
					Some(PageSignal::Mutations(records)) => {
						if any_significant(&records) {
							deadline = Some(Instant::now() + debounce);
						}
						true
					}
				},
				_ = poll.tick() => {
					let url = self.doc.borrow().url().to_string();
					if url == last_url {
						true
					} else {
						debug!(target = "rms", tab = self.tab_id, url = %url, "url change observed by polling");
						last_url = url;
						deadline = None;
						self.cycle(&updates)
					}
				}
				_ = quiet => {
					deadline = None;
					self.cycle(&updates)
				}
			};

			if !alive {
				break;
			}
		}
		debug!(target = "rms", tab = self.tab_id, "context watcher stopped");
	}

	/// Returns false once nobody listens for updates.
	fn cycle(&mut self, updates: &mpsc::UnboundedSender<ContextUpdate>) -> bool {
		match self.detect() {
			Some(context) => updates
				.send(ContextUpdate {
					tab_id: self.tab_id,
					context,
				})
				.is_ok(),
			None => !updates.is_closed(),
		}
	}
}

#[cfg(test)]
mod tests {
	use tokio::task::LocalSet;

	use super::*;

	const LEAD_PAGE: &str = r#"<html><head><title>Lead</title></head><body>
		<h1 data-testid="lead-name">Acme Freight</h1><span class="LeadStatus">Potential</span>
	</body></html>"#;

	fn lead_url(id: &str) -> String {
		format!("https://app.close.com/lead/{id}/")
	}

	async fn settle() {
		for _ in 0..8 {
			tokio::task::yield_now().await;
		}
	}

	struct Harness {
		doc: Rc<RefCell<Document>>,
		signals: mpsc::UnboundedSender<PageSignal>,
		updates: mpsc::UnboundedReceiver<ContextUpdate>,
	}

	fn start() -> Harness {
		let doc = Rc::new(RefCell::new(Document::parse(lead_url("lead_1"), LEAD_PAGE)));
		let (signals, signal_rx) = mpsc::unbounded_channel();
		let (update_tx, updates) = mpsc::unbounded_channel();
		let watcher = ContextWatcher::new(7, Rc::clone(&doc), WatcherConfig::default());
		tokio::task::spawn_local(watcher.run(signal_rx, update_tx));
		Harness { doc, signals, updates }
	}

	fn drain(rx: &mut mpsc::UnboundedReceiver<ContextUpdate>) -> Vec<ContextUpdate> {
		let mut out = Vec::new();
		while let Ok(update) = rx.try_recv() {
			out.push(update);
		}
		out
	}

	#[tokio::test(start_paused = true)]
	async fn emits_once_on_load_and_dedups_rescans() {
		LocalSet::new()
			.run_until(async {
				let mut h = start();
				settle().await;
				let first = drain(&mut h.updates);
				assert_eq!(first.len(), 1);
				assert_eq!(first[0].tab_id, 7);
				assert_eq!(first[0].context.field("leadId"), Some("lead_1"));

				h.signals.send(PageSignal::Mutations(vec![MutationRecord::child_list("div")])).unwrap();
				settle().await;
				tokio::time::advance(Duration::from_millis(200)).await;
				settle().await;
				h.signals.send(PageSignal::Loaded).unwrap();
				settle().await;
				assert!(drain(&mut h.updates).is_empty());
			})
			.await;
	}

	#[tokio::test(start_paused = true)]
	async fn lead_change_is_seen_by_url_polling() {
		LocalSet::new()
			.run_until(async {
				let mut h = start();
				settle().await;
				drain(&mut h.updates);

				h.doc.borrow_mut().set_url(lead_url("lead_2"));
				tokio::time::advance(Duration::from_millis(1_050)).await;
				settle().await;

				let updates = drain(&mut h.updates);
				assert_eq!(updates.len(), 1);
				assert_eq!(updates[0].context.field("leadId"), Some("lead_2"));
				assert!(updates[0].context.changed_fields.contains(&"leadId".to_string()));

				tokio::time::advance(Duration::from_millis(3_000)).await;
				settle().await;
				assert!(drain(&mut h.updates).is_empty());
			})
			.await;
	}

	#[tokio::test(start_paused = true)]
	async fn mutation_bursts_are_debounced() {
		LocalSet::new()
			.run_until(async {
				let mut h = start();
				settle().await;
				drain(&mut h.updates);

				h.doc.borrow_mut().load(
					lead_url("lead_1"),
					r#"<body><h1 data-testid="lead-name">Acme Freight Holdings</h1></body>"#,
				);
				for _ in 0..3 {
					h.signals.send(PageSignal::Mutations(vec![MutationRecord::attribute("div", "class")])).unwrap();
					settle().await;
					tokio::time::advance(Duration::from_millis(100)).await;
					settle().await;
					assert!(drain(&mut h.updates).is_empty(), "must not fire inside the burst");
				}

				tokio::time::advance(Duration::from_millis(60)).await;
				settle().await;
				let updates = drain(&mut h.updates);
				assert_eq!(updates.len(), 1);
				assert_eq!(updates[0].context.changed_fields, vec!["companyName", "status"]);
			})
			.await;
	}

	#[tokio::test(start_paused = true)]
	async fn insignificant_mutations_do_not_rescan() {
		LocalSet::new()
			.run_until(async {
				let mut h = start();
				settle().await;
				drain(&mut h.updates);

				h.doc.borrow_mut().load(lead_url("lead_1"), r#"<body><h1 data-testid="lead-name">Renamed</h1></body>"#);
				h.signals.send(PageSignal::Mutations(vec![MutationRecord::character_data("h1")])).unwrap();
				tokio::time::advance(Duration::from_millis(500)).await;
				settle().await;
				assert!(drain(&mut h.updates).is_empty());
			})
			.await;
	}

	#[tokio::test(start_paused = true)]
	async fn stops_when_signals_close() {
		LocalSet::new()
			.run_until(async {
				let doc = Rc::new(RefCell::new(Document::parse(lead_url("lead_1"), LEAD_PAGE)));
				let (signals, signal_rx) = mpsc::unbounded_channel();
				let (update_tx, _updates) = mpsc::unbounded_channel();
				let handle = tokio::task::spawn_local(ContextWatcher::new(1, doc, WatcherConfig::default()).run(signal_rx, update_tx));
				drop(signals);
				handle.await.unwrap();
			})
			.await;
	}
}
