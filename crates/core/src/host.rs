//! The browser surface the assistant automates.
//!
//! [`BrowserHost`] is what the executor and session need from a browser:
//! tabs, navigation, capture, script execution, per-tab documents and the
//! per-tab context cache. [`StaticHost`] implements it over in-memory
//! documents, for the terminal client and for tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rms_protocol::{PageContext, TabId, TabState};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::context::{MutationRecord, PageSignal};
use crate::dom::Document;
use crate::error::{Error, Result};

const BLANK_PAGE: &str = "<html><head></head><body></body></html>";

#[async_trait(?Send)]
pub trait BrowserHost {
	/// Currently focused tab, if any.
	async fn active_tab(&self) -> Option<TabId>;

	/// Snapshot of a tab, including its cached context.
	async fn tab(&self, id: TabId) -> Option<TabState>;

	async fn navigate(&self, id: TabId, url: &str) -> Result<()>;

	/// Captures the visible viewport as a `data:` URL.
	async fn capture_visible(&self, id: TabId) -> Result<String>;

	async fn execute_script(&self, id: TabId, code: &str) -> Result<Value>;

	/// Live document of a tab, shared with the context watcher.
	fn document(&self, id: TabId) -> Option<Rc<RefCell<Document>>>;

	fn cached_context(&self, id: TabId) -> Option<PageContext>;

	/// Replaces the cached context of a tab wholesale.
	fn cache_context(&self, id: TabId, context: PageContext);
}

struct HostTab {
	doc: Rc<RefCell<Document>>,
	context: Option<PageContext>,
}

#[derive(Default)]
struct Inner {
	tabs: BTreeMap<TabId, HostTab>,
	active: Option<TabId>,
	next_id: TabId,
	pages: HashMap<String, String>,
	capture: Option<Vec<u8>>,
	signals: Vec<mpsc::UnboundedSender<(TabId, PageSignal)>>,
}

/// In-memory browser: tabs are parsed documents, navigation swaps in
/// registered pages, and there is no script engine.
#[derive(Default)]
pub struct StaticHost {
	inner: RefCell<Inner>,
}

impl StaticHost {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes `markup` the content served for `url` on navigation.
	pub fn register_page(&self, url: impl Into<String>, markup: impl Into<String>) {
		self.inner.borrow_mut().pages.insert(url.into(), markup.into());
	}

	/// Opens a tab showing `markup` at `url` and focuses it.
	pub fn open_tab(&self, url: impl Into<String>, markup: &str) -> TabId {
		let url = url.into();
		let id = {
			let mut inner = self.inner.borrow_mut();
			inner.next_id += 1;
			let id = inner.next_id;
			let doc = Rc::new(RefCell::new(Document::parse(url.clone(), markup)));
			inner.tabs.insert(id, HostTab { doc, context: None });
			inner.active = Some(id);
			id
		};
		info!(target = "rms", tab = id, url = %url, "tab opened");
		self.signal(id, PageSignal::Loaded);
		id
	}

	/// Opens `url`, using the registered page for it or a blank page.
	pub fn open_url(&self, url: &str) -> TabId {
		let markup = self.inner.borrow().pages.get(url).cloned();
		self.open_tab(url, markup.as_deref().unwrap_or(BLANK_PAGE))
	}

	pub fn activate(&self, id: TabId) -> Result<()> {
		let mut inner = self.inner.borrow_mut();
		if !inner.tabs.contains_key(&id) {
			return Err(Error::TabNotFound(id));
		}
		inner.active = Some(id);
		Ok(())
	}

	pub fn close_tab(&self, id: TabId) {
		let mut inner = self.inner.borrow_mut();
		inner.tabs.remove(&id);
		if inner.active == Some(id) {
			inner.active = inner.tabs.keys().next_back().copied();
		}
	}

	pub fn tab_ids(&self) -> Vec<TabId> {
		self.inner.borrow().tabs.keys().copied().collect()
	}

	/// Allows screenshots, serving `png` as the captured image.
	pub fn allow_capture(&self, png: Vec<u8>) {
		self.inner.borrow_mut().capture = Some(png);
	}

	/// Page signals for every tab, for feeding context watchers.
	pub fn subscribe(&self) -> mpsc::UnboundedReceiver<(TabId, PageSignal)> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.inner.borrow_mut().signals.push(tx);
		rx
	}

	fn signal(&self, id: TabId, signal: PageSignal) {
		self.inner.borrow_mut().signals.retain(|tx| tx.send((id, signal.clone())).is_ok());
	}
}

#[async_trait(?Send)]
impl BrowserHost for StaticHost {
	async fn active_tab(&self) -> Option<TabId> {
		self.inner.borrow().active
	}

	async fn tab(&self, id: TabId) -> Option<TabState> {
		let inner = self.inner.borrow();
		let tab = inner.tabs.get(&id)?;
		let doc = tab.doc.borrow();
		Some(TabState::new(id, doc.url(), doc.title()).with_context(tab.context.clone()))
	}

	async fn navigate(&self, id: TabId, url: &str) -> Result<()> {
		{
			let inner = self.inner.borrow();
			let tab = inner.tabs.get(&id).ok_or(Error::TabNotFound(id))?;
			let markup = inner.pages.get(url).map(String::as_str).unwrap_or(BLANK_PAGE);
			tab.doc.borrow_mut().load(url, markup);
		}
		debug!(target = "rms", tab = id, url, "navigated");
		self.signal(id, PageSignal::Navigated { url: url.to_string() });
		// The body was swapped wholesale, as an observer on the document sees it.
		self.signal(id, PageSignal::Mutations(vec![MutationRecord::child_list("body").within(&["html"])]));
		Ok(())
	}

	async fn capture_visible(&self, id: TabId) -> Result<String> {
		let inner = self.inner.borrow();
		if !inner.tabs.contains_key(&id) {
			return Err(Error::TabNotFound(id));
		}
		match &inner.capture {
			Some(png) => Ok(format!("data:image/png;base64,{}", STANDARD.encode(png))),
			None => Err(Error::Host("Screenshot capture is not permitted for this tab".into())),
		}
	}

	async fn execute_script(&self, id: TabId, _code: &str) -> Result<Value> {
		if !self.inner.borrow().tabs.contains_key(&id) {
			return Err(Error::TabNotFound(id));
		}
		Err(Error::Unsupported("Script execution"))
	}

	fn document(&self, id: TabId) -> Option<Rc<RefCell<Document>>> {
		self.inner.borrow().tabs.get(&id).map(|tab| Rc::clone(&tab.doc))
	}

	fn cached_context(&self, id: TabId) -> Option<PageContext> {
		self.inner.borrow().tabs.get(&id).and_then(|tab| tab.context.clone())
	}

	fn cache_context(&self, id: TabId, context: PageContext) {
		if let Some(tab) = self.inner.borrow_mut().tabs.get_mut(&id) {
			tab.context = Some(context);
		}
	}
}

#[cfg(test)]
mod tests {
	use rms_protocol::Site;

	use super::*;

	#[tokio::test]
	async fn tabs_and_navigation() {
		let host = StaticHost::new();
		host.register_page("https://portal.test/next", "<title>Next</title><p>next</p>");
		let mut signals = host.subscribe();

		let first = host.open_tab("https://portal.test/", "<title>Home</title>");
		assert_eq!(host.active_tab().await, Some(first));
		assert_eq!(signals.try_recv().unwrap(), (first, PageSignal::Loaded));

		host.navigate(first, "https://portal.test/next").await.unwrap();
		let tab = host.tab(first).await.unwrap();
		assert_eq!(tab.url, "https://portal.test/next");
		assert_eq!(tab.title, "Next");
		assert!(matches!(signals.try_recv().unwrap().1, PageSignal::Navigated { .. }));
		match signals.try_recv().unwrap() {
			(tab, PageSignal::Mutations(records)) => {
				assert_eq!(tab, first);
				assert!(crate::context::any_significant(&records));
			}
			other => panic!("unexpected {other:?}"),
		}

		assert!(matches!(host.navigate(99, "https://x.test/").await, Err(Error::TabNotFound(99))));
	}

	#[tokio::test]
	async fn closing_active_tab_focuses_another() {
		let host = StaticHost::new();
		let a = host.open_tab("https://a.test/", "");
		let b = host.open_tab("https://b.test/", "");
		host.close_tab(b);
		assert_eq!(host.active_tab().await, Some(a));
		host.close_tab(a);
		assert_eq!(host.active_tab().await, None);
	}

	#[tokio::test]
	async fn capture_requires_permission() {
		let host = StaticHost::new();
		let id = host.open_tab("https://a.test/", "");
		assert!(host.capture_visible(id).await.is_err());

		host.allow_capture(vec![0x89, b'P', b'N', b'G']);
		let url = host.capture_visible(id).await.unwrap();
		assert!(url.starts_with("data:image/png;base64,"));
	}

	#[tokio::test]
	async fn context_cache_is_per_tab() {
		let host = StaticHost::new();
		let id = host.open_tab("https://app.close.com/lead/lead_1/", "");
		let context = PageContext {
			site: Site::CloseCrm,
			url: "https://app.close.com/lead/lead_1/".into(),
			..Default::default()
		};
		host.cache_context(id, context.clone());
		assert_eq!(host.cached_context(id), Some(context.clone()));
		assert_eq!(host.tab(id).await.unwrap().context, Some(context));
	}
}
