//! Browser automation primitives.
//!
//! [`ActionExecutor::execute`] never fails: every error (no active tab,
//! element not found, host refusal) becomes `{success: false, error}` so the
//! backend always gets a definitive answer.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use ego_tree::NodeId;
use rms_protocol::{BrowserAction, BrowserActionResult, ElementTarget, TabId, YesNo};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::dom::{Document, EventKind};
use crate::error::{Error, Result};
use crate::host::BrowserHost;
use crate::resolver::{Resolution, resolve};

const INTERACTIVE: &str = "a[href], button, input, select, textarea, [role='button'], [contenteditable='true']";

/// Dropdown containers used by the autocomplete widgets seen on supported portals.
const SUGGESTION_SELECTORS: &[&str] = &[
	"[role='listbox'] [role='option']",
	".autocomplete-suggestion",
	".autocomplete-item",
	".ui-menu-item",
	".pac-item",
	".tt-suggestion",
	".select2-results__option",
	"[class*='suggestion']",
	"[class*='autocomplete'] li",
	".dropdown-menu .dropdown-item",
];

/// How many ancestor levels are searched for a radio group's question text.
const RADIO_GROUP_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutomationConfig {
	/// Wait between filling a search box and looking for its suggestions.
	pub settle_delay_ms: u64,
	/// Maximum interactive elements reported by `getPageState`.
	pub page_state_limit: usize,
	/// Maximum characters of value/text reported per element.
	pub text_limit: usize,
}

impl Default for AutomationConfig {
	fn default() -> Self {
		Self {
			settle_delay_ms: 500,
			page_state_limit: 50,
			text_limit: 100,
		}
	}
}

pub struct ActionExecutor {
	host: Rc<dyn BrowserHost>,
	config: AutomationConfig,
}

impl ActionExecutor {
	pub fn new(host: Rc<dyn BrowserHost>, config: AutomationConfig) -> Self {
		Self { host, config }
	}

	pub fn config(&self) -> &AutomationConfig {
		&self.config
	}

	/// Runs `action` against the active tab and reports the outcome.
	pub async fn execute(&self, action: &BrowserAction) -> BrowserActionResult {
		match self.run(action).await {
			Ok(result) => {
				info!(target = "rms", action = action.name(), "browser action succeeded");
				result
			}
			Err(err) => {
				warn!(target = "rms", action = action.name(), error = %err, "browser action failed");
				BrowserActionResult::failure(err.to_string())
			}
		}
	}

	async fn run(&self, action: &BrowserAction) -> Result<BrowserActionResult> {
		match action {
			BrowserAction::Navigate { url } => {
				let tab = self.active_tab().await?;
				self.host.navigate(tab, url).await?;
				Ok(BrowserActionResult::ok().with("tabId", tab).with("url", url.as_str()))
			}
			BrowserAction::Screenshot => {
				let tab = self.active_tab().await?;
				let data_url = self.host.capture_visible(tab).await?;
				Ok(BrowserActionResult::ok().with("tabId", tab).with("screenshot", data_url))
			}
			BrowserAction::GetTabState => {
				let tab = self.active_tab().await?;
				self.tab_state(tab).await
			}
			BrowserAction::GetSpecificTabState { tab_id } => self.tab_state(*tab_id).await,
			BrowserAction::ExecuteScript { code } => {
				let tab = self.active_tab().await?;
				let value = self.host.execute_script(tab, code).await?;
				Ok(BrowserActionResult::ok().with("result", value))
			}
			BrowserAction::Click { target } => {
				let doc = self.document().await?;
				let mut doc = doc.borrow_mut();
				let found = find(&doc, target)?;
				doc.click(found.element);
				Ok(BrowserActionResult::ok().with("element", describe(&doc, found)))
			}
			BrowserAction::Fill { target, value } => {
				let doc = self.document().await?;
				let mut doc = doc.borrow_mut();
				let found = find(&doc, target)?;
				fill(&mut doc, found.element, value)?;
				Ok(BrowserActionResult::ok().with("element", describe(&doc, found)).with("value", value.as_str()))
			}
			BrowserAction::GetPageState => {
				let doc = self.document().await?;
				let doc = doc.borrow();
				self.page_state(&doc)
			}
			BrowserAction::SelectOption { target, value } => {
				let doc = self.document().await?;
				let mut doc = doc.borrow_mut();
				let found = find(&doc, target)?;
				select_option(&mut doc, found.element, value)
			}
			BrowserAction::SelectRadio { label, value } => {
				let doc = self.document().await?;
				let mut doc = doc.borrow_mut();
				select_radio(&mut doc, label, *value)
			}
			BrowserAction::FillSearch {
				target,
				value,
				auto_select_first,
			} => self.fill_search(target, value, *auto_select_first).await,
		}
	}

	async fn active_tab(&self) -> Result<TabId> {
		self.host.active_tab().await.ok_or(Error::NoActiveTab)
	}

	async fn document(&self) -> Result<Rc<RefCell<Document>>> {
		let tab = self.active_tab().await?;
		self.host.document(tab).ok_or(Error::TabNotFound(tab))
	}

	async fn tab_state(&self, id: TabId) -> Result<BrowserActionResult> {
		let tab = self.host.tab(id).await.ok_or(Error::TabNotFound(id))?;
		let context = match tab.context {
			Some(context) => serde_json::to_value(context)?,
			None => Value::Null,
		};
		Ok(BrowserActionResult::ok()
			.with("tabId", tab.id)
			.with("url", tab.url)
			.with("title", tab.title)
			.with("context", context))
	}

	fn page_state(&self, doc: &Document) -> Result<BrowserActionResult> {
		let limit = self.config.text_limit;
		let interactive = doc.select(INTERACTIVE)?;
		let elements: Vec<Value> = interactive
			.iter()
			.take(self.config.page_state_limit)
			.map(|&id| {
				json!({
					"tag": doc.tag(id).unwrap_or_default(),
					"type": doc.attr(id, "type"),
					"name": doc.attr(id, "name"),
					"id": doc.attr(id, "id"),
					"placeholder": doc.attr(id, "placeholder"),
					"value": truncate(&doc.value(id), limit),
					"text": truncate(&doc.text(id), limit),
				})
			})
			.collect();
		Ok(BrowserActionResult::ok()
			.with("url", doc.url())
			.with("title", doc.title())
			.with("totalElements", interactive.len())
			.with("elements", elements))
	}

	/// Fills the search box, waits for the widget to render, then clicks the
	/// first suggestion matching a known dropdown pattern.
	///
	/// Finding no suggestion is still a success; the field has been filled.
	async fn fill_search(&self, target: &ElementTarget, value: &str, auto_select_first: bool) -> Result<BrowserActionResult> {
		let doc = self.document().await?;
		let described = {
			let mut doc = doc.borrow_mut();
			let found = find(&doc, target)?;
			fill_value(&mut doc, found.element, value)?;
			describe(&doc, found)
		};
		let result = BrowserActionResult::ok().with("element", described).with("value", value);
		if !auto_select_first {
			return Ok(result);
		}

		tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

		let mut doc = doc.borrow_mut();
		let suggestion = SUGGESTION_SELECTORS
			.iter()
			.find_map(|css| doc.select_first(css).ok().flatten().map(|id| (*css, id)));
		match suggestion {
			Some((pattern, id)) => {
				let text = doc.text(id);
				debug!(target = "rms", pattern, suggestion = %text, "selecting first suggestion");
				doc.click(id);
				Ok(result.with("suggestionSelected", true).with("suggestion", text))
			}
			None => {
				debug!(target = "rms", "no autocomplete suggestions found");
				Ok(result.with("suggestionSelected", false))
			}
		}
	}
}

fn find(doc: &Document, target: &ElementTarget) -> Result<Resolution> {
	resolve(doc, target).ok_or_else(|| Error::ElementNotFound(target.describe()))
}

fn describe(doc: &Document, found: Resolution) -> Value {
	let id = found.element;
	json!({
		"tag": doc.tag(id).unwrap_or_default(),
		"id": doc.attr(id, "id"),
		"name": doc.attr(id, "name"),
		"type": doc.attr(id, "type"),
		"strategy": found.strategy.as_str(),
	})
}

fn truncate(text: &str, limit: usize) -> String {
	text.chars().take(limit).collect()
}

fn ensure_fillable(doc: &Document, id: NodeId) -> Result<()> {
	let fillable = match doc.tag(id) {
		Some("textarea") => true,
		Some("input") => !matches!(
			doc.input_type(id).as_deref(),
			Some("checkbox" | "radio" | "button" | "submit" | "reset" | "image" | "file")
		),
		_ => false,
	};
	if fillable {
		Ok(())
	} else {
		Err(Error::InvalidElement(format!("<{}> element cannot be filled", doc.tag(id).unwrap_or("unknown"))))
	}
}

/// Focus, assign through the native setter, then `input`.
fn fill_value(doc: &mut Document, id: NodeId, value: &str) -> Result<()> {
	ensure_fillable(doc, id)?;
	doc.focus(id);
	doc.set_value(id, value);
	doc.dispatch(id, EventKind::Input);
	Ok(())
}

/// Fills like a user would so reactive frameworks pick the value up:
/// native setter, then `input`, `change` and `blur`.
fn fill(doc: &mut Document, id: NodeId, value: &str) -> Result<()> {
	fill_value(doc, id, value)?;
	doc.dispatch(id, EventKind::Change);
	doc.blur(id);
	Ok(())
}

fn select_option(doc: &mut Document, select: NodeId, value: &str) -> Result<BrowserActionResult> {
	if doc.tag(select) != Some("select") {
		return Err(Error::InvalidElement(format!("<{}> is not a select element", doc.tag(select).unwrap_or("unknown"))));
	}
	let options = doc.options(select);
	let needle = value.to_lowercase();
	let chosen = options
		.iter()
		.copied()
		.find(|&option| doc.option_value(option) == value)
		.or_else(|| options.iter().copied().find(|&option| doc.text(option).to_lowercase().contains(&needle)))
		.ok_or_else(|| Error::ElementNotFound(format!("option matching {value:?}")))?;

	doc.set_selected_option(select, chosen);
	doc.dispatch(select, EventKind::Change);
	Ok(BrowserActionResult::ok()
		.with("selected", doc.option_value(chosen))
		.with("text", doc.text(chosen)))
}

/// Text identifying a single radio: its label, else its value, else its parent's text.
fn radio_text(doc: &Document, radio: NodeId) -> String {
	let by_for = doc.attr(radio, "id").and_then(|id| {
		let labels = doc.select("label[for]").ok()?;
		labels.into_iter().find(|label| doc.attr(*label, "for") == Some(id)).map(|label| doc.text(label))
	});
	let wrapping = || {
		let mut current = doc.parent_element(radio);
		while let Some(id) = current {
			if doc.tag(id) == Some("label") {
				return Some(doc.text(id));
			}
			current = doc.parent_element(id);
		}
		None
	};
	by_for
		.or_else(wrapping)
		.filter(|t| !t.is_empty())
		.or_else(|| doc.attr(radio, "value").map(str::to_string))
		.or_else(|| doc.parent_element(radio).map(|parent| doc.text(parent)))
		.unwrap_or_default()
}

fn says(text: &str, answer: YesNo) -> bool {
	let words = text.to_lowercase();
	let mut tokens = words.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty());
	match answer {
		YesNo::Yes => tokens.any(|t| t == "yes" || t == "y" || t == "true"),
		YesNo::No => tokens.any(|t| t == "no" || t == "n" || t == "false"),
	}
}

/// How far above `radio` the question text mentioning `needle` sits: 0 for
/// the radio's own label, then one per ancestor level.
fn distance_to_question(doc: &Document, radio: NodeId, needle: &str) -> Option<usize> {
	if radio_text(doc, radio).to_lowercase().contains(needle) {
		return Some(0);
	}
	let mut current = doc.parent_element(radio);
	for depth in 1..=RADIO_GROUP_DEPTH {
		let id = current?;
		if doc.text(id).to_lowercase().contains(needle) {
			return Some(depth);
		}
		current = doc.parent_element(id);
	}
	None
}

fn select_radio(doc: &mut Document, label: &str, answer: YesNo) -> Result<BrowserActionResult> {
	let needle = label.trim().to_lowercase();
	let radios: Vec<NodeId> = doc
		.select("input")?
		.into_iter()
		.filter(|id| doc.input_type(*id).as_deref() == Some("radio"))
		.collect();

	// Closest question wins; an outer container mentions every question.
	let anchor = radios
		.iter()
		.copied()
		.filter_map(|radio| distance_to_question(doc, radio, &needle).map(|depth| (depth, radio)))
		.min_by_key(|(depth, _)| *depth)
		.map(|(_, radio)| radio)
		.ok_or_else(|| Error::ElementNotFound(format!("radio group matching {label:?}")))?;

	let group: Vec<NodeId> = match doc.attr(anchor, "name").map(str::to_string) {
		Some(name) => radios.iter().copied().filter(|&r| doc.attr(r, "name") == Some(name.as_str())).collect(),
		None => {
			let parent = doc.parent_element(anchor);
			radios.iter().copied().filter(|&r| doc.parent_element(r) == parent).collect()
		}
	};

	let member = group
		.iter()
		.copied()
		.find(|&radio| says(&radio_text(doc, radio), answer))
		.ok_or_else(|| Error::ElementNotFound(format!("{:?} option in radio group {label:?}", answer.as_str())))?;

	doc.click(member);
	Ok(BrowserActionResult::ok()
		.with("selected", radio_text(doc, member))
		.with("name", doc.attr(member, "name")))
}
