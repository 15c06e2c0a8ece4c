//! In-memory page document used by the resolver, executor and context watcher.
//!
//! Markup is parsed once with [`scraper`]; form state that a browser keeps
//! outside the markup (current value, checkedness, selected option, focus)
//! lives in a side table keyed by node id. Reading `value` prefers the side
//! table and falls back to the markup attribute, the way the DOM `value`
//! property shadows the `value` attribute.

mod events;

use std::collections::HashMap;
use std::rc::Rc;

use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Html, Node, Selector};

pub use self::events::{DomEvent, EventKind, ListenerEntry, ListenerFn, ListenerId, ListenerMap, Subscription, next_listener_id};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
struct ElementState {
	value: Option<String>,
	checked: Option<bool>,
	selected: Option<bool>,
}

/// A parsed page plus its live form state.
pub struct Document {
	url: String,
	html: Html,
	state: HashMap<NodeId, ElementState>,
	listeners: ListenerMap,
	focused: Option<NodeId>,
	scrolled: Option<NodeId>,
}

pub(crate) fn node_id(element: ElementRef<'_>) -> NodeId {
	let node: &NodeRef<'_, Node> = &element;
	node.id()
}

/// Collapses runs of whitespace to single spaces.
pub fn normalize_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
	let mut out = String::new();
	for word in parts.flat_map(str::split_whitespace) {
		if !out.is_empty() {
			out.push(' ');
		}
		out.push_str(word);
	}
	out
}

impl Document {
	pub fn parse(url: impl Into<String>, markup: &str) -> Self {
		Self {
			url: url.into(),
			html: Html::parse_document(markup),
			state: HashMap::new(),
			listeners: Rc::default(),
			focused: None,
			scrolled: None,
		}
	}

	/// Replaces the page content, as a navigation would.
	///
	/// Form state and element-scoped listeners are discarded; document-wide
	/// listeners survive.
	pub fn load(&mut self, url: impl Into<String>, markup: &str) {
		self.url = url.into();
		self.html = Html::parse_document(markup);
		self.state.clear();
		self.focused = None;
		self.scrolled = None;
		self.listeners.borrow_mut().retain(|entry| entry.target.is_none());
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	/// Changes the URL without reloading, like `history.pushState`.
	pub fn set_url(&mut self, url: impl Into<String>) {
		self.url = url.into();
	}

	pub fn title(&self) -> String {
		self.elements()
			.find(|el| el.value().name() == "title")
			.map(|el| normalize_text(el.text()))
			.unwrap_or_default()
	}

	pub fn html(&self) -> &Html {
		&self.html
	}

	/// Every element in document order.
	pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
		self.html.root_element().descendants().filter_map(ElementRef::wrap)
	}

	pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
		self.html.tree.get(id).and_then(ElementRef::wrap)
	}

	/// All elements matching `css`, in document order.
	pub fn select(&self, css: &str) -> Result<Vec<NodeId>> {
		let selector = Selector::parse(css).map_err(|_| Error::InvalidSelector(css.to_string()))?;
		Ok(self.html.select(&selector).map(node_id).collect())
	}

	pub fn select_first(&self, css: &str) -> Result<Option<NodeId>> {
		let selector = Selector::parse(css).map_err(|_| Error::InvalidSelector(css.to_string()))?;
		Ok(self.html.select(&selector).next().map(node_id))
	}

	/// Matches of `css` within the subtree of `scope`.
	pub fn select_within(&self, scope: NodeId, css: &str) -> Result<Vec<NodeId>> {
		let selector = Selector::parse(css).map_err(|_| Error::InvalidSelector(css.to_string()))?;
		Ok(self.element(scope).map(|el| el.select(&selector).map(node_id).collect()).unwrap_or_default())
	}

	pub fn tag(&self, id: NodeId) -> Option<&str> {
		self.element(id).map(|el| el.value().name())
	}

	pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
		self.element(id).and_then(|el| el.value().attr(name))
	}

	/// Lowercased `type` attribute, defaulting to `text` for inputs.
	pub fn input_type(&self, id: NodeId) -> Option<String> {
		match self.tag(id)? {
			"input" => Some(self.attr(id, "type").unwrap_or("text").to_ascii_lowercase()),
			_ => None,
		}
	}

	/// Whitespace-normalized text content.
	pub fn text(&self, id: NodeId) -> String {
		self.element(id).map(|el| normalize_text(el.text())).unwrap_or_default()
	}

	pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
		self.html.tree.get(id)?.ancestors().find_map(ElementRef::wrap).map(node_id)
	}

	/// True if `id` has an ancestor whose tag is one of `tags`.
	pub fn is_inside(&self, id: NodeId, tags: &[&str]) -> bool {
		self.html
			.tree
			.get(id)
			.map(|node| node.ancestors().filter_map(ElementRef::wrap).any(|el| tags.contains(&el.value().name())))
			.unwrap_or(false)
	}

	/// True if `ancestor` contains `id` (or is `id`).
	pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
		ancestor == id || self.html.tree.get(id).is_some_and(|node| node.ancestors().any(|a| a.id() == ancestor))
	}

	/// Current form value, as the DOM `value` property would report it.
	pub fn value(&self, id: NodeId) -> String {
		if let Some(value) = self.state.get(&id).and_then(|s| s.value.clone()) {
			return value;
		}
		let Some(el) = self.element(id) else {
			return String::new();
		};
		match el.value().name() {
			"textarea" => el.text().collect(),
			"select" => self.selected_option(id).map(|option| self.option_value(option)).unwrap_or_default(),
			_ => el.value().attr("value").unwrap_or_default().to_string(),
		}
	}

	pub fn checked(&self, id: NodeId) -> bool {
		self.state
			.get(&id)
			.and_then(|s| s.checked)
			.unwrap_or_else(|| self.attr(id, "checked").is_some())
	}

	/// `<option>` children of a select, in document order.
	pub fn options(&self, select: NodeId) -> Vec<NodeId> {
		self.element(select)
			.map(|el| {
				el.descendants()
					.filter_map(ElementRef::wrap)
					.filter(|child| child.value().name() == "option")
					.map(node_id)
					.collect()
			})
			.unwrap_or_default()
	}

	/// The option's `value` attribute, or its text when absent.
	pub fn option_value(&self, option: NodeId) -> String {
		match self.attr(option, "value") {
			Some(value) => value.to_string(),
			None => self.text(option),
		}
	}

	pub fn selected_option(&self, select: NodeId) -> Option<NodeId> {
		let options = self.options(select);
		options.iter().copied().find(|option| self.is_selected(*option)).or_else(|| options.first().copied())
	}

	fn is_selected(&self, option: NodeId) -> bool {
		self.state
			.get(&option)
			.and_then(|s| s.selected)
			.unwrap_or_else(|| self.attr(option, "selected").is_some())
	}

	/// Assigns through the native value setter. No events fire.
	pub fn set_value(&mut self, id: NodeId, value: &str) {
		self.state.entry(id).or_default().value = Some(value.to_string());
	}

	/// Sets checkedness. Checking a radio unchecks the other radios sharing its name.
	pub fn set_checked(&mut self, id: NodeId, checked: bool) {
		if checked && self.input_type(id).as_deref() == Some("radio") {
			if let Some(group) = self.attr(id, "name").map(str::to_string) {
				let peers: Vec<NodeId> = self
					.elements()
					.filter(|el| el.value().name() == "input" && el.value().attr("name") == Some(group.as_str()))
					.map(node_id)
					.filter(|peer| *peer != id && self.input_type(*peer).as_deref() == Some("radio"))
					.collect();
				for peer in peers {
					self.state.entry(peer).or_default().checked = Some(false);
				}
			}
		}
		self.state.entry(id).or_default().checked = Some(checked);
	}

	/// Marks `option` as the selected option of `select`.
	pub fn set_selected_option(&mut self, select: NodeId, option: NodeId) {
		for candidate in self.options(select) {
			self.state.entry(candidate).or_default().selected = Some(candidate == option);
		}
		self.state.entry(select).or_default().value = None;
	}

	pub fn focused(&self) -> Option<NodeId> {
		self.focused
	}

	pub fn scrolled_into_view(&self) -> Option<NodeId> {
		self.scrolled
	}

	pub fn scroll_into_view(&mut self, id: NodeId) {
		self.scrolled = Some(id);
	}

	/// Moves focus to `id`, blurring the previously focused element.
	pub fn focus(&mut self, id: NodeId) {
		if self.focused == Some(id) {
			return;
		}
		if let Some(previous) = self.focused.take() {
			self.dispatch(previous, EventKind::Blur);
		}
		self.focused = Some(id);
		self.dispatch(id, EventKind::Focus);
	}

	pub fn blur(&mut self, id: NodeId) {
		if self.focused == Some(id) {
			self.focused = None;
		}
		self.dispatch(id, EventKind::Blur);
	}

	/// Clicks `id` the way a user would: scroll, focus, then the click itself.
	///
	/// Checkboxes toggle and radios become checked before the click event, and
	/// both fire `input` and `change` afterwards when their state changed.
	pub fn click(&mut self, id: NodeId) {
		self.scroll_into_view(id);
		self.focus(id);

		let toggled = match self.input_type(id).as_deref() {
			Some("checkbox") => {
				let next = !self.checked(id);
				self.set_checked(id, next);
				true
			}
			Some("radio") if !self.checked(id) => {
				self.set_checked(id, true);
				true
			}
			_ => false,
		};

		self.dispatch(id, EventKind::Click);
		if toggled {
			self.dispatch(id, EventKind::Input);
			self.dispatch(id, EventKind::Change);
		}
	}

	/// Registers a listener on `target`, or on the whole document when `None`.
	///
	/// Events bubble: a listener on an ancestor sees events of its descendants.
	pub fn add_listener<F>(&self, target: Option<NodeId>, kind: EventKind, listener: F) -> Subscription
	where
		F: Fn(&DomEvent) + 'static,
	{
		let id = next_listener_id();
		self.listeners.borrow_mut().push(ListenerEntry {
			id,
			target,
			kind,
			listener: Rc::new(listener),
		});
		Subscription::new(id, &self.listeners)
	}

	/// Fires `kind` at `target`.
	pub fn dispatch(&self, target: NodeId, kind: EventKind) {
		let event = DomEvent {
			kind,
			target,
			value: self.value(target),
			checked: self.checked(target),
		};
		let matching: Vec<ListenerFn> = self
			.listeners
			.borrow()
			.iter()
			.filter(|entry| entry.kind == kind)
			.filter(|entry| entry.target.is_none_or(|scope| self.contains(scope, target)))
			.map(|entry| Rc::clone(&entry.listener))
			.collect();
		for listener in matching {
			listener(&event);
		}
	}
}

impl std::fmt::Debug for Document {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Document")
			.field("url", &self.url)
			.field("state", &self.state.len())
			.field("listeners", &self.listeners.borrow().len())
			.finish()
	}
}
