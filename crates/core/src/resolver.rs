//! Element resolution from symbolic [`ElementTarget`] hints.
//!
//! Strategies run in [`STRATEGIES`] order and the first one that finds an
//! element wins; lower-priority hints are only consulted when every
//! higher-priority hint misses. Within a strategy, ties go to the element that
//! comes first in document order. Visibility and enablement are not checked.

use ego_tree::NodeId;
use rms_protocol::ElementTarget;
use tracing::debug;

use crate::dom::{Document, node_id};

/// Tags that count as form controls for label association.
const CONTROL_TAGS: &[&str] = &["input", "select", "textarea", "button"];

const LABEL_LIKE: &str = "label, legend, [class*='label'], [class*='Label']";

const BUTTON_LIKE: &str = "button, input[type='button'], input[type='submit'], input[type='reset'], a, [role='button']";

/// One way of locating an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
	Selector,
	Id,
	Name,
	Fieldref,
	Label,
	Placeholder,
	ButtonText,
}

/// Resolution order.
pub const STRATEGIES: [Strategy; 7] = [
	Strategy::Selector,
	Strategy::Id,
	Strategy::Name,
	Strategy::Fieldref,
	Strategy::Label,
	Strategy::Placeholder,
	Strategy::ButtonText,
];

impl Strategy {
	pub fn as_str(self) -> &'static str {
		match self {
			Strategy::Selector => "selector",
			Strategy::Id => "id",
			Strategy::Name => "name",
			Strategy::Fieldref => "fieldref",
			Strategy::Label => "label",
			Strategy::Placeholder => "placeholder",
			Strategy::ButtonText => "buttonText",
		}
	}

	/// The hint this strategy consumes, if the target carries a non-empty one.
	pub fn hint(self, target: &ElementTarget) -> Option<&str> {
		let hint = match self {
			Strategy::Selector => &target.selector,
			Strategy::Id => &target.id,
			Strategy::Name => &target.name,
			Strategy::Fieldref => &target.fieldref,
			Strategy::Label => &target.label,
			Strategy::Placeholder => &target.placeholder,
			Strategy::ButtonText => &target.button_text,
		};
		hint.as_deref().map(str::trim).filter(|h| !h.is_empty())
	}

	fn find(self, doc: &Document, hint: &str) -> Option<NodeId> {
		match self {
			Strategy::Selector => match doc.select_first(hint) {
				Ok(found) => found,
				Err(err) => {
					debug!(target = "rms", selector = hint, error = %err, "skipping unusable selector");
					None
				}
			},
			Strategy::Id => doc.elements().find(|el| el.value().id() == Some(hint)).map(node_id),
			Strategy::Name => by_attr(doc, "name", hint),
			Strategy::Fieldref => by_attr(doc, "fieldref", hint),
			Strategy::Label => by_label(doc, hint),
			Strategy::Placeholder => {
				let needle = hint.to_lowercase();
				doc.elements()
					.find(|el| el.value().attr("placeholder").is_some_and(|p| p.to_lowercase().contains(&needle)))
					.map(node_id)
			}
			Strategy::ButtonText => by_button_text(doc, hint),
		}
	}
}

/// A resolved element and the strategy that found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
	pub element: NodeId,
	pub strategy: Strategy,
}

/// Resolves `target` against `doc`. Not finding anything is a normal outcome.
pub fn resolve(doc: &Document, target: &ElementTarget) -> Option<Resolution> {
	for strategy in STRATEGIES {
		let Some(hint) = strategy.hint(target) else {
			continue;
		};
		if let Some(element) = strategy.find(doc, hint) {
			debug!(target = "rms", strategy = strategy.as_str(), hint, "element resolved");
			return Some(Resolution { element, strategy });
		}
	}
	debug!(target = "rms", hints = %target.describe(), "no element matched");
	None
}

fn by_attr(doc: &Document, attr: &str, value: &str) -> Option<NodeId> {
	doc.elements().find(|el| el.value().attr(attr) == Some(value)).map(node_id)
}

fn is_control(doc: &Document, id: NodeId) -> bool {
	doc.tag(id).is_some_and(|tag| CONTROL_TAGS.contains(&tag)) && doc.input_type(id).as_deref() != Some("hidden")
}

/// Finds the control associated with the first label-like element whose text
/// contains `text` (case-insensitive).
///
/// Association is tried as `for` → nested control → first control following
/// the label in document order.
fn by_label(doc: &Document, text: &str) -> Option<NodeId> {
	let needle = text.to_lowercase();
	let labels = doc.select(LABEL_LIKE).ok()?;

	for label in labels {
		if !doc.text(label).to_lowercase().contains(&needle) {
			continue;
		}
		if let Some(control) = doc.attr(label, "for").and_then(|id| by_attr(doc, "id", id)) {
			if is_control(doc, control) {
				return Some(control);
			}
		}
		if let Some(nested) = doc
			.select_within(label, "input, select, textarea, button")
			.ok()
			.and_then(|found| found.into_iter().find(|id| *id != label && is_control(doc, *id)))
		{
			return Some(nested);
		}
		if let Some(following) = following_control(doc, label) {
			return Some(following);
		}
	}
	None
}

fn following_control(doc: &Document, label: NodeId) -> Option<NodeId> {
	doc.elements()
		.map(node_id)
		.skip_while(|id| *id != label)
		.skip(1)
		.find(|id| is_control(doc, *id))
}

fn by_button_text(doc: &Document, text: &str) -> Option<NodeId> {
	let needle = text.to_lowercase();
	doc.select(BUTTON_LIKE).ok()?.into_iter().find(|id| {
		doc.text(*id).to_lowercase().contains(&needle) || doc.attr(*id, "value").is_some_and(|v| v.to_lowercase().contains(&needle))
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	const PAGE: &str = r#"<html><body>
		<form>
			<label for="dot">USDOT Number</label>
			<div><input id="dot" name="usdot"></div>

			<label>Business name <input id="biz" name="business"></label>

			<span class="field-label">Garaging ZIP</span>
			<input type="hidden" name="token">
			<input id="zip" name="zip">

			<input id="mc" fieldref="Policy.McNumber" placeholder="MC number (optional)">

			<button type="button" id="lookup">Look up carrier</button>
			<input type="submit" id="go" value="Continue">
		</form>
	</body></html>"#;

	fn doc() -> Document {
		Document::parse("https://portal.test/quote", PAGE)
	}

	fn attr_id(doc: &Document, resolution: Option<Resolution>) -> Option<(String, Strategy)> {
		resolution.map(|r| (doc.attr(r.element, "id").unwrap_or_default().to_string(), r.strategy))
	}

	#[test]
	fn selector_wins_over_everything() {
		let doc = doc();
		let target = ElementTarget {
			selector: Some("#zip".into()),
			id: Some("dot".into()),
			..Default::default()
		};
		assert_eq!(attr_id(&doc, resolve(&doc, &target)), Some(("zip".into(), Strategy::Selector)));
	}

	#[test]
	fn falls_back_to_label_when_id_misses() {
		let doc = doc();
		let target = ElementTarget {
			id: Some("does-not-exist".into()),
			label: Some("usdot".into()),
			..Default::default()
		};
		assert_eq!(attr_id(&doc, resolve(&doc, &target)), Some(("dot".into(), Strategy::Label)));
	}

	#[test]
	fn invalid_selector_falls_through() {
		let doc = doc();
		let target = ElementTarget {
			selector: Some("input[[".into()),
			name: Some("zip".into()),
			..Default::default()
		};
		assert_eq!(attr_id(&doc, resolve(&doc, &target)), Some(("zip".into(), Strategy::Name)));
	}

	#[test]
	fn label_association_kinds() {
		let doc = doc();
		let nested = resolve(&doc, &ElementTarget::label("business NAME"));
		assert_eq!(attr_id(&doc, nested), Some(("biz".into(), Strategy::Label)));

		let following = resolve(&doc, &ElementTarget::label("garaging zip"));
		assert_eq!(attr_id(&doc, following), Some(("zip".into(), Strategy::Label)));
	}

	#[test]
	fn fieldref_and_placeholder() {
		let doc = doc();
		let by_ref = ElementTarget {
			fieldref: Some("Policy.McNumber".into()),
			..Default::default()
		};
		assert_eq!(attr_id(&doc, resolve(&doc, &by_ref)), Some(("mc".into(), Strategy::Fieldref)));

		let by_placeholder = ElementTarget {
			placeholder: Some("mc NUMBER".into()),
			..Default::default()
		};
		assert_eq!(attr_id(&doc, resolve(&doc, &by_placeholder)), Some(("mc".into(), Strategy::Placeholder)));
	}

	#[test]
	fn button_text_matches_text_or_value() {
		let doc = doc();
		let by_text = ElementTarget {
			button_text: Some("look up".into()),
			..Default::default()
		};
		assert_eq!(attr_id(&doc, resolve(&doc, &by_text)), Some(("lookup".into(), Strategy::ButtonText)));

		let by_value = ElementTarget {
			button_text: Some("continue".into()),
			..Default::default()
		};
		assert_eq!(attr_id(&doc, resolve(&doc, &by_value)), Some(("go".into(), Strategy::ButtonText)));
	}

	#[test]
	fn not_found_is_none() {
		let doc = doc();
		assert_eq!(resolve(&doc, &ElementTarget::label("vin")), None);
		assert_eq!(resolve(&doc, &ElementTarget::default()), None);
	}
}
