//! Browser automation vocabulary.
//!
//! A `browser_action` frame carries its parameters inline next to the action
//! name, so [`BrowserAction`] is an internally tagged enum flattened into
//! [`BrowserActionRequest`]. Action names are accepted both in the backend's
//! snake_case spelling (`get_page_state`) and the extension's camelCase one
//! (`getPageState`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::tab::TabId;

/// Symbolic description of a page element.
///
/// The hints are tried in a fixed priority order: selector, id, name,
/// fieldref, label, placeholder, button text. The first hint that resolves to
/// an element wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementTarget {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub selector: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Framework-specific field reference attribute (`fieldref`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fieldref: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub placeholder: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none", alias = "text")]
	pub button_text: Option<String>,
}

impl ElementTarget {
	pub fn selector(selector: impl Into<String>) -> Self {
		Self {
			selector: Some(selector.into()),
			..Default::default()
		}
	}

	pub fn label(label: impl Into<String>) -> Self {
		Self {
			label: Some(label.into()),
			..Default::default()
		}
	}

	/// Returns true when no hint is set.
	pub fn is_empty(&self) -> bool {
		self.hints().next().is_none()
	}

	/// Iterates the populated hints in priority order as `(kind, value)`.
	pub fn hints(&self) -> impl Iterator<Item = (&'static str, &str)> {
		[
			("selector", &self.selector),
			("id", &self.id),
			("name", &self.name),
			("fieldref", &self.fieldref),
			("label", &self.label),
			("placeholder", &self.placeholder),
			("buttonText", &self.button_text),
		]
		.into_iter()
		.filter_map(|(kind, value)| value.as_deref().filter(|v| !v.is_empty()).map(|v| (kind, v)))
	}

	/// Short human-readable description used in error messages.
	pub fn describe(&self) -> String {
		let parts: Vec<String> = self.hints().map(|(kind, value)| format!("{kind}={value:?}")).collect();
		if parts.is_empty() { "<empty target>".to_string() } else { parts.join(", ") }
	}
}

/// Boolean-like answer for yes/no radio groups.
///
/// Deserializes from `true`/`false` as well as `"yes"`, `"no"`, `"y"`, `"n"`,
/// `"true"` and `"false"` (case-insensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
	Yes,
	No,
}

impl YesNo {
	pub fn as_str(self) -> &'static str {
		match self {
			YesNo::Yes => "yes",
			YesNo::No => "no",
		}
	}
}

impl From<bool> for YesNo {
	fn from(value: bool) -> Self {
		if value { YesNo::Yes } else { YesNo::No }
	}
}

impl Serialize for YesNo {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for YesNo {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Raw {
			Bool(bool),
			Text(String),
		}

		match Raw::deserialize(deserializer)? {
			Raw::Bool(b) => Ok(b.into()),
			Raw::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
				"yes" | "y" | "true" => Ok(YesNo::Yes),
				"no" | "n" | "false" => Ok(YesNo::No),
				other => Err(serde::de::Error::custom(format!("expected yes/no, got {other:?}"))),
			},
		}
	}
}

fn default_true() -> bool {
	true
}

/// A concrete automation primitive requested by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BrowserAction {
	Navigate {
		url: String,
	},
	Screenshot,
	#[serde(alias = "getTabState")]
	GetTabState,
	#[serde(alias = "getSpecificTabState")]
	GetSpecificTabState {
		#[serde(rename = "tabId")]
		tab_id: TabId,
	},
	#[serde(alias = "executeScript")]
	ExecuteScript {
		code: String,
	},
	Click {
		#[serde(flatten)]
		target: ElementTarget,
	},
	Fill {
		#[serde(flatten)]
		target: ElementTarget,
		value: String,
	},
	#[serde(alias = "getPageState")]
	GetPageState,
	#[serde(alias = "selectOption")]
	SelectOption {
		#[serde(flatten)]
		target: ElementTarget,
		value: String,
	},
	#[serde(alias = "selectRadio")]
	SelectRadio {
		/// Substring of the question label identifying the radio group.
		label: String,
		value: YesNo,
	},
	#[serde(alias = "fillSearch")]
	FillSearch {
		#[serde(flatten)]
		target: ElementTarget,
		value: String,
		#[serde(rename = "autoSelectFirst", default = "default_true")]
		auto_select_first: bool,
	},
}

impl BrowserAction {
	/// Wire name of the action, used in logs and UI labels.
	pub fn name(&self) -> &'static str {
		match self {
			BrowserAction::Navigate { .. } => "navigate",
			BrowserAction::Screenshot => "screenshot",
			BrowserAction::GetTabState => "get_tab_state",
			BrowserAction::GetSpecificTabState { .. } => "get_specific_tab_state",
			BrowserAction::ExecuteScript { .. } => "execute_script",
			BrowserAction::Click { .. } => "click",
			BrowserAction::Fill { .. } => "fill",
			BrowserAction::GetPageState => "get_page_state",
			BrowserAction::SelectOption { .. } => "select_option",
			BrowserAction::SelectRadio { .. } => "select_radio",
			BrowserAction::FillSearch { .. } => "fill_search",
		}
	}

	/// Returns true for actions that operate on the tab rather than the document.
	pub fn is_tab_level(&self) -> bool {
		matches!(
			self,
			BrowserAction::Navigate { .. }
				| BrowserAction::Screenshot
				| BrowserAction::GetTabState
				| BrowserAction::GetSpecificTabState { .. }
				| BrowserAction::ExecuteScript { .. }
		)
	}
}

/// A `browser_action` frame: the action plus the id its result must echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserActionRequest {
	#[serde(rename = "actionId")]
	pub action_id: String,
	#[serde(flatten)]
	pub action: BrowserAction,
}

/// Uniform result envelope returned by every automation primitive.
///
/// Action-specific payload fields are flattened next to `success`/`error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowserActionResult {
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(flatten)]
	pub data: Map<String, Value>,
}

impl BrowserActionResult {
	pub fn ok() -> Self {
		Self {
			success: true,
			..Default::default()
		}
	}

	pub fn failure(error: impl Into<String>) -> Self {
		Self {
			success: false,
			error: Some(error.into()),
			data: Map::new(),
		}
	}

	/// Adds a payload field.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.data.insert(key.into(), value.into());
		self
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.data.get(key)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn fill_params_are_inline() {
		let req: BrowserActionRequest =
			serde_json::from_value(json!({"actionId": "a1", "action": "fill", "selector": "#email", "value": "x@y.z"})).unwrap();

		assert_eq!(req.action_id, "a1");
		assert_eq!(
			req.action,
			BrowserAction::Fill {
				target: ElementTarget::selector("#email"),
				value: "x@y.z".into()
			}
		);
	}

	#[test]
	fn camel_case_action_names_are_accepted() {
		let req: BrowserActionRequest = serde_json::from_value(json!({"actionId": "a2", "action": "getPageState"})).unwrap();
		assert_eq!(req.action, BrowserAction::GetPageState);

		let req: BrowserActionRequest = serde_json::from_value(json!({"actionId": "a3", "action": "get_page_state"})).unwrap();
		assert_eq!(req.action, BrowserAction::GetPageState);
	}

	#[test]
	fn select_radio_accepts_bool_and_text() {
		let a: BrowserAction = serde_json::from_value(json!({"action": "selectRadio", "label": "hazmat", "value": false})).unwrap();
		let b: BrowserAction = serde_json::from_value(json!({"action": "select_radio", "label": "hazmat", "value": "No"})).unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn fill_search_defaults_to_auto_select() {
		let a: BrowserAction = serde_json::from_value(json!({"action": "fillSearch", "label": "Business type", "value": "Trucking"})).unwrap();
		match a {
			BrowserAction::FillSearch { target, auto_select_first, .. } => {
				assert!(auto_select_first);
				assert_eq!(target.label.as_deref(), Some("Business type"));
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn result_payload_is_flattened() {
		let result = BrowserActionResult::ok().with("element", "input#email");
		let value = serde_json::to_value(&result).unwrap();
		assert_eq!(value, json!({"success": true, "element": "input#email"}));

		let failure = serde_json::to_value(BrowserActionResult::failure("Element not found")).unwrap();
		assert_eq!(failure, json!({"success": false, "error": "Element not found"}));
	}

	#[test]
	fn target_hints_follow_priority_order() {
		let target = ElementTarget {
			label: Some("Email".into()),
			id: Some("email".into()),
			..Default::default()
		};
		let kinds: Vec<_> = target.hints().map(|(k, _)| k).collect();
		assert_eq!(kinds, vec!["id", "label"]);
		assert!(ElementTarget::default().is_empty());
	}
}
