//! Text frame decoding shared by every socket owner.
//!
//! A websocket text message carries one or more JSON objects separated by
//! newlines. Lines decode independently. A `browser_action` whose action is
//! unknown or whose parameters are wrong still carries an `actionId`, so it
//! decodes to [`InboundMessage::InvalidBrowserAction`] instead of an error and
//! the backend gets its failed result.

use serde::Deserialize;
use serde_json::Value;

use crate::messages::InboundMessage;

#[derive(Deserialize)]
struct Header {
	#[serde(rename = "type")]
	kind: String,
	#[serde(default, rename = "actionId")]
	action_id: Option<String>,
	#[serde(default)]
	action: Value,
}

/// Decodes one JSON object.
pub fn decode_line(line: &str) -> serde_json::Result<InboundMessage> {
	let err = match serde_json::from_str::<InboundMessage>(line) {
		Ok(message) => return Ok(message),
		Err(err) => err,
	};
	match serde_json::from_str::<Header>(line) {
		Ok(Header {
			kind,
			action_id: Some(action_id),
			action,
		}) if kind == "browser_action" => {
			let error = match action.as_str() {
				Some(name) => format!("Unsupported action `{name}`: {err}"),
				None => format!("Unsupported action: {err}"),
			};
			Ok(InboundMessage::InvalidBrowserAction { action_id, error })
		}
		_ => Err(err),
	}
}

/// Decodes every JSON object in a text frame. Blank lines are skipped.
pub fn decode(text: &str) -> Vec<serde_json::Result<InboundMessage>> {
	text.lines().map(str::trim).filter(|line| !line.is_empty()).map(decode_line).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_action_keeps_its_id() {
		let frame = decode_line(r#"{"type":"browser_action","actionId":"b9","action":"hover"}"#).unwrap();
		match frame {
			InboundMessage::InvalidBrowserAction { action_id, error } => {
				assert_eq!(action_id, "b9");
				assert!(error.starts_with("Unsupported action `hover`"), "{error}");
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn bad_params_keep_their_id() {
		let frame = decode_line(r##"{"type":"browser_action","actionId":"b3","action":"fill","selector":"#email"}"##).unwrap();
		assert!(matches!(frame, InboundMessage::InvalidBrowserAction { ref action_id, .. } if action_id == "b3"));
		assert_eq!(frame.kind(), "browser_action");
	}

	#[test]
	fn other_garbage_stays_an_error() {
		assert!(decode_line(r#"{"type":"browser_action","action":"hover"}"#).is_err());
		assert!(decode_line(r#"{"type":"telepathy","actionId":"x"}"#).is_err());
		assert!(decode_line("{not json").is_err());
	}

	#[test]
	fn lines_decode_independently() {
		let text = "{\"type\":\"response_start\"}\n\n  {nope\r\n{\"type\":\"browser_action\",\"actionId\":\"b1\",\"action\":\"click\",\"selector\":\"#go\"}\n";
		let frames = decode(text);
		assert_eq!(frames.len(), 3);
		assert_eq!(frames[0].as_ref().ok(), Some(&InboundMessage::ResponseStart));
		assert!(frames[1].is_err());
		assert!(matches!(&frames[2], Ok(InboundMessage::BrowserAction(req)) if req.action_id == "b1"));
	}
}
