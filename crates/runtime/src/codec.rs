//! Frame codec: one JSON object per line, one or more lines per websocket message.

use rms_protocol::{InboundMessage, OutboundMessage, framing};
use tracing::warn;

use crate::error::Result;

/// Serializes an outbound frame as a single JSON line (no trailing newline).
pub fn encode(message: &OutboundMessage) -> Result<String> {
	Ok(serde_json::to_string(message)?)
}

/// Decodes every JSON object in a text frame.
///
/// Blank lines are skipped. Each line decodes independently, so one malformed
/// object does not affect its neighbours.
pub fn decode(text: &str) -> Vec<serde_json::Result<InboundMessage>> {
	framing::decode(text)
}

/// Decodes a text frame, logging and dropping malformed objects.
pub fn decode_lossy(text: &str) -> Vec<InboundMessage> {
	decode(text)
		.into_iter()
		.filter_map(|frame| match frame {
			Ok(message) => Some(message),
			Err(err) => {
				warn!(target = "rms", error = %err, "dropping malformed frame");
				None
			}
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decode_multiple_lines() {
		let text = "{\"type\":\"response_start\"}\n\n{\"type\":\"response_chunk\",\"content\":\"hi\"}\n";
		let frames = decode_lossy(text);
		assert_eq!(frames.len(), 2);
		assert_eq!(frames[1], InboundMessage::ResponseChunk { content: "hi".into() });
	}

	#[test]
	fn malformed_line_is_isolated() {
		let text = "{\"type\":\"response_start\"}\n{not json\n{\"type\":\"response_end\"}";
		let decoded = decode(text);
		assert_eq!(decoded.len(), 3);
		assert!(decoded[1].is_err());
		assert_eq!(decode_lossy(text), vec![InboundMessage::ResponseStart, InboundMessage::ResponseEnd]);
	}

	#[test]
	fn undecodable_browser_action_is_kept() {
		let text = "{\"type\":\"browser_action\",\"actionId\":\"b9\",\"action\":\"hover\"}";
		match &decode_lossy(text)[..] {
			[InboundMessage::InvalidBrowserAction { action_id, .. }] => assert_eq!(action_id, "b9"),
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn encode_is_single_line() {
		let frame = OutboundMessage::SaveQuoteNote {
			lead_id: "lead_1".into(),
			note: "line one\nline two".into(),
		};
		let text = encode(&frame).unwrap();
		assert!(!text.contains('\n'));
		assert!(text.contains("\"type\":\"save_quote_note\""));
	}
}
