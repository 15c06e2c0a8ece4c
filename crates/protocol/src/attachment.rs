//! File attachments carried in `message` frames.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted attachment (10 MB).
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// MIME types the backend knows how to read.
pub const ALLOWED_MIME_TYPES: &[&str] = &["application/pdf", "image/png", "image/jpeg"];

/// A validated, base64-encoded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
	/// Display name (file name without directories).
	pub name: String,
	pub mime_type: String,
	/// Base64 (standard alphabet, padded) file content.
	pub data: String,
	/// Size of the decoded content in bytes.
	pub size: usize,
}

/// Attachment rejected at the UI boundary. The `Display` text is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachmentError {
	#[error("{name} is too large ({:.1} MB). Files must be 10 MB or smaller.", megabytes(.size))]
	TooLarge { name: String, size: usize },

	#[error("{name} has an unsupported type ({mime}). Only PDF, PNG and JPEG files can be attached.")]
	UnsupportedType { name: String, mime: String },
}

fn megabytes(bytes: &usize) -> f64 {
	*bytes as f64 / (1024.0 * 1024.0)
}

impl FileAttachment {
	/// Validates and encodes raw file content.
	///
	/// The size limit is checked before the type so oversized files are never encoded.
	pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, AttachmentError> {
		let name = name.into();
		if bytes.len() > MAX_ATTACHMENT_BYTES {
			return Err(AttachmentError::TooLarge { name, size: bytes.len() });
		}

		let mime = mime_guess::from_path(&name).first_raw().unwrap_or("application/octet-stream");
		if !ALLOWED_MIME_TYPES.contains(&mime) {
			return Err(AttachmentError::UnsupportedType {
				name,
				mime: mime.to_string(),
			});
		}

		Ok(Self {
			mime_type: mime.to_string(),
			data: STANDARD.encode(bytes),
			size: bytes.len(),
			name,
		})
	}

	/// Decodes the base64 payload.
	pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
		STANDARD.decode(&self.data)
	}
}
