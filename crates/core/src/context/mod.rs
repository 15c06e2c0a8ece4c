//! Page context detection: which known site is showing, and what it says.
//!
//! [`extract`] runs one detection pass over a [`Document`]. The
//! [`ContextTracker`] suppresses near-duplicate results and the
//! [`ContextWatcher`] decides when to re-run detection (load, URL change,
//! debounced significant mutations).

mod mutation;
mod sites;
mod tracker;
mod watcher;

use rms_protocol::{ContextFields, PageContext, Site, now_millis};

pub use self::mutation::{MutationKind, MutationRecord, any_significant};
pub use self::sites::{Extractor, SITE_PROFILES, SiteProfile, classify, profile};
pub use self::tracker::ContextTracker;
pub use self::watcher::{ContextUpdate, ContextWatcher, PageSignal, WatcherConfig};
use crate::dom::Document;

/// Classifies the document's URL and runs the matching extractor.
///
/// `changed_fields` is left empty; the tracker fills it in.
pub fn extract(doc: &Document) -> PageContext {
	let url = doc.url().to_string();
	let mut fields = ContextFields::default();
	let site = match classify(&url) {
		Some(profile) => {
			(profile.extract)(doc, &mut fields);
			profile.site
		}
		None => Site::Unknown,
	};
	PageContext {
		site,
		url,
		fields,
		timestamp: now_millis(),
		changed_fields: Vec::new(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_pages_carry_only_the_url() {
		let doc = Document::parse("https://example.com/", "<h1>Hello</h1>");
		let context = extract(&doc);
		assert_eq!(context.site, Site::Unknown);
		assert_eq!(context.url, "https://example.com/");
		assert!(context.fields.is_empty());
	}

	#[test]
	fn known_pages_are_extracted() {
		let doc = Document::parse("https://app.close.com/lead/lead_9/", "<h1>Nine Freight</h1>");
		let context = extract(&doc);
		assert_eq!(context.site, Site::CloseCrm);
		assert_eq!(context.field("leadId"), Some("lead_9"));
		assert_eq!(context.field("companyName"), Some("Nine Freight"));
	}
}
