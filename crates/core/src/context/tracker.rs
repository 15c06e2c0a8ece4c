//! Change suppression between detection cycles.

use rms_protocol::{ContextFields, PageContext};

use super::sites;

/// Remembers the last emitted context and decides whether a new extraction is news.
///
/// A context is emitted when the site changed, the URL changed, or one of the
/// site's identity fields changed. Anything else (a phone number appearing
/// after a lazy render, say) is folded into the next emission.
#[derive(Debug, Default)]
pub struct ContextTracker {
	last: Option<PageContext>,
}

impl ContextTracker {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn last(&self) -> Option<&PageContext> {
		self.last.as_ref()
	}

	/// Forgets the previous snapshot so the next observation is always emitted.
	pub fn reset(&mut self) {
		self.last = None;
	}

	/// Returns the context to emit, with `changed_fields` filled in, or `None`
	/// when the extraction is a near-duplicate of the last emitted one.
	pub fn observe(&mut self, mut context: PageContext) -> Option<PageContext> {
		let changed = match &self.last {
			None => non_empty(&context.fields),
			Some(prev) => {
				let identity_changed = sites::profile(context.site)
					.map(|p| p.identity_fields.iter().any(|name| prev.field(name) != context.field(name)))
					.unwrap_or(false);
				if prev.site == context.site && prev.url == context.url && !identity_changed {
					return None;
				}
				if prev.site == context.site {
					prev.fields.diff(&context.fields)
				} else {
					non_empty(&context.fields)
				}
			}
		};
		context.changed_fields = changed;
		self.last = Some(context.clone());
		Some(context)
	}
}

fn non_empty(fields: &ContextFields) -> Vec<String> {
	ContextFields::NAMES
		.iter()
		.filter(|name| fields.get(name).is_some())
		.map(|name| name.to_string())
		.collect()
}
