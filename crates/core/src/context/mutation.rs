//! DOM mutation records and the filter deciding which ones warrant re-extraction.

/// Elements whose subtrees never carry page context.
const IGNORED_TAGS: &[&str] = &["script", "style", "meta", "link"];

/// Attributes whose changes usually mean a component re-rendered.
const WATCHED_ATTRIBUTES: &[&str] = &["class", "data-testid"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
	ChildList,
	Attributes { name: String },
	CharacterData,
}

/// One observed mutation, reduced to what the filter needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
	pub kind: MutationKind,
	/// Lowercase tag of the mutated node (or of the text node's parent).
	pub target_tag: String,
	/// Lowercase tags of the target's ancestors, nearest first.
	pub ancestors: Vec<String>,
}

impl MutationRecord {
	pub fn child_list(tag: &str) -> Self {
		Self::new(MutationKind::ChildList, tag)
	}

	pub fn attribute(tag: &str, name: &str) -> Self {
		Self::new(MutationKind::Attributes { name: name.to_ascii_lowercase() }, tag)
	}

	pub fn character_data(tag: &str) -> Self {
		Self::new(MutationKind::CharacterData, tag)
	}

	pub fn within(mut self, ancestors: &[&str]) -> Self {
		self.ancestors = ancestors.iter().map(|t| t.to_ascii_lowercase()).collect();
		self
	}

	fn new(kind: MutationKind, tag: &str) -> Self {
		Self {
			kind,
			target_tag: tag.to_ascii_lowercase(),
			ancestors: Vec::new(),
		}
	}

	/// Child-list changes and `class`/`data-testid` attribute changes outside
	/// script/style/meta/link. Text-only mutations never count.
	pub fn is_significant(&self) -> bool {
		let kind_matters = match &self.kind {
			MutationKind::ChildList => true,
			MutationKind::Attributes { name } => WATCHED_ATTRIBUTES.contains(&name.as_str()),
			MutationKind::CharacterData => false,
		};
		kind_matters
			&& !IGNORED_TAGS.contains(&self.target_tag.as_str())
			&& !self.ancestors.iter().any(|tag| IGNORED_TAGS.contains(&tag.as_str()))
	}
}

pub fn any_significant(records: &[MutationRecord]) -> bool {
	records.iter().any(MutationRecord::is_significant)
}
