//! Structured context extracted from known third-party pages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Known site identities recognised by the context watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
	/// Close CRM (lead pages).
	CloseCrm,
	/// NowCerts policy management.
	NowCerts,
	/// FMCSA SAFER carrier snapshot.
	Fmcsa,
	Progressive,
	Geico,
	/// Berkshire Hathaway Homestate Companies.
	Bhhc,
	#[default]
	Unknown,
}

impl Site {
	pub fn as_str(self) -> &'static str {
		match self {
			Site::CloseCrm => "close_crm",
			Site::NowCerts => "now_certs",
			Site::Fmcsa => "fmcsa",
			Site::Progressive => "progressive",
			Site::Geico => "geico",
			Site::Bhhc => "bhhc",
			Site::Unknown => "unknown",
		}
	}

	pub fn display_name(self) -> &'static str {
		match self {
			Site::CloseCrm => "Close CRM",
			Site::NowCerts => "NowCerts",
			Site::Fmcsa => "FMCSA SAFER",
			Site::Progressive => "Progressive",
			Site::Geico => "GEICO",
			Site::Bhhc => "BHHC",
			Site::Unknown => "Unknown site",
		}
	}

	pub fn is_known(self) -> bool {
		self != Site::Unknown
	}
}

impl fmt::Display for Site {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

macro_rules! context_fields {
	($($field:ident => $wire:literal),+ $(,)?) => {
		/// Per-site extracted fields. Any field may be absent.
		#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
		#[serde(rename_all = "camelCase")]
		pub struct ContextFields {
			$(
				#[serde(default, skip_serializing_if = "Option::is_none")]
				pub $field: Option<String>,
			)+
		}

		impl ContextFields {
			/// Wire names of every field, in declaration order.
			pub const NAMES: &'static [&'static str] = &[$($wire),+];

			/// Returns the field with the given wire name.
			pub fn get(&self, name: &str) -> Option<&str> {
				match name {
					$($wire => self.$field.as_deref(),)+
					_ => None,
				}
			}

			/// Sets a field by wire name, trimming whitespace. Empty values are ignored.
			///
			/// Returns false for unknown names.
			pub fn set(&mut self, name: &str, value: &str) -> bool {
				let value = value.trim();
				let slot = match name {
					$($wire => &mut self.$field,)+
					_ => return false,
				};
				if !value.is_empty() {
					*slot = Some(value.to_string());
				}
				true
			}
		}
	};
}

context_fields! {
	lead_id => "leadId",
	company_name => "companyName",
	contact_name => "contactName",
	dot_number => "dotNumber",
	mc_number => "mcNumber",
	phone => "phone",
	email => "email",
	status => "status",
	carrier_name => "carrierName",
	operating_status => "operatingStatus",
	insured_name => "insuredName",
	page_type => "pageType",
	quote_number => "quoteNumber",
}

impl ContextFields {
	/// Wire names of fields whose values differ between `self` and `other`.
	pub fn diff(&self, other: &ContextFields) -> Vec<String> {
		Self::NAMES
			.iter()
			.filter(|name| self.get(name) != other.get(name))
			.map(|name| name.to_string())
			.collect()
	}

	pub fn is_empty(&self) -> bool {
		Self::NAMES.iter().all(|name| self.get(name).is_none())
	}
}

/// Snapshot of what the watcher knows about the current page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
	pub site: Site,
	pub url: String,
	#[serde(flatten)]
	pub fields: ContextFields,
	/// Unix epoch milliseconds of the detection cycle.
	pub timestamp: i64,
	/// Fields that changed relative to the previously emitted snapshot.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub changed_fields: Vec<String>,
}

impl PageContext {
	pub fn field(&self, name: &str) -> Option<&str> {
		self.fields.get(name)
	}
}
