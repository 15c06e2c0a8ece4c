//! Known sites and their field extractors.
//!
//! Each site is a [`SiteProfile`] row: URL patterns, an extractor, and the
//! identity fields whose change on an otherwise unchanged URL still counts as
//! a new page. Adding a site means adding a row.

use std::sync::LazyLock;

use regex::Regex;
use rms_protocol::{ContextFields, Site};

use crate::dom::Document;

pub type Extractor = fn(&Document, &mut ContextFields);

pub struct SiteProfile {
	pub site: Site,
	/// Matched against the full URL, case-insensitively.
	pub patterns: &'static [&'static str],
	pub extract: Extractor,
	pub identity_fields: &'static [&'static str],
}

/// Ordered classification table; the first row with a matching pattern wins.
pub static SITE_PROFILES: &[SiteProfile] = &[
	SiteProfile {
		site: Site::CloseCrm,
		patterns: &[r"^https?://app\.close\.com/"],
		extract: extract_close,
		identity_fields: &["leadId", "companyName"],
	},
	SiteProfile {
		site: Site::NowCerts,
		patterns: &[r"^https?://([a-z0-9-]+\.)*nowcerts\.com/"],
		extract: extract_nowcerts,
		identity_fields: &["insuredName", "pageType"],
	},
	SiteProfile {
		site: Site::Fmcsa,
		patterns: &[r"^https?://safer\.fmcsa\.dot\.gov/", r"^https?://([a-z0-9-]+\.)*fmcsa\.dot\.gov/"],
		extract: extract_safer,
		identity_fields: &["dotNumber"],
	},
	SiteProfile {
		site: Site::Progressive,
		patterns: &[r"^https?://([a-z0-9-]+\.)*progressive\.com/", r"^https?://([a-z0-9-]+\.)*foragentsonly\.com/"],
		extract: extract_carrier_portal,
		identity_fields: &["quoteNumber", "pageType"],
	},
	SiteProfile {
		site: Site::Geico,
		patterns: &[r"^https?://([a-z0-9-]+\.)*geico\.com/"],
		extract: extract_carrier_portal,
		identity_fields: &["quoteNumber", "pageType"],
	},
	SiteProfile {
		site: Site::Bhhc,
		patterns: &[r"^https?://([a-z0-9-]+\.)*bhhc\.com/", r"^https?://([a-z0-9-]+\.)*bhhc\.net/"],
		extract: extract_carrier_portal,
		identity_fields: &["quoteNumber", "pageType"],
	},
];

static COMPILED: LazyLock<Vec<(usize, Regex)>> = LazyLock::new(|| {
	SITE_PROFILES
		.iter()
		.enumerate()
		.flat_map(|(index, profile)| profile.patterns.iter().map(move |p| (index, Regex::new(&format!("(?i){p}")).unwrap())))
		.collect()
});

static CLOSE_LEAD_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/lead/(lead_[A-Za-z0-9]+)").unwrap());
static DOT_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(?:USDOT|DOT)\s*(?:Number|No\.?|#)?\s*:?\s*(\d{5,8})").unwrap());
static MC_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bMC[-\s#:]*(\d{4,7})\b").unwrap());
static OPERATING_STATUS: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?i)Operating\s+(?:Status|Authority\s+Status)\s*:\s*([A-Z][A-Z ]*[A-Z])").unwrap());
static QUOTE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Quote\s*(?:#|No\.?|Number)\s*:?\s*([A-Z0-9][A-Z0-9-]{4,})").unwrap());
static EMAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

/// Classifies `url`. Unmatched URLs are [`Site::Unknown`].
pub fn classify(url: &str) -> Option<&'static SiteProfile> {
	COMPILED.iter().find(|(_, re)| re.is_match(url)).map(|(index, _)| &SITE_PROFILES[*index])
}

pub fn profile(site: Site) -> Option<&'static SiteProfile> {
	SITE_PROFILES.iter().find(|p| p.site == site)
}

/// Text of the first element matching any selector, tried in order.
fn first_text(doc: &Document, selectors: &[&str]) -> Option<String> {
	selectors.iter().find_map(|css| {
		let id = doc.select_first(css).ok().flatten()?;
		Some(doc.text(id)).filter(|t| !t.is_empty())
	})
}

/// Value of the table cell following a header cell that starts with `label`.
///
/// SAFER and most carrier summaries lay data out as `<th>Label:</th><td>value</td>`.
fn labelled_cell(doc: &Document, label: &str) -> Option<String> {
	let label = label.to_lowercase();
	let cells = doc.select("th, td, dt, label, span").ok()?;
	for cell in cells {
		if !doc.text(cell).to_lowercase().starts_with(&label) {
			continue;
		}
		let value = doc
			.html()
			.tree
			.get(cell)?
			.next_siblings()
			.find_map(scraper::ElementRef::wrap)
			.map(|el| crate::dom::normalize_text(el.text()));
		if let Some(value) = value.filter(|v| !v.is_empty()) {
			return Some(value);
		}
	}
	None
}

fn body_text(doc: &Document) -> String {
	doc.select_first("body").ok().flatten().map(|body| doc.text(body)).unwrap_or_default()
}

fn capture(re: &Regex, text: &str) -> Option<String> {
	re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().trim().to_string())
}

fn set(fields: &mut ContextFields, name: &str, value: Option<String>) {
	if let Some(value) = value {
		fields.set(name, &value);
	}
}

fn extract_close(doc: &Document, fields: &mut ContextFields) {
	set(fields, "leadId", capture(&CLOSE_LEAD_ID, doc.url()));
	set(
		fields,
		"companyName",
		first_text(doc, &["[data-testid='lead-name']", "[data-testid='leadName']", ".LeadHeader-name", "h1"]),
	);
	set(fields, "contactName", first_text(doc, &["[data-testid='contact-name']", ".ContactName", ".contact-name"]));
	set(fields, "status", first_text(doc, &["[data-testid='lead-status']", ".LeadStatus", ".lead-status"]));
	set(fields, "phone", first_text(doc, &["a[href^='tel:']"]));
	let email = first_text(doc, &["a[href^='mailto:']"]).or_else(|| capture_all(&EMAIL, &body_text(doc)));
	set(fields, "email", email);
	let page_type = if fields.lead_id.is_some() { "lead" } else { "list" };
	fields.set("pageType", page_type);
}

fn capture_all(re: &Regex, text: &str) -> Option<String> {
	re.find(text).map(|m| m.as_str().to_string())
}

fn extract_nowcerts(doc: &Document, fields: &mut ContextFields) {
	set(fields, "insuredName", first_text(doc, &["#InsuredName", ".insured-name", "[data-testid='insured-name']", "h1"]));
	set(fields, "phone", first_text(doc, &["a[href^='tel:']"]));
	set(fields, "email", first_text(doc, &["a[href^='mailto:']"]));
	let text = body_text(doc);
	set(fields, "dotNumber", capture(&DOT_NUMBER, &text));
	set(fields, "pageType", path_segment(doc.url()));
}

fn extract_safer(doc: &Document, fields: &mut ContextFields) {
	let text = body_text(doc);
	set(fields, "dotNumber", labelled_cell(doc, "USDOT Number").or_else(|| capture(&DOT_NUMBER, &text)));
	let mc = labelled_cell(doc, "MC/MX/FF Number").and_then(|v| capture(&MC_NUMBER, &v)).or_else(|| capture(&MC_NUMBER, &text));
	set(fields, "mcNumber", mc);
	set(fields, "carrierName", labelled_cell(doc, "Legal Name"));
	set(
		fields,
		"operatingStatus",
		labelled_cell(doc, "Operating Authority Status")
			.or_else(|| labelled_cell(doc, "Operating Status"))
			.or_else(|| capture(&OPERATING_STATUS, &text)),
	);
	set(fields, "phone", labelled_cell(doc, "Phone"));
	fields.set("pageType", "carrier_snapshot");
}

fn extract_carrier_portal(doc: &Document, fields: &mut ContextFields) {
	let text = body_text(doc);
	set(fields, "quoteNumber", capture(&QUOTE_NUMBER, &text));
	set(fields, "dotNumber", capture(&DOT_NUMBER, &text));
	set(
		fields,
		"insuredName",
		first_text(doc, &["[data-testid='insured-name']", ".insured-name", "#insuredName"]).or_else(|| labelled_cell(doc, "Named Insured")),
	);
	set(fields, "pageType", path_segment(doc.url()));
}

/// Last non-empty path segment, lowercased, without extension.
fn path_segment(url: &str) -> Option<String> {
	let parsed = url::Url::parse(url).ok()?;
	let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
	let stem = segment.split('.').next().unwrap_or(segment);
	Some(stem.to_lowercase())
}
