//! Offline inspection of saved pages.

use std::fs;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use rms::{Document, Resolution, extract, resolve as resolve_target};
use rms_protocol::ElementTarget;

use crate::cli::{PageArgs, ResolveArgs};
use crate::render;

fn load(args: &PageArgs) -> Result<Document> {
	let markup = fs::read_to_string(&args.page).with_context(|| format!("reading {}", args.page.display()))?;
	Ok(Document::parse(args.url.clone(), &markup))
}

/// One-line description of an element: tag plus its identifying attributes.
fn describe(doc: &Document, found: &Resolution) -> String {
	let node = found.element;
	let mut out = format!("<{}", doc.tag(node).unwrap_or("?"));
	for attr in ["id", "name", "type", "fieldref", "placeholder"] {
		if let Some(value) = doc.attr(node, attr) {
			out.push_str(&format!(" {attr}=\"{value}\""));
		}
	}
	out.push('>');
	let text = doc.text(node);
	let text = text.trim();
	if !text.is_empty() {
		out.push_str(&format!(" {}", text.chars().take(60).collect::<String>()));
	}
	out
}

pub fn resolve(args: &ResolveArgs) -> Result<()> {
	let target = args.target();
	if target == ElementTarget::default() {
		bail!("give at least one of --selector, --id, --name, --fieldref, --label, --placeholder or --text");
	}
	let doc = load(&args.page)?;
	let Some(found) = resolve_target(&doc, &target) else {
		bail!("no element matches {}", target.describe());
	};
	println!("{} {}", found.strategy.as_str().green().bold(), describe(&doc, &found));
	Ok(())
}

pub fn context(args: &PageArgs) -> Result<()> {
	let doc = load(args)?;
	println!("{}", render::format_context(&extract(&doc)));
	Ok(())
}
