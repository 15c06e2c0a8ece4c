use std::path::Path;

use anyhow::{Result, bail};
use colored::Colorize;

use crate::cli::ConfigAction;
use crate::config::AssistantConfig;

pub fn execute(action: ConfigAction, path: &Path) -> Result<()> {
	match action {
		ConfigAction::Show => {
			let config = AssistantConfig::load(path);
			println!("{}", format!("# {}", path.display()).dimmed());
			println!("{}", serde_json::to_string_pretty(&config)?);
			if let Err(err) = config.validate() {
				println!("{} {err:#}", "warning:".yellow());
			}
			Ok(())
		}
		ConfigAction::Init { force } => {
			if path.exists() && !force {
				bail!("{} already exists (use --force to overwrite)", path.display());
			}
			AssistantConfig::default().save(path)?;
			println!("wrote {}", path.display());
			Ok(())
		}
	}
}
