mod config;
mod page;

use anyhow::Result;

use crate::chat;
use crate::cli::{Cli, Commands};
use crate::config::AssistantConfig;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let config_path = cli.config.clone().unwrap_or_else(AssistantConfig::default_path);

	match cli.command {
		Commands::Chat(args) => chat::run(args, AssistantConfig::load(&config_path)).await,
		Commands::Resolve(args) => page::resolve(&args),
		Commands::Context(args) => page::context(&args),
		Commands::Config(args) => config::execute(args.action, &config_path),
	}
}
