
use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand};
use rms_protocol::ElementTarget;

fn help_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default().bold())
		.usage(AnsiColor::Yellow.on_default().bold())
		.literal(AnsiColor::Green.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.valid(AnsiColor::Green.on_default())
}

/// Terminal client for the RMS assistant.
#[derive(Parser, Debug)]
#[command(name = "rms")]
#[command(about = "Chat with the RMS agent and let it drive pages")]
#[command(version)]
#[command(styles = help_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (defaults to the user config directory)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Interactive chat with the backend agent.
	Chat(ChatArgs),
	/// Resolve an element target against a saved page.
	Resolve(ResolveArgs),
	/// Print the context detected for a saved page.
	Context(PageArgs),
	/// Show or initialize the configuration.
	Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
	/// Backend websocket endpoint.
	#[arg(long, value_name = "URL")]
	pub endpoint: Option<String>,

	/// HTML file to open as a tab; pair each with --url.
	#[arg(long = "page", value_name = "FILE")]
	pub pages: Vec<PathBuf>,

	/// URL the matching --page is served at.
	#[arg(long = "url", value_name = "URL")]
	pub urls: Vec<String>,

	/// Start with an empty conversation.
	#[arg(long)]
	pub fresh: bool,

	/// Reconnect attempts before giving up (0 = forever).
	#[arg(long, value_name = "N")]
	pub max_attempts: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct PageArgs {
	/// Saved HTML page.
	#[arg(long, value_name = "FILE")]
	pub page: PathBuf,

	/// URL the page was saved from.
	#[arg(long, value_name = "URL", default_value = "about:blank")]
	pub url: String,
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
	#[command(flatten)]
	pub page: PageArgs,

	#[arg(long)]
	pub selector: Option<String>,
	#[arg(long)]
	pub id: Option<String>,
	#[arg(long)]
	pub name: Option<String>,
	#[arg(long)]
	pub fieldref: Option<String>,
	#[arg(long)]
	pub label: Option<String>,
	#[arg(long)]
	pub placeholder: Option<String>,
	#[arg(long = "text", value_name = "TEXT")]
	pub button_text: Option<String>,
}

impl ResolveArgs {
	pub fn target(&self) -> ElementTarget {
		ElementTarget {
			selector: self.selector.clone(),
			id: self.id.clone(),
			name: self.name.clone(),
			fieldref: self.fieldref.clone(),
			label: self.label.clone(),
			placeholder: self.placeholder.clone(),
			button_text: self.button_text.clone(),
		}
	}
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
	#[command(subcommand)]
	pub action: ConfigAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
	/// Print the effective configuration.
	Show,
	/// Write the default configuration.
	Init {
		/// Overwrite an existing file.
		#[arg(long)]
		force: bool,
	},
}
