//! Interactive chat loop.
//!
//! Everything runs on one thread: the transport task, the page watchers and
//! the session share a `LocalSet`. Stdin lines are either chat messages or
//! slash commands.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use rms::{AssistantSession, BrowserHost, ContextUpdate, ContextWatcher, Conversation, PageSignal, StaticHost, WatcherConfig};
use rms_protocol::TabId;
use rms_runtime::{Transport, TransportEvent};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::ChatArgs;
use crate::config::AssistantConfig;
use crate::render;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
	Message(String),
	Allow,
	Deny,
	Attach(PathBuf),
	Task { task_id: String },
	Quote { lead_id: Option<String> },
	Note { lead_id: String, note: String },
	Carrier { carrier: String, lead_id: Option<String> },
	Context,
	History,
	Clear,
	Quit,
	Help,
	Empty,
	/// A slash command that did not parse; carries the usage hint.
	Invalid(String),
}

const HELP: &str = "\
/allow                 approve the pending action
/deny                  decline the pending action
/attach PATH           attach a PDF, PNG or JPEG to the next message
/task TASK_ID          create a suggested task for the lead on screen
/quote [LEAD_ID]       load a lead for quoting
/note LEAD_ID TEXT     save a quote note
/carrier NAME [LEAD]   start carrier quote automation in the active tab
/context               show the context of the active tab
/history               print the conversation
/clear                 clear the conversation
/quit                  exit";

pub fn parse_input(line: &str) -> Input {
	let line = line.trim();
	if line.is_empty() {
		return Input::Empty;
	}
	let Some(command) = line.strip_prefix('/') else {
		return Input::Message(line.to_string());
	};

	let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
	let rest = rest.trim();
	let mut words = rest.split_whitespace();
	match name {
		"allow" | "yes" => Input::Allow,
		"deny" | "no" => Input::Deny,
		"attach" if !rest.is_empty() => Input::Attach(PathBuf::from(rest)),
		"attach" => Input::Invalid("usage: /attach PATH".into()),
		"task" => match words.next() {
			Some(task_id) => Input::Task { task_id: task_id.into() },
			None => Input::Invalid("usage: /task TASK_ID".into()),
		},
		"quote" => Input::Quote {
			lead_id: words.next().map(str::to_string),
		},
		"note" => match rest.split_once(char::is_whitespace) {
			Some((lead_id, note)) if !note.trim().is_empty() => Input::Note {
				lead_id: lead_id.into(),
				note: note.trim().into(),
			},
			_ => Input::Invalid("usage: /note LEAD_ID TEXT".into()),
		},
		"carrier" => match words.next() {
			Some(carrier) => Input::Carrier {
				carrier: carrier.into(),
				lead_id: words.next().map(str::to_string),
			},
			None => Input::Invalid("usage: /carrier NAME [LEAD_ID]".into()),
		},
		"context" => Input::Context,
		"history" => Input::History,
		"clear" => Input::Clear,
		"quit" | "exit" => Input::Quit,
		"help" | "?" => Input::Help,
		other => Input::Invalid(format!("unknown command /{other}; /help lists commands")),
	}
}

/// Loads `--page`/`--url` pairs as tabs. A page without a URL is served at its `file://` URL.
fn open_pages(host: &StaticHost, args: &ChatArgs) -> Result<()> {
	if args.urls.len() > args.pages.len() {
		bail!("--url given {} times but --page only {}", args.urls.len(), args.pages.len());
	}
	for (index, page) in args.pages.iter().enumerate() {
		let markup = fs::read_to_string(page).with_context(|| format!("reading {}", page.display()))?;
		let url = match args.urls.get(index) {
			Some(url) => url.clone(),
			None => {
				let absolute = fs::canonicalize(page).with_context(|| format!("resolving {}", page.display()))?;
				url::Url::from_file_path(&absolute)
					.map(String::from)
					.map_err(|_| anyhow::anyhow!("cannot build a file URL for {}", absolute.display()))?
			}
		};
		host.open_tab(url, &markup);
	}
	Ok(())
}

fn load_conversation(path: &std::path::Path, fresh: bool) -> Conversation {
	if fresh {
		return Conversation::new();
	}
	match Conversation::load(path) {
		Ok(conversation) => conversation,
		Err(err) => {
			warn!(target = "rms", path = %path.display(), error = %err, "could not load conversation; starting fresh");
			Conversation::new()
		}
	}
}

/// Per-tab watchers, spawned on a tab's first page signal.
struct Watchers {
	host: Rc<StaticHost>,
	config: WatcherConfig,
	tabs: HashMap<TabId, mpsc::UnboundedSender<PageSignal>>,
	updates: mpsc::UnboundedSender<ContextUpdate>,
}

impl Watchers {
	fn route(&mut self, tab: TabId, signal: PageSignal) {
		if let Some(tx) = self.tabs.get(&tab) {
			if tx.send(signal).is_ok() {
				return;
			}
		}
		let Some(doc) = self.host.document(tab) else {
			self.tabs.remove(&tab);
			return;
		};
		debug!(target = "rms", tab, "starting context watcher");
		let (tx, rx) = mpsc::unbounded_channel();
		tokio::task::spawn_local(ContextWatcher::new(tab, doc, self.config).run(rx, self.updates.clone()));
		// The watcher runs its own initial detection, so the triggering signal is not forwarded.
		self.tabs.insert(tab, tx);
	}
}

enum Flow {
	Continue,
	Quit,
}

async fn decide(session: &mut AssistantSession, approved: bool) {
	let events = session.decide(approved).await;
	if events.is_empty() {
		println!("{}", "nothing is waiting for a decision".dimmed());
	}
	events.iter().for_each(render::print_event);
}

async fn handle_input(input: Input, session: &mut AssistantSession) -> Flow {
	let outcome: rms::Result<()> = match input {
		Input::Empty => Ok(()),
		Input::Quit => return Flow::Quit,
		Input::Help => {
			println!("{}", HELP.dimmed());
			Ok(())
		}
		Input::Invalid(hint) => {
			println!("{}", hint.yellow());
			Ok(())
		}
		Input::Message(text) => session.send_message(&text).await.map(|_| ()),
		Input::Allow => {
			decide(session, true).await;
			Ok(())
		}
		Input::Deny => {
			decide(session, false).await;
			Ok(())
		}
		Input::Attach(path) => session.attach_path(&path).map(|file| {
			println!("  {} {} ({} KB)", "attached".green(), file.name, file.size.div_ceil(1024));
		}),
		Input::Task { task_id } => session.create_task(&task_id, None).await,
		Input::Quote { lead_id } => session.get_lead_for_quote(lead_id.as_deref()).await,
		Input::Note { lead_id, note } => session.save_quote_note(Some(&lead_id), &note).await,
		Input::Carrier { carrier, lead_id } => session
			.start_carrier_quote(&carrier, lead_id.as_deref(), json!({}))
			.await
			.map(|tab| println!("  {}", format!("starting {carrier} quote in tab {tab}").dimmed())),
		Input::Context => {
			match session.active_tab_state().await.and_then(|tab| tab.context) {
				Some(context) => println!("{}", render::format_context(&context)),
				None => println!("{}", "no page context detected yet".dimmed()),
			}
			Ok(())
		}
		Input::History => {
			render::print_history(session.conversation());
			Ok(())
		}
		Input::Clear => {
			session.clear();
			println!("{}", "conversation cleared".dimmed());
			Ok(())
		}
	};

	if let Err(err) = outcome {
		if err.is_user_facing() {
			println!("{}", err.to_string().yellow());
		} else {
			println!("{} {err}", "error:".red().bold());
		}
	}
	Flow::Continue
}

pub async fn run(args: ChatArgs, mut config: AssistantConfig) -> Result<()> {
	if let Some(endpoint) = &args.endpoint {
		config.endpoint = endpoint.clone();
	}
	if let Some(max_attempts) = args.max_attempts {
		config.reconnect.max_attempts = max_attempts;
	}
	config.validate()?;

	let host = Rc::new(StaticHost::new());
	let mut signals = host.subscribe();
	open_pages(&host, &args)?;

	let conversation_path = config.conversation_path();
	let conversation = load_conversation(&conversation_path, args.fresh);

	let (transport, handle, mut events) = Transport::new(config.transport());
	tokio::spawn(transport.run());

	let mut session = AssistantSession::new(
		Rc::clone(&host) as Rc<dyn BrowserHost>,
		Rc::new(handle.clone()),
		conversation,
		config.session(),
	)
	.with_persistence(conversation_path);
	if args.fresh {
		session.clear();
	}

	let (update_tx, mut updates) = mpsc::unbounded_channel();
	let mut watchers = Watchers {
		host: Rc::clone(&host),
		config: config.watcher,
		tabs: HashMap::new(),
		updates: update_tx,
	};

	info!(target = "rms", endpoint = %config.endpoint, tabs = host.tab_ids().len(), "chat started");
	println!("{} {}", "rms".bold(), format!("connecting to {} (/help for commands)", config.endpoint).dimmed());
	if !session.conversation().is_empty() {
		render::print_history(session.conversation());
	}

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let mut transport_open = true;

	loop {
		tokio::select! {
			event = events.recv(), if transport_open => match event {
				Some(TransportEvent::State(state)) => println!("{}", render::format_state(state)),
				Some(TransportEvent::Frame(frame)) => {
					for event in session.handle_frame(frame).await {
						render::print_event(&event);
					}
				}
				Some(TransportEvent::GaveUp { attempts }) => {
					println!("{}", format!("gave up reconnecting after {attempts} attempts; history is still available").red());
				}
				None => transport_open = false,
			},
			Some(update) = updates.recv() => {
				session.handle_context_update(update).await;
			}
			Some((tab, signal)) = signals.recv() => watchers.route(tab, signal),
			line = lines.next_line() => match line.context("reading stdin")? {
				Some(line) => {
					if let Flow::Quit = handle_input(parse_input(&line), &mut session).await {
						break;
					}
				}
				None => break,
			},
			_ = tokio::signal::ctrl_c() => break,
		}
	}

	handle.shutdown();
	Ok(())
}
