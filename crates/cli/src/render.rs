//! Terminal rendering of conversation events.

use std::io::{self, Write};

use colored::Colorize;
use rms::{AuxiliaryCard, Conversation, Message, PendingAction, Role, ToolInvocation, ToolStatus, UiEvent};
use rms_protocol::{BrowserActionResult, ConnectionState, ContextFields, PageContext};
use serde_json::Value;

pub fn format_message(message: &Message) -> String {
	match message.role {
		Role::User => format!("{} {}", "you ›".bold().blue(), message.content),
		Role::Assistant if message.content.starts_with("Error: ") => format!("{} {}", "agent ›".bold().green(), message.content.red()),
		Role::Assistant => format!("{} {}", "agent ›".bold().green(), message.content),
	}
}

pub fn format_tool(tool: &ToolInvocation) -> String {
	let (icon, summary) = match tool.status {
		ToolStatus::Pending => ("…".yellow(), "running".dimmed()),
		ToolStatus::Complete => ("✓".green(), tool.result_summary.as_deref().unwrap_or("done").normal()),
		ToolStatus::Error => ("✗".red(), tool.result_summary.as_deref().unwrap_or("failed").red()),
	};
	format!("  {icon} {} {summary}", tool.label.bold())
}

pub fn format_pending(action: &PendingAction) -> String {
	let target = match &action.target {
		Value::Null => String::new(),
		Value::String(s) => format!(" on {s}"),
		other => format!(" on {other}"),
	};
	let mut out = format!("{} {}{target}", "confirm ›".bold().yellow(), action.action);
	if let Some(description) = &action.description {
		out.push_str(&format!("\n  {description}"));
	}
	out.push_str(&format!("\n  {}", "/allow or /deny".dimmed()));
	out
}

pub fn format_card(card: &AuxiliaryCard) -> String {
	match card {
		AuxiliaryCard::StructuredData { data_type, data } => {
			format!("{} {}\n{}", "data ›".bold().magenta(), data_type, serde_json::to_string_pretty(data).unwrap_or_default())
		}
		AuxiliaryCard::SuggestedTask {
			task_id,
			description,
			due_date,
			lead_id,
		} => {
			let mut out = format!("{} {description} [{task_id}]", "suggested task ›".bold().magenta());
			if let Some(due) = due_date {
				out.push_str(&format!(" due {due}"));
			}
			if let Some(lead) = lead_id {
				out.push_str(&format!(" for {lead}"));
			}
			out.push_str(&format!("\n  {}", format!("/task {task_id} to create it").dimmed()));
			out
		}
		AuxiliaryCard::TaskCreated { task_id, .. } => format!("{} {task_id}", "task created ›".bold().magenta()),
		AuxiliaryCard::CarrierQuote { carrier, status, tab_id } => match tab_id {
			Some(tab) => format!("{} {carrier}: {status} (tab {tab})", "quote ›".bold().magenta()),
			None => format!("{} {carrier}: {status}", "quote ›".bold().magenta()),
		},
	}
}

fn format_action_result(action_id: &str, action: &str, result: &BrowserActionResult) -> String {
	if result.success {
		format!("  {} {action} {}", "⚙".cyan(), format!("({action_id})").dimmed())
	} else {
		format!(
			"  {} {action} failed: {}",
			"⚙".red(),
			result.error.as_deref().unwrap_or("unknown error").red()
		)
	}
}

pub fn format_state(state: ConnectionState) -> String {
	let label = match state {
		ConnectionState::Connected => state.as_str().green(),
		ConnectionState::Connecting => state.as_str().yellow(),
		ConnectionState::Disconnected => state.as_str().red(),
	};
	format!("[{label}]")
}

pub fn format_context(context: &PageContext) -> String {
	let mut out = format!("{} {}\n  {}", "site".bold(), context.site.display_name(), context.url.dimmed());
	for name in ContextFields::NAMES {
		if let Some(value) = context.field(name) {
			let marker = if context.changed_fields.iter().any(|f| f == *name) { "*" } else { " " };
			out.push_str(&format!("\n {marker}{name}: {value}"));
		}
	}
	out
}

/// Prints one event. Stream chunks are written without a newline.
pub fn print_event(event: &UiEvent) {
	match event {
		UiEvent::Message(message) => println!("{}", format_message(message)),
		UiEvent::StreamStarted { .. } => {
			print!("{} ", "agent ›".bold().green());
			let _ = io::stdout().flush();
		}
		UiEvent::StreamChunk { chunk, .. } => {
			print!("{chunk}");
			let _ = io::stdout().flush();
		}
		UiEvent::StreamEnded(_) => println!(),
		UiEvent::ToolStarted(tool) | UiEvent::ToolResolved(tool) => println!("{}", format_tool(tool)),
		UiEvent::ActionRequested(action) => println!("{}", format_pending(action)),
		UiEvent::ActionSuperseded { action_id } => println!("  {}", format!("request {action_id} replaced by a newer one").dimmed()),
		UiEvent::ActionDecided { action_id, approved } => {
			let verdict = if *approved { "allowed".green() } else { "denied".red() };
			println!("  {action_id} {verdict}");
		}
		UiEvent::BrowserActionQueued { action, .. } => println!("  {}", format!("{action} waiting for your decision").dimmed()),
		UiEvent::BrowserActionDone { action_id, action, result } => println!("{}", format_action_result(action_id, action, result)),
		UiEvent::Card(card) => println!("{}", format_card(card)),
	}
}

pub fn print_history(conversation: &Conversation) {
	for message in conversation.messages() {
		println!("{}", format_message(message));
	}
	for tool in conversation.tools() {
		println!("{}", format_tool(tool));
	}
	for card in conversation.cards() {
		println!("{}", format_card(card));
	}
}
