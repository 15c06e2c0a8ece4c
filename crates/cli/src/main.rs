use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use rms_cli::{cli::Cli, commands, logging};

fn main() -> ExitCode {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
		Ok(runtime) => runtime,
		Err(err) => {
			eprintln!("{} {err}", "error:".red().bold());
			return ExitCode::FAILURE;
		}
	};

	// Page documents and watchers are `!Send`; everything stays on this thread.
	let local = tokio::task::LocalSet::new();
	match local.block_on(&runtime, commands::dispatch(cli)) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			eprintln!("{} {err:#}", "error:".red().bold());
			ExitCode::FAILURE
		}
	}
}
