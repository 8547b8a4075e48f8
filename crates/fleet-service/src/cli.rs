//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use fleet_types::ServiceCategory;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fleetd")]
#[command(about = "Fleet orchestration daemon", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
	/// Log filter (trace, debug, info, warn, error or a full directive).
	/// RUST_LOG takes precedence.
	#[arg(short, long, env = "FLEET_LOG_LEVEL", global = true)]
	pub log_level: Option<String>,

	/// Emit logs as JSON
	#[arg(long, global = true)]
	pub json_logs: bool,

	/// Subcommand to execute; defaults to `start`
	#[command(subcommand)]
	pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
	/// Start the daemon and run until interrupted
	Start {
		/// Path to configuration file
		#[arg(short, long, value_name = "FILE", env = "FLEET_CONFIG")]
		config: Option<PathBuf>,
	},

	/// Bring a fleet up in-process and print its status as JSON
	Status {
		#[arg(short, long, value_name = "FILE")]
		config: Option<PathBuf>,

		/// Only show one category
		#[arg(long)]
		category: Option<ServiceCategory>,
	},

	/// Validate a configuration file
	Validate {
		#[arg(value_name = "FILE")]
		config: PathBuf,
	},

	/// Print the effective configuration as JSON
	ShowConfig {
		#[arg(value_name = "FILE")]
		config: Option<PathBuf>,
	},

	/// Send a test message through the processing pipeline
	Test {
		#[arg(short, long)]
		message: String,

		#[arg(short, long, value_name = "FILE")]
		config: Option<PathBuf>,
	},
}

impl Args {
	pub fn command(&self) -> Command {
		self.command
			.clone()
			.unwrap_or(Command::Start { config: None })
	}
}
