//! Configuration for the fleet daemon.
//!
//! Files may be TOML, JSON or YAML (chosen by extension). `${VAR}` references
//! are substituted from the environment before parsing, a few settings can
//! be overridden through `FLEET_*` variables, and the result is validated
//! before it is handed out.

pub mod loader;
pub mod order;
pub mod serde_helpers;
pub mod types;

pub use loader::{load_config, ConfigLoader};
pub use order::startup_order;
pub use types::*;

use fleet_types::ServiceCategory;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Unsupported config format: {0}")]
	UnsupportedFormat(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("Dependency cycle through {0}")]
	DependencyCycle(ServiceCategory),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}
