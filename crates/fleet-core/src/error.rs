// fleet-core/src/error.rs

use fleet_types::FleetError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Lifecycle error: {0}")]
	Lifecycle(String),

	#[error(transparent)]
	Fleet(#[from] FleetError),
}

impl From<fleet_config::ConfigError> for CoreError {
	fn from(err: fleet_config::ConfigError) -> Self {
		CoreError::Configuration(err.to_string())
	}
}
