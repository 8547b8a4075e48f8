//! Configuration loading from files and environment.

use crate::order::startup_order;
use crate::types::*;
use crate::ConfigError;
use fleet_types::BalancingStrategy;
use regex::Regex;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "FLEET_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	/// Loads the configured file, or the built-in default when no file was
	/// given, then applies environment overrides and validates.
	pub fn load(&self) -> Result<FleetConfig, ConfigError> {
		let mut config = match &self.file_path {
			Some(path) => Self::read_file(path)?,
			None => {
				info!("No configuration file given, using built-in defaults");
				FleetConfig::default()
			}
		};

		self.apply_env_overrides(&mut config)?;
		Self::validate(&config)?;
		Ok(config)
	}

	/// Loads and validates a file without applying environment overrides.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<FleetConfig, ConfigError> {
		let config = Self::read_file(path.as_ref())?;
		Self::validate(&config)?;
		Ok(config)
	}

	fn read_file(path: &Path) -> Result<FleetConfig, ConfigError> {
		info!("Loading configuration from {:?}", path);

		if !path.exists() {
			return Err(ConfigError::FileNotFound(path.display().to_string()));
		}
		let contents = std::fs::read_to_string(path)?;
		let contents = substitute_env_vars(&contents)?;

		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Self::from_toml(&contents),
			Some("json") => Self::from_json(&contents),
			Some("yaml") | Some("yml") => Self::from_yaml(&contents),
			_ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
		}
	}

	/// Parses a TOML document
	pub fn from_toml(contents: &str) -> Result<FleetConfig, ConfigError> {
		toml::from_str(contents)
			.map_err(|e| ConfigError::ParseError(format!("Failed to parse TOML: {}", e)))
	}

	/// Parses a JSON document
	pub fn from_json(contents: &str) -> Result<FleetConfig, ConfigError> {
		serde_json::from_str(contents)
			.map_err(|e| ConfigError::ParseError(format!("Failed to parse JSON: {}", e)))
	}

	/// Parses a YAML document
	pub fn from_yaml(contents: &str) -> Result<FleetConfig, ConfigError> {
		serde_yaml::from_str(contents)
			.map_err(|e| ConfigError::ParseError(format!("Failed to parse YAML: {}", e)))
	}

	fn apply_env_overrides(&self, config: &mut FleetConfig) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			debug!("Overriding log level from environment");
			config.daemon.log_level = log_level;
		}

		if let Ok(strategy) = env::var(format!("{}LB_STRATEGY", self.env_prefix)) {
			debug!("Overriding load balancing strategy from environment");
			config.load_balancer.strategy = strategy
				.parse::<BalancingStrategy>()
				.map_err(ConfigError::ValidationError)?;
		}

		Ok(())
	}

	/// Checks limits, intervals, thresholds and the dependency graph.
	pub fn validate(config: &FleetConfig) -> Result<(), ConfigError> {
		let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

		if config.daemon.maintenance_interval_secs == 0 {
			return invalid("daemon.maintenance_interval_secs must be positive".into());
		}
		if config.load_balancer.health_check_interval == 0 {
			return invalid("load_balancer.health_check_interval must be positive".into());
		}
		if config.monitoring.metrics_interval == 0 {
			return invalid("monitoring.metrics_interval must be positive".into());
		}
		if config.load_balancer.failure_threshold == 0 {
			return invalid("load_balancer.failure_threshold must be at least 1".into());
		}

		for (category, settings) in &config.services {
			if settings.memory_limit == 0 {
				return invalid(format!("services.{}.memory_limit must be positive", category));
			}
			if !(settings.cpu_limit.is_finite() && settings.cpu_limit > 0.0) {
				return invalid(format!("services.{}.cpu_limit must be positive", category));
			}
			if settings.startup_timeout_secs == 0 || settings.shutdown_timeout_secs == 0 {
				return invalid(format!("services.{} timeouts must be positive", category));
			}
			let last_port = settings.port_start as u32 + settings.instances.saturating_sub(1);
			if last_port > u16::MAX as u32 {
				return invalid(format!(
					"services.{} needs ports up to {}, beyond the valid range",
					category, last_port
				));
			}
			for dep in &settings.dependencies {
				if !config.services.contains_key(dep) {
					return invalid(format!(
						"services.{} depends on {}, which is not configured",
						category, dep
					));
				}
			}
		}

		for (name, threshold) in &config.monitoring.thresholds {
			if !HEALTH_METRICS.contains(&name.as_str()) {
				return invalid(format!("monitoring.thresholds.{} is not a known metric", name));
			}
			if threshold.warning > threshold.critical {
				return invalid(format!(
					"monitoring.thresholds.{}: warning {} exceeds critical {}",
					name, threshold.warning, threshold.critical
				));
			}
		}

		startup_order(config)?;
		Ok(())
	}
}

/// Replaces every `${VAR}` with the value of the environment variable.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;
	let mut result = content.to_string();

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

/// Load configuration from standard locations
pub fn load_config() -> Result<FleetConfig, ConfigError> {
	// Checked in order:
	// 1. FLEET_CONFIG
	// 2. ./fleet.toml
	// 3. ./config/fleet.toml
	// 4. /etc/fleet/fleet.toml
	// then the built-in default with env overrides

	if let Ok(path) = env::var("FLEET_CONFIG") {
		return ConfigLoader::new().with_file(path).load();
	}

	let paths = ["./fleet.toml", "./config/fleet.toml", "/etc/fleet/fleet.toml"];

	for path in &paths {
		if Path::new(path).exists() {
			return ConfigLoader::new().with_file(path).load();
		}
	}

	ConfigLoader::new().load()
}
