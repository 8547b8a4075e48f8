use anyhow::anyhow;
use tracing::info;
use tracing_subscriber::{
	fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
	/// Default filter directive, used when `RUST_LOG` is unset
	pub level: String,
	pub with_thread_ids: bool,
	pub with_file_and_line: bool,
	pub with_target: bool,
	pub with_span_events: FmtSpan,
	pub json_format: bool,
}

impl Default for TracingConfig {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
			with_thread_ids: false,
			with_file_and_line: false,
			with_target: true,
			with_span_events: FmtSpan::NONE,
			json_format: false,
		}
	}
}

impl TracingConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_level(mut self, level: impl Into<String>) -> Self {
		self.level = level.into();
		self
	}

	pub fn with_json_format(mut self, json: bool) -> Self {
		self.json_format = json;
		self
	}

	pub fn debug() -> Self {
		Self {
			with_thread_ids: true,
			with_file_and_line: true,
			with_span_events: FmtSpan::CLOSE,
			..Self::default().with_level("debug")
		}
	}

	pub fn production() -> Self {
		Self {
			with_target: false,
			json_format: true,
			..Self::default()
		}
	}

	/// `RUST_LOG` wins over the configured level.
	pub fn env_filter(&self) -> EnvFilter {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
	}
}

/// Initialize tracing with the given configuration
pub fn init_tracing(config: TracingConfig) -> anyhow::Result<()> {
	let subscriber = tracing_subscriber::registry().with(config.env_filter());

	if config.json_format {
		let json_layer = tracing_subscriber::fmt::layer()
			.json()
			.with_span_events(config.with_span_events.clone())
			.with_thread_ids(config.with_thread_ids)
			.with_file(config.with_file_and_line)
			.with_line_number(config.with_file_and_line)
			.with_target(config.with_target);

		subscriber
			.with(json_layer)
			.try_init()
			.map_err(|e| anyhow!("Failed to initialize tracing: {}", e))?;
	} else {
		let fmt_layer = tracing_subscriber::fmt::layer()
			.with_span_events(config.with_span_events.clone())
			.with_thread_ids(config.with_thread_ids)
			.with_file(config.with_file_and_line)
			.with_line_number(config.with_file_and_line)
			.with_target(config.with_target);

		subscriber
			.with(fmt_layer)
			.try_init()
			.map_err(|e| anyhow!("Failed to initialize tracing: {}", e))?;
	}

	info!("Tracing initialized with filter: {}", config.level);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_presets() {
		let debug = TracingConfig::debug();
		assert_eq!(debug.level, "debug");
		assert!(debug.with_file_and_line);
		assert!(!debug.json_format);

		let production = TracingConfig::production();
		assert!(production.json_format);
		assert_eq!(production.level, "info");

		let custom = TracingConfig::new().with_level("fleet_core=trace").with_json_format(true);
		assert_eq!(custom.level, "fleet_core=trace");
		assert!(custom.json_format);
	}

	#[test]
	fn test_second_init_fails() {
		// Whichever call comes first in this test binary installs the
		// global subscriber; a repeat must report an error instead of panicking.
		let _ = init_tracing(TracingConfig::default());
		assert!(init_tracing(TracingConfig::default()).is_err());
	}
}
