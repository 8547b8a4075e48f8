//! Service instances and their lifecycle states.

use crate::category::ServiceCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Unique identifier of a registered instance.
pub type InstanceId = String;

/// Static configuration of one instance.
///
/// Immutable once registered; changing any of it means registering a new
/// instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
	pub category: ServiceCategory,
	pub instance_id: InstanceId,
	pub host: String,
	pub port: u16,
	pub workers: u32,
	/// Memory limit in MB
	pub memory_limit: u64,
	/// CPU share in cores
	pub cpu_limit: f64,
	pub environment: HashMap<String, String>,
	/// Categories that need a running, healthy instance before this one may start
	pub dependencies: Vec<ServiceCategory>,
	pub auto_restart: bool,
	pub health_check_interval: Duration,
	pub startup_timeout: Duration,
	pub shutdown_timeout: Duration,
}

impl InstanceConfig {
	/// Creates a configuration with default limits and a fresh identifier.
	pub fn new(category: ServiceCategory) -> Self {
		let suffix = uuid::Uuid::new_v4().simple().to_string();
		Self {
			category,
			instance_id: format!("{}-{}", category, &suffix[..8]),
			host: "localhost".to_string(),
			port: 8080,
			workers: 1,
			memory_limit: 1024,
			cpu_limit: 1.0,
			environment: HashMap::new(),
			dependencies: Vec::new(),
			auto_restart: true,
			health_check_interval: Duration::from_secs(30),
			startup_timeout: Duration::from_secs(60),
			shutdown_timeout: Duration::from_secs(30),
		}
	}

	pub fn with_id(mut self, instance_id: impl Into<InstanceId>) -> Self {
		self.instance_id = instance_id.into();
		self
	}

	pub fn with_port(mut self, port: u16) -> Self {
		self.port = port;
		self
	}

	pub fn with_limits(mut self, memory_limit: u64, cpu_limit: f64) -> Self {
		self.memory_limit = memory_limit;
		self.cpu_limit = cpu_limit;
		self
	}

	pub fn with_dependencies(mut self, dependencies: Vec<ServiceCategory>) -> Self {
		self.dependencies = dependencies;
		self
	}

	pub fn with_auto_restart(mut self, auto_restart: bool) -> Self {
		self.auto_restart = auto_restart;
		self
	}

	/// Minimum time between two liveness probes of this instance.
	pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
		self.health_check_interval = interval;
		self
	}

	pub fn with_timeouts(mut self, startup: Duration, shutdown: Duration) -> Self {
		self.startup_timeout = startup;
		self.shutdown_timeout = shutdown;
		self
	}

	pub fn address(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
	Stopped,
	Starting,
	Running,
	Stopping,
	Error,
	Maintenance,
}

impl InstanceStatus {
	/// Whether the lifecycle state machine allows moving from `self` to `to`.
	pub fn can_transition_to(&self, to: InstanceStatus) -> bool {
		use InstanceStatus::*;

		match (*self, to) {
			(Stopped, Starting) => true,
			(Starting, Running) => true,
			(Starting, Error) => true,
			(Starting, Stopping) => true,
			(Running, Stopping) => true,
			(Running, Error) => true,
			(Stopping, Stopped) => true,
			(Stopping, Error) => true,
			// operator actions
			(Error, Stopped) => true,
			(Stopped, Maintenance) => true,
			(Error, Maintenance) => true,
			(Maintenance, Stopped) => true,
			_ => false,
		}
	}

	pub fn is_active(&self) -> bool {
		matches!(self, InstanceStatus::Running | InstanceStatus::Starting)
	}
}

impl fmt::Display for InstanceStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Stopped => write!(f, "stopped"),
			Self::Starting => write!(f, "starting"),
			Self::Running => write!(f, "running"),
			Self::Stopping => write!(f, "stopping"),
			Self::Error => write!(f, "error"),
			Self::Maintenance => write!(f, "maintenance"),
		}
	}
}

/// Result of the registry's own liveness probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceHealth {
	Unknown,
	Healthy,
	Unhealthy,
}

/// A registered instance with its runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
	pub config: InstanceConfig,
	pub status: InstanceStatus,
	pub process_id: Option<u32>,
	pub start_time: Option<DateTime<Utc>>,
	pub last_health_check: Option<DateTime<Utc>>,
	pub health: InstanceHealth,
	/// Consecutive error counter, decremented by successful probes
	pub error_count: u32,
	pub restart_count: u32,
}

impl ServiceInstance {
	pub fn new(config: InstanceConfig) -> Self {
		Self {
			config,
			status: InstanceStatus::Stopped,
			process_id: None,
			start_time: None,
			last_health_check: None,
			health: InstanceHealth::Unknown,
			error_count: 0,
			restart_count: 0,
		}
	}

	pub fn id(&self) -> &str {
		&self.config.instance_id
	}

	pub fn category(&self) -> ServiceCategory {
		self.config.category
	}

	/// Running and last seen healthy.
	pub fn is_available(&self) -> bool {
		self.status == InstanceStatus::Running && self.health == InstanceHealth::Healthy
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config_values() {
		let config = InstanceConfig::new(ServiceCategory::MeaningMaking);
		assert_eq!(config.port, 8080);
		assert_eq!(config.host, "localhost");
		assert_eq!(config.workers, 1);
		assert_eq!(config.memory_limit, 1024);
		assert_eq!(config.cpu_limit, 1.0);
		assert!(config.auto_restart);
		assert_eq!(config.health_check_interval, Duration::from_secs(30));
		assert!(config.instance_id.starts_with("meaning_making-"));
	}

	#[test]
	fn test_generated_ids_differ() {
		let a = InstanceConfig::new(ServiceCategory::Wisdom);
		let b = InstanceConfig::new(ServiceCategory::Wisdom);
		assert_ne!(a.instance_id, b.instance_id);
	}

	#[test]
	fn test_lifecycle_transitions() {
		use InstanceStatus::*;

		assert!(Stopped.can_transition_to(Starting));
		assert!(Starting.can_transition_to(Running));
		assert!(Running.can_transition_to(Stopping));
		assert!(Stopping.can_transition_to(Stopped));
		assert!(Running.can_transition_to(Error));

		assert!(!Stopped.can_transition_to(Running));
		assert!(!Running.can_transition_to(Starting));
		assert!(!Running.can_transition_to(Maintenance));
		assert!(!Maintenance.can_transition_to(Starting));
		assert!(!Error.can_transition_to(Running));
	}

	#[test]
	fn test_new_instance_is_stopped() {
		let instance = ServiceInstance::new(InstanceConfig::new(ServiceCategory::Relevance));
		assert_eq!(instance.status, InstanceStatus::Stopped);
		assert_eq!(instance.health, InstanceHealth::Unknown);
		assert!(!instance.is_available());
	}
}
