//! Configuration types for the fleet daemon.

use crate::serde_helpers::{deserialize_category_map, serialize_category_map};
use fleet_types::{BalancingStrategy, ServiceCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric names the health monitor evaluates.
pub const HEALTH_METRICS: [&str; 5] = [
	"cpu_usage",
	"memory_usage",
	"response_time",
	"error_rate",
	"load",
];

/// Complete daemon configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FleetConfig {
	#[serde(default)]
	pub daemon: DaemonSettings,
	/// Instances to run per category
	#[serde(
		default,
		deserialize_with = "deserialize_category_map",
		serialize_with = "serialize_category_map"
	)]
	pub services: BTreeMap<ServiceCategory, ServiceSettings>,
	#[serde(default)]
	pub load_balancer: LoadBalancerConfig,
	#[serde(default)]
	pub monitoring: MonitoringConfig,
}

/// Process-wide daemon settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonSettings {
	pub host: String,
	pub log_level: String,
	/// Interval of the maintenance loop
	pub maintenance_interval_secs: u64,
	/// Pause between consecutive instance starts
	pub startup_stagger_ms: u64,
	/// Pause between stop and start during a restart
	pub restart_pause_ms: u64,
}

impl Default for DaemonSettings {
	fn default() -> Self {
		Self {
			host: "0.0.0.0".to_string(),
			log_level: "info".to_string(),
			maintenance_interval_secs: 30,
			startup_stagger_ms: 2000,
			restart_pause_ms: 1000,
		}
	}
}

/// Per-category instance settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSettings {
	pub instances: u32,
	/// Port of the first instance; further instances count up from here
	pub port_start: u16,
	/// Memory limit in MB
	pub memory_limit: u64,
	pub cpu_limit: f64,
	pub dependencies: Vec<ServiceCategory>,
	pub auto_restart: bool,
	pub startup_timeout_secs: u64,
	pub shutdown_timeout_secs: u64,
	pub health_check_interval_secs: u64,
}

impl Default for ServiceSettings {
	fn default() -> Self {
		Self {
			instances: 1,
			port_start: 8000,
			memory_limit: 512,
			cpu_limit: 0.5,
			dependencies: Vec::new(),
			auto_restart: true,
			startup_timeout_secs: 60,
			shutdown_timeout_secs: 30,
			health_check_interval_secs: 30,
		}
	}
}

impl ServiceSettings {
	fn sized(instances: u32, port_start: u16, memory_limit: u64, cpu_limit: f64) -> Self {
		Self {
			instances,
			port_start,
			memory_limit,
			cpu_limit,
			..Self::default()
		}
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
	pub strategy: BalancingStrategy,
	/// Seconds between rounds of the registry's liveness probing
	pub health_check_interval: u64,
	/// Consecutive probe failures tolerated before an instance is put in error
	pub failure_threshold: u32,
}

impl Default for LoadBalancerConfig {
	fn default() -> Self {
		Self {
			strategy: BalancingStrategy::RoundRobin,
			health_check_interval: 30,
			failure_threshold: 5,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ThresholdConfig {
	pub warning: f64,
	pub critical: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
	/// Seconds between health monitor cycles
	pub metrics_interval: u64,
	pub alerts_enabled: bool,
	pub log_level: String,
	/// Overrides of the built-in thresholds, keyed by metric name
	pub thresholds: BTreeMap<String, ThresholdConfig>,
}

impl Default for MonitoringConfig {
	fn default() -> Self {
		Self {
			metrics_interval: 60,
			alerts_enabled: true,
			log_level: "info".to_string(),
			thresholds: BTreeMap::new(),
		}
	}
}

impl Default for FleetConfig {
	fn default() -> Self {
		use ServiceCategory::*;

		let mut services = BTreeMap::new();
		services.insert(Relevance, ServiceSettings::sized(2, 8100, 512, 0.5));
		services.insert(Wisdom, ServiceSettings::sized(1, 8200, 1024, 1.0));
		services.insert(Rationality, ServiceSettings::sized(1, 8300, 512, 0.5));
		services.insert(Phenomenology, ServiceSettings::sized(1, 8400, 512, 0.5));
		services.insert(MeaningMaking, ServiceSettings::sized(1, 8500, 512, 0.5));
		services.insert(Integration, ServiceSettings::sized(1, 8600, 1024, 1.0));
		services.insert(
			SiliconSage,
			ServiceSettings {
				dependencies: vec![
					Relevance,
					Wisdom,
					Rationality,
					Phenomenology,
					MeaningMaking,
					Integration,
				],
				..ServiceSettings::sized(1, 8700, 2048, 2.0)
			},
		);

		Self {
			daemon: DaemonSettings::default(),
			services,
			load_balancer: LoadBalancerConfig::default(),
			monitoring: MonitoringConfig::default(),
		}
	}
}

impl FleetConfig {
	/// Total number of instances the configuration asks for.
	pub fn total_instances(&self) -> u32 {
		self.services.values().map(|s| s.instances).sum()
	}
}
