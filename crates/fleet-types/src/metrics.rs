//! Performance samples and external metric readings.

use crate::instance::InstanceId;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Rolling per-instance metrics kept by the load balancer.
#[derive(Debug, Clone)]
pub struct PerformanceSample {
	pub instance_id: InstanceId,
	pub current_connections: u32,
	pub total_requests: u64,
	/// Smoothed average response time in milliseconds
	pub average_response_time: f64,
	/// Smoothed error rate in `[0, 1]`
	pub error_rate: f64,
	pub cpu_usage: f64,
	pub memory_usage: f64,
	/// Domain-specific load scalar
	pub load: f64,
	pub last_updated: Instant,
}

impl PerformanceSample {
	pub fn new(instance_id: impl Into<InstanceId>) -> Self {
		Self {
			instance_id: instance_id.into(),
			current_connections: 0,
			total_requests: 0,
			average_response_time: 0.0,
			error_rate: 0.0,
			cpu_usage: 0.0,
			memory_usage: 0.0,
			load: 0.0,
			last_updated: Instant::now(),
		}
	}
}

/// One reading of an instance's metrics from an external source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
	/// CPU utilisation in percent
	pub cpu_usage: f64,
	/// Memory utilisation in percent
	pub memory_usage: f64,
	/// Average response time in milliseconds
	pub avg_response_time: f64,
	pub error_rate: f64,
	pub load: f64,
	pub connections: u32,
	#[serde(default)]
	pub total_requests: u64,
}
