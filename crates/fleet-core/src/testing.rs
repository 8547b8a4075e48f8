//! Scripted collaborators shared by the unit tests of this crate.

use async_trait::async_trait;
use fleet_types::{
	FleetError, HealthProbe, InstanceConfig, InstanceDriver, InstanceId, InstanceStatus,
	ProcessingRequest, Processor, ResultMap, StatusListener,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Launches succeed with increasing pids unless the instance id is marked
/// as failing.
#[derive(Default)]
pub struct ScriptedDriver {
	next_pid: AtomicU32,
	failing: Mutex<HashSet<InstanceId>>,
	launch_delay: Option<Duration>,
	pub launches: AtomicU32,
	pub terminations: AtomicU32,
	pub terminated_pids: Mutex<Vec<Option<u32>>>,
}

impl ScriptedDriver {
	pub fn new() -> Self {
		Self {
			next_pid: AtomicU32::new(1000),
			..Default::default()
		}
	}

	pub fn slow(delay: Duration) -> Self {
		Self {
			launch_delay: Some(delay),
			..Self::new()
		}
	}

	pub fn fail_launch(&self, instance_id: &str) {
		self.failing.lock().unwrap().insert(instance_id.to_string());
	}
}

#[async_trait]
impl InstanceDriver for ScriptedDriver {
	async fn launch(&self, config: &InstanceConfig) -> Result<u32, FleetError> {
		self.launches.fetch_add(1, Ordering::SeqCst);
		if let Some(delay) = self.launch_delay {
			tokio::time::sleep(delay).await;
		}
		if self.failing.lock().unwrap().contains(&config.instance_id) {
			return Err(FleetError::Other(anyhow::anyhow!("launch refused")));
		}
		Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
	}

	async fn terminate(
		&self,
		_config: &InstanceConfig,
		pid: Option<u32>,
	) -> Result<(), FleetError> {
		self.terminations.fetch_add(1, Ordering::SeqCst);
		self.terminated_pids.lock().unwrap().push(pid);
		Ok(())
	}
}

/// Reports healthy unless the instance id is marked as unhealthy.
#[derive(Default)]
pub struct ScriptedProbe {
	unhealthy: Mutex<HashSet<InstanceId>>,
}

impl ScriptedProbe {
	pub fn set_healthy(&self, instance_id: &str, healthy: bool) {
		let mut unhealthy = self.unhealthy.lock().unwrap();
		if healthy {
			unhealthy.remove(instance_id);
		} else {
			unhealthy.insert(instance_id.to_string());
		}
	}
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
	async fn probe(&self, config: &InstanceConfig) -> Result<bool, FleetError> {
		Ok(!self.unhealthy.lock().unwrap().contains(&config.instance_id))
	}
}

/// Records every status change it is told about.
#[derive(Default)]
pub struct RecordingListener {
	pub events: Mutex<Vec<(InstanceId, InstanceStatus)>>,
}

impl RecordingListener {
	pub fn statuses_of(&self, instance_id: &str) -> Vec<InstanceStatus> {
		self.events
			.lock()
			.unwrap()
			.iter()
			.filter(|(id, _)| id == instance_id)
			.map(|(_, s)| *s)
			.collect()
	}
}

impl StatusListener for RecordingListener {
	fn on_status_change(&self, instance_id: &str, status: InstanceStatus) -> anyhow::Result<()> {
		self.events
			.lock()
			.unwrap()
			.push((instance_id.to_string(), status));
		Ok(())
	}
}

/// Returns a fixed map, or fails when built with [`FixedProcessor::failing`].
pub struct FixedProcessor {
	result: Option<ResultMap>,
}

impl FixedProcessor {
	pub fn new(pairs: &[(&str, Value)]) -> Arc<Self> {
		let result = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.clone()))
			.collect();
		Arc::new(Self {
			result: Some(result),
		})
	}

	pub fn failing() -> Arc<Self> {
		Arc::new(Self { result: None })
	}
}

#[async_trait]
impl Processor for FixedProcessor {
	async fn process(
		&self,
		_request: &ProcessingRequest,
		_intermediate: &ResultMap,
	) -> Result<ResultMap, FleetError> {
		self.result
			.clone()
			.ok_or_else(|| FleetError::Capability("processor exploded".into()))
	}
}
