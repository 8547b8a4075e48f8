//! Simulated process launching.

use async_trait::async_trait;
use fleet_types::{FleetError, InstanceConfig, InstanceDriver};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info};

const FIRST_PID: u32 = 10_000;

/// Hands out increasing pseudo process ids after an optional delay.
pub struct SimulatedDriver {
	next_pid: AtomicU32,
	launch_delay: Duration,
}

impl SimulatedDriver {
	pub fn new() -> Self {
		Self::with_launch_delay(Duration::ZERO)
	}

	pub fn with_launch_delay(launch_delay: Duration) -> Self {
		Self {
			next_pid: AtomicU32::new(FIRST_PID),
			launch_delay,
		}
	}
}

impl Default for SimulatedDriver {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl InstanceDriver for SimulatedDriver {
	async fn launch(&self, config: &InstanceConfig) -> Result<u32, FleetError> {
		if !self.launch_delay.is_zero() {
			tokio::time::sleep(self.launch_delay).await;
		}
		let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
		info!(
			"Launched {} on {} (pid {}, {} MB, {} cpu)",
			config.instance_id,
			config.address(),
			pid,
			config.memory_limit,
			config.cpu_limit
		);
		Ok(pid)
	}

	async fn terminate(&self, config: &InstanceConfig, pid: Option<u32>) -> Result<(), FleetError> {
		debug!("Terminated {} (pid {:?})", config.instance_id, pid);
		Ok(())
	}
}
