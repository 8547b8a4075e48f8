//! Traits through which the control plane reaches its collaborators.
//!
//! Nothing in the control plane launches processes, probes sockets or does
//! domain processing itself. Those jobs sit behind the traits below so that
//! the daemon can plug in simulated collaborators and tests can plug in
//! scripted ones.

use crate::errors::FleetError;
use crate::health::{HealthReport, HealthStatus};
use crate::instance::{InstanceConfig, InstanceStatus};
use crate::metrics::MetricsSnapshot;
use crate::request::{ProcessingRequest, ResultMap};
use async_trait::async_trait;

/// Launches and terminates the process behind an instance.
#[async_trait]
pub trait InstanceDriver: Send + Sync {
	/// Launches the instance and returns its process id.
	async fn launch(&self, config: &InstanceConfig) -> Result<u32, FleetError>;

	async fn terminate(&self, config: &InstanceConfig, pid: Option<u32>) -> Result<(), FleetError>;
}

/// Liveness check used by the registry's monitoring loop.
#[async_trait]
pub trait HealthProbe: Send + Sync {
	async fn probe(&self, config: &InstanceConfig) -> Result<bool, FleetError>;
}

/// Source of resource and performance readings for an instance.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
	async fn snapshot(&self, config: &InstanceConfig) -> Result<MetricsSnapshot, FleetError>;
}

/// The domain capability of one category.
#[async_trait]
pub trait Processor: Send + Sync {
	/// Processes `request`, seeing whatever earlier pipeline steps produced.
	async fn process(
		&self,
		request: &ProcessingRequest,
		intermediate: &ResultMap,
	) -> Result<ResultMap, FleetError>;
}

/// Notified after every instance status transition.
///
/// Errors and panics are logged by the caller and never reach the lifecycle
/// operation that triggered the call.
pub trait StatusListener: Send + Sync {
	fn on_status_change(&self, instance_id: &str, status: InstanceStatus) -> anyhow::Result<()>;
}

impl<F> StatusListener for F
where
	F: Fn(&str, InstanceStatus) -> anyhow::Result<()> + Send + Sync,
{
	fn on_status_change(&self, instance_id: &str, status: InstanceStatus) -> anyhow::Result<()> {
		self(instance_id, status)
	}
}

/// Notified when an instance's health classification changes. Errors and
/// panics are logged and isolated from the health cycle.
pub trait AlertListener: Send + Sync {
	fn on_alert(
		&self,
		instance_id: &str,
		status: HealthStatus,
		report: &HealthReport,
	) -> anyhow::Result<()>;
}

impl<F> AlertListener for F
where
	F: Fn(&str, HealthStatus, &HealthReport) -> anyhow::Result<()> + Send + Sync,
{
	fn on_alert(
		&self,
		instance_id: &str,
		status: HealthStatus,
		report: &HealthReport,
	) -> anyhow::Result<()> {
		self(instance_id, status, report)
	}
}
