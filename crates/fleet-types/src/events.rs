use crate::category::ServiceCategory;
use crate::health::HealthStatus;
use crate::instance::{InstanceId, InstanceStatus};
use serde::{Deserialize, Serialize};

/// Events broadcast on the fleet event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FleetEvent {
	Instance(InstanceEvent),
	Health(HealthEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InstanceEvent {
	StatusChanged {
		instance_id: InstanceId,
		status: InstanceStatus,
	},
	Scaled {
		category: ServiceCategory,
		instances: usize,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HealthEvent {
	Alert {
		instance_id: InstanceId,
		status: HealthStatus,
		issues: Vec<String>,
	},
}
