//! Error types for the fleet control plane.

use crate::category::ServiceCategory;
use crate::instance::InstanceStatus;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FleetError>;

#[derive(Error, Debug)]
pub enum FleetError {
	#[error("Instance already registered: {0}")]
	DuplicateInstance(String),

	#[error("Instance not found: {0}")]
	InstanceNotFound(String),

	#[error("Instance {instance_id} cannot go from {from} to {to}")]
	LifecycleTransition {
		instance_id: String,
		from: InstanceStatus,
		to: InstanceStatus,
	},

	#[error("Instance {instance_id} depends on {category}, which has no healthy running instance")]
	DependencyUnmet {
		instance_id: String,
		category: ServiceCategory,
	},

	#[error("Failed to start {instance_id}: {reason}")]
	StartFailed {
		instance_id: String,
		reason: String,
	},

	#[error("Failed to stop {instance_id}: {reason}")]
	StopFailed {
		instance_id: String,
		reason: String,
	},

	#[error("{operation} timed out after {timeout:?}")]
	Timeout {
		operation: String,
		timeout: Duration,
	},

	#[error("No healthy instance for category {0}")]
	NoHealthyInstance(ServiceCategory),

	#[error("Pipeline step {category} on {instance_id} failed: {reason}")]
	PipelineStep {
		category: ServiceCategory,
		instance_id: String,
		reason: String,
	},

	#[error("Health probe error: {0}")]
	HealthProbe(String),

	#[error("Metrics error: {0}")]
	Metrics(String),

	#[error("Capability error: {0}")]
	Capability(String),

	#[error("Invalid request: {0}")]
	InvalidRequest(String),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}
