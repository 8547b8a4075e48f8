//! Control-plane core: instance registry, load balancer, orchestrator,
//! event bus and daemon lifecycle.

pub mod balancer;
pub mod error;
pub mod event_bus;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;

#[cfg(test)]
mod testing;

pub use balancer::LoadBalancer;
pub use error::CoreError;
pub use event_bus::EventBus;
pub use lifecycle::{LifecycleManager, LifecycleState};
pub use orchestrator::{
	estimate_complexity, CapabilityTable, Orchestrator, ProcessingStats, RoutingTable,
};
pub use registry::{CategorySummary, Registry, RegistryOptions};
