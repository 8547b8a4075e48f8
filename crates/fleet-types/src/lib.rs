//! Shared types for the fleet control plane.
//!
//! Everything the registry, load balancer, health monitor and orchestrator
//! exchange lives here, together with the traits through which the control
//! plane talks to its external collaborators (process drivers, probes,
//! metric sources and processing capabilities).

pub mod balancing;
pub mod capabilities;
pub mod category;
pub mod errors;
pub mod events;
pub mod health;
pub mod instance;
pub mod metrics;
pub mod request;

pub use balancing::*;
pub use capabilities::*;
pub use category::*;
pub use errors::*;
pub use events::*;
pub use health::*;
pub use instance::*;
pub use metrics::*;
pub use request::*;
