//! Monitoring and observability for the fleet daemon.
//!
//! # Components
//!
//! - `health`: periodic health classification of running instances,
//!   category and system roll-ups, alerting on classification changes
//! - `metrics`: simulated metrics and liveness sources used when no real
//!   instrumentation is plugged in
//! - `tracing`: subscriber setup shared by the binaries

pub mod health;
pub mod metrics;
pub mod tracing;

pub use health::{default_thresholds, evaluate_snapshot, HealthMonitor};
pub use metrics::{SimulatedMetricsProvider, SimulatedProbe};
pub use self::tracing::{init_tracing, TracingConfig};
