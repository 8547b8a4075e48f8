//! Concrete implementations of the collaborator traits.
//!
//! The daemon runs without real processes or instrumentation. The types in
//! here stand in for them so a fleet can be brought up end to end.

/// Simulated process launching.
pub mod driver;
/// Built-in per-category processing capabilities.
pub mod processors;
