//! The fleet daemon service.
//!
//! # Components
//!
//! - `cli`: command-line interface of the `fleetd` binary
//! - `daemon`: construction, startup, background loops, shutdown and the
//!   operator control surface
//! - `implementations`: simulated driver and the built-in processors

pub mod cli;
pub mod daemon;
pub mod implementations;

pub use daemon::{
	load_or_default, CategoryOutcome, CategoryStatus, Collaborators, Daemon, DaemonContext,
	DaemonStatus,
};
