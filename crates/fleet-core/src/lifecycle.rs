// fleet-core/src/lifecycle.rs

use crate::error::CoreError;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

/// Lifecycle of the daemon as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum LifecycleState {
	Uninitialized,
	Initializing,
	Running,
	Stopping,
	Stopped,
	Failed,
}

impl std::fmt::Display for LifecycleState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Uninitialized => write!(f, "Uninitialized"),
			Self::Initializing => write!(f, "Initializing"),
			Self::Running => write!(f, "Running"),
			Self::Stopping => write!(f, "Stopping"),
			Self::Stopped => write!(f, "Stopped"),
			Self::Failed => write!(f, "Failed"),
		}
	}
}

/// Tracks the daemon state and owns the shutdown channel every background
/// loop listens on.
pub struct LifecycleManager {
	state: RwLock<LifecycleState>,
	shutdown_tx: broadcast::Sender<()>,
	shutdown_requested: AtomicBool,
}

impl LifecycleManager {
	pub fn new() -> Self {
		let (shutdown_tx, _) = broadcast::channel(16);

		Self {
			state: RwLock::new(LifecycleState::Uninitialized),
			shutdown_tx,
			shutdown_requested: AtomicBool::new(false),
		}
	}

	pub async fn state(&self) -> LifecycleState {
		*self.state.read().await
	}

	pub async fn set_state(&self, new_state: LifecycleState) -> Result<(), CoreError> {
		let mut state = self.state.write().await;
		let old_state = *state;

		if !Self::is_valid_transition(old_state, new_state) {
			return Err(CoreError::Lifecycle(format!(
				"Invalid state transition from {} to {}",
				old_state, new_state
			)));
		}

		*state = new_state;
		info!("Daemon state changed: {} -> {}", old_state, new_state);

		Ok(())
	}

	pub async fn initialize(&self) -> Result<(), CoreError> {
		self.set_state(LifecycleState::Initializing).await
	}

	pub async fn start(&self) -> Result<(), CoreError> {
		self.set_state(LifecycleState::Running).await
	}

	pub async fn fail(&self) -> Result<(), CoreError> {
		self.set_state(LifecycleState::Failed).await
	}

	/// Signals every subscriber to stop without touching the state.
	///
	/// Safe to call from signal handlers and more than once.
	pub fn request_shutdown(&self) {
		if !self.shutdown_requested.swap(true, Ordering::SeqCst) {
			info!("Shutdown requested");
		}
		let _ = self.shutdown_tx.send(());
	}

	pub fn shutdown_requested(&self) -> bool {
		self.shutdown_requested.load(Ordering::SeqCst)
	}

	/// Running -> Stopping, signal the loops, then Stopped.
	pub async fn shutdown(&self) -> Result<(), CoreError> {
		self.set_state(LifecycleState::Stopping).await?;
		self.request_shutdown();
		self.set_state(LifecycleState::Stopped).await?;
		Ok(())
	}

	pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
		self.shutdown_tx.subscribe()
	}

	fn is_valid_transition(from: LifecycleState, to: LifecycleState) -> bool {
		use LifecycleState::*;

		match (from, to) {
			(Uninitialized, Initializing) => true,
			(Initializing, Running) => true,
			(Running, Stopping) => true,
			(Stopping, Stopped) => true,
			(Failed, Failed) => false,
			(_, Failed) => true,
			_ => false,
		}
	}

	pub async fn is_running(&self) -> bool {
		*self.state.read().await == LifecycleState::Running
	}

	pub async fn is_stopped(&self) -> bool {
		matches!(
			*self.state.read().await,
			LifecycleState::Stopped | LifecycleState::Failed
		)
	}
}

impl Default for LifecycleManager {
	fn default() -> Self {
		Self::new()
	}
}
