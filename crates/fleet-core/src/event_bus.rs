//! Broadcast bus for fleet events.
//!
//! Status-change and health-alert listeners publish here so that any number
//! of tasks (event logging, tests, future exporters) can follow what happens
//! to the fleet without being wired into the registry or the monitor.

use fleet_types::FleetEvent;
use tokio::sync::broadcast;

/// Event bus for broadcasting fleet events to multiple subscribers.
///
/// Cloning creates another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<FleetEvent>,
}

impl EventBus {
	/// Creates a bus buffering at most `capacity` events per lagging subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Subscribers only see events published after they subscribed.
	pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: FleetEvent,
	) -> Result<(), broadcast::error::SendError<FleetEvent>> {
		self.sender.send(event)?;
		Ok(())
	}

	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}
