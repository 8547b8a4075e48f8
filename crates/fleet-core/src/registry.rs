//! Registry and lifecycle manager for service instances.
//!
//! The registry is the single owner of every [`ServiceInstance`]. It enforces
//! the instance state machine, gates starts on dependencies, delegates the
//! actual process work to an [`InstanceDriver`] and runs the periodic
//! liveness probing that drives automatic restarts.
//!
//! Status listeners run synchronously after the state lock is released, in
//! registration order, once per transition.

use chrono::Utc;
use dashmap::DashSet;
use fleet_config::FleetConfig;
use fleet_types::{
	FleetError, HealthProbe, InstanceConfig, InstanceDriver, InstanceHealth, InstanceId,
	InstanceStatus, ServiceCategory, ServiceInstance, StatusListener,
};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Tunables of the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryOptions {
	pub probe_interval: Duration,
	/// Pause between stop and start during a restart
	pub restart_pause: Duration,
	/// Consecutive probe failures at which a running instance is put in error
	pub failure_ceiling: u32,
}

impl Default for RegistryOptions {
	fn default() -> Self {
		Self {
			probe_interval: Duration::from_secs(10),
			restart_pause: Duration::from_secs(1),
			failure_ceiling: 5,
		}
	}
}

impl From<&FleetConfig> for RegistryOptions {
	fn from(config: &FleetConfig) -> Self {
		Self {
			probe_interval: Duration::from_secs(config.load_balancer.health_check_interval),
			restart_pause: Duration::from_millis(config.daemon.restart_pause_ms),
			failure_ceiling: config.load_balancer.failure_threshold,
		}
	}
}

/// Running and total instance counts of one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
	pub running: usize,
	pub total: usize,
}

#[derive(Default)]
struct RegistryState {
	instances: HashMap<InstanceId, ServiceInstance>,
	/// Registration order
	order: Vec<InstanceId>,
	by_category: HashMap<ServiceCategory, Vec<InstanceId>>,
	/// Ids of unregistered instances, never handed out again
	retired: HashSet<InstanceId>,
}

impl RegistryState {
	fn has_available(&self, category: ServiceCategory) -> bool {
		self.by_category
			.get(&category)
			.map(|ids| {
				ids.iter()
					.filter_map(|id| self.instances.get(id))
					.any(|i| i.is_available())
			})
			.unwrap_or(false)
	}

	fn get_mut(&mut self, instance_id: &str) -> Result<&mut ServiceInstance, FleetError> {
		self.instances
			.get_mut(instance_id)
			.ok_or_else(|| FleetError::InstanceNotFound(instance_id.to_string()))
	}
}

enum ProbeAction {
	Restart,
	Fail,
}

pub struct Registry {
	state: RwLock<RegistryState>,
	listeners: RwLock<Vec<Arc<dyn StatusListener>>>,
	restarts_in_flight: DashSet<InstanceId>,
	restart_tasks: Mutex<Vec<JoinHandle<()>>>,
	/// Set once the owner shuts down; no automatic restart may start after it
	quiesced: AtomicBool,
	driver: Arc<dyn InstanceDriver>,
	probe: Arc<dyn HealthProbe>,
	options: RegistryOptions,
}

impl Registry {
	pub fn new(
		driver: Arc<dyn InstanceDriver>,
		probe: Arc<dyn HealthProbe>,
		options: RegistryOptions,
	) -> Self {
		Self {
			state: RwLock::new(RegistryState::default()),
			listeners: RwLock::new(Vec::new()),
			restarts_in_flight: DashSet::new(),
			restart_tasks: Mutex::new(Vec::new()),
			quiesced: AtomicBool::new(false),
			driver,
			probe,
			options,
		}
	}

	pub fn options(&self) -> &RegistryOptions {
		&self.options
	}

	pub async fn add_status_listener(&self, listener: Arc<dyn StatusListener>) {
		self.listeners.write().await.push(listener);
	}

	async fn notify(&self, instance_id: &str, status: InstanceStatus) {
		let listeners = self.listeners.read().await.clone();
		for listener in listeners {
			let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
				listener.on_status_change(instance_id, status)
			}));
			match outcome {
				Ok(Ok(())) => {}
				Ok(Err(e)) => warn!(
					"Status listener failed for {} ({}): {}",
					instance_id, status, e
				),
				Err(_) => error!("Status listener panicked for {} ({})", instance_id, status),
			}
		}
	}

	/// Applies `to` if the state machine allows it, then notifies listeners.
	async fn transition<F>(
		&self,
		instance_id: &str,
		to: InstanceStatus,
		update: F,
	) -> Result<(), FleetError>
	where
		F: FnOnce(&mut ServiceInstance),
	{
		{
			let mut state = self.state.write().await;
			let instance = state.get_mut(instance_id)?;
			if !instance.status.can_transition_to(to) {
				return Err(FleetError::LifecycleTransition {
					instance_id: instance_id.to_string(),
					from: instance.status,
					to,
				});
			}
			instance.status = to;
			update(instance);
		}
		debug!("Instance {} is now {}", instance_id, to);
		self.notify(instance_id, to).await;
		Ok(())
	}

	/// Moves the instance to ERROR after a failed start or stop.
	async fn mark_failed(&self, instance_id: &str) {
		let result = self
			.transition(instance_id, InstanceStatus::Error, |i| {
				i.error_count += 1;
				i.health = InstanceHealth::Unhealthy;
			})
			.await;
		if let Err(e) = result {
			warn!("Could not mark {} as failed: {}", instance_id, e);
		}
	}

	/// Adds an instance in STOPPED state.
	pub async fn register(&self, config: InstanceConfig) -> Result<InstanceId, FleetError> {
		let mut state = self.state.write().await;
		let instance_id = config.instance_id.clone();

		if state.instances.contains_key(&instance_id) || state.retired.contains(&instance_id) {
			return Err(FleetError::DuplicateInstance(instance_id));
		}

		let category = config.category;
		state
			.instances
			.insert(instance_id.clone(), ServiceInstance::new(config));
		state.order.push(instance_id.clone());
		state
			.by_category
			.entry(category)
			.or_default()
			.push(instance_id.clone());

		info!("Registered {} instance {}", category, instance_id);
		Ok(instance_id)
	}

	/// Stops the instance if it is active, then forgets it. The id stays
	/// reserved.
	pub async fn unregister(&self, instance_id: &str) -> Result<(), FleetError> {
		let status = self
			.status(instance_id)
			.await
			.ok_or_else(|| FleetError::InstanceNotFound(instance_id.to_string()))?;

		if status.is_active() {
			if let Err(e) = self.stop(instance_id).await {
				warn!("Stopping {} before unregistering failed: {}", instance_id, e);
			}
		}

		let mut state = self.state.write().await;
		let instance = state
			.instances
			.remove(instance_id)
			.ok_or_else(|| FleetError::InstanceNotFound(instance_id.to_string()))?;
		state.order.retain(|id| id != instance_id);
		state.retired.insert(instance_id.to_string());
		if let Some(ids) = state.by_category.get_mut(&instance.category()) {
			ids.retain(|id| id != instance_id);
		}

		info!("Unregistered instance {}", instance_id);
		Ok(())
	}

	/// Starts a STOPPED instance whose dependencies are all available.
	///
	/// Rejections leave the instance untouched. A launch that fails or
	/// exceeds the startup timeout leaves it in ERROR.
	pub async fn start(&self, instance_id: &str) -> Result<(), FleetError> {
		let config = {
			let mut state = self.state.write().await;
			let instance = state.get_mut(instance_id)?;
			if instance.status != InstanceStatus::Stopped {
				return Err(FleetError::LifecycleTransition {
					instance_id: instance_id.to_string(),
					from: instance.status,
					to: InstanceStatus::Starting,
				});
			}
			let config = instance.config.clone();

			if let Some(missing) = config
				.dependencies
				.iter()
				.find(|dep| !state.has_available(**dep))
			{
				return Err(FleetError::DependencyUnmet {
					instance_id: instance_id.to_string(),
					category: *missing,
				});
			}

			state.get_mut(instance_id)?.status = InstanceStatus::Starting;
			config
		};
		self.notify(instance_id, InstanceStatus::Starting).await;
		info!("Starting {} instance {}", config.category, instance_id);

		let launch = tokio::time::timeout(config.startup_timeout, self.driver.launch(&config));
		let reason = match launch.await {
			Ok(Ok(pid)) => {
				let running = self
					.transition(instance_id, InstanceStatus::Running, |i| {
						i.process_id = Some(pid);
						i.start_time = Some(Utc::now());
						i.health = InstanceHealth::Healthy;
					})
					.await;
				return match running {
					Ok(()) => {
						info!("Instance {} running with pid {}", instance_id, pid);
						Ok(())
					}
					Err(e) => {
						warn!("Instance {} left STARTING during launch: {}", instance_id, e);
						self.terminate_orphan(&config, pid).await;
						Err(FleetError::StartFailed {
							instance_id: instance_id.to_string(),
							reason: format!("stopped while launching, pid {} terminated", pid),
						})
					}
				};
			}
			Ok(Err(e)) => e.to_string(),
			Err(_) => format!("startup timed out after {:?}", config.startup_timeout),
		};

		error!("Failed to start {}: {}", instance_id, reason);
		self.mark_failed(instance_id).await;
		Err(FleetError::StartFailed {
			instance_id: instance_id.to_string(),
			reason,
		})
	}

	/// Terminates a process whose instance was stopped or removed mid-launch.
	async fn terminate_orphan(&self, config: &InstanceConfig, pid: u32) {
		let terminate = self.driver.terminate(config, Some(pid));
		match tokio::time::timeout(config.shutdown_timeout, terminate).await {
			Ok(Ok(())) => debug!("Terminated orphaned pid {} of {}", pid, config.instance_id),
			Ok(Err(e)) => error!(
				"Could not terminate pid {} of {}: {}",
				pid, config.instance_id, e
			),
			Err(_) => error!(
				"Terminating pid {} of {} timed out after {:?}",
				pid, config.instance_id, config.shutdown_timeout
			),
		}
	}

	/// Stops a RUNNING or STARTING instance.
	pub async fn stop(&self, instance_id: &str) -> Result<(), FleetError> {
		let (config, pid) = {
			let mut state = self.state.write().await;
			let instance = state.get_mut(instance_id)?;
			if !instance.status.is_active() {
				return Err(FleetError::LifecycleTransition {
					instance_id: instance_id.to_string(),
					from: instance.status,
					to: InstanceStatus::Stopping,
				});
			}
			instance.status = InstanceStatus::Stopping;
			(instance.config.clone(), instance.process_id)
		};
		self.notify(instance_id, InstanceStatus::Stopping).await;
		info!("Stopping instance {}", instance_id);

		let reason = match tokio::time::timeout(
			config.shutdown_timeout,
			self.driver.terminate(&config, pid),
		)
		.await
		{
			Ok(Ok(())) => {
				self.transition(instance_id, InstanceStatus::Stopped, |i| {
					i.process_id = None;
					i.health = InstanceHealth::Unknown;
				})
				.await?;
				info!("Instance {} stopped", instance_id);
				return Ok(());
			}
			Ok(Err(e)) => e.to_string(),
			Err(_) => format!("shutdown timed out after {:?}", config.shutdown_timeout),
		};

		error!("Failed to stop {}: {}", instance_id, reason);
		self.mark_failed(instance_id).await;
		Err(FleetError::StopFailed {
			instance_id: instance_id.to_string(),
			reason,
		})
	}

	/// Stops the instance if it is active, pauses, and starts it again.
	pub async fn restart(&self, instance_id: &str) -> Result<(), FleetError> {
		let status = self
			.status(instance_id)
			.await
			.ok_or_else(|| FleetError::InstanceNotFound(instance_id.to_string()))?;

		info!("Restarting instance {}", instance_id);
		if status.is_active() {
			self.stop(instance_id).await?;
		}
		tokio::time::sleep(self.options.restart_pause).await;
		if self.quiesced.load(Ordering::SeqCst) {
			return Err(FleetError::StartFailed {
				instance_id: instance_id.to_string(),
				reason: "registry is shutting down".to_string(),
			});
		}
		self.start(instance_id).await?;

		let mut state = self.state.write().await;
		state.get_mut(instance_id)?.restart_count += 1;
		Ok(())
	}

	/// Operator action: clears an ERROR instance back to STOPPED.
	pub async fn recover(&self, instance_id: &str) -> Result<(), FleetError> {
		self.transition(instance_id, InstanceStatus::Stopped, |i| {
			i.error_count = 0;
			i.process_id = None;
			i.health = InstanceHealth::Unknown;
		})
		.await
	}

	/// Operator action: parks a STOPPED or ERROR instance.
	pub async fn enter_maintenance(&self, instance_id: &str) -> Result<(), FleetError> {
		self.transition(instance_id, InstanceStatus::Maintenance, |_| {})
			.await
	}

	pub async fn exit_maintenance(&self, instance_id: &str) -> Result<(), FleetError> {
		self.transition(instance_id, InstanceStatus::Stopped, |i| {
			i.health = InstanceHealth::Unknown;
		})
		.await
	}

	pub async fn get(&self, instance_id: &str) -> Option<ServiceInstance> {
		self.state.read().await.instances.get(instance_id).cloned()
	}

	pub async fn status(&self, instance_id: &str) -> Option<InstanceStatus> {
		self.state
			.read()
			.await
			.instances
			.get(instance_id)
			.map(|i| i.status)
	}

	/// Ids of a category in registration order.
	pub async fn ids_by_category(&self, category: ServiceCategory) -> Vec<InstanceId> {
		self.state
			.read()
			.await
			.by_category
			.get(&category)
			.cloned()
			.unwrap_or_default()
	}

	pub async fn instances_by_category(&self, category: ServiceCategory) -> Vec<ServiceInstance> {
		let state = self.state.read().await;
		state
			.by_category
			.get(&category)
			.map(|ids| {
				ids.iter()
					.filter_map(|id| state.instances.get(id).cloned())
					.collect()
			})
			.unwrap_or_default()
	}

	/// Running and healthy ids of a category, in registration order.
	pub async fn healthy_instances(&self, category: ServiceCategory) -> Vec<InstanceId> {
		let state = self.state.read().await;
		state
			.by_category
			.get(&category)
			.map(|ids| {
				ids.iter()
					.filter(|id| {
						state
							.instances
							.get(*id)
							.map(|i| i.is_available())
							.unwrap_or(false)
					})
					.cloned()
					.collect()
			})
			.unwrap_or_default()
	}

	pub async fn running_instances(&self) -> Vec<ServiceInstance> {
		let state = self.state.read().await;
		state
			.order
			.iter()
			.filter_map(|id| state.instances.get(id))
			.filter(|i| i.status == InstanceStatus::Running)
			.cloned()
			.collect()
	}

	/// Every instance in registration order.
	pub async fn all_instances(&self) -> Vec<ServiceInstance> {
		let state = self.state.read().await;
		state
			.order
			.iter()
			.filter_map(|id| state.instances.get(id).cloned())
			.collect()
	}

	/// Running/total counts for every category.
	pub async fn category_summary(&self) -> BTreeMap<ServiceCategory, CategorySummary> {
		let state = self.state.read().await;
		ServiceCategory::ALL
			.iter()
			.map(|category| {
				let ids = state.by_category.get(category);
				let total = ids.map(|ids| ids.len()).unwrap_or(0);
				let running = ids
					.map(|ids| {
						ids.iter()
							.filter_map(|id| state.instances.get(id))
							.filter(|i| i.status == InstanceStatus::Running)
							.count()
					})
					.unwrap_or(0);
				(*category, CategorySummary { running, total })
			})
			.collect()
	}

	/// Probes every running instance that is due and reacts to the outcome.
	///
	/// An instance is due once its own health check interval has passed
	/// since its last probe. Probes run concurrently and without the state
	/// lock. A failed probe counts as unhealthy.
	pub async fn check_health(self: &Arc<Self>) {
		// Half a tick of slack so an interval equal to the tick is never skipped.
		let slack = self.options.probe_interval / 2;
		let now = Utc::now();
		let running: Vec<InstanceConfig> = self
			.running_instances()
			.await
			.into_iter()
			.filter(|i| match i.last_health_check {
				None => true,
				Some(last) => (now - last)
					.to_std()
					.map(|elapsed| elapsed + slack >= i.config.health_check_interval)
					.unwrap_or(true),
			})
			.map(|i| i.config)
			.collect();

		let outcomes = join_all(running.iter().map(|config| async move {
			match self.probe.probe(config).await {
				Ok(healthy) => healthy,
				Err(e) => {
					warn!("Health probe for {} failed: {}", config.instance_id, e);
					false
				}
			}
		}))
		.await;

		for (config, healthy) in running.iter().zip(outcomes) {
			self.apply_probe(&config.instance_id, healthy).await;
		}
	}

	async fn apply_probe(self: &Arc<Self>, instance_id: &str, healthy: bool) {
		let action = {
			let mut state = self.state.write().await;
			let Some(instance) = state.instances.get_mut(instance_id) else {
				return;
			};
			// Changed under our feet while probing.
			if instance.status != InstanceStatus::Running {
				return;
			}
			instance.last_health_check = Some(Utc::now());

			if healthy {
				instance.error_count = instance.error_count.saturating_sub(1);
				instance.health = InstanceHealth::Healthy;
				None
			} else {
				instance.error_count += 1;
				instance.health = InstanceHealth::Unhealthy;
				warn!(
					"Instance {} failed its health check ({} consecutive)",
					instance_id, instance.error_count
				);
				if instance.error_count >= self.options.failure_ceiling {
					instance.status = InstanceStatus::Error;
					Some(ProbeAction::Fail)
				} else if instance.config.auto_restart {
					Some(ProbeAction::Restart)
				} else {
					None
				}
			}
		};

		match action {
			Some(ProbeAction::Fail) => {
				error!(
					"Instance {} reached {} failures, marking as error",
					instance_id, self.options.failure_ceiling
				);
				self.notify(instance_id, InstanceStatus::Error).await;
			}
			Some(ProbeAction::Restart) => self.spawn_restart(instance_id).await,
			None => {}
		}
	}

	/// Restarts on a separate task, at most one in flight per instance.
	async fn spawn_restart(self: &Arc<Self>, instance_id: &str) {
		// Checked under the task lock so `quiesce` either sees the task or
		// the task never exists.
		let mut tasks = self.restart_tasks.lock().await;
		if self.quiesced.load(Ordering::SeqCst) {
			debug!("Not restarting {}, registry is shutting down", instance_id);
			return;
		}
		if !self.restarts_in_flight.insert(instance_id.to_string()) {
			debug!("Restart of {} already in flight", instance_id);
			return;
		}

		let registry = Arc::clone(self);
		let instance_id = instance_id.to_string();
		let handle = tokio::spawn(async move {
			if let Err(e) = registry.restart(&instance_id).await {
				error!("Automatic restart of {} failed: {}", instance_id, e);
			}
			registry.restarts_in_flight.remove(&instance_id);
		});

		tasks.retain(|task| !task.is_finished());
		tasks.push(handle);
	}

	/// Refuses further automatic restarts and waits for the ones in flight.
	///
	/// A restart still pausing gives up before starting again, so once this
	/// returns no instance comes back to life on its own.
	pub async fn quiesce(&self) {
		self.quiesced.store(true, Ordering::SeqCst);
		let tasks = std::mem::take(&mut *self.restart_tasks.lock().await);
		for result in join_all(tasks).await {
			if let Err(e) = result {
				warn!("Restart task ended abnormally: {}", e);
			}
		}
	}

	pub fn restart_in_flight(&self, instance_id: &str) -> bool {
		self.restarts_in_flight.contains(instance_id)
	}

	/// Runs [`Registry::check_health`] every probe interval until shutdown.
	pub fn start_monitoring(
		self: &Arc<Self>,
		mut shutdown: broadcast::Receiver<()>,
	) -> JoinHandle<()> {
		let registry = Arc::clone(self);
		let period = self.options.probe_interval;

		tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			// The first tick completes immediately.
			interval.tick().await;

			loop {
				tokio::select! {
					_ = interval.tick() => registry.check_health().await,
					_ = shutdown.recv() => {
						info!("Registry monitoring stopped");
						break;
					}
				}
			}
		})
	}
}
