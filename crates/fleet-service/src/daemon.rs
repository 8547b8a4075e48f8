//! The fleet daemon.
//!
//! Wires the registry, load balancer, health monitor and orchestrator
//! together, brings the configured fleet up in dependency order, keeps the
//! background loops running and exposes the operator control surface.

use crate::implementations::driver::SimulatedDriver;
use crate::implementations::processors::builtin_capabilities;
use anyhow::{anyhow, Context, Result};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use fleet_config::{
	load_config, startup_order, ConfigError, ConfigLoader, FleetConfig, ServiceSettings,
};
use fleet_core::{
	CapabilityTable, CategorySummary, EventBus, LifecycleManager, LifecycleState, LoadBalancer,
	Orchestrator, ProcessingStats, Registry, RegistryOptions, RoutingTable,
};
use fleet_monitoring::{HealthMonitor, SimulatedMetricsProvider, SimulatedProbe};
use fleet_types::{
	AlertListener, BalancingStrategy, FleetError, FleetEvent, HealthEvent, HealthProbe,
	HealthReport, HealthStatus, InstanceConfig, InstanceDriver, InstanceEvent, InstanceId,
	InstanceStatus, MetricsProvider, ResultMap, ServiceCategory, ServiceInstance, StatusListener,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

const EVENT_CAPACITY: usize = 256;

/// The pluggable collaborators of a daemon.
pub struct Collaborators {
	pub driver: Arc<dyn InstanceDriver>,
	pub probe: Arc<dyn HealthProbe>,
	pub metrics: Arc<dyn MetricsProvider>,
	pub capabilities: CapabilityTable,
}

impl Collaborators {
	/// Simulated processes, probes and metrics with the canned processors.
	pub fn simulated() -> Self {
		Self {
			driver: Arc::new(SimulatedDriver::new()),
			probe: Arc::new(SimulatedProbe::default()),
			metrics: Arc::new(SimulatedMetricsProvider::new()),
			capabilities: builtin_capabilities(),
		}
	}
}

/// Handle used to ask a running daemon to shut down.
///
/// Cheap to clone and safe to use from signal handlers.
#[derive(Clone)]
pub struct DaemonContext {
	lifecycle: Arc<LifecycleManager>,
}

impl DaemonContext {
	pub fn request_shutdown(&self) {
		self.lifecycle.request_shutdown();
	}

	pub fn shutdown_requested(&self) -> bool {
		self.lifecycle.shutdown_requested()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<()> {
		self.lifecycle.subscribe_shutdown()
	}
}

/// Aggregate view returned by [`Daemon::status`].
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
	pub state: LifecycleState,
	pub started_at: Option<DateTime<Utc>>,
	pub uptime_secs: i64,
	pub strategy: BalancingStrategy,
	pub categories: BTreeMap<ServiceCategory, CategorySummary>,
	pub system_health: HealthReport,
	pub processing: ProcessingStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryStatus {
	pub category: ServiceCategory,
	pub running: usize,
	pub total: usize,
	pub instances: Vec<ServiceInstance>,
	pub health: HealthReport,
	/// Percent of in-flight requests per instance
	pub load_distribution: BTreeMap<InstanceId, f64>,
}

/// Per-instance outcome of a category-wide operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryOutcome {
	pub succeeded: Vec<InstanceId>,
	pub failed: BTreeMap<InstanceId, String>,
}

impl CategoryOutcome {
	fn record(&mut self, instance_id: &str, result: Result<(), FleetError>) {
		match result {
			Ok(()) => self.succeeded.push(instance_id.to_string()),
			Err(e) => {
				warn!("{}: {}", instance_id, e);
				self.failed.insert(instance_id.to_string(), e.to_string());
			}
		}
	}

	pub fn is_success(&self) -> bool {
		self.failed.is_empty()
	}
}

/// Republishes registry and health notifications on the event bus.
struct EventForwarder {
	events: EventBus,
}

impl StatusListener for EventForwarder {
	fn on_status_change(&self, instance_id: &str, status: InstanceStatus) -> anyhow::Result<()> {
		// No subscribers is not an error.
		let _ = self.events.publish(FleetEvent::Instance(InstanceEvent::StatusChanged {
			instance_id: instance_id.to_string(),
			status,
		}));
		Ok(())
	}
}

impl AlertListener for EventForwarder {
	fn on_alert(
		&self,
		instance_id: &str,
		status: HealthStatus,
		report: &HealthReport,
	) -> anyhow::Result<()> {
		let _ = self.events.publish(FleetEvent::Health(HealthEvent::Alert {
			instance_id: instance_id.to_string(),
			status,
			issues: report.issues.clone(),
		}));
		Ok(())
	}
}

/// Loads the configuration, falling back to the built-in default when it is
/// missing or invalid.
///
/// Without a path the standard locations are searched.
pub fn load_or_default(path: Option<&Path>) -> FleetConfig {
	let loaded = match path {
		Some(path) => ConfigLoader::new().with_file(path).load(),
		None => load_config(),
	};

	match loaded {
		Ok(config) => config,
		Err(e) => {
			warn!("Failed to load configuration ({}), using built-in defaults", e);
			FleetConfig::default()
		}
	}
}

/// Instance configuration for the `index`-th instance of a category.
fn instance_config(
	category: ServiceCategory,
	settings: &ServiceSettings,
	index: u32,
) -> Result<InstanceConfig, FleetError> {
	let port = u32::from(settings.port_start) + index;
	let port = u16::try_from(port).map_err(|_| {
		FleetError::InvalidRequest(format!(
			"{} instance {} would need port {}",
			category,
			index + 1,
			port
		))
	})?;

	let config = InstanceConfig::new(category)
		.with_port(port)
		.with_limits(settings.memory_limit, settings.cpu_limit)
		.with_dependencies(settings.dependencies.clone())
		.with_auto_restart(settings.auto_restart)
		.with_timeouts(
			Duration::from_secs(settings.startup_timeout_secs),
			Duration::from_secs(settings.shutdown_timeout_secs),
		)
		.with_health_check_interval(Duration::from_secs(settings.health_check_interval_secs));
	Ok(config)
}

pub struct Daemon {
	config_path: Option<PathBuf>,
	config: ArcSwap<FleetConfig>,
	lifecycle: Arc<LifecycleManager>,
	events: EventBus,
	registry: Arc<Registry>,
	balancer: Arc<LoadBalancer>,
	monitor: Arc<HealthMonitor>,
	orchestrator: Arc<Orchestrator>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
	started_at: Mutex<Option<DateTime<Utc>>>,
}

impl Daemon {
	/// Creates a daemon with simulated collaborators.
	#[instrument(skip_all, fields(config = ?config_path))]
	pub async fn new(config_path: Option<PathBuf>) -> Result<Self> {
		let config = load_or_default(config_path.as_deref());
		Self::with_collaborators(config, config_path, Collaborators::simulated()).await
	}

	/// Builds every component and registers the configured instances.
	#[instrument(skip_all)]
	pub async fn with_collaborators(
		config: FleetConfig,
		config_path: Option<PathBuf>,
		collaborators: Collaborators,
	) -> Result<Self> {
		info!(
			"Initializing fleet daemon with {} categories and {} instances",
			config.services.len(),
			config.total_instances()
		);

		let lifecycle = Arc::new(LifecycleManager::new());
		let events = EventBus::new(EVENT_CAPACITY);
		let registry = Arc::new(Registry::new(
			collaborators.driver,
			collaborators.probe,
			RegistryOptions::from(&config),
		));
		let balancer = Arc::new(LoadBalancer::new(
			registry.clone(),
			config.load_balancer.strategy,
		));
		let monitor = Arc::new(HealthMonitor::new(
			registry.clone(),
			collaborators.metrics,
			&config.monitoring,
		));
		let orchestrator = Arc::new(Orchestrator::new(
			registry.clone(),
			balancer.clone(),
			collaborators.capabilities,
			RoutingTable::default(),
		));

		let forwarder = Arc::new(EventForwarder {
			events: events.clone(),
		});
		registry.add_status_listener(forwarder.clone()).await;
		monitor.add_alert_listener(forwarder).await;

		let daemon = Self {
			config_path,
			config: ArcSwap::from_pointee(config),
			lifecycle,
			events,
			registry,
			balancer,
			monitor,
			orchestrator,
			tasks: Mutex::new(Vec::new()),
			started_at: Mutex::new(None),
		};
		daemon
			.register_instances()
			.await
			.context("Failed to register configured instances")?;

		Ok(daemon)
	}

	async fn register_instances(&self) -> Result<(), FleetError> {
		let config = self.config.load_full();
		for (category, settings) in &config.services {
			for index in 0..settings.instances {
				let instance_id = self
					.registry
					.register(instance_config(*category, settings, index)?)
					.await?;
				debug!("Registered {} instance {}: {}", category, index + 1, instance_id);
			}
		}
		Ok(())
	}

	pub fn context(&self) -> DaemonContext {
		DaemonContext {
			lifecycle: self.lifecycle.clone(),
		}
	}

	/// Spawns the background loops and starts every instance in dependency
	/// order, pausing between starts.
	///
	/// Individual instance failures are logged and do not fail the call.
	pub async fn start(self: &Arc<Self>) -> Result<()> {
		self.lifecycle.initialize().await?;

		if let Err(e) = self.bring_up().await {
			error!("Failed to start fleet daemon: {:#}", e);
			self.lifecycle.request_shutdown();
			self.lifecycle.fail().await?;
			return Err(e);
		}

		*self.started_at.lock().await = Some(Utc::now());
		self.lifecycle.start().await?;
		info!("Fleet daemon started");
		Ok(())
	}

	async fn bring_up(self: &Arc<Self>) -> Result<()> {
		let config = self.config.load_full();
		let order = startup_order(&config).context("Failed to order categories")?;

		{
			let mut tasks = self.tasks.lock().await;
			tasks.push(
				self.registry
					.start_monitoring(self.lifecycle.subscribe_shutdown()),
			);
			tasks.push(self.monitor.start(self.lifecycle.subscribe_shutdown()));
			tasks.push(self.spawn_event_logger());
			tasks.push(self.spawn_maintenance());
		}

		let stagger = Duration::from_millis(config.daemon.startup_stagger_ms);
		for category in order {
			for instance_id in self.registry.ids_by_category(category).await {
				if self.lifecycle.shutdown_requested() {
					warn!("Shutdown requested during startup, skipping remaining instances");
					return Ok(());
				}
				match self.registry.start(&instance_id).await {
					Ok(()) => info!("Started {} instance {}", category, instance_id),
					Err(e) => error!(
						"Failed to start {} instance {}: {}",
						category, instance_id, e
					),
				}
				if !stagger.is_zero() {
					tokio::time::sleep(stagger).await;
				}
			}
		}
		Ok(())
	}

	/// Starts the fleet, waits for a shutdown request and shuts down.
	pub async fn run(self: &Arc<Self>) -> Result<()> {
		let mut shutdown = self.lifecycle.subscribe_shutdown();
		self.start().await?;

		if !self.lifecycle.shutdown_requested() {
			let _ = shutdown.recv().await;
		}
		info!("Shutdown requested, stopping fleet");
		self.shutdown().await
	}

	/// Stops every active instance, then the background loops.
	///
	/// Pending automatic restarts are settled first so none of them can
	/// bring an instance back after it was stopped.
	pub async fn shutdown(&self) -> Result<()> {
		self.lifecycle
			.set_state(LifecycleState::Stopping)
			.await
			.context("Daemon is not running")?;

		self.registry.quiesce().await;
		self.stop_all().await;
		self.lifecycle.request_shutdown();

		let handles = std::mem::take(&mut *self.tasks.lock().await);
		for handle in handles {
			if let Err(e) = handle.await {
				warn!("Background task ended abnormally: {}", e);
			}
		}

		self.lifecycle.set_state(LifecycleState::Stopped).await?;
		info!("Fleet daemon stopped");
		Ok(())
	}

	/// Stops in reverse registration order so dependents go first.
	async fn stop_all(&self) {
		for instance in self.registry.all_instances().await.iter().rev() {
			if !instance.status.is_active() {
				continue;
			}
			if let Err(e) = self.registry.stop(instance.id()).await {
				error!("Failed to stop {}: {}", instance.id(), e);
			}
		}
	}

	fn spawn_event_logger(&self) -> JoinHandle<()> {
		let mut events = self.events.subscribe();
		let mut shutdown = self.lifecycle.subscribe_shutdown();

		tokio::spawn(async move {
			loop {
				tokio::select! {
					event = events.recv() => match event {
						Ok(event) => log_event(&event),
						Err(broadcast::error::RecvError::Lagged(skipped)) => {
							warn!("Event logger fell behind, skipped {} events", skipped);
						}
						Err(broadcast::error::RecvError::Closed) => break,
					},
					_ = shutdown.recv() => break,
				}
			}
		})
	}

	fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
		let daemon = Arc::clone(self);
		let period = Duration::from_secs(self.config.load().daemon.maintenance_interval_secs);
		let mut shutdown = self.lifecycle.subscribe_shutdown();

		tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			interval.tick().await;

			loop {
				tokio::select! {
					_ = interval.tick() => daemon.perform_maintenance().await,
					_ = shutdown.recv() => {
						info!("Maintenance loop stopped");
						break;
					}
				}
			}
		})
	}

	/// One maintenance pass: health check, weight refresh, status log.
	pub async fn perform_maintenance(&self) {
		let system = self.monitor.system_health().await;
		if !system.status.is_healthy() {
			warn!(
				"System health is {}: {}",
				system.status,
				system.issues.join("; ")
			);
		}

		for (instance_id, snapshot) in self.monitor.latest_snapshots().await {
			self.balancer
				.ingest_resource_usage(
					&instance_id,
					snapshot.cpu_usage,
					snapshot.memory_usage,
					snapshot.load,
				)
				.await;
		}
		self.balancer.update_service_weights().await;

		let summary = self
			.registry
			.category_summary()
			.await
			.into_iter()
			.map(|(category, s)| format!("{}={}/{}", category, s.running, s.total))
			.collect::<Vec<_>>()
			.join(" ");
		info!("Service status: {}", summary);
	}

	pub async fn status(&self) -> DaemonStatus {
		let started_at = *self.started_at.lock().await;
		DaemonStatus {
			state: self.lifecycle.state().await,
			started_at,
			uptime_secs: started_at
				.map(|t| (Utc::now() - t).num_seconds())
				.unwrap_or(0),
			strategy: self.balancer.strategy().await,
			categories: self.registry.category_summary().await,
			system_health: self.monitor.system_health().await,
			processing: self.orchestrator.stats().await,
		}
	}

	pub async fn category_status(&self, category: ServiceCategory) -> CategoryStatus {
		let instances = self.registry.instances_by_category(category).await;
		CategoryStatus {
			category,
			running: instances
				.iter()
				.filter(|i| i.status == InstanceStatus::Running)
				.count(),
			total: instances.len(),
			instances,
			health: self.monitor.category_health(category).await,
			load_distribution: self.balancer.load_distribution(category).await,
		}
	}

	pub async fn list_instances(&self) -> Vec<ServiceInstance> {
		self.registry.all_instances().await
	}

	/// Starts every stopped instance of the category. Instances in ERROR are
	/// recovered first.
	pub async fn start_category(&self, category: ServiceCategory) -> CategoryOutcome {
		let mut outcome = CategoryOutcome::default();
		for instance in self.registry.instances_by_category(category).await {
			let result = match instance.status {
				InstanceStatus::Stopped => self.registry.start(instance.id()).await,
				InstanceStatus::Error => self.recover_and(instance.id(), false).await,
				_ => continue,
			};
			outcome.record(instance.id(), result);
		}
		info!(
			"Started {}: {} ok, {} failed",
			category,
			outcome.succeeded.len(),
			outcome.failed.len()
		);
		outcome
	}

	pub async fn stop_category(&self, category: ServiceCategory) -> CategoryOutcome {
		let mut outcome = CategoryOutcome::default();
		for instance in self.registry.instances_by_category(category).await {
			if instance.status.is_active() {
				outcome.record(instance.id(), self.registry.stop(instance.id()).await);
			}
		}
		info!(
			"Stopped {}: {} ok, {} failed",
			category,
			outcome.succeeded.len(),
			outcome.failed.len()
		);
		outcome
	}

	/// Restarts every instance of the category except those in maintenance.
	pub async fn restart_category(&self, category: ServiceCategory) -> CategoryOutcome {
		let mut outcome = CategoryOutcome::default();
		for instance in self.registry.instances_by_category(category).await {
			let result = match instance.status {
				InstanceStatus::Maintenance => continue,
				InstanceStatus::Error => self.recover_and(instance.id(), true).await,
				_ => self.registry.restart(instance.id()).await,
			};
			outcome.record(instance.id(), result);
		}
		info!(
			"Restarted {}: {} ok, {} failed",
			category,
			outcome.succeeded.len(),
			outcome.failed.len()
		);
		outcome
	}

	async fn recover_and(&self, instance_id: &str, restart: bool) -> Result<(), FleetError> {
		self.registry.recover(instance_id).await?;
		if restart {
			self.registry.restart(instance_id).await
		} else {
			self.registry.start(instance_id).await
		}
	}

	/// Grows or shrinks a category to `instances`.
	///
	/// New instances take the category's configured settings and are started
	/// when the daemon is running. Shrinking removes the newest instances.
	pub async fn scale_category(
		&self,
		category: ServiceCategory,
		instances: u32,
	) -> Result<CategoryOutcome, FleetError> {
		let settings = self
			.config
			.load()
			.services
			.get(&category)
			.cloned()
			.unwrap_or_default();
		let current = self.registry.ids_by_category(category).await;
		let target = instances as usize;
		let mut outcome = CategoryOutcome::default();

		if target > current.len() {
			let running = self.lifecycle.is_running().await;
			for index in current.len() as u32..instances {
				let instance_id = self
					.registry
					.register(instance_config(category, &settings, index)?)
					.await?;
				if running {
					let result = self.registry.start(&instance_id).await;
					outcome.record(&instance_id, result);
				} else {
					outcome.succeeded.push(instance_id);
				}
			}
		} else {
			for instance_id in current.iter().skip(target).rev() {
				let result = self.registry.unregister(instance_id).await;
				if result.is_ok() {
					self.balancer.forget(instance_id).await;
				}
				outcome.record(instance_id, result);
			}
		}

		let _ = self.events.publish(FleetEvent::Instance(InstanceEvent::Scaled {
			category,
			instances: target,
		}));
		info!("Scaled {} from {} to {} instances", category, current.len(), target);
		Ok(outcome)
	}

	/// Sends a message through the silicon sage pipeline.
	pub async fn submit_test_request(&self, message: &str) -> ResultMap {
		self.orchestrator
			.process_message(message, ResultMap::new())
			.await
	}

	pub fn config(&self) -> Arc<FleetConfig> {
		self.config.load_full()
	}

	/// Validates a configuration file without applying it.
	pub fn validate_config(path: &Path) -> Result<FleetConfig, ConfigError> {
		ConfigLoader::from_file(path)
	}

	/// Re-reads the configuration file and applies what can change live: the
	/// balancing strategy and the health thresholds.
	pub async fn reload_config(&self) -> Result<()> {
		let path = self
			.config_path
			.as_ref()
			.ok_or_else(|| anyhow!("Daemon was started without a configuration file"))?;
		let config = ConfigLoader::new()
			.with_file(path)
			.load()
			.with_context(|| format!("Failed to reload {}", path.display()))?;

		let previous = self.config.load_full();
		if previous.load_balancer.strategy != config.load_balancer.strategy {
			info!(
				"Switching load balancing strategy from {} to {}",
				previous.load_balancer.strategy, config.load_balancer.strategy
			);
			self.balancer
				.set_strategy(config.load_balancer.strategy)
				.await;
		}
		for (metric, threshold) in &config.monitoring.thresholds {
			self.monitor
				.set_threshold(metric, threshold.warning, threshold.critical)
				.await;
		}
		if previous.services != config.services {
			warn!("Service layout changes take effect after a restart");
		}

		self.config.store(Arc::new(config));
		info!("Configuration reloaded from {}", path.display());
		Ok(())
	}

	pub async fn state(&self) -> LifecycleState {
		self.lifecycle.state().await
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	pub fn balancer(&self) -> &Arc<LoadBalancer> {
		&self.balancer
	}

	pub fn monitor(&self) -> &Arc<HealthMonitor> {
		&self.monitor
	}

	pub fn orchestrator(&self) -> &Arc<Orchestrator> {
		&self.orchestrator
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}
}

fn log_event(event: &FleetEvent) {
	match event {
		FleetEvent::Instance(InstanceEvent::StatusChanged {
			instance_id,
			status,
		}) => {
			debug!("Instance {} is now {}", instance_id, status);
		}
		FleetEvent::Instance(InstanceEvent::Scaled {
			category,
			instances,
		}) => {
			info!("Category {} scaled to {} instances", category, instances);
		}
		FleetEvent::Health(HealthEvent::Alert {
			instance_id,
			status,
			issues,
		}) => {
			warn!("Health alert for {}: {} ({})", instance_id, status, issues.join("; "));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use std::io::Write;

	fn quiet_config() -> FleetConfig {
		let mut config = FleetConfig::default();
		config.daemon.startup_stagger_ms = 0;
		config.load_balancer.health_check_interval = 3600;
		config.daemon.restart_pause_ms = 1;
		config
	}

	fn deterministic() -> Collaborators {
		Collaborators {
			driver: Arc::new(SimulatedDriver::new()),
			probe: Arc::new(SimulatedProbe::seeded(1.0, 7)),
			metrics: Arc::new(SimulatedMetricsProvider::seeded(7)),
			capabilities: builtin_capabilities(),
		}
	}

	async fn daemon_with(config: FleetConfig, path: Option<PathBuf>) -> Arc<Daemon> {
		Arc::new(
			Daemon::with_collaborators(config, path, deterministic())
				.await
				.unwrap(),
		)
	}

	async fn running_daemon() -> Arc<Daemon> {
		let daemon = daemon_with(quiet_config(), None).await;
		daemon.start().await.unwrap();
		daemon
	}

	fn toml_file(contents: &str) -> tempfile::NamedTempFile {
		let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
		file.write_all(contents.as_bytes()).unwrap();
		file
	}

	#[tokio::test]
	async fn test_registers_configured_instances() {
		let daemon = daemon_with(quiet_config(), None).await;
		let instances = daemon.list_instances().await;
		assert_eq!(instances.len(), 8);
		assert!(instances.iter().all(|i| i.status == InstanceStatus::Stopped));

		let mut ports: Vec<u16> = daemon
			.registry()
			.instances_by_category(ServiceCategory::Relevance)
			.await
			.iter()
			.map(|i| i.config.port)
			.collect();
		ports.sort();
		assert_eq!(ports, vec![8100, 8101]);

		let sage = daemon
			.registry()
			.instances_by_category(ServiceCategory::SiliconSage)
			.await;
		assert_eq!(sage[0].config.memory_limit, 2048);
		assert_eq!(sage[0].config.health_check_interval, Duration::from_secs(30));
		assert_eq!(sage[0].config.dependencies.len(), 6);
	}

	#[tokio::test]
	async fn test_start_and_shutdown() {
		let daemon = running_daemon().await;
		assert_eq!(daemon.state().await, LifecycleState::Running);
		assert!(daemon
			.list_instances()
			.await
			.iter()
			.all(|i| i.status == InstanceStatus::Running));

		daemon.shutdown().await.unwrap();
		assert_eq!(daemon.state().await, LifecycleState::Stopped);
		assert!(daemon
			.list_instances()
			.await
			.iter()
			.all(|i| i.status == InstanceStatus::Stopped));
	}

	#[tokio::test]
	async fn test_run_returns_after_context_shutdown() {
		let daemon = daemon_with(quiet_config(), None).await;
		let context = daemon.context();

		let runner = {
			let daemon = daemon.clone();
			tokio::spawn(async move { daemon.run().await })
		};

		for _ in 0..100 {
			if daemon.state().await == LifecycleState::Running {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert_eq!(daemon.state().await, LifecycleState::Running);

		context.request_shutdown();
		runner.await.unwrap().unwrap();
		assert_eq!(daemon.state().await, LifecycleState::Stopped);
		assert!(context.shutdown_requested());
	}

	#[tokio::test]
	async fn test_shutdown_settles_pending_restart() {
		let mut config = quiet_config();
		config
			.services
			.retain(|category, _| *category == ServiceCategory::Wisdom);
		config.daemon.restart_pause_ms = 300;
		let collaborators = Collaborators {
			probe: Arc::new(SimulatedProbe::seeded(0.0, 7)),
			..deterministic()
		};
		let daemon = Arc::new(
			Daemon::with_collaborators(config, None, collaborators)
				.await
				.unwrap(),
		);
		daemon.start().await.unwrap();

		daemon.registry().check_health().await;
		tokio::time::sleep(Duration::from_millis(50)).await;
		daemon.shutdown().await.unwrap();
		assert_eq!(daemon.state().await, LifecycleState::Stopped);

		tokio::time::sleep(Duration::from_millis(600)).await;
		let instances = daemon.list_instances().await;
		assert_eq!(instances.len(), 1);
		assert_eq!(instances[0].status, InstanceStatus::Stopped);
		assert_eq!(instances[0].restart_count, 0);
	}

	#[tokio::test]
	async fn test_shutdown_before_start_is_rejected() {
		let daemon = daemon_with(quiet_config(), None).await;
		assert!(daemon.shutdown().await.is_err());
	}

	#[tokio::test]
	async fn test_status_summary() {
		let daemon = running_daemon().await;
		let status = daemon.status().await;

		assert_eq!(status.state, LifecycleState::Running);
		assert!(status.started_at.is_some());
		assert_eq!(status.strategy, BalancingStrategy::RoundRobin);
		assert_eq!(
			status.categories[&ServiceCategory::Relevance],
			CategorySummary {
				running: 2,
				total: 2
			}
		);

		let json = serde_json::to_value(&status).unwrap();
		assert_eq!(json["categories"]["meaning_making"]["total"], json!(1));

		daemon.shutdown().await.unwrap();
	}

	#[tokio::test]
	async fn test_stop_start_restart_category() {
		let daemon = running_daemon().await;

		let stopped = daemon.stop_category(ServiceCategory::Wisdom).await;
		assert!(stopped.is_success());
		assert_eq!(stopped.succeeded.len(), 1);
		let wisdom = daemon.category_status(ServiceCategory::Wisdom).await;
		assert_eq!((wisdom.running, wisdom.total), (0, 1));

		// Stopping a dependency does not cascade.
		let sage = daemon.category_status(ServiceCategory::SiliconSage).await;
		assert_eq!(sage.running, 1);

		assert!(daemon.start_category(ServiceCategory::Wisdom).await.is_success());
		assert_eq!(
			daemon.category_status(ServiceCategory::Wisdom).await.running,
			1
		);

		let restarted = daemon.restart_category(ServiceCategory::Relevance).await;
		assert_eq!(restarted.succeeded.len(), 2);
		for instance in daemon
			.registry()
			.instances_by_category(ServiceCategory::Relevance)
			.await
		{
			assert_eq!(instance.status, InstanceStatus::Running);
			assert_eq!(instance.restart_count, 1);
		}

		daemon.shutdown().await.unwrap();
	}

	#[tokio::test]
	async fn test_scale_category() {
		let daemon = running_daemon().await;
		let mut events = daemon.events().subscribe();

		let grown = daemon
			.scale_category(ServiceCategory::Relevance, 4)
			.await
			.unwrap();
		assert_eq!(grown.succeeded.len(), 2);
		let relevance = daemon.category_status(ServiceCategory::Relevance).await;
		assert_eq!((relevance.running, relevance.total), (4, 4));

		let shrunk = daemon
			.scale_category(ServiceCategory::Relevance, 1)
			.await
			.unwrap();
		assert_eq!(shrunk.succeeded.len(), 3);
		assert_eq!(
			daemon
				.registry()
				.ids_by_category(ServiceCategory::Relevance)
				.await
				.len(),
			1
		);

		let mut scaled = Vec::new();
		while let Ok(event) = events.try_recv() {
			if let FleetEvent::Instance(InstanceEvent::Scaled { instances, .. }) = event {
				scaled.push(instances);
			}
		}
		assert_eq!(scaled, vec![4, 1]);

		daemon.shutdown().await.unwrap();
	}

	#[tokio::test]
	async fn test_submit_test_request() {
		let daemon = running_daemon().await;
		let result = daemon.submit_test_request("hello fleet").await;

		assert_eq!(result["refined_message"], json!("Sage wisdom: hello fleet"));
		assert_eq!(daemon.status().await.processing.successful_requests, 1);

		daemon.shutdown().await.unwrap();
	}

	#[tokio::test]
	async fn test_maintenance_feeds_balancer() {
		let daemon = running_daemon().await;
		daemon.monitor().run_cycle().await;
		daemon.perform_maintenance().await;

		for instance in daemon.list_instances().await {
			let sample = daemon.balancer().sample(instance.id()).await.unwrap();
			// Simulated ranges.
			assert!((10.0..95.0).contains(&sample.cpu_usage));
			assert!((0.1..1.0).contains(&sample.load));
			assert_eq!(sample.current_connections, 0);
			assert!(daemon.balancer().weight(instance.id()).await >= 0.1);
		}

		daemon.shutdown().await.unwrap();
	}

	#[test]
	fn test_load_or_default_fallbacks() {
		let missing = load_or_default(Some(Path::new("/nonexistent/fleet.toml")));
		assert_eq!(missing, FleetConfig::default());

		let cyclic = toml_file(
			r#"
[services.wisdom]
dependencies = ["relevance"]

[services.relevance]
dependencies = ["wisdom"]
"#,
		);
		let config = load_or_default(Some(cyclic.path()));
		assert_eq!(config.services.len(), 7);
	}

	#[tokio::test]
	async fn test_reload_config_applies_strategy() {
		let file = toml_file(
			r#"
[daemon]
startup_stagger_ms = 0

[services.relevance]
instances = 1

[load_balancer]
strategy = "least_connections"
"#,
		);
		let config = load_or_default(Some(file.path()));
		let daemon = daemon_with(config, Some(file.path().to_path_buf())).await;
		assert_eq!(
			daemon.balancer().strategy().await,
			BalancingStrategy::LeastConnections
		);

		std::fs::write(
			file.path(),
			r#"
[services.relevance]
instances = 1

[load_balancer]
strategy = "cognitive_aware"

[monitoring.thresholds.cpu_usage]
warning = 50.0
critical = 60.0
"#,
		)
		.unwrap();
		daemon.reload_config().await.unwrap();

		assert_eq!(
			daemon.balancer().strategy().await,
			BalancingStrategy::CognitiveAware
		);
		assert_eq!(daemon.monitor().thresholds().await["cpu_usage"].critical, 60.0);
		assert_eq!(
			daemon.config().load_balancer.strategy,
			BalancingStrategy::CognitiveAware
		);
	}

	#[tokio::test]
	async fn test_reload_without_file_fails() {
		let daemon = daemon_with(quiet_config(), None).await;
		assert!(daemon.reload_config().await.is_err());
	}

	#[test]
	fn test_validate_config() {
		let good = toml_file("[services.wisdom]\ninstances = 2\n");
		let config = Daemon::validate_config(good.path()).unwrap();
		assert_eq!(config.total_instances(), 2);

		let bad = toml_file("[load_balancer]\nfailure_threshold = 0\n");
		assert!(Daemon::validate_config(bad.path()).is_err());
	}

	#[test]
	fn test_instance_config_port_overflow() {
		let settings = ServiceSettings {
			port_start: 65535,
			..Default::default()
		};
		assert!(instance_config(ServiceCategory::Wisdom, &settings, 0).is_ok());
		assert!(instance_config(ServiceCategory::Wisdom, &settings, 1).is_err());
	}
}
