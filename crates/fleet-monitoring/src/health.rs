//! Health classification of running instances.
//!
//! Every cycle the monitor pulls a [`MetricsSnapshot`] for each running
//! instance, judges five readings against warning and critical thresholds
//! and caches the resulting [`HealthReport`]. Category and system reports
//! are folded from the cache on demand.

use fleet_config::{MonitoringConfig, ThresholdConfig};
use fleet_core::Registry;
use fleet_types::{
	AlertListener, HealthMetric, HealthReport, HealthStatus, InstanceId, MetricsProvider,
	MetricsSnapshot, ServiceCategory,
};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Subject of the fleet-wide report.
pub const SYSTEM_SUBJECT: &str = "system";

/// Built-in warning/critical thresholds, keyed by metric name.
pub fn default_thresholds() -> BTreeMap<String, ThresholdConfig> {
	[
		("cpu_usage", 70.0, 90.0),
		("memory_usage", 80.0, 95.0),
		("response_time", 1000.0, 5000.0),
		("error_rate", 0.05, 0.1),
		("load", 0.8, 0.95),
	]
	.into_iter()
	.map(|(name, warning, critical)| (name.to_string(), ThresholdConfig { warning, critical }))
	.collect()
}

struct Reading {
	name: &'static str,
	label: &'static str,
	unit: &'static str,
	value: f64,
	shown: String,
	description: &'static str,
	recommendation: &'static str,
}

fn readings(snapshot: &MetricsSnapshot) -> [Reading; 5] {
	[
		Reading {
			name: "cpu_usage",
			label: "CPU usage",
			unit: "percent",
			value: snapshot.cpu_usage,
			shown: format!("{:.1}%", snapshot.cpu_usage),
			description: "CPU utilization percentage",
			recommendation: "Consider scaling up or optimizing CPU-intensive operations",
		},
		Reading {
			name: "memory_usage",
			label: "memory usage",
			unit: "percent",
			value: snapshot.memory_usage,
			shown: format!("{:.1}%", snapshot.memory_usage),
			description: "Memory utilization percentage",
			recommendation: "Consider increasing memory allocation or optimizing memory usage",
		},
		Reading {
			name: "response_time",
			label: "response time",
			unit: "ms",
			value: snapshot.avg_response_time,
			shown: format!("{:.1}ms", snapshot.avg_response_time),
			description: "Average response time",
			recommendation: "Investigate performance bottlenecks or scale horizontally",
		},
		Reading {
			name: "error_rate",
			label: "error rate",
			unit: "ratio",
			value: snapshot.error_rate,
			shown: format!("{:.2}%", snapshot.error_rate * 100.0),
			description: "Share of failed requests",
			recommendation: "Investigate error causes and implement fixes",
		},
		Reading {
			name: "load",
			label: "cognitive load",
			unit: "ratio",
			value: snapshot.load,
			shown: format!("{:.2}", snapshot.load),
			description: "Processing load of the instance",
			recommendation: "Reduce cognitive complexity or add more processing capacity",
		},
	]
}

/// Judges one snapshot. The worst metric decides the overall status.
///
/// Metrics without a threshold entry are left out of the report.
pub fn evaluate_snapshot(
	subject: &str,
	snapshot: &MetricsSnapshot,
	thresholds: &BTreeMap<String, ThresholdConfig>,
) -> HealthReport {
	let mut status = HealthStatus::Healthy;
	let mut metrics = Vec::new();
	let mut issues = Vec::new();
	let mut recommendations = Vec::new();

	for reading in readings(snapshot) {
		let Some(threshold) = thresholds.get(reading.name) else {
			continue;
		};
		let metric = HealthMetric::new(
			reading.name,
			reading.value,
			reading.unit,
			threshold.warning,
			threshold.critical,
		)
		.with_description(reading.description);

		match metric.classify() {
			HealthStatus::Critical => {
				issues.push(format!("High {}: {}", reading.label, reading.shown));
				recommendations.push(reading.recommendation.to_string());
				status = status.worst(HealthStatus::Critical);
			}
			HealthStatus::Warning => {
				issues.push(format!("Elevated {}: {}", reading.label, reading.shown));
				status = status.worst(HealthStatus::Warning);
			}
			_ => {}
		}
		metrics.push(metric);
	}

	HealthReport::new(subject, status, metrics, issues, recommendations)
}

#[derive(Default)]
struct HealthCache {
	reports: HashMap<InstanceId, HealthReport>,
	snapshots: HashMap<InstanceId, MetricsSnapshot>,
}

/// Periodic health monitor over the registry's running instances.
pub struct HealthMonitor {
	registry: Arc<Registry>,
	provider: Arc<dyn MetricsProvider>,
	interval: Duration,
	alerts_enabled: bool,
	thresholds: RwLock<BTreeMap<String, ThresholdConfig>>,
	cache: RwLock<HealthCache>,
	listeners: RwLock<Vec<Arc<dyn AlertListener>>>,
}

impl HealthMonitor {
	/// Creates a monitor with the built-in thresholds overlaid by the
	/// configured ones.
	pub fn new(
		registry: Arc<Registry>,
		provider: Arc<dyn MetricsProvider>,
		config: &MonitoringConfig,
	) -> Self {
		let mut thresholds = default_thresholds();
		thresholds.extend(config.thresholds.iter().map(|(k, v)| (k.clone(), *v)));

		Self {
			registry,
			provider,
			interval: Duration::from_secs(config.metrics_interval),
			alerts_enabled: config.alerts_enabled,
			thresholds: RwLock::new(thresholds),
			cache: RwLock::new(HealthCache::default()),
			listeners: RwLock::new(Vec::new()),
		}
	}

	pub fn interval(&self) -> Duration {
		self.interval
	}

	pub async fn add_alert_listener(&self, listener: Arc<dyn AlertListener>) {
		self.listeners.write().await.push(listener);
	}

	pub async fn set_threshold(&self, metric: &str, warning: f64, critical: f64) {
		self.thresholds
			.write()
			.await
			.insert(metric.to_string(), ThresholdConfig { warning, critical });
	}

	pub async fn thresholds(&self) -> BTreeMap<String, ThresholdConfig> {
		self.thresholds.read().await.clone()
	}

	/// Evaluates every running instance once and fires alerts for the
	/// instances whose classification changed.
	pub async fn run_cycle(&self) {
		let running = self.registry.running_instances().await;
		let thresholds = self.thresholds.read().await.clone();

		let results = join_all(running.iter().map(|instance| async move {
			(
				instance.config.instance_id.clone(),
				self.provider.snapshot(&instance.config).await,
			)
		}))
		.await;

		let mut alerts = Vec::new();
		{
			let mut cache = self.cache.write().await;
			let live: HashSet<&str> = running.iter().map(|i| i.id()).collect();
			cache.reports.retain(|id, _| live.contains(id.as_str()));
			cache.snapshots.retain(|id, _| live.contains(id.as_str()));

			for (instance_id, result) in results {
				let report = match result {
					Ok(snapshot) => {
						let report = evaluate_snapshot(&instance_id, &snapshot, &thresholds);
						cache.snapshots.insert(instance_id.clone(), snapshot);
						report
					}
					Err(e) => {
						warn!("Collecting metrics for {} failed: {}", instance_id, e);
						cache.snapshots.remove(&instance_id);
						HealthReport::unknown(&instance_id, format!("Health check failed: {}", e))
					}
				};

				let previous = cache.reports.get(&instance_id).map(|r| r.status);
				let changed = match previous {
					Some(previous) => previous != report.status,
					None => !report.status.is_healthy(),
				};
				if changed {
					alerts.push(report.clone());
				}
				cache.reports.insert(instance_id, report);
			}
		}

		debug!("Health cycle evaluated {} instances", running.len());

		if self.alerts_enabled {
			for report in alerts {
				self.send_alert(&report).await;
			}
		}
	}

	async fn send_alert(&self, report: &HealthReport) {
		warn!(
			"Health of {} is now {}: {}",
			report.subject,
			report.status,
			report.issues.join("; ")
		);
		for listener in self.listeners.read().await.iter() {
			let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
				listener.on_alert(&report.subject, report.status, report)
			}));
			match outcome {
				Ok(Ok(())) => {}
				Ok(Err(e)) => error!("Alert listener failed for {}: {}", report.subject, e),
				Err(_) => error!("Alert listener panicked for {}", report.subject),
			}
		}
	}

	pub async fn instance_health(&self, instance_id: &str) -> Option<HealthReport> {
		self.cache.read().await.reports.get(instance_id).cloned()
	}

	pub async fn reports(&self) -> Vec<HealthReport> {
		self.cache.read().await.reports.values().cloned().collect()
	}

	/// Most recent snapshot per running instance.
	pub async fn latest_snapshots(&self) -> HashMap<InstanceId, MetricsSnapshot> {
		self.cache.read().await.snapshots.clone()
	}

	/// Fleet-wide report folded from the cached instance reports.
	pub async fn system_health(&self) -> HealthReport {
		let cache = self.cache.read().await;
		if cache.reports.is_empty() {
			return HealthReport::new(
				SYSTEM_SUBJECT,
				HealthStatus::Unknown,
				Vec::new(),
				Vec::new(),
				Vec::new(),
			);
		}

		let total = cache.reports.len() as f64;
		let mut status = HealthStatus::Unknown;
		let (mut healthy, mut warning, mut critical) = (0usize, 0usize, 0usize);
		for report in cache.reports.values() {
			status = status.worst(report.status);
			match report.status {
				HealthStatus::Healthy => healthy += 1,
				HealthStatus::Warning => warning += 1,
				HealthStatus::Critical => critical += 1,
				HealthStatus::Unknown => {}
			}
		}

		let metrics = vec![
			HealthMetric::new("services_healthy", healthy as f64, "count", total * 0.8, total * 0.6)
				.with_description("Number of healthy services"),
			HealthMetric::new("services_warning", warning as f64, "count", total * 0.2, total * 0.4)
				.with_description("Number of services with warnings"),
			HealthMetric::new("services_critical", critical as f64, "count", 1.0, total * 0.3)
				.with_description("Number of critical services"),
		];

		let mut issues = Vec::new();
		let mut recommendations = Vec::new();
		if critical > 0 {
			issues.push(format!("{} services in critical state", critical));
			recommendations.push("Immediately investigate critical services".to_string());
		}
		if warning > 0 {
			issues.push(format!("{} services with warnings", warning));
			recommendations.push("Monitor warning services closely".to_string());
		}

		HealthReport::new(SYSTEM_SUBJECT, status, metrics, issues, recommendations)
	}

	/// Report aggregated over the instances of one category.
	///
	/// Instances without a cached report do not affect the status.
	pub async fn category_health(&self, category: ServiceCategory) -> HealthReport {
		let ids = self.registry.ids_by_category(category).await;
		if ids.is_empty() {
			return HealthReport::unknown(
				category.as_str(),
				format!("No instances found for {}", category),
			);
		}

		let cache = self.cache.read().await;
		let mut status = HealthStatus::Healthy;
		let mut metrics = Vec::new();
		let mut issues = Vec::new();
		let mut recommendations: Vec<String> = Vec::new();

		for report in ids.iter().filter_map(|id| cache.reports.get(id)) {
			status = status.worst(report.status);
			metrics.extend(report.metrics.iter().cloned());
			issues.extend(
				report
					.issues
					.iter()
					.map(|issue| format!("{}: {}", report.subject, issue)),
			);
			for rec in &report.recommendations {
				if !recommendations.contains(rec) {
					recommendations.push(rec.clone());
				}
			}
		}

		HealthReport::new(category.as_str(), status, metrics, issues, recommendations)
	}

	/// Runs [`HealthMonitor::run_cycle`] every interval until shutdown.
	pub fn start(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
		let monitor = Arc::clone(self);

		tokio::spawn(async move {
			let mut interval = tokio::time::interval(monitor.interval);
			info!("Health monitoring started ({:?} interval)", monitor.interval);

			loop {
				tokio::select! {
					_ = interval.tick() => monitor.run_cycle().await,
					_ = shutdown.recv() => {
						info!("Health monitoring stopped");
						break;
					}
				}
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use fleet_core::RegistryOptions;
	use fleet_types::{FleetError, HealthProbe, InstanceConfig, InstanceDriver};
	use std::sync::Mutex;

	struct InstantDriver;

	#[async_trait]
	impl InstanceDriver for InstantDriver {
		async fn launch(&self, _config: &InstanceConfig) -> Result<u32, FleetError> {
			Ok(4242)
		}

		async fn terminate(
			&self,
			_config: &InstanceConfig,
			_pid: Option<u32>,
		) -> Result<(), FleetError> {
			Ok(())
		}
	}

	struct AlwaysUp;

	#[async_trait]
	impl HealthProbe for AlwaysUp {
		async fn probe(&self, _config: &InstanceConfig) -> Result<bool, FleetError> {
			Ok(true)
		}
	}

	/// Serves a per-instance snapshot; `None` makes collection fail.
	#[derive(Default)]
	struct ScriptedProvider {
		snapshots: Mutex<HashMap<InstanceId, Option<MetricsSnapshot>>>,
	}

	impl ScriptedProvider {
		fn set(&self, instance_id: &str, snapshot: Option<MetricsSnapshot>) {
			self.snapshots
				.lock()
				.unwrap()
				.insert(instance_id.to_string(), snapshot);
		}
	}

	#[async_trait]
	impl MetricsProvider for ScriptedProvider {
		async fn snapshot(&self, config: &InstanceConfig) -> Result<MetricsSnapshot, FleetError> {
			match self.snapshots.lock().unwrap().get(&config.instance_id) {
				Some(Some(snapshot)) => Ok(snapshot.clone()),
				Some(None) => Err(FleetError::Metrics("collector offline".into())),
				None => Ok(MetricsSnapshot::default()),
			}
		}
	}

	#[derive(Default)]
	struct RecordingAlerts {
		alerts: Mutex<Vec<(String, HealthStatus)>>,
	}

	impl AlertListener for RecordingAlerts {
		fn on_alert(
			&self,
			instance_id: &str,
			status: HealthStatus,
			_report: &HealthReport,
		) -> anyhow::Result<()> {
			self.alerts
				.lock()
				.unwrap()
				.push((instance_id.to_string(), status));
			Ok(())
		}
	}

	fn hot_cpu() -> MetricsSnapshot {
		MetricsSnapshot {
			cpu_usage: 95.0,
			..Default::default()
		}
	}

	async fn setup(
		ids: &[&str],
		config: MonitoringConfig,
	) -> (Arc<Registry>, Arc<ScriptedProvider>, HealthMonitor) {
		let registry = Arc::new(Registry::new(
			Arc::new(InstantDriver),
			Arc::new(AlwaysUp),
			RegistryOptions::default(),
		));
		for id in ids {
			registry
				.register(InstanceConfig::new(ServiceCategory::Relevance).with_id(*id))
				.await
				.unwrap();
			registry.start(id).await.unwrap();
		}
		let provider = Arc::new(ScriptedProvider::default());
		let monitor = HealthMonitor::new(registry.clone(), provider.clone(), &config);
		(registry, provider, monitor)
	}

	#[test]
	fn test_evaluate_healthy_snapshot() {
		let report = evaluate_snapshot("a", &MetricsSnapshot::default(), &default_thresholds());
		assert_eq!(report.status, HealthStatus::Healthy);
		assert_eq!(report.metrics.len(), 5);
		assert!(report.issues.is_empty());
		assert!(report.recommendations.is_empty());
	}

	#[test]
	fn test_evaluate_wording() {
		let thresholds = default_thresholds();

		let critical = evaluate_snapshot("a", &hot_cpu(), &thresholds);
		assert_eq!(critical.status, HealthStatus::Critical);
		assert_eq!(critical.issues, vec!["High CPU usage: 95.0%".to_string()]);
		assert_eq!(
			critical.recommendations,
			vec!["Consider scaling up or optimizing CPU-intensive operations".to_string()]
		);

		let warm = MetricsSnapshot {
			error_rate: 0.06,
			..Default::default()
		};
		let warning = evaluate_snapshot("a", &warm, &thresholds);
		assert_eq!(warning.status, HealthStatus::Warning);
		assert_eq!(warning.issues, vec!["Elevated error rate: 6.00%".to_string()]);
		assert!(warning.recommendations.is_empty());
	}

	#[test]
	fn test_never_healthy_past_critical() {
		let thresholds = default_thresholds();
		let cases = [
			MetricsSnapshot {
				cpu_usage: 90.0,
				..Default::default()
			},
			MetricsSnapshot {
				memory_usage: 99.0,
				..Default::default()
			},
			MetricsSnapshot {
				avg_response_time: 5000.0,
				..Default::default()
			},
			MetricsSnapshot {
				error_rate: 0.5,
				..Default::default()
			},
			MetricsSnapshot {
				load: 1.0,
				..Default::default()
			},
		];
		for snapshot in cases {
			let report = evaluate_snapshot("a", &snapshot, &thresholds);
			assert_eq!(report.status, HealthStatus::Critical, "{:?}", snapshot);
		}

		// Warning on one metric and critical on another is critical.
		let mixed = MetricsSnapshot {
			cpu_usage: 75.0,
			load: 0.97,
			..Default::default()
		};
		let report = evaluate_snapshot("a", &mixed, &thresholds);
		assert_eq!(report.status, HealthStatus::Critical);
		assert_eq!(report.issues.len(), 2);
	}

	#[tokio::test]
	async fn test_cycle_caches_reports_and_alerts_on_change() {
		let (_registry, provider, monitor) =
			setup(&["r-1", "r-2"], MonitoringConfig::default()).await;
		let alerts = Arc::new(RecordingAlerts::default());
		monitor.add_alert_listener(alerts.clone()).await;

		provider.set("r-1", Some(hot_cpu()));
		monitor.run_cycle().await;

		assert_eq!(
			monitor.instance_health("r-1").await.unwrap().status,
			HealthStatus::Critical
		);
		assert_eq!(
			monitor.instance_health("r-2").await.unwrap().status,
			HealthStatus::Healthy
		);
		// First healthy observation does not alert.
		assert_eq!(
			*alerts.alerts.lock().unwrap(),
			vec![("r-1".to_string(), HealthStatus::Critical)]
		);

		// Unchanged classification stays quiet.
		monitor.run_cycle().await;
		assert_eq!(alerts.alerts.lock().unwrap().len(), 1);

		provider.set("r-1", None);
		monitor.run_cycle().await;
		assert_eq!(
			alerts.alerts.lock().unwrap().last().cloned(),
			Some(("r-1".to_string(), HealthStatus::Unknown))
		);
		let report = monitor.instance_health("r-1").await.unwrap();
		assert!(report.issues[0].starts_with("Health check failed"));
	}

	#[tokio::test]
	async fn test_panicking_alert_listener_is_isolated() {
		let (_registry, provider, monitor) = setup(&["r-1"], MonitoringConfig::default()).await;
		monitor
			.add_alert_listener(Arc::new(
				|_: &str, _: HealthStatus, _: &HealthReport| -> anyhow::Result<()> {
					panic!("alert sink blew up")
				},
			))
			.await;
		let alerts = Arc::new(RecordingAlerts::default());
		monitor.add_alert_listener(alerts.clone()).await;

		provider.set("r-1", Some(hot_cpu()));
		monitor.run_cycle().await;

		assert_eq!(
			*alerts.alerts.lock().unwrap(),
			vec![("r-1".to_string(), HealthStatus::Critical)]
		);
		assert_eq!(
			monitor.instance_health("r-1").await.unwrap().status,
			HealthStatus::Critical
		);
	}

	#[tokio::test]
	async fn test_system_health_rollup() {
		let (_registry, provider, monitor) =
			setup(&["r-1", "r-2", "r-3"], MonitoringConfig::default()).await;

		assert_eq!(monitor.system_health().await.status, HealthStatus::Unknown);

		provider.set("r-1", Some(hot_cpu()));
		provider.set(
			"r-2",
			Some(MetricsSnapshot {
				memory_usage: 85.0,
				..Default::default()
			}),
		);
		monitor.run_cycle().await;

		let system = monitor.system_health().await;
		assert_eq!(system.subject, SYSTEM_SUBJECT);
		assert_eq!(system.status, HealthStatus::Critical);
		assert_eq!(system.metric("services_healthy").unwrap().value, 1.0);
		assert_eq!(system.metric("services_warning").unwrap().value, 1.0);
		assert_eq!(system.metric("services_critical").unwrap().value, 1.0);
		assert_eq!(
			system.issues,
			vec![
				"1 services in critical state".to_string(),
				"1 services with warnings".to_string()
			]
		);
	}

	#[tokio::test]
	async fn test_system_unknown_only_when_all_unknown() {
		let (_registry, provider, monitor) =
			setup(&["r-1", "r-2"], MonitoringConfig::default()).await;
		provider.set("r-1", None);
		provider.set("r-2", None);
		monitor.run_cycle().await;
		assert_eq!(monitor.system_health().await.status, HealthStatus::Unknown);

		provider.set("r-2", Some(MetricsSnapshot::default()));
		monitor.run_cycle().await;
		assert_eq!(monitor.system_health().await.status, HealthStatus::Healthy);
	}

	#[tokio::test]
	async fn test_reports_of_stopped_instances_are_dropped() {
		let (registry, _provider, monitor) =
			setup(&["r-1", "r-2"], MonitoringConfig::default()).await;
		monitor.run_cycle().await;
		assert_eq!(monitor.reports().await.len(), 2);
		assert_eq!(monitor.latest_snapshots().await.len(), 2);

		registry.stop("r-2").await.unwrap();
		monitor.run_cycle().await;
		assert!(monitor.instance_health("r-2").await.is_none());
		assert_eq!(monitor.reports().await.len(), 1);
		assert!(!monitor.latest_snapshots().await.contains_key("r-2"));
	}

	#[tokio::test]
	async fn test_alerts_disabled() {
		let config = MonitoringConfig {
			alerts_enabled: false,
			..Default::default()
		};
		let (_registry, provider, monitor) = setup(&["r-1"], config).await;
		let alerts = Arc::new(RecordingAlerts::default());
		monitor.add_alert_listener(alerts.clone()).await;

		provider.set("r-1", Some(hot_cpu()));
		monitor.run_cycle().await;
		assert_eq!(
			monitor.instance_health("r-1").await.unwrap().status,
			HealthStatus::Critical
		);
		assert!(alerts.alerts.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_threshold_overrides() {
		let mut config = MonitoringConfig::default();
		config.thresholds.insert(
			"cpu_usage".to_string(),
			ThresholdConfig {
				warning: 96.0,
				critical: 99.0,
			},
		);
		let (_registry, provider, monitor) = setup(&["r-1"], config).await;
		provider.set("r-1", Some(hot_cpu()));

		monitor.run_cycle().await;
		assert_eq!(
			monitor.instance_health("r-1").await.unwrap().status,
			HealthStatus::Healthy
		);

		monitor.set_threshold("cpu_usage", 50.0, 60.0).await;
		monitor.run_cycle().await;
		assert_eq!(
			monitor.instance_health("r-1").await.unwrap().status,
			HealthStatus::Critical
		);
		assert_eq!(monitor.thresholds().await["cpu_usage"].critical, 60.0);
	}

	#[tokio::test]
	async fn test_category_health() {
		let (_registry, provider, monitor) =
			setup(&["r-1", "r-2"], MonitoringConfig::default()).await;
		provider.set("r-2", Some(hot_cpu()));
		monitor.run_cycle().await;

		let relevance = monitor.category_health(ServiceCategory::Relevance).await;
		assert_eq!(relevance.status, HealthStatus::Critical);
		assert_eq!(relevance.metrics.len(), 10);
		assert_eq!(relevance.issues, vec!["r-2: High CPU usage: 95.0%".to_string()]);

		let wisdom = monitor.category_health(ServiceCategory::Wisdom).await;
		assert_eq!(wisdom.status, HealthStatus::Unknown);
		assert_eq!(wisdom.issues, vec!["No instances found for wisdom".to_string()]);
	}

	#[tokio::test]
	async fn test_start_stops_on_shutdown() {
		let (_registry, _provider, monitor) = setup(&["r-1"], MonitoringConfig::default()).await;
		let monitor = Arc::new(monitor);
		let (tx, rx) = broadcast::channel(1);

		let handle = monitor.start(rx);
		// The first tick fires immediately.
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert!(monitor.instance_health("r-1").await.is_some());

		tx.send(()).unwrap();
		handle.await.unwrap();
	}
}
