//! Load balancer over the healthy instances of a category.
//!
//! Candidates always come from the registry (running and healthy, in
//! registration order). The balancer only keeps per-instance performance
//! samples, weights and round-robin counters, all behind a single mutex.

use crate::registry::Registry;
use fleet_types::{
	BalancingStrategy, FleetError, InstanceId, MetricsSnapshot, PerformanceSample,
	SelectionContext, ServiceCategory,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Smoothing factor of the response time and error rate averages.
const EMA_ALPHA: f64 = 0.1;
/// Response time assumed for instances that have not reported one.
const DEFAULT_RESPONSE_MS: f64 = 100.0;
/// Samples older than this are left out of weight updates.
const STALE_AFTER: Duration = Duration::from_secs(300);
const MIN_WEIGHT: f64 = 0.1;

struct BalancerState {
	strategy: BalancingStrategy,
	samples: HashMap<InstanceId, PerformanceSample>,
	weights: HashMap<InstanceId, f64>,
	counters: HashMap<ServiceCategory, usize>,
}

impl BalancerState {
	fn next_round_robin(&mut self, category: ServiceCategory, ids: &[InstanceId]) -> InstanceId {
		let counter = self.counters.entry(category).or_insert(0);
		let chosen = ids[*counter % ids.len()].clone();
		*counter = (*counter + 1) % ids.len();
		chosen
	}

	fn weight_of(&self, instance_id: &str) -> f64 {
		self.weights.get(instance_id).copied().unwrap_or(1.0)
	}
}

/// Returns the first id with the smallest score.
fn lowest<'a, F>(ids: &'a [InstanceId], score: F) -> &'a InstanceId
where
	F: Fn(&InstanceId) -> f64,
{
	let mut best = &ids[0];
	let mut best_score = score(best);
	for id in &ids[1..] {
		let s = score(id);
		if s < best_score {
			best = id;
			best_score = s;
		}
	}
	best
}

fn instance_weight(sample: &PerformanceSample) -> f64 {
	let weight = 1.0
		- sample.current_connections as f64 * 0.1
		- sample.average_response_time / 1000.0
		- sample.error_rate * 5.0
		- sample.load * 0.5;
	weight.max(MIN_WEIGHT)
}

pub struct LoadBalancer {
	registry: Arc<Registry>,
	state: Mutex<BalancerState>,
}

impl LoadBalancer {
	pub fn new(registry: Arc<Registry>, strategy: BalancingStrategy) -> Self {
		Self {
			registry,
			state: Mutex::new(BalancerState {
				strategy,
				samples: HashMap::new(),
				weights: HashMap::new(),
				counters: HashMap::new(),
			}),
		}
	}

	pub async fn strategy(&self) -> BalancingStrategy {
		self.state.lock().await.strategy
	}

	pub async fn set_strategy(&self, strategy: BalancingStrategy) {
		let mut state = self.state.lock().await;
		if state.strategy != strategy {
			debug!("Load balancing strategy {} -> {}", state.strategy, strategy);
			state.strategy = strategy;
		}
	}

	/// Picks one healthy running instance of `category`, or `None` when
	/// there is none.
	pub async fn select_instance(
		&self,
		category: ServiceCategory,
		context: Option<&SelectionContext>,
	) -> Option<InstanceId> {
		let candidates = self.registry.healthy_instances(category).await;

		match candidates.len() {
			0 => {
				warn!("{}", FleetError::NoHealthyInstance(category));
				return None;
			}
			1 => return candidates.into_iter().next(),
			_ => {}
		}

		let mut state = self.state.lock().await;
		let strategy = state.strategy;
		let chosen = match strategy {
			BalancingStrategy::RoundRobin => state.next_round_robin(category, &candidates),
			BalancingStrategy::WeightedRoundRobin => {
				let mut expanded = Vec::new();
				for id in &candidates {
					let copies = ((state.weight_of(id) * 10.0).floor() as usize).max(1);
					expanded.extend(std::iter::repeat(id.clone()).take(copies));
				}
				state.next_round_robin(category, &expanded)
			}
			BalancingStrategy::LeastConnections => lowest(&candidates, |id| {
				state
					.samples
					.get(id)
					.map(|s| s.current_connections as f64)
					.unwrap_or(0.0)
			})
			.clone(),
			BalancingStrategy::LeastResponseTime => lowest(&candidates, |id| {
				match state.samples.get(id) {
					Some(s) if s.average_response_time > 0.0 => s.average_response_time,
					_ => DEFAULT_RESPONSE_MS,
				}
			})
			.clone(),
			BalancingStrategy::CognitiveAware => {
				let complexity = context.map(|c| c.complexity).unwrap_or(1.0);
				lowest(&candidates, |id| match state.samples.get(id) {
					Some(s) => {
						(0.3 * (s.current_connections as f64 / 10.0)
							+ 0.3 * (s.average_response_time / 1000.0)
							+ 0.2 * s.load + 0.2 * (s.error_rate * 10.0))
							* complexity
					}
					None => complexity,
				})
				.clone()
			}
		};

		debug!("Selected {} for {}", chosen, category);
		Some(chosen)
	}

	/// Counts a request as in flight on the instance.
	pub async fn record_request_start(&self, instance_id: &str) {
		let mut state = self.state.lock().await;
		let sample = state
			.samples
			.entry(instance_id.to_string())
			.or_insert_with(|| PerformanceSample::new(instance_id));
		sample.current_connections += 1;
		sample.last_updated = Instant::now();
	}

	/// Ends an in-flight request and folds its outcome into the averages.
	///
	/// Ignored for instances without a sample.
	pub async fn record_request_end(&self, instance_id: &str, response_ms: f64, success: bool) {
		let mut state = self.state.lock().await;
		let Some(sample) = state.samples.get_mut(instance_id) else {
			debug!("No sample for {}, ignoring request end", instance_id);
			return;
		};

		sample.current_connections = sample.current_connections.saturating_sub(1);
		sample.total_requests += 1;
		sample.average_response_time =
			EMA_ALPHA * response_ms + (1.0 - EMA_ALPHA) * sample.average_response_time;
		let failure = if success { 0.0 } else { 1.0 };
		sample.error_rate = EMA_ALPHA * failure + (1.0 - EMA_ALPHA) * sample.error_rate;
		sample.last_updated = Instant::now();
	}

	/// Replaces the instance's sample with an external reading.
	pub async fn update_service_metrics(&self, instance_id: &str, snapshot: &MetricsSnapshot) {
		let mut state = self.state.lock().await;
		let sample = PerformanceSample {
			instance_id: instance_id.to_string(),
			current_connections: snapshot.connections,
			total_requests: snapshot.total_requests,
			average_response_time: snapshot.avg_response_time,
			error_rate: snapshot.error_rate,
			cpu_usage: snapshot.cpu_usage,
			memory_usage: snapshot.memory_usage,
			load: snapshot.load,
			last_updated: Instant::now(),
		};
		state.samples.insert(instance_id.to_string(), sample);
	}

	/// Updates only the resource fields, keeping request statistics.
	pub async fn ingest_resource_usage(&self, instance_id: &str, cpu: f64, memory: f64, load: f64) {
		let mut state = self.state.lock().await;
		let sample = state
			.samples
			.entry(instance_id.to_string())
			.or_insert_with(|| PerformanceSample::new(instance_id));
		sample.cpu_usage = cpu;
		sample.memory_usage = memory;
		sample.load = load;
		sample.last_updated = Instant::now();
	}

	/// Recomputes weights from every sample updated in the last five minutes.
	pub async fn update_service_weights(&self) {
		let mut state = self.state.lock().await;
		let fresh: Vec<(InstanceId, f64)> = state
			.samples
			.iter()
			.filter(|(_, s)| s.last_updated.elapsed() <= STALE_AFTER)
			.map(|(id, s)| (id.clone(), instance_weight(s)))
			.collect();

		for (id, weight) in fresh {
			state.weights.insert(id, weight);
		}
	}

	pub async fn sample(&self, instance_id: &str) -> Option<PerformanceSample> {
		self.state.lock().await.samples.get(instance_id).cloned()
	}

	pub async fn weight(&self, instance_id: &str) -> f64 {
		self.state.lock().await.weight_of(instance_id)
	}

	/// Share of in-flight requests per instance of `category`, in percent.
	///
	/// Only instances with a sample appear. When nothing is in flight the
	/// raw (zero) counts are returned.
	pub async fn load_distribution(&self, category: ServiceCategory) -> BTreeMap<InstanceId, f64> {
		let ids = self.registry.ids_by_category(category).await;
		let state = self.state.lock().await;

		let mut distribution: BTreeMap<InstanceId, f64> = ids
			.into_iter()
			.filter_map(|id| {
				let connections = state.samples.get(&id)?.current_connections as f64;
				Some((id, connections))
			})
			.collect();

		let total: f64 = distribution.values().sum();
		if total > 0.0 {
			for share in distribution.values_mut() {
				*share = *share / total * 100.0;
			}
		}
		distribution
	}

	/// Drops the sample and weight of an instance that left the fleet.
	pub async fn forget(&self, instance_id: &str) {
		let mut state = self.state.lock().await;
		state.samples.remove(instance_id);
		state.weights.remove(instance_id);
	}
}
