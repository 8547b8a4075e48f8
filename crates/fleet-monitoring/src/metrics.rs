//! Simulated metrics and liveness sources.
//!
//! The daemon has no real instrumentation of its instances, so by default it
//! plugs these into the health monitor and the registry. Both can be seeded
//! for reproducible runs.

use async_trait::async_trait;
use fleet_types::{FleetError, HealthProbe, InstanceConfig, MetricsProvider, MetricsSnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

fn rng_from(seed: Option<u64>) -> Mutex<StdRng> {
	Mutex::new(match seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_entropy(),
	})
}

/// Draws every reading uniformly from a plausible range.
pub struct SimulatedMetricsProvider {
	rng: Mutex<StdRng>,
}

impl SimulatedMetricsProvider {
	pub fn new() -> Self {
		Self {
			rng: rng_from(None),
		}
	}

	pub fn seeded(seed: u64) -> Self {
		Self {
			rng: rng_from(Some(seed)),
		}
	}
}

impl Default for SimulatedMetricsProvider {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl MetricsProvider for SimulatedMetricsProvider {
	async fn snapshot(&self, _config: &InstanceConfig) -> Result<MetricsSnapshot, FleetError> {
		let mut rng = self
			.rng
			.lock()
			.map_err(|_| FleetError::Metrics("metrics generator poisoned".into()))?;

		Ok(MetricsSnapshot {
			cpu_usage: rng.gen_range(10.0..95.0),
			memory_usage: rng.gen_range(20.0..90.0),
			avg_response_time: rng.gen_range(50.0..2000.0),
			error_rate: rng.gen_range(0.0..0.15),
			load: rng.gen_range(0.1..1.0),
			connections: rng.gen_range(0..=150),
			total_requests: 0,
		})
	}
}

/// Answers healthy with a fixed probability.
pub struct SimulatedProbe {
	healthy_ratio: f64,
	rng: Mutex<StdRng>,
}

impl SimulatedProbe {
	pub fn new(healthy_ratio: f64) -> Self {
		Self {
			healthy_ratio: healthy_ratio.clamp(0.0, 1.0),
			rng: rng_from(None),
		}
	}

	pub fn seeded(healthy_ratio: f64, seed: u64) -> Self {
		Self {
			healthy_ratio: healthy_ratio.clamp(0.0, 1.0),
			rng: rng_from(Some(seed)),
		}
	}
}

impl Default for SimulatedProbe {
	fn default() -> Self {
		Self::new(0.9)
	}
}

#[async_trait]
impl HealthProbe for SimulatedProbe {
	async fn probe(&self, config: &InstanceConfig) -> Result<bool, FleetError> {
		let mut rng = self.rng.lock().map_err(|_| {
			FleetError::HealthProbe(format!("probe of {} poisoned", config.instance_id))
		})?;
		Ok(rng.gen_bool(self.healthy_ratio))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fleet_types::ServiceCategory;

	#[tokio::test]
	async fn test_snapshot_ranges() {
		let provider = SimulatedMetricsProvider::seeded(7);
		let config = InstanceConfig::new(ServiceCategory::Wisdom);

		for _ in 0..200 {
			let s = provider.snapshot(&config).await.unwrap();
			assert!((10.0..95.0).contains(&s.cpu_usage));
			assert!((20.0..90.0).contains(&s.memory_usage));
			assert!((50.0..2000.0).contains(&s.avg_response_time));
			assert!((0.0..0.15).contains(&s.error_rate));
			assert!((0.1..1.0).contains(&s.load));
			assert!(s.connections <= 150);
		}
	}

	#[tokio::test]
	async fn test_seeded_providers_agree() {
		let a = SimulatedMetricsProvider::seeded(42);
		let b = SimulatedMetricsProvider::seeded(42);
		let config = InstanceConfig::new(ServiceCategory::Relevance);

		for _ in 0..5 {
			assert_eq!(
				a.snapshot(&config).await.unwrap(),
				b.snapshot(&config).await.unwrap()
			);
		}
	}

	#[tokio::test]
	async fn test_probe_extremes() {
		let config = InstanceConfig::new(ServiceCategory::Integration);
		let always = SimulatedProbe::seeded(1.0, 1);
		let never = SimulatedProbe::seeded(0.0, 1);
		for _ in 0..20 {
			assert!(always.probe(&config).await.unwrap());
			assert!(!never.probe(&config).await.unwrap());
		}
		// Out-of-range ratios are clamped.
		assert!(SimulatedProbe::seeded(3.0, 1).probe(&config).await.unwrap());
	}
}
