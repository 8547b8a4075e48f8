//! Startup ordering of categories.

use crate::types::FleetConfig;
use crate::ConfigError;
use fleet_types::ServiceCategory;
use std::collections::HashSet;

/// Orders the configured categories so that every category comes after the
/// categories it depends on.
///
/// Categories are visited in declaration order, so independent categories
/// keep that order. Dependencies on categories that are not configured are
/// skipped here; validation reports them.
pub fn startup_order(config: &FleetConfig) -> Result<Vec<ServiceCategory>, ConfigError> {
	let mut order = Vec::with_capacity(config.services.len());
	let mut done = HashSet::new();
	let mut visiting = HashSet::new();

	for category in config.services.keys() {
		visit(*category, config, &mut done, &mut visiting, &mut order)?;
	}

	Ok(order)
}

fn visit(
	category: ServiceCategory,
	config: &FleetConfig,
	done: &mut HashSet<ServiceCategory>,
	visiting: &mut HashSet<ServiceCategory>,
	order: &mut Vec<ServiceCategory>,
) -> Result<(), ConfigError> {
	if done.contains(&category) {
		return Ok(());
	}
	if !visiting.insert(category) {
		return Err(ConfigError::DependencyCycle(category));
	}

	if let Some(settings) = config.services.get(&category) {
		for dep in &settings.dependencies {
			if config.services.contains_key(dep) {
				visit(*dep, config, done, visiting, order)?;
			}
		}
	}

	visiting.remove(&category);
	done.insert(category);
	order.push(category);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::ServiceSettings;
	use std::collections::BTreeMap;
	use ServiceCategory::*;

	fn config_with(deps: &[(ServiceCategory, Vec<ServiceCategory>)]) -> FleetConfig {
		let mut services = BTreeMap::new();
		for (category, dependencies) in deps {
			services.insert(
				*category,
				ServiceSettings {
					dependencies: dependencies.clone(),
					..ServiceSettings::default()
				},
			);
		}
		FleetConfig {
			services,
			..FleetConfig::default()
		}
	}

	#[test]
	fn test_default_order_puts_sage_last() {
		let order = startup_order(&FleetConfig::default()).unwrap();
		assert_eq!(order.len(), 7);
		assert_eq!(order.last(), Some(&SiliconSage));
		assert_eq!(order[0], Relevance);
	}

	#[test]
	fn test_dependencies_come_first() {
		// Relevance is declared first but waits for integration.
		let config = config_with(&[
			(Relevance, vec![Integration]),
			(Wisdom, vec![]),
			(Integration, vec![Wisdom]),
		]);
		let order = startup_order(&config).unwrap();
		assert_eq!(order, vec![Wisdom, Integration, Relevance]);
	}

	#[test]
	fn test_cycle_is_rejected() {
		let config = config_with(&[(Wisdom, vec![Integration]), (Integration, vec![Wisdom])]);
		assert!(matches!(
			startup_order(&config),
			Err(ConfigError::DependencyCycle(_))
		));
	}

	#[test]
	fn test_self_dependency_is_a_cycle() {
		let config = config_with(&[(Rationality, vec![Rationality])]);
		assert!(matches!(
			startup_order(&config),
			Err(ConfigError::DependencyCycle(Rationality))
		));
	}
}
