//! Load-balancing strategies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the load balancer chooses among the healthy instances of a category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancingStrategy {
	#[default]
	RoundRobin,
	WeightedRoundRobin,
	LeastConnections,
	LeastResponseTime,
	/// Scores instances by connections, latency, load and errors, scaled by
	/// request complexity
	CognitiveAware,
}

impl BalancingStrategy {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::RoundRobin => "round_robin",
			Self::WeightedRoundRobin => "weighted_round_robin",
			Self::LeastConnections => "least_connections",
			Self::LeastResponseTime => "least_response_time",
			Self::CognitiveAware => "cognitive_aware",
		}
	}
}

impl fmt::Display for BalancingStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for BalancingStrategy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"round_robin" => Ok(Self::RoundRobin),
			"weighted_round_robin" => Ok(Self::WeightedRoundRobin),
			"least_connections" => Ok(Self::LeastConnections),
			"least_response_time" => Ok(Self::LeastResponseTime),
			"cognitive_aware" => Ok(Self::CognitiveAware),
			other => Err(format!("unknown load balancing strategy: {}", other)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_strategy_names() {
		assert_eq!(
			"least_response_time".parse::<BalancingStrategy>().unwrap(),
			BalancingStrategy::LeastResponseTime
		);
		assert_eq!(BalancingStrategy::CognitiveAware.to_string(), "cognitive_aware");
		assert!("fastest".parse::<BalancingStrategy>().is_err());
		assert_eq!(BalancingStrategy::default(), BalancingStrategy::RoundRobin);
	}
}
