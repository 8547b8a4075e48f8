//! Health classification and reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health classification of an instance, a category or the whole fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
	Healthy,
	Warning,
	Critical,
	Unknown,
}

impl HealthStatus {
	pub fn is_healthy(&self) -> bool {
		matches!(self, HealthStatus::Healthy)
	}

	/// Rank used when folding several classifications into one.
	///
	/// Unknown ranks lowest so that any known reading wins over it.
	pub fn severity(&self) -> u8 {
		match self {
			HealthStatus::Unknown => 0,
			HealthStatus::Healthy => 1,
			HealthStatus::Warning => 2,
			HealthStatus::Critical => 3,
		}
	}

	pub fn worst(self, other: HealthStatus) -> HealthStatus {
		if other.severity() > self.severity() {
			other
		} else {
			self
		}
	}
}

impl fmt::Display for HealthStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HealthStatus::Healthy => write!(f, "healthy"),
			HealthStatus::Warning => write!(f, "warning"),
			HealthStatus::Critical => write!(f, "critical"),
			HealthStatus::Unknown => write!(f, "unknown"),
		}
	}
}

/// A named measurement together with the thresholds it is judged by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetric {
	pub name: String,
	pub value: f64,
	pub unit: String,
	pub threshold_warning: f64,
	pub threshold_critical: f64,
	pub description: String,
}

impl HealthMetric {
	pub fn new(
		name: impl Into<String>,
		value: f64,
		unit: impl Into<String>,
		threshold_warning: f64,
		threshold_critical: f64,
	) -> Self {
		Self {
			name: name.into(),
			value,
			unit: unit.into(),
			threshold_warning,
			threshold_critical,
			description: String::new(),
		}
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	/// Classifies the value: at or past critical is Critical, at or past
	/// warning is Warning.
	pub fn classify(&self) -> HealthStatus {
		if self.value >= self.threshold_critical {
			HealthStatus::Critical
		} else if self.value >= self.threshold_warning {
			HealthStatus::Warning
		} else {
			HealthStatus::Healthy
		}
	}
}

/// Immutable result of one health evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
	/// Instance id, category name or `system`
	pub subject: String,
	pub status: HealthStatus,
	pub metrics: Vec<HealthMetric>,
	pub issues: Vec<String>,
	pub recommendations: Vec<String>,
	pub timestamp: DateTime<Utc>,
}

impl HealthReport {
	pub fn new(
		subject: impl Into<String>,
		status: HealthStatus,
		metrics: Vec<HealthMetric>,
		issues: Vec<String>,
		recommendations: Vec<String>,
	) -> Self {
		Self {
			subject: subject.into(),
			status,
			metrics,
			issues,
			recommendations,
			timestamp: Utc::now(),
		}
	}

	/// A report for a subject nothing could be measured for.
	pub fn unknown(subject: impl Into<String>, issue: impl Into<String>) -> Self {
		Self::new(
			subject,
			HealthStatus::Unknown,
			Vec::new(),
			vec![issue.into()],
			Vec::new(),
		)
	}

	pub fn metric(&self, name: &str) -> Option<&HealthMetric> {
		self.metrics.iter().find(|m| m.name == name)
	}
}
