//! Processing requests, responses and routing context.

use crate::category::ServiceCategory;
use crate::instance::InstanceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON object used for request context and aggregated results.
pub type ResultMap = Map<String, Value>;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

/// A unit of work submitted to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRequest {
	pub request_id: String,
	pub request_type: String,
	pub content: String,
	pub context: ResultMap,
	/// 1 is lowest, 5 is highest
	pub priority: u8,
	pub complexity: f64,
	/// Empty means "derive from the request type"
	pub required_categories: Vec<ServiceCategory>,
	pub timestamp: DateTime<Utc>,
}

impl ProcessingRequest {
	pub fn new(request_type: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			request_id: uuid::Uuid::new_v4().to_string(),
			request_type: request_type.into(),
			content: content.into(),
			context: ResultMap::new(),
			priority: MIN_PRIORITY,
			complexity: 1.0,
			required_categories: Vec::new(),
			timestamp: Utc::now(),
		}
	}

	pub fn with_context(mut self, context: ResultMap) -> Self {
		self.context = context;
		self
	}

	pub fn with_priority(mut self, priority: u8) -> Self {
		self.priority = priority;
		self
	}

	pub fn with_complexity(mut self, complexity: f64) -> Self {
		self.complexity = complexity;
		self
	}

	pub fn with_categories(mut self, categories: Vec<ServiceCategory>) -> Self {
		self.required_categories = categories;
		self
	}

	/// Checks the fields the pipeline relies on.
	pub fn validate(&self) -> Result<(), String> {
		if !self.complexity.is_finite() || self.complexity < 0.0 {
			return Err(format!(
				"complexity must be a finite non-negative number, got {}",
				self.complexity
			));
		}
		if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
			return Err(format!(
				"priority must be between {} and {}, got {}",
				MIN_PRIORITY, MAX_PRIORITY, self.priority
			));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
	Success,
	Error,
}

/// Aggregated outcome of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResponse {
	pub request_id: String,
	pub status: ResponseStatus,
	pub result: ResultMap,
	/// Elapsed wall time in seconds
	pub processing_time: f64,
	pub instances_used: Vec<InstanceId>,
	pub confidence: f64,
	pub errors: Vec<String>,
}

impl ProcessingResponse {
	pub fn error(request_id: impl Into<String>, processing_time: f64, error: String) -> Self {
		Self {
			request_id: request_id.into(),
			status: ResponseStatus::Error,
			result: ResultMap::new(),
			processing_time,
			instances_used: Vec::new(),
			confidence: 0.0,
			errors: vec![error],
		}
	}

	pub fn is_success(&self) -> bool {
		self.status == ResponseStatus::Success
	}
}

/// Hints passed to the load balancer when picking an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionContext {
	pub complexity: f64,
	pub priority: u8,
	pub request_type: String,
}

impl Default for SelectionContext {
	fn default() -> Self {
		Self {
			complexity: 1.0,
			priority: MIN_PRIORITY,
			request_type: String::new(),
		}
	}
}

impl From<&ProcessingRequest> for SelectionContext {
	fn from(request: &ProcessingRequest) -> Self {
		Self {
			complexity: request.complexity,
			priority: request.priority,
			request_type: request.request_type.clone(),
		}
	}
}
