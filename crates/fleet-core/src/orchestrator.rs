//! Multi-step processing pipeline over the fleet.
//!
//! A request is resolved to a list of categories (explicitly, or through the
//! [`RoutingTable`]), one instance per category is chosen by the load
//! balancer, and each category's [`Processor`] from the [`CapabilityTable`]
//! runs in turn. Results are merged into one map, last write wins. A failing
//! step is recorded and skipped; it never aborts the pipeline.

use crate::balancer::LoadBalancer;
use crate::registry::Registry;
use dashmap::DashMap;
use fleet_types::{
	FleetError, InstanceId, ProcessingRequest, ProcessingResponse, Processor, ResponseStatus,
	ResultMap, SelectionContext, ServiceCategory,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Response time recorded for a step that failed.
const FAILED_STEP_MS: f64 = 5000.0;
const DEFAULT_CONFIDENCE: f64 = 0.8;
/// Complexity above which integration joins a derived pipeline.
const INTEGRATION_COMPLEXITY: f64 = 0.7;
const COMPLEX_TERMS: [&str; 5] = [
	"meaning",
	"wisdom",
	"consciousness",
	"phenomenology",
	"relevance",
];

/// Processors keyed by the category they implement.
#[derive(Clone, Default)]
pub struct CapabilityTable {
	processors: HashMap<ServiceCategory, Arc<dyn Processor>>,
}

impl CapabilityTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers (or replaces) the processor of a category.
	pub fn register(&mut self, category: ServiceCategory, processor: Arc<dyn Processor>) {
		self.processors.insert(category, processor);
	}

	pub fn with(mut self, category: ServiceCategory, processor: Arc<dyn Processor>) -> Self {
		self.register(category, processor);
		self
	}

	pub fn get(&self, category: ServiceCategory) -> Option<Arc<dyn Processor>> {
		self.processors.get(&category).cloned()
	}

	pub fn contains(&self, category: ServiceCategory) -> bool {
		self.processors.contains_key(&category)
	}
}

/// Maps request types to the categories that handle them.
#[derive(Debug, Clone)]
pub struct RoutingTable {
	routes: HashMap<String, Vec<ServiceCategory>>,
	fallback: Vec<ServiceCategory>,
}

impl Default for RoutingTable {
	fn default() -> Self {
		use ServiceCategory::*;

		let mut table = Self {
			routes: HashMap::new(),
			fallback: vec![SiliconSage],
		};
		table.register("relevance_analysis", vec![Relevance]);
		table.register("wisdom_evaluation", vec![Wisdom]);
		table.register("rational_analysis", vec![Rationality]);
		table.register("phenomenological_processing", vec![Phenomenology]);
		table.register("meaning_making", vec![MeaningMaking]);
		table.register("integration", vec![Integration]);
		table.register("silicon_sage_advice", vec![SiliconSage]);
		table.register(
			"comprehensive_analysis",
			vec![Relevance, Wisdom, Rationality, MeaningMaking, Integration],
		);
		table
	}
}

impl RoutingTable {
	/// A table with no routes; everything resolves to `fallback`.
	pub fn empty(fallback: Vec<ServiceCategory>) -> Self {
		Self {
			routes: HashMap::new(),
			fallback,
		}
	}

	pub fn register(&mut self, request_type: impl Into<String>, categories: Vec<ServiceCategory>) {
		self.routes.insert(request_type.into(), categories);
	}

	pub fn set_fallback(&mut self, categories: Vec<ServiceCategory>) {
		self.fallback = categories;
	}

	pub fn resolve(&self, request_type: &str) -> Vec<ServiceCategory> {
		self.routes
			.get(request_type)
			.cloned()
			.unwrap_or_else(|| self.fallback.clone())
	}
}

/// Running totals over every processed request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingStats {
	pub total_requests: u64,
	pub successful_requests: u64,
	pub failed_requests: u64,
	/// Seconds
	pub average_processing_time: f64,
}

impl ProcessingStats {
	fn record(&mut self, success: bool, seconds: f64) {
		self.total_requests += 1;
		if success {
			self.successful_requests += 1;
		} else {
			self.failed_requests += 1;
		}
		let n = self.total_requests as f64;
		self.average_processing_time = (self.average_processing_time * (n - 1.0) + seconds) / n;
	}
}

pub struct Orchestrator {
	registry: Arc<Registry>,
	balancer: Arc<LoadBalancer>,
	capabilities: CapabilityTable,
	routing: RoutingTable,
	stats: Mutex<ProcessingStats>,
	active: DashMap<String, ProcessingRequest>,
}

impl Orchestrator {
	pub fn new(
		registry: Arc<Registry>,
		balancer: Arc<LoadBalancer>,
		capabilities: CapabilityTable,
		routing: RoutingTable,
	) -> Self {
		Self {
			registry,
			balancer,
			capabilities,
			routing,
			stats: Mutex::new(ProcessingStats::default()),
			active: DashMap::new(),
		}
	}

	/// Runs a request through its pipeline.
	///
	/// Only an invalid request yields an `error` response; failing steps are
	/// reported in `errors` of a `success` response.
	pub async fn process_request(&self, mut request: ProcessingRequest) -> ProcessingResponse {
		let started = Instant::now();
		let request_id = request.request_id.clone();
		info!(
			"Processing request {} of type {}",
			request_id, request.request_type
		);

		if let Err(reason) = request.validate() {
			let err = FleetError::InvalidRequest(reason);
			error!("Rejected request {}: {}", request_id, err);
			let elapsed = started.elapsed().as_secs_f64();
			self.stats.lock().await.record(false, elapsed);
			return ProcessingResponse::error(request_id, elapsed, err.to_string());
		}

		if request.required_categories.is_empty() {
			request.required_categories = self.derive_categories(&request);
		}

		self.active.insert(request_id.clone(), request.clone());
		let plan = self.plan(&request).await;
		let (result, errors) = self.execute(&request, &plan).await;
		self.active.remove(&request_id);

		let elapsed = started.elapsed().as_secs_f64();
		self.stats.lock().await.record(true, elapsed);

		let confidence = result
			.get("confidence")
			.and_then(Value::as_f64)
			.unwrap_or(DEFAULT_CONFIDENCE);

		info!(
			"Processed request {} in {:.2}s ({} step errors)",
			request_id,
			elapsed,
			errors.len()
		);
		ProcessingResponse {
			request_id,
			status: ResponseStatus::Success,
			result,
			processing_time: elapsed,
			instances_used: plan.into_iter().map(|(_, id)| id).collect(),
			confidence,
			errors,
		}
	}

	fn derive_categories(&self, request: &ProcessingRequest) -> Vec<ServiceCategory> {
		let mut categories = self.routing.resolve(&request.request_type);
		if request.complexity > INTEGRATION_COMPLEXITY
			&& !categories.contains(&ServiceCategory::Integration)
		{
			categories.push(ServiceCategory::Integration);
		}
		categories
	}

	/// Picks one instance per category, skipping categories with none.
	async fn plan(&self, request: &ProcessingRequest) -> Vec<(ServiceCategory, InstanceId)> {
		let context = SelectionContext::from(request);
		let mut plan = Vec::with_capacity(request.required_categories.len());

		for category in &request.required_categories {
			match self.balancer.select_instance(*category, Some(&context)).await {
				Some(instance_id) => plan.push((*category, instance_id)),
				None => warn!("No available instance for {}, skipping", category),
			}
		}
		plan
	}

	async fn execute(
		&self,
		request: &ProcessingRequest,
		plan: &[(ServiceCategory, InstanceId)],
	) -> (ResultMap, Vec<String>) {
		let mut result = ResultMap::new();
		let mut intermediate = ResultMap::new();
		let mut errors = Vec::new();

		for (category, instance_id) in plan {
			self.balancer.record_request_start(instance_id).await;
			let step_started = Instant::now();

			match self
				.run_step(*category, instance_id, request, &intermediate)
				.await
			{
				Ok(output) => {
					let elapsed_ms = step_started.elapsed().as_secs_f64() * 1000.0;
					self.balancer
						.record_request_end(instance_id, elapsed_ms, true)
						.await;
					debug!("Processed {} on {}", category, instance_id);
					intermediate.insert(category.to_string(), Value::Object(output.clone()));
					result.extend(output);
				}
				Err(e) => {
					self.balancer
						.record_request_end(instance_id, FAILED_STEP_MS, false)
						.await;
					let err = FleetError::PipelineStep {
						category: *category,
						instance_id: instance_id.clone(),
						reason: e.to_string(),
					};
					error!("{}", err);
					errors.push(err.to_string());
				}
			}
		}

		(result, errors)
	}

	async fn run_step(
		&self,
		category: ServiceCategory,
		instance_id: &str,
		request: &ProcessingRequest,
		intermediate: &ResultMap,
	) -> Result<ResultMap, FleetError> {
		if self.registry.get(instance_id).await.is_none() {
			return Err(FleetError::InstanceNotFound(instance_id.to_string()));
		}
		let processor = self
			.capabilities
			.get(category)
			.ok_or_else(|| FleetError::Capability(format!("no processor for {}", category)))?;
		processor.process(request, intermediate).await
	}

	/// Sends a free-form message to the silicon sage.
	///
	/// On failure the map carries the error and echoes the message back.
	pub async fn process_message(&self, message: &str, context: ResultMap) -> ResultMap {
		let complexity = estimate_complexity(message, &context);
		let request = ProcessingRequest::new("silicon_sage_advice", message)
			.with_context(context)
			.with_complexity(complexity)
			.with_categories(vec![ServiceCategory::SiliconSage]);

		let response = self.process_request(request).await;
		if response.is_success() {
			return response.result;
		}

		let mut fallback = ResultMap::new();
		fallback.insert("error".into(), Value::from("Processing failed"));
		fallback.insert("details".into(), Value::from(response.errors));
		fallback.insert("refined_message".into(), Value::from(message));
		fallback.insert("message_confidence".into(), Value::from(0.0));
		fallback
	}

	pub async fn stats(&self) -> ProcessingStats {
		self.stats.lock().await.clone()
	}

	/// Requests currently going through the pipeline.
	pub fn active_requests(&self) -> Vec<ProcessingRequest> {
		self.active.iter().map(|e| e.value().clone()).collect()
	}

	pub fn routing(&self) -> &RoutingTable {
		&self.routing
	}

	pub fn capabilities(&self) -> &CapabilityTable {
		&self.capabilities
	}
}

/// Rough complexity of a message in `[0.5, 1.0]`.
pub fn estimate_complexity(message: &str, context: &ResultMap) -> f64 {
	let mut complexity = 0.5;

	let words = message.split_whitespace().count();
	if words > 100 {
		complexity += 0.2;
	} else if words > 50 {
		complexity += 0.1;
	}

	if context.len() > 5 {
		complexity += 0.2;
	} else if context.len() > 2 {
		complexity += 0.1;
	}

	let lowered = message.to_lowercase();
	for term in COMPLEX_TERMS {
		if lowered.contains(term) {
			complexity += 0.1;
		}
	}

	f64::min(1.0, complexity)
}
