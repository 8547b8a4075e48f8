use anyhow::{Context, Result};
use clap::Parser;
use fleet_config::ConfigLoader;
use fleet_monitoring::{init_tracing, TracingConfig};
use fleet_service::cli::{Args, Command};
use fleet_service::{load_or_default, Collaborators, Daemon};
use fleet_types::ServiceCategory;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();

	let tracing = TracingConfig::new()
		.with_level(args.log_level.clone().unwrap_or_else(|| "info".to_string()))
		.with_json_format(args.json_logs);
	init_tracing(tracing)?;

	match args.command() {
		Command::Start { config } => start_daemon(config).await,
		Command::Status { config, category } => show_status(config, category).await,
		Command::Validate { config } => validate_config(&config),
		Command::ShowConfig { config } => show_config(config),
		Command::Test { message, config } => test_processing(config, &message).await,
	}
}

async fn start_daemon(config: Option<PathBuf>) -> Result<()> {
	info!("Starting fleet daemon");
	let daemon = Arc::new(
		Daemon::new(config)
			.await
			.context("Failed to build fleet daemon")?,
	);

	let context = daemon.context();
	tokio::spawn(async move {
		setup_shutdown_signal().await;
		info!("Shutdown signal received");
		context.request_shutdown();
	});

	daemon.run().await.context("Fleet daemon failed")
}

/// Starts a throwaway fleet without the startup pause.
async fn in_process_fleet(config_path: Option<PathBuf>) -> Result<Arc<Daemon>> {
	let mut config = load_or_default(config_path.as_deref());
	config.daemon.startup_stagger_ms = 0;

	let daemon = Arc::new(
		Daemon::with_collaborators(config, config_path, Collaborators::simulated())
			.await
			.context("Failed to build fleet daemon")?,
	);
	daemon.start().await.context("Failed to start fleet")?;
	Ok(daemon)
}

async fn show_status(config: Option<PathBuf>, category: Option<ServiceCategory>) -> Result<()> {
	let daemon = in_process_fleet(config).await?;
	daemon.monitor().run_cycle().await;

	let output = match category {
		Some(category) => serde_json::to_string_pretty(&daemon.category_status(category).await)?,
		None => serde_json::to_string_pretty(&daemon.status().await)?,
	};
	println!("{}", output);

	daemon.shutdown().await
}

async fn test_processing(config: Option<PathBuf>, message: &str) -> Result<()> {
	let daemon = in_process_fleet(config).await?;

	info!("Processing test message: {}", message);
	let result = daemon.submit_test_request(message).await;
	println!("{}", serde_json::to_string_pretty(&result)?);

	daemon.shutdown().await
}

fn validate_config(path: &Path) -> Result<()> {
	info!("Validating configuration file: {}", path.display());
	let config = Daemon::validate_config(path).context("Configuration validation failed")?;

	info!("Configuration is valid");
	for (category, settings) in &config.services {
		info!(
			"  {}: {} instance(s) from port {}",
			category, settings.instances, settings.port_start
		);
	}
	Ok(())
}

fn show_config(path: Option<PathBuf>) -> Result<()> {
	let config = match path {
		Some(path) => ConfigLoader::new()
			.with_file(&path)
			.load()
			.with_context(|| format!("Failed to load {}", path.display()))?,
		None => load_or_default(None),
	};
	println!("{}", serde_json::to_string_pretty(&config)?);
	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				error!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
