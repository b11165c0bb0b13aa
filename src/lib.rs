pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod directory;
pub mod domain;
pub mod entities;
pub mod services;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
pub use config::Config;
use directory::{BindSettings, LdapDirectory};
use services::Scheduler;
use services::connection_service::describe_failure;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.command == Some(Commands::Init) {
        return cmd_init();
    }

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "adpulse")?
            .extra_field("env", "production")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    if prometheus_handle.is_some() {
        info!("Prometheus metrics recorder initialized");
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_daemon(config, prometheus_handle).await,
        Commands::CheckConnection => cmd_check_connection(&config).await,
        Commands::DetectChanges => cmd_detect_changes(config).await,
        Commands::Init => cmd_init(),
    }
}

fn cmd_init() -> anyhow::Result<()> {
    if Config::create_default_if_missing()? {
        println!("Created config.toml with default settings");
    } else {
        println!("config.toml already exists, leaving it untouched");
    }
    Ok(())
}

async fn cmd_check_connection(config: &Config) -> anyhow::Result<()> {
    if config.directory.mock_mode {
        println!("Mock mode is enabled; no directory server is configured");
        return Ok(());
    }

    let settings = BindSettings::from_config(&config.directory);
    println!("Connecting to {} as {}...", settings.url, settings.bind_name);

    match LdapDirectory::verify_bind(&settings).await {
        Ok(()) => {
            println!("OK: bound and read {}", settings.base_dn);
            Ok(())
        }
        Err(e) => anyhow::bail!(describe_failure(&e)),
    }
}

async fn cmd_detect_changes(config: Config) -> anyhow::Result<()> {
    let state = api::create_app_state_from_config(config, None).await?;
    let recorded = state
        .changes
        .detect_changes()
        .await
        .context("Change detection failed")?;
    println!("Recorded {recorded} directory change(s)");
    Ok(())
}

async fn run_daemon(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "adpulse v{} starting (mock_mode: {})",
        env!("CARGO_PKG_VERSION"),
        config.directory.mock_mode
    );

    let api_state = api::create_app_state_from_config(config.clone(), prometheus_handle).await?;

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&api_state.changes),
        config.change_detection.clone(),
    ));

    let scheduler_handle = {
        let sched = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = sched.start().await {
                error!("Scheduler error: {}", e);
            }
        })
    };

    let server_handle: Option<tokio::task::JoinHandle<()>> = if config.server.enabled {
        let port = config.server.port;
        info!("Starting Web API on port {}", port);

        let app = api::router(api_state);
        let addr = format!("0.0.0.0:{port}");
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        Some(tokio::spawn(async move {
            info!("Web server running at http://0.0.0.0:{}", port);
            if let Err(e) = axum::serve(listener, app).await {
                error!("Web server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    scheduler.stop().await;
    if tokio::time::timeout(Duration::from_secs(5), scheduler_handle)
        .await
        .is_err()
    {
        info!("Scheduler did not stop in time");
    }

    if let Some(handle) = server_handle {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}
