use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use autoreply::config::EngineConfig;
use autoreply::database::{self, repositories::Repositories};
use autoreply::governor::{LoadMonitor, RateGovernor};
use autoreply::monitor::{EngineEventBroadcaster, MonitorProcessor};
use autoreply::retention::RetentionManager;
use autoreply::scheduler::BatchScheduler;
use autoreply::{clock, logging};
use graph_api::GraphClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = EngineConfig::from_env_or_default();

    let (logging_config, _guard) =
        logging::init_logging(&config.log_dir).context("initializing logging")?;

    let pool = database::init_pool(&config.database_url)
        .await
        .with_context(|| format!("opening database {}", config.database_url))?;
    database::run_migrations(&pool)
        .await
        .context("running migrations")?;

    let clock = clock::system();
    let repos = Repositories::sqlite(pool.clone(), config.default_tier);
    let events = EngineEventBroadcaster::new();
    let governor = RateGovernor::with_batch_size(clock.clone(), config.batch_size);
    let graph = GraphClient::new(config.graph.clone()).context("building Graph API client")?;

    let processor = Arc::new(MonitorProcessor::new(
        repos.clone(),
        Arc::new(graph),
        governor.clone(),
        clock.clone(),
        events.clone(),
        config.processor.clone(),
    ));
    let scheduler = Arc::new(BatchScheduler::new(
        repos.monitors.clone(),
        processor,
        config.scheduler.clone(),
    ));
    let load_monitor = Arc::new(LoadMonitor::new(
        repos.responses.clone(),
        governor,
        clock.clone(),
        events.clone(),
        config.load_monitor.clone(),
    ));
    let retention = Arc::new(RetentionManager::new(
        repos.monitors.clone(),
        repos.responses.clone(),
        clock,
        events.clone(),
        config.retention.clone(),
    ));

    let cancel = CancellationToken::new();
    logging_config.start_retention_cleanup(cancel.child_token());
    #[cfg(unix)]
    logging_config
        .start_reload_on_hangup(cancel.child_token())
        .context("installing SIGHUP handler")?;

    let mut activity = events.subscribe();
    let activity_cancel = cancel.child_token();
    let activity_log = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = activity_cancel.cancelled() => break,
                event = activity.recv() => match event {
                    Ok(event) => info!(target: "autoreply::activity", "{}", event.description()),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Activity log lagging");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });

    let tasks = vec![
        tokio::spawn(scheduler.run(cancel.child_token())),
        tokio::spawn(load_monitor.run(cancel.child_token())),
        tokio::spawn(retention.run(cancel.child_token())),
        activity_log,
    ];

    info!(
        batch_size = config.batch_size,
        tick_secs = config.scheduler.tick.as_secs(),
        log_filter = %logging_config.get_filter(),
        "autoreply started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("Shutdown requested");
    cancel.cancel();

    for result in futures::future::join_all(tasks).await {
        if let Err(e) = result {
            error!(error = %e, "Background task ended abnormally");
        }
    }
    pool.close().await;
    info!("autoreply stopped");

    Ok(())
}
