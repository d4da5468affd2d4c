//! ShopPulse — customer behavior intelligence and marketing automation.
//!
//! Main entry point that wires the tracker, scoring hub and workflow
//! engine together and starts the background scheduler.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use pulse_automation::{seed_default_automations, WorkflowEngine};
use pulse_core::collaborators::{
    CustomerDirectory, InMemoryDirectory, InMemoryOrderHistory, NotificationDispatcher,
    OrderHistory,
};
use pulse_core::config::AppConfig;
use pulse_core::types::{MessageChannel, RenderedMessage};
use pulse_core::PulseResult;
use pulse_scheduler::{AnalyticsHub, Scheduler};
use pulse_tracking::{EventTracker, SessionStore};

mod demo;
mod report;

#[derive(Parser, Debug)]
#[command(name = "shoppulse")]
#[command(about = "Customer behavior intelligence and marketing automation")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "SHOPPULSE__NODE_ID")]
    node_id: Option<String>,

    /// Session idle timeout in minutes (overrides config)
    #[arg(long, env = "SHOPPULSE__TRACKING__SESSION_TIMEOUT_MINS")]
    session_timeout_mins: Option<i64>,

    /// Due-job sweep interval in seconds (overrides config)
    #[arg(long, env = "SHOPPULSE__SCHEDULER__JOB_SWEEP_INTERVAL_SECS")]
    job_sweep_secs: Option<u64>,

    /// Seed demo customers, sessions and an abandoned cart at startup
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

/// Dispatcher that logs deliveries instead of talking to a provider.
/// Stands in until an email/chat integration is wired up.
struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn send(
        &self,
        channel: MessageChannel,
        recipient: &str,
        message: &RenderedMessage,
    ) -> PulseResult<()> {
        info!(
            ?channel,
            recipient,
            subject = message.subject.as_deref().unwrap_or(""),
            "Message dispatched"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shoppulse=info,pulse_scheduler=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("ShopPulse starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(mins) = cli.session_timeout_mins {
        config.tracking.session_timeout_mins = mins;
    }
    if let Some(secs) = cli.job_sweep_secs {
        config.scheduler.job_sweep_interval_secs = secs;
    }

    info!(
        node_id = %config.node_id,
        session_timeout_mins = config.tracking.session_timeout_mins,
        rfm_policy = ?config.scoring.rfm_policy,
        job_sweep_secs = config.scheduler.job_sweep_interval_secs,
        "Configuration loaded"
    );

    // Collaborator wiring. The in-memory implementations back the single
    // node deployment; the traits are the seam for external systems.
    let orders = Arc::new(InMemoryOrderHistory::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(LogDispatcher);

    let sessions = Arc::new(SessionStore::new(config.tracking.session_timeout_mins));
    let tracker = Arc::new(EventTracker::new(
        sessions,
        config.tracking.ring_buffer_size,
    ));

    let engine = Arc::new(
        WorkflowEngine::new(
            dispatcher,
            orders.clone() as Arc<dyn OrderHistory>,
            directory.clone() as Arc<dyn CustomerDirectory>,
            tracker.clone(),
        )
        .with_retry(pulse_automation::RetryPolicy::new(
            config.workflow.retry_max_attempts,
            std::time::Duration::from_millis(config.workflow.retry_backoff_ms),
        ))
        .with_instance_ttl(std::time::Duration::from_secs(
            config.workflow.instance_ttl_days * 24 * 3600,
        )),
    );
    seed_default_automations(&engine);

    let hub = Arc::new(AnalyticsHub::new(&config.scoring));

    if cli.seed_demo {
        demo::seed(&tracker, &orders, &directory);
        hub.recompute(&(orders.clone() as Arc<dyn OrderHistory>), chrono::Utc::now());
        info!("Demo data seeded");
    }

    let scheduler = Arc::new(Scheduler::new(
        tracker.clone(),
        engine.clone(),
        orders.clone() as Arc<dyn OrderHistory>,
        hub.clone(),
        config.scheduler.clone(),
    ));
    let handles = scheduler.spawn_all();

    report::spawn_insight_loop(
        tracker.clone(),
        hub.clone(),
        config.scheduler.recompute_interval_secs,
    );

    info!("ShopPulse is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    for handle in handles {
        handle.abort();
    }

    Ok(())
}
