//! The background task runner. Each sweep runs on its own interval; ticks
//! never overlap within a sweep because each loop awaits its own work.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use pulse_automation::WorkflowEngine;
use pulse_core::collaborators::OrderHistory;
use pulse_core::config::SchedulerConfig;
use pulse_tracking::EventTracker;

use crate::analytics::AnalyticsHub;
use crate::sweeps;

/// Owns the periodic loops. Construct once at startup and call
/// [`Scheduler::spawn_all`].
pub struct Scheduler {
    tracker: Arc<EventTracker>,
    engine: Arc<WorkflowEngine>,
    orders: Arc<dyn OrderHistory>,
    hub: Arc<AnalyticsHub>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        tracker: Arc<EventTracker>,
        engine: Arc<WorkflowEngine>,
        orders: Arc<dyn OrderHistory>,
        hub: Arc<AnalyticsHub>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            tracker,
            engine,
            orders,
            hub,
            config,
        }
    }

    /// Spawns every background loop and returns their handles.
    pub fn spawn_all(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(
            job_sweep_secs = self.config.job_sweep_interval_secs,
            cart_sweep_secs = self.config.cart_sweep_interval_secs,
            recompute_secs = self.config.recompute_interval_secs,
            vip_sweep_secs = self.config.vip_sweep_interval_secs,
            "Scheduler starting"
        );
        vec![
            self.clone().spawn_job_sweep(),
            self.clone().spawn_cart_sweep(),
            self.clone().spawn_recompute(),
            self.clone().spawn_vip_sweep(),
        ]
    }

    fn spawn_job_sweep(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = sweep_interval(self.config.job_sweep_interval_secs);
            loop {
                ticker.tick().await;
                let now = Utc::now();
                let processed = self.engine.sweep_due_jobs(now);
                let expired = self.tracker.expire_idle_sessions(now);
                if processed > 0 || expired > 0 {
                    debug!(processed, expired, "Job sweep tick");
                }
            }
        })
    }

    fn spawn_cart_sweep(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = sweep_interval(self.config.cart_sweep_interval_secs);
            loop {
                ticker.tick().await;
                sweeps::sweep_abandoned_carts(
                    &self.tracker,
                    &self.engine,
                    &self.config,
                    Utc::now(),
                );
            }
        })
    }

    fn spawn_recompute(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = sweep_interval(self.config.recompute_interval_secs);
            loop {
                ticker.tick().await;
                self.hub.recompute(&self.orders, Utc::now());
            }
        })
    }

    fn spawn_vip_sweep(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = sweep_interval(self.config.vip_sweep_interval_secs);
            loop {
                ticker.tick().await;
                sweeps::sweep_at_risk_vips(&self.orders, &self.engine, &self.config, Utc::now());
            }
        })
    }
}

fn sweep_interval(secs: u64) -> tokio::time::Interval {
    let mut ticker = interval(Duration::from_secs(secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
