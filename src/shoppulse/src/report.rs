//! Periodic insight reporting.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pulse_insights::{direction, generate_insights, DailySnapshot, InsightInputs, Metric};
use pulse_scheduler::AnalyticsHub;
use pulse_tracking::EventTracker;

/// Spawns a loop that evaluates the insight rules against the current
/// tracker counters and score snapshots, logging the result.
pub fn spawn_insight_loop(
    tracker: Arc<EventTracker>,
    hub: Arc<AnalyticsHub>,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_once(&tracker, &hub);
        }
    })
}

fn run_once(tracker: &EventTracker, hub: &AnalyticsHub) {
    let snapshot = tracker.snapshot();
    let scores = hub.scores();

    // Daily revenue series, oldest first. Orders and visitors are not
    // tracked per day, so only the revenue trend is evaluated.
    let mut daily: Vec<DailySnapshot> = snapshot
        .revenue_by_day
        .iter()
        .map(|(&date, &revenue)| DailySnapshot {
            date,
            revenue,
            orders: 0,
            visitors: 0,
        })
        .collect();
    daily.sort_by_key(|s| s.date);

    let revenue_trend = match direction(&daily, Metric::Revenue) {
        Ok(trend) => Some(trend),
        Err(e) => {
            debug!(error = %e, "Revenue trend unavailable");
            None
        }
    };

    let inputs = InsightInputs {
        cart_abandonment_rate: snapshot.cart_abandonment_rate(),
        conversion_rate: snapshot.conversion_rate(),
        bounce_rate: snapshot.bounce_rate(),
        total_page_views: snapshot.page_views,
        revenue_trend,
        high_ltv_customers: scores.high_ltv_count(),
        at_risk_customers: scores.at_risk_count(),
        anomaly: None,
    };
    let report = generate_insights(&inputs);

    for alert in &report.alerts {
        warn!(code = alert.code, severity = ?alert.severity, "{}", alert.message);
    }
    for opportunity in &report.opportunities {
        info!(code = opportunity.code, "{}", opportunity.message);
    }
    info!(
        alerts = report.alerts.len(),
        opportunities = report.opportunities.len(),
        recommendations = report.recommendations.len(),
        "Insight pass"
    );
}
