//! Periodic detection sweeps that feed the workflow engine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use pulse_automation::{TriggerOutcome, WorkflowEngine};
use pulse_core::collaborators::OrderHistory;
use pulse_core::config::SchedulerConfig;
use pulse_tracking::EventTracker;

pub const CART_RECOVERY_AUTOMATION: &str = "cart_recovery_email";
pub const VIP_WINBACK_AUTOMATION: &str = "vip_winback";

/// At-risk window: a VIP whose last order falls in this band has lapsed
/// but is considered winnable.
const VIP_RISK_MIN_DAYS: i64 = 60;
const VIP_RISK_MAX_DAYS: i64 = 180;

/// Finds quiet carts above the minimum value and triggers the cart
/// recovery automation for each identified customer. Anonymous carts are
/// skipped; there is nobody to message. Returns how many workflows
/// started.
pub fn sweep_abandoned_carts(
    tracker: &EventTracker,
    engine: &WorkflowEngine,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> usize {
    let carts = tracker.abandoned_carts(
        Duration::minutes(config.cart_lookback_mins),
        config.cart_min_value,
        now,
    );

    let mut started = 0;
    for cart in carts {
        let Some(customer_id) = cart.customer_id else {
            debug!(session_id = %cart.session_id, "Anonymous abandoned cart skipped");
            continue;
        };

        let mut context = HashMap::new();
        context.insert("cart_value".to_string(), serde_json::json!(cart.cart_value));
        context.insert("cart_items".to_string(), serde_json::json!(cart.items));

        let outcome =
            engine.trigger_workflow_at(CART_RECOVERY_AUTOMATION, &customer_id, context, now);
        if outcome == TriggerOutcome::Started {
            metrics::counter!("pulse.cart_recovery_triggered").increment(1);
            started += 1;
        }
    }

    if started > 0 {
        info!(started, "Cart recovery sweep triggered workflows");
    }
    started
}

/// Finds VIP customers whose last order has lapsed into the at-risk band
/// and triggers the win-back automation. Returns how many workflows
/// started.
pub fn sweep_at_risk_vips(
    orders: &Arc<dyn OrderHistory>,
    engine: &WorkflowEngine,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> usize {
    let mut started = 0;
    for customer_id in orders.customer_ids() {
        let history = orders.orders_for(&customer_id);
        let Some(last_order) = history.iter().map(|o| o.placed_at).max() else {
            continue;
        };

        let total_spent: f64 = history.iter().map(|o| o.amount).sum();
        let is_vip =
            total_spent >= config.vip_min_spend || history.len() >= config.vip_min_orders;
        if !is_vip {
            continue;
        }

        let days_since_last = (now - last_order).num_days();
        if !(VIP_RISK_MIN_DAYS..=VIP_RISK_MAX_DAYS).contains(&days_since_last) {
            continue;
        }

        debug!(
            customer_id = %customer_id,
            total_spent,
            days_since_last,
            "At-risk VIP detected"
        );
        let outcome =
            engine.trigger_workflow_at(VIP_WINBACK_AUTOMATION, &customer_id, HashMap::new(), now);
        if outcome == TriggerOutcome::Started {
            metrics::counter!("pulse.vip_winback_triggered").increment(1);
            started += 1;
        }
    }

    if started > 0 {
        info!(started, "VIP win-back sweep triggered workflows");
    }
    started
}
