//! Customer lifetime-value scoring and bucketing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use pulse_core::types::Order;

const DAYS_PER_MONTH: f64 = 30.0;

/// One customer's fully recomputed LTV result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtvRecord {
    pub customer_id: String,
    pub total_spent: f64,
    pub order_count: u64,
    pub avg_order_value: f64,
    pub first_purchase: DateTime<Utc>,
    pub last_purchase: DateTime<Utc>,
    pub lifespan_months: f64,
    /// Orders per month over the customer's lifespan.
    pub purchase_frequency: f64,
    /// Projected spend over the next 12 months.
    pub predicted_ltv: f64,
    /// Composite health in [0, 100].
    pub health_score: f64,
    pub bucket: LtvBucket,
    pub last_updated: DateTime<Utc>,
}

/// Value bucket derived by ranking the whole population on predicted LTV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LtvBucket {
    High,
    Medium,
    Low,
    Churned,
}

pub struct LtvScorer {
    /// Customers whose last purchase is older than this are churned rather
    /// than low value.
    active_window_days: i64,
}

impl LtvScorer {
    pub fn new(active_window_days: i64) -> Self {
        Self { active_window_days }
    }

    /// Computes the LTV record for one customer. Customers with no orders
    /// are not scored. The bucket defaults to `Low` until the population
    /// ranking in [`LtvScorer::score_population`] assigns it.
    pub fn score_customer(
        &self,
        customer_id: &str,
        orders: &[Order],
        now: DateTime<Utc>,
    ) -> Option<LtvRecord> {
        if orders.is_empty() {
            return None;
        }
        let first_purchase = orders.iter().map(|o| o.placed_at).min()?;
        let last_purchase = orders.iter().map(|o| o.placed_at).max()?;
        let order_count = orders.len() as u64;
        let total_spent: f64 = orders.iter().map(|o| o.amount).sum();
        let avg_order_value = total_spent / order_count as f64;

        // A single-order customer has a zero lifespan; clamping to one
        // month keeps frequency bounded by the order count instead of
        // dividing by zero.
        let raw_months = (last_purchase - first_purchase).num_days() as f64 / DAYS_PER_MONTH;
        let lifespan_months = raw_months.max(1.0);
        let purchase_frequency = order_count as f64 / lifespan_months;
        let predicted_ltv = (avg_order_value * purchase_frequency * 12.0).max(0.0);

        let days_since_last = (now - last_purchase).num_days().max(0) as f64;
        let recency_component = (100.0 - 2.0 * days_since_last).max(0.0);
        let frequency_component = (purchase_frequency * 20.0).min(100.0);
        let monetary_component = (avg_order_value / 10.0).min(100.0);
        let health_score = (0.4 * recency_component
            + 0.3 * frequency_component
            + 0.3 * monetary_component)
            .clamp(0.0, 100.0);

        Some(LtvRecord {
            customer_id: customer_id.to_string(),
            total_spent,
            order_count,
            avg_order_value,
            first_purchase,
            last_purchase,
            lifespan_months,
            purchase_frequency,
            predicted_ltv,
            health_score,
            bucket: LtvBucket::Low,
            last_updated: now,
        })
    }

    /// Scores the population and assigns buckets by predicted-LTV rank:
    /// top 20% high, next 30% medium, the remainder low while still active
    /// and churned otherwise.
    pub fn score_population(
        &self,
        population: &[(String, Vec<Order>)],
        now: DateTime<Utc>,
    ) -> Vec<LtvRecord> {
        let mut records: Vec<LtvRecord> = population
            .iter()
            .filter_map(|(id, orders)| self.score_customer(id, orders, now))
            .collect();

        records.sort_by(|a, b| {
            b.predicted_ltv
                .partial_cmp(&a.predicted_ltv)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let n = records.len();
        let high_cut = (n as f64 * 0.2).ceil() as usize;
        let medium_cut = (n as f64 * 0.5).ceil() as usize;

        for (rank, record) in records.iter_mut().enumerate() {
            record.bucket = if rank < high_cut {
                LtvBucket::High
            } else if rank < medium_cut {
                LtvBucket::Medium
            } else {
                let days_since_last = (now - record.last_purchase).num_days();
                if days_since_last < self.active_window_days {
                    LtvBucket::Low
                } else {
                    LtvBucket::Churned
                }
            };
        }

        debug!(customers = n, "LTV pass complete");
        records
    }
}
