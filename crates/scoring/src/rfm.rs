//! RFM (recency / frequency / monetary) scoring.
//!
//! Two bucketing policies are supported: fixed thresholds (the canonical
//! default) and population percentile quintiles. A scoring pass is a pure
//! function of the order history it is handed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use pulse_core::config::RfmPolicy;
use pulse_core::types::Order;

/// One customer's fully recomputed RFM result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfmScore {
    pub customer_id: String,
    pub recency_days: i64,
    pub frequency: u64,
    pub monetary: f64,
    /// Each dimension score is in [1, 5].
    pub recency_score: u8,
    pub frequency_score: u8,
    pub monetary_score: u8,
    /// The three digit scores concatenated, e.g. "524".
    pub composite: String,
    pub segment: RfmSegment,
    pub last_updated: DateTime<Utc>,
}

/// Named RFM segment. Every scored customer lands in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfmSegment {
    Champions,
    LoyalCustomers,
    NewCustomers,
    PotentialLoyalist,
    Promising,
    NeedsAttention,
    AboutToSleep,
    CantLoseThem,
    AtRisk,
    Lost,
    Hibernating,
    Other,
}

/// Assigns the segment from the (R, F, M) digit scores. Rules are checked
/// most-specific first so narrow segments are reachable ahead of the
/// broader ones that contain them.
pub fn segment_for(r: u8, f: u8, m: u8) -> RfmSegment {
    if r >= 4 && f >= 4 && m >= 4 {
        RfmSegment::Champions
    } else if r >= 3 && f >= 3 && m >= 3 {
        RfmSegment::LoyalCustomers
    } else if r >= 4 && f == 1 {
        RfmSegment::NewCustomers
    } else if r >= 4 && f <= 3 {
        RfmSegment::PotentialLoyalist
    } else if r >= 3 && (2..=3).contains(&f) {
        RfmSegment::Promising
    } else if r == 3 && f >= 3 {
        RfmSegment::NeedsAttention
    } else if r == 1 && f >= 4 && m >= 4 {
        RfmSegment::CantLoseThem
    } else if r <= 2 && f >= 3 && m >= 3 {
        RfmSegment::AtRisk
    } else if r == 2 && f >= 2 {
        RfmSegment::AboutToSleep
    } else if r == 1 && f == 1 {
        RfmSegment::Lost
    } else if r <= 2 && f <= 2 {
        RfmSegment::Hibernating
    } else {
        RfmSegment::Other
    }
}

/// Raw per-customer dimensions before bucketing.
#[derive(Debug, Clone, Copy)]
struct RawDimensions {
    recency_days: i64,
    frequency: u64,
    monetary: f64,
}

fn raw_dimensions(orders: &[Order], now: DateTime<Utc>) -> Option<RawDimensions> {
    let latest = orders.iter().map(|o| o.placed_at).max()?;
    Some(RawDimensions {
        recency_days: (now - latest).num_days().max(0),
        frequency: orders.len() as u64,
        monetary: orders.iter().map(|o| o.amount).sum(),
    })
}

// Fixed-threshold buckets.

fn fixed_recency_score(days: i64) -> u8 {
    match days {
        d if d <= 7 => 5,
        d if d <= 30 => 4,
        d if d <= 60 => 3,
        d if d <= 90 => 2,
        _ => 1,
    }
}

fn fixed_frequency_score(count: u64) -> u8 {
    match count {
        c if c >= 20 => 5,
        c if c >= 10 => 4,
        c if c >= 5 => 3,
        c if c >= 2 => 2,
        _ => 1,
    }
}

fn fixed_monetary_score(total: f64) -> u8 {
    if total >= 1000.0 {
        5
    } else if total >= 500.0 {
        4
    } else if total >= 200.0 {
        3
    } else if total >= 50.0 {
        2
    } else {
        1
    }
}

/// 20/40/60/80th percentile cut points for one dimension.
#[derive(Debug, Clone, Copy)]
struct Quintiles([f64; 4]);

impl Quintiles {
    fn from_values(mut values: Vec<f64>) -> Self {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let at = |pct: f64| {
            if values.is_empty() {
                return 0.0;
            }
            let idx = ((values.len() as f64 * pct).ceil() as usize).min(values.len()) - 1;
            values[idx]
        };
        Quintiles([at(0.2), at(0.4), at(0.6), at(0.8)])
    }

    /// Bucket with 5 = highest values.
    fn score(&self, value: f64) -> u8 {
        let mut score = 1u8;
        for bound in self.0 {
            if value > bound {
                score += 1;
            }
        }
        score
    }

    /// Bucket with 5 = lowest values (recency: fewer days is better).
    fn score_inverted(&self, value: f64) -> u8 {
        6 - self.score(value)
    }
}

/// Computes RFM scores for a population of customers under the configured
/// bucketing policy.
pub struct RfmScorer {
    policy: RfmPolicy,
}

impl RfmScorer {
    pub fn new(policy: RfmPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RfmPolicy {
        self.policy
    }

    /// Scores one customer under the fixed-threshold policy. A pure
    /// function of the order history. Customers with no orders are not
    /// scored.
    pub fn score_customer(
        &self,
        customer_id: &str,
        orders: &[Order],
        now: DateTime<Utc>,
    ) -> Option<RfmScore> {
        let dims = raw_dimensions(orders, now)?;
        Some(build_score(
            customer_id,
            dims,
            fixed_recency_score(dims.recency_days),
            fixed_frequency_score(dims.frequency),
            fixed_monetary_score(dims.monetary),
            now,
        ))
    }

    /// Scores the whole population in one pass. Under the percentile
    /// policy the quintile boundaries are derived from this population, so
    /// the result set is internally consistent for the pass.
    pub fn score_population(
        &self,
        population: &[(String, Vec<Order>)],
        now: DateTime<Utc>,
    ) -> Vec<RfmScore> {
        let dims: Vec<(&str, RawDimensions)> = population
            .iter()
            .filter_map(|(id, orders)| raw_dimensions(orders, now).map(|d| (id.as_str(), d)))
            .collect();

        let scores = match self.policy {
            RfmPolicy::FixedThresholds => dims
                .iter()
                .map(|(id, d)| {
                    build_score(
                        id,
                        *d,
                        fixed_recency_score(d.recency_days),
                        fixed_frequency_score(d.frequency),
                        fixed_monetary_score(d.monetary),
                        now,
                    )
                })
                .collect::<Vec<_>>(),
            RfmPolicy::Percentile => {
                let recency =
                    Quintiles::from_values(dims.iter().map(|(_, d)| d.recency_days as f64).collect());
                let frequency =
                    Quintiles::from_values(dims.iter().map(|(_, d)| d.frequency as f64).collect());
                let monetary =
                    Quintiles::from_values(dims.iter().map(|(_, d)| d.monetary).collect());
                dims.iter()
                    .map(|(id, d)| {
                        build_score(
                            id,
                            *d,
                            recency.score_inverted(d.recency_days as f64),
                            frequency.score(d.frequency as f64),
                            monetary.score(d.monetary),
                            now,
                        )
                    })
                    .collect()
            }
        };

        debug!(
            customers = scores.len(),
            policy = ?self.policy,
            "RFM pass complete"
        );
        scores
    }
}

fn build_score(
    customer_id: &str,
    dims: RawDimensions,
    r: u8,
    f: u8,
    m: u8,
    now: DateTime<Utc>,
) -> RfmScore {
    RfmScore {
        customer_id: customer_id.to_string(),
        recency_days: dims.recency_days,
        frequency: dims.frequency,
        monetary: dims.monetary,
        recency_score: r,
        frequency_score: f,
        monetary_score: m,
        composite: format!("{}{}{}", r, f, m),
        segment: segment_for(r, f, m),
        last_updated: now,
    }
}
