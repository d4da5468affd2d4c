//! Aggregated analytics state.
//!
//! The hub owns the scorers and the segmentation engine, recomputes all of
//! them from the authoritative order history in one pass, and serves the
//! latest results as immutable snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use pulse_core::collaborators::OrderHistory;
use pulse_core::config::ScoringConfig;
use pulse_core::types::Order;
use pulse_scoring::{
    Cohort, CohortAnalyzer, LtvBucket, LtvRecord, LtvScorer, RfmScore, RfmScorer, RfmSegment,
};
use pulse_segmentation::{CustomerActivity, SegmentSnapshot, SegmentationEngine};

/// Immutable result of one full scoring pass.
#[derive(Debug, Clone, Default)]
pub struct ScoreSnapshot {
    pub rfm: HashMap<String, RfmScore>,
    pub ltv: HashMap<String, LtvRecord>,
    pub computed_at: Option<DateTime<Utc>>,
}

impl ScoreSnapshot {
    /// Customers ranked in the high-value LTV bucket.
    pub fn high_ltv_count(&self) -> usize {
        self.ltv
            .values()
            .filter(|r| r.bucket == LtvBucket::High)
            .count()
    }

    /// Customers in RFM segments that warrant win-back attention.
    pub fn at_risk_count(&self) -> usize {
        self.rfm
            .values()
            .filter(|s| matches!(s.segment, RfmSegment::AtRisk | RfmSegment::CantLoseThem))
            .count()
    }
}

/// Owns every derived-analytics engine and the latest snapshots. Readers
/// always see a complete, internally consistent pass; a recompute swaps in
/// atomically.
pub struct AnalyticsHub {
    rfm: RfmScorer,
    ltv: LtvScorer,
    cohort: CohortAnalyzer,
    segmentation: SegmentationEngine,
    scores: RwLock<Arc<ScoreSnapshot>>,
    cohorts: RwLock<Arc<Vec<Cohort>>>,
}

impl AnalyticsHub {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            rfm: RfmScorer::new(config.rfm_policy),
            ltv: LtvScorer::new(config.active_window_days),
            cohort: CohortAnalyzer::default(),
            segmentation: SegmentationEngine::new(),
            scores: RwLock::new(Arc::new(ScoreSnapshot::default())),
            cohorts: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Full recompute: RFM, LTV and segmentation from the same order
    /// population, swapped in as one snapshot.
    pub fn recompute(
        &self,
        orders: &Arc<dyn OrderHistory>,
        now: DateTime<Utc>,
    ) -> Arc<ScoreSnapshot> {
        let population: Vec<(String, Vec<Order>)> = orders
            .customer_ids()
            .into_iter()
            .map(|id| {
                let history = orders.orders_for(&id);
                (id, history)
            })
            .collect();

        let rfm = self
            .rfm
            .score_population(&population, now)
            .into_iter()
            .map(|s| (s.customer_id.clone(), s))
            .collect::<HashMap<_, _>>();
        let ltv = self
            .ltv
            .score_population(&population, now)
            .into_iter()
            .map(|r| (r.customer_id.clone(), r))
            .collect::<HashMap<_, _>>();

        let activities: Vec<CustomerActivity> = population
            .iter()
            .filter_map(|(id, history)| {
                let last_active = history.iter().map(|o| o.placed_at).max()?;
                Some(CustomerActivity {
                    customer_id: id.clone(),
                    purchase_count: history.len() as u64,
                    total_spent: history.iter().map(|o| o.amount).sum(),
                    last_active,
                })
            })
            .collect();
        self.segmentation.rebuild(&activities, now);
        *self.cohorts.write() = Arc::new(self.cohort.monthly(&population));

        let snapshot = Arc::new(ScoreSnapshot {
            rfm,
            ltv,
            computed_at: Some(now),
        });
        *self.scores.write() = snapshot.clone();
        info!(customers = population.len(), "Analytics recompute complete");
        snapshot
    }

    pub fn scores(&self) -> Arc<ScoreSnapshot> {
        self.scores.read().clone()
    }

    pub fn segments(&self) -> Arc<SegmentSnapshot> {
        self.segmentation.snapshot()
    }

    /// Monthly retention cohorts from the latest recompute.
    pub fn cohorts(&self) -> Arc<Vec<Cohort>> {
        self.cohorts.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pulse_core::collaborators::InMemoryOrderHistory;
    use pulse_segmentation::ValueSegment;
    use uuid::Uuid;

    fn order(customer_id: &str, amount: f64, days_ago: i64) -> Order {
        Order {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            amount,
            placed_at: Utc::now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn test_recompute_populates_all_engines() {
        let history = InMemoryOrderHistory::new();
        for days_ago in [5, 20, 40, 70, 100, 130] {
            history.record_order(order("whale", 300.0, days_ago));
        }
        history.record_order(order("minnow", 20.0, 3));
        let orders: Arc<dyn OrderHistory> = Arc::new(history);

        let hub = AnalyticsHub::new(&ScoringConfig::default());
        let snapshot = hub.recompute(&orders, Utc::now());

        assert_eq!(snapshot.rfm.len(), 2);
        assert_eq!(snapshot.ltv.len(), 2);
        assert!(snapshot.computed_at.is_some());
        assert_eq!(snapshot.high_ltv_count(), 1);
        assert_eq!(
            snapshot.ltv.get("whale").map(|r| r.bucket),
            Some(LtvBucket::High)
        );

        let segments = hub.segments();
        assert!(segments.value_members(ValueSegment::Vip).contains("whale"));
        assert!(segments
            .value_members(ValueSegment::LowValue)
            .contains("minnow"));

        let cohorts = hub.cohorts();
        assert!(!cohorts.is_empty());
        assert_eq!(
            cohorts.iter().map(|c| c.members.len()).sum::<usize>(),
            2
        );
    }

    #[test]
    fn test_recompute_replaces_snapshot() {
        let history = InMemoryOrderHistory::new();
        history.record_order(order("c1", 50.0, 1));
        let orders: Arc<dyn OrderHistory> = Arc::new(history);

        let hub = AnalyticsHub::new(&ScoringConfig::default());
        assert!(hub.scores().rfm.is_empty());

        hub.recompute(&orders, Utc::now());
        assert_eq!(hub.scores().rfm.len(), 1);
    }
}
