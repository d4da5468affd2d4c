use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Purchase-count behavioral buckets. Mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehavioralSegment {
    Browsers,
    OneTimeBuyers,
    RepeatBuyers,
    Loyalists,
}

/// Total-spend buckets. Mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSegment {
    Vip,
    HighValue,
    MediumValue,
    LowValue,
}

/// Activity-recency buckets. Mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementSegment {
    SuperActive,
    Active,
    Casual,
    Dormant,
}

/// Per-customer inputs to a segmentation pass.
#[derive(Debug, Clone)]
pub struct CustomerActivity {
    pub customer_id: String,
    pub purchase_count: u64,
    pub total_spent: f64,
    pub last_active: DateTime<Utc>,
}

/// Immutable result of one segmentation pass.
#[derive(Debug, Clone, Default)]
pub struct SegmentSnapshot {
    pub behavioral: HashMap<BehavioralSegment, HashSet<String>>,
    /// Overlay on the behavioral buckets: customers idle for more than 30
    /// days, regardless of purchase count.
    pub inactive: HashSet<String>,
    pub value: HashMap<ValueSegment, HashSet<String>>,
    pub engagement: HashMap<EngagementSegment, HashSet<String>>,
    pub computed_at: Option<DateTime<Utc>>,
}

impl SegmentSnapshot {
    pub fn behavioral_members(&self, segment: BehavioralSegment) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        self.behavioral
            .get(&segment)
            .unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
    }

    pub fn value_members(&self, segment: ValueSegment) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        self.value
            .get(&segment)
            .unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
    }

    pub fn engagement_members(&self, segment: EngagementSegment) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        self.engagement
            .get(&segment)
            .unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
    }
}

pub fn behavioral_segment(purchase_count: u64) -> BehavioralSegment {
    match purchase_count {
        0 => BehavioralSegment::Browsers,
        1 => BehavioralSegment::OneTimeBuyers,
        2..=5 => BehavioralSegment::RepeatBuyers,
        _ => BehavioralSegment::Loyalists,
    }
}

pub fn value_segment(total_spent: f64) -> ValueSegment {
    if total_spent >= 1000.0 {
        ValueSegment::Vip
    } else if total_spent >= 500.0 {
        ValueSegment::HighValue
    } else if total_spent >= 100.0 {
        ValueSegment::MediumValue
    } else {
        ValueSegment::LowValue
    }
}

pub fn engagement_segment(days_since_active: i64) -> EngagementSegment {
    match days_since_active {
        d if d <= 1 => EngagementSegment::SuperActive,
        d if d <= 7 => EngagementSegment::Active,
        d if d <= 30 => EngagementSegment::Casual,
        _ => EngagementSegment::Dormant,
    }
}

/// Rebuilds the full segment snapshot on demand and serves the latest one.
pub struct SegmentationEngine {
    current: RwLock<Arc<SegmentSnapshot>>,
}

impl SegmentationEngine {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(SegmentSnapshot::default())),
        }
    }

    /// Recomputes every segment set from scratch and swaps the new
    /// snapshot in atomically.
    pub fn rebuild(
        &self,
        activities: &[CustomerActivity],
        now: DateTime<Utc>,
    ) -> Arc<SegmentSnapshot> {
        let mut snapshot = SegmentSnapshot {
            computed_at: Some(now),
            ..Default::default()
        };

        for activity in activities {
            let id = activity.customer_id.clone();
            let days_idle = (now - activity.last_active).num_days();

            snapshot
                .behavioral
                .entry(behavioral_segment(activity.purchase_count))
                .or_default()
                .insert(id.clone());
            if days_idle > 30 {
                snapshot.inactive.insert(id.clone());
            }
            snapshot
                .value
                .entry(value_segment(activity.total_spent))
                .or_default()
                .insert(id.clone());
            snapshot
                .engagement
                .entry(engagement_segment(days_idle))
                .or_default()
                .insert(id);
        }

        let snapshot = Arc::new(snapshot);
        *self.current.write() = snapshot.clone();
        debug!(customers = activities.len(), "Segmentation pass complete");
        snapshot
    }

    /// The most recently computed snapshot.
    pub fn snapshot(&self) -> Arc<SegmentSnapshot> {
        self.current.read().clone()
    }
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn activity(id: &str, purchases: u64, spent: f64, idle_days: i64) -> CustomerActivity {
        CustomerActivity {
            customer_id: id.to_string(),
            purchase_count: purchases,
            total_spent: spent,
            last_active: Utc::now() - Duration::days(idle_days),
        }
    }

    #[test]
    fn test_behavioral_buckets() {
        assert_eq!(behavioral_segment(0), BehavioralSegment::Browsers);
        assert_eq!(behavioral_segment(1), BehavioralSegment::OneTimeBuyers);
        assert_eq!(behavioral_segment(3), BehavioralSegment::RepeatBuyers);
        assert_eq!(behavioral_segment(5), BehavioralSegment::RepeatBuyers);
        assert_eq!(behavioral_segment(6), BehavioralSegment::Loyalists);
    }

    #[test]
    fn test_value_and_engagement_buckets() {
        assert_eq!(value_segment(1200.0), ValueSegment::Vip);
        assert_eq!(value_segment(500.0), ValueSegment::HighValue);
        assert_eq!(value_segment(99.0), ValueSegment::LowValue);

        assert_eq!(engagement_segment(0), EngagementSegment::SuperActive);
        assert_eq!(engagement_segment(7), EngagementSegment::Active);
        assert_eq!(engagement_segment(30), EngagementSegment::Casual);
        assert_eq!(engagement_segment(31), EngagementSegment::Dormant);
    }

    #[test]
    fn test_rebuild_partitions_customers() {
        let engine = SegmentationEngine::new();
        let now = Utc::now();
        let activities = vec![
            activity("vip", 8, 2000.0, 0),
            activity("casual", 1, 80.0, 20),
            activity("gone", 3, 600.0, 45),
        ];

        let snapshot = engine.rebuild(&activities, now);

        assert!(snapshot
            .behavioral_members(BehavioralSegment::Loyalists)
            .contains("vip"));
        assert!(snapshot
            .value_members(ValueSegment::Vip)
            .contains("vip"));
        assert!(snapshot
            .engagement_members(EngagementSegment::Dormant)
            .contains("gone"));
        assert!(snapshot.inactive.contains("gone"));
        assert!(!snapshot.inactive.contains("casual"));

        // Each customer lands in exactly one bucket per dimension.
        for id in ["vip", "casual", "gone"] {
            let behavioral_hits = snapshot
                .behavioral
                .values()
                .filter(|set| set.contains(id))
                .count();
            let value_hits = snapshot.value.values().filter(|s| s.contains(id)).count();
            let engagement_hits = snapshot
                .engagement
                .values()
                .filter(|s| s.contains(id))
                .count();
            assert_eq!((behavioral_hits, value_hits, engagement_hits), (1, 1, 1));
        }
    }

    #[test]
    fn test_rebuild_replaces_previous_snapshot() {
        let engine = SegmentationEngine::new();
        let now = Utc::now();
        engine.rebuild(&[activity("old", 1, 50.0, 0)], now);
        engine.rebuild(&[activity("new", 1, 50.0, 0)], now);

        let snapshot = engine.snapshot();
        assert!(!snapshot
            .behavioral_members(BehavioralSegment::OneTimeBuyers)
            .contains("old"));
        assert!(snapshot
            .behavioral_members(BehavioralSegment::OneTimeBuyers)
            .contains("new"));
    }
}
