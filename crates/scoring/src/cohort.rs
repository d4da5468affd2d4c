//! Cohort retention analysis over order history.
//!
//! Customers are grouped by the period of their first purchase (or by
//! acquisition source) and tracked for repeat activity in subsequent
//! intervals.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use pulse_core::types::Order;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortPeriod {
    Monthly,
    Weekly,
    AcquisitionSource,
}

/// A group of customers who first purchased in the same period (or came
/// from the same source), with their retention curve and revenue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cohort {
    pub key: String,
    pub period: CohortPeriod,
    pub members: HashSet<String>,
    /// interval index -> fraction of members who purchased again in that
    /// interval.
    pub retention: BTreeMap<u32, f64>,
    pub revenue: f64,
}

pub struct CohortAnalyzer {
    num_intervals: u32,
}

impl CohortAnalyzer {
    pub fn new(num_intervals: u32) -> Self {
        Self { num_intervals }
    }

    /// Cohorts keyed by first-purchase month (`YYYY-MM`), retention per
    /// month offset.
    pub fn monthly(&self, population: &[(String, Vec<Order>)]) -> Vec<Cohort> {
        self.by_period(population, CohortPeriod::Monthly)
    }

    /// Cohorts keyed by first-purchase ISO week (`YYYY-Www`), retention
    /// per week offset.
    pub fn weekly(&self, population: &[(String, Vec<Order>)]) -> Vec<Cohort> {
        self.by_period(population, CohortPeriod::Weekly)
    }

    /// Cohorts keyed by acquisition source; retention is measured in
    /// months since each member's first purchase.
    pub fn by_source(
        &self,
        population: &[(String, Vec<Order>)],
        source_of: &HashMap<String, String>,
    ) -> Vec<Cohort> {
        let mut cohorts: BTreeMap<String, CohortBuilder> = BTreeMap::new();
        for (customer_id, orders) in population {
            let Some(first) = orders.iter().map(|o| o.placed_at).min() else {
                continue;
            };
            let key = source_of
                .get(customer_id)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            let builder = cohorts.entry(key).or_default();
            builder.add_member(customer_id, orders, |at| month_offset(first, at));
        }
        finish(cohorts, CohortPeriod::AcquisitionSource, self.num_intervals)
    }

    fn by_period(&self, population: &[(String, Vec<Order>)], period: CohortPeriod) -> Vec<Cohort> {
        let mut cohorts: BTreeMap<String, CohortBuilder> = BTreeMap::new();
        for (customer_id, orders) in population {
            let Some(first) = orders.iter().map(|o| o.placed_at).min() else {
                continue;
            };
            let key = match period {
                CohortPeriod::Monthly => format!("{:04}-{:02}", first.year(), first.month()),
                CohortPeriod::Weekly => {
                    let week = first.iso_week();
                    format!("{:04}-W{:02}", week.year(), week.week())
                }
                CohortPeriod::AcquisitionSource => unreachable!(),
            };
            let builder = cohorts.entry(key).or_default();
            builder.add_member(customer_id, orders, |at| match period {
                CohortPeriod::Weekly => week_offset(first, at),
                _ => month_offset(first, at),
            });
        }
        finish(cohorts, period, self.num_intervals)
    }
}

impl Default for CohortAnalyzer {
    fn default() -> Self {
        Self::new(6)
    }
}

#[derive(Default)]
struct CohortBuilder {
    members: HashSet<String>,
    /// interval -> members seen purchasing in that interval
    active: BTreeMap<u32, HashSet<String>>,
    revenue: f64,
}

impl CohortBuilder {
    fn add_member<F>(&mut self, customer_id: &str, orders: &[Order], offset_of: F)
    where
        F: Fn(DateTime<Utc>) -> u32,
    {
        self.members.insert(customer_id.to_string());
        for order in orders {
            self.revenue += order.amount;
            let interval = offset_of(order.placed_at);
            if interval > 0 {
                self.active
                    .entry(interval)
                    .or_default()
                    .insert(customer_id.to_string());
            }
        }
    }
}

fn finish(
    cohorts: BTreeMap<String, CohortBuilder>,
    period: CohortPeriod,
    num_intervals: u32,
) -> Vec<Cohort> {
    cohorts
        .into_iter()
        .map(|(key, builder)| {
            let size = builder.members.len() as f64;
            let mut retention = BTreeMap::new();
            for interval in 1..=num_intervals {
                let retained = builder
                    .active
                    .get(&interval)
                    .map(|s| s.len() as f64)
                    .unwrap_or(0.0);
                retention.insert(interval, if size > 0.0 { retained / size } else { 0.0 });
            }
            Cohort {
                key,
                period,
                members: builder.members,
                retention,
                revenue: builder.revenue,
            }
        })
        .collect()
}

fn month_offset(first: DateTime<Utc>, at: DateTime<Utc>) -> u32 {
    let months =
        (at.year() - first.year()) * 12 + at.month() as i32 - first.month() as i32;
    months.max(0) as u32
}

fn week_offset(first: DateTime<Utc>, at: DateTime<Utc>) -> u32 {
    ((at - first).num_weeks()).max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn order_at(customer_id: &str, amount: f64, at: DateTime<Utc>) -> Order {
        Order {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            amount,
            placed_at: at,
        }
    }

    #[test]
    fn test_monthly_cohort_retention() {
        let jan = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();

        let population = vec![
            // Retained: buys in January and again in February.
            (
                "c1".to_string(),
                vec![order_at("c1", 100.0, jan), order_at("c1", 60.0, feb)],
            ),
            // Not retained: only the January order.
            ("c2".to_string(), vec![order_at("c2", 40.0, jan)]),
        ];

        let cohorts = CohortAnalyzer::new(3).monthly(&population);
        assert_eq!(cohorts.len(), 1);
        let cohort = &cohorts[0];
        assert_eq!(cohort.key, "2026-01");
        assert_eq!(cohort.members.len(), 2);
        assert_eq!(cohort.retention.get(&1), Some(&0.5));
        assert_eq!(cohort.revenue, 200.0);
    }

    #[test]
    fn test_source_cohorts() {
        let now = Utc::now();
        let population = vec![
            ("c1".to_string(), vec![order_at("c1", 10.0, now)]),
            ("c2".to_string(), vec![order_at("c2", 20.0, now)]),
        ];
        let mut sources = HashMap::new();
        sources.insert("c1".to_string(), "newsletter".to_string());

        let cohorts = CohortAnalyzer::default().by_source(&population, &sources);
        assert_eq!(cohorts.len(), 2);
        assert!(cohorts.iter().any(|c| c.key == "newsletter"));
        assert!(cohorts.iter().any(|c| c.key == "unknown"));
    }

    #[test]
    fn test_weekly_offsets() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let population = vec![(
            "c1".to_string(),
            vec![
                order_at("c1", 10.0, start),
                order_at("c1", 10.0, start + Duration::weeks(2)),
            ],
        )];

        let cohorts = CohortAnalyzer::new(4).weekly(&population);
        assert_eq!(cohorts[0].retention.get(&2), Some(&1.0));
        assert_eq!(cohorts[0].retention.get(&1), Some(&0.0));
    }
}
