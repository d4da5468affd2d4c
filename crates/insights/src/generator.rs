//! Rule engine turning aggregate analytics state into alerts,
//! opportunities and recommendations.
//!
//! The triggering thresholds and the categorization are the contract;
//! message wording is a rendering detail.

use serde::Serialize;
use tracing::debug;

use crate::trends::{Anomaly, TrendDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSeverity {
    Critical,
    Warning,
    Info,
}

/// Serialize-only: reports are emitted, never read back, and `code` stays
/// a static identifier.
#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub severity: InsightSeverity,
    pub code: &'static str,
    pub message: String,
}

/// Aggregate state the rules evaluate. Assembled by the caller from the
/// tracker snapshot, trend analysis and scoring output.
#[derive(Debug, Clone, Default)]
pub struct InsightInputs {
    /// Fractions in [0, 1].
    pub cart_abandonment_rate: f64,
    pub conversion_rate: f64,
    pub bounce_rate: f64,
    pub total_page_views: u64,
    pub revenue_trend: Option<TrendDirection>,
    pub high_ltv_customers: usize,
    pub at_risk_customers: usize,
    pub anomaly: Option<Anomaly>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InsightReport {
    pub alerts: Vec<Insight>,
    pub opportunities: Vec<Insight>,
    pub recommendations: Vec<Insight>,
    pub anomalies: Vec<Anomaly>,
}

/// Pure rule evaluation over the current aggregate state.
pub fn generate_insights(inputs: &InsightInputs) -> InsightReport {
    let mut report = InsightReport::default();

    if inputs.cart_abandonment_rate > 0.70 {
        report.alerts.push(Insight {
            severity: InsightSeverity::Critical,
            code: "cart_abandonment_high",
            message: format!(
                "Cart abandonment is at {:.0}% of created carts",
                inputs.cart_abandonment_rate * 100.0
            ),
        });
        report.recommendations.push(Insight {
            severity: InsightSeverity::Info,
            code: "enable_cart_recovery",
            message: "Enable the cart-recovery automation to win back abandoned carts".into(),
        });
    }

    if inputs.conversion_rate < 0.02 && inputs.total_page_views > 100 {
        report.alerts.push(Insight {
            severity: InsightSeverity::Warning,
            code: "conversion_low",
            message: format!(
                "Conversion rate is {:.2}% across {} page views",
                inputs.conversion_rate * 100.0,
                inputs.total_page_views
            ),
        });
    }

    if inputs.bounce_rate > 0.60 {
        report.alerts.push(Insight {
            severity: InsightSeverity::Warning,
            code: "bounce_rate_high",
            message: format!(
                "Bounce rate is {:.0}% of ended sessions",
                inputs.bounce_rate * 100.0
            ),
        });
        report.recommendations.push(Insight {
            severity: InsightSeverity::Info,
            code: "review_entry_pages",
            message: "Review top entry pages; most sessions end after one page".into(),
        });
    }

    if inputs.revenue_trend == Some(TrendDirection::Up) {
        report.opportunities.push(Insight {
            severity: InsightSeverity::Info,
            code: "revenue_trending_up",
            message: "Revenue is trending up week over week".into(),
        });
    }

    if inputs.high_ltv_customers > 0 {
        report.opportunities.push(Insight {
            severity: InsightSeverity::Info,
            code: "high_ltv_segment",
            message: format!(
                "{} customers sit in the high lifetime-value bucket",
                inputs.high_ltv_customers
            ),
        });
    }

    if inputs.at_risk_customers > 0 {
        report.opportunities.push(Insight {
            severity: InsightSeverity::Info,
            code: "at_risk_winback",
            message: format!(
                "{} previously valuable customers are at risk of churning",
                inputs.at_risk_customers
            ),
        });
        report.recommendations.push(Insight {
            severity: InsightSeverity::Info,
            code: "launch_winback",
            message: "Launch a win-back campaign for the at-risk segment".into(),
        });
    }

    if let Some(anomaly) = &inputs.anomaly {
        report.anomalies.push(anomaly.clone());
    }

    debug!(
        alerts = report.alerts.len(),
        opportunities = report.opportunities.len(),
        recommendations = report.recommendations.len(),
        "Insight pass complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trends::{AnomalyKind, AnomalySeverity};

    #[test]
    fn test_quiet_store_produces_nothing() {
        let report = generate_insights(&InsightInputs {
            conversion_rate: 0.05,
            ..Default::default()
        });
        assert!(report.alerts.is_empty());
        assert!(report.opportunities.is_empty());
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn test_cart_abandonment_critical() {
        let report = generate_insights(&InsightInputs {
            cart_abandonment_rate: 0.75,
            conversion_rate: 0.05,
            ..Default::default()
        });
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].severity, InsightSeverity::Critical);
        assert_eq!(report.alerts[0].code, "cart_abandonment_high");
        assert_eq!(report.recommendations[0].code, "enable_cart_recovery");
    }

    #[test]
    fn test_low_conversion_needs_traffic() {
        // Below the page-view floor the rule stays quiet.
        let quiet = generate_insights(&InsightInputs {
            conversion_rate: 0.01,
            total_page_views: 50,
            ..Default::default()
        });
        assert!(quiet.alerts.is_empty());

        let loud = generate_insights(&InsightInputs {
            conversion_rate: 0.01,
            total_page_views: 500,
            ..Default::default()
        });
        assert_eq!(loud.alerts[0].code, "conversion_low");
        assert_eq!(loud.alerts[0].severity, InsightSeverity::Warning);
    }

    #[test]
    fn test_opportunities() {
        let report = generate_insights(&InsightInputs {
            conversion_rate: 0.05,
            revenue_trend: Some(TrendDirection::Up),
            high_ltv_customers: 12,
            at_risk_customers: 4,
            ..Default::default()
        });
        let codes: Vec<&str> = report.opportunities.iter().map(|o| o.code).collect();
        assert_eq!(
            codes,
            vec!["revenue_trending_up", "high_ltv_segment", "at_risk_winback"]
        );
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = generate_insights(&InsightInputs {
            cart_abandonment_rate: 0.8,
            conversion_rate: 0.05,
            ..Default::default()
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["alerts"][0]["code"], "cart_abandonment_high");
        assert_eq!(json["alerts"][0]["severity"], "critical");
    }

    #[test]
    fn test_anomaly_passthrough() {
        let report = generate_insights(&InsightInputs {
            conversion_rate: 0.05,
            anomaly: Some(Anomaly {
                kind: AnomalyKind::Drop,
                severity: AnomalySeverity::High,
                observed: 40.0,
                expected: 100.0,
            }),
            ..Default::default()
        });
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].kind, AnomalyKind::Drop);
    }
}
