//! Trend, seasonality and anomaly analysis over daily snapshots, plus the
//! rule engine that turns aggregate state into actionable insights.

pub mod generator;
pub mod trends;

pub use generator::{Insight, InsightInputs, InsightReport, InsightSeverity, generate_insights};
pub use trends::{
    Anomaly, AnomalyKind, AnomalySeverity, DailySnapshot, ForecastPoint, Metric, Seasonality,
    TrendDirection, direction, detect_anomaly, forecast_revenue, seasonality,
};
