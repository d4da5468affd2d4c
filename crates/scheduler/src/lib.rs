//! Background scheduler — periodic sweeps that drive the rest of the
//! system: due-job execution, abandoned-cart detection, full score
//! recomputes and at-risk VIP detection.

pub mod analytics;
pub mod runner;
pub mod sweeps;

pub use analytics::{AnalyticsHub, ScoreSnapshot};
pub use runner::Scheduler;
