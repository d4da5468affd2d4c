//! Scoring Engine — RFM and lifetime-value scoring from authoritative
//! order history, plus cohort retention tracking.
//!
//! Every scoring pass fully recomputes its output; scores are never
//! incrementally mutated.

pub mod cohort;
pub mod ltv;
pub mod rfm;

pub use cohort::{Cohort, CohortAnalyzer, CohortPeriod};
pub use ltv::{LtvBucket, LtvRecord, LtvScorer};
pub use rfm::{RfmScore, RfmScorer, RfmSegment};
