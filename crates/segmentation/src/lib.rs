//! Segmentation Engine — behavioral, value and engagement buckets.
//!
//! Independent of RFM scoring. Segment sets are rebuilt from scratch on
//! every pass and swapped in atomically; nothing is incrementally diffed,
//! which rules out stale-membership bugs at the cost of recompute work.

pub mod engine;

pub use engine::{
    BehavioralSegment, CustomerActivity, EngagementSegment, SegmentSnapshot, SegmentationEngine,
    ValueSegment,
};
