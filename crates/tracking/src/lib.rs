//! Event Tracker — hot-path behavioral ingestion.
//!
//! Records raw events and session lifecycle, maintains a bounded ring
//! buffer of recent events plus cheap denormalized counters. Nothing in
//! this crate blocks the caller: tracking failures are logged and
//! swallowed.

pub mod session;
pub mod tracker;

pub use session::SessionStore;
pub use tracker::{AbandonedCart, EventTracker, TrackerSnapshot};
