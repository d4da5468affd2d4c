//! Shared foundation for the ShopPulse customer intelligence platform.
//!
//! Holds the domain types used across tracking, scoring, segmentation and
//! automation, the error taxonomy, configuration loading, the collaborator
//! traits (order history, customer directory, notification dispatch) and the
//! in-memory durable store primitives.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use error::{PulseError, PulseResult};
