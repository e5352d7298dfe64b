//! Event-driven signal sources.
//!
//! Each watcher owns one attention dimension, runs as its own task, and
//! publishes [`crate::signal::DriftCandidate`] values onto the shared
//! channel. The watchers never touch each other's state; the aggregator is
//! the only consumer.

pub mod context;
pub mod idle;
pub mod visibility;

pub use context::{ContextChange, ContextRules, ContextWatcher};
pub use idle::IdleWatcher;
pub use visibility::{VisibilityEvent, VisibilityWatcher};
