//! Drift detection core: signal sources, aggregation, session accounting,
//! and the per-session daemon that wires them together.

pub mod aggregator;
pub mod config;
pub mod daemon;
pub mod heartbeat;
pub mod session;
pub mod signal;
pub mod sources;

pub use aggregator::DriftAggregator;
pub use config::{config_path, get_data_dir, HelmsmanConfig};
pub use daemon::{DaemonServices, FocusDaemon, HostEvent};
pub use heartbeat::HeartbeatScheduler;
pub use session::{Session, SessionLifecycleController, SessionState};
pub use signal::{CandidateKind, CandidateTx, DriftCandidate, DriftState, SignalKind};
