//! rotor-health: the health gate around every node operation.
//!
//! A rollout captures a [`HealthSnapshot`] before touching a node, performs
//! the replace or restart, then polls until a fresh snapshot is no worse
//! than the one taken before.
//!
//! # Architecture
//!
//! ```text
//! HealthGate
//!   ├── HealthAggregator (external) → HealthSnapshot
//!   ├── is_degraded(current, baseline)
//!   └── wait_for_recovery(baseline, timeout) via rotor_core::Poller
//! ```

pub mod gate;
pub mod snapshot;

pub use gate::HealthGate;
pub use snapshot::{HealthAggregator, HealthSnapshot};
