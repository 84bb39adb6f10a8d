//! Deterministic exploration primitives for contextual-bandit decisions.
//!
//! A decision is seeded from the application id and a caller-supplied unique
//! key, so the same `(app_id, unique_key, context)` always yields the same
//! action as long as the explorer state is the same. Decisions that carry
//! information for offline learning are handed to a [`Recorder`].

/// Decision result shared by all explorers.
pub mod decision;
/// Error types for exploration calls.
pub mod error;
/// Policy, explorer and recorder contracts plus action-list helpers.
pub mod explorer;
/// Stable string hashing used for seeding.
pub mod hash;
/// The per-application entry point.
pub mod mwt;
/// Seeded pseudo-random generator.
pub mod prg;
/// In-memory recorder.
pub mod recorder;
/// Tau-first exploration.
pub mod tau_first;

pub use decision::DecisionTuple;
pub use error::{ExploreError, Result};
pub use explorer::{ActionCount, ActionResolver, ConsumePolicy, Explorer, Policy, Recorder};
pub use hash::compute_id_hash;
pub use mwt::MwtExplorer;
pub use prg::Prg;
pub use recorder::{RecordedDecision, StringRecorder};
pub use tau_first::TauFirstExplorer;
