use std::sync::Arc;

use tracing::warn;

use crate::error::{ExploreError, Result};
use crate::explorer::{ActionResolver, Explorer, Recorder};
use crate::hash::{compute_id_hash, salted_seed};

/// Per-application entry point for decisions.
///
/// Seeds every call from `hash(unique_key) + hash(app_id)` and forwards
/// decisions the explorer marks as recordable to the [`Recorder`]. The app id
/// acts as a namespace, so two experiments sharing unique keys still draw
/// uncorrelated actions.
pub struct MwtExplorer<C> {
    app_hash: u64,
    recorder: Arc<dyn Recorder<C>>,
    resolver: Option<ActionResolver<C>>,
}

impl<C> MwtExplorer<C> {
    pub fn new(app_id: &str, recorder: Arc<dyn Recorder<C>>) -> Self {
        Self {
            app_hash: compute_id_hash(app_id),
            recorder,
            resolver: None,
        }
    }

    /// Builds an explorer for contexts with a per-decision number of actions.
    pub fn with_action_resolver(
        app_id: &str,
        recorder: Arc<dyn Recorder<C>>,
        resolver: ActionResolver<C>,
    ) -> Self {
        Self {
            app_hash: compute_id_hash(app_id),
            recorder,
            resolver: Some(resolver),
        }
    }

    /// Seed a decision for `unique_key` would use.
    pub fn seed_for(&self, unique_key: &str) -> u64 {
        salted_seed(compute_id_hash(unique_key), self.app_hash)
    }

    /// Chooses the actions for one decision and records it when required.
    ///
    /// The returned actions never depend on whether recording succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ExploreError::InvalidArgument`] for an empty `unique_key` and
    /// propagates whatever the explorer reports.
    pub fn choose_action(
        &self,
        explorer: &dyn Explorer<C>,
        unique_key: &str,
        context: &C,
    ) -> Result<Vec<u32>> {
        if unique_key.is_empty() {
            return Err(ExploreError::InvalidArgument(
                "unique key must not be empty".into(),
            ));
        }

        let decision =
            explorer.choose_action(self.seed_for(unique_key), context, self.resolver.as_ref())?;

        if decision.should_record
            && !self
                .recorder
                .record(context, &decision.actions, decision.probability, unique_key)
        {
            warn!(unique_key, "decision was not recorded");
        }

        Ok(decision.actions)
    }
}
