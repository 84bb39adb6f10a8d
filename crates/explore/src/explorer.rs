use std::collections::HashSet;
use std::sync::Arc;

use crate::decision::DecisionTuple;
use crate::error::{ExploreError, Result};

/// Deterministic default policy an explorer falls back to when exploiting.
///
/// Returns 1-based action ids ranked best first. Single-action policies
/// return a one-element list.
pub trait Policy<C>: Send + Sync {
    fn choose_actions(&self, context: &C) -> Vec<u32>;
}

impl<C, F> Policy<C> for F
where
    F: Fn(&C) -> Vec<u32> + Send + Sync,
{
    fn choose_actions(&self, context: &C) -> Vec<u32> {
        self(context)
    }
}

/// Resolves the number of available actions for contexts whose action set
/// varies per decision.
pub type ActionResolver<C> = Arc<dyn Fn(&C) -> u32 + Send + Sync>;

/// How an explorer learns the number of actions it randomizes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCount {
    Fixed(u32),
    /// Resolved per context through an [`ActionResolver`].
    Variable,
}

/// An exploration algorithm.
///
/// Implementations may hold shared mutable state (budgets, counters); they
/// must stay correct when one instance serves many threads at once.
pub trait Explorer<C>: Send + Sync {
    fn choose_action(
        &self,
        salted_seed: u64,
        context: &C,
        resolver: Option<&ActionResolver<C>>,
    ) -> Result<DecisionTuple>;
}

/// Explorers whose default policy can be replaced at runtime.
pub trait ConsumePolicy<C> {
    fn update_policy(&self, policy: Arc<dyn Policy<C>>);
}

/// Receives decisions that must be logged.
///
/// `record` is called on the decision path and must not block or perform
/// network I/O. The return value reports whether the decision was accepted.
pub trait Recorder<C>: Send + Sync {
    fn record(&self, context: &C, actions: &[u32], probability: f32, unique_key: &str) -> bool;
}

impl<C, R> Recorder<C> for Arc<R>
where
    R: Recorder<C> + ?Sized,
{
    fn record(&self, context: &C, actions: &[u32], probability: f32, unique_key: &str) -> bool {
        (**self).record(context, actions, probability, unique_key)
    }
}

pub fn resolve_action_count<C>(
    count: ActionCount,
    context: &C,
    resolver: Option<&ActionResolver<C>>,
) -> Result<u32> {
    let resolved = match count {
        ActionCount::Fixed(n) => n,
        ActionCount::Variable => {
            let resolver = resolver.ok_or_else(|| {
                ExploreError::Configuration(
                    "a callback to retrieve the number of actions for the current context has not been set"
                        .into(),
                )
            })?;
            resolver(context)
        }
    };
    if resolved < 1 {
        return Err(ExploreError::InvalidArgument(
            "number of actions must be at least 1".into(),
        ));
    }
    Ok(resolved)
}

/// Checks a policy's action list: non-empty, 1-based, in range, unique.
pub fn validate_action_list(actions: &[u32], num_actions: u32) -> Result<()> {
    if actions.is_empty() {
        return Err(ExploreError::InvalidArgument(
            "action list must not be empty".into(),
        ));
    }
    let mut seen = HashSet::with_capacity(actions.len());
    for &action in actions {
        if action < 1 || action > num_actions {
            return Err(ExploreError::InvalidArgument(format!(
                "action {action} is outside the range 1..={num_actions}"
            )));
        }
        if !seen.insert(action) {
            return Err(ExploreError::InvalidArgument(format!(
                "action {action} appears more than once"
            )));
        }
    }
    Ok(())
}

/// Moves `action` to the head of `actions`.
///
/// If the action is already ranked it swaps places with the current head,
/// otherwise it replaces the head. The list keeps its length and stays
/// duplicate-free.
pub fn put_action_to_list(action: u32, actions: &mut [u32]) {
    if actions.is_empty() {
        return;
    }
    match actions.iter().position(|&a| a == action) {
        Some(idx) => actions.swap(0, idx),
        None => actions[0] = action,
    }
}
