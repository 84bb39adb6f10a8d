//! Tau-first exploration.
//!
//! The explorer collects exactly `tau` uniformly random decisions and then
//! defers to its default policy for good. Only the random decisions are
//! recorded: an exploit decision has probability 1 and carries nothing an
//! importance-weighted estimator could use.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::decision::DecisionTuple;
use crate::error::Result;
use crate::explorer::{
    put_action_to_list, resolve_action_count, validate_action_list, ActionCount, ActionResolver,
    ConsumePolicy, Explorer, Policy,
};
use crate::prg::Prg;

pub struct TauFirstExplorer<C> {
    default_policy: RwLock<Arc<dyn Policy<C>>>,
    remaining: AtomicU64,
    explore: AtomicBool,
    action_count: ActionCount,
}

impl<C> TauFirstExplorer<C> {
    /// Explores uniformly over a fixed number of actions.
    pub fn new(default_policy: Arc<dyn Policy<C>>, tau: u64, num_actions: u32) -> Self {
        Self::with_action_count(default_policy, tau, ActionCount::Fixed(num_actions))
    }

    /// Explores over a per-context action count; the orchestrator must carry
    /// an [`ActionResolver`].
    pub fn with_variable_actions(default_policy: Arc<dyn Policy<C>>, tau: u64) -> Self {
        Self::with_action_count(default_policy, tau, ActionCount::Variable)
    }

    pub fn with_action_count(
        default_policy: Arc<dyn Policy<C>>,
        tau: u64,
        action_count: ActionCount,
    ) -> Self {
        Self {
            default_policy: RwLock::new(default_policy),
            remaining: AtomicU64::new(tau),
            explore: AtomicBool::new(true),
            action_count,
        }
    }

    /// Turns exploration on or off without touching the remaining budget.
    pub fn enable_explore(&self, explore: bool) {
        self.explore.store(explore, Ordering::Release);
    }

    pub fn remaining_budget(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }

    fn policy(&self) -> Arc<dyn Policy<C>> {
        let guard = self
            .default_policy
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Single decrement-and-test; never lets the budget go below zero.
    fn take_budget(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl<C> ConsumePolicy<C> for TauFirstExplorer<C> {
    fn update_policy(&self, policy: Arc<dyn Policy<C>>) {
        let mut guard = self
            .default_policy
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = policy;
    }
}

impl<C> Explorer<C> for TauFirstExplorer<C> {
    fn choose_action(
        &self,
        salted_seed: u64,
        context: &C,
        resolver: Option<&ActionResolver<C>>,
    ) -> Result<DecisionTuple> {
        let num_actions = resolve_action_count(self.action_count, context, resolver)?;

        let mut actions = self.policy().choose_actions(context);
        validate_action_list(&actions, num_actions)?;

        let explore = self.explore.load(Ordering::Acquire) && self.take_budget();

        if explore {
            let top = Prg::new(salted_seed).uniform_int(1, num_actions);
            put_action_to_list(top, &mut actions);
            debug!(top, num_actions, "tau-first exploration step");
            Ok(DecisionTuple {
                actions,
                probability: 1.0 / num_actions as f32,
                should_record: true,
            })
        } else {
            Ok(DecisionTuple {
                actions,
                probability: 1.0,
                should_record: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExploreError;
    use crate::hash::{compute_id_hash, salted_seed};

    #[derive(Debug)]
    struct Ctx {
        available: u32,
    }

    fn always(action: u32) -> Arc<dyn Policy<Ctx>> {
        Arc::new(move |_: &Ctx| vec![action])
    }

    fn ctx() -> Ctx {
        Ctx { available: 3 }
    }

    #[test]
    fn first_call_explores_and_replays_deterministically() {
        let seed = salted_seed(compute_id_hash("user42"), compute_id_hash("app1"));
        let explorer = TauFirstExplorer::new(always(1), 1, 3);

        let first = explorer.choose_action(seed, &ctx(), None).unwrap();
        assert!(first.should_record);
        assert!((first.probability - 1.0 / 3.0).abs() < f32::EPSILON);
        assert_eq!(first.actions.len(), 1);
        assert!((1..=3).contains(&first.actions[0]));
        assert_eq!(first.actions[0], Prg::new(seed).uniform_int(1, 3));
        assert_eq!(explorer.remaining_budget(), 0);

        let replay = TauFirstExplorer::new(always(1), 1, 3)
            .choose_action(seed, &ctx(), None)
            .unwrap();
        assert_eq!(replay, first);
    }

    #[test]
    fn exhausted_budget_exploits() {
        let explorer = TauFirstExplorer::new(always(2), 1, 3);
        explorer.choose_action(7, &ctx(), None).unwrap();

        let exploit = explorer.choose_action(7, &ctx(), None).unwrap();
        assert_eq!(exploit.actions, vec![2]);
        assert_eq!(exploit.probability, 1.0);
        assert!(!exploit.should_record);
        assert_eq!(explorer.remaining_budget(), 0);
    }

    #[test]
    fn budget_is_spent_exactly_once_across_threads() {
        let tau = 50;
        let explorer = TauFirstExplorer::new(always(1), tau, 4);
        let recorded = AtomicU64::new(0);

        std::thread::scope(|scope| {
            for worker in 0..8u64 {
                let explorer = &explorer;
                let recorded = &recorded;
                scope.spawn(move || {
                    for i in 0..100u64 {
                        let decision = explorer
                            .choose_action(worker * 1000 + i, &ctx(), None)
                            .unwrap();
                        if decision.should_record {
                            recorded.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(recorded.load(Ordering::Relaxed), tau);
        assert_eq!(explorer.remaining_budget(), 0);
    }

    #[test]
    fn disabled_exploration_keeps_budget() {
        let explorer = TauFirstExplorer::new(always(3), 2, 3);
        explorer.enable_explore(false);
        let decision = explorer.choose_action(1, &ctx(), None).unwrap();
        assert!(!decision.should_record);
        assert_eq!(explorer.remaining_budget(), 2);

        explorer.enable_explore(true);
        assert!(explorer.choose_action(1, &ctx(), None).unwrap().should_record);
        assert_eq!(explorer.remaining_budget(), 1);
    }

    #[test]
    fn zero_fixed_actions_is_invalid() {
        let explorer = TauFirstExplorer::new(always(1), 1, 0);
        let err = explorer.choose_action(1, &ctx(), None).unwrap_err();
        assert!(matches!(err, ExploreError::InvalidArgument(_)));
        assert_eq!(explorer.remaining_budget(), 1);
    }

    #[test]
    fn variable_actions_need_a_resolver() {
        let explorer = TauFirstExplorer::with_variable_actions(always(1), 1);
        let err = explorer.choose_action(1, &ctx(), None).unwrap_err();
        assert!(matches!(err, ExploreError::Configuration(_)));

        let resolver: ActionResolver<Ctx> = Arc::new(|c: &Ctx| c.available);
        let decision = explorer.choose_action(1, &ctx(), Some(&resolver)).unwrap();
        assert!((decision.probability - 1.0 / 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_default_policy_output_is_rejected() {
        let explorer = TauFirstExplorer::new(Arc::new(|_: &Ctx| vec![1, 1]), 1, 3);
        assert!(matches!(
            explorer.choose_action(1, &ctx(), None),
            Err(ExploreError::InvalidArgument(_))
        ));

        explorer.update_policy(Arc::new(|_: &Ctx| Vec::new()));
        assert!(matches!(
            explorer.choose_action(1, &ctx(), None),
            Err(ExploreError::InvalidArgument(_))
        ));

        explorer.update_policy(always(4));
        assert!(matches!(
            explorer.choose_action(1, &ctx(), None),
            Err(ExploreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn updated_policy_drives_exploitation() {
        let explorer = TauFirstExplorer::new(always(1), 0, 3);
        assert_eq!(explorer.choose_action(1, &ctx(), None).unwrap().actions, vec![1]);
        explorer.update_policy(always(3));
        assert_eq!(explorer.choose_action(1, &ctx(), None).unwrap().actions, vec![3]);
    }

    #[test]
    fn ranked_policies_keep_every_action() {
        let explorer = TauFirstExplorer::new(Arc::new(|_: &Ctx| vec![1, 2, 3]), 1, 3);
        let decision = explorer.choose_action(99, &ctx(), None).unwrap();
        let mut sorted = decision.actions.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3]);
        assert_eq!(decision.actions[0], Prg::new(99).uniform_int(1, 3));
    }
}
