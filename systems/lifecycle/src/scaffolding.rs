//! Scripted randomness for tests that need to force rule outcomes.

use std::collections::VecDeque;

use ecosystem_core::Action;

use crate::Chance;

/// [`Chance`] that replays queued decisions, then falls back to fixed ones.
///
/// Queued rolls, picks and actions are consumed in order. Once a queue is
/// drained, rolls return the fallback, picks return `0`, and action choice
/// defers to the pick queue like any other chance.
#[derive(Clone, Debug, Default)]
pub struct ScriptedChance {
    rolls: VecDeque<bool>,
    picks: VecDeque<usize>,
    actions: VecDeque<Action>,
    fallback_roll: bool,
}

impl ScriptedChance {
    /// Every roll succeeds and every pick chooses the first candidate.
    #[must_use]
    pub fn always() -> Self {
        Self {
            fallback_roll: true,
            ..Self::default()
        }
    }

    /// Every roll fails.
    #[must_use]
    pub fn never() -> Self {
        Self::default()
    }

    /// Queues the outcome of the next unscripted roll.
    #[must_use]
    pub fn then_roll(mut self, outcome: bool) -> Self {
        self.rolls.push_back(outcome);
        self
    }

    /// Queues the index returned by the next pick. Indices past the end of
    /// the candidate list are clamped to the last candidate.
    #[must_use]
    pub fn then_pick(mut self, index: usize) -> Self {
        self.picks.push_back(index);
        self
    }

    /// Queues the next action choice.
    #[must_use]
    pub fn then_act(mut self, action: Action) -> Self {
        self.actions.push_back(action);
        self
    }
}

impl Chance for ScriptedChance {
    fn roll(&mut self, _probability: f64) -> bool {
        self.rolls.pop_front().unwrap_or(self.fallback_roll)
    }

    fn pick(&mut self, len: usize) -> usize {
        let index = self.picks.pop_front().unwrap_or(0);
        index.min(len.saturating_sub(1))
    }

    fn choose_action(&mut self) -> Action {
        match self.actions.pop_front() {
            Some(action) => action,
            None => Action::ALL[self.pick(Action::ALL.len())],
        }
    }
}
