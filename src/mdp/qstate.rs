use super::action::Action;
use crate::Probability;
use crate::Reward;
use crate::Value;

/// the action-value record for one (state, action) pair: how often the action
/// was taken, where it led, what it paid, and the cached Q-value. transition
/// counts must always sum to the taken counter.
#[derive(Debug, Clone)]
pub struct QState {
    action: Action,
    taken: usize,
    q: Value,
    transitions: Vec<usize>,
    rewards: Vec<Reward>,
}

impl QState {
    pub fn new(action: Action, total_states: usize, q: Value) -> Self {
        Self {
            action,
            taken: 0,
            q,
            transitions: vec![0; total_states],
            rewards: vec![0.0; total_states],
        }
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn taken(&self) -> usize {
        self.taken
    }

    pub fn q(&self) -> Value {
        self.q
    }

    pub fn set_q(&mut self, q: Value) {
        self.q = q;
    }

    pub fn total_states(&self) -> usize {
        self.transitions.len()
    }

    /// record one observed transition into the given successor.
    pub fn update(&mut self, successor: usize, reward: Reward) {
        self.taken += 1;
        self.transitions[successor] += 1;
        self.rewards[successor] += reward;
        assert!(self.taken == self.transitions.iter().sum::<usize>());
    }

    /// estimated transition probability. uniform prior until the action has
    /// ever been taken.
    pub fn transition(&self, successor: usize) -> Probability {
        if self.taken == 0 {
            1.0 / self.total_states() as Probability
        } else {
            self.transitions[successor] as Probability / self.taken as Probability
        }
    }

    /// estimated reward for landing in the given successor, zero while there
    /// is no evidence.
    pub fn reward(&self, successor: usize) -> Reward {
        if self.transitions[successor] == 0 {
            0.0
        } else {
            self.rewards[successor] / self.transitions[successor] as Reward
        }
    }

    pub fn has_transition(&self, successor: usize) -> bool {
        self.transitions[successor] > 0
    }

    pub fn visits(&self, successor: usize) -> usize {
        self.transitions[successor]
    }

    /// grow the per-successor tallies after the model gained states.
    pub fn extend_states(&mut self, count: usize) {
        let total = self.transitions.len() + count;
        self.transitions.resize(total, 0);
        self.rewards.resize(total, 0.0);
    }

    /// erase everything recorded about transitions into a dissolved state and
    /// return the number of forgotten visits.
    pub fn forget_state(&mut self, successor: usize) -> usize {
        let forgotten = self.transitions[successor];
        self.taken -= forgotten;
        self.transitions[successor] = 0;
        self.rewards[successor] = 0.0;
        assert!(self.taken == self.transitions.iter().sum::<usize>());
        forgotten
    }
}

impl std::fmt::Display for QState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<16} Q {:>10.4} taken {:>4}",
            self.action.to_string(),
            self.q,
            self.taken
        )
    }
}
