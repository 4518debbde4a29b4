use super::action::Action;
use super::measurement::Transition;
use super::qstate::QState;
use crate::Probability;
use crate::Value;
use std::collections::BTreeMap;

/// a state node: one Q-record per legal action, the cached best value, a
/// visit counter, and the per-successor transition history that survives
/// tree restructuring. its number indexes the model's state array and is
/// stable for the lifetime of the state.
#[derive(Debug, Clone)]
pub struct State {
    num: usize,
    value: Value,
    best: usize,
    visits: usize,
    qstates: Vec<QState>,
    history: Vec<Vec<Transition>>,
}

impl State {
    pub fn new(actions: &[Action], total_states: usize, num: usize, q: Value) -> Self {
        let qstates = actions
            .iter()
            .map(|action| QState::new(action.clone(), total_states, q))
            .collect();
        let mut state = Self {
            num,
            value: 0.0,
            best: 0,
            visits: 0,
            qstates,
            history: vec![Vec::new(); total_states],
        };
        state.update_value();
        state
    }

    pub fn num(&self) -> usize {
        self.num
    }

    pub fn value(&self) -> Value {
        self.value
    }

    pub fn visits(&self) -> usize {
        self.visits
    }

    pub fn total_states(&self) -> usize {
        self.history.len()
    }

    pub fn qstates(&self) -> &[QState] {
        &self.qstates
    }

    pub fn qstates_mut(&mut self) -> &mut [QState] {
        &mut self.qstates
    }

    pub fn qstate(&self, action: &Action) -> Option<&QState> {
        self.qstates.iter().find(|q| q.action() == action)
    }

    pub fn qstate_mut(&mut self, action: &Action) -> Option<&mut QState> {
        self.qstates.iter_mut().find(|q| q.action() == action)
    }

    pub fn legal_actions(&self) -> Vec<Action> {
        self.qstates.iter().map(|q| q.action().clone()).collect()
    }

    /// the greedy action. ties go to the earliest record, deterministically.
    pub fn greedy_action(&self) -> Option<&Action> {
        let mut best: Option<&QState> = None;
        for qstate in &self.qstates {
            if best.is_none_or(|b| qstate.q() > b.q()) {
                best = Some(qstate);
            }
        }
        best.map(|q| q.action())
    }

    /// refresh the cached V = max over the Q-records, remembering which record
    /// carried it. ties go to the earliest record.
    pub fn update_value(&mut self) {
        if self.qstates.is_empty() {
            return;
        }
        let mut best = 0;
        for i in 1..self.qstates.len() {
            if self.qstates[i].q() > self.qstates[best].q() {
                best = i;
            }
        }
        self.best = best;
        self.value = self.qstates[best].q();
    }

    pub fn best(&self) -> Option<&QState> {
        self.qstates.get(self.best)
    }

    /// remember one observed step under its successor index.
    pub fn record_transition(&mut self, transition: Transition, successor: usize) {
        self.history[successor].push(transition);
        self.visits += 1;
    }

    pub fn history(&self) -> &[Vec<Transition>] {
        &self.history
    }

    /// every recorded step, flattened in successor order. the splitter's raw
    /// evidence.
    pub fn evidence(&self) -> impl Iterator<Item = &Transition> {
        self.history.iter().flatten()
    }

    /// surrender the full history, leaving the per-successor logs empty.
    pub fn drain_history(&mut self) -> Vec<Transition> {
        self.history.iter_mut().flat_map(std::mem::take).collect()
    }

    /// drop everything known about transitions into a dissolved state and hand
    /// back the displaced history. when the dissolved state is this one, the
    /// whole history is displaced.
    pub fn forget_state(&mut self, num: usize) -> Vec<Transition> {
        let displaced = if num == self.num {
            self.drain_history()
        } else {
            std::mem::take(&mut self.history[num])
        };
        let mut forgotten = 0;
        for qstate in &mut self.qstates {
            forgotten += qstate.forget_state(num);
        }
        self.visits -= forgotten;
        displaced
    }

    /// make room for freshly minted states.
    pub fn extend_states(&mut self, count: usize) {
        let total = self.history.len() + count;
        self.history.resize_with(total, Vec::new);
        for qstate in &mut self.qstates {
            qstate.extend_states(count);
        }
    }

    /// the strongest estimated inflow per successor over all actions. feeds
    /// the reverse-transition index for prioritized sweeping.
    pub fn max_transitions(&self) -> BTreeMap<usize, Probability> {
        let mut transitions = BTreeMap::new();
        for successor in 0..self.total_states() {
            for qstate in &self.qstates {
                if qstate.has_transition(successor) {
                    let inflow = qstate.transition(successor);
                    transitions
                        .entry(successor)
                        .and_modify(|t: &mut Probability| *t = t.max(inflow))
                        .or_insert(inflow);
                }
            }
        }
        transitions
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "state {} V {:.4} visited {}", self.num, self.value, self.visits)?;
        for qstate in &self.qstates {
            writeln!(f, "  {}", qstate)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdp::measurement::Measurement;

    fn actions() -> Vec<Action> {
        vec![Action::new("left", None), Action::new("right", None)]
    }

    fn step(reward: f64) -> Transition {
        Transition {
            pre: Measurement::new(),
            post: Measurement::new(),
            action: Action::new("left", None),
            reward,
        }
    }

    #[test]
    fn greedy_prefers_insertion_order_on_ties() {
        let state = State::new(&actions(), 2, 0, 0.0);
        assert_eq!(state.greedy_action().unwrap(), &Action::new("left", None));
    }

    #[test]
    fn cached_value_tracks_the_best_record() {
        let mut state = State::new(&actions(), 2, 0, 0.0);
        state.qstates_mut()[1].set_q(3.5);
        state.update_value();
        assert_eq!(state.value(), 3.5);
        assert_eq!(state.greedy_action().unwrap(), &Action::new("right", None));
        assert_eq!(state.best().unwrap().action(), &Action::new("right", None));
    }

    #[test]
    fn dissolving_itself_displaces_the_whole_history() {
        let mut state = State::new(&actions(), 2, 0, 0.0);
        state.record_transition(step(1.0), 0);
        state.record_transition(step(2.0), 1);
        let displaced = state.forget_state(0);
        assert_eq!(displaced.len(), 2);
        assert!(state.history().iter().all(Vec::is_empty));
    }

    #[test]
    fn dissolving_another_state_displaces_one_log() {
        let mut state = State::new(&actions(), 2, 0, 0.0);
        state.record_transition(step(1.0), 0);
        state.record_transition(step(2.0), 1);
        state.qstate_mut(&Action::new("left", None)).unwrap().update(1, 2.0);
        let displaced = state.forget_state(1);
        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].reward, 2.0);
        assert_eq!(state.visits(), 1);
    }

    #[test]
    fn max_transitions_takes_the_strongest_action() {
        let mut state = State::new(&actions(), 2, 0, 0.0);
        let left = Action::new("left", None);
        let right = Action::new("right", None);
        state.qstate_mut(&left).unwrap().update(0, 0.0);
        state.qstate_mut(&left).unwrap().update(1, 0.0);
        state.qstate_mut(&right).unwrap().update(1, 0.0);
        let transitions = state.max_transitions();
        assert_eq!(transitions[&0], 0.5);
        assert_eq!(transitions[&1], 1.0);
    }
}
