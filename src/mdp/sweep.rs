use super::action::Action;
use super::qstate::QState;
use super::state::State;
use crate::Discount;
use crate::Probability;
use crate::Value;
use std::collections::BTreeMap;

/// predecessors by strongest inflow: reverse[i][j] = max over actions of the
/// estimated probability of reaching i from j.
pub type ReverseIndex = Vec<BTreeMap<usize, Probability>>;

/// snapshot of every state's cached value. tombstoned slots contribute zero,
/// matching the zeroed transition estimates that point at them.
pub fn values(states: &[Option<State>]) -> Vec<Value> {
    states
        .iter()
        .map(|slot| slot.as_ref().map(State::value).unwrap_or_default())
        .collect()
}

/// one Bellman backup of a single Q-record against the given value vector.
pub fn q_backup(qstate: &mut QState, values: &[Value], discount: Discount) {
    let q = (0..values.len())
        .map(|i| qstate.transition(i) * (qstate.reward(i) + discount * values[i]))
        .sum();
    qstate.set_q(q);
}

/// back every Q-record of a state up and refresh its cached V.
pub fn v_backup(state: &mut State, values: &[Value], discount: Discount) -> Value {
    for qstate in state.qstates_mut() {
        q_backup(qstate, values, discount);
    }
    state.update_value();
    state.value()
}

/// recompute one state-action pair after a fresh observation. O(|S|) per call.
pub fn single_update(states: &mut [Option<State>], num: usize, action: &Action, discount: Discount) {
    let values = values(states);
    if let Some(state) = states[num].as_mut() {
        if let Some(qstate) = state.qstate_mut(action) {
            q_backup(qstate, &values, discount);
        }
        state.update_value();
    }
}

/// gauss-seidel value iteration over the state array in index order, until no
/// value moves by more than the error in a full sweep.
pub fn value_iteration(states: &mut [Option<State>], discount: Discount, error: f64) {
    let mut values = values(states);
    let mut sweeps = 0;
    loop {
        let mut repeat = false;
        for num in 0..states.len() {
            if let Some(state) = states[num].as_mut() {
                let old = values[num];
                let new = v_backup(state, &values, discount);
                values[num] = new;
                repeat |= (new - old).abs() > error;
            }
        }
        sweeps += 1;
        if !repeat {
            break;
        }
    }
    log::trace!("value iteration settled after {} sweeps", sweeps);
}

/// prioritized sweeping: back the seed up, push the surprise onto its
/// predecessors weighted by their strongest inflow, then keep popping the top
/// priority until it drops below the error or the update budget runs out.
/// the smallest index wins priority ties, which keeps the sweep deterministic.
pub fn prioritized_sweeping(
    states: &mut [Option<State>],
    priorities: &mut [f64],
    reverse: &ReverseIndex,
    seed: usize,
    discount: Discount,
    error: f64,
    max_updates: usize,
) {
    let mut values = values(states);
    let mut num = seed;
    for _ in 0..max_updates {
        if let Some(state) = states[num].as_mut() {
            let old = values[num];
            let new = v_backup(state, &values, discount);
            values[num] = new;
            let delta = (new - old).abs();
            for (&predecessor, &inflow) in &reverse[num] {
                priorities[predecessor] = priorities[predecessor].max(inflow * delta);
            }
        }
        priorities[num] = 0.0;
        let (mut next, mut top) = (0, 0.0);
        for (candidate, &priority) in priorities.iter().enumerate() {
            if priority > top {
                (next, top) = (candidate, priority);
            }
        }
        if top <= error {
            break;
        }
        num = next;
    }
}
