use super::action::Action;
use super::measurement;
use super::measurement::Measurement;
use super::measurement::Transition;
use super::state::State;
use super::sweep;
use super::sweep::ReverseIndex;
use crate::config::Config;
use crate::config::UpdateAlgorithm;
use crate::error::Error;
use crate::error::Result;
use crate::Discount;
use crate::Reward;
use std::collections::BTreeMap;

/// the fixed-partition model: the state space is the cartesian product of the
/// configured parameter buckets, frozen at construction. states are addressed
/// arithmetically, the alphabetically first parameter varying fastest.
pub struct MdpModel {
    discount: Discount,
    index: Vec<(String, Vec<f64>)>,
    states: Vec<Option<State>>,
    current: Option<usize>,
    measurements: Option<Measurement>,
    algorithm: UpdateAlgorithm,
    update_error: f64,
    max_updates: usize,
    priorities: Vec<f64>,
    reverse: ReverseIndex,
}

impl MdpModel {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let algorithm = config.update_algorithm.ok_or_else(|| {
            Error::Configuration("update_algorithm not provided in the configuration".to_string())
        })?;
        let mut index = Vec::new();
        let mut total = 1;
        for (name, spec) in &config.parameters {
            let thresholds = spec.thresholds(name)?;
            total *= thresholds.len() + 1;
            index.push((name.clone(), thresholds));
        }
        let actions = Action::expand(&config.actions);
        let states = (0..total)
            .map(|num| Some(State::new(&actions, total, num, config.initial_q_values)))
            .collect();
        log::debug!(
            "initialized fixed-partition mdp with {} states and {} actions",
            total,
            actions.len()
        );
        Ok(Self {
            discount: config.discount,
            index,
            states,
            current: None,
            measurements: None,
            algorithm,
            update_error: crate::UPDATE_ERROR,
            max_updates: crate::MAX_UPDATES,
            priorities: vec![0.0; total],
            reverse: vec![BTreeMap::new(); total],
        })
    }

    pub fn discount(&self) -> Discount {
        self.discount
    }

    /// select the propagation algorithm by name. unknown names surface a
    /// Parameter error and leave the model untouched.
    pub fn set_update_algorithm(&mut self, algorithm: &str, error: f64, max_updates: usize) -> Result<()> {
        self.algorithm = algorithm.parse::<UpdateAlgorithm>()?;
        self.update_error = error;
        self.max_updates = max_updates;
        log::debug!(
            "update algorithm set to {} with error {} and at most {} updates",
            self.algorithm,
            error,
            max_updates
        );
        Ok(())
    }

    /// arithmetic routing: bucket each parameter independently, then combine.
    fn locate(&self, measurement: &Measurement) -> Result<usize> {
        let mut num = 0;
        let mut stride = 1;
        for (name, thresholds) in &self.index {
            let value = measurement::require(measurement, name)?;
            let bucket = thresholds
                .iter()
                .position(|threshold| value < *threshold)
                .unwrap_or(thresholds.len());
            num += bucket * stride;
            stride *= thresholds.len() + 1;
        }
        Ok(num)
    }

    fn current(&self) -> Result<&State> {
        let num = self.current.ok_or(Error::StateNotSet)?;
        self.states[num]
            .as_ref()
            .ok_or_else(|| Error::Internal(format!("current state {} is tombstoned", num)))
    }

    pub fn set_state(&mut self, measurement: &Measurement) -> Result<()> {
        self.current = Some(self.locate(measurement)?);
        self.measurements = Some(measurement.clone());
        Ok(())
    }

    /// the greedy recommendation from the current state. a pure query.
    pub fn suggest_action(&self) -> Result<Action> {
        self.current()?
            .greedy_action()
            .cloned()
            .ok_or_else(|| Error::Internal("state carries no actions".to_string()))
    }

    pub fn legal_actions(&self) -> Result<Vec<Action>> {
        Ok(self.current()?.legal_actions())
    }

    /// fold one observed step into the model: record the transition, update
    /// the Q-record, and propagate with the configured algorithm. an action
    /// with no Q-record is ignored, there is nothing to update for it.
    pub fn update(&mut self, action: &Action, measurement: &Measurement, reward: Reward) -> Result<()> {
        let num = self.current.ok_or(Error::StateNotSet)?;
        let pre = self.measurements.clone().ok_or(Error::StateNotSet)?;
        let next = self.locate(measurement)?;
        match self.states[num].as_mut() {
            Some(state) if state.qstate(action).is_some() => {
                let transition = Transition {
                    pre,
                    post: measurement.clone(),
                    action: action.clone(),
                    reward,
                };
                state.record_transition(transition, next);
                if let Some(qstate) = state.qstate_mut(action) {
                    qstate.update(next, reward);
                }
            }
            _ => return Ok(()),
        }
        match self.algorithm {
            UpdateAlgorithm::NoUpdate => {}
            UpdateAlgorithm::SingleUpdate => {
                sweep::single_update(&mut self.states, num, action, self.discount)
            }
            UpdateAlgorithm::ValueIteration => self.value_iteration(None),
            UpdateAlgorithm::PrioritizedSweeping => self.prioritized_sweeping(None, None, None)?,
        }
        self.current = Some(next);
        self.measurements = Some(measurement.clone());
        Ok(())
    }

    /// the fixed partition never dissolves a state, so there is never anything
    /// buffered to replay.
    pub fn retrain(&mut self) -> Result<()> {
        Ok(())
    }

    pub fn value_iteration(&mut self, error: Option<f64>) {
        sweep::value_iteration(
            &mut self.states,
            self.discount,
            error.unwrap_or(self.update_error),
        );
    }

    /// sweep priorities outward from a seed state, the current one by default.
    /// the freshest observation only changed the seed's outgoing row, so only
    /// that row of the persistent reverse index is refreshed here.
    pub fn prioritized_sweeping(
        &mut self,
        seed: Option<&Measurement>,
        error: Option<f64>,
        max_updates: Option<usize>,
    ) -> Result<()> {
        let num = match seed {
            Some(measurement) => self.locate(measurement)?,
            None => self.current.ok_or(Error::StateNotSet)?,
        };
        let bound = max_updates.unwrap_or(if seed.is_some() {
            crate::SEEDED_MAX_UPDATES
        } else {
            self.max_updates
        });
        if let Some(state) = self.states[num].as_ref() {
            for (successor, inflow) in state.max_transitions() {
                self.reverse[successor].insert(num, inflow);
            }
        }
        sweep::prioritized_sweeping(
            &mut self.states,
            &mut self.priorities,
            &self.reverse,
            num,
            self.discount,
            error.unwrap_or(self.update_error),
            bound,
        );
        Ok(())
    }

    pub fn total_states(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, num: usize) -> Option<&State> {
        self.states.get(num).and_then(Option::as_ref)
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.iter().flatten()
    }

    /// fraction of Q-records that have never been exercised.
    pub fn percent_not_taken(&self) -> f64 {
        let total = self.states().map(|s| s.qstates().len()).sum::<usize>();
        let untaken = self
            .states()
            .flat_map(|s| s.qstates())
            .filter(|q| q.taken() == 0)
            .count();
        if total == 0 {
            0.0
        } else {
            untaken as f64 / total as f64
        }
    }
}

impl std::fmt::Display for MdpModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for state in self.states() {
            write!(f, "{}", state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(algorithm: &str) -> Config {
        Config::from_json(&format!(
            r#"{{
                "parameters": {{"p": {{"values": [0, 10]}}}},
                "actions": {{"a": null}},
                "discount": 0.9,
                "initial_q_values": 0.0,
                "update_algorithm": "{}"
            }}"#,
            algorithm
        ))
        .unwrap()
    }

    fn at(p: f64) -> Measurement {
        Measurement::from([("p".to_string(), p)])
    }

    #[test]
    fn two_state_convergence() {
        let mut model = MdpModel::new(&config("no_update")).unwrap();
        let a = Action::new("a", None);
        for _ in 0..5 {
            model.set_state(&at(0.0)).unwrap();
            model.update(&a, &at(10.0), 1.0).unwrap();
            model.set_state(&at(10.0)).unwrap();
            model.update(&a, &at(0.0), 0.0).unwrap();
        }
        model.value_iteration(Some(1e-6));
        let q0 = model.state(0).unwrap().qstates()[0].q();
        let q1 = model.state(1).unwrap().qstates()[0].q();
        approx::assert_relative_eq!(q0, 1.0 / (1.0 - 0.81), max_relative = 1e-4);
        approx::assert_relative_eq!(q1, 0.9 / (1.0 - 0.81), max_relative = 1e-4);
    }

    #[test]
    fn greedy_ties_break_by_insertion_order() {
        let config = Config::from_json(
            r#"{
                "parameters": {"p": {"values": [0, 10]}},
                "actions": {"left": null, "right": null},
                "discount": 0.9,
                "initial_q_values": 0.0,
                "update_algorithm": "no_update"
            }"#,
        )
        .unwrap();
        let mut model = MdpModel::new(&config).unwrap();
        model.set_state(&at(0.0)).unwrap();
        assert_eq!(model.suggest_action().unwrap(), Action::new("left", None));
    }

    #[test]
    fn suggesting_is_pure() {
        let mut model = MdpModel::new(&config("no_update")).unwrap();
        model.set_state(&at(0.0)).unwrap();
        let first = model.suggest_action().unwrap();
        let second = model.suggest_action().unwrap();
        assert_eq!(first, second);
        assert_eq!(model.state(0).unwrap().visits(), 0);
    }

    #[test]
    fn no_update_never_moves_values() {
        let mut model = MdpModel::new(&config("no_update")).unwrap();
        let a = Action::new("a", None);
        model.set_state(&at(0.0)).unwrap();
        model.update(&a, &at(10.0), 7.0).unwrap();
        assert_eq!(model.state(0).unwrap().value(), 0.0);
        assert_eq!(model.state(0).unwrap().qstates()[0].q(), 0.0);
        assert_eq!(model.state(0).unwrap().qstates()[0].taken(), 1);
    }

    #[test]
    fn unknown_action_is_ignored() {
        let mut model = MdpModel::new(&config("single_update")).unwrap();
        model.set_state(&at(0.0)).unwrap();
        model.update(&Action::new("alien", None), &at(10.0), 1.0).unwrap();
        assert_eq!(model.state(0).unwrap().qstates()[0].taken(), 0);
        assert_eq!(model.state(0).unwrap().visits(), 0);
    }

    #[test]
    fn operations_before_set_state_fail() {
        let mut model = MdpModel::new(&config("single_update")).unwrap();
        assert!(matches!(model.suggest_action(), Err(Error::StateNotSet)));
        assert!(matches!(model.legal_actions(), Err(Error::StateNotSet)));
        assert!(matches!(
            model.update(&Action::new("a", None), &at(0.0), 0.0),
            Err(Error::StateNotSet)
        ));
        assert!(matches!(
            model.set_state(&Measurement::new()),
            Err(Error::MissingParameter(_))
        ));
    }

    #[test]
    fn unknown_algorithm_name_is_a_parameter_error() {
        let mut model = MdpModel::new(&config("no_update")).unwrap();
        assert!(matches!(
            model.set_update_algorithm("bogus", 0.1, 10),
            Err(Error::Parameter(_))
        ));
        model.set_update_algorithm("value_iteration", 1e-6, 10).unwrap();
    }

    #[test]
    fn identical_feeds_build_identical_tables() {
        let mut one = MdpModel::new(&config("single_update")).unwrap();
        let mut two = MdpModel::new(&config("single_update")).unwrap();
        let a = Action::new("a", None);
        for model in [&mut one, &mut two] {
            model.set_state(&at(0.0)).unwrap();
            for (p, r) in [(10.0, 1.0), (0.0, 0.5), (10.0, -1.0), (0.0, 2.0)] {
                model.update(&a, &at(p), r).unwrap();
            }
        }
        for num in 0..one.total_states() {
            let (s1, s2) = (one.state(num).unwrap(), two.state(num).unwrap());
            assert_eq!(s1.value(), s2.value());
            for (q1, q2) in s1.qstates().iter().zip(s2.qstates()) {
                assert_eq!(q1.q(), q2.q());
                assert_eq!(q1.taken(), q2.taken());
            }
        }
    }

    #[test]
    fn sweeping_is_bounded_by_the_update_budget() {
        let values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let config = Config::from_json(&format!(
            r#"{{
                "parameters": {{"p": {{"values": {:?}}}}},
                "actions": {{"a": null}},
                "discount": 0.9,
                "initial_q_values": 0.0,
                "update_algorithm": "no_update"
            }}"#,
            values
        ))
        .unwrap();
        let mut model = MdpModel::new(&config).unwrap();
        let a = Action::new("a", None);
        // seven predecessor states all feed state 0; state 0 pays off to itself
        for j in 1..=7 {
            model.set_state(&at(j as f64)).unwrap();
            model.update(&a, &at(0.0), j as f64).unwrap();
        }
        model.set_state(&at(0.0)).unwrap();
        model.update(&a, &at(0.0), 10.0).unwrap();
        // prime the persistent reverse index row by row; the infinite error
        // stops each call after its single seed backup
        for j in (0..=7).rev() {
            model
                .prioritized_sweeping(Some(&at(j as f64)), Some(f64::INFINITY), None)
                .unwrap();
        }
        let primed: Vec<f64> = (0..10).map(|j| model.state(j).unwrap().value()).collect();
        // the budgeted sweep may only touch the seed and the top two priorities
        model
            .prioritized_sweeping(Some(&at(0.0)), Some(1e-9), Some(3))
            .unwrap();
        for j in 0..10 {
            let value = model.state(j).unwrap().value();
            if j <= 2 {
                assert_ne!(value, primed[j], "state {} should have been swept", j);
            } else {
                assert_eq!(value, primed[j], "state {} should have been left alone", j);
            }
        }
    }
}
