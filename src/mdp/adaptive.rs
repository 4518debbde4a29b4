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
use crate::split::criterion::SplitCriterion;
use crate::split::splitter::Split;
use crate::split::splitter::Splitter;
use crate::split::stats::StatTest;
use crate::tree::tree::Tree;
use crate::Discount;
use crate::Reward;
use crate::Value;
use std::collections::BTreeMap;

/// the adaptive model: states are the leaves of a decision tree that starts
/// from the seeded partition and splits under live traffic wherever the
/// accumulated evidence says one leaf hides behaviorally distinct regions.
/// the state array only ever grows; a dissolved leaf's slot is reused by the
/// first of its replacements, so state numbers stay dense.
pub struct MdpDtModel {
    discount: Discount,
    parameters: Vec<String>,
    actions: Vec<Action>,
    initial_q: Value,
    initial_thresholds: BTreeMap<String, Vec<f64>>,
    tree: Tree,
    states: Vec<Option<State>>,
    priorities: Vec<f64>,
    pending: Vec<Transition>,
    current: Option<usize>,
    measurements: Option<Measurement>,
    algorithm: UpdateAlgorithm,
    update_error: f64,
    max_updates: usize,
    splitter: Splitter,
    allow_splitting: bool,
    splits: BTreeMap<String, usize>,
}

impl MdpDtModel {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let initial = config.initial_parameters.as_ref().ok_or_else(|| {
            Error::Configuration("initial_parameters not provided in the configuration".to_string())
        })?;
        let split_error = config.split_error.ok_or_else(|| {
            Error::Configuration("split_error not provided in the configuration".to_string())
        })?;
        let min_measurements = config
            .min_measurements
            .ok_or_else(|| {
                Error::Configuration("min_measurements not provided in the configuration".to_string())
            })?
            .max(1);
        let mut initial_thresholds = BTreeMap::new();
        for (name, spec) in initial {
            initial_thresholds.insert(name.clone(), spec.thresholds(name)?);
        }
        let parameters = config.parameters.keys().cloned().collect::<Vec<_>>();
        let actions = Action::expand(&config.actions);
        let splits = parameters.iter().map(|p| (p.clone(), 0)).collect();
        let mut model = Self {
            discount: config.discount,
            parameters,
            states: vec![Some(State::new(&actions, 1, 0, config.initial_q_values))],
            actions,
            initial_q: config.initial_q_values,
            initial_thresholds,
            tree: Tree::new(),
            priorities: vec![0.0],
            pending: Vec::new(),
            current: None,
            measurements: None,
            algorithm: config.update_algorithm.unwrap_or(UpdateAlgorithm::SingleUpdate),
            update_error: crate::UPDATE_ERROR,
            max_updates: crate::MAX_UPDATES,
            splitter: Splitter {
                criterion: SplitCriterion::MidPoint,
                test: StatTest::StudentTtest,
                considered_transitions: true,
                split_error,
                min_measurements,
            },
            allow_splitting: true,
            splits,
        };
        model.seed_tree()?;
        log::debug!("initialized mdp-dt model with {} states", model.live_states());
        Ok(model)
    }

    /// pre-split every leaf on the seeded parameters. runs before any traffic,
    /// so the retrains inside are replays of nothing.
    fn seed_tree(&mut self) -> Result<()> {
        for (name, thresholds) in self.initial_thresholds.clone() {
            for num in self.tree.leaves() {
                self.apply_split(num, &name, &thresholds)?;
            }
        }
        Ok(())
    }

    pub fn discount(&self) -> Discount {
        self.discount
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// splits performed per parameter since construction or the last reset.
    pub fn splits(&self) -> &BTreeMap<String, usize> {
        &self.splits
    }

    pub fn allow_splitting(&self) -> bool {
        self.allow_splitting
    }

    pub fn set_allow_splitting(&mut self, allow: bool) {
        self.allow_splitting = allow;
        log::debug!("allow splitting set to {}", allow);
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

    /// select the splitting criterion by name. unknown names surface a
    /// Parameter error and leave the splitter untouched.
    pub fn set_splitting_criterion(&mut self, criterion: &str, considered_transitions: bool) -> Result<()> {
        self.splitter.criterion = criterion.parse::<SplitCriterion>()?;
        self.splitter.considered_transitions = considered_transitions;
        log::debug!(
            "splitting criterion set to {}, considered transitions {}",
            self.splitter.criterion,
            considered_transitions
        );
        Ok(())
    }

    /// select the statistical test by name. unknown names surface a Parameter
    /// error and leave the splitter untouched.
    pub fn set_statistical_test(&mut self, test: &str) -> Result<()> {
        self.splitter.test = test.parse::<StatTest>()?;
        log::debug!("statistical test set to {}", self.splitter.test);
        Ok(())
    }

    /// every modeled parameter must be present before a measurement enters the
    /// model: retraining and the splitter read them all back later.
    fn admit(&self, measurement: &Measurement) -> Result<()> {
        for parameter in &self.parameters {
            measurement::require(measurement, parameter)?;
        }
        Ok(())
    }

    fn current(&self) -> Result<&State> {
        let num = self.current.ok_or(Error::StateNotSet)?;
        self.states[num]
            .as_ref()
            .ok_or_else(|| Error::Internal(format!("current state {} is tombstoned", num)))
    }

    pub fn set_state(&mut self, measurement: &Measurement) -> Result<()> {
        self.admit(measurement)?;
        self.current = Some(self.tree.route(measurement)?);
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

    /// fold one observed step into the model: route both measurements, record
    /// the transition in the source leaf, update its Q-record, propagate, and
    /// give the source leaf one chance to split. an action with no Q-record is
    /// ignored, there is nothing to update and nothing to replay for it.
    pub fn update(&mut self, action: &Action, measurement: &Measurement, reward: Reward) -> Result<()> {
        let pre = self.measurements.clone().ok_or(Error::StateNotSet)?;
        self.admit(measurement)?;
        // the cached measurement may predate a split, so route it afresh
        let num = self.tree.route(&pre)?;
        let next = self.tree.route(measurement)?;
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
        self.current = Some(num);
        match self.algorithm {
            UpdateAlgorithm::NoUpdate => {}
            UpdateAlgorithm::SingleUpdate => {
                sweep::single_update(&mut self.states, num, action, self.discount)
            }
            UpdateAlgorithm::ValueIteration => self.value_iteration(None),
            UpdateAlgorithm::PrioritizedSweeping => self.prioritized_sweeping(None, None, None)?,
        }
        if self.allow_splitting {
            self.split(None)?;
        }
        self.current = Some(next);
        self.measurements = Some(measurement.clone());
        Ok(())
    }

    /// replay every buffered transition against the current tree. statistics
    /// land wherever the measurements now route; values are not propagated.
    pub fn retrain(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for transition in pending {
            let num = self.tree.route(&transition.pre)?;
            let next = self.tree.route(&transition.post)?;
            let action = transition.action.clone();
            let reward = transition.reward;
            if let Some(state) = self.states[num].as_mut() {
                state.record_transition(transition, next);
                if let Some(qstate) = state.qstate_mut(&action) {
                    qstate.update(next, reward);
                }
            }
        }
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
    /// splits restructure transition rows wholesale, so the reverse index is
    /// rebuilt from scratch on every call.
    pub fn prioritized_sweeping(
        &mut self,
        seed: Option<&Measurement>,
        error: Option<f64>,
        max_updates: Option<usize>,
    ) -> Result<()> {
        let num = match seed {
            Some(measurement) => self.tree.route(measurement)?,
            None => self.current.ok_or(Error::StateNotSet)?,
        };
        let bound = max_updates.unwrap_or(if seed.is_some() {
            crate::SEEDED_MAX_UPDATES
        } else {
            self.max_updates
        });
        let mut reverse: ReverseIndex = vec![BTreeMap::new(); self.states.len()];
        for state in self.states.iter().flatten() {
            for (successor, inflow) in state.max_transitions() {
                reverse[successor].insert(state.num(), inflow);
            }
        }
        sweep::prioritized_sweeping(
            &mut self.states,
            &mut self.priorities,
            &reverse,
            num,
            self.discount,
            error.unwrap_or(self.update_error),
            bound,
        );
        Ok(())
    }

    /// attempt one split of the given state, the current one by default. at
    /// most the first worthwhile cut is applied.
    pub fn split(&mut self, target: Option<usize>) -> Result<bool> {
        let num = match target {
            Some(num) => num,
            None => self.current.ok_or(Error::StateNotSet)?,
        };
        let Some(choice) = self.consider(num)? else {
            return Ok(false);
        };
        let created = self.apply_split(num, &choice.parameter, &[choice.point])?;
        *self.splits.entry(choice.parameter.clone()).or_insert(0) += 1;
        // the fresh leaves start from their replayed statistics; one backup
        // each settles their values against the live table
        for new in created {
            let values = sweep::values(&self.states);
            if let Some(state) = self.states[new].as_mut() {
                sweep::v_backup(state, &values, self.discount);
            }
        }
        log::debug!(
            "split state {} on {} at {:.4} with {}",
            num,
            choice.parameter,
            choice.point,
            self.splitter.criterion
        );
        Ok(true)
    }

    /// gather the greedy-action evidence of a state, label it, and search for
    /// a worthwhile cut.
    fn consider(&self, num: usize) -> Result<Option<Split>> {
        let Some(state) = self.states[num].as_ref() else {
            return Ok(None);
        };
        let Some(greedy) = state.greedy_action().cloned() else {
            return Ok(None);
        };
        let mut samples: Vec<(&Measurement, f64)> = Vec::new();
        for transition in state.evidence().filter(|t| t.action == greedy) {
            let label = if self.splitter.considered_transitions {
                let landing = self.tree.route(&transition.post)?;
                transition.reward
                    + self.discount
                        * self.states[landing].as_ref().map(State::value).unwrap_or_default()
            } else {
                transition.reward
            };
            samples.push((&transition.pre, label));
        }
        Ok(match self.splitter.criterion {
            SplitCriterion::MidPoint => {
                if samples.is_empty() {
                    return Ok(None);
                }
                let reference = if self.splitter.considered_transitions {
                    state.value()
                } else {
                    samples.iter().map(|(_, label)| label).sum::<f64>() / samples.len() as f64
                };
                let (incr, decr): (Vec<(&Measurement, f64)>, Vec<(&Measurement, f64)>) = samples
                    .iter()
                    .copied()
                    .partition(|(_, label)| *label >= reference);
                let incr = incr.into_iter().map(|(m, _)| m).collect::<Vec<_>>();
                let decr = decr.into_iter().map(|(m, _)| m).collect::<Vec<_>>();
                self.splitter.midpoint(&self.parameters, &incr, &decr)
            }
            _ => self.splitter.cutpoint(&self.parameters, &samples, state.value()),
        })
    }

    /// dissolve one state and regraft its region as fresh leaves under a new
    /// router, then retrain so the displaced statistics land in the new
    /// partition. the first fresh leaf reuses the dissolved slot.
    fn apply_split(&mut self, num: usize, parameter: &str, thresholds: &[f64]) -> Result<Vec<usize>> {
        let total = self.states.len();
        let fresh = thresholds.len();
        for state in self.states.iter_mut().flatten() {
            self.pending.extend(state.forget_state(num));
        }
        self.priorities[num] = 0.0;
        if self.states[num].take().is_none() {
            return Err(Error::Internal(format!("state {} was already dissolved", num)));
        }
        for state in self.states.iter_mut().flatten() {
            state.extend_states(fresh);
        }
        self.priorities.resize(total + fresh, 0.0);
        let created = self.tree.split(num, parameter, thresholds, total)?;
        for &new in &created {
            let state = State::new(&self.actions, total + fresh, new, self.initial_q);
            if new == num {
                self.states[num] = Some(state);
            } else if new == self.states.len() {
                self.states.push(Some(state));
            } else {
                return Err(Error::Internal(format!("state {} appended out of order", new)));
            }
        }
        self.retrain()?;
        Ok(created)
    }

    /// keep offering every leaf a split until a full pass changes nothing,
    /// settling values between the passes that did.
    pub fn chain_split(&mut self) -> Result<()> {
        let mut performed = 0;
        loop {
            let mut any = false;
            let nums = self.states.iter().flatten().map(State::num).collect::<Vec<_>>();
            for num in nums {
                if self.states[num].is_some() && self.split(Some(num))? {
                    any = true;
                    performed += 1;
                }
            }
            if !any {
                break;
            }
            self.value_iteration(None);
        }
        log::debug!("chain splitting complete after {} splits", performed);
        Ok(())
    }

    /// rebuild the tree from scratch, keeping every recorded observation: the
    /// whole history is displaced into the pending buffer, the seeded
    /// partition is regrown, the replay lands the statistics in it, and a
    /// value iteration settles the fresh values. split counters start over.
    pub fn reset_decision_tree(&mut self, vi_error: Option<f64>) -> Result<()> {
        for state in self.states.iter_mut().flatten() {
            self.pending.extend(state.drain_history());
        }
        self.tree = Tree::new();
        self.states = vec![Some(State::new(&self.actions, 1, 0, self.initial_q))];
        self.priorities = vec![0.0];
        self.seed_tree()?;
        self.retrain()?;
        self.value_iteration(vi_error);
        for count in self.splits.values_mut() {
            *count = 0;
        }
        if let Some(measurement) = self.measurements.clone() {
            self.current = Some(self.tree.route(&measurement)?);
        }
        log::debug!("decision tree reset, {} live states", self.live_states());
        Ok(())
    }

    /// slots in the state array, tombstones included.
    pub fn total_states(&self) -> usize {
        self.states.len()
    }

    pub fn live_states(&self) -> usize {
        self.states.iter().flatten().count()
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

impl std::fmt::Display for MdpDtModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tree)?;
        for state in self.states() {
            write!(f, "{}", state)?;
        }
        Ok(())
    }
}
