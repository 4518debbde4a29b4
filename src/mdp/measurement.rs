use super::action::Action;
use crate::error::Error;
use crate::error::Result;
use crate::Reward;
use crate::Value;
use std::collections::BTreeMap;

/// a measurement is a snapshot of the monitored parameters, keyed by name.
pub type Measurement = BTreeMap<String, Value>;

/// look a parameter up, or say which one was missing.
pub fn require(measurement: &Measurement, parameter: &str) -> Result<Value> {
    measurement
        .get(parameter)
        .copied()
        .ok_or_else(|| Error::MissingParameter(parameter.to_string()))
}

/// one observed step: the measurements before and after an action, and the
/// reward it earned. these records are the only thing that survives tree
/// restructuring, and retraining replays them against the new partition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub pre: Measurement,
    pub post: Measurement,
    pub action: Action,
    pub reward: Reward,
}

impl crate::Arbitrary for Measurement {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        ["cpu", "latency", "throughput"]
            .iter()
            .map(|p| (p.to_string(), rng.random_range(0.0..100.0)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_names_the_missing_parameter() {
        let measurement = Measurement::from([("cpu".to_string(), 0.5)]);
        assert_eq!(require(&measurement, "cpu").unwrap(), 0.5);
        assert!(matches!(
            require(&measurement, "latency"),
            Err(Error::MissingParameter(p)) if p == "latency"
        ));
    }
}
