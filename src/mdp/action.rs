use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

/// an action the optimizer may execute against the managed system: a kind
/// plus an optional magnitude. absence of a magnitude is explicit, not a
/// sentinel, and two actions are equal iff both fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Action {
    kind: String,
    value: Option<OrderedFloat<f64>>,
}

impl Action {
    pub fn new(kind: &str, value: Option<f64>) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.map(OrderedFloat),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn value(&self) -> Option<f64> {
        self.value.map(f64::from)
    }

    /// expand the configured action table into the concrete action list every
    /// state carries: kinds in name order, magnitudes in declared order.
    pub fn expand(table: &BTreeMap<String, Option<Vec<f64>>>) -> Vec<Self> {
        table
            .iter()
            .flat_map(|(kind, values)| match values {
                None => vec![Self::new(kind, None)],
                Some(values) => values.iter().map(|v| Self::new(kind, Some(*v))).collect(),
            })
            .collect()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value {
            Some(value) => write!(f, "{}({})", self.kind, value),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl crate::Arbitrary for Action {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let kind = format!("action{}", rng.random_range(0..4));
        match rng.random_range(0..2) {
            0 => Self::new(&kind, None),
            _ => Self::new(&kind, Some(rng.random_range(0..10) as f64)),
        }
    }
}
