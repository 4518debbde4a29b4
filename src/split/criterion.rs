use crate::error::Error;
use crate::error::Result;

/// how a candidate split point is chosen from the labeled evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitCriterion {
    /// partition the evidence into increase/decrease, test the measurement
    /// distributions against each other, split between the partition means
    MidPoint,
    /// test every admissible cut and take the most significant one
    AnyPoint,
    /// among significant cuts, take the one separating the labels widest
    MaxPoint,
    /// take the cut that minimizes quinlan's expected information
    InfoGain,
}

impl std::str::FromStr for SplitCriterion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mid_point" => Ok(Self::MidPoint),
            "any_point" => Ok(Self::AnyPoint),
            "max_point" => Ok(Self::MaxPoint),
            "info_gain" => Ok(Self::InfoGain),
            _ => Err(Error::Parameter(format!("unknown splitting criterion: {}", s))),
        }
    }
}

impl std::fmt::Display for SplitCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MidPoint => write!(f, "mid_point"),
            Self::AnyPoint => write!(f, "any_point"),
            Self::MaxPoint => write!(f, "max_point"),
            Self::InfoGain => write!(f, "info_gain"),
        }
    }
}

/// expected classification information per quinlan's id3. an empty class
/// carries no information by convention.
pub fn info(p: usize, n: usize) -> f64 {
    if p == 0 || n == 0 {
        return 0.0;
    }
    let total = (p + n) as f64;
    let p = p as f64 / total;
    let n = n as f64 / total;
    -p * p.log2() - n * n.log2()
}

/// information still required after a candidate cut, weighted by side.
pub fn expected_info(p1: usize, n1: usize, p2: usize, n2: usize) -> f64 {
    let total = (p1 + n1 + p2 + n2) as f64;
    let s1 = (p1 + n1) as f64;
    let s2 = (p2 + n2) as f64;
    (s1 / total) * info(p1, n1) + (s2 / total) * info(p2, n2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_classes_carry_no_information() {
        assert_eq!(info(0, 5), 0.0);
        assert_eq!(info(5, 0), 0.0);
        assert_eq!(info(0, 0), 0.0);
    }

    #[test]
    fn a_balanced_class_carries_one_bit() {
        assert_eq!(info(4, 4), 1.0);
        assert!(info(1, 7) < 1.0);
    }

    #[test]
    fn expected_info_weighs_the_sides() {
        // a clean cut leaves nothing to ask
        assert_eq!(expected_info(4, 0, 0, 4), 0.0);
        // a useless cut preserves the full bit
        assert_eq!(expected_info(2, 2, 2, 2), 1.0);
    }

    #[test]
    fn unknown_criterion_name_is_a_parameter_error() {
        assert!(matches!(
            "bogus".parse::<SplitCriterion>(),
            Err(Error::Parameter(_))
        ));
        assert_eq!("info_gain".parse::<SplitCriterion>().unwrap(), SplitCriterion::InfoGain);
    }
}
