use super::criterion::expected_info;
use super::criterion::SplitCriterion;
use super::stats::mean;
use super::stats::StatTest;
use crate::mdp::measurement::Measurement;
use crate::Value;

/// a chosen cut: one parameter, one threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub parameter: String,
    pub point: f64,
}

/// everything the split decision depends on, bundled so the search itself is
/// a pure function of the labeled evidence.
#[derive(Debug, Clone)]
pub struct Splitter {
    pub criterion: SplitCriterion,
    pub test: StatTest,
    pub considered_transitions: bool,
    pub split_error: f64,
    pub min_measurements: usize,
}

impl Splitter {
    /// mid-point search: the evidence arrives already partitioned into the
    /// tuples that would increase the value and those that would decrease it.
    /// the winning parameter is the one whose measurement distributions differ
    /// most significantly; the split lands between the partition means.
    pub fn midpoint(
        &self,
        parameters: &[String],
        incr: &[&Measurement],
        decr: &[&Measurement],
    ) -> Option<Split> {
        if incr.len().min(decr.len()) < self.min_measurements {
            return None;
        }
        let mut best: Option<Split> = None;
        let mut lowest = 1.0;
        for parameter in parameters {
            let above = incr.iter().map(|m| m[parameter.as_str()]).collect::<Vec<_>>();
            let below = decr.iter().map(|m| m[parameter.as_str()]).collect::<Vec<_>>();
            let p = self.test.p_value(&above, &below);
            if p < lowest {
                lowest = p;
                best = Some(Split {
                    parameter: parameter.clone(),
                    point: (mean(&above) + mean(&below)) / 2.0,
                });
            }
        }
        best.filter(|_| lowest <= self.split_error)
    }

    /// cut-point search for the remaining criteria: sort the evidence along
    /// each parameter and weigh every cut that leaves min_measurements tuples
    /// on both sides and sits between distinct values. the first strictly best
    /// cut wins, which keeps ties deterministic.
    pub fn cutpoint(
        &self,
        parameters: &[String],
        samples: &[(&Measurement, f64)],
        value: Value,
    ) -> Option<Split> {
        let n = samples.len();
        if self.criterion == SplitCriterion::MidPoint || n < 2 * self.min_measurements {
            return None;
        }
        let positive = samples.iter().filter(|(_, label)| *label > value).count();
        let pre_info = super::criterion::info(positive, n - positive);
        let mut best: Option<Split> = None;
        let mut lowest = 1.0;
        let mut widest = 0.0;
        let mut least = f64::INFINITY;
        for parameter in parameters {
            let mut pairs = samples
                .iter()
                .map(|(m, label)| (m[parameter.as_str()], *label))
                .collect::<Vec<_>>();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            for cut in self.min_measurements..=(n - self.min_measurements) {
                if pairs[cut].0 == pairs[cut - 1].0 {
                    continue;
                }
                let point = (pairs[cut].0 + pairs[cut - 1].0) / 2.0;
                let below = pairs[..cut].iter().map(|p| p.1).collect::<Vec<_>>();
                let above = pairs[cut..].iter().map(|p| p.1).collect::<Vec<_>>();
                let split = Split {
                    parameter: parameter.clone(),
                    point,
                };
                match self.criterion {
                    SplitCriterion::InfoGain => {
                        let bp = below.iter().filter(|&&label| label > value).count();
                        let ap = above.iter().filter(|&&label| label > value).count();
                        let required = expected_info(bp, below.len() - bp, ap, above.len() - ap);
                        if required < least {
                            least = required;
                            best = Some(split);
                        }
                    }
                    SplitCriterion::MaxPoint => {
                        if self.test.p_value(&below, &above) > self.split_error {
                            continue;
                        }
                        let separation = (mean(&above) - mean(&below)).abs();
                        if separation > widest {
                            widest = separation;
                            best = Some(split);
                        }
                    }
                    _ => {
                        let p = self.test.p_value(&below, &above);
                        if p < lowest {
                            lowest = p;
                            best = Some(split);
                        }
                    }
                }
            }
        }
        match self.criterion {
            SplitCriterion::AnyPoint => best.filter(|_| lowest <= self.split_error),
            SplitCriterion::MaxPoint => best,
            SplitCriterion::InfoGain => best.filter(|_| least < pre_info),
            SplitCriterion::MidPoint => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(criterion: SplitCriterion, min_measurements: usize) -> Splitter {
        Splitter {
            criterion,
            test: StatTest::StudentTtest,
            considered_transitions: false,
            split_error: 0.05,
            min_measurements,
        }
    }

    fn at(p: f64) -> Measurement {
        Measurement::from([("p".to_string(), p)])
    }

    #[test]
    fn midpoint_requires_both_partitions() {
        let splitter = splitter(SplitCriterion::MidPoint, 1);
        let lone = at(42.0);
        let incr = vec![&lone];
        assert!(splitter.midpoint(&["p".to_string()], &incr, &[]).is_none());
    }

    #[test]
    fn midpoint_lands_between_the_partition_means() {
        let splitter = splitter(SplitCriterion::MidPoint, 3);
        let incr_ms = (0..10).map(|i| at(20.0 + i as f64)).collect::<Vec<_>>();
        let decr_ms = (0..10).map(|i| at(70.0 + i as f64)).collect::<Vec<_>>();
        let incr = incr_ms.iter().collect::<Vec<_>>();
        let decr = decr_ms.iter().collect::<Vec<_>>();
        let split = splitter.midpoint(&["p".to_string()], &incr, &decr).unwrap();
        assert_eq!(split.parameter, "p");
        assert_eq!(split.point, (24.5 + 74.5) / 2.0);
    }

    #[test]
    fn any_point_takes_the_most_significant_cut() {
        let splitter = splitter(SplitCriterion::AnyPoint, 2);
        let ms = (0..6)
            .map(|i| at(i as f64))
            .chain((0..6).map(|i| at(50.0 + i as f64)))
            .collect::<Vec<_>>();
        let samples = ms
            .iter()
            .enumerate()
            .map(|(i, m)| (m, if i < 6 { 0.0 } else { 1.0 }))
            .collect::<Vec<_>>();
        let split = splitter.cutpoint(&["p".to_string()], &samples, 0.0).unwrap();
        assert_eq!(split.point, (5.0 + 50.0) / 2.0);
    }

    #[test]
    fn cuts_respect_the_measurement_margins() {
        let splitter = splitter(SplitCriterion::AnyPoint, 3);
        // the only interesting boundary leaves two tuples on one side
        let ms = (0..2)
            .map(|i| at(i as f64))
            .chain((0..4).map(|i| at(50.0 + i as f64)))
            .collect::<Vec<_>>();
        let samples = ms
            .iter()
            .enumerate()
            .map(|(i, m)| (m, if i < 2 { 0.0 } else { 1.0 }))
            .collect::<Vec<_>>();
        assert!(splitter.cutpoint(&["p".to_string()], &samples, 0.0).is_none());
    }

    #[test]
    fn info_gain_prefers_the_zero_entropy_cut() {
        let splitter = splitter(SplitCriterion::InfoGain, 2);
        let ms = [10.0, 12.0, 14.0, 16.0, 18.0, 30.0, 32.0, 34.0, 36.0, 38.0]
            .iter()
            .map(|&p| at(p))
            .collect::<Vec<_>>();
        let samples = ms
            .iter()
            .enumerate()
            .map(|(i, m)| (m, if i < 5 { 0.0 } else { 1.0 }))
            .collect::<Vec<_>>();
        let split = splitter.cutpoint(&["p".to_string()], &samples, 0.0).unwrap();
        assert_eq!(split.point, (18.0 + 30.0) / 2.0);
    }

    #[test]
    fn info_gain_demands_strict_improvement() {
        let splitter = splitter(SplitCriterion::InfoGain, 1);
        // labels all on one side of the value: zero bits before, zero after
        let ms = [1.0, 2.0, 3.0, 4.0].iter().map(|&p| at(p)).collect::<Vec<_>>();
        let samples = ms.iter().map(|m| (m, 1.0)).collect::<Vec<_>>();
        assert!(splitter.cutpoint(&["p".to_string()], &samples, 0.0).is_none());
    }

    #[test]
    fn max_point_takes_the_widest_separation() {
        let splitter = splitter(SplitCriterion::MaxPoint, 2);
        let ms = (0..4)
            .map(|i| at(i as f64))
            .chain((0..4).map(|i| at(20.0 + i as f64)))
            .chain((0..4).map(|i| at(90.0 + i as f64)))
            .collect::<Vec<_>>();
        let samples = ms
            .iter()
            .enumerate()
            .map(|(i, m)| (m, if i < 4 { 0.0 } else if i < 8 { 1.0 } else { 10.0 }))
            .collect::<Vec<_>>();
        let split = splitter.cutpoint(&["p".to_string()], &samples, 0.0).unwrap();
        // the cut before the 90s separates means by far more than the first one
        assert_eq!(split.point, (23.0 + 90.0) / 2.0);
    }
}
