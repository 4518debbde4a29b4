use crate::error::Error;
use crate::error::Result;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;
use statrs::distribution::StudentsT;

/// the two-sample tests the splitter can weigh evidence with. every test
/// reports a two-sided p-value; degenerate inputs report p = 1 so that they
/// can never look significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatTest {
    StudentTtest,
    WelchTtest,
    MannWhitneyUtest,
    KolmogorovSmirnov,
}

impl StatTest {
    /// two-sided p-value for the hypothesis that both samples share one
    /// distribution.
    pub fn p_value(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Self::StudentTtest => student(a, b),
            Self::WelchTtest => welch(a, b),
            Self::MannWhitneyUtest => mann_whitney(a, b),
            Self::KolmogorovSmirnov => kolmogorov_smirnov(a, b),
        }
    }
}

impl std::str::FromStr for StatTest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "student_ttest" => Ok(Self::StudentTtest),
            "welch_ttest" => Ok(Self::WelchTtest),
            "mann_whitney_utest" => Ok(Self::MannWhitneyUtest),
            "kolmogorov_smirnov" => Ok(Self::KolmogorovSmirnov),
            _ => Err(Error::Parameter(format!("unknown statistical test: {}", s))),
        }
    }
}

impl std::fmt::Display for StatTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StudentTtest => write!(f, "student_ttest"),
            Self::WelchTtest => write!(f, "welch_ttest"),
            Self::MannWhitneyUtest => write!(f, "mann_whitney_utest"),
            Self::KolmogorovSmirnov => write!(f, "kolmogorov_smirnov"),
        }
    }
}

pub(crate) fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// unbiased sample variance.
fn variance(xs: &[f64]) -> f64 {
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

/// pooled-variance two-sample t-test.
fn student(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len(), b.len());
    if n1 < 2 || n2 < 2 {
        return 1.0;
    }
    let df = (n1 + n2 - 2) as f64;
    let pooled = ((n1 - 1) as f64 * variance(a) + (n2 - 1) as f64 * variance(b)) / df;
    let denominator = (pooled * (1.0 / n1 as f64 + 1.0 / n2 as f64)).sqrt();
    if denominator == 0.0 {
        return if mean(a) == mean(b) { 1.0 } else { 0.0 };
    }
    two_sided((mean(a) - mean(b)) / denominator, df)
}

/// unequal-variance t-test with the welch-satterthwaite degrees of freedom.
fn welch(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len(), b.len());
    if n1 < 2 || n2 < 2 {
        return 1.0;
    }
    let (v1, v2) = (variance(a) / n1 as f64, variance(b) / n2 as f64);
    if v1 + v2 == 0.0 {
        return if mean(a) == mean(b) { 1.0 } else { 0.0 };
    }
    let t = (mean(a) - mean(b)) / (v1 + v2).sqrt();
    let df = (v1 + v2).powi(2)
        / (v1 * v1 / (n1 as f64 - 1.0) + v2 * v2 / (n2 as f64 - 1.0));
    two_sided(t, df)
}

fn two_sided(t: f64, df: f64) -> f64 {
    let dist = StudentsT::new(0.0, 1.0, df).expect("positive degrees of freedom");
    2.0 * dist.cdf(-t.abs())
}

/// rank-sum test under the normal approximation with tie correction and
/// continuity correction; the one-sided tail is doubled. constant pooled
/// input degenerates to p = 1.
fn mann_whitney(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 1.0;
    }
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let mut pooled = a
        .iter()
        .map(|&x| (x, true))
        .chain(b.iter().map(|&x| (x, false)))
        .collect::<Vec<_>>();
    pooled.sort_by(|x, y| x.0.total_cmp(&y.0));
    let total = pooled.len();
    let mut ranks = vec![0.0; total];
    let mut ties = 0.0;
    let mut i = 0;
    while i < total {
        let mut j = i;
        while j + 1 < total && pooled[j + 1].0 == pooled[i].0 {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for slot in ranks.iter_mut().take(j + 1).skip(i) {
            *slot = rank;
        }
        let run = (j - i + 1) as f64;
        ties += run.powi(3) - run;
        i = j + 1;
    }
    let r1 = pooled
        .iter()
        .zip(&ranks)
        .filter(|((_, first), _)| *first)
        .map(|(_, rank)| *rank)
        .sum::<f64>();
    let u1 = n1 * n2 + n1 * (n1 + 1.0) / 2.0 - r1;
    let u2 = n1 * n2 - u1;
    let n = total as f64;
    let correction = 1.0 - ties / (n.powi(3) - n);
    let sd = (correction * n1 * n2 * (n + 1.0) / 12.0).sqrt();
    if sd == 0.0 {
        return 1.0;
    }
    let z = (u1.max(u2) - n1 * n2 / 2.0 - 0.5) / sd;
    let normal = Normal::new(0.0, 1.0).expect("unit normal");
    (2.0 * (1.0 - normal.cdf(z))).min(1.0)
}

/// two-sample kolmogorov-smirnov with the asymptotic distribution of the
/// supremum distance between the empirical cdfs.
fn kolmogorov_smirnov(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 1.0;
    }
    let mut xs = a.to_vec();
    let mut ys = b.to_vec();
    xs.sort_by(f64::total_cmp);
    ys.sort_by(f64::total_cmp);
    let (n1, n2) = (xs.len(), ys.len());
    let mut statistic: f64 = 0.0;
    let (mut i, mut j) = (0, 0);
    while i < n1 && j < n2 {
        let x = xs[i].min(ys[j]);
        while i < n1 && xs[i] <= x {
            i += 1;
        }
        while j < n2 && ys[j] <= x {
            j += 1;
        }
        let d = (i as f64 / n1 as f64 - j as f64 / n2 as f64).abs();
        statistic = statistic.max(d);
    }
    let en = ((n1 * n2) as f64 / (n1 + n2) as f64).sqrt();
    kolmogorov((en + 0.12 + 0.11 / en) * statistic)
}

/// survival function of the kolmogorov distribution.
fn kolmogorov(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for k in 1..=100 {
        let term = (-2.0 * (k as f64).powi(2) * lambda * lambda).exp();
        sum += sign * term;
        if term < 1e-12 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOW: [f64; 8] = [1.0, 1.5, 2.0, 2.5, 1.2, 1.8, 2.2, 1.6];
    const HIGH: [f64; 8] = [8.0, 8.5, 9.0, 9.5, 8.2, 8.8, 9.2, 8.6];

    #[test]
    fn separated_samples_look_significant() {
        for test in [
            StatTest::StudentTtest,
            StatTest::WelchTtest,
            StatTest::MannWhitneyUtest,
            StatTest::KolmogorovSmirnov,
        ] {
            assert!(test.p_value(&LOW, &HIGH) < 0.01, "{:?}", test);
        }
    }

    #[test]
    fn identical_samples_do_not() {
        for test in [
            StatTest::StudentTtest,
            StatTest::WelchTtest,
            StatTest::MannWhitneyUtest,
            StatTest::KolmogorovSmirnov,
        ] {
            assert!(test.p_value(&LOW, &LOW) > 0.5, "{:?}", test);
        }
    }

    #[test]
    fn constant_input_degenerates_to_one() {
        let flat = [3.0; 6];
        assert_eq!(StatTest::MannWhitneyUtest.p_value(&flat, &flat), 1.0);
        assert_eq!(StatTest::StudentTtest.p_value(&flat, &flat), 1.0);
        assert_eq!(StatTest::StudentTtest.p_value(&[1.0; 6], &[2.0; 6]), 0.0);
    }

    #[test]
    fn tiny_samples_are_never_significant() {
        assert_eq!(StatTest::StudentTtest.p_value(&[1.0], &[9.0]), 1.0);
        assert_eq!(StatTest::WelchTtest.p_value(&[1.0], &[9.0]), 1.0);
    }

    #[test]
    fn unknown_test_name_is_a_parameter_error() {
        assert!(matches!("bogus".parse::<StatTest>(), Err(Error::Parameter(_))));
        assert_eq!(
            "mann_whitney_utest".parse::<StatTest>().unwrap(),
            StatTest::MannWhitneyUtest
        );
    }
}
