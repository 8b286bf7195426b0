//! Normal-approximation statistics for conversion rates.

use serde::{Deserialize, Serialize};

/// Closed interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn around(center: f64, half_width: f64) -> Self {
        Self {
            lower: center - half_width,
            upper: center + half_width,
        }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Standard normal cumulative distribution function.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / std::f64::consts::SQRT_2))
}

/// Inverse of the standard normal CDF (Acklam's rational approximation,
/// relative error below 1.15e-9).
///
/// Returns `NaN` outside the open interval (0, 1).
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;

    if !(p > 0.0 && p < 1.0) {
        return f64::NAN;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

/// Two-sided critical value for a confidence level (1.96 at 0.95).
pub fn z_for_confidence(confidence_level: f64) -> f64 {
    normal_quantile(1.0 - (1.0 - confidence_level) / 2.0)
}

/// Comparison of a treatment proportion against a control proportion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProportionComparison {
    pub control_rate: f64,
    pub treatment_rate: f64,
    /// Comparison interval of the control rate.
    pub control_interval: Interval,
    /// Comparison interval of the treatment rate.
    pub treatment_interval: Interval,
    /// Interval of `treatment_rate - control_rate`.
    pub difference: Interval,
    /// Pooled two-proportion z statistic.
    pub z_score: f64,
    /// Two-sided p-value of `z_score`.
    pub p_value: f64,
    /// True when the two comparison intervals do not overlap.
    pub significant: bool,
}

/// Compare two proportions given as `(conversions, visitors)`.
///
/// Each rate gets the comparison interval `rate ± z·sqrt(se_c² + se_t²)/2`,
/// so the intervals are disjoint exactly when the difference interval
/// excludes zero. Returns `None` when either side has no visitors.
pub fn compare_proportions(
    control: (u64, u64),
    treatment: (u64, u64),
    confidence_level: f64,
) -> Option<ProportionComparison> {
    let (c_conv, c_n) = control;
    let (t_conv, t_n) = treatment;
    if c_n == 0 || t_n == 0 {
        return None;
    }

    let n_c = c_n as f64;
    let n_t = t_n as f64;
    let p_c = c_conv as f64 / n_c;
    let p_t = t_conv as f64 / n_t;

    let var_c = p_c * (1.0 - p_c) / n_c;
    let var_t = p_t * (1.0 - p_t) / n_t;
    let se_diff = (var_c + var_t).sqrt();

    let z = z_for_confidence(confidence_level);
    let margin = z * se_diff;

    let control_interval = Interval::around(p_c, margin / 2.0);
    let treatment_interval = Interval::around(p_t, margin / 2.0);

    let pooled = (c_conv + t_conv) as f64 / (n_c + n_t);
    let se_pooled = (pooled * (1.0 - pooled) * (1.0 / n_c + 1.0 / n_t)).sqrt();
    let z_score = if se_pooled > 0.0 {
        (p_t - p_c) / se_pooled
    } else {
        0.0
    };
    let p_value = 2.0 * (1.0 - normal_cdf(z_score.abs()));

    Some(ProportionComparison {
        control_rate: p_c,
        treatment_rate: p_t,
        control_interval,
        treatment_interval,
        difference: Interval::around(p_t - p_c, margin),
        z_score,
        p_value,
        significant: !control_interval.overlaps(&treatment_interval),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_matches_known_critical_values() {
        assert!((z_for_confidence(0.95) - 1.959_964).abs() < 1e-5);
        assert!((z_for_confidence(0.90) - 1.644_854).abs() < 1e-5);
        assert!((z_for_confidence(0.99) - 2.575_829).abs() < 1e-5);
        assert!(normal_quantile(0.5).abs() < 1e-12);
        assert!(normal_quantile(1.0).is_nan());
    }

    #[test]
    fn quantile_inverts_cdf_in_the_tails() {
        for p in [0.001, 0.01, 0.2, 0.8, 0.99, 0.999] {
            assert!((normal_cdf(normal_quantile(p)) - p).abs() < 1e-6, "p = {p}");
        }
    }

    #[test]
    fn ten_vs_twenty_percent_is_significant() {
        let cmp = compare_proportions((10, 100), (20, 100), 0.95).unwrap();
        assert!(cmp.treatment_interval.lower > cmp.control_interval.upper);
        assert!(cmp.significant);
        assert!(cmp.difference.lower > 0.0);
    }

    #[test]
    fn ten_vs_twelve_percent_overlaps() {
        let cmp = compare_proportions((10, 100), (12, 100), 0.95).unwrap();
        assert!(cmp.control_interval.overlaps(&cmp.treatment_interval));
        assert!(!cmp.significant);
        assert!(cmp.difference.contains(0.0));
    }

    #[test]
    fn no_visitors_means_no_comparison() {
        assert!(compare_proportions((0, 0), (5, 10), 0.95).is_none());
        assert!(compare_proportions((5, 10), (0, 0), 0.95).is_none());
    }

    #[test]
    fn identical_degenerate_rates_are_not_significant() {
        let cmp = compare_proportions((0, 50), (0, 80), 0.95).unwrap();
        assert!(!cmp.significant);
        assert_eq!(cmp.z_score, 0.0);
    }
}
