use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::function::erf::erfc;

use super::FitError;

/// One estimated parameter with its Wald statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z: f64,
    /// Two-sided p-value of `H0: estimate = 0`.
    pub p_value: f64,
    /// 95% confidence interval.
    pub ci_low: f64,
    pub ci_high: f64,
}

/// 97.5% quantile of the standard normal.
const Z_975: f64 = 1.959_963_984_540_054;

/// Two-sided tail probability `P(|Z| > |z|)` of the standard normal.
fn two_sided_p(z: f64) -> f64 {
    erfc(z.abs() / std::f64::consts::SQRT_2)
}

impl Coefficient {
    /// Wald statistics from an estimate and its variance.
    pub fn wald(name: &str, estimate: f64, variance: f64) -> Result<Self, FitError> {
        if !(variance.is_finite() && variance > 0.0) {
            return Err(FitError::Singular("computing standard errors"));
        }
        let std_error = variance.sqrt();
        let z = estimate / std_error;
        Ok(Coefficient {
            name: name.to_string(),
            estimate,
            std_error,
            z,
            p_value: two_sided_p(z),
            ci_low: estimate - Z_975 * std_error,
            ci_high: estimate + Z_975 * std_error,
        })
    }

    /// A parameter held at a bound of its range. It has no Wald statistics;
    /// the interval collapses to the estimate.
    pub fn at_bound(name: &str, estimate: f64) -> Self {
        Coefficient {
            name: name.to_string(),
            estimate,
            std_error: f64::NAN,
            z: f64::NAN,
            p_value: f64::NAN,
            ci_low: estimate,
            ci_high: estimate,
        }
    }

    /// Re-express a coefficient estimated on the log scale on the natural
    /// scale (delta method for the standard error).
    pub fn exp_transformed(&self, name: &str) -> Self {
        let estimate = self.estimate.exp();
        let std_error = estimate * self.std_error;
        let z = estimate / std_error;
        Coefficient {
            name: name.to_string(),
            estimate,
            std_error,
            z,
            p_value: two_sided_p(z),
            ci_low: self.ci_low.exp(),
            ci_high: self.ci_high.exp(),
        }
    }
}

/// Likelihood-ratio statistic and its χ² p-value.
pub fn llr_test(llf: f64, llnull: f64, df: f64) -> (f64, f64) {
    let llr = (2.0 * (llf - llnull)).max(0.0);
    let p = match ChiSquared::new(df) {
        Ok(chi) => (1.0 - chi.cdf(llr)).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    };
    (llr, p)
}

/// `(AIC, BIC)` for `k` estimated parameters over `n` observations.
pub fn information_criteria(llf: f64, k: usize, n: usize) -> (f64, f64) {
    let k = k as f64;
    (2.0 * k - 2.0 * llf, k * (n as f64).ln() - 2.0 * llf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wald_p_value_matches_normal_tail() {
        let c = Coefficient::wald("x", 1.96, 1.0).unwrap();
        assert!((c.p_value - 0.05).abs() < 1e-3);
        assert!((c.ci_low - (1.96 - 1.959964)).abs() < 1e-5);
    }

    #[test]
    fn non_positive_variance_is_singular() {
        assert!(Coefficient::wald("x", 1.0, 0.0).is_err());
        assert!(Coefficient::wald("x", 1.0, f64::NAN).is_err());
    }

    #[test]
    fn bound_parameter_has_no_wald_statistics() {
        let c = Coefficient::at_bound("alpha", 1e-8);
        assert_eq!(c.estimate, 1e-8);
        assert!(c.std_error.is_nan() && c.p_value.is_nan());
        assert_eq!((c.ci_low, c.ci_high), (1e-8, 1e-8));
    }

    #[test]
    fn llr_of_identical_models_is_not_significant() {
        let (llr, p) = llr_test(-10.0, -10.0, 1.0);
        assert_eq!(llr, 0.0);
        assert!((p - 1.0).abs() < 1e-12);
    }
}
