use ndarray::{Array1, Array2, ArrayView1};

use super::inference::{Coefficient, information_criteria, llr_test};
use super::linalg::{design_with_intercept, invert, max_abs, weighted_gram};
use super::{Family, FitError, FittedModel, SolverSettings};
use crate::data::model::Observations;

pub fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^eta)` without overflow.
fn softplus(eta: f64) -> f64 {
    eta.max(0.0) + (-eta.abs()).exp().ln_1p()
}

fn log_likelihood(x: &Array2<f64>, y: ArrayView1<f64>, beta: &Array1<f64>) -> f64 {
    x.dot(beta)
        .iter()
        .zip(y)
        .map(|(&eta, &yi)| yi * eta - softplus(eta))
        .sum()
}

/// Closed-form log-likelihood of the intercept-only model.
fn null_log_likelihood(y: &[f64]) -> f64 {
    let n = y.len() as f64;
    let p = y.iter().sum::<f64>() / n;
    n * (p * p.ln() + (1.0 - p) * (1.0 - p).ln())
}

fn check_binary(y: &[f64]) -> Result<(), FitError> {
    match y.iter().position(|&v| v != 0.0 && v != 1.0) {
        Some(row) => Err(FitError::InvalidOutcome {
            row,
            value: y[row],
            reason: "binary outcome must be 0 or 1",
        }),
        None => Ok(()),
    }
}

/// True when a threshold on `x` classifies every row correctly.
fn perfectly_separated(x: &[f64], y: &[f64]) -> bool {
    let range = |class: f64| {
        x.iter()
            .zip(y)
            .filter(|(_, yi)| **yi == class)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (&xi, _)| {
                (lo.min(xi), hi.max(xi))
            })
    };
    let (lo0, hi0) = range(0.0);
    let (lo1, hi1) = range(1.0);
    hi0 < lo1 || hi1 < lo0
}

/// Newton-Raphson on the analytic score and Hessian, starting from zero.
pub fn fit(obs: &Observations, settings: &SolverSettings) -> Result<FittedModel, FitError> {
    check_binary(&obs.outcome)?;
    if perfectly_separated(&obs.predictor, &obs.outcome) {
        return Err(FitError::PerfectSeparation);
    }

    let x = design_with_intercept(&obs.predictor);
    let y = ArrayView1::from(&obs.outcome[..]);
    let mut beta = Array1::<f64>::zeros(2);
    let mut converged = false;
    let mut iterations = 0;

    while iterations < settings.max_iterations {
        iterations += 1;
        let p = x.dot(&beta).mapv(sigmoid);
        let score = x.t().dot(&(&y - &p));
        let information = weighted_gram(&x, &p.mapv(|pi| pi * (1.0 - pi)));
        let inv = invert(&information).ok_or(FitError::Singular("fitting logit"))?;
        let step = inv.dot(&score);
        beta += &step;

        let llf = log_likelihood(&x, y, &beta);
        log::debug!("logit iteration {iterations}: beta={beta} llf={llf:.6}");
        if !llf.is_finite() {
            return Err(FitError::NonFinite { iterations });
        }
        if max_abs(&step) < settings.tolerance {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(FitError::NotConverged { iterations });
    }

    let p = x.dot(&beta).mapv(sigmoid);
    let information = weighted_gram(&x, &p.mapv(|pi| pi * (1.0 - pi)));
    let cov = invert(&information).ok_or(FitError::Singular("computing covariance"))?;

    let llf = log_likelihood(&x, y, &beta);
    let llnull = null_log_likelihood(&obs.outcome);
    let (llr, llr_p_value) = llr_test(llf, llnull, 1.0);
    let (aic, bic) = information_criteria(llf, 2, obs.len());

    Ok(FittedModel {
        family: Family::Logit,
        predictor_name: obs.predictor_name.clone(),
        outcome_name: obs.outcome_name.clone(),
        coefficients: [
            Coefficient::wald("const", beta[0], cov[[0, 0]])?,
            Coefficient::wald(&obs.predictor_name, beta[1], cov[[1, 1]])?,
        ],
        alpha: None,
        log_likelihood: llf,
        null_log_likelihood: llnull,
        llr,
        llr_p_value,
        aic,
        bic,
        n_obs: obs.len(),
        iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glm::fit as fit_family;

    fn obs(x: Vec<f64>, y: Vec<f64>) -> Observations {
        Observations {
            predictor_name: "Anzahl Photos".into(),
            outcome_name: "Verkauf".into(),
            predictor: x,
            outcome: y,
        }
    }

    /// Deterministic sample: for each x, the share of successes equals
    /// σ(b0 + b1·x) rounded to the nearest 1/`per_x`.
    fn synthetic(b0: f64, b1: f64, xs: std::ops::RangeInclusive<i32>, per_x: usize) -> Observations {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for xi in xs {
            let p = sigmoid(b0 + b1 * xi as f64);
            let ones = (p * per_x as f64).round() as usize;
            for k in 0..per_x {
                x.push(xi as f64);
                y.push(if k < ones { 1.0 } else { 0.0 });
            }
        }
        obs(x, y)
    }

    #[test]
    fn recovers_known_coefficients() {
        let data = synthetic(-1.5, 0.3, 0..=12, 400);
        let model = fit_family(Family::Logit, &data, &SolverSettings::default()).unwrap();

        assert!(model.converged);
        assert!((model.intercept() + 1.5).abs() < 0.02, "b0 = {}", model.intercept());
        assert!((model.slope() - 0.3).abs() < 0.01, "b1 = {}", model.slope());
        assert!(model.slope_p_value() < 1e-3);
        assert!(model.log_likelihood > model.null_log_likelihood);
    }

    #[test]
    fn fitted_probabilities_stay_in_unit_interval() {
        let data = synthetic(-3.0, 0.8, 0..=10, 20);
        let model = fit_family(Family::Logit, &data, &SolverSettings::default()).unwrap();

        for p in model.predict_all(&data.predictor) {
            assert!((0.0..=1.0).contains(&p));
        }
        for x in [-1e3, 1e3] {
            assert!((0.0..=1.0).contains(&model.predict(x)));
        }
    }

    #[test]
    fn null_model_matches_intercept_only_likelihood() {
        let y = [1.0, 0.0, 0.0, 1.0, 0.0];
        let p: f64 = 0.4;
        let expected = 2.0 * p.ln() + 3.0 * (1.0 - p).ln();
        assert!((null_log_likelihood(&y) - expected).abs() < 1e-12);
    }

    #[test]
    fn perfect_separation_is_rejected() {
        let data = obs(vec![1.0, 2.0, 3.0, 4.0], vec![0.0, 0.0, 1.0, 1.0]);
        let err = fit_family(Family::Logit, &data, &SolverSettings::default()).unwrap_err();
        assert_eq!(err, FitError::PerfectSeparation);
    }

    #[test]
    fn non_binary_outcome_is_rejected() {
        let data = obs(vec![1.0, 2.0, 3.0, 4.0], vec![0.0, 2.0, 1.0, 0.0]);
        let err = fit_family(Family::Logit, &data, &SolverSettings::default()).unwrap_err();
        assert!(matches!(err, FitError::InvalidOutcome { row: 1, .. }));
    }

    #[test]
    fn iteration_budget_exhaustion_is_fatal() {
        let data = synthetic(-1.0, 0.2, 0..=10, 50);
        let settings = SolverSettings {
            max_iterations: 1,
            tolerance: 1e-12,
        };
        let err = fit_family(Family::Logit, &data, &settings).unwrap_err();
        assert_eq!(err, FitError::NotConverged { iterations: 1 });
    }

    #[test]
    fn softplus_is_stable_for_large_inputs() {
        assert!((softplus(800.0) - 800.0).abs() < 1e-9);
        assert!(softplus(-800.0) >= 0.0);
        assert!((softplus(0.0) - 2f64.ln()).abs() < 1e-15);
    }
}
