use std::fmt;

use ndarray::{Array1, Array2, ArrayView1, s};
use statrs::function::gamma::{digamma, ln_gamma};

use super::inference::{Coefficient, information_criteria, llr_test};
use super::linalg::{design_intercept_only, design_with_intercept, invert, max_abs, weighted_gram};
use super::{Family, FitError, FittedModel, SolverSettings};
use crate::data::model::Observations;

/// Starting dispersion when the moment estimate is not positive.
const MIN_START_ALPHA: f64 = 0.05;

/// Step-halving attempts before a Newton iteration gives up.
const MAX_HALVINGS: usize = 40;

/// Lower bound on `α`; below it NB2 is indistinguishable from Poisson.
const MIN_ALPHA: f64 = 1e-8;

/// Gradient size per observation accepted when the line search runs out of
/// precision.
const STALL_GRADIENT_TOL: f64 = 1e-4;

// ---------------------------------------------------------------------------
// Overdispersion diagnostic
// ---------------------------------------------------------------------------

/// Mean, sample variance and their ratio for a count outcome.
///
/// A ratio well above 1 rules out the Poisson equidispersion assumption.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispersionCheck {
    pub mean: f64,
    pub variance: f64,
    pub ratio: f64,
}

impl DispersionCheck {
    pub fn of(obs: &Observations) -> Self {
        let mean = obs.outcome_mean();
        let variance = obs.outcome_variance();
        DispersionCheck {
            mean,
            variance,
            ratio: variance / mean,
        }
    }

    pub fn is_overdispersed(&self) -> bool {
        self.ratio > 1.0
    }
}

impl fmt::Display for DispersionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mittelwert:          {}", self.mean)?;
        writeln!(f, "Varianz:             {}", self.variance)?;
        write!(f, "Varianz/Mittelwert: {}", self.ratio)
    }
}

// ---------------------------------------------------------------------------
// NB2 likelihood over θ = (β, ln α)
// ---------------------------------------------------------------------------

/// `ln(1 + e^v)` without overflow.
fn softplus(v: f64) -> f64 {
    v.max(0.0) + (-v.abs()).exp().ln_1p()
}

/// Integer counts up to this size use exact finite sums for the gamma ratios.
const EXACT_SUM_LIMIT: f64 = 1000.0;

fn is_small_count(y: f64) -> bool {
    (0.0..=EXACT_SUM_LIMIT).contains(&y) && y.fract() == 0.0
}

/// `lnΓ(y + r) − lnΓ(r)`. Stays accurate for very large `r` (α → 0), where
/// the difference of two huge `ln_gamma` values cancels.
fn ln_gamma_ratio(y: f64, r: f64) -> f64 {
    if is_small_count(y) {
        (0..y as u32).map(|j| (r + f64::from(j)).ln()).sum()
    } else {
        ln_gamma(y + r) - ln_gamma(r)
    }
}

/// `ψ(y + r) − ψ(r)`.
fn digamma_ratio(y: f64, r: f64) -> f64 {
    if is_small_count(y) {
        (0..y as u32).map(|j| 1.0 / (r + f64::from(j))).sum()
    } else {
        digamma(y + r) - digamma(r)
    }
}

struct NbProblem<'a, 'b> {
    x: &'a Array2<f64>,
    y: ArrayView1<'b, f64>,
}

impl NbProblem<'_, '_> {
    fn k(&self) -> usize {
        self.x.ncols()
    }

    fn split<'t>(&self, theta: &'t Array1<f64>) -> (ArrayView1<'t, f64>, f64) {
        let k = self.k();
        (theta.slice(s![..k]), theta[k])
    }

    fn log_likelihood(&self, theta: &Array1<f64>) -> f64 {
        let (beta, a) = self.split(theta);
        let r = (-a).exp();
        let eta = self.x.dot(&beta);
        eta.iter()
            .zip(self.y)
            .map(|(&eta, &y)| {
                ln_gamma_ratio(y, r) - ln_gamma(y + 1.0) + y * (a + eta) - (r + y) * softplus(a + eta)
            })
            .sum()
    }

    /// Analytic score with respect to `(β, ln α)`.
    fn score(&self, theta: &Array1<f64>) -> Array1<f64> {
        let k = self.k();
        let (beta, a) = self.split(theta);
        let alpha = a.exp();
        let r = 1.0 / alpha;
        let eta = self.x.dot(&beta);

        let resid: Array1<f64> = eta
            .iter()
            .zip(self.y)
            .map(|(&e, &y)| (y - e.exp()) / (1.0 + alpha * e.exp()))
            .collect();
        let d_a: f64 = eta
            .iter()
            .zip(self.y)
            .map(|(&e, &y)| {
                -r * digamma_ratio(y, r) + r * softplus(a + e) + (y - e.exp()) / (1.0 + alpha * e.exp())
            })
            .sum();

        let mut g = Array1::<f64>::zeros(k + 1);
        g.slice_mut(s![..k]).assign(&self.x.t().dot(&resid));
        g[k] = d_a;
        g
    }

    /// Hessian by central differences of the analytic score, symmetrized.
    fn hessian(&self, theta: &Array1<f64>) -> Array2<f64> {
        let n = theta.len();
        let mut h = Array2::<f64>::zeros((n, n));
        for j in 0..n {
            let step = 1e-5 * theta[j].abs().max(1.0);
            let mut plus = theta.clone();
            plus[j] += step;
            let mut minus = theta.clone();
            minus[j] -= step;
            let column = (self.score(&plus) - self.score(&minus)) / (2.0 * step);
            h.column_mut(j).assign(&column);
        }
        (&h + &h.t()) / 2.0
    }

    /// Newton direction, restricted to the coefficients while `ln α` is
    /// pinned at its lower bound. `None` unless it is an ascent direction.
    fn newton_direction(&self, theta: &Array1<f64>, g: &Array1<f64>, pinned: bool) -> Option<Array1<f64>> {
        let k = self.k();
        let neg_h = -self.hessian(theta);
        let direction = if pinned {
            let inv = invert(&neg_h.slice(s![..k, ..k]).to_owned())?;
            let mut d = Array1::<f64>::zeros(k + 1);
            d.slice_mut(s![..k]).assign(&inv.dot(&g.slice(s![..k])));
            d
        } else {
            invert(&neg_h)?.dot(g)
        };
        (direction.iter().all(|v| v.is_finite()) && direction.dot(g) > 0.0).then_some(direction)
    }
}

// ---------------------------------------------------------------------------
// Solvers
// ---------------------------------------------------------------------------

/// Poisson maximum likelihood, used only to seed the NB2 coefficients.
fn fit_poisson(
    x: &Array2<f64>,
    y: ArrayView1<f64>,
    settings: &SolverSettings,
) -> Result<Array1<f64>, FitError> {
    let ll = |beta: &Array1<f64>| -> f64 {
        x.dot(beta)
            .iter()
            .zip(y)
            .map(|(&eta, &yi)| yi * eta - eta.exp())
            .sum()
    };

    let mut beta = Array1::<f64>::zeros(x.ncols());
    beta[0] = (y.sum() / y.len() as f64).ln();
    let mut current = ll(&beta);

    for iteration in 1..=settings.max_iterations {
        let mu = x.dot(&beta).mapv(f64::exp);
        let score = x.t().dot(&(&y - &mu));
        let inv = invert(&weighted_gram(x, &mu)).ok_or(FitError::Singular("fitting Poisson start"))?;
        let direction = inv.dot(&score);

        let mut t = 1.0;
        let (next, next_ll) = loop {
            let candidate = &beta + &(&direction * t);
            let candidate_ll = ll(&candidate);
            if candidate_ll.is_finite() && candidate_ll >= current {
                break (candidate, candidate_ll);
            }
            t /= 2.0;
            if t < 1e-12 {
                return Err(FitError::NonFinite { iterations: iteration });
            }
        };
        let moved = max_abs(&(&next - &beta));
        beta = next;
        current = next_ll;
        if moved < settings.tolerance {
            return Ok(beta);
        }
    }
    Err(FitError::NotConverged {
        iterations: settings.max_iterations,
    })
}

/// Method-of-moments NB2 dispersion from Poisson residuals.
fn moment_alpha(mu: &Array1<f64>, y: ArrayView1<f64>) -> f64 {
    let n = y.len() as f64;
    let est = mu
        .iter()
        .zip(y)
        .map(|(&m, &yi)| ((yi - m).powi(2) / m - 1.0) / m)
        .sum::<f64>()
        / n;
    if est.is_finite() { est.max(MIN_START_ALPHA) } else { MIN_START_ALPHA }
}

struct NbFit {
    theta: Array1<f64>,
    log_likelihood: f64,
    iterations: usize,
}

/// Newton ascent on `(β, ln α)` with step halving. `ln α` is kept at or
/// above `MIN_ALPHA.ln()`.
fn fit_design(
    x: &Array2<f64>,
    y: ArrayView1<f64>,
    settings: &SolverSettings,
) -> Result<NbFit, FitError> {
    let k = x.ncols();
    let ln_alpha_min = MIN_ALPHA.ln();
    let beta0 = fit_poisson(x, y, settings)?;
    let alpha0 = moment_alpha(&x.dot(&beta0).mapv(f64::exp), y);

    let problem = NbProblem { x, y };
    let mut theta = Array1::<f64>::zeros(k + 1);
    theta.slice_mut(s![..k]).assign(&beta0);
    theta[k] = alpha0.ln().max(ln_alpha_min);
    let mut llf = problem.log_likelihood(&theta);
    if !llf.is_finite() {
        return Err(FitError::NonFinite { iterations: 0 });
    }

    let n = y.len().max(1) as f64;
    let gradient_tol = settings.tolerance * n;

    for iteration in 1..=settings.max_iterations {
        let mut g = problem.score(&theta);
        let pinned = theta[k] <= ln_alpha_min && g[k] <= 0.0;
        if pinned {
            g[k] = 0.0;
        }
        if max_abs(&g) < gradient_tol {
            return Ok(NbFit {
                theta,
                log_likelihood: llf,
                iterations: iteration,
            });
        }

        let newton = problem.newton_direction(&theta, &g, pinned);
        let is_newton = newton.is_some();
        let direction = newton.unwrap_or_else(|| {
            log::debug!("negbin iteration {iteration}: Hessian not negative definite, using gradient step");
            &g / (1.0 + max_abs(&g))
        });

        let mut t = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_HALVINGS {
            let mut candidate = &theta + &(&direction * t);
            candidate[k] = candidate[k].max(ln_alpha_min);
            let candidate_ll = problem.log_likelihood(&candidate);
            if candidate_ll.is_finite() && candidate_ll >= llf {
                accepted = Some((candidate, candidate_ll));
                break;
            }
            t /= 2.0;
        }
        let Some((next, next_ll)) = accepted else {
            // No uphill step left at working precision.
            if max_abs(&g) < STALL_GRADIENT_TOL * n {
                return Ok(NbFit {
                    theta,
                    log_likelihood: llf,
                    iterations: iteration,
                });
            }
            return Err(FitError::LineSearchFailed { iterations: iteration });
        };

        let moved = max_abs(&(&next - &theta));
        let gain = next_ll - llf;
        theta = next;
        llf = next_ll;
        log::debug!("negbin iteration {iteration}: theta={theta} llf={llf:.6}");
        if moved < settings.tolerance || (is_newton && gain <= settings.tolerance * (1.0 + llf.abs())) {
            return Ok(NbFit {
                theta,
                log_likelihood: llf,
                iterations: iteration,
            });
        }
    }

    Err(FitError::NotConverged {
        iterations: settings.max_iterations,
    })
}

/// Coefficient covariance, and whether `α` sits on its lower bound.
///
/// At the bound the likelihood is flat or still rising towards the Poisson
/// limit, so only the `β` block of the information is inverted.
fn covariance(problem: &NbProblem<'_, '_>, theta: &Array1<f64>) -> Result<(Array2<f64>, bool), FitError> {
    let k = problem.k();
    let neg_h = -problem.hessian(theta);
    let pushed_to_bound = problem.score(theta)[k] <= 0.0;
    let at_bound = theta[k] <= MIN_ALPHA.ln() + 1e-9;

    if !at_bound {
        let full = invert(&neg_h).filter(|cov| cov[[k, k]].is_finite() && cov[[k, k]] > 0.0);
        match full {
            Some(cov) => return Ok((cov, false)),
            None if !pushed_to_bound => return Err(FitError::Singular("computing covariance")),
            None => log::warn!("negbin: dispersion not identifiable near α = {:.3e}", theta[k].exp()),
        }
    }
    let beta_cov =
        invert(&neg_h.slice(s![..k, ..k]).to_owned()).ok_or(FitError::Singular("computing covariance"))?;
    Ok((beta_cov, true))
}

pub fn fit(obs: &Observations, settings: &SolverSettings) -> Result<FittedModel, FitError> {
    if let Some(row) = obs.outcome.iter().position(|&y| y < 0.0) {
        return Err(FitError::InvalidOutcome {
            row,
            value: obs.outcome[row],
            reason: "count outcome must be non-negative",
        });
    }

    let y = ArrayView1::from(&obs.outcome[..]);
    let design = design_with_intercept(&obs.predictor);
    let full = fit_design(&design, y, settings)?;
    let null = fit_design(&design_intercept_only(obs.len()), y, settings)?;

    let theta = &full.theta;
    let (cov, alpha_at_bound) = covariance(&NbProblem { x: &design, y }, theta)?;
    let alpha = if alpha_at_bound {
        log::info!("negbin: no overdispersion, α held at its lower bound {MIN_ALPHA:e}");
        Coefficient::at_bound("alpha", theta[2].exp())
    } else {
        Coefficient::wald("ln alpha", theta[2], cov[[2, 2]])?.exp_transformed("alpha")
    };
    let (llr, llr_p_value) = llr_test(full.log_likelihood, null.log_likelihood, 1.0);
    let (aic, bic) = information_criteria(full.log_likelihood, 3, obs.len());

    Ok(FittedModel {
        family: Family::NegativeBinomial,
        predictor_name: obs.predictor_name.clone(),
        outcome_name: obs.outcome_name.clone(),
        coefficients: [
            Coefficient::wald("const", theta[0], cov[[0, 0]])?,
            Coefficient::wald(&obs.predictor_name, theta[1], cov[[1, 1]])?,
        ],
        alpha: Some(alpha),
        log_likelihood: full.log_likelihood,
        null_log_likelihood: null.log_likelihood,
        llr,
        llr_p_value,
        aic,
        bic,
        n_obs: obs.len(),
        iterations: full.iterations,
        converged: true,
    })
}
