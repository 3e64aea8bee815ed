//! Generalized linear models with one predictor plus intercept.
//!
//! Two families are supported:
//!
//! * [`Family::Logit`]: binomial outcome, `P(y = 1) = σ(b0 + b1·x)`
//! * [`Family::NegativeBinomial`]: count outcome (NB2),
//!   `E[y] = exp(b0 + b1·x)`, `Var[y] = μ + α·μ²`
//!
//! Both are fitted by maximum likelihood with Newton iterations. Any fitting
//! failure is returned as a [`FitError`]; there is no fallback model.

mod inference;
pub mod linalg;
mod logit;
mod negbin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::model::Observations;

pub use inference::Coefficient;
pub use negbin::DispersionCheck;

/// Errors that can occur while fitting a model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("need at least {needed} observations, got {got}")]
    TooFewObservations { needed: usize, got: usize },

    #[error("invalid outcome value {value} at row {row}: {reason}")]
    InvalidOutcome { row: usize, value: f64, reason: &'static str },

    #[error("outcome is constant ({0}); the slope is not identifiable")]
    ConstantOutcome(f64),

    #[error("predictor is constant ({0}); the slope is not identifiable")]
    ConstantPredictor(f64),

    #[error("predictor perfectly separates the outcome; maximum likelihood estimate does not exist")]
    PerfectSeparation,

    #[error("singular Hessian while {0}")]
    Singular(&'static str),

    #[error("log-likelihood became non-finite after {iterations} iterations")]
    NonFinite { iterations: usize },

    #[error("maximum likelihood did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("line search found no improving step at iteration {iterations}")]
    LineSearchFailed { iterations: usize },
}

/// Iteration limits for the Newton solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Maximum number of Newton iterations (default: 100)
    pub max_iterations: usize,
    /// Convergence tolerance on the largest parameter step (default: 1e-8)
    pub tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

/// Model family, chosen by the kind of outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Logit,
    NegativeBinomial,
}

impl Family {
    pub fn name(&self) -> &'static str {
        match self {
            Family::Logit => "Logit",
            Family::NegativeBinomial => "NegativeBinomial",
        }
    }
}

/// Result of a maximum likelihood fit. Immutable once built.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub family: Family,
    pub predictor_name: String,
    pub outcome_name: String,
    /// `[const, predictor]`
    pub coefficients: [Coefficient; 2],
    /// NB2 dispersion parameter; `None` for logit.
    pub alpha: Option<Coefficient>,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    /// Likelihood-ratio statistic against the intercept-only model.
    pub llr: f64,
    pub llr_p_value: f64,
    pub aic: f64,
    pub bic: f64,
    pub n_obs: usize,
    pub iterations: usize,
    pub converged: bool,
}

impl FittedModel {
    pub fn intercept(&self) -> f64 {
        self.coefficients[0].estimate
    }

    pub fn slope(&self) -> f64 {
        self.coefficients[1].estimate
    }

    pub fn slope_p_value(&self) -> f64 {
        self.coefficients[1].p_value
    }

    /// McFadden pseudo-R²: `1 − llf / llnull`.
    pub fn pseudo_r2(&self) -> f64 {
        1.0 - self.log_likelihood / self.null_log_likelihood
    }

    /// Fitted probability (logit) or expected count (NB) at `x`.
    pub fn predict(&self, x: f64) -> f64 {
        let eta = self.intercept() + self.slope() * x;
        match self.family {
            Family::Logit => logit::sigmoid(eta),
            Family::NegativeBinomial => eta.exp(),
        }
    }

    pub fn predict_all(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.predict(x)).collect()
    }
}

/// Fit the given family to the observations.
pub fn fit(
    family: Family,
    obs: &Observations,
    settings: &SolverSettings,
) -> Result<FittedModel, FitError> {
    check_identifiable(obs, family)?;
    match family {
        Family::Logit => logit::fit(obs, settings),
        Family::NegativeBinomial => negbin::fit(obs, settings),
    }
}

/// Reject inputs for which the slope cannot be estimated at all.
fn check_identifiable(obs: &Observations, family: Family) -> Result<(), FitError> {
    let needed = match family {
        Family::Logit => 3,
        Family::NegativeBinomial => 4,
    };
    if obs.len() < needed {
        return Err(FitError::TooFewObservations {
            needed,
            got: obs.len(),
        });
    }
    let first_x = obs.predictor[0];
    if obs.predictor.iter().all(|&x| x == first_x) {
        return Err(FitError::ConstantPredictor(first_x));
    }
    let first_y = obs.outcome[0];
    if obs.outcome.iter().all(|&y| y == first_y) {
        return Err(FitError::ConstantOutcome(first_y));
    }
    Ok(())
}
