//! Fitted values, observed averages, console report and charts.

pub mod plot;

use std::fmt;

use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::data::model::Observations;
use crate::glm::{Coefficient, Family, FittedModel};

// ---------------------------------------------------------------------------
// Observed vs. predicted series
// ---------------------------------------------------------------------------

/// Mean outcome for every distinct predictor value, ascending by predictor.
pub fn average_by_predictor(obs: &Observations) -> Vec<(f64, f64)> {
    let mut pairs: Vec<(f64, f64)> = obs
        .predictor
        .iter()
        .copied()
        .zip(obs.outcome.iter().copied())
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut averages = Vec::new();
    for group in pairs.chunk_by(|a, b| a.0 == b.0) {
        let sum: f64 = group.iter().map(|(_, y)| y).sum();
        averages.push((group[0].0, sum / group.len() as f64));
    }
    averages
}

/// Largest number of points on a model curve.
pub const MAX_CURVE_POINTS: usize = 501;

/// Model predictions at every integer from 0 up to `floor(max)`. Wider
/// ranges are sampled at [`MAX_CURVE_POINTS`] evenly spaced points over
/// `[0, max]`.
pub fn model_curve(model: &FittedModel, max: f64) -> Vec<(f64, f64)> {
    let upper = if max.is_finite() { max.max(0.0) } else { 0.0 };
    let xs: Vec<f64> = if upper.floor() < MAX_CURVE_POINTS as f64 {
        (0..=upper.floor() as usize).map(|i| i as f64).collect()
    } else {
        let step = upper / (MAX_CURVE_POINTS - 1) as f64;
        (0..MAX_CURVE_POINTS).map(|i| i as f64 * step).collect()
    };
    xs.into_iter().map(|x| (x, model.predict(x))).collect()
}

/// Everything a chart needs, computed without touching the filesystem.
#[derive(Debug, Clone)]
pub struct ChartData {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub observed: Vec<(f64, f64)>,
    pub predicted: Vec<(f64, f64)>,
    pub observed_label: String,
    pub model_label: String,
}

impl ChartData {
    pub fn build(obs: &Observations, model: &FittedModel) -> Self {
        let max = obs.predictor_max().unwrap_or(0.0);
        let (title, y_label, observed_label, model_label) = match model.family {
            Family::Logit => (
                format!("Wahrscheinlichkeit {} ~ {}", obs.outcome_name, obs.predictor_name),
                format!("Wahrscheinlichkeit {}", obs.outcome_name),
                "Durchschnittlicher Anteil (tatsächlich)".to_string(),
                "Modellprognose (Logit)".to_string(),
            ),
            Family::NegativeBinomial => (
                format!("Negative-Binomial-Regression: {} ~ {}", obs.predictor_name, obs.outcome_name),
                obs.outcome_name.clone(),
                "Durchschnittswerte".to_string(),
                "NB-Vorhersagen".to_string(),
            ),
        };
        ChartData {
            title,
            x_label: obs.predictor_name.clone(),
            y_label,
            observed: average_by_predictor(obs),
            predicted: model_curve(model, max),
            observed_label,
            model_label,
        }
    }
}

// ---------------------------------------------------------------------------
// Console report
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct CoefficientRow {
    #[tabled(rename = "")]
    name: String,
    #[tabled(rename = "coef")]
    coef: String,
    #[tabled(rename = "std err")]
    std_err: String,
    #[tabled(rename = "z")]
    z: String,
    #[tabled(rename = "P>|z|")]
    p: String,
    #[tabled(rename = "[0.025")]
    low: String,
    #[tabled(rename = "0.975]")]
    high: String,
}

impl From<&Coefficient> for CoefficientRow {
    fn from(c: &Coefficient) -> Self {
        CoefficientRow {
            name: c.name.clone(),
            coef: format!("{:.4}", c.estimate),
            std_err: format!("{:.4}", c.std_error),
            z: format!("{:.3}", c.z),
            p: format!("{:.3}", c.p_value),
            low: format!("{:.3}", c.ci_low),
            high: format!("{:.3}", c.ci_high),
        }
    }
}

/// Full regression summary for the console.
pub struct FitReport<'a>(pub &'a FittedModel);

impl fmt::Display for FitReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        let title = format!("{} Regression Results", m.family.name());
        writeln!(f, "{title}")?;
        writeln!(f, "{}", "=".repeat(title.len()))?;
        writeln!(f, "Dep. Variable:   {}", m.outcome_name)?;
        writeln!(f, "No. Observations: {}", m.n_obs)?;
        writeln!(f, "Converged:       {} ({} iterations)", m.converged, m.iterations)?;
        writeln!(f, "Log-Likelihood:  {:.3}", m.log_likelihood)?;
        writeln!(f, "LL-Null:         {:.3}", m.null_log_likelihood)?;
        writeln!(f, "LLR p-value:     {:.4e}", m.llr_p_value)?;
        writeln!(f, "Pseudo R-squ.:   {:.5}", m.pseudo_r2())?;
        writeln!(f, "AIC / BIC:       {:.2} / {:.2}", m.aic, m.bic)?;

        let rows: Vec<CoefficientRow> = m
            .coefficients
            .iter()
            .chain(m.alpha.iter())
            .map(CoefficientRow::from)
            .collect();
        write!(f, "{}", Table::new(rows).with(Style::modern()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glm::{SolverSettings, fit};

    fn obs() -> Observations {
        Observations {
            predictor_name: "Anzahl Photos".into(),
            outcome_name: "Verkauf".into(),
            predictor: vec![2.0, 0.0, 2.0, 1.0, 0.0, 3.0, 1.0, 3.0, 2.0, 0.0],
            outcome: vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0],
        }
    }

    #[test]
    fn averages_group_by_distinct_predictor_value() {
        let avg = average_by_predictor(&obs());
        assert_eq!(
            avg,
            vec![(0.0, 1.0 / 3.0), (1.0, 0.5), (2.0, 2.0 / 3.0), (3.0, 1.0)]
        );
    }

    #[test]
    fn curve_spans_zero_to_max_inclusive() {
        let data = obs();
        let model = fit(Family::Logit, &data, &SolverSettings::default()).unwrap();
        let curve = model_curve(&model, 3.0);
        assert_eq!(curve.iter().map(|p| p.0).collect::<Vec<_>>(), vec![0.0, 1.0, 2.0, 3.0]);
        assert!(curve.windows(2).all(|w| w[1].1 >= w[0].1));

        let chart = ChartData::build(&data, &model);
        assert_eq!(chart.predicted.len(), 4);
        assert_eq!(chart.observed.len(), 4);
    }

    #[test]
    fn curve_on_a_huge_range_is_capped() {
        let data = obs();
        let model = fit(Family::Logit, &data, &SolverSettings::default()).unwrap();
        let curve = model_curve(&model, 1e12);
        assert_eq!(curve.len(), MAX_CURVE_POINTS);
        assert_eq!(curve[0].0, 0.0);
        assert!((curve[MAX_CURVE_POINTS - 1].0 - 1e12).abs() < 1.0);
        assert_eq!(model_curve(&model, f64::NAN).len(), 1);
    }

    #[test]
    fn typo_in_predictor_keeps_chart_small() {
        let model = fit(Family::Logit, &obs(), &SolverSettings::default()).unwrap();
        let mut data = obs();
        data.predictor.push(1e12);
        data.outcome.push(1.0);
        let chart = ChartData::build(&data, &model);
        assert!(chart.predicted.len() <= MAX_CURVE_POINTS);
        assert_eq!(chart.title, "Wahrscheinlichkeit Verkauf ~ Anzahl Photos");
    }

    #[test]
    fn report_lists_every_coefficient() {
        let data = obs();
        let model = fit(Family::Logit, &data, &SolverSettings::default()).unwrap();
        let text = FitReport(&model).to_string();
        assert!(text.contains("Logit Regression Results"));
        assert!(text.contains("const"));
        assert!(text.contains("Anzahl Photos"));
        assert!(text.contains("P>|z|"));
    }
}
