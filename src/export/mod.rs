//! Summary metrics of a fitted model and their spreadsheet export.

pub mod xlsx;

use std::fmt;
use std::path::Path;

use crate::data::model::Observations;
use crate::glm::{Family, FittedModel};

pub use xlsx::ExportError;

/// Header row of every summary sheet.
pub const SUMMARY_HEADER: (&str, &str) = ("Kennzahl", "Wert");

/// A cell in the `Wert` column.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for SummaryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryValue::Number(v) => write!(f, "{v}"),
            SummaryValue::Text(t) => f.write_str(t),
        }
    }
}

/// Effect of one predictor unit on the outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectSize {
    /// `exp(b1)` of a logit model.
    OddsRatio(f64),
    /// `(exp(b1) − 1) · 100` of a count model.
    PercentChange(f64),
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// The four headline numbers of one analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub mean_label: String,
    pub effect_unit: String,
    pub mean: f64,
    pub slope_p_value: f64,
    pub significance_level: f64,
    pub effect: EffectSize,
    pub pseudo_r2: f64,
}

impl SummaryRecord {
    /// Derive the summary from the cleaned data and the model fitted on it.
    pub fn from_model(obs: &Observations, model: &FittedModel, significance_level: f64) -> Self {
        let effect = match model.family {
            Family::Logit => EffectSize::OddsRatio(model.slope().exp()),
            Family::NegativeBinomial => EffectSize::PercentChange((model.slope().exp() - 1.0) * 100.0),
        };
        SummaryRecord {
            mean_label: format!("Mittelwert {}", obs.outcome_name),
            effect_unit: obs.predictor_name.clone(),
            mean: obs.outcome_mean(),
            slope_p_value: model.slope_p_value(),
            significance_level,
            effect,
            pseudo_r2: model.pseudo_r2(),
        }
    }

    pub fn with_mean_label(mut self, label: impl Into<String>) -> Self {
        self.mean_label = label.into();
        self
    }

    pub fn with_effect_unit(mut self, unit: impl Into<String>) -> Self {
        self.effect_unit = unit.into();
        self
    }

    pub fn is_significant(&self) -> bool {
        self.slope_p_value < self.significance_level
    }

    /// `"Ja (p < 0.001)"` or `"Nein"`.
    pub fn verdict(&self) -> String {
        if self.is_significant() {
            format!("Ja (p < {})", self.significance_level)
        } else {
            "Nein".to_string()
        }
    }

    /// Labeled rows in export order.
    pub fn rows(&self) -> Vec<(String, SummaryValue)> {
        let (mean, effect, fit) = match self.effect {
            EffectSize::OddsRatio(or) => (
                round_to(self.mean, 3),
                (
                    format!("Odds-Ratio pro {}", self.effect_unit),
                    SummaryValue::Number(round_to(or, 3)),
                ),
                (
                    "Pseudo R²".to_string(),
                    SummaryValue::Number(round_to(self.pseudo_r2, 4)),
                ),
            ),
            EffectSize::PercentChange(pct) => (
                round_to(self.mean, 2),
                (
                    format!("Prozentuale Steigerung pro {}", self.effect_unit),
                    SummaryValue::Text(format!("{pct:+.1} %")),
                ),
                (
                    "Erklärte Varianz (Pseudo R²)".to_string(),
                    SummaryValue::Text(format!("{:.2} %", self.pseudo_r2 * 100.0)),
                ),
            ),
        };
        vec![
            (self.mean_label.clone(), SummaryValue::Number(mean)),
            (
                "Signifikanter Zusammenhang".to_string(),
                SummaryValue::Text(self.verdict()),
            ),
            effect,
            fit,
        ]
    }
}

/// Write the summary as a `Kennzahl | Wert` sheet, replacing `path`.
pub fn write_summary_xlsx(path: &Path, summary: &SummaryRecord) -> Result<(), ExportError> {
    xlsx::write_table(path, SUMMARY_HEADER, &summary.rows())?;
    log::info!("Summary saved: {}", path.display());
    Ok(())
}
