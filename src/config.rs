//! Run plan: which analyses to run, on which files, with which settings.
//!
//! A plan is a JSON document; every field except `analyses` has a default.
//! [`builtin_plan`] holds the eight listing analyses.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::clean::OutcomeMapping;
use crate::glm::{Family, SolverSettings};

/// Outcome type of an analysis; decides the model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Binary,
    Count,
}

impl OutcomeKind {
    pub fn family(self) -> Family {
        match self {
            OutcomeKind::Binary => Family::Logit,
            OutcomeKind::Count => Family::NegativeBinomial,
        }
    }
}

/// Second chart limited to `0..=x_max` on the predictor axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomChart {
    pub file: String,
    pub x_max: f64,
}

/// One predictor/outcome regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSpec {
    /// Unique name; also names the summary workbook.
    pub name: String,
    /// Input table, relative to the data directory.
    pub input: PathBuf,
    pub predictor: String,
    pub outcome: String,
    pub kind: OutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_mapping: Option<OutcomeMapping>,
    /// PNG file of the full-range chart.
    pub chart: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<ZoomChart>,
    /// Label of the first summary row; defaults to `Mittelwert <outcome>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_label: Option<String>,
    /// Predictor unit used in the effect-size label, e.g. `Foto`.
    pub effect_unit: String,
}

impl AnalysisSpec {
    pub fn summary_file(&self) -> String {
        format!("Regressionsergebnisse_{}.xlsx", self.name)
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_significance_level() -> f64 {
    0.001
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Slope p-values below this count as significant (default: 0.001).
    #[serde(default = "default_significance_level")]
    pub significance_level: f64,
    #[serde(default)]
    pub solver: SolverSettings,
    pub analyses: Vec<AnalysisSpec>,
}

impl RunPlan {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan {}", path.display()))?;
        let plan: RunPlan = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse plan {}", path.display()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Reject plans whose analyses would overwrite each other's files.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.significance_level > 0.0 && self.significance_level < 1.0,
            "significance_level must lie in (0, 1), got {}",
            self.significance_level
        );
        let mut outputs = std::collections::BTreeSet::new();
        for spec in &self.analyses {
            let files = [
                Some(spec.chart.clone()),
                spec.zoom.as_ref().map(|z| z.file.clone()),
                Some(spec.summary_file()),
            ];
            for file in files.into_iter().flatten() {
                anyhow::ensure!(
                    outputs.insert(file.clone()),
                    "output file '{file}' is produced by more than one analysis (last: '{}')",
                    spec.name
                );
            }
        }
        Ok(())
    }

    /// Keep only the analyses named in `names`; an empty list keeps all.
    pub fn select(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        for name in names {
            anyhow::ensure!(
                self.analyses.iter().any(|a| &a.name == name),
                "unknown analysis '{name}'"
            );
        }
        self.analyses.retain(|a| names.contains(&a.name));
        Ok(())
    }
}

const PHOTOS_INPUT: &str = "anzahl_photos.csv";
const FIELDS_INPUT: &str = "anzahl_felder.csv";
const PHOTOS: &str = "Anzahl Photos";
const FIELDS: &str = "Anzahl befüllter Felder";

#[allow(clippy::too_many_arguments)]
fn count_analysis(
    name: &str,
    input: &str,
    predictor: &str,
    outcome: &str,
    chart: &str,
    zoom: Option<&str>,
    mean_label: &str,
    unit: &str,
) -> AnalysisSpec {
    AnalysisSpec {
        name: name.to_string(),
        input: PathBuf::from(input),
        predictor: predictor.to_string(),
        outcome: outcome.to_string(),
        kind: OutcomeKind::Count,
        outcome_mapping: None,
        chart: chart.to_string(),
        zoom: zoom.map(|file| ZoomChart {
            file: file.to_string(),
            x_max: 100.0,
        }),
        mean_label: Some(mean_label.to_string()),
        effect_unit: unit.to_string(),
    }
}

fn sale_analysis(name: &str, input: &str, predictor: &str, chart: &str, unit: &str) -> AnalysisSpec {
    AnalysisSpec {
        name: name.to_string(),
        input: PathBuf::from(input),
        predictor: predictor.to_string(),
        outcome: "Verkauf".to_string(),
        kind: OutcomeKind::Binary,
        outcome_mapping: Some(OutcomeMapping::ja_nein()),
        chart: chart.to_string(),
        zoom: None,
        mean_label: Some("Durchschnittliche Verkaufsrate".to_string()),
        effect_unit: unit.to_string(),
    }
}

/// The listing analyses: sale, visits, bidders and bids against photo count
/// and against filled fields.
pub fn builtin_plan() -> RunPlan {
    RunPlan {
        output_dir: default_output_dir(),
        significance_level: default_significance_level(),
        solver: SolverSettings::default(),
        analyses: vec![
            sale_analysis("verkauf_photos", PHOTOS_INPUT, PHOTOS, "Logit_Verkauf_vs_Photos_avg.png", "Foto"),
            sale_analysis(
                "verkauf_felder",
                FIELDS_INPUT,
                FIELDS,
                "Logit_Verkauf_vs_Anzahl_befüllter_Felder_avg.png",
                "Feld",
            ),
            count_analysis(
                "besuche_photos",
                PHOTOS_INPUT,
                PHOTOS,
                "Besuche",
                "NB_Besuche_vs_Photos.png",
                Some("NB_Besuche_vs_Photos_zoom.png"),
                "Durchschnittliche Anzahl Besuche",
                "Foto",
            ),
            count_analysis(
                "besucher_felder",
                FIELDS_INPUT,
                FIELDS,
                "Besucher",
                "NB_Anzahl_befüllter_Felder_vs_Besucher.png",
                None,
                "Durchschnittliche Anzahl Besucher",
                "Feld",
            ),
            count_analysis(
                "bidder_photos",
                PHOTOS_INPUT,
                PHOTOS,
                "Anzahl Bidder",
                "NB_Bidder_vs_Photos.png",
                Some("NB_Bidder_vs_Photos_zoom.png"),
                "Durchschnittliche Anzahl Bidder",
                "Foto",
            ),
            count_analysis(
                "bidder_felder",
                FIELDS_INPUT,
                FIELDS,
                "Anzahl Bidder",
                "NB_Bidder_vs_Anzahl_befüllter_Felder.png",
                None,
                "Durchschnittliche Anzahl Bidder",
                "Feld",
            ),
            count_analysis(
                "gebote_photos",
                PHOTOS_INPUT,
                PHOTOS,
                "Anzahl Gebote",
                "NB_Gebote_vs_Photos.png",
                Some("NB_Gebote_vs_Photos_zoom.png"),
                "Durchschnittliche Anzahl Gebote",
                "Foto",
            ),
            count_analysis(
                "gebote_felder",
                FIELDS_INPUT,
                FIELDS,
                "Anzahl Gebote",
                "NB_Gebote_vs_Anzahl_befüllter_Felder.png",
                None,
                "Durchschnittliche Anzahl Gebote",
                "Feld",
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_plan_has_unique_outputs() {
        let plan = builtin_plan();
        assert_eq!(plan.analyses.len(), 8);
        plan.validate().unwrap();
        assert_eq!(
            plan.analyses[0].summary_file(),
            "Regressionsergebnisse_verkauf_photos.xlsx"
        );
    }

    #[test]
    fn plan_round_trips_through_json_with_defaults() {
        let json = r#"{
            "analyses": [{
                "name": "sale",
                "input": "listings.csv",
                "predictor": "Anzahl Photos",
                "outcome": "Verkauf",
                "kind": "binary",
                "outcome_mapping": {"yes": 1, "no": 0},
                "chart": "sale.png",
                "effect_unit": "Foto"
            }]
        }"#;
        let plan: RunPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.significance_level, 0.001);
        assert_eq!(plan.solver, SolverSettings::default());
        assert_eq!(plan.analyses[0].kind.family(), Family::Logit);
        assert_eq!(plan.analyses[0].outcome_mapping, Some(OutcomeMapping::yes_no()));
        assert!(plan.analyses[0].zoom.is_none());
    }

    #[test]
    fn duplicate_chart_names_are_rejected() {
        let mut plan = builtin_plan();
        let mut twin = plan.analyses[0].clone();
        twin.name = "other".into();
        plan.analyses.push(twin);
        let err = plan.validate().unwrap_err().to_string();
        assert!(err.contains("Logit_Verkauf_vs_Photos_avg.png"));
    }

    #[test]
    fn select_filters_and_rejects_unknown_names() {
        let mut plan = builtin_plan();
        plan.select(&["gebote_felder".to_string()]).unwrap();
        assert_eq!(plan.analyses.len(), 1);
        assert!(builtin_plan().select(&["nope".to_string()]).is_err());
    }
}
