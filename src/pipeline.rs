//! One analysis end to end: clean → diagnose → fit → summarize, then write
//! charts and the summary workbook.
//!
//! [`run_analysis`] is pure computation plus console output. Every file is
//! written by [`write_artifacts`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::color::SeriesColors;
use crate::config::{AnalysisSpec, OutcomeKind, RunPlan};
use crate::data::clean::{CleaningReport, clean};
use crate::data::loader::load_file;
use crate::data::model::{ListingTable, Observations};
use crate::export::{SummaryRecord, write_summary_xlsx};
use crate::glm::{DispersionCheck, FittedModel, SolverSettings, fit};
use crate::report::plot::{XRange, render_chart};
use crate::report::{ChartData, FitReport};

/// Everything computed for one analysis, before any file is written.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub observations: Observations,
    pub cleaning: CleaningReport,
    /// Only for count outcomes.
    pub dispersion: Option<DispersionCheck>,
    pub model: FittedModel,
    pub summary: SummaryRecord,
    pub chart: ChartData,
}

pub fn run_analysis(
    spec: &AnalysisSpec,
    table: &ListingTable,
    solver: &SolverSettings,
    significance_level: f64,
) -> Result<AnalysisOutcome> {
    log::info!("[{}] {} ~ {}", spec.name, spec.outcome, spec.predictor);

    let (observations, cleaning) = clean(
        table,
        &spec.predictor,
        &spec.outcome,
        spec.outcome_mapping.as_ref(),
    )
    .with_context(|| format!("cleaning data for '{}'", spec.name))?;
    log::info!(
        "[{}] kept {} of {} rows ({} dropped)",
        spec.name,
        cleaning.rows_kept,
        cleaning.rows_read,
        cleaning.rows_dropped()
    );

    let dispersion = match spec.kind {
        OutcomeKind::Count => {
            let check = DispersionCheck::of(&observations);
            println!("{check}");
            if !check.is_overdispersed() {
                log::warn!(
                    "[{}] variance/mean = {:.3}; no overdispersion, a Poisson model may fit as well",
                    spec.name,
                    check.ratio
                );
            }
            Some(check)
        }
        OutcomeKind::Binary => None,
    };

    let model = fit(spec.kind.family(), &observations, solver)
        .with_context(|| format!("fitting {} model for '{}'", spec.kind.family().name(), spec.name))?;
    println!("{}", FitReport(&model));

    let mut summary = SummaryRecord::from_model(&observations, &model, significance_level)
        .with_effect_unit(spec.effect_unit.as_str());
    if let Some(label) = &spec.mean_label {
        summary = summary.with_mean_label(label.as_str());
    }
    let chart = ChartData::build(&observations, &model);

    Ok(AnalysisOutcome {
        observations,
        cleaning,
        dispersion,
        model,
        summary,
        chart,
    })
}

/// Render the chart(s) and write the summary workbook into `out_dir`.
/// Returns the written paths in creation order.
pub fn write_artifacts(
    outcome: &AnalysisOutcome,
    spec: &AnalysisSpec,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let colors = SeriesColors::default();
    let mut written = Vec::new();

    let chart_path = out_dir.join(&spec.chart);
    render_chart(&outcome.chart, &chart_path, XRange::Full, colors)
        .with_context(|| format!("rendering {}", chart_path.display()))?;
    written.push(chart_path);

    if let Some(zoom) = &spec.zoom {
        let zoom_path = out_dir.join(&zoom.file);
        render_chart(&outcome.chart, &zoom_path, XRange::UpTo(zoom.x_max), colors)
            .with_context(|| format!("rendering {}", zoom_path.display()))?;
        written.push(zoom_path);
    }

    let summary_path = out_dir.join(spec.summary_file());
    write_summary_xlsx(&summary_path, &outcome.summary)?;
    written.push(summary_path);

    Ok(written)
}

/// Run every analysis of the plan in order. Input files are resolved against
/// `data_dir` and loaded once even when several analyses share them.
/// The first failing analysis aborts the run.
pub fn run_plan(plan: &RunPlan, data_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut tables: BTreeMap<PathBuf, ListingTable> = BTreeMap::new();
    let mut written = Vec::new();

    for spec in &plan.analyses {
        let input = data_dir.join(&spec.input);
        if !tables.contains_key(&input) {
            let table = load_file(&input)?;
            tables.insert(input.clone(), table);
        }
        let table = &tables[&input];

        let outcome = run_analysis(spec, table, &plan.solver, plan.significance_level)
            .with_context(|| format!("analysis '{}' failed", spec.name))?;
        written.extend(write_artifacts(&outcome, spec, &plan.output_dir)?);
    }

    log::info!("{} analyses done, {} files written", plan.analyses.len(), written.len());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_plan;
    use crate::data::loader::read_csv;

    fn table() -> ListingTable {
        let mut text = String::from("Anzahl Photos,Verkauf,Anzahl Gebote\n");
        for i in 0..60 {
            let photos = i % 12;
            let sold = if (i * 7 + photos * 3) % 10 < 3 + photos / 3 { "ja" } else { "nein" };
            let bids = (photos * (i % 5)) / 3 + i % 3;
            text.push_str(&format!("{photos},{sold},{bids}\n"));
        }
        text.push_str("n/a,ja,4\n");
        read_csv(csv::Reader::from_reader(text.as_bytes())).unwrap()
    }

    #[test]
    fn binary_analysis_has_no_dispersion_check() {
        let plan = builtin_plan();
        let out = run_analysis(&plan.analyses[0], &table(), &SolverSettings::default(), 0.001).unwrap();
        assert!(out.dispersion.is_none());
        assert_eq!(out.cleaning.rows_read, 61);
        assert_eq!(out.cleaning.rows_kept, 60);
        assert_eq!(out.summary.mean_label, "Durchschnittliche Verkaufsrate");
    }

    #[test]
    fn count_analysis_reports_dispersion() {
        let plan = builtin_plan();
        let spec = plan
            .analyses
            .iter()
            .find(|a| a.name == "gebote_photos")
            .unwrap();
        let out = run_analysis(spec, &table(), &SolverSettings::default(), 0.001).unwrap();
        let check = out.dispersion.unwrap();
        assert!(check.mean > 0.0);
        assert!(out.model.alpha.is_some());
    }

    #[test]
    fn missing_column_is_reported_with_analysis_name() {
        let mut spec = builtin_plan().analyses[0].clone();
        spec.outcome = "Preis".into();
        let err = run_analysis(&spec, &table(), &SolverSettings::default(), 0.001).unwrap_err();
        assert!(format!("{err:#}").contains("verkauf_photos"));
    }
}
