use std::fmt::Write as _;
use std::io::Read;
use std::path::{Path, PathBuf};

use rstest::rstest;

use listing_stats::config::{AnalysisSpec, OutcomeKind, RunPlan, ZoomChart};
use listing_stats::data::clean::OutcomeMapping;
use listing_stats::data::loader::load_file;
use listing_stats::export::SummaryValue;
use listing_stats::glm::SolverSettings;
use listing_stats::pipeline::{run_analysis, run_plan, write_artifacts};

/// 120 listings; row 17 has an `n/a` photo count.
fn write_listings(dir: &Path) -> PathBuf {
    let mut text = String::from("Anzahl Photos,Verkauf,Anzahl Gebote\n");
    let spread = [0.2, 0.7, 1.0, 1.5, 2.6];
    for i in 0..120usize {
        let photos = (i * 7) % 25;
        let sold = if (i * 13 + photos * 5) % 40 < 8 + photos { "ja" } else { "nein" };
        let bids = ((0.5 + 0.06 * photos as f64).exp() * spread[i % 5]).round() as i64;
        let photo_cell = if i == 17 { "n/a".to_string() } else { photos.to_string() };
        writeln!(text, "{photo_cell},{sold},{bids}").unwrap();
    }
    let path = dir.join("listings.csv");
    std::fs::write(&path, text).unwrap();
    path
}

fn spec(kind: OutcomeKind) -> AnalysisSpec {
    let (name, outcome, mapping) = match kind {
        OutcomeKind::Binary => ("sale", "Verkauf", Some(OutcomeMapping::ja_nein())),
        OutcomeKind::Count => ("bids", "Anzahl Gebote", None),
    };
    AnalysisSpec {
        name: name.to_string(),
        input: PathBuf::from("listings.csv"),
        predictor: "Anzahl Photos".to_string(),
        outcome: outcome.to_string(),
        kind,
        outcome_mapping: mapping,
        chart: format!("{name}.png"),
        zoom: Some(ZoomChart {
            file: format!("{name}_zoom.png"),
            x_max: 10.0,
        }),
        mean_label: None,
        effect_unit: "Foto".to_string(),
    }
}

fn sheet_xml(path: &Path) -> String {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut xml = String::new();
    archive
        .by_name("xl/worksheets/sheet1.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

#[rstest]
#[case::binary(OutcomeKind::Binary)]
#[case::count(OutcomeKind::Count)]
fn analysis_drops_only_the_unparseable_row(#[case] kind: OutcomeKind) {
    let dir = tempfile::tempdir().unwrap();
    let table = load_file(&write_listings(dir.path())).unwrap();

    let out = run_analysis(&spec(kind), &table, &SolverSettings::default(), 0.001).unwrap();

    assert_eq!(out.cleaning.rows_read, 120);
    assert_eq!(out.cleaning.rows_kept, 119);
    assert_eq!(out.cleaning.dropped_predictor, 1);
    assert!(out.observations.outcome.iter().all(|y| y.is_finite()));
    assert_eq!(out.dispersion.is_some(), kind == OutcomeKind::Count);

    let fitted = out.model.predict_all(&out.observations.predictor);
    match kind {
        OutcomeKind::Binary => {
            assert!(out.observations.outcome.iter().all(|&y| y == 0.0 || y == 1.0));
            assert!(fitted.iter().all(|p| (0.0..=1.0).contains(p)));
        }
        OutcomeKind::Count => assert!(fitted.iter().all(|&mu| mu > 0.0)),
    }
}

#[test]
fn artifacts_are_written_and_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let table = load_file(&write_listings(dir.path())).unwrap();
    let out_dir = dir.path().join("out");
    let spec = spec(OutcomeKind::Binary);

    let first = run_analysis(&spec, &table, &SolverSettings::default(), 0.001).unwrap();
    let written = write_artifacts(&first, &spec, &out_dir).unwrap();
    let names: Vec<_> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["sale.png", "sale_zoom.png", "Regressionsergebnisse_sale.xlsx"]);
    assert!(written.iter().all(|p| p.exists()));

    let summary_path = &written[2];
    let before = std::fs::read(summary_path).unwrap();
    let second = run_analysis(&spec, &table, &SolverSettings::default(), 0.001).unwrap();
    assert_eq!(first.summary.rows(), second.summary.rows());
    write_artifacts(&second, &spec, &out_dir).unwrap();
    assert_eq!(before, std::fs::read(summary_path).unwrap());

    let xml = sheet_xml(summary_path);
    assert!(xml.contains("Kennzahl"));
    assert!(xml.contains("Odds-Ratio pro Foto"));
    let rows = first.summary.rows();
    match rows[2].1 {
        SummaryValue::Number(or) => assert!((or - first.model.slope().exp()).abs() < 5e-4),
        ref other => panic!("odds ratio should be numeric, got {other:?}"),
    }
}

#[test]
fn plan_runs_each_analysis_into_its_own_workbook() {
    let dir = tempfile::tempdir().unwrap();
    write_listings(dir.path());
    let plan = RunPlan {
        output_dir: dir.path().join("results"),
        significance_level: 0.001,
        solver: SolverSettings::default(),
        analyses: vec![spec(OutcomeKind::Binary), spec(OutcomeKind::Count)],
    };
    plan.validate().unwrap();

    let written = run_plan(&plan, dir.path()).unwrap();

    assert_eq!(written.len(), 6);
    for name in ["Regressionsergebnisse_sale.xlsx", "Regressionsergebnisse_bids.xlsx"] {
        assert!(plan.output_dir.join(name).exists(), "{name} missing");
    }
    let bids = sheet_xml(&plan.output_dir.join("Regressionsergebnisse_bids.xlsx"));
    assert!(bids.contains("Prozentuale Steigerung pro Foto"));
    assert!(bids.contains("Erklärte Varianz (Pseudo R²)"));
}

#[test]
fn missing_input_aborts_the_plan() {
    let dir = tempfile::tempdir().unwrap();
    let plan = RunPlan {
        output_dir: dir.path().join("results"),
        significance_level: 0.001,
        solver: SolverSettings::default(),
        analyses: vec![spec(OutcomeKind::Count)],
    };
    let err = run_plan(&plan, dir.path()).unwrap_err();
    assert!(format!("{err:#}").contains("listings.csv"));
}

/// Bid counts that vary less than their mean.
fn write_equidispersed_listings(dir: &Path) -> PathBuf {
    let mut text = String::from("Anzahl Photos,Verkauf,Anzahl Gebote\n");
    let offsets = [-1, 0, 0, 1];
    for i in 0..150usize {
        let photos = i % 25;
        let mean = (0.8 + 0.05 * photos as f64).exp().round() as i64;
        let bids = (mean + offsets[i % offsets.len()]).max(0);
        let sold = if i % 3 == 0 { "ja" } else { "nein" };
        writeln!(text, "{photos},{sold},{bids}").unwrap();
    }
    let path = dir.join("listings.csv");
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn count_analysis_without_overdispersion_writes_charts() {
    let dir = tempfile::tempdir().unwrap();
    let table = load_file(&write_equidispersed_listings(dir.path())).unwrap();
    let spec = spec(OutcomeKind::Count);

    let out = run_analysis(&spec, &table, &SolverSettings::default(), 0.001).unwrap();
    assert!(!out.dispersion.as_ref().unwrap().is_overdispersed());
    assert!(out.model.slope() > 0.0);
    assert!(out.model.alpha.as_ref().unwrap().estimate < 0.1);

    let written = write_artifacts(&out, &spec, &dir.path().join("out")).unwrap();
    assert_eq!(written.len(), 3);
    for png in &written[..2] {
        let bytes = std::fs::read(png).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n", "{} is not a PNG", png.display());
    }
}
