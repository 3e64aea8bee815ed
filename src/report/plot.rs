//! PNG rendering of observed averages against the model curve.
//!
//! Charts use the [`plotters`] bitmap backend; captions and labels use the
//! system `sans-serif` font.

use std::path::Path;

use plotters::prelude::*;
use thiserror::Error;

use super::ChartData;
use crate::color::SeriesColors;

/// Errors that can occur during plot generation
#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Failed to create drawing area: {0}")]
    DrawingArea(String),

    #[error("Failed to configure chart: {0}")]
    ChartConfig(String),

    #[error("Failed to draw chart elements: {0}")]
    Drawing(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

type Result<T> = core::result::Result<T, PlotError>;

/// Output size of every chart in pixels.
const CHART_SIZE: (u32, u32) = (1000, 600);

/// Horizontal extent of a chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XRange {
    /// From 0 to the largest value present in the data.
    Full,
    /// From 0 to the given value (zoomed view).
    UpTo(f64),
}

/// Axis bounds `(x0, x1, y0, y1)` for the points that fall inside `range`.
fn bounds(chart: &ChartData, range: XRange) -> Option<(f64, f64, f64, f64)> {
    let data_max = chart
        .observed
        .iter()
        .chain(&chart.predicted)
        .map(|p| p.0)
        .reduce(f64::max)?;
    let x1 = match range {
        XRange::Full => data_max,
        XRange::UpTo(limit) => limit,
    };
    let x0 = 0.0_f64.min(x1);
    let x1 = if x1 > x0 { x1 } else { x0 + 1.0 };

    let ys: Vec<f64> = chart
        .observed
        .iter()
        .chain(&chart.predicted)
        .filter(|p| p.0 >= x0 && p.0 <= x1)
        .map(|p| p.1)
        .collect();
    let y_max = ys.iter().copied().reduce(f64::max)?;
    let y0 = ys.iter().copied().fold(0.0, f64::min);
    let y1 = if y_max > y0 { y_max * 1.05 } else { y0 + 1.0 };
    Some((x0, x1, y0, y1))
}

/// Render one chart as a PNG: observed averages as points, model as a line.
pub fn render_chart(
    chart: &ChartData,
    output_path: &Path,
    range: XRange,
    colors: SeriesColors,
) -> Result<()> {
    let (x0, x1, y0, y1) = bounds(chart, range)
        .ok_or_else(|| PlotError::InvalidData("no points inside the chart range".to_string()))?;
    let inside = |p: &&(f64, f64)| p.0 >= x0 && p.0 <= x1;

    let root = BitMapBackend::new(output_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| PlotError::DrawingArea(e.to_string()))?;

    let title = match range {
        XRange::Full => chart.title.clone(),
        XRange::UpTo(limit) => format!("Zoom: {} (0–{limit})", chart.title),
    };

    let mut ctx = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

    ctx.configure_mesh()
        .x_desc(chart.x_label.as_str())
        .y_desc(chart.y_label.as_str())
        .draw()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    let observed = colors.observed;
    ctx.draw_series(
        chart
            .observed
            .iter()
            .filter(inside)
            .map(|&(x, y)| Circle::new((x, y), 4, observed.filled())),
    )
    .map_err(|e| PlotError::Drawing(e.to_string()))?
    .label(chart.observed_label.as_str())
    .legend(move |(x, y)| Circle::new((x, y), 4, observed.filled()));

    let model = colors.model;
    ctx.draw_series(LineSeries::new(
        chart.predicted.iter().filter(inside).copied(),
        model.stroke_width(2),
    ))
    .map_err(|e| PlotError::Drawing(e.to_string()))?
    .label(chart.model_label.as_str())
    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], model.stroke_width(2)));

    ctx.configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    root.present()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    log::info!("Chart saved: {}", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart() -> ChartData {
        ChartData {
            title: "t".into(),
            x_label: "x".into(),
            y_label: "y".into(),
            observed: vec![(0.0, 2.0), (50.0, 8.0), (300.0, 40.0)],
            predicted: vec![(0.0, 1.0), (150.0, 10.0), (300.0, 30.0)],
            observed_label: "o".into(),
            model_label: "m".into(),
        }
    }

    #[test]
    fn full_range_covers_all_points() {
        let (x0, x1, y0, y1) = bounds(&chart(), XRange::Full).unwrap();
        assert_eq!((x0, x1, y0), (0.0, 300.0, 0.0));
        assert!((y1 - 42.0).abs() < 1e-9);
    }

    #[test]
    fn zoom_limits_y_to_visible_points() {
        let (_, x1, _, y1) = bounds(&chart(), XRange::UpTo(100.0)).unwrap();
        assert_eq!(x1, 100.0);
        assert!((y1 - 8.0 * 1.05).abs() < 1e-9);
    }

    #[test]
    fn renders_labeled_png_for_full_and_zoomed_range() {
        let dir = tempfile::tempdir().unwrap();
        let full = dir.path().join("NB_Besuche_vs_Photos.png");
        let zoom = dir.path().join("NB_Besuche_vs_Photos_zoom.png");

        render_chart(&chart(), &full, XRange::Full, SeriesColors::default()).unwrap();
        render_chart(&chart(), &zoom, XRange::UpTo(100.0), SeriesColors::default()).unwrap();

        for path in [full, zoom] {
            let bytes = std::fs::read(&path).unwrap();
            assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        }
    }

    #[test]
    fn empty_chart_has_no_bounds() {
        let mut c = chart();
        c.observed.clear();
        c.predicted.clear();
        assert!(bounds(&c, XRange::Full).is_none());
    }
}
