use palette::{Hsl, IntoColor, Srgb};
use plotters::style::RGBColor;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<RGBColor> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            RGBColor(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Chart colours
// ---------------------------------------------------------------------------

/// Colours for the two series of a model-fit chart.
#[derive(Debug, Clone, Copy)]
pub struct SeriesColors {
    /// Observed averages (scatter).
    pub observed: RGBColor,
    /// Model prediction (line).
    pub model: RGBColor,
}

impl Default for SeriesColors {
    /// Hue 180° (cyan) for observations, hue 0° (red) for the model.
    fn default() -> Self {
        let palette = generate_palette(2);
        SeriesColors {
            observed: palette[1],
            model: palette[0],
        }
    }
}
