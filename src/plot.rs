use anyhow::Result;
use base64::Engine;
use plotters::prelude::*;

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

const TRUE_COLOR: RGBColor = RGBColor(31, 119, 180);
const PRED_COLOR: RGBColor = RGBColor(255, 127, 14);
const GRID_COLOR: RGBColor = RGBColor(225, 225, 225);

/// Renders true (blue) against predicted (orange) prices over the window
/// index and returns the PNG as a `data:image/png;base64,...` URI.
pub fn render_comparison_png(y_true: &[f64], y_pred: &[f64], width: u32, height: u32) -> Result<String> {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        anyhow::bail!(
            "cannot plot series of lengths {} and {}",
            y_true.len(),
            y_pred.len()
        );
    }

    let (lo, hi) = value_bounds(y_true.iter().chain(y_pred.iter()).copied());
    let x_max = (y_true.len() - 1).max(1) as f64;

    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| anyhow::anyhow!("plot fill failed: {}", e))?;

        let mut chart = ChartBuilder::on(&root)
            .margin(30)
            .build_cartesian_2d(0f64..x_max, lo..hi)
            .map_err(|e| anyhow::anyhow!("plot layout failed: {}", e))?;

        for step in 1..5 {
            let level = lo + (hi - lo) * step as f64 / 5.0;
            chart
                .draw_series(LineSeries::new(vec![(0.0, level), (x_max, level)], GRID_COLOR.stroke_width(1)))
                .map_err(|e| anyhow::anyhow!("plot grid failed: {}", e))?;
        }

        let as_points = |values: &[f64]| -> Vec<(f64, f64)> {
            values.iter().enumerate().map(|(i, &v)| (i as f64, v)).collect()
        };
        chart
            .draw_series(LineSeries::new(as_points(y_true), TRUE_COLOR.stroke_width(3)))
            .map_err(|e| anyhow::anyhow!("plot true series failed: {}", e))?;
        chart
            .draw_series(LineSeries::new(as_points(y_pred), PRED_COLOR.stroke_width(3)))
            .map_err(|e| anyhow::anyhow!("plot predicted series failed: {}", e))?;

        root.present().map_err(|e| anyhow::anyhow!("plot render failed: {}", e))?;
    }

    let image = image::RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| anyhow::anyhow!("plot buffer does not match {}x{}", width, height))?;
    let mut png = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;

    Ok(format!(
        "{}{}",
        PNG_DATA_URI_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(&png)
    ))
}

/// Min/max with 5% headroom; a flat series gets a unit band around its value.
fn value_bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo <= f64::EPSILON {
        return (lo - 0.5, hi + 0.5);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}
