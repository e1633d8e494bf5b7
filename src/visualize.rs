use std::error::Error;
use std::fmt::Write;
use std::path::Path;

use plotters::prelude::*;

use crate::env::Keyboard;
use crate::logger::ProgressTable;

const SHADES: &[u8] = b" .:-=+*#%@";

/// Customize tactile rendering for CLI visualization.
#[derive(Clone, Copy, Debug)]
pub struct VisualOptions {
    /// Maximum number of characters per row; the image is downsampled to fit.
    pub max_columns: usize,
    pub show_border: bool,
}

impl Default for VisualOptions {
    fn default() -> Self {
        Self {
            max_columns: 50,
            show_border: true,
        }
    }
}

pub fn render_tactile(image: &[f32], dims: [usize; 2]) -> String {
    render_tactile_with_options(image, dims, VisualOptions::default())
}

/// ASCII shading of a row-major tactile image with values in [0, 1].
pub fn render_tactile_with_options(
    image: &[f32],
    dims: [usize; 2],
    options: VisualOptions,
) -> String {
    let [height, width] = dims;
    let mut out = String::new();
    if height == 0 || width == 0 || image.len() < height * width {
        return out;
    }
    let step = width.div_ceil(options.max_columns.max(1)).max(1);
    // Terminal cells are about twice as tall as wide.
    let row_step = step * 2;
    let columns = width.div_ceil(step);
    if options.show_border {
        let _ = writeln!(out, "+{}+", "-".repeat(columns));
    }
    for row in (0..height).step_by(row_step) {
        if options.show_border {
            out.push('|');
        }
        for col in (0..width).step_by(step) {
            let mut sum = 0.0;
            let mut count = 0usize;
            for r in row..(row + row_step).min(height) {
                for c in col..(col + step).min(width) {
                    sum += image[r * width + c];
                    count += 1;
                }
            }
            let value = (sum / count.max(1) as f32).clamp(0.0, 1.0);
            let index = (value * (SHADES.len() - 1) as f32).round() as usize;
            out.push(SHADES[index] as char);
        }
        if options.show_border {
            out.push('|');
        }
        out.push('\n');
    }
    if options.show_border {
        let _ = writeln!(out, "+{}+", "-".repeat(columns));
    }
    out
}

/// One line per key: label, braille dots and markers for the goal and the
/// key under the sensor.
pub fn render_keyboard(keyboard: &Keyboard, position: [f32; 2], goal: usize) -> String {
    let mut out = String::new();
    let under = keyboard.key_at(position);
    let _ = writeln!(
        out,
        "Layout: {}  sensor at ({:.2}, {:.2})",
        keyboard.layout().name(),
        position[0],
        position[1]
    );
    for (index, key) in keyboard.keys().iter().enumerate() {
        let dots = key
            .dots
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("");
        let goal_tag = if index == goal { " <- goal" } else { "" };
        let sensor_tag = if under == Some(index) { " [sensor]" } else { "" };
        let _ = writeln!(out, "  {:<6} dots {:<6}{goal_tag}{sensor_tag}", key.label, dots);
    }
    out
}

/// Finite `(x, y)` pairs of two progress columns.
pub fn curve_points(table: &ProgressTable, x_key: &str, y_key: &str) -> Vec<(f64, f64)> {
    let (Some(xs), Some(ys)) = (table.column(x_key), table.column(y_key)) else {
        return Vec::new();
    };
    xs.into_iter()
        .zip(ys)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect()
}

/// Draws one line per labelled progress table.
pub fn plot_learning_curves(
    out: &Path,
    runs: &[(String, ProgressTable)],
    x_key: &str,
    y_key: &str,
) -> Result<(), Box<dyn Error>> {
    let series: Vec<(String, Vec<(f64, f64)>)> = runs
        .iter()
        .map(|(label, table)| (label.clone(), curve_points(table, x_key, y_key)))
        .filter(|(_, points)| !points.is_empty())
        .collect();
    if series.is_empty() {
        return Err(format!("no finite `{y_key}` values against `{x_key}`").into());
    }
    let all = series.iter().flat_map(|(_, points)| points.iter());
    let (mut x_min, mut x_max, mut y_min, mut y_max) =
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in all {
        x_min = x_min.min(*x);
        x_max = x_max.max(*x);
        y_min = y_min.min(*y);
        y_max = y_max.max(*y);
    }
    if x_max <= x_min {
        x_max = x_min + 1.0;
    }
    let pad = ((y_max - y_min) * 0.05).max(1e-3);

    let root = BitMapBackend::new(out, (1000, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| format!("{e}"))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{y_key} vs {x_key}"), ("sans-serif", 28).into_font())
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, (y_min - pad)..(y_max + pad))
        .map_err(|e| format!("{e}"))?;

    chart
        .configure_mesh()
        .x_desc(x_key)
        .y_desc(y_key)
        .draw()
        .map_err(|e| format!("{e}"))?;

    for (index, (label, points)) in series.into_iter().enumerate() {
        let color = Palette99::pick(index).to_rgba();
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))
            .map_err(|e| format!("{e}"))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| format!("{e}"))?;

    root.present().map_err(|e| format!("{e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::KeyboardLayout;

    #[test]
    fn tactile_render_shades_values() {
        let image = vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0];
        let options = VisualOptions {
            max_columns: 4,
            show_border: false,
        };
        let text = render_tactile_with_options(&image, [2, 4], options);
        assert_eq!(text, "  @@\n");
    }

    #[test]
    fn tactile_render_downsamples_wide_images() {
        let image = vec![0.5; 10 * 100];
        let text = render_tactile(&image, [10, 100]);
        let first = text.lines().next().unwrap();
        assert_eq!(first.len(), 52);
    }

    #[test]
    fn keyboard_render_marks_goal_and_sensor() {
        let keyboard = Keyboard::new(KeyboardLayout::Arrows);
        let position = keyboard.keys()[0].center;
        let text = render_keyboard(&keyboard, position, 1);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), keyboard.len() + 1);
        assert!(lines[1].contains("[sensor]"));
        assert!(lines[2].contains("<- goal"));
    }

    #[test]
    fn curve_points_skip_missing_values() {
        let table = ProgressTable {
            headers: vec!["Epoch".into(), "AverageTestEpRet".into()],
            rows: vec![vec![1.0, f64::NAN], vec![2.0, 0.5]],
        };
        assert_eq!(
            curve_points(&table, "Epoch", "AverageTestEpRet"),
            vec![(2.0, 0.5)]
        );
        assert!(curve_points(&table, "Epoch", "Missing").is_empty());
    }
}
