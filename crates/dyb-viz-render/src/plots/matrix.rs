use crate::canvas::Canvas;
use crate::color::{self, Color};
use crate::config::RenderConfig;
use crate::layout::axes::Axis;
use crate::layout::margins::PlotArea;
use crate::plots::axes_draw::{draw_axes, draw_title};
use crate::primitives::*;

const COLORBAR_W: f64 = 14.0;
const COLORBAR_GAP: f64 = 10.0;
const COLORBAR_STEPS: usize = 50;

/// Color scale of a matrix: diverging around zero when any value is negative,
/// sequential over `[min, max]` otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    Diverging { limit: f64 },
    Sequential { min: f64, max: f64 },
}

impl Scale {
    pub fn for_values(values: &[f64]) -> Self {
        let (lo, hi) = values
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if lo > hi {
            return Scale::Sequential { min: 0.0, max: 1.0 };
        }
        if lo < 0.0 {
            let limit = lo.abs().max(hi.abs());
            Scale::Diverging { limit }
        } else if hi > lo {
            Scale::Sequential { min: lo, max: hi }
        } else {
            Scale::Sequential { min: lo, max: lo + 1.0 }
        }
    }

    pub fn color(&self, v: f64) -> Color {
        if !v.is_finite() {
            return Color::rgb(200, 200, 200);
        }
        match *self {
            Scale::Diverging { limit } => color::rdbu_r(v / limit),
            Scale::Sequential { min, max } => color::viridis((v - min) / (max - min)),
        }
    }

    fn range(&self) -> (f64, f64) {
        match *self {
            Scale::Diverging { limit } => (-limit, limit),
            Scale::Sequential { min, max } => (min, max),
        }
    }
}

/// Heatmap of a row-major `rows × cols` matrix; row 0 at the bottom.
pub fn render(
    title: &str,
    rows: usize,
    cols: usize,
    values: &[f64],
    config: &RenderConfig,
) -> crate::Result<String> {
    if rows == 0 || cols == 0 || values.len() != rows * cols {
        return Err(crate::RenderError::Layout(format!(
            "'{title}': {} values do not form a {rows}×{cols} matrix",
            values.len()
        )));
    }

    let scale = Scale::for_values(values);
    let mut canvas = Canvas::new(config.figure.width, config.figure.height);
    let x_axis = Axis::bins(cols, config.axes.ticks).with_label("column");
    let y_axis = Axis::bins(rows, config.axes.ticks).with_label("row");

    let cb_labels = {
        let (lo, hi) = scale.range();
        [format_value(hi), format_value(lo)]
    };
    let tick_style = TextStyle {
        size: config.font.tick_size,
        baseline: TextBaseline::Central,
        ..Default::default()
    };
    let cb_label_w = cb_labels
        .iter()
        .map(|l| canvas.measure_text(l, &tick_style).width)
        .fold(0.0_f64, f64::max);
    let area = PlotArea::auto(
        &canvas,
        &y_axis,
        &x_axis,
        COLORBAR_GAP + COLORBAR_W + 4.0 + cb_label_w,
        config,
    );

    draw_title(&mut canvas, &area, title, config);

    let cell_w = area.width / cols as f64;
    let cell_h = area.height / rows as f64;
    for r in 0..rows {
        for c in 0..cols {
            let x = area.left + c as f64 * cell_w;
            let y = area.bottom() - (r + 1) as f64 * cell_h;
            // slight overlap hides hairline seams between cells
            canvas.rect(x, y, cell_w + 0.3, cell_h + 0.3, &Style::filled(scale.color(values[r * cols + c])));
        }
    }

    let mut axes_config = config.clone();
    axes_config.grid.show = false;
    draw_axes(&mut canvas, &area, &x_axis, &y_axis, &axes_config);

    let cb_x = area.right() + COLORBAR_GAP;
    let step_h = area.height / COLORBAR_STEPS as f64;
    let (lo, hi) = scale.range();
    for i in 0..COLORBAR_STEPS {
        let t = 1.0 - (i as f64 + 0.5) / COLORBAR_STEPS as f64;
        let c = scale.color(lo + t * (hi - lo));
        canvas.rect(cb_x, area.top + i as f64 * step_h, COLORBAR_W, step_h + 0.3, &Style::filled(c));
    }
    canvas.rect(cb_x, area.top, COLORBAR_W, area.height, &Style::stroked(Color::BLACK, 0.5));
    canvas.text(cb_x + COLORBAR_W + 4.0, area.top, &cb_labels[0], &tick_style);
    canvas.text(cb_x + COLORBAR_W + 4.0, area.bottom(), &cb_labels[1], &tick_style);

    Ok(canvas.finish_svg())
}

fn format_value(v: f64) -> String {
    if v == 0.0 {
        "0".into()
    } else if v.abs() >= 1e4 || v.abs() < 1e-2 {
        format!("{v:.2e}")
    } else {
        format!("{v:.3}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_choice() {
        assert_eq!(Scale::for_values(&[0.0, 2.0]), Scale::Sequential { min: 0.0, max: 2.0 });
        assert_eq!(Scale::for_values(&[-3.0, 1.0]), Scale::Diverging { limit: 3.0 });
        assert_eq!(Scale::for_values(&[4.0, 4.0]), Scale::Sequential { min: 4.0, max: 5.0 });
        assert_eq!(Scale::for_values(&[f64::NAN]), Scale::Sequential { min: 0.0, max: 1.0 });
    }

    #[test]
    fn one_cell_per_element() {
        let svg = render("cov", 2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &RenderConfig::default())
            .unwrap();
        // cells + colorbar steps + colorbar frame + background
        assert_eq!(svg.matches("<rect").count(), 6 + COLORBAR_STEPS + 1 + 1);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        assert!(render("bad", 2, 2, &[1.0], &RenderConfig::default()).is_err());
    }
}
