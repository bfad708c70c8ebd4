use crate::canvas::Canvas;
use crate::config::RenderConfig;
use crate::layout::axes::Axis;
use crate::layout::margins::PlotArea;
use crate::plots::axes_draw::{draw_axes, draw_title};
use crate::primitives::*;

/// Histogram-style step plot of `values`, bin `i` spanning `[i, i+1)`. Non-finite
/// values leave a gap.
pub fn render(title: &str, values: &[f64], config: &RenderConfig) -> crate::Result<String> {
    if values.is_empty() {
        return Err(crate::RenderError::Layout(format!("'{title}' has no values")));
    }

    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let (lo, hi) = if lo > hi { (0.0, 1.0) } else { (lo.min(0.0), hi.max(0.0)) };

    let mut canvas = Canvas::new(config.figure.width, config.figure.height);
    let x_axis = Axis::bins(values.len(), config.axes.ticks).with_label("bin");
    let y_axis = Axis::auto_linear(lo, hi, config.axes.ticks).with_label("value");
    let area = PlotArea::auto(&canvas, &y_axis, &x_axis, 0.0, config);

    draw_title(&mut canvas, &area, title, config);
    draw_axes(&mut canvas, &area, &x_axis, &y_axis, config);

    let px = |x: f64| x_axis.data_to_pixel(x, area.left, area.right());
    let py = |y: f64| y_axis.data_to_pixel(y, area.bottom(), area.top);
    let base = py(0.0_f64.clamp(y_axis.min, y_axis.max));

    canvas.push_clip(area.left, area.top, area.width, area.height);
    let fill = Style::filled(config.colors.fill.with_alpha(config.colors.fill_alpha));
    let line = LineStyle::solid(config.colors.line, 1.2);

    let mut run: Vec<(f64, f64)> = Vec::new();
    let flush = |run: &mut Vec<(f64, f64)>, canvas: &mut Canvas| {
        if run.len() >= 2 {
            let mut outline = run.clone();
            if let (Some(first), Some(last)) = (run.first(), run.last()) {
                outline.push((last.0, base));
                outline.insert(0, (first.0, base));
            }
            canvas.polygon(&outline, &fill);
            canvas.polyline(run, &line);
        }
        run.clear();
    };
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            flush(&mut run, &mut canvas);
            continue;
        }
        let y = py(v);
        run.push((px(i as f64), y));
        run.push((px(i as f64 + 1.0), y));
    }
    flush(&mut run, &mut canvas);
    canvas.pop_clip();

    Ok(canvas.finish_svg())
}
