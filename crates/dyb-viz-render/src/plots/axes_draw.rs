use crate::canvas::Canvas;
use crate::color::Color;
use crate::config::RenderConfig;
use crate::layout::axes::Axis;
use crate::layout::margins::PlotArea;
use crate::primitives::*;

/// Box frame with ticks, optional grid and axis labels.
pub fn draw_axes(
    canvas: &mut Canvas,
    area: &PlotArea,
    x_axis: &Axis,
    y_axis: &Axis,
    config: &RenderConfig,
) {
    let frame_style = LineStyle::solid(Color::BLACK, 0.8);
    let tick_line = LineStyle::solid(Color::BLACK, 0.6);
    let minor_line = LineStyle::solid(Color::BLACK, 0.4);
    let grid_line = LineStyle::dashed(config.grid.color.with_alpha(config.grid.alpha), 0.5);

    // ticks point into the frame for "in", away from it otherwise
    let dir = if config.axes.tick_direction == "in" { 1.0 } else { -1.0 };
    let tl = config.axes.tick_length * dir;
    let mtl = config.axes.minor_tick_length * dir;
    let outside = if dir < 0.0 { config.axes.tick_length } else { 0.0 };

    draw_frame(canvas, area, &frame_style);

    let x_label_style = TextStyle {
        size: config.font.tick_size,
        anchor: TextAnchor::Middle,
        baseline: TextBaseline::Hanging,
        ..Default::default()
    };
    for (i, &val) in x_axis.tick_positions.iter().enumerate() {
        let px = x_axis.data_to_pixel(val, area.left, area.right());
        if px < area.left - 0.5 || px > area.right() + 0.5 {
            continue;
        }
        if config.grid.show {
            canvas.line(px, area.top, px, area.bottom(), &grid_line);
        }
        canvas.line(px, area.bottom(), px, area.bottom() - tl, &tick_line);
        canvas.line(px, area.top, px, area.top + tl, &tick_line);
        if let Some(label) = x_axis.tick_labels.get(i) {
            canvas.text(px, area.bottom() + outside + 3.0, label, &x_label_style);
        }
    }
    for &val in &x_axis.minor_ticks {
        let px = x_axis.data_to_pixel(val, area.left, area.right());
        if px >= area.left && px <= area.right() {
            canvas.line(px, area.bottom(), px, area.bottom() - mtl, &minor_line);
        }
    }

    let y_label_style = TextStyle {
        size: config.font.tick_size,
        anchor: TextAnchor::End,
        baseline: TextBaseline::Central,
        ..Default::default()
    };
    let mut widest = 0.0_f64;
    for (i, &val) in y_axis.tick_positions.iter().enumerate() {
        let py = y_axis.data_to_pixel(val, area.bottom(), area.top);
        if py < area.top - 0.5 || py > area.bottom() + 0.5 {
            continue;
        }
        if config.grid.show {
            canvas.line(area.left, py, area.right(), py, &grid_line);
        }
        canvas.line(area.left, py, area.left + tl, py, &tick_line);
        canvas.line(area.right(), py, area.right() - tl, py, &tick_line);
        if let Some(label) = y_axis.tick_labels.get(i) {
            widest = widest.max(canvas.measure_text(label, &y_label_style).width);
            canvas.text(area.left - outside - 4.0, py, label, &y_label_style);
        }
    }
    for &val in &y_axis.minor_ticks {
        let py = y_axis.data_to_pixel(val, area.bottom(), area.top);
        if py >= area.top && py <= area.bottom() {
            canvas.line(area.left, py, area.left + mtl, py, &minor_line);
        }
    }

    let label_style = TextStyle {
        size: config.font.label_size,
        anchor: TextAnchor::Middle,
        ..Default::default()
    };
    if !x_axis.label.is_empty() {
        let y = area.bottom() + outside + config.font.tick_size + 16.0;
        canvas.text(area.left + area.width / 2.0, y, &x_axis.label, &label_style);
    }
    if !y_axis.label.is_empty() {
        let x = area.left - outside - widest - 12.0;
        canvas.text_rotated(x, area.top + area.height / 2.0, &y_axis.label, &label_style, -90.0);
    }
}

pub fn draw_frame(canvas: &mut Canvas, area: &PlotArea, style: &LineStyle) {
    canvas.line(area.left, area.top, area.right(), area.top, style);
    canvas.line(area.left, area.bottom(), area.right(), area.bottom(), style);
    canvas.line(area.left, area.top, area.left, area.bottom(), style);
    canvas.line(area.right(), area.top, area.right(), area.bottom(), style);
}

/// Header label and title above the plot area.
pub fn draw_title(canvas: &mut Canvas, area: &PlotArea, title: &str, config: &RenderConfig) {
    let y = area.top - 6.0;
    let mut x = area.left;
    if !config.header.is_empty() {
        let bold = TextStyle { size: config.font.title_size * 1.2, bold: true, ..Default::default() };
        canvas.text(x, y, &config.header, &bold);
        x += canvas.measure_text(&config.header, &bold).width + 8.0;
    }
    let style = TextStyle {
        size: config.font.title_size,
        color: Color::rgb(60, 60, 60),
        ..Default::default()
    };
    canvas.text(x, y, title, &style);
}
