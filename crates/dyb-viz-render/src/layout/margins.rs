use crate::canvas::Canvas;
use crate::config::RenderConfig;
use crate::layout::axes::Axis;
use crate::primitives::TextStyle;

/// Rectangular plot area within the canvas.
#[derive(Debug, Clone, Copy)]
pub struct PlotArea {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PlotArea {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Margins sized to tick labels, axis labels and the title line. `right_extra`
    /// reserves room for a colorbar.
    pub fn auto(
        canvas: &Canvas,
        y_axis: &Axis,
        x_axis: &Axis,
        right_extra: f64,
        config: &RenderConfig,
    ) -> Self {
        let tick_style = TextStyle { size: config.font.tick_size, ..Default::default() };

        let max_tick_w = y_axis
            .tick_labels
            .iter()
            .map(|l| canvas.measure_text(l, &tick_style).width)
            .fold(0.0_f64, f64::max);
        let mut left = 15.0 + max_tick_w + 8.0;
        if !y_axis.label.is_empty() {
            left += config.font.label_size + 6.0;
        }

        let mut bottom = 15.0 + config.font.tick_size + 6.0;
        if !x_axis.label.is_empty() {
            bottom += config.font.label_size + 6.0;
        }

        let top = config.font.title_size * 1.4 + 14.0;
        let right = 15.0 + right_extra;

        let width = canvas.width - left - right;
        let height = canvas.height - top - bottom;
        Self { left, top, width: width.max(50.0), height: height.max(50.0) }
    }
}
