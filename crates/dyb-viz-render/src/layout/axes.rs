/// Axis with tick generation and data-to-pixel mapping.
#[derive(Debug, Clone)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
    pub label: String,
    pub tick_positions: Vec<f64>,
    pub tick_labels: Vec<String>,
    pub minor_ticks: Vec<f64>,
}

impl Axis {
    /// Linear axis covering `[data_min, data_max]` with "nice number" ticks.
    pub fn auto_linear(data_min: f64, data_max: f64, target_ticks: usize) -> Self {
        let (nice_min, nice_max, step) = nice_range(data_min, data_max, target_ticks);
        let n_major = ((nice_max - nice_min) / step).round() as usize;

        let mut ticks = Vec::with_capacity(n_major + 1);
        let mut labels = Vec::with_capacity(n_major + 1);
        for i in 0..=n_major {
            let v = nice_min + i as f64 * step;
            ticks.push(v);
            labels.push(format_tick(v, step));
        }

        let minor_step = step / 5.0;
        let minor = (0..n_major * 5)
            .filter(|i| i % 5 != 0)
            .map(|i| nice_min + i as f64 * minor_step)
            .collect();

        Self {
            min: nice_min,
            max: nice_max,
            label: String::new(),
            tick_positions: ticks,
            tick_labels: labels,
            minor_ticks: minor,
        }
    }

    /// Axis over bin edges `0..n`, ticks at integers.
    pub fn bins(n: usize, target_ticks: usize) -> Self {
        let mut axis = Self::auto_linear(0.0, n.max(1) as f64, target_ticks);
        axis.min = 0.0;
        axis.max = n.max(1) as f64;
        let keep: Vec<(f64, String)> = axis
            .tick_positions
            .iter()
            .zip(&axis.tick_labels)
            .filter(|(t, _)| **t >= axis.min && **t <= axis.max && t.fract() == 0.0)
            .map(|(t, l)| (*t, l.clone()))
            .collect();
        (axis.tick_positions, axis.tick_labels) = keep.into_iter().unzip();
        axis.minor_ticks.retain(|t| *t >= axis.min && *t <= axis.max);
        axis
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn data_to_pixel(&self, value: f64, px_min: f64, px_max: f64) -> f64 {
        let frac = (value - self.min) / (self.max - self.min);
        px_min + frac * (px_max - px_min)
    }
}

fn nice_range(data_min: f64, data_max: f64, target_ticks: usize) -> (f64, f64, f64) {
    if !data_min.is_finite() || !data_max.is_finite() {
        return (0.0, 1.0, 0.2);
    }
    if (data_max - data_min).abs() < 1e-15 * data_max.abs().max(1.0) {
        let pad = if data_min == 0.0 { 1.0 } else { data_min.abs() * 0.1 };
        return nice_range(data_min - pad, data_max + pad, target_ticks);
    }
    let range = data_max - data_min;
    let rough_step = range / (target_ticks.max(2) - 1) as f64;
    let step = nice_step(rough_step);
    let nice_min = (data_min / step).floor() * step;
    let nice_max = (data_max / step).ceil() * step;
    (nice_min, nice_max, step)
}

fn nice_step(rough: f64) -> f64 {
    let exp = rough.abs().log10().floor();
    let frac = rough / 10.0_f64.powf(exp);
    let nice_frac = if frac <= 1.5 {
        1.0
    } else if frac <= 3.5 {
        2.0
    } else if frac <= 7.5 {
        5.0
    } else {
        10.0
    };
    nice_frac * 10.0_f64.powf(exp)
}

fn format_tick(value: f64, step: f64) -> String {
    let magnitude = value.abs().max(step);
    if magnitude >= 1e5 || step < 1e-4 {
        return format!("{value:.1e}");
    }
    let decimals = if step >= 1.0 { 0 } else { (-step.log10().floor()) as usize };
    // avoid "-0"
    let value = if value.abs() < step * 0.01 { 0.0 } else { value };
    format!("{value:.decimals$}")
}
