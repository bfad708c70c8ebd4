//! Antineutrino detectors of the demonstration model.

/// One antineutrino detector and its nominal inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detector {
    /// `AD<hall><index>`, e.g. `AD21`
    pub name: &'static str,
    /// Flux-weighted reactor baseline, m
    pub baseline: f64,
    /// IBD events expected at 1 km without oscillation, before efficiency
    pub exposure: f64,
    /// Total background events over the prompt-energy range
    pub background: f64,
    pub efficiency_sigma: f64,
}

pub const DETECTORS: [Detector; 4] = [
    Detector { name: "AD11", baseline: 364.0, exposure: 3000.0, background: 420.0, efficiency_sigma: 0.002 },
    Detector { name: "AD12", baseline: 364.0, exposure: 3000.0, background: 410.0, efficiency_sigma: 0.002 },
    Detector { name: "AD21", baseline: 497.0, exposure: 3500.0, background: 300.0, efficiency_sigma: 0.002 },
    Detector { name: "AD31", baseline: 1580.0, exposure: 40000.0, background: 80.0, efficiency_sigma: 0.002 },
];

/// Detector by name.
pub fn detector(name: &str) -> Option<&'static Detector> {
    DETECTORS.iter().find(|d| d.name == name)
}

/// Prompt-energy binning: `[first, last]` MeV in steps of `width`.
pub const PROMPT_RANGE: (f64, f64) = (1.0, 8.0);
pub const PROMPT_BIN_WIDTH: f64 = 0.25;

/// Prompt (positron) energy to antineutrino energy, MeV.
pub const PROMPT_TO_NEUTRINO_OFFSET: f64 = 0.78;

/// Edges of the prompt-energy bins.
pub fn prompt_edges() -> Vec<f64> {
    let (lo, hi) = PROMPT_RANGE;
    let n = ((hi - lo) / PROMPT_BIN_WIDTH).round() as usize;
    (0..=n).map(|i| lo + i as f64 * PROMPT_BIN_WIDTH).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binning() {
        let edges = prompt_edges();
        assert_eq!(edges.len(), 29);
        assert_eq!(edges[0], 1.0);
        assert_eq!(edges[28], 8.0);
    }

    #[test]
    fn lookup() {
        assert_eq!(detector("AD31").map(|d| d.baseline), Some(1580.0));
        assert!(detector("AD41").is_none());
    }
}
