//! Input data of the reactor model: binning, reactor spectrum, backgrounds and the
//! observed spectra, read from or written to any [`Format`].
//!
//! Array names in a data file:
//! - `energy.edges`: prompt-energy bin edges, MeV
//! - `reactor.spectrum`: unoscillated prompt spectrum at bin centers, sums to 1
//! - `background.<AD>`: background counts per bin
//! - `observed.<AD>`: observed counts per bin (optional)

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dyb_core::{Array, Error, PathKey, Result};
use dyb_io::Format;
use tracing::{debug, info, warn};

use crate::detector::{DETECTORS, prompt_edges};

/// Base name of the data file (or directory for `tsv`) under `path_data`.
pub const DATA_STEM: &str = "dayabay_data";

/// Data file (or directory) of `format` under `path_data`.
pub fn data_location(path_data: &Path, format: Format) -> PathBuf {
    match format.extension() {
        Some(ext) => path_data.join(format!("{DATA_STEM}.{ext}")),
        None => path_data.join(format!("{DATA_STEM}.{}", format.name())),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactorInputs {
    pub edges: Vec<f64>,
    pub spectrum: Vec<f64>,
    /// Per detector, in [`DETECTORS`] order
    pub backgrounds: Vec<Vec<f64>>,
    /// Per detector; sampled from the model when absent
    pub observed: Option<Vec<Vec<f64>>>,
}

impl ReactorInputs {
    /// Deterministic synthetic inputs without observed data.
    pub fn synthetic() -> Self {
        let edges = prompt_edges();
        let centers = bin_centers(&edges);

        // E² e^{−E/1.7}: peaks near 3.4 MeV
        let spectrum = normalized(centers.iter().map(|e| e * e * (-e / 1.7).exp()).collect());
        let falling = normalized(centers.iter().map(|e| (-e / 1.5).exp() + 0.02).collect());
        let backgrounds = DETECTORS
            .iter()
            .map(|d| falling.iter().map(|f| f * d.background).collect())
            .collect();

        Self { edges, spectrum, backgrounds, observed: None }
    }

    pub fn n_bins(&self) -> usize {
        self.spectrum.len()
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.n_bins();
        if n == 0 {
            return Err(Error::Validation("reactor spectrum is empty".to_string()));
        }
        if self.edges.len() != n + 1 {
            return Err(Error::Validation(format!(
                "{} energy edges for {n} spectrum bins",
                self.edges.len()
            )));
        }
        let increasing = self.edges.windows(2).all(|w| w[1].partial_cmp(&w[0]) == Some(Ordering::Greater));
        if !increasing || self.edges[0] <= 0.0 {
            return Err(Error::Validation("energy edges must be positive and increasing".to_string()));
        }
        let per_detector = |what: &str, arrays: &[Vec<f64>]| -> Result<()> {
            if arrays.len() != DETECTORS.len() {
                return Err(Error::Validation(format!(
                    "{} {what} spectra for {} detectors",
                    arrays.len(),
                    DETECTORS.len()
                )));
            }
            for (d, a) in DETECTORS.iter().zip(arrays) {
                if a.len() != n {
                    return Err(Error::Validation(format!(
                        "{what}.{}: {} bins, expected {n}",
                        d.name,
                        a.len()
                    )));
                }
            }
            Ok(())
        };
        per_detector("background", &self.backgrounds)?;
        if let Some(observed) = &self.observed {
            per_detector("observed", observed)?;
        }
        Ok(())
    }

    /// Named arrays, as written by [`ReactorInputs::save`].
    pub fn to_arrays(&self) -> Result<Vec<(PathKey, Array)>> {
        let mut out = vec![
            (PathKey::parse("energy.edges")?, Array::vector(self.edges.clone())),
            (PathKey::parse("reactor.spectrum")?, Array::vector(self.spectrum.clone())),
        ];
        for (d, b) in DETECTORS.iter().zip(&self.backgrounds) {
            out.push((PathKey::from_segments(["background", d.name])?, Array::vector(b.clone())));
        }
        if let Some(observed) = &self.observed {
            for (d, o) in DETECTORS.iter().zip(observed) {
                out.push((PathKey::from_segments(["observed", d.name])?, Array::vector(o.clone())));
            }
        }
        Ok(out)
    }

    pub fn from_arrays(arrays: Vec<(PathKey, Array)>, origin: &Path) -> Result<Self> {
        let mut by_name: BTreeMap<String, Array> =
            arrays.into_iter().map(|(k, v)| (k.to_dotted(), v)).collect();
        let mut take = |name: &str| -> Option<Vec<f64>> { by_name.remove(name).map(Array::into_data) };
        let missing = |name: &str| {
            Error::Validation(format!("'{}' has no array '{name}'", origin.display()))
        };

        let edges = take("energy.edges").ok_or_else(|| missing("energy.edges"))?;
        let spectrum = take("reactor.spectrum").ok_or_else(|| missing("reactor.spectrum"))?;
        let mut backgrounds = Vec::with_capacity(DETECTORS.len());
        for d in &DETECTORS {
            let name = format!("background.{}", d.name);
            backgrounds.push(take(&name).ok_or_else(|| missing(&name))?);
        }
        let observed: Option<Vec<Vec<f64>>> =
            DETECTORS.iter().map(|d| take(&format!("observed.{}", d.name))).collect();
        if observed.is_none() {
            warn!(origin = %origin.display(), "no complete observed dataset, it will be sampled");
        }
        for extra in by_name.keys() {
            debug!(name = %extra, "ignoring unused input array");
        }

        let inputs = Self { edges, spectrum, backgrounds, observed };
        inputs.validate()?;
        Ok(inputs)
    }

    /// Read the data file of `format` under `path_data`.
    pub fn load(path_data: &Path, format: Format) -> Result<Self> {
        let source = data_location(path_data, format);
        let arrays = dyb_io::load(format, &source)?;
        info!(source = %source.display(), %format, arrays = arrays.len(), "inputs loaded");
        Self::from_arrays(arrays, &source)
    }

    /// Write the data file of `format` under `path_data`. Returns the files written.
    pub fn save(&self, path_data: &Path, format: Format) -> Result<Vec<PathBuf>> {
        self.validate()?;
        let target = data_location(path_data, format);
        Ok(dyb_io::save(format, &target, &self.to_arrays()?)?)
    }
}

pub fn bin_centers(edges: &[f64]) -> Vec<f64> {
    edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
}

fn normalized(values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    values.into_iter().map(|v| v / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn synthetic_inputs_are_consistent() {
        let inputs = ReactorInputs::synthetic();
        inputs.validate().unwrap();
        assert_relative_eq!(inputs.spectrum.iter().sum::<f64>(), 1.0, max_relative = 1e-12);
        let total: f64 = inputs.backgrounds[3].iter().sum();
        assert_relative_eq!(total, DETECTORS[3].background, max_relative = 1e-12);
    }

    #[test]
    fn arrays_round_trip() {
        let mut inputs = ReactorInputs::synthetic();
        inputs.observed = Some(vec![vec![1.0; inputs.n_bins()]; DETECTORS.len()]);
        let back = ReactorInputs::from_arrays(inputs.to_arrays().unwrap(), Path::new("mem")).unwrap();
        assert_eq!(back, inputs);
    }

    #[test]
    fn partial_observed_data_is_dropped() {
        let inputs = ReactorInputs::synthetic();
        let mut arrays = inputs.to_arrays().unwrap();
        arrays.push((PathKey::parse("observed.AD11").unwrap(), Array::vector(vec![0.0; 28])));
        let back = ReactorInputs::from_arrays(arrays, Path::new("mem")).unwrap();
        assert!(back.observed.is_none());
    }

    #[test]
    fn missing_array_is_named() {
        let arrays = ReactorInputs::synthetic()
            .to_arrays()
            .unwrap()
            .into_iter()
            .filter(|(k, _)| k.to_dotted() != "background.AD21")
            .collect();
        let err = ReactorInputs::from_arrays(arrays, Path::new("mem")).unwrap_err();
        assert!(err.to_string().contains("background.AD21"));
    }

    #[test]
    fn locations() {
        let root = Path::new("data");
        assert_eq!(data_location(root, Format::Json), root.join("dayabay_data.json"));
        assert_eq!(
            data_location(root, Format::Tsv { compressed: true }),
            root.join("dayabay_data.tsv.gz")
        );
    }
}
