//! `access` and `switch-data` commands: staged parameter scans and data-source
//! switching on a loaded model.

use anyhow::{Context, Result};
use dyb_graph::Model;
use dyb_reactor::{DATA_SOURCES, paths};
use serde::Serialize;

/// Values at which the detector spectrum is reported.
const SPECTRUM_VALUES: [f64; 3] = [0.0, 0.08, 0.2];
const SPECTRUM_DETECTOR: &str = "AD11";

#[derive(Debug, Serialize)]
pub struct Spectrum {
    pub value: f64,
    pub events: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScanPoint {
    pub value: f64,
    pub statistic: f64,
}

#[derive(Debug, Serialize)]
pub struct AccessResult {
    pub parameter: String,
    pub initial: f64,
    pub restored: f64,
    /// Detector outputs available under the event-count prefix
    pub outputs: Vec<String>,
    pub detector: String,
    pub spectra: Vec<Spectrum>,
    pub statistic: String,
    pub scan: Vec<ScanPoint>,
    pub minimum: ScanPoint,
}

#[derive(Debug, Serialize)]
pub struct SourceValue {
    pub source: String,
    pub index: usize,
    pub value: f64,
}

#[derive(Debug, Serialize)]
pub struct SwitchResult {
    pub statistic: String,
    pub steps: Vec<SourceValue>,
    /// Returning to the first source gave a bit-identical value
    pub reproducible: bool,
}

fn scalar(model: &mut Model, path: &str) -> Result<f64> {
    model
        .get_or_compute(path)?
        .as_scalar()
        .with_context(|| format!("'{path}' is not a scalar"))
}

/// Stage the current value of `parameter`, scan it over `[start, stop]`, then restore it.
pub fn access(
    model: &mut Model,
    parameter: &str,
    statistic: &str,
    start: f64,
    stop: f64,
    points: usize,
) -> Result<AccessResult> {
    if points < 2 {
        anyhow::bail!("points must be >= 2");
    }
    let id = model.resolve_parameter(parameter)?;
    let path = model.parameter_by_id(id).path().clone();
    let initial = model
        .parameter_by_id(id)
        .value()
        .as_scalar()
        .with_context(|| format!("parameter '{path}' is not a scalar"))?;
    tracing::info!(parameter = %path, initial, "staging parameter");

    model.parameter(&path)?.push_current();
    let scanned = scan(model, &path.to_dotted(), statistic, start, stop, points);
    model.parameter(&path)?.pop()?;
    let (outputs, spectra, scan) = scanned?;

    let restored = model.parameter(&path)?.value().as_scalar().unwrap_or(f64::NAN);
    let minimum = scan
        .iter()
        .copied()
        .min_by(|a, b| a.statistic.total_cmp(&b.statistic))
        .with_context(|| "empty scan")?;
    Ok(AccessResult {
        parameter: path.to_dotted(),
        initial,
        restored,
        outputs,
        detector: SPECTRUM_DETECTOR.to_string(),
        spectra,
        statistic: statistic.to_string(),
        scan,
        minimum,
    })
}

type Scanned = (Vec<String>, Vec<Spectrum>, Vec<ScanPoint>);

fn scan(
    model: &mut Model,
    parameter: &str,
    statistic: &str,
    start: f64,
    stop: f64,
    points: usize,
) -> Result<Scanned> {
    model.update_covariance_matrix()?;
    model.update_frozen_nodes()?;

    let outputs: Vec<String> = model
        .view(paths::DETECTOR_EVENTS)?
        .child_names()
        .map(str::to_string)
        .collect();

    let events = format!("{}.{SPECTRUM_DETECTOR}", paths::DETECTOR_EVENTS);
    let mut spectra = Vec::with_capacity(SPECTRUM_VALUES.len());
    for value in SPECTRUM_VALUES {
        model.parameter(parameter)?.set_value(value)?;
        let events = model.get_or_compute(events.as_str())?.data().to_vec();
        spectra.push(Spectrum { value, events });
    }

    let step = (stop - start) / (points as f64 - 1.0);
    let mut scan = Vec::with_capacity(points);
    for i in 0..points {
        let value = start + step * i as f64;
        model.parameter(parameter)?.set_value(value)?;
        scan.push(ScanPoint { value, statistic: scalar(model, statistic)? });
    }
    Ok((outputs, spectra, scan))
}

/// Evaluate `statistic` on asimov, real and asimov data again.
pub fn switch_data(model: &mut Model, statistic: &str, by_index: bool) -> Result<SwitchResult> {
    let mut steps = Vec::with_capacity(3);
    for index in [0, 1, 0] {
        let source = DATA_SOURCES[index];
        if by_index {
            model.switch(paths::DATA_SWITCH)?.switch_input(index as i64)?;
        } else {
            model.switch_data(source)?;
        }
        let value = scalar(model, statistic)?;
        tracing::info!(source, value, "statistic");
        steps.push(SourceValue { source: source.to_string(), index, value });
    }
    let reproducible = steps[0].value.to_bits() == steps[2].value.to_bits();
    Ok(SwitchResult { statistic: statistic.to_string(), steps, reproducible })
}
