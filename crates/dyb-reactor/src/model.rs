//! Assembly of the reactor model graph.
//!
//! ```text
//! inputs.energy.edges ─► outputs.energy.prompt ─► true_prompt ─► neutrino
//!                                                     │              │
//! inputs.reactor.spectrum ───────────► outputs.reactor.spectrum   survival_probability.<AD>
//!                                                     └──────┬───────┘
//! inputs.background.<AD> ─► eventscount.background.<AD>   eventscount.ibd.<AD>
//!                                       └──► eventscount.final.detector.<AD> ◄──┘
//!                                                      │
//!                              eventscount.final.concatenated ─► data.asimov (frozen)
//!                                                      │      data.real ─┐  │
//!                                                      │          data.proxy (switch)
//!                                                      └──► statistic.* ◄──┘
//! ```

use dyb_core::{Array, Error, Result};
use dyb_graph::{Inputs, Model, ModelBuilder, NodeSpec, PARAMETERS_ROOT, ParameterSpec};
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};
use tracing::{debug, info};

use crate::detector::{DETECTORS, PROMPT_TO_NEUTRINO_OFFSET};
use crate::inputs::{ReactorInputs, bin_centers};
use crate::options::ModelOptions;
use crate::oscillation::Oscillation;
use crate::statistic;

/// Well-known node and parameter paths.
pub mod paths {
    pub const DATA_ASIMOV: &str = "data.asimov";
    pub const DATA_REAL: &str = "data.real";
    /// Designated data switch: `asimov` (0) or `real` (1)
    pub const DATA_SWITCH: &str = "data.proxy";
    pub const DETECTOR_EVENTS: &str = "outputs.eventscount.final.detector";
    pub const EXPECTED: &str = "outputs.eventscount.final.concatenated";
    pub const COVARIANCE: &str = "outputs.covariance.syst";
    pub const CHI2_STAT_P: &str = "outputs.statistic.stat.chi2p";
    pub const CHI2_STAT_CNP: &str = "outputs.statistic.stat.chi2cnp";
    pub const PULL: &str = "outputs.statistic.nuisance.all";
    pub const CHI2_FULL_P: &str = "outputs.statistic.full.pull.chi2p";
    pub const CHI2_FULL_CNP: &str = "outputs.statistic.full.pull.chi2cnp";
    pub const CHI2_COVMAT_CNP: &str = "outputs.statistic.full.covmat.chi2cnp";
    pub const THETA13: &str = "parameters.all.survival_probability.SinSq2Theta13";
}

/// Names of the data switch inputs, in index order.
pub const DATA_SOURCES: [&str; 2] = ["asimov", "real"];

fn all(rel: &str) -> String {
    format!("{PARAMETERS_ROOT}.all.{rel}")
}

fn detector_parameter(group: &str, ad: &str) -> String {
    format!("detector.{group}.{ad}")
}

/// Build the reactor model and apply `options`.
///
/// Without `path_data` the inputs are synthetic and the observed dataset is sampled
/// from the central expectation with `seed`. The same sampling is used when the data
/// file holds no observed spectra. Parameter overrides are applied afterwards, then the
/// Asimov dataset is frozen and the systematic covariance matrix is computed.
pub fn build_model(options: &ModelOptions) -> Result<Model> {
    let inputs = match &options.path_data {
        Some(path) => ReactorInputs::load(path, options.source_type)?,
        None => generate_inputs(options.seed)?,
    };
    let mut model = assemble(&inputs)?;
    let observed = match &inputs.observed {
        Some(observed) => observed.concat(),
        None => sample_observed(&mut model, options.seed)?,
    };
    model.replace_input(paths::DATA_REAL, Array::vector(observed))?;

    for o in &options.parameter_values {
        model.set_from_config(&o.name, &o.value)?;
    }
    // freeze the Asimov dataset at the configured parameter values
    model.get_or_compute(paths::DATA_ASIMOV)?;
    model.update_covariance_matrix()?;
    info!(
        synthetic = options.path_data.is_none(),
        overrides = options.parameter_values.len(),
        "reactor model ready"
    );
    Ok(model)
}

/// Synthetic inputs with an observed dataset sampled at the central parameter values.
pub fn generate_inputs(seed: u64) -> Result<ReactorInputs> {
    let mut inputs = ReactorInputs::synthetic();
    let mut model = assemble(&inputs)?;
    let sampled = sample_observed(&mut model, seed)?;
    let n = inputs.n_bins();
    inputs.observed = Some(sampled.chunks(n).map(<[f64]>::to_vec).collect());
    Ok(inputs)
}

fn sample_observed(model: &mut Model, seed: u64) -> Result<Vec<f64>> {
    let expected = model.get_or_compute(paths::EXPECTED)?.data().to_vec();
    let sampled = poisson_sample(&expected, seed)?;
    debug!(seed, bins = sampled.len(), "observed dataset sampled");
    Ok(sampled)
}

/// One Poisson draw per expectation; non-positive or non-finite expectations give 0.
pub fn poisson_sample(expected: &[f64], seed: u64) -> Result<Vec<f64>> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    expected
        .iter()
        .map(|&lam| {
            if !lam.is_finite() || lam <= 0.0 {
                return Ok(0.0);
            }
            let pois = Poisson::new(lam)
                .map_err(|e| Error::Computation(format!("Poisson({lam}): {e}")))?;
            Ok(pois.sample(&mut rng))
        })
        .collect()
}

/// Linear interpolation of `(x, y)` at `at`, extrapolating the end segments and
/// clamping at zero. `x` is increasing with at least two points.
fn interpolate(x: &[f64], y: &[f64], at: f64) -> f64 {
    let i = x.partition_point(|&v| v < at).clamp(1, x.len() - 1);
    let t = (at - x[i - 1]) / (x[i] - x[i - 1]);
    (y[i - 1] + t * (y[i] - y[i - 1])).max(0.0)
}

const THETA12: &str = "survival_probability.SinSq2Theta12";
const DM21: &str = "survival_probability.DeltaMSq21";

/// Constrained parameter: registered with its central value and sigma, and
/// contributing to the pull term and the systematic covariance.
#[derive(Debug, Clone)]
struct Constrained {
    name: String,
    central: f64,
    sigma: f64,
    label: String,
}

fn constrained_parameters() -> Vec<Constrained> {
    let c = |name: String, central: f64, sigma: f64, label: String| Constrained { name, central, sigma, label };
    let mut out = vec![
        c(THETA12.into(), 0.851, 0.020, "sin²2θ₁₂".into()),
        c(DM21.into(), 7.53e-5, 0.18e-5, "Δm²₂₁, eV²".into()),
        c("reactor.flux_normalization".into(), 1.0, 0.008, "reactor ν̅ flux normalization".into()),
        c("detector.energy_scale".into(), 1.0, 0.005, "relative energy scale".into()),
    ];
    for d in &DETECTORS {
        out.push(c(
            detector_parameter("eff", d.name),
            1.0,
            d.efficiency_sigma,
            format!("{} detection efficiency", d.name),
        ));
        out.push(c(
            format!("background.norm.{}", d.name),
            1.0,
            0.05,
            format!("{} background normalization", d.name),
        ));
    }
    out
}

fn sum_scalars(i: &Inputs<'_>) -> Result<Array> {
    let mut total = 0.0;
    for k in 0..i.n_nodes() {
        let v = i.node(k)?;
        total += v.as_scalar().ok_or_else(|| {
            Error::Computation(format!("'{}': input #{k} is not a scalar", i.path()))
        })?;
    }
    Ok(Array::scalar(total))
}

/// Declare every input, parameter and node of the reactor model.
pub fn assemble(inputs: &ReactorInputs) -> Result<Model> {
    inputs.validate()?;
    if inputs.n_bins() < 2 {
        return Err(Error::Validation("at least two energy bins are required".to_string()));
    }
    let n_total = inputs.n_bins() * DETECTORS.len();
    let mut b = ModelBuilder::new();

    // Parameters
    let theta13 = "survival_probability.SinSq2Theta13";
    let dm32 = "survival_probability.DeltaMSq32";
    b.parameter(theta13, ParameterSpec::free(0.0853).label("sin²2θ₁₃"))?;
    b.parameter(dm32, ParameterSpec::free(2.454e-3).label("Δm²₃₂, eV²"))?;
    b.parameter(
        "detector.prompt_offset",
        ParameterSpec::constant(PROMPT_TO_NEUTRINO_OFFSET).label("Eν − Erec offset, MeV"),
    )?;
    for d in &DETECTORS {
        b.parameter(
            detector_parameter("baseline", d.name),
            ParameterSpec::constant(d.baseline).label(format!("{} baseline, m", d.name)),
        )?;
        b.parameter(
            detector_parameter("exposure", d.name),
            ParameterSpec::constant(d.exposure).label(format!("{} IBD exposure at 1 km", d.name)),
        )?;
    }
    let nuisance = constrained_parameters();
    for c in &nuisance {
        b.parameter(c.name.as_str(), ParameterSpec::constrained(c.central, c.sigma).label(c.label.clone()))?;
    }

    // Energy
    b.input("inputs.energy.edges", Array::vector(inputs.edges.clone()))?;
    b.input("inputs.reactor.spectrum", Array::vector(inputs.spectrum.clone()))?;
    b.node(
        "outputs.energy.prompt",
        NodeSpec::new(|i| Ok(Array::vector(bin_centers(i.node(0)?.data()))))
            .depends_on(["inputs.energy.edges"])
            .label("Erec bin centers, MeV"),
    )?;
    b.node(
        "outputs.energy.true_prompt",
        NodeSpec::new(|i| {
            let scale = i.scalar(0)?;
            Ok(i.node(0)?.map(|e| e / scale))
        })
        .depends_on(["outputs.energy.prompt"])
        .parameters([all("detector.energy_scale")]),
    )?;
    b.node(
        "outputs.energy.neutrino",
        NodeSpec::new(|i| {
            let offset = i.scalar(0)?;
            Ok(i.node(0)?.map(|e| e + offset))
        })
        .depends_on(["outputs.energy.true_prompt"])
        .parameters([all("detector.prompt_offset")])
        .label("Eν, MeV"),
    )?;
    b.node(
        "outputs.reactor.spectrum",
        NodeSpec::new(|i| {
            let (grid, shape, at) = (i.node(0)?.data(), i.node(1)?.data(), i.node(2)?.data());
            Ok(Array::vector(at.iter().map(|&e| interpolate(grid, shape, e)).collect()))
        })
        .depends_on(["outputs.energy.prompt", "inputs.reactor.spectrum", "outputs.energy.true_prompt"]),
    )?;

    // Per detector
    let oscillation = [theta13, dm32, THETA12, DM21].map(all);
    let mut detector_events = Vec::with_capacity(DETECTORS.len());
    for (d, background) in DETECTORS.iter().zip(&inputs.backgrounds) {
        let ad = d.name;
        let psurv = format!("outputs.survival_probability.{ad}");
        let ibd = format!("outputs.eventscount.ibd.{ad}");
        let bkg = format!("outputs.eventscount.background.{ad}");
        let total = format!("{}.{ad}", paths::DETECTOR_EVENTS);

        b.node(
            psurv.as_str(),
            NodeSpec::new(|i| {
                let osc = Oscillation {
                    sin_sq_2theta13: i.scalar(0)?,
                    delta_m_sq_32: i.scalar(1)?,
                    sin_sq_2theta12: i.scalar(2)?,
                    delta_m_sq_21: i.scalar(3)?,
                };
                osc.validate()?;
                let baseline = i.scalar(4)?;
                Ok(i.node(0)?.map(|e| osc.survival(baseline, e)))
            })
            .depends_on(["outputs.energy.neutrino"])
            .parameters(oscillation.iter().cloned().chain([all(&detector_parameter("baseline", ad))]))
            .label(format!("ν̅e survival probability at {ad}")),
        )?;
        b.node(
            ibd.as_str(),
            NodeSpec::new(|i| {
                let (exposure, eff, flux) = (i.scalar(0)?, i.scalar(1)?, i.scalar(2)?);
                let km = i.scalar(3)? / 1000.0;
                let norm = exposure * eff * flux / (km * km);
                let (spectrum, psurv) = (i.node(0)?.data(), i.node(1)?.data());
                Ok(Array::vector(spectrum.iter().zip(psurv).map(|(s, p)| norm * s * p).collect()))
            })
            .depends_on(["outputs.reactor.spectrum", psurv.as_str()])
            .parameters([
                all(&detector_parameter("exposure", ad)),
                all(&detector_parameter("eff", ad)),
                all("reactor.flux_normalization"),
                all(&detector_parameter("baseline", ad)),
            ])
            .label(format!("expected IBD events at {ad}")),
        )?;
        let background_input = format!("inputs.background.{ad}");
        b.input(background_input.as_str(), Array::vector(background.clone()))?;
        b.node(
            bkg.as_str(),
            NodeSpec::new(|i| {
                let norm = i.scalar(0)?;
                Ok(i.node(0)?.map(|v| norm * v))
            })
            .depends_on([background_input])
            .parameters([all(&format!("background.norm.{ad}"))]),
        )?;
        b.node(
            total.as_str(),
            NodeSpec::new(|i| {
                let (ibd, bkg) = (i.node(0)?.data(), i.node(1)?.data());
                Ok(Array::vector(ibd.iter().zip(bkg).map(|(a, b)| a + b).collect()))
            })
            .depends_on([ibd, bkg])
            .label(format!("expected events at {ad}")),
        )?;
        detector_events.push(total);
    }
    b.node(
        paths::EXPECTED,
        NodeSpec::new(|i| {
            let mut out = Vec::new();
            for k in 0..i.n_nodes() {
                out.extend_from_slice(i.node(k)?.data());
            }
            Ok(Array::vector(out))
        })
        .depends_on(detector_events)
        .label("expected events, all detectors"),
    )?;

    // Data
    b.node(
        paths::DATA_ASIMOV,
        NodeSpec::new(|i| Ok(i.node(0)?.clone()))
            .depends_on([paths::EXPECTED])
            .frozen(true)
            .label("Asimov dataset"),
    )?;
    b.input(paths::DATA_REAL, Array::zeros(vec![n_total]))?;
    b.switch(
        paths::DATA_SWITCH,
        [(DATA_SOURCES[0], paths::DATA_ASIMOV), (DATA_SOURCES[1], paths::DATA_REAL)],
    )?;
    b.data_switch(paths::DATA_SWITCH)?;

    // Statistics
    let versus_data = [paths::DATA_SWITCH, paths::EXPECTED];
    b.node(
        paths::CHI2_STAT_P,
        NodeSpec::new(|i| Ok(Array::scalar(statistic::chi2_pearson(i.node(0)?.data(), i.node(1)?.data())?)))
            .depends_on(versus_data)
            .label("Pearson's χ²"),
    )?;
    b.node(
        paths::CHI2_STAT_CNP,
        NodeSpec::new(|i| Ok(Array::scalar(statistic::chi2_cnp(i.node(0)?.data(), i.node(1)?.data())?)))
            .depends_on(versus_data)
            .label("combined Neyman–Pearson χ²"),
    )?;

    let constrained: Vec<String> = nuisance.iter().map(|c| all(&c.name)).collect();
    let centrals: Vec<Vec<f64>> = nuisance.iter().map(|c| vec![c.central]).collect();
    let sigmas: Vec<Vec<f64>> = nuisance.iter().map(|c| vec![c.sigma]).collect();
    b.node(
        paths::PULL,
        NodeSpec::new(move |i| {
            let values: Vec<&[f64]> =
                (0..i.n_parameters()).map(|k| i.parameter(k).map(Array::data)).collect::<Result<_>>()?;
            Ok(Array::scalar(statistic::pull(&values, &centrals, &sigmas)))
        })
        .parameters(constrained.iter())
        .label("nuisance pull terms"),
    )?;
    b.node(
        paths::CHI2_FULL_P,
        NodeSpec::new(sum_scalars).depends_on([paths::CHI2_STAT_P, paths::PULL]),
    )?;
    b.node(
        paths::CHI2_FULL_CNP,
        NodeSpec::new(sum_scalars).depends_on([paths::CHI2_STAT_CNP, paths::PULL]),
    )?;

    b.covariance(paths::COVARIANCE, paths::EXPECTED, constrained)?;
    b.node(
        paths::CHI2_COVMAT_CNP,
        NodeSpec::new(|i| {
            let v = statistic::chi2_covariance(i.node(0)?.data(), i.node(1)?.data(), i.node(2)?.data())?;
            Ok(Array::scalar(v))
        })
        .depends_on([paths::DATA_SWITCH, paths::EXPECTED, paths::COVARIANCE])
        .label("combined Neyman–Pearson χ² with systematic covariance"),
    )?;

    b.build()
}
