//! # dyb-reactor
//!
//! Demonstration reactor-antineutrino model on top of [`dyb_graph`].
//!
//! Four antineutrino detectors at three baselines observe the prompt-energy spectrum
//! of inverse beta decay events. The expected spectrum depends on the oscillation
//! parameters and a set of constrained nuisance parameters; the observed spectrum is
//! either read from a data file or Poisson-sampled with a fixed seed.
//!
//! ```no_run
//! use dyb_reactor::{ModelOptions, build_model, paths};
//!
//! let mut model = build_model(&ModelOptions::default())?;
//! let asimov = model.get_or_compute(paths::CHI2_FULL_CNP)?.clone();
//! model.switch_data("real")?;
//! let real = model.get_or_compute(paths::CHI2_FULL_CNP)?.clone();
//! assert_ne!(asimov, real);
//! # Ok::<(), dyb_core::Error>(())
//! ```

#![warn(clippy::all)]

pub mod detector;
pub mod inputs;
pub mod model;
pub mod options;
pub mod oscillation;
pub mod statistic;

pub use detector::{DETECTORS, Detector};
pub use inputs::ReactorInputs;
pub use model::{DATA_SOURCES, assemble, build_model, generate_inputs, paths, poisson_sample};
pub use options::{ModelOptions, OverrideValue, ParameterOverride};
