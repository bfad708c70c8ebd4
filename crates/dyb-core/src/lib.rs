//! # dyb-core
//!
//! Core types for the dyb analysis graph.
//!
//! This crate carries what every other dyb crate shares:
//! - [`Error`] / [`Result`]
//! - [`PathKey`] and the [`IntoPathKey`] conversions used at every lookup boundary
//! - [`Array`], the row-major `f64` buffer flowing through the graph
//! - [`ParameterKind`] / [`ParameterRecord`] parameter snapshots

#![warn(clippy::all)]

pub mod error;
pub mod path;
pub mod types;

pub use error::{Error, Result};
pub use path::{IntoPathKey, PathKey, SEPARATOR};
pub use types::{Array, ParameterKind, ParameterRecord};

/// Version of dyb-core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
