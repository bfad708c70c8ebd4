//! # dyb-io
//!
//! Format adapters for named arrays, plus text reports.
//!
//! Every adapter serializes a list of `(PathKey, Array)` pairs and reads it back with
//! the same names:
//! - `tsv` / `tsv.gz`: directory tree, one tab-separated file per array
//! - `parquet`: one columnar file, rows `(name, shape, values)`
//! - `json`: nested `group` / `dataset` objects
//! - `keyed`: ROOT-style keyed container with zlib-compressed payloads
//!
//! Output is deterministic: saving the same arrays twice gives byte-identical files.

#![warn(clippy::all)]

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dyb_core::{Array, PathKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod columnar;
pub mod json;
pub mod keyed;
pub mod report;
pub mod sanitize;
pub mod tsv;

/// Error type for format adapters.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet read/write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("unknown format '{0}' (expected one of: tsv, tsv.gz, parquet, json, keyed)")]
    UnknownFormat(String),

    #[error("malformed {format} data in {path}: {message}")]
    Malformed { format: &'static str, path: String, message: String },

    #[error("bad name: {0}")]
    Name(String),

    #[error("'{0}' holds non-finite values, which JSON cannot represent")]
    NonFinite(String),

    #[error(transparent)]
    Core(#[from] dyb_core::Error),
}

impl From<FormatError> for dyb_core::Error {
    fn from(e: FormatError) -> Self {
        match e {
            FormatError::Core(inner) => inner,
            other => dyb_core::Error::Export(other.to_string()),
        }
    }
}

pub(crate) fn malformed(format: &'static str, path: &Path, message: impl Into<String>) -> FormatError {
    FormatError::Malformed { format, path: path.display().to_string(), message: message.into() }
}

/// Storage format of named arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Format {
    Tsv { compressed: bool },
    Parquet,
    Json,
    Keyed,
}

impl Format {
    /// Canonical names, as accepted by [`FromStr`].
    pub const NAMES: [&'static str; 5] = ["tsv", "tsv.gz", "parquet", "json", "keyed"];

    pub fn name(&self) -> &'static str {
        match self {
            Format::Tsv { compressed: false } => "tsv",
            Format::Tsv { compressed: true } => "tsv.gz",
            Format::Parquet => "parquet",
            Format::Json => "json",
            Format::Keyed => "keyed",
        }
    }

    /// Whether the target is a directory rather than a single file.
    pub fn is_directory(&self) -> bool {
        matches!(self, Format::Tsv { .. })
    }

    /// Conventional file extension of single-file formats.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Format::Tsv { .. } => None,
            Format::Parquet => Some("parquet"),
            Format::Json => Some("json"),
            Format::Keyed => Some("dybk"),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = FormatError;

    /// Also accepts the container names `hdf5` (as `json`), `root` (as `keyed`) and
    /// `npz` (as `parquet`).
    fn from_str(s: &str) -> Result<Self, FormatError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tsv" => Ok(Format::Tsv { compressed: false }),
            "tsv.gz" | "tsvgz" => Ok(Format::Tsv { compressed: true }),
            "parquet" | "npz" => Ok(Format::Parquet),
            "json" | "hdf5" => Ok(Format::Json),
            "keyed" | "root" => Ok(Format::Keyed),
            other => Err(FormatError::UnknownFormat(other.to_string())),
        }
    }
}

impl TryFrom<String> for Format {
    type Error = FormatError;

    fn try_from(s: String) -> Result<Self, FormatError> {
        s.parse()
    }
}

impl From<Format> for String {
    fn from(f: Format) -> Self {
        f.name().to_string()
    }
}

/// Write `arrays` to `target` (a directory for `tsv`, a file otherwise).
/// Returns the files written.
pub fn save(
    format: Format,
    target: &Path,
    arrays: &[(PathKey, Array)],
) -> Result<Vec<PathBuf>, FormatError> {
    check_names(arrays)?;
    if !format.is_directory()
        && let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let written = match format {
        Format::Tsv { compressed } => tsv::save(target, arrays, compressed)?,
        Format::Parquet => {
            columnar::save(target, arrays)?;
            vec![target.to_path_buf()]
        }
        Format::Json => {
            json::save(target, arrays)?;
            vec![target.to_path_buf()]
        }
        Format::Keyed => {
            keyed::save(target, arrays)?;
            vec![target.to_path_buf()]
        }
    };
    debug!(%format, target = %target.display(), arrays = arrays.len(), "saved");
    Ok(written)
}

/// Read every array stored at `source`.
pub fn load(format: Format, source: &Path) -> Result<Vec<(PathKey, Array)>, FormatError> {
    let arrays = match format {
        Format::Tsv { compressed } => tsv::load(source, compressed)?,
        Format::Parquet => columnar::load(source)?,
        Format::Json => json::load(source)?,
        Format::Keyed => keyed::load(source)?,
    };
    debug!(%format, source = %source.display(), arrays = arrays.len(), "loaded");
    Ok(arrays)
}

/// Names must be non-empty and unique; none may be a prefix of another.
fn check_names(arrays: &[(PathKey, Array)]) -> Result<(), FormatError> {
    let mut sorted: Vec<&PathKey> = arrays.iter().map(|(k, _)| k).collect();
    sorted.sort();
    for (i, key) in sorted.iter().enumerate() {
        if key.is_root() {
            return Err(FormatError::Name("empty array name".to_string()));
        }
        if let Some(next) = sorted.get(i + 1)
            && next.starts_with(key)
        {
            return Err(FormatError::Name(format!("'{key}' clashes with '{next}'")));
        }
    }
    Ok(())
}
