//! Error types for dyb

use thiserror::Error;

/// dyb error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Path resolves to nothing in the storage
    #[error("key not found: '{0}'")]
    KeyNotFound(String),

    /// `--par NAME VALUE` style lookup matched zero or several parameters
    #[error("{}", describe_parameter_lookup(.name, .candidates))]
    AmbiguousOrUnknownParameter {
        /// Name as given by the caller
        name: String,
        /// Full paths of every matching parameter (empty when unknown)
        candidates: Vec<String>,
    },

    /// Source name is not one of the switch inputs
    #[error("unknown source '{name}' for switch '{switch}' (available: {})", .available.join(", "))]
    UnknownSourceName {
        /// Switch path
        switch: String,
        /// Requested source name
        name: String,
        /// Source names accepted by the switch
        available: Vec<String>,
    },

    /// Switch index outside of `[0, len)`
    #[error("index {index} out of range for switch '{switch}' with {len} inputs")]
    IndexOutOfRange {
        /// Switch path
        switch: String,
        /// Requested index
        index: i64,
        /// Number of inputs
        len: usize,
    },

    /// `pop()` without a matching `push()`
    #[error("pop() on parameter '{0}' with an empty staging stack")]
    EmptyStagingStack(String),

    /// Dependency graph is not acyclic
    #[error("cyclic dependency: {0}")]
    CyclicDependency(String),

    /// Malformed path string or segment
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Path already taken, or clashes with an existing leaf/prefix
    #[error("path conflict: '{0}'")]
    PathConflict(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Export adapter failure
    #[error("Export error: {0}")]
    Export(String),

    /// Render adapter failure
    #[error("Render error: {0}")]
    Render(String),
}

fn describe_parameter_lookup(name: &str, candidates: &[String]) -> String {
    if candidates.is_empty() {
        format!("unknown parameter '{name}'")
    } else {
        format!("ambiguous parameter '{name}' matches: {}", candidates.join(", "))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
