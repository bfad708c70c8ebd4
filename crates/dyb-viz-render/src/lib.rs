//! SVG rendering of model arrays.
//!
//! One-dimensional arrays become step plots over bin indices, matrices become
//! heatmaps with a colorbar. Output is plain SVG text; no fonts are embedded.

pub mod canvas;
pub mod color;
pub mod config;
pub mod layout;
pub mod output;
pub mod plots;
pub mod primitives;
pub mod text;

use config::RenderConfig;
use dyb_core::Array;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("config error: {0}")]
    Config(String),
    #[error("layout error: {0}")]
    Layout(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;

impl From<RenderError> for dyb_core::Error {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::Io(io) => dyb_core::Error::Io(io),
            other => dyb_core::Error::Render(other.to_string()),
        }
    }
}

/// Render one array to an SVG document. Scalars are rejected; arrays with more than
/// two dimensions are drawn flattened.
pub fn render_array(title: &str, array: &Array, config: &RenderConfig) -> Result<String> {
    match array.rows_cols() {
        Some((rows, cols)) => plots::matrix::render(title, rows, cols, array.data(), config),
        None if array.ndim() == 0 => {
            Err(RenderError::Layout(format!("'{title}' is a scalar, nothing to plot")))
        }
        None => plots::step::render(title, array.data(), config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_by_dimension() {
        let config = RenderConfig::default();
        let vector = render_array("v", &Array::vector(vec![1.0, 2.0]), &config).unwrap();
        assert!(vector.contains("<polyline"));
        let matrix = Array::matrix(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let heat = render_array("m", &matrix, &config).unwrap();
        assert!(!heat.contains("<polyline"));
        assert!(render_array("s", &Array::scalar(1.0), &config).is_err());
    }
}
