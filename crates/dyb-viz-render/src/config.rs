use serde::Deserialize;

use crate::color::Color;

/// Rendering configuration (YAML or programmatic). Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub figure: FigureConfig,
    pub font: FontConfig,
    pub axes: AxesConfig,
    pub grid: GridConfig,
    pub colors: ColorsConfig,
    /// Label drawn above the plot area, left aligned; empty to omit
    pub header: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            figure: FigureConfig::default(),
            font: FontConfig::default(),
            axes: AxesConfig::default(),
            grid: GridConfig::default(),
            colors: ColorsConfig::default(),
            header: "Daya Bay".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FigureConfig {
    pub width: f64,
    pub height: f64,
}

impl Default for FigureConfig {
    fn default() -> Self {
        Self {
            width: 518.4,  // 7.2" * 72
            height: 345.6, // 4.8" * 72
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    pub title_size: f64,
    pub label_size: f64,
    pub tick_size: f64,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self { title_size: 10.0, label_size: 11.0, tick_size: 8.5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AxesConfig {
    /// `in` or `out`
    pub tick_direction: String,
    pub tick_length: f64,
    pub minor_tick_length: f64,
    /// Target number of major ticks
    pub ticks: usize,
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self { tick_direction: "in".into(), tick_length: 5.0, minor_tick_length: 3.0, ticks: 6 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub show: bool,
    pub color: Color,
    pub alpha: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { show: true, color: Color::hex("#CBD5E1"), alpha: 0.55 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    pub line: Color,
    pub fill: Color,
    pub fill_alpha: f64,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self { line: Color::hex("#1D4ED8"), fill: Color::hex("#4C78A8"), fill_alpha: 0.25 }
    }
}

/// Parse a configuration from an optional YAML document; missing keys keep defaults.
pub fn resolve_config(user_yaml: Option<&str>) -> crate::Result<RenderConfig> {
    match user_yaml {
        None => Ok(RenderConfig::default()),
        Some(yaml) => serde_yaml_ng::from_str(yaml)
            .map_err(|e| crate::RenderError::Config(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = resolve_config(Some("figure:\n  width: 300\nheader: ''\n")).unwrap();
        assert_eq!(cfg.figure.width, 300.0);
        assert_eq!(cfg.figure.height, FigureConfig::default().height);
        assert!(cfg.header.is_empty());
        assert!(cfg.grid.show);
    }

    #[test]
    fn bad_color_is_a_config_error() {
        assert!(resolve_config(Some("grid:\n  color: nope\n")).is_err());
    }
}
