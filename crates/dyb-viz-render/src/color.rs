use std::fmt;

use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse `#rrggbb` (the `#` is optional).
    pub fn parse_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix('#').unwrap_or(s);
        if s.len() != 6 || !s.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Like [`Color::parse_hex`], black on malformed input.
    pub fn hex(s: &str) -> Self {
        Self::parse_hex(s).unwrap_or(Self::BLACK)
    }

    pub const fn with_alpha(mut self, a: f64) -> Self {
        self.a = a;
        self
    }

    pub fn to_svg_fill(&self) -> String {
        if (self.a - 1.0).abs() < 1e-6 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("rgba({},{},{},{:.3})", self.r, self.g, self.b, self.a)
        }
    }

    pub fn lerp(a: Color, b: Color, t: f64) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |x: u8, y: u8| (x as f64 * (1.0 - t) + y as f64 * t).round() as u8;
        Color { r: mix(a.r, b.r), g: mix(a.g, b.g), b: mix(a.b, b.b), a: a.a * (1.0 - t) + b.a * t }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_svg_fill())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::parse_hex(&s).ok_or_else(|| serde::de::Error::custom(format!("bad color '{s}'")))
    }
}

/// Stops of a sequential map, dark to light.
const VIRIDIS: [&str; 5] = ["#440154", "#3b528b", "#21918c", "#5ec962", "#fde725"];

/// Sequential map for non-negative data, `t` in `[0, 1]`.
pub fn viridis(t: f64) -> Color {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (VIRIDIS.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    Color::lerp(Color::hex(VIRIDIS[i]), Color::hex(VIRIDIS[i + 1]), scaled - i as f64)
}

/// Diverging map: -1 blue, 0 white, +1 red.
pub fn rdbu_r(val: f64) -> Color {
    let v = if val.is_finite() { val.clamp(-1.0, 1.0) } else { 0.0 };
    if v < 0.0 {
        Color::lerp(Color::WHITE, Color::hex("#2166ac"), -v)
    } else {
        Color::lerp(Color::WHITE, Color::hex("#b2182b"), v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        let c = Color::hex("#1D4ED8");
        assert_eq!((c.r, c.g, c.b), (0x1D, 0x4E, 0xD8));
        assert_eq!(c.to_svg_fill(), "#1d4ed8");
        assert!(Color::parse_hex("#12").is_none());
        assert!(Color::parse_hex("zzzzzz").is_none());
    }

    #[test]
    fn alpha_fill() {
        assert_eq!(Color::rgb(29, 78, 216).with_alpha(0.5).to_svg_fill(), "rgba(29,78,216,0.500)");
    }

    #[test]
    fn colormap_ends() {
        assert_eq!(viridis(0.0), Color::hex(VIRIDIS[0]));
        assert_eq!(viridis(1.0), Color::hex(VIRIDIS[4]));
        assert_eq!(rdbu_r(0.0), Color::WHITE);
        let blue = rdbu_r(-1.0);
        assert!(blue.b > blue.r);
    }
}
