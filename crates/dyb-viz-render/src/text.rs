use crate::primitives::TextStyle;

#[derive(Debug, Clone, Copy)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
}

/// Approximate extent of `text` in points. No font is embedded, so glyph advances are
/// average widths of a sans-serif face: narrow for digits and punctuation, wider for
/// letters, wider still in bold.
pub fn measure_text(text: &str, style: &TextStyle) -> TextMetrics {
    let em: f64 = text
        .chars()
        .map(|c| match c {
            '.' | ',' | ':' | ';' | '\'' | '|' | 'i' | 'l' | 'j' => 0.28,
            '0'..='9' | '-' | '+' | ' ' => 0.55,
            'm' | 'w' | 'M' | 'W' => 0.85,
            c if c.is_uppercase() => 0.68,
            _ => 0.56,
        })
        .sum();
    let factor = if style.bold { 1.07 } else { 1.0 };
    TextMetrics { width: em * style.size * factor, height: style.size * 1.2 }
}
