use std::fmt::Write as _;

use crate::primitives::*;
use crate::text::{TextMetrics, measure_text};

#[derive(Debug, Clone)]
enum SvgElement {
    Rect { x: f64, y: f64, w: f64, h: f64, style: Style },
    Line { x1: f64, y1: f64, x2: f64, y2: f64, style: LineStyle },
    Polyline { points: Vec<(f64, f64)>, style: LineStyle },
    Polygon { points: Vec<(f64, f64)>, style: Style },
    Text { x: f64, y: f64, content: String, style: TextStyle, rotate: Option<f64> },
    Clipped { clip_id: String, children: Vec<SvgElement> },
}

/// Immediate-mode SVG canvas. Coordinates in points (1pt = 1/72").
///
/// Elements are kept in draw order; between [`Canvas::push_clip`] and
/// [`Canvas::pop_clip`] they are grouped under the clip rectangle.
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    elements: Vec<SvgElement>,
    defs: Vec<String>,
    clip: Option<(String, Vec<SvgElement>)>,
    next_clip_id: usize,
}

impl Canvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            elements: Vec::new(),
            defs: Vec::new(),
            clip: None,
            next_clip_id: 0,
        }
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, style: &Style) {
        self.push(SvgElement::Rect { x, y, w, h, style: style.clone() });
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, style: &LineStyle) {
        self.push(SvgElement::Line { x1, y1, x2, y2, style: style.clone() });
    }

    pub fn polyline(&mut self, points: &[(f64, f64)], style: &LineStyle) {
        if points.len() < 2 {
            return;
        }
        self.push(SvgElement::Polyline { points: points.to_vec(), style: style.clone() });
    }

    pub fn polygon(&mut self, points: &[(f64, f64)], style: &Style) {
        if points.len() < 3 {
            return;
        }
        self.push(SvgElement::Polygon { points: points.to_vec(), style: style.clone() });
    }

    pub fn text(&mut self, x: f64, y: f64, content: &str, style: &TextStyle) {
        self.push(SvgElement::Text {
            x,
            y,
            content: content.to_string(),
            style: style.clone(),
            rotate: None,
        });
    }

    pub fn text_rotated(&mut self, x: f64, y: f64, content: &str, style: &TextStyle, angle: f64) {
        self.push(SvgElement::Text {
            x,
            y,
            content: content.to_string(),
            style: style.clone(),
            rotate: Some(angle),
        });
    }

    pub fn measure_text(&self, content: &str, style: &TextStyle) -> TextMetrics {
        measure_text(content, style)
    }

    /// Start clipping to a rectangle. Clips do not nest; a second push closes the first.
    pub fn push_clip(&mut self, x: f64, y: f64, w: f64, h: f64) -> String {
        self.pop_clip();
        let id = format!("clip{}", self.next_clip_id);
        self.next_clip_id += 1;
        self.defs.push(format!(
            r#"<clipPath id="{id}"><rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" /></clipPath>"#
        ));
        self.clip = Some((id.clone(), Vec::new()));
        id
    }

    pub fn pop_clip(&mut self) {
        if let Some((clip_id, children)) = self.clip.take() {
            self.elements.push(SvgElement::Clipped { clip_id, children });
        }
    }

    fn push(&mut self, elem: SvgElement) {
        match &mut self.clip {
            Some((_, children)) => children.push(elem),
            None => self.elements.push(elem),
        }
    }

    pub fn finish_svg(mut self) -> String {
        self.pop_clip();

        let mut out = String::with_capacity(32 * 1024);
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height,
        );
        if !self.defs.is_empty() {
            out.push_str("<defs>\n");
            for d in &self.defs {
                out.push_str(d);
                out.push('\n');
            }
            out.push_str("</defs>\n");
        }
        let _ = writeln!(
            out,
            r#"<rect width="{}" height="{}" fill="white" />"#,
            self.width, self.height
        );
        for elem in &self.elements {
            render_element(&mut out, elem);
        }
        out.push_str("</svg>\n");
        out
    }
}

fn write_points(out: &mut String, points: &[(f64, f64)]) {
    out.push_str(r#" points=""#);
    for (i, (x, y)) in points.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{x:.2},{y:.2}");
    }
    out.push('"');
}

fn escape_xml(out: &mut String, content: &str) {
    for ch in content.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

fn render_element(out: &mut String, elem: &SvgElement) {
    match elem {
        SvgElement::Rect { x, y, w, h, style } => {
            let _ = write!(out, r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}""#);
            write_style_attrs(out, style);
            out.push_str(" />\n");
        }
        SvgElement::Line { x1, y1, x2, y2, style } => {
            let _ = write!(out, r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}""#);
            write_line_attrs(out, style);
            out.push_str(" />\n");
        }
        SvgElement::Polyline { points, style } => {
            out.push_str("<polyline");
            write_points(out, points);
            out.push_str(r#" fill="none""#);
            write_line_attrs(out, style);
            out.push_str(" />\n");
        }
        SvgElement::Polygon { points, style } => {
            out.push_str("<polygon");
            write_points(out, points);
            write_style_attrs(out, style);
            out.push_str(" />\n");
        }
        SvgElement::Text { x, y, content, style, rotate } => {
            let _ = write!(
                out,
                r#"<text x="{x:.2}" y="{y:.2}" font-family="sans-serif" font-size="{:.1}" fill="{}" text-anchor="{}" dominant-baseline="{}""#,
                style.size,
                style.color.to_svg_fill(),
                style.anchor.as_str(),
                style.baseline.as_str(),
            );
            if style.bold {
                out.push_str(r#" font-weight="bold""#);
            }
            if let Some(angle) = rotate {
                let _ = write!(out, r#" transform="rotate({angle:.1},{x:.2},{y:.2})""#);
            }
            out.push('>');
            escape_xml(out, content);
            out.push_str("</text>\n");
        }
        SvgElement::Clipped { clip_id, children } => {
            let _ = writeln!(out, r#"<g clip-path="url(#{clip_id})">"#);
            for child in children {
                render_element(out, child);
            }
            out.push_str("</g>\n");
        }
    }
}

fn write_style_attrs(out: &mut String, style: &Style) {
    match &style.fill {
        Some(fill) => {
            let _ = write!(out, r#" fill="{}""#, fill.to_svg_fill());
        }
        None => out.push_str(r#" fill="none""#),
    }
    if let Some(stroke) = &style.stroke {
        let _ = write!(
            out,
            r#" stroke="{}" stroke-width="{:.2}""#,
            stroke.to_svg_fill(),
            style.stroke_width
        );
    }
}

fn write_line_attrs(out: &mut String, style: &LineStyle) {
    let _ = write!(out, r#" stroke="{}" stroke-width="{:.2}""#, style.color.to_svg_fill(), style.width);
    if let Some(dash) = style.dash {
        let _ = write!(out, r#" stroke-dasharray="{dash}""#);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    #[test]
    fn empty_canvas() {
        let svg = Canvas::new(100.0, 50.0).finish_svg();
        assert!(svg.contains("width=\"100\""));
        assert!(svg.contains("height=\"50\""));
        assert!(svg.ends_with("</svg>\n"));
    }

    #[test]
    fn text_is_escaped() {
        let mut c = Canvas::new(200.0, 100.0);
        c.text(10.0, 20.0, "a < b & c", &TextStyle::default());
        assert!(c.finish_svg().contains("a &lt; b &amp; c"));
    }

    #[test]
    fn clipped_elements_are_grouped() {
        let mut c = Canvas::new(200.0, 100.0);
        let id = c.push_clip(0.0, 0.0, 50.0, 50.0);
        c.rect(10.0, 20.0, 50.0, 30.0, &Style::filled(Color::hex("#ff0000")));
        c.pop_clip();
        c.line(0.0, 0.0, 1.0, 1.0, &LineStyle::default());
        let svg = c.finish_svg();
        let group = svg.find(&format!("clip-path=\"url(#{id})\"")).unwrap();
        let rect = svg.find(r##"fill="#ff0000""##).unwrap();
        let line = svg.find("<line").unwrap();
        assert!(group < rect && rect < line);
    }
}
