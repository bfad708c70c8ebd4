//! Text reports: aligned node/parameter tables, parameter listings, LaTeX tables and
//! `datax` key files.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use dyb_core::{Array, ParameterKind, ParameterRecord, PathKey};
use serde::{Deserialize, Serialize};

use crate::FormatError;
use crate::sanitize::escape_segment;

/// Options of [`format_table`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Arrays longer than this are shown as head and tail only
    pub max_values: usize,
    /// Significant digits
    pub precision: usize,
    /// Include the label column
    pub labels: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self { max_values: 6, precision: 6, labels: true }
    }
}

/// One table line.
#[derive(Debug, Clone)]
pub struct TableRow {
    pub path: String,
    pub kind: String,
    pub value: Array,
    pub central: Option<Array>,
    pub sigma: Option<Array>,
    pub label: Option<String>,
}

impl TableRow {
    pub fn node(path: String, kind: &str, value: Array) -> Self {
        Self { path, kind: kind.to_string(), value, central: None, sigma: None, label: None }
    }

    pub fn parameter(path: String, record: &ParameterRecord) -> Self {
        Self {
            path,
            kind: record.kind.as_str().to_string(),
            value: record.value.clone(),
            central: Some(record.central.clone()),
            sigma: record.sigma.clone(),
            label: record.label.clone(),
        }
    }
}

/// `%g`-style formatting with `precision` significant digits.
pub fn format_g(v: f64, precision: usize) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if !v.is_finite() {
        return v.to_string();
    }
    let precision = precision.max(1);
    let sci = format!("{:.*e}", precision - 1, v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= precision as i32 {
        let mantissa = trim_zeros(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') { s.trim_end_matches('0').trim_end_matches('.') } else { s }
}

fn shape_text(shape: &[usize]) -> String {
    if shape.is_empty() {
        return "()".to_string();
    }
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("({})", dims.join("×"))
}

/// Scalars bare, arrays in brackets; arrays longer than `max_values` keep head and tail.
pub fn values_text(array: &Array, options: &TableOptions) -> String {
    let fmt = |v: &f64| format_g(*v, options.precision);
    if array.ndim() == 0 {
        return array.data().first().map(fmt).unwrap_or_default();
    }
    let data = array.data();
    let parts: Vec<String> = if data.len() > options.max_values.max(2) {
        let head = options.max_values.max(2).div_ceil(2);
        let tail = options.max_values.max(2) / 2;
        data[..head]
            .iter()
            .map(fmt)
            .chain(std::iter::once("…".to_string()))
            .chain(data[data.len() - tail..].iter().map(fmt))
            .collect()
    } else {
        data.iter().map(fmt).collect()
    };
    format!("[{}]", parts.join(", "))
}

/// Aligned text table, one row per entry.
pub fn format_table(rows: &[TableRow], options: &TableOptions) -> String {
    let mut header = vec!["path", "type", "shape", "value", "central", "sigma"];
    if options.labels {
        header.push("label");
    }
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells = vec![
                row.path.clone(),
                row.kind.clone(),
                shape_text(row.value.shape()),
                values_text(&row.value, options),
                row.central.as_ref().map(|a| values_text(a, options)).unwrap_or_default(),
                row.sigma.as_ref().map(|a| values_text(a, options)).unwrap_or_default(),
            ];
            if options.labels {
                cells.push(row.label.clone().unwrap_or_default());
            }
            cells
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut line = |cells: &[&str]| {
        let mut text = String::new();
        for (i, (cell, w)) in cells.iter().zip(&widths).enumerate() {
            if i > 0 {
                text.push_str("  ");
            }
            let pad = w.saturating_sub(cell.chars().count());
            text.push_str(cell);
            text.extend(std::iter::repeat_n(' ', pad));
        }
        out.push_str(text.trim_end());
        out.push('\n');
    };
    line(&header);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    line(&rule.iter().map(String::as_str).collect::<Vec<_>>());
    for row in &cells {
        line(&row.iter().map(String::as_str).collect::<Vec<_>>());
    }
    out
}

fn relative(record: &ParameterRecord, root: &PathKey) -> PathKey {
    record.path.strip_prefix(root).unwrap_or_else(|| record.path.clone())
}

/// Plain listing: `name  kind  value  central  sigma  label`, one parameter per line.
pub fn parameters_text(records: &[ParameterRecord], root: &PathKey) -> String {
    let options = TableOptions { max_values: usize::MAX, precision: 9, labels: true };
    let rows: Vec<TableRow> = records
        .iter()
        .map(|r| TableRow::parameter(relative(r, root).to_dotted(), r))
        .collect();
    format_table(&rows, &options)
}

pub fn save_parameters_text(
    path: &Path,
    records: &[ParameterRecord],
    root: &PathKey,
) -> Result<PathBuf, FormatError> {
    write_file(path, &parameters_text(records, root))
}

/// Ordered label replacements for LaTeX output. Longer patterns come first where one
/// contains another.
pub const LATEX_SUBSTITUTIONS: &[(&str, &str)] = &[
    (" U235", r" $^{235}$U"),
    (" U238", r" $^{238}$U"),
    (" Pu239", r" $^{239}$Pu"),
    (" Pu241", r" $^{241}$Pu"),
    ("U235 ", r"$^{235}$U "),
    ("U238 ", r"$^{238}$U "),
    ("Pu239 ", r"$^{239}$Pu "),
    ("Pu241 ", r"$^{241}$Pu "),
    ("²³⁵U", r"$^{235}$U"),
    ("²³⁸U", r"$^{238}$U"),
    ("²³⁹Pu", r"$^{239}$Pu"),
    ("²⁴¹Pu", r"$^{241}$Pu"),
    ("Eν", r"$E_{\nu}$"),
    ("Edep", r"$E_{\rm dep}$"),
    ("Evis", r"$E_{\rm vis}$"),
    ("Escint", r"$E_{\rm scint}$"),
    ("Erec", r"$E_{\rm rec}$"),
    ("cosθ", r"$\cos\theta$"),
    ("Δm²₃₁", r"$\Delta m^2_{31}$"),
    ("Δm²₃₂", r"$\Delta m^2_{32}$"),
    ("Δm²₂₁", r"$\Delta m^2_{21}$"),
    ("sin²2θ₁₃", r"$\sin^22\theta_{13}$"),
    ("sin²2θ₁₂", r"$\sin^22\theta_{12}$"),
    ("sin²θ₁₃", r"$\sin^2\theta_{13}$"),
    ("sin²θ₁₂", r"$\sin^2\theta_{12}$"),
    ("¹³C(α,n)¹⁶O", r"$^{13}{\rm C}(\alpha,n)^{16}{\rm O}$"),
    ("²⁴¹Am¹³C", r"$^{241}{\rm Am}^{13}{\rm C}$"),
    ("⁹Li/⁸He", r"$^{9}{\rm Li}/^{8}{\rm He}$"),
    ("ν̅", r"$\overline{\nu}$"),
    ("ν", r"$\nu$"),
    ("α", r"$\alpha$"),
    ("δ", r"$\delta$"),
    ("γ", r"$\gamma$"),
    ("μ", r"$\mu$"),
    ("σ", r"$\sigma$"),
    ("π", r"$\pi$"),
    ("χ²", r"$\chi^2$"),
    ("·", r"$\cdot$"),
    ("×", r"$\times$"),
    ("⁻¹", r"$^{-1}$"),
    ("⁻²", r"$^{-2}$"),
    ("¹", r"$^1$"),
    ("²", r"$^2$"),
    ("³", r"$^3$"),
    ("⁴", r"$^4$"),
    ("⁵", r"$^5$"),
    ("⁶", r"$^6$"),
    ("⁷", r"$^7$"),
    ("⁸", r"$^8$"),
    ("⁹", r"$^9$"),
    ("⁰", r"$^0$"),
    ("ᵢ", r"$_i$"),
];

/// Escape TeX specials, then apply [`LATEX_SUBSTITUTIONS`] in order.
pub fn latex_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str(r"\textbackslash{}"),
            '_' | '%' | '&' | '#' | '$' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    for (from, to) in LATEX_SUBSTITUTIONS {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    out
}

fn latex_values(array: &Array) -> String {
    let parts: Vec<String> = array.data().iter().map(|v| format_g(*v, 6)).collect();
    parts.join(", ")
}

/// One `tabular` per parameter group. Groups are the first segment below `root`;
/// parameters directly under `root` form the group `root`.
pub fn latex_tables(records: &[ParameterRecord], root: &PathKey) -> BTreeMap<String, String> {
    let mut groups: BTreeMap<String, Vec<(PathKey, &ParameterRecord)>> = BTreeMap::new();
    for record in records {
        let rel = relative(record, root);
        let group = match rel.first() {
            Some(first) if rel.len() > 1 => first.to_string(),
            _ => "root".to_string(),
        };
        groups.entry(group).or_default().push((rel, record));
    }

    groups
        .into_iter()
        .map(|(group, members)| {
            let mut tex = String::new();
            tex.push_str("\\begin{tabular}{llll}\n\\hline\n");
            tex.push_str("Parameter & Value & $\\sigma$ & Description \\\\\n\\hline\n");
            for (rel, record) in members {
                let sigma = match (&record.kind, &record.sigma) {
                    (ParameterKind::Constant, _) | (_, None) => "--".to_string(),
                    (_, Some(s)) => latex_values(s),
                };
                let _ = writeln!(
                    tex,
                    "{} & {} & {} & {} \\\\",
                    latex_text(&rel.to_dotted()),
                    latex_values(&record.value),
                    sigma,
                    record.label.as_deref().map(latex_text).unwrap_or_default(),
                );
            }
            tex.push_str("\\hline\n\\end{tabular}\n");
            (group, tex)
        })
        .collect()
}

/// Write [`latex_tables`] as `<dir>/<group>.tex`.
pub fn save_latex_split(
    dir: &Path,
    records: &[ParameterRecord],
    root: &PathKey,
) -> Result<Vec<PathBuf>, FormatError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for (group, tex) in latex_tables(records, root) {
        let file = dir.join(format!("{}.tex", escape_segment(&group)));
        written.push(write_file(&file, &tex)?);
    }
    Ok(written)
}

/// `\pgfkeyssetvalue{/datax/<name>}{<value>}` lines. Constrained parameters also get
/// `<name>/central` and `<name>/sigma`; array elements are named `<name>.<index>`.
pub fn datax(records: &[ParameterRecord], root: &PathKey) -> String {
    let mut out = String::new();
    let mut put = |name: &str, value: f64| {
        let _ = writeln!(out, "\\pgfkeyssetvalue{{/datax/{name}}}{{{}}}", format_g(value, 9));
    };
    for record in records {
        let base = relative(record, root).to_dotted();
        let n = record.value.len();
        for i in 0..n {
            let name = if record.value.ndim() == 0 { base.clone() } else { format!("{base}.{i}") };
            put(&name, record.value.data()[i]);
            if record.kind == ParameterKind::Constrained
                && let Some(sigma) = &record.sigma
            {
                put(&format!("{name}/central"), record.central.data()[i]);
                put(&format!("{name}/sigma"), sigma.data()[i]);
            }
        }
    }
    out
}

pub fn save_datax(
    path: &Path,
    records: &[ParameterRecord],
    root: &PathKey,
) -> Result<PathBuf, FormatError> {
    write_file(path, &datax(records, root))
}

fn write_file(path: &Path, text: &str) -> Result<PathBuf, FormatError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, kind: ParameterKind, value: f64, sigma: Option<f64>) -> ParameterRecord {
        ParameterRecord {
            path: PathKey::parse(path).unwrap(),
            kind,
            value: Array::scalar(value),
            central: Array::scalar(value),
            sigma: sigma.map(Array::scalar),
            label: Some("sin²2θ₁₃ mixing".to_string()),
        }
    }

    #[test]
    fn g_format() {
        assert_eq!(format_g(0.0, 6), "0");
        assert_eq!(format_g(1.5, 6), "1.5");
        assert_eq!(format_g(0.0825, 6), "0.0825");
        assert_eq!(format_g(2.5e-3, 6), "0.0025");
        assert_eq!(format_g(1.23456789e-5, 6), "1.23457e-05");
        assert_eq!(format_g(1234567.0, 6), "1.23457e+06");
        assert_eq!(format_g(999999.7, 6), "1e+06");
        assert_eq!(format_g(-42.0, 6), "-42");
    }

    #[test]
    fn long_arrays_are_truncated() {
        let opts = TableOptions { max_values: 4, ..Default::default() };
        let a = Array::vector((0..10).map(f64::from).collect());
        assert_eq!(values_text(&a, &opts), "[0, 1, …, 8, 9]");
        assert_eq!(values_text(&Array::scalar(2.0), &opts), "2");
    }

    #[test]
    fn table_columns_align() {
        let rows = vec![
            TableRow::node("outputs.chi2".into(), "compute", Array::scalar(1.0)),
            TableRow::node("x".into(), "input", Array::vector(vec![1.0, 2.0])),
        ];
        let text = format_table(&rows, &TableOptions::default());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("path"));
        let col = lines[0].find("type").unwrap();
        assert_eq!(lines[2].find("compute"), Some(col));
        assert_eq!(lines[3].find("input"), Some(col));
    }

    #[test]
    fn latex_substitutes_symbols() {
        assert_eq!(latex_text("sin²2θ₁₃"), r"$\sin^22\theta_{13}$");
        assert_eq!(latex_text("a_b 5%"), r"a\_b 5\%");
        assert_eq!(latex_text("χ² of ν̅"), r"$\chi^2$ of $\overline{\nu}$");
    }

    #[test]
    fn latex_tables_split_by_group() {
        let root = PathKey::parse("parameters.all").unwrap();
        let records = vec![
            record("parameters.all.oscprob.SinSq2Theta13", ParameterKind::Free, 0.0853, None),
            record("parameters.all.detector.eff", ParameterKind::Constrained, 1.0, Some(0.01)),
            record("parameters.all.scale", ParameterKind::Constant, 2.0, None),
        ];
        let tables = latex_tables(&records, &root);
        assert_eq!(tables.keys().collect::<Vec<_>>(), ["detector", "oscprob", "root"]);
        assert!(tables["detector"].contains("detector.eff & 1 & 0.01"));
        assert!(tables["oscprob"].contains(r"oscprob.SinSq2Theta13 & 0.0853 & --"));
    }

    #[test]
    fn datax_lines() {
        let root = PathKey::parse("parameters.all").unwrap();
        let records = vec![record("parameters.all.eff", ParameterKind::Constrained, 0.5, Some(0.1))];
        let text = datax(&records, &root);
        assert_eq!(
            text,
            "\\pgfkeyssetvalue{/datax/eff}{0.5}\n\
             \\pgfkeyssetvalue{/datax/eff/central}{0.5}\n\
             \\pgfkeyssetvalue{/datax/eff/sigma}{0.1}\n"
        );
    }
}
