//! Tab-separated text tree.
//!
//! Each array becomes one file: `outputs.eventscount.AD11` is written to
//! `<dir>/outputs/eventscount/AD11.tsv` (or `.tsv.gz`). A `# shape:` header line
//! precedes the values; 2-D arrays are written one row per line.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use dyb_core::{Array, PathKey};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::sanitize::{escape_segment, unescape_segment};
use crate::{FormatError, malformed};

const SHAPE_HEADER: &str = "# shape:";

fn suffix(compressed: bool) -> &'static str {
    if compressed { ".tsv.gz" } else { ".tsv" }
}

fn file_for(dir: &Path, key: &PathKey, compressed: bool) -> PathBuf {
    let mut path = dir.to_path_buf();
    let segments = key.segments();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        path.push(&*escape_segment(segment));
    }
    if let Some(last) = key.last() {
        path.push(format!("{}{}", escape_segment(last), suffix(compressed)));
    }
    path
}

/// Text body of one array.
pub fn format_array(array: &Array) -> String {
    let mut out = String::new();
    out.push_str(SHAPE_HEADER);
    for d in array.shape() {
        out.push('\t');
        out.push_str(&d.to_string());
    }
    out.push('\n');

    let row_len = match array.shape().last() {
        Some(&n) if array.ndim() >= 2 && n > 0 => n,
        _ => 1,
    };
    for row in array.data().chunks(row_len) {
        let line: Vec<String> = row.iter().map(|v| format!("{v:?}")).collect();
        out.push_str(&line.join("\t"));
        out.push('\n');
    }
    out
}

/// Inverse of [`format_array`].
pub fn parse_array(text: &str, origin: &Path) -> Result<Array, FormatError> {
    let mut lines = text.lines();
    let header = lines.next().unwrap_or("");
    let Some(dims) = header.strip_prefix(SHAPE_HEADER) else {
        return Err(malformed("tsv", origin, "missing '# shape:' header"));
    };
    let shape = dims
        .split_whitespace()
        .map(|d| {
            d.parse::<usize>()
                .map_err(|_| malformed("tsv", origin, format!("bad dimension '{d}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut values = Vec::new();
    for line in lines.filter(|l| !l.trim().is_empty()) {
        for cell in line.split('\t') {
            let v = cell
                .trim()
                .parse::<f64>()
                .map_err(|_| malformed("tsv", origin, format!("bad value '{cell}'")))?;
            values.push(v);
        }
    }
    Array::new(shape, values).map_err(|e| malformed("tsv", origin, e.to_string()))
}

pub fn save(
    dir: &Path,
    arrays: &[(PathKey, Array)],
    compressed: bool,
) -> Result<Vec<PathBuf>, FormatError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(arrays.len());
    for (key, array) in arrays {
        let path = file_for(dir, key, compressed);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = format_array(array);
        let file = BufWriter::new(File::create(&path)?);
        if compressed {
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(body.as_bytes())?;
            encoder.finish()?.flush()?;
        } else {
            let mut file = file;
            file.write_all(body.as_bytes())?;
            file.flush()?;
        }
        written.push(path);
    }
    Ok(written)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), FormatError> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

pub fn load(dir: &Path, compressed: bool) -> Result<Vec<(PathKey, Array)>, FormatError> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;

    let mut arrays = Vec::new();
    for file in files {
        let Ok(rel) = file.strip_prefix(dir) else { continue };
        let mut segments = Vec::new();
        for component in rel.iter() {
            let Some(s) = component.to_str() else {
                return Err(malformed("tsv", &file, "file name is not UTF-8"));
            };
            segments.push(s.to_string());
        }
        let Some(last) = segments.pop() else { continue };
        let Some(stem) = last.strip_suffix(suffix(compressed)) else { continue };
        segments.push(stem.to_string());
        let segments =
            segments.iter().map(|s| unescape_segment(s)).collect::<Result<Vec<_>, _>>()?;
        let key = PathKey::from_segments(segments)?;

        let mut text = String::new();
        if compressed {
            GzDecoder::new(File::open(&file)?).read_to_string(&mut text)?;
        } else {
            BufReader::new(File::open(&file)?).read_to_string(&mut text)?;
        }
        arrays.push((key, parse_array(&text, &file)?));
    }
    Ok(arrays)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_layout() {
        let m = Array::matrix(2, 2, vec![1.0, 2.5, -3.0, 1e-7]).unwrap();
        assert_eq!(format_array(&m), "# shape:\t2\t2\n1.0\t2.5\n-3.0\t1e-7\n");
        assert_eq!(format_array(&Array::scalar(0.5)), "# shape:\n0.5\n");
        assert_eq!(parse_array(&format_array(&m), Path::new("m.tsv")).unwrap(), m);
    }

    #[test]
    fn malformed_input() {
        let origin = Path::new("x.tsv");
        assert!(parse_array("1\n2\n", origin).is_err());
        assert!(parse_array("# shape:\t3\n1\n2\n", origin).is_err());
        assert!(parse_array("# shape:\t1\nabc\n", origin).is_err());
    }
}
