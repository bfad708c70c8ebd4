//! Hierarchical JSON container.
//!
//! Groups nest like the storage does; leaves are datasets with a shape and flat
//! row-major data:
//!
//! ```json
//! {"format": "dyb", "version": 1, "root": {"type": "group", "children": {
//!     "outputs": {"type": "group", "children": {
//!         "chi2": {"type": "dataset", "shape": [], "data": [12.5]}}}}}}
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use dyb_core::{Array, PathKey};
use serde::{Deserialize, Serialize};

use crate::sanitize::{escape_segment, unescape_segment};
use crate::{FormatError, malformed};

const FORMAT_TAG: &str = "dyb";
const VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Entry {
    Group { children: BTreeMap<String, Entry> },
    Dataset { shape: Vec<usize>, data: Vec<f64> },
}

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    format: String,
    version: u32,
    root: Entry,
}

fn insert(root: &mut BTreeMap<String, Entry>, key: &PathKey, array: &Array) -> Result<(), FormatError> {
    let Some((last, parents)) = key.segments().split_last() else {
        return Err(FormatError::Name("empty array name".to_string()));
    };
    if array.data().iter().any(|v| !v.is_finite()) {
        return Err(FormatError::NonFinite(key.to_dotted()));
    }
    let mut children = root;
    for segment in parents {
        let entry = children
            .entry(escape_segment(segment).into_owned())
            .or_insert_with(|| Entry::Group { children: BTreeMap::new() });
        children = match entry {
            Entry::Group { children } => children,
            Entry::Dataset { .. } => {
                return Err(FormatError::Name(format!("'{key}' passes through a dataset")));
            }
        };
    }
    let dataset = Entry::Dataset { shape: array.shape().to_vec(), data: array.data().to_vec() };
    if children.insert(escape_segment(last).into_owned(), dataset).is_some() {
        return Err(FormatError::Name(format!("duplicate name '{key}'")));
    }
    Ok(())
}

fn flatten(
    children: &BTreeMap<String, Entry>,
    prefix: &PathKey,
    origin: &Path,
    out: &mut Vec<(PathKey, Array)>,
) -> Result<(), FormatError> {
    for (name, entry) in children {
        let key = prefix.child(unescape_segment(name)?)?;
        match entry {
            Entry::Group { children } => flatten(children, &key, origin, out)?,
            Entry::Dataset { shape, data } => {
                let array = Array::new(shape.clone(), data.clone())
                    .map_err(|e| malformed("json", origin, e.to_string()))?;
                out.push((key, array));
            }
        }
    }
    Ok(())
}

pub fn save(path: &Path, arrays: &[(PathKey, Array)]) -> Result<(), FormatError> {
    let mut children = BTreeMap::new();
    for (key, array) in arrays {
        insert(&mut children, key, array)?;
    }
    let doc = Document {
        format: FORMAT_TAG.to_string(),
        version: VERSION,
        root: Entry::Group { children },
    };
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &doc)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Vec<(PathKey, Array)>, FormatError> {
    let doc: Document = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    if doc.format != FORMAT_TAG {
        return Err(malformed("json", path, format!("unexpected format tag '{}'", doc.format)));
    }
    if doc.version > VERSION {
        return Err(malformed("json", path, format!("unsupported version {}", doc.version)));
    }
    let Entry::Group { children } = &doc.root else {
        return Err(malformed("json", path, "root is not a group"));
    };
    let mut out = Vec::new();
    flatten(children, &PathKey::root(), path, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_follows_segments() {
        let mut root = BTreeMap::new();
        insert(&mut root, &PathKey::parse("a.b").unwrap(), &Array::scalar(1.0)).unwrap();
        insert(&mut root, &PathKey::parse("a.c").unwrap(), &Array::scalar(2.0)).unwrap();
        let Some(Entry::Group { children }) = root.get("a") else {
            panic!("expected a group");
        };
        assert_eq!(children.len(), 2);

        assert!(insert(&mut root, &PathKey::parse("a.b.x").unwrap(), &Array::scalar(0.0)).is_err());
        assert!(insert(&mut root, &PathKey::parse("a.c").unwrap(), &Array::scalar(0.0)).is_err());
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut root = BTreeMap::new();
        let key = PathKey::parse("a.nan").unwrap();
        let err = insert(&mut root, &key, &Array::vector(vec![1.0, f64::NAN])).unwrap_err();
        assert!(matches!(err, FormatError::NonFinite(ref name) if name == "a.nan"));
    }

    #[test]
    fn entries_are_tagged() {
        let e = Entry::Dataset { shape: vec![1], data: vec![2.0] };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "dataset");
    }
}
