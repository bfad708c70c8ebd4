use dyb_core::{Array, PathKey};
use dyb_io::{Format, load, save};
use proptest::prelude::*;
use std::path::{Path, PathBuf};

fn tmp_dir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("dyb_io_{tag}_{}_{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn sample() -> Vec<(PathKey, Array)> {
    vec![
        (PathKey::parse("eventscount.AD11").unwrap(), Array::vector(vec![1.5, 2.25, 0.0, -4.0])),
        (PathKey::parse("eventscount.AD12").unwrap(), Array::vector(vec![1e-12, 3e15])),
        (PathKey::parse("statistic.chi2").unwrap(), Array::scalar(12.345678901234)),
        (
            PathKey::parse("covariance.syst").unwrap(),
            Array::matrix(2, 3, vec![1.0, 0.5, 0.25, 0.5, 2.0, 0.125]).unwrap(),
        ),
        (PathKey::from_segments(["odd", "a/b%c\\d"]).unwrap(), Array::vector(vec![7.0])),
        (PathKey::parse("empty").unwrap(), Array::vector(Vec::new())),
    ]
}

fn target(dir: &Path, format: Format) -> PathBuf {
    match format.extension() {
        Some(ext) => dir.join(format!("out.{ext}")),
        None => dir.join(format.name()),
    }
}

fn sorted(mut arrays: Vec<(PathKey, Array)>) -> Vec<(PathKey, Array)> {
    arrays.sort_by(|a, b| a.0.cmp(&b.0));
    arrays
}

#[test]
fn every_format_reads_back_what_it_wrote() {
    let dir = tmp_dir("roundtrip");
    for name in Format::NAMES {
        let format: Format = name.parse().unwrap();
        let path = target(&dir, format);
        save(format, &path, &sample()).unwrap();
        let back = load(format, &path).unwrap();
        assert_eq!(sorted(back), sorted(sample()), "format {format}");
    }
}

#[test]
fn repeated_saves_are_byte_identical() {
    let dir = tmp_dir("determinism");
    for name in ["parquet", "json", "keyed"] {
        let format: Format = name.parse().unwrap();
        let first = dir.join(format!("first.{name}"));
        let second = dir.join(format!("second.{name}"));
        save(format, &first, &sample()).unwrap();
        save(format, &second, &sample()).unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap(), "{name}");
    }

    let a = save(Format::Tsv { compressed: false }, &dir.join("tsv_a"), &sample()).unwrap();
    let b = save(Format::Tsv { compressed: false }, &dir.join("tsv_b"), &sample()).unwrap();
    assert_eq!(a.len(), b.len());
    for (fa, fb) in a.iter().zip(&b) {
        assert_eq!(std::fs::read(fa).unwrap(), std::fs::read(fb).unwrap());
    }
}

#[test]
fn tsv_mirrors_the_hierarchy() {
    let dir = tmp_dir("tsv_layout");
    let out = dir.join("tree");
    let written = save(Format::Tsv { compressed: true }, &out, &sample()).unwrap();
    assert_eq!(written.len(), sample().len());
    assert!(out.join("eventscount").join("AD11.tsv.gz").is_file());
    assert!(out.join("odd").join("a%2Fb%25c%5Cd.tsv.gz").is_file());
}

#[test]
fn clashing_names_are_rejected_before_writing() {
    let dir = tmp_dir("clash");
    let arrays = vec![
        (PathKey::parse("a").unwrap(), Array::scalar(1.0)),
        (PathKey::parse("a.b").unwrap(), Array::scalar(2.0)),
    ];
    let path = dir.join("clash.json");
    assert!(save(Format::Json, &path, &arrays).is_err());
    assert!(!path.exists());
}

#[test]
fn corrupt_keyed_file_is_an_error() {
    let dir = tmp_dir("corrupt");
    let path = dir.join("out.dybk");
    save(Format::Keyed, &path, &sample()).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();
    assert!(load(Format::Keyed, &path).is_err());

    std::fs::write(&path, b"NOTKEYED\x01\x00\x00\x00\x00\x00").unwrap();
    assert!(load(Format::Keyed, &path).is_err());
}

#[test]
fn overflowing_shapes_are_rejected() {
    let dir = tmp_dir("overflow");
    let json = dir.join("big.json");
    std::fs::write(
        &json,
        r#"{"format":"dyb","version":1,"root":{"type":"group","children":{
            "big":{"type":"dataset","shape":[4294967296,4294967296,4294967296],"data":[]}}}}"#,
    )
    .unwrap();
    let err = load(Format::Json, &json).unwrap_err();
    assert!(err.to_string().contains("overflows"), "{err}");

    let tree = dir.join("tree");
    std::fs::create_dir_all(&tree).unwrap();
    std::fs::write(tree.join("big.tsv"), "# shape: 4294967296 4294967296 4294967296\n").unwrap();
    let err = load(Format::Tsv { compressed: false }, &tree).unwrap_err();
    assert!(err.to_string().contains("overflows"), "{err}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn keyed_preserves_bits(values in prop::collection::vec(any::<f64>(), 0..64)) {
        let dir = tmp_dir("prop");
        let path = dir.join("p.dybk");
        let arrays = vec![(PathKey::parse("v").unwrap(), Array::vector(values.clone()))];
        save(Format::Keyed, &path, &arrays).unwrap();
        let back = load(Format::Keyed, &path).unwrap();
        let got: Vec<u64> = back[0].1.data().iter().map(|v| v.to_bits()).collect();
        let want: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
        prop_assert_eq!(got, want);
    }
}
