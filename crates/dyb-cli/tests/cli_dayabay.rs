use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dayabay"))
}

fn tmp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("dayabay_cli_{}_{}_{}", std::process::id(), nanos, name));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn success(args: &[&str]) -> String {
    let out = run(args);
    assert!(
        out.status.success(),
        "{args:?} should succeed, stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).unwrap()
}

fn json(args: &[&str]) -> serde_json::Value {
    serde_json::from_str(&success(args)).expect("stdout should be JSON")
}

fn written(stdout: &str) -> Vec<PathBuf> {
    stdout.lines().filter_map(|l| l.strip_prefix("Write: ")).map(PathBuf::from).collect()
}

#[test]
fn version_smoke() {
    let stdout = success(&["version"]);
    assert!(stdout.starts_with("dayabay "), "unexpected stdout: {stdout}");
}

#[test]
fn print_prefix_table() {
    let stdout = success(&["print", "-p", "outputs.statistic", "-p", "parameters.free"]);
    assert!(stdout.contains("outputs.statistic.full.pull.chi2cnp"));
    assert!(stdout.contains("parameters.free.survival_probability.SinSq2Theta13"));
    assert!(!stdout.contains("parameters.constant"));
}

#[test]
fn print_unknown_prefix_fails() {
    let out = run(&["print", "-p", "outputs.nothing"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("outputs.nothing"));
}

#[test]
fn switch_data_round_trip() {
    for extra in [&[][..], &["--by-index"][..]] {
        let mut args = vec!["switch-data"];
        args.extend_from_slice(extra);
        let v = json(&args);
        let steps = v["steps"].as_array().unwrap();
        let names: Vec<&str> = steps.iter().map(|s| s["source"].as_str().unwrap()).collect();
        assert_eq!(names, ["asimov", "real", "asimov"]);
        let values: Vec<f64> = steps.iter().map(|s| s["value"].as_f64().unwrap()).collect();
        assert_eq!(values[0], 0.0);
        assert!(values[1] > 0.0);
        assert_eq!(v["reproducible"], serde_json::Value::Bool(true));
    }
}

#[test]
fn access_scan_restores_parameter() {
    let v = json(&["access", "--points", "11"]);
    assert_eq!(v["parameter"], "parameters.all.survival_probability.SinSq2Theta13");
    assert_eq!(v["initial"], v["restored"]);
    assert_eq!(v["scan"].as_array().unwrap().len(), 11);
    assert_eq!(v["outputs"], serde_json::json!(["AD11", "AD12", "AD21", "AD31"]));
    assert_eq!(v["spectra"].as_array().unwrap().len(), 3);
    let best = v["minimum"]["value"].as_f64().unwrap();
    assert!((best - 0.08).abs() < 1e-9, "minimum at {best}");
}

#[test]
fn par_overrides_apply() {
    let stdout = success(&[
        "parameters",
        "text",
        "-p",
        "parameters.free",
        "--par",
        "SinSq2Theta13",
        "0.12",
    ]);
    let line = stdout.lines().find(|l| l.contains("SinSq2Theta13")).unwrap();
    assert!(line.contains("0.12"), "{line}");

    let out = run(&["print", "--par", "AD11", "1.0"]);
    assert!(!out.status.success());
}

#[test]
fn export_is_deterministic() {
    let a = tmp_path("a.dybk");
    let b = tmp_path("b.dybk");
    for target in [&a, &b] {
        let stdout = success(&["export", target.to_str().unwrap(), "--format", "root"]);
        assert_eq!(written(&stdout), vec![target.clone()]);
    }
    assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
}

#[test]
fn generate_data_then_load_it() {
    let dir = tmp_path("data");
    let stdout = success(&["generate-data", dir.to_str().unwrap(), "--format", "tsv", "--seed", "3"]);
    assert!(written(&stdout).len() >= 10);

    let path_data = dir.to_str().unwrap();
    let from_file =
        json(&["switch-data", "--path-data", path_data, "--source-type", "tsv", "--seed", "99"]);
    let synthetic = json(&["switch-data", "--seed", "3"]);
    assert_eq!(from_file["steps"][1]["value"], synthetic["steps"][1]["value"]);
}

#[test]
fn config_file_sets_options() {
    let config = tmp_path("model.yaml");
    std::fs::write(&config, "seed: 3\nparameter_values:\n  - [SinSq2Theta13, 0.1]\n").unwrap();
    let stdout = success(&["parameters", "datax", "--config", config.to_str().unwrap()]);
    assert!(stdout.contains(r"\pgfkeyssetvalue{/datax/survival_probability.SinSq2Theta13}{0.1}"));

    // flags override the file
    let v = json(&["switch-data", "--config", config.to_str().unwrap(), "--seed", "4"]);
    let seeded = json(&["switch-data", "--seed", "4", "--par", "SinSq2Theta13", "0.1"]);
    assert_eq!(v["steps"][1]["value"], seeded["steps"][1]["value"]);
}

#[test]
fn parameters_latex_split() {
    let dir = tmp_path("latex");
    let stdout = success(&["parameters", "latex", dir.to_str().unwrap()]);
    let files = written(&stdout);
    let names: Vec<String> =
        files.iter().map(|f| f.file_name().unwrap().to_string_lossy().into_owned()).collect();
    for group in ["background.tex", "detector.tex", "reactor.tex", "survival_probability.tex"] {
        assert!(names.iter().any(|n| n == group), "missing {group} in {names:?}");
    }
    let tex = std::fs::read_to_string(dir.join("survival_probability.tex")).unwrap();
    assert!(tex.contains(r"$\sin^22\theta_{13}$"));
}

#[test]
fn plot_selected_sources() {
    let folder = tmp_path("plots");
    let stdout = success(&[
        "plot",
        "--plot",
        folder.to_str().unwrap(),
        "outputs.eventscount.final.detector",
        "--min-size",
        "2",
    ]);
    let files = written(&stdout);
    assert_eq!(files.len(), 4);
    let ad31 = folder.join("outputs/eventscount/final/detector/AD31.svg");
    assert!(files.contains(&ad31), "{files:?}");
    assert!(std::fs::read_to_string(ad31).unwrap().starts_with("<svg"));

    let out = run(&["plot"]);
    assert!(!out.status.success());
}

#[test]
fn graphs_of_selected_sources() {
    let folder = tmp_path("graphs");
    let stdout = success(&[
        "graphs",
        "--graphs",
        folder.to_str().unwrap(),
        "outputs.eventscount.final.detector",
        "--min-depth",
        "-1",
        "--max-depth",
        "1",
    ]);
    let files = written(&stdout);
    assert_eq!(files.len(), 4);
    let ad31 = folder.join("outputs/eventscount/final/detector/AD31.dot");
    assert!(files.contains(&ad31), "{files:?}");
    let dot = std::fs::read_to_string(ad31).unwrap();
    assert!(dot.starts_with("digraph \"outputs.eventscount.final.detector.AD31\""));
    assert!(dot.contains("outputs.eventscount.ibd.AD31"));
    assert!(dot.contains("outputs.eventscount.final.concatenated"));

    assert!(!run(&["graphs"]).status.success());
    assert!(!run(&["graphs", "--all", folder.to_str().unwrap(), "--max-depth", "-1"]).status.success());
}

#[test]
fn covariance_summary() {
    let svg = tmp_path("cov.svg");
    let out = success(&["covariance", "--svg", svg.to_str().unwrap()]);
    let json_start = out.find('{').unwrap();
    let v: serde_json::Value = serde_json::from_str(&out[json_start..]).unwrap();
    let n = v["size"].as_u64().unwrap() as usize;
    assert_eq!(v["matrix"].as_array().unwrap().len(), n);
    assert_eq!(v["parameters"].as_array().unwrap().len(), 12);
    assert!(v["sigma"].as_array().unwrap().iter().all(|s| s.as_f64().unwrap() > 0.0));
    assert!(svg.exists());
}
