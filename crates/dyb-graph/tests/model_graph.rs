use std::path::PathBuf;

use approx::assert_relative_eq;
use dyb_core::{Array, Error};
use dyb_graph::{
    Entry, GraphOptions, Item, Model, ModelBuilder, NodeSpec, NodeStatus, ParameterSpec,
};
use proptest::prelude::*;

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("dyb_graph_{}_{}_{}", name, std::process::id(), nanos));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn elementwise(f: fn(f64, f64) -> f64) -> impl Fn(&dyb_graph::Inputs<'_>) -> dyb_core::Result<Array> {
    move |i| {
        let a = i.node(0)?;
        let b = i.node(1)?;
        Ok(Array::vector(a.data().iter().zip(b.data()).map(|(x, y)| f(*x, *y)).collect()))
    }
}

/// x -> scaled(gain) -> shifted(offset) -> asimov (frozen) -> proxy -> chi2
///                                       real ---------------^
fn toy_model() -> Model {
    let mut b = ModelBuilder::new();
    b.parameter("gain", ParameterSpec::free(2.0)).unwrap();
    b.parameter("offset", ParameterSpec::constrained(1.0, 0.1)).unwrap();
    b.parameter("unused", ParameterSpec::constant(5.0)).unwrap();

    b.input("inputs.x", Array::vector(vec![1.0, 2.0, 3.0])).unwrap();
    b.node(
        "outputs.scaled",
        NodeSpec::new(|i| {
            let g = i.scalar(0)?;
            Ok(i.node(0)?.map(|v| v * g))
        })
        .depends_on(["inputs.x"])
        .parameters(["parameters.all.gain"]),
    )
    .unwrap();
    b.node(
        "outputs.shifted",
        NodeSpec::new(|i| {
            let o = i.scalar(0)?;
            Ok(i.node(0)?.map(|v| v + o))
        })
        .depends_on([("outputs", "scaled")])
        .parameters(["parameters.constrained.offset"]),
    )
    .unwrap();
    b.node(
        "outputs.other",
        NodeSpec::new(|i| Ok(i.node(0)?.map(|v| v + 1.0))).depends_on(["inputs.x"]),
    )
    .unwrap();

    b.node(
        "data.asimov",
        NodeSpec::new(|i| Ok(i.node(0)?.clone())).depends_on(["outputs.shifted"]).frozen(true),
    )
    .unwrap();
    b.input("data.real", Array::vector(vec![4.0, 4.0, 8.0])).unwrap();
    b.switch("data.proxy", [("asimov", "data.asimov"), ("real", "data.real")]).unwrap();
    b.data_switch("data.proxy").unwrap();

    b.node(
        "stat.chi2",
        NodeSpec::new(|i| {
            let d = i.node(0)?;
            let e = i.node(1)?;
            let chi2 = d.data().iter().zip(e.data()).map(|(d, e)| (d - e).powi(2) / e).sum::<f64>();
            Ok(Array::scalar(chi2))
        })
        .depends_on(["data.proxy", "outputs.shifted"]),
    )
    .unwrap();
    b.node(
        "stat.residual",
        NodeSpec::new(elementwise(|a, b| a - b)).depends_on(["data.proxy", "outputs.shifted"]),
    )
    .unwrap();
    b.covariance("cov.syst", "outputs.shifted", ["parameters.all.offset"]).unwrap();
    b.build().unwrap()
}

fn evals(model: &Model, path: &str) -> u64 {
    model.node_info(path).unwrap().evaluations
}

fn chi2(model: &mut Model) -> f64 {
    model.get_or_compute("stat.chi2").unwrap().as_scalar().unwrap()
}

#[test]
fn reads_are_lazy_and_cached() {
    let mut m = toy_model();
    assert_eq!(evals(&m, "outputs.scaled"), 0);

    assert_eq!(m.get_or_compute("outputs.shifted").unwrap().data(), &[3.0, 5.0, 7.0]);
    assert_eq!(evals(&m, "outputs.scaled"), 1);
    assert_eq!(evals(&m, "outputs.shifted"), 1);
    assert_eq!(evals(&m, "outputs.other"), 0);

    m.get_or_compute("outputs.shifted").unwrap();
    assert_eq!(evals(&m, "outputs.shifted"), 1);
}

#[test]
fn parameter_change_invalidates_only_dependents() {
    let mut m = toy_model();
    m.evaluate("outputs").unwrap();
    assert_eq!(m.node_info("outputs.other").unwrap().status, NodeStatus::Fresh);

    m.parameter("parameters.all.gain").unwrap().set_value(3.0).unwrap();
    assert_eq!(m.node_info("outputs.scaled").unwrap().status, NodeStatus::Stale);
    assert_eq!(m.node_info("outputs.shifted").unwrap().status, NodeStatus::Stale);
    assert_eq!(m.node_info("outputs.other").unwrap().status, NodeStatus::Fresh);

    assert_eq!(m.get_or_compute("outputs.shifted").unwrap().data(), &[4.0, 7.0, 10.0]);
    assert_eq!(evals(&m, "outputs.other"), 1);
    assert_eq!(evals(&m, "outputs.scaled"), 2);
}

#[test]
fn setting_the_same_value_keeps_caches() {
    let mut m = toy_model();
    m.get_or_compute("outputs.shifted").unwrap();
    m.parameter("parameters.all.gain").unwrap().set_value(2.0).unwrap();
    assert_eq!(m.node_info("outputs.shifted").unwrap().status, NodeStatus::Fresh);
}

#[test]
fn push_pop_round_trip_is_bit_identical() {
    let mut m = toy_model();
    m.switch_data("real").unwrap();
    let before = chi2(&mut m);

    {
        let mut gain = m.parameter("parameters.free.gain").unwrap();
        gain.push(2.5).unwrap();
        assert_eq!(gain.depth(), 1);
    }
    let staged = chi2(&mut m);
    assert_ne!(staged.to_bits(), before.to_bits());

    m.parameter("parameters.all.gain").unwrap().pop().unwrap();
    assert_eq!(chi2(&mut m).to_bits(), before.to_bits());

    let err = m.parameter("parameters.all.gain").unwrap().pop().unwrap_err();
    assert!(matches!(err, Error::EmptyStagingStack(_)));
}

#[test]
fn switch_bounds_are_enforced() {
    let mut m = toy_model();
    let mut sw = m.switch("data.proxy").unwrap();
    sw.switch_input(1).unwrap();
    assert_eq!(sw.current_name(), "real");
    sw.switch_input(0).unwrap();

    for bad in [2, -1] {
        let err = sw.switch_input(bad).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { len: 2, .. }), "{err}");
    }
    assert_eq!(sw.selected_index(), 0);
    assert_eq!(sw.available(), &["asimov".to_string(), "real".to_string()]);

    let err = sw.switch_by_name("toy").unwrap_err();
    assert!(matches!(err, Error::UnknownSourceName { .. }));
}

#[test]
fn asimov_real_asimov_reproduces_statistic() {
    let mut m = toy_model();
    let asimov = chi2(&mut m);
    assert_relative_eq!(asimov, 0.0);

    m.switch_data("real").unwrap();
    let real = chi2(&mut m);
    assert!(real > 0.0);

    m.switch_data("asimov").unwrap();
    assert_eq!(chi2(&mut m).to_bits(), asimov.to_bits());
    assert_eq!(m.data_switch().unwrap().current_name(), "asimov");
}

#[test]
fn switch_only_pulls_the_selected_input() {
    let mut m = toy_model();
    m.switch_data("real").unwrap();
    m.get_or_compute("data.proxy").unwrap();
    assert_eq!(evals(&m, "data.asimov"), 0);
    assert_eq!(evals(&m, "outputs.shifted"), 0);
}

#[test]
fn unselected_switch_input_does_not_invalidate_downstream() {
    let mut b = ModelBuilder::new();
    b.parameter("p", ParameterSpec::free(1.0)).unwrap();
    b.input("a", Array::vector(vec![10.0])).unwrap();
    b.input("c", Array::vector(vec![20.0])).unwrap();
    b.node(
        "bnode",
        NodeSpec::new(|i| {
            let p = i.scalar(0)?;
            Ok(i.node(0)?.map(|v| v * p))
        })
        .depends_on(["c"])
        .parameters(["parameters.all.p"]),
    )
    .unwrap();
    b.switch("sw", [("a", "a"), ("b", "bnode")]).unwrap();
    b.node("out", NodeSpec::new(|i| Ok(i.node(0)?.map(|v| v + 1.0))).depends_on(["sw"])).unwrap();
    let mut m = b.build().unwrap();

    assert_eq!(m.get_or_compute("out").unwrap().data(), &[11.0]);
    assert_eq!(evals(&m, "out"), 1);

    m.parameter("parameters.all.p").unwrap().set_value(2.0).unwrap();
    m.replace_input("c", Array::vector(vec![30.0])).unwrap();
    assert_eq!(m.node_info("sw").unwrap().status, NodeStatus::Fresh);
    assert_eq!(m.get_or_compute("out").unwrap().data(), &[11.0]);
    assert_eq!(evals(&m, "out"), 1);
    assert_eq!(evals(&m, "bnode"), 0);

    // the deferred change is picked up once the input is selected
    m.switch("sw").unwrap().switch_by_name("b").unwrap();
    assert_eq!(m.get_or_compute("out").unwrap().data(), &[61.0]);
    assert_eq!(evals(&m, "out"), 2);

    m.parameter("parameters.all.p").unwrap().set_value(3.0).unwrap();
    assert_eq!(m.get_or_compute("out").unwrap().data(), &[91.0]);
    assert_eq!(evals(&m, "out"), 3);
}

#[test]
fn frozen_node_blocks_invalidation_until_updated() {
    let mut m = toy_model();
    assert_relative_eq!(chi2(&mut m), 0.0);

    m.parameter("parameters.all.gain").unwrap().set_value(3.0).unwrap();
    assert_eq!(m.node_info("data.asimov").unwrap().status, NodeStatus::Fresh);
    assert_eq!(m.get_or_compute("data.asimov").unwrap().data(), &[3.0, 5.0, 7.0]);
    assert!(chi2(&mut m) > 0.0);

    assert_eq!(m.update_frozen_nodes().unwrap(), 1);
    assert_eq!(m.get_or_compute("data.asimov").unwrap().data(), &[4.0, 7.0, 10.0]);
    assert_relative_eq!(chi2(&mut m), 0.0);
    assert_eq!(m.update_frozen_nodes().unwrap(), 0);
}

#[test]
fn covariance_from_staged_variations() {
    let mut m = toy_model();
    assert!(m.get_or_compute("cov.syst").is_err());

    m.update_covariance_matrix().unwrap();
    let cov = m.get_or_compute("cov.syst").unwrap().clone();
    assert_eq!(cov.shape(), &[3, 3]);
    // d/d(offset) shifts every bin by sigma
    for v in cov.data() {
        assert_relative_eq!(*v, 0.01, epsilon = 1e-12);
    }

    let offset = m.parameter_ref("parameters.all.offset").unwrap();
    assert_eq!(offset.value().as_scalar(), Some(1.0));
    assert_eq!(offset.depth(), 0);
}

#[test]
fn set_from_config_resolves_suffixes() {
    let mut m = toy_model();
    m.set_from_config("gain", "4").unwrap();
    assert_eq!(m.parameter_ref("parameters.free.gain").unwrap().value().as_scalar(), Some(4.0));

    m.set_from_config("parameters.all.offset", "0.5").unwrap();
    assert_eq!(m.get_or_compute("outputs.shifted").unwrap().data(), &[4.5, 8.5, 12.5]);

    let err = m.set_from_config("nope", "1").unwrap_err();
    assert!(matches!(err, Error::AmbiguousOrUnknownParameter { ref candidates, .. } if candidates.is_empty()));
    assert!(m.set_from_config("gain", "x").is_err());
}

#[test]
fn ambiguous_parameter_names_list_candidates() {
    let mut b = ModelBuilder::new();
    b.parameter("detector.eff", ParameterSpec::constrained(1.0, 0.01)).unwrap();
    b.parameter("background.eff", ParameterSpec::constrained(1.0, 0.05)).unwrap();
    let mut m = b.build().unwrap();

    let err = m.set_from_config("eff", "1.1").unwrap_err();
    match err {
        Error::AmbiguousOrUnknownParameter { candidates, .. } => {
            assert_eq!(
                candidates,
                vec!["parameters.all.detector.eff", "parameters.all.background.eff"]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    m.set_from_config("detector.eff", "1.1").unwrap();
}

#[test]
fn cycles_and_missing_dependencies_are_rejected() {
    let mut b = ModelBuilder::new();
    b.node("a", NodeSpec::new(|i| Ok(i.node(0)?.clone())).depends_on(["b"])).unwrap();
    b.node("b", NodeSpec::new(|i| Ok(i.node(0)?.clone())).depends_on(["a"])).unwrap();
    match b.build().unwrap_err() {
        Error::CyclicDependency(cycle) => assert_eq!(cycle, "a -> b -> a"),
        other => panic!("unexpected error: {other}"),
    }

    let mut b = ModelBuilder::new();
    b.node("a", NodeSpec::new(|i| Ok(i.node(0)?.clone())).depends_on(["missing.node"])).unwrap();
    assert!(matches!(b.build().unwrap_err(), Error::KeyNotFound(k) if k == "missing.node"));

    let mut b = ModelBuilder::new();
    assert!(matches!(
        b.node("a", NodeSpec::new(|_| Ok(Array::scalar(0.0))).depends_on(["x..y"])),
        Err(Error::InvalidPath(_))
    ));
}

#[test]
fn lookup_forms_and_views() {
    let mut m = toy_model();
    assert!(matches!(m.get("parameters.constant.unused").unwrap(), Entry::Item(Item::Parameter(_))));
    assert_eq!(m.get_or_compute(["parameters", "all", "unused"]).unwrap().as_scalar(), Some(5.0));
    assert!(m.get_or_compute("outputs").is_err());
    assert!(matches!(m.get("outputs.nothing"), Err(Error::KeyNotFound(_))));

    let keys: Vec<String> = m.view("outputs").unwrap().keys().map(|k| k.to_dotted()).collect();
    assert_eq!(keys, vec!["outputs.scaled", "outputs.shifted", "outputs.other"]);

    let records = m.parameter_records("parameters").unwrap();
    assert_eq!(records.len(), 3);
}

#[test]
fn export_and_render_subtree() {
    let mut m = toy_model();
    let dir = tmp_dir("export");

    let target = dir.join("outputs.json");
    let written = m.export("outputs", "json".parse().unwrap(), &target).unwrap();
    assert_eq!(written, vec![target.clone()]);
    let first = std::fs::read(&target).unwrap();
    m.export("outputs", "json".parse().unwrap(), &target).unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), first);

    m.update_covariance_matrix().unwrap();
    let options = dyb_graph::RenderOptions { min_size: 3, ..Default::default() };
    let plots = m.render("", &dir.join("plots"), &options).unwrap();
    assert!(plots.iter().any(|p| p.ends_with("outputs/shifted.svg")));
    assert!(plots.iter().all(|p| !p.ends_with("stat/chi2.svg")));
    assert!(plots.iter().all(|p| p.exists()));

    let table = m.to_table("outputs", &Default::default()).unwrap();
    assert!(table.contains("outputs.shifted"));
}

#[test]
fn dependency_neighbourhood_as_dot() {
    let m = toy_model();
    let id = |path: &str| m.node_id(path).unwrap().index();
    let options = GraphOptions::default();

    let dot = m.subgraph_dot("outputs.shifted", &options).unwrap();
    assert!(dot.starts_with("digraph \"outputs.shifted\" {"));
    assert!(dot.trim_end().ends_with('}'));
    for (from, to) in [
        ("inputs.x", "outputs.scaled"),
        ("outputs.scaled", "outputs.shifted"),
        ("outputs.shifted", "data.asimov"),
        ("outputs.shifted", "stat.chi2"),
    ] {
        let edge = format!("n{} -> n{};", id(from), id(to));
        assert!(dot.contains(&edge), "missing {from} -> {to} in\n{dot}");
    }
    assert!(dot.contains("parameters.all.gain"));
    assert!(dot.contains("parameters.all.offset"));
    assert!(!dot.contains("parameters.all.unused"));
    // two levels downstream is outside the window
    assert!(!dot.contains("data.proxy"));
    assert_eq!(m.subgraph_dot(("outputs", "shifted"), &options).unwrap(), dot);

    let narrow = GraphOptions { min_depth: -1, max_depth: 0, parameters: false };
    let dot = m.subgraph_dot("data.proxy", &narrow).unwrap();
    assert!(dot.contains(&format!("n{} -> n{};", id("data.asimov"), id("data.proxy"))));
    assert!(dot.contains(&format!("n{} -> n{} [style=dashed];", id("data.real"), id("data.proxy"))));
    assert!(!dot.contains("stat.chi2"));

    assert!(m.subgraph_dot("parameters.all.gain", &options).is_err());
    let inverted = GraphOptions { min_depth: 1, ..Default::default() };
    assert!(m.subgraph_dot("outputs.shifted", &inverted).is_err());
}

#[test]
fn save_graphs_mirrors_the_storage() {
    let m = toy_model();
    let dir = tmp_dir("graphs");
    let written = m.save_graphs("stat", &dir, &GraphOptions::default()).unwrap();
    assert_eq!(written, vec![dir.join("chi2.dot"), dir.join("residual.dot")]);
    let text = std::fs::read_to_string(&written[0]).unwrap();
    assert!(text.starts_with("digraph \"stat.chi2\""));

    let all = m.save_graphs("", &dir.join("all"), &GraphOptions::default()).unwrap();
    assert_eq!(all.len(), m.n_nodes());
    assert!(dir.join("all").join("outputs").join("shifted.dot").is_file());
}

proptest! {
    #[test]
    fn nested_staging_restores_statistic(values in proptest::collection::vec(0.5f64..4.0, 1..8)) {
        let mut m = toy_model();
        m.switch_data("real").unwrap();
        let before = chi2(&mut m);
        for v in &values {
            m.parameter("parameters.all.gain").unwrap().push(*v).unwrap();
            chi2(&mut m);
        }
        for _ in &values {
            m.parameter("parameters.all.gain").unwrap().pop().unwrap();
        }
        prop_assert_eq!(chi2(&mut m).to_bits(), before.to_bits());
    }
}
