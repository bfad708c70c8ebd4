use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dyb_core::Array;
use dyb_graph::{Model, ModelBuilder, NodeSpec, ParameterSpec};
use std::hint::black_box;

/// `width` independent chains of `depth` nodes, all scaled by one parameter.
fn make_model(width: usize, depth: usize) -> Model {
    let mut b = ModelBuilder::new();
    b.parameter("scale", ParameterSpec::free(1.0)).unwrap();
    b.input("inputs.x", Array::vector((0..64).map(|i| i as f64).collect())).unwrap();
    for w in 0..width {
        let mut prev = "inputs.x".to_string();
        for d in 0..depth {
            let path = format!("chains.c{w}.n{d}");
            b.node(
                path.as_str(),
                NodeSpec::new(|i| {
                    let s = i.scalar(0)?;
                    Ok(i.node(0)?.map(|v| v * s + 1.0))
                })
                .depends_on([prev.as_str()])
                .parameters(["parameters.all.scale"]),
            )
            .unwrap();
            prev = path;
        }
    }
    b.build().unwrap()
}

fn bench_invalidate_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_invalidation");

    for (width, depth) in [(4usize, 8usize), (16, 16), (64, 8)] {
        let mut model = make_model(width, depth);
        let leaf = format!("chains.c0.n{}", depth - 1);
        let id = format!("{width}x{depth}");
        group.bench_function(BenchmarkId::new("set_and_read_one_leaf", &id), |b| {
            let mut flip = false;
            b.iter(|| {
                flip = !flip;
                let v = if flip { 1.0 } else { 1.5 };
                model.parameter("parameters.all.scale").unwrap().set_value(v).unwrap();
                black_box(model.get_or_compute(leaf.as_str()).unwrap().len())
            })
        });
        group.bench_function(BenchmarkId::new("evaluate_all", &id), |b| {
            b.iter(|| {
                model.parameter("parameters.all.scale").unwrap().push(2.0).unwrap();
                let n = model.evaluate("chains").unwrap();
                model.parameter("parameters.all.scale").unwrap().pop().unwrap();
                black_box(n)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_invalidate_recompute);
criterion_main!(benches);
