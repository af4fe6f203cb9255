use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mfe_orchestrator::module::registry::{ActivationPlan, ModuleDescriptor, ModuleRegistry};
use mfe_orchestrator::module::GateEvaluator;

/// Layered graph: every module depends on up to three modules of the layer below
fn layered_registry(layers: usize, width: usize) -> ModuleRegistry {
    let mut descriptors = Vec::with_capacity(layers * width);
    for layer in 0..layers {
        for i in 0..width {
            let name = format!("l{}-m{}", layer, i);
            let deps: Vec<String> = if layer == 0 {
                Vec::new()
            } else {
                (0..3)
                    .map(|k| format!("l{}-m{}", layer - 1, (i + k) % width))
                    .collect()
            };
            let mut descriptor = ModuleDescriptor::normal(&name, format!("{}.js", name))
                .with_priority((i % 5) as i32)
                .with_dependencies(deps);
            if i % 7 == 0 {
                descriptor = descriptor.with_feature_flags(["experimental"]);
            }
            descriptors.push(descriptor);
        }
    }
    ModuleRegistry::from_descriptors(descriptors).unwrap()
}

fn benchmark_plan_build(c: &mut Criterion) {
    let gate = GateEvaluator::deny_all();
    let mut group = c.benchmark_group("activation_plan_build");

    for (layers, width) in [(4, 10), (8, 25), (16, 50)] {
        let registry = layered_registry(layers, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(layers * width),
            &registry,
            |b, registry| {
                b.iter(|| black_box(ActivationPlan::build(black_box(registry), &gate)).unwrap());
            },
        );
    }
    group.finish();
}

fn benchmark_manifest_parse(c: &mut Criterion) {
    let entries: Vec<String> = (0..200)
        .map(|i| {
            format!(
                r#"{{"name":"m{i}","loadType":"normal","loadPriority":{p},"remoteEntry":"https://cdn/m{i}.js","dependencies":[{d}]}}"#,
                i = i,
                p = i % 4,
                d = if i == 0 { String::new() } else { format!("\"m{}\"", i - 1) }
            )
        })
        .collect();
    let json = format!(r#"{{"modules":[{}]}}"#, entries.join(","));

    c.bench_function("manifest_parse_200", |b| {
        b.iter(|| {
            let manifest =
                mfe_orchestrator::module::ModuleManifest::from_json_str(black_box(&json)).unwrap();
            black_box(ModuleRegistry::from_manifest(manifest)).unwrap();
        })
    });
}

criterion_group!(benches, benchmark_plan_build, benchmark_manifest_parse);
criterion_main!(benches);
