//! Criterion benchmarks for full model runs through `Model::compute`.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kiln_arena::{CircularArena, ExecutionContext};
use kiln_bench::{layered_model, PROFILE_METADATA, PROFILE_RAM};
use kiln_core::PoolKind;
use kiln_runtime::Model;
use kiln_test_utils::{MockTensorReader, MockTensorWriter};

fn bench_compute(c: &mut Criterion, layers: usize, width: usize) {
    let model = Model::new(layered_model(layers, width)).unwrap();
    let mut meta = CircularArena::<PROFILE_METADATA>::new(PoolKind::Metadata).unwrap();
    let mut ram = CircularArena::<PROFILE_RAM>::new(PoolKind::Ram).unwrap();
    let mut ctx = ExecutionContext::new(&mut meta, &mut ram).unwrap();
    let input: Vec<u8> = (0..width).map(|i| (i * 37 % 251) as u8).collect();
    let reader = MockTensorReader::new().with_tensor("input", input);
    let mut writer = MockTensorWriter::new().with_tensor("output", width);

    c.bench_function(&format!("model_compute_{layers}x{width}"), |b| {
        b.iter(|| {
            let report = model.compute(&mut ctx, &reader, &mut writer).unwrap();
            black_box(report.peak);
        });
    });
}

/// Benchmark: a shallow, narrow model dominated by step dispatch.
fn bench_compute_small(c: &mut Criterion) {
    bench_compute(c, 4, 16);
}

/// Benchmark: a deeper model with 256-wide activations.
fn bench_compute_wide(c: &mut Criterion) {
    bench_compute(c, 16, 256);
}

/// Benchmark: plan validation alone.
fn bench_validate(c: &mut Criterion) {
    c.bench_function("model_validate_32x64", |b| {
        b.iter(|| black_box(Model::new(layered_model(32, 64)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_compute_small,
    bench_compute_wide,
    bench_validate
);
criterion_main!(benches);
