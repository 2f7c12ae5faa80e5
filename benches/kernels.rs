use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cypher_engine::error::CollectingErrorSink;
use cypher_engine::fx_components::simd::{kernels, scalar_kernels};
use cypher_engine::fx_components::ReverbParams;
use cypher_engine::{apply_effect, EffectKind, SampleRange};

const BLOCK: usize = 44_100;

fn signal() -> Vec<f32> {
    (0..BLOCK).map(|i| (i as f32 * 0.01).sin() * 0.5).collect()
}

fn bench_gain(c: &mut Criterion) {
    let mut group = c.benchmark_group("gain 1s mono");
    let mut buffer = signal();
    let scalar = scalar_kernels();
    let dispatched = kernels();
    group.bench_function("scalar", |b| {
        b.iter(|| (scalar.gain)(black_box(&mut buffer), 0.999))
    });
    group.bench_function(dispatched.name, |b| {
        b.iter(|| (dispatched.gain)(black_box(&mut buffer), 0.999))
    });
    group.finish();
}

fn bench_fade(c: &mut Criterion) {
    let mut group = c.benchmark_group("fade 1s mono");
    let mut buffer = signal();
    let step = 1.0 / BLOCK as f32;
    let scalar = scalar_kernels();
    let dispatched = kernels();
    group.bench_function("scalar", |b| {
        b.iter(|| (scalar.fade)(black_box(&mut buffer), 0.0, step))
    });
    group.bench_function(dispatched.name, |b| {
        b.iter(|| (dispatched.fade)(black_box(&mut buffer), 0.0, step))
    });
    group.finish();
}

fn bench_reverb(c: &mut Criterion) {
    let sink = CollectingErrorSink::new();
    let params = ReverbParams::new(SampleRange::full(BLOCK).unwrap(), 50.0, 0.4, 1.0, 0.7, 44_100, &sink)
        .unwrap()
        .into();
    let source = signal();
    c.bench_function("reverb 1s mono", |b| {
        b.iter(|| {
            let mut buffer = source.clone();
            apply_effect(&mut buffer, EffectKind::Reverb, &params, &sink);
            black_box(buffer)
        })
    });
}

criterion_group!(benches, bench_gain, bench_fade, bench_reverb);
criterion_main!(benches);
