use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use edgesense::analysis::{FeatureExtractor, FeatureRequest};
use edgesense::audio::{TARGET_SAMPLE_RATE, normalize};

fn clip(sample_rate: u32, seconds: f32) -> Vec<f32> {
    let len = (sample_rate as f32 * seconds) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (t * 440.0 * std::f32::consts::TAU).sin() * (0.5 + 0.5 * (t * 1.7).sin())
        })
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let native = clip(TARGET_SAMPLE_RATE, 3.0);
    let resampled = clip(44_100, 3.0);
    c.bench_function("normalize_16k_3s", |b| {
        b.iter(|| normalize(black_box(&native), TARGET_SAMPLE_RATE).expect("normalize"));
    });
    c.bench_function("normalize_44k_3s", |b| {
        b.iter(|| normalize(black_box(&resampled), 44_100).expect("normalize"));
    });
}

fn bench_extract(c: &mut Criterion) {
    let extractor = FeatureExtractor::new().expect("extractor");
    let audio = normalize(&clip(TARGET_SAMPLE_RATE, 3.0), TARGET_SAMPLE_RATE).expect("normalize");
    c.bench_function("extract_tensor_3s", |b| {
        b.iter(|| extractor.extract(black_box(&audio)).expect("extract"));
    });
    c.bench_function("feature_bundle_all_3s", |b| {
        b.iter(|| {
            extractor
                .bundle(black_box(&audio), FeatureRequest::all())
                .expect("bundle")
        });
    });
}

criterion_group!(benches, bench_normalize, bench_extract);
criterion_main!(benches);
