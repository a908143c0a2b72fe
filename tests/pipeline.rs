mod support;

use edgesense::analysis::{
    CANONICAL_TIME_FRAMES, FEATURE_BINS, FeatureExtractor, FeatureRequest, extract_features,
};
use edgesense::audio::{self, TARGET_LEN, TARGET_SAMPLE_RATE};
use support::fixtures::{breathing, sine, write_wav_f32};
use tempfile::tempdir;

#[test]
fn decoded_file_matches_in_memory_normalization() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("clip.wav");
    let samples = sine(440.0, 44_100, 1.5, 0.4);
    write_wav_f32(&path, &samples, 44_100, 2);

    let loaded = audio::load_normalized(&path).unwrap();
    let direct = audio::normalize(&samples, 44_100).unwrap();
    assert_eq!(loaded.len(), TARGET_LEN);
    assert_eq!(loaded, direct);
    let peak = loaded.samples().iter().fold(0.0_f32, |m, s| m.max(s.abs()));
    assert!((peak - 1.0).abs() < 1e-6);
}

#[test]
fn any_rate_and_length_yields_the_canonical_tensor() {
    for (rate, seconds) in [(8_000, 0.5), (22_050, 3.0), (48_000, 7.0), (16_000, 3.0)] {
        let clip = audio::normalize(&sine(300.0, rate, seconds, 0.8), rate).unwrap();
        let tensor = extract_features(&clip).unwrap();
        assert_eq!(tensor.shape(), (CANONICAL_TIME_FRAMES, FEATURE_BINS, 1), "rate {rate}");
        assert!(tensor.view().iter().all(|v| v.is_finite()));
    }
}

#[test]
fn extraction_is_bit_for_bit_reproducible() {
    let clip = audio::normalize(&breathing(TARGET_SAMPLE_RATE, 3.0, 0.5), TARGET_SAMPLE_RATE).unwrap();
    let a = FeatureExtractor::new().unwrap().extract(&clip).unwrap();
    let b = FeatureExtractor::new().unwrap().extract(&clip).unwrap();
    assert_eq!(a.flatten(), b.flatten());
}

#[test]
fn silent_clip_is_finite() {
    let clip = audio::normalize(&vec![0.0; 12_000], TARGET_SAMPLE_RATE).unwrap();
    assert!(clip.is_silent());
    let tensor = extract_features(&clip).unwrap();
    assert!(tensor.view().iter().all(|v| v.is_finite()));
}

#[test]
fn bundle_fills_requested_features_only() {
    let extractor = FeatureExtractor::new().unwrap();
    let clip = audio::normalize(&breathing(TARGET_SAMPLE_RATE, 3.0, 0.5), TARGET_SAMPLE_RATE).unwrap();
    let bundle = extractor
        .bundle(
            &clip,
            FeatureRequest {
                mfcc: true,
                breathing: true,
                ..FeatureRequest::default()
            },
        )
        .unwrap();
    assert!(bundle.mfcc.is_some());
    assert!(bundle.breathing.is_some());
    assert!(bundle.chroma.is_none());
    assert!(bundle.spectral.is_none());

    let all = extractor.bundle(&clip, FeatureRequest::all()).unwrap();
    assert!(all.mel_spectrogram.is_some() && all.chroma.is_some() && all.spectral.is_some());
}

#[test]
fn bundle_reports_breathing_rate_of_slow_cycle() {
    let extractor = FeatureExtractor::new().unwrap();
    let clip = audio::normalize(&sine(0.5, TARGET_SAMPLE_RATE, 3.0, 0.8), TARGET_SAMPLE_RATE).unwrap();
    let bundle = extractor
        .bundle(
            &clip,
            FeatureRequest {
                breathing: true,
                ..FeatureRequest::default()
            },
        )
        .unwrap();
    let cadence = bundle.breathing.unwrap();
    assert_eq!(cadence.cycle_count, 3);
    assert!((cadence.breaths_per_minute - 60.0).abs() < 1e-3);
    assert!(cadence.regularity < 0.15, "regularity {}", cadence.regularity);
}
