mod support;

use edgesense::analysis::{CANONICAL_TIME_FRAMES, FeatureExtractor};
use edgesense::app_dirs;
use edgesense::config::Config;
use edgesense::dataset::{self, ProcessedDataset, Split, SplitOptions};
use edgesense::inference::InferenceEngine;
use edgesense::labels::DiseaseLabel;
use edgesense::metrics::ClassificationReport;
use support::env::ConfigHomeGuard;
use support::fixtures::{RowEnergyClassifier, sine, write_wav_f32};
use tempfile::tempdir;

#[test]
fn raw_corpus_to_processed_arrays_and_report() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw");
    let labels = [DiseaseLabel::Normal, DiseaseLabel::Asthma, DiseaseLabel::Pneumonia];
    for (class, label) in labels.iter().enumerate() {
        for i in 0..5 {
            let samples = sine(250.0 + 400.0 * class as f32 + 10.0 * i as f32, 8_000, 1.0, 0.5);
            write_wav_f32(&raw.join(label.dir_name()).join(format!("{i}.wav")), &samples, 8_000, 1);
        }
    }

    let clips = dataset::load_directory(&raw).unwrap();
    assert_eq!(clips.len(), 15);
    let extractor = FeatureExtractor::new().unwrap();
    let split = SplitOptions {
        test_fraction: 0.2,
        val_fraction: 0.2,
        seed: 42,
    };
    let processed = dataset::build_processed(&clips, &extractor, &split, None).unwrap();
    assert_eq!(processed.test.len(), 3);
    assert_eq!(processed.val.len(), 3);
    assert_eq!(processed.train.len(), 9);

    let out = dir.path().join("processed");
    processed.write(&out).unwrap();
    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join(dataset::MANIFEST_FILE)).unwrap()).unwrap();
    assert_eq!(manifest["time_frames"], CANONICAL_TIME_FRAMES);
    assert_eq!(manifest["counts"]["train"], 9);
    assert_eq!(manifest["labels"][2], "COPD");

    let loaded = ProcessedDataset::read(&out).unwrap();
    assert_eq!(loaded, processed);

    let engine = InferenceEngine::new(Box::new(RowEnergyClassifier)).unwrap();
    let test = loaded.split(Split::Test);
    let scores: Vec<Vec<f32>> = (0..test.len())
        .map(|idx| {
            let result = engine.predict_tensor(&test.tensor(idx).unwrap()).unwrap();
            result.probabilities.as_slice().to_vec()
        })
        .collect();
    let report = ClassificationReport::from_scores(test.labels(), &scores);
    assert_eq!(report.confusion.total(), 3);
    assert!((0.0..=1.0).contains(&report.accuracy));
}

#[test]
fn config_defaults_live_under_the_app_root() {
    let base = tempdir().unwrap();
    let _guard = ConfigHomeGuard::set(base.path());
    let root = app_dirs::app_root_dir().unwrap();
    assert_eq!(root, base.path().join(app_dirs::APP_DIR_NAME));

    let config = Config::load(None).unwrap();
    assert_eq!(config.classifier_path(), root.join("models/classifier.json"));
    assert_eq!(config.processed_dir(), root.join("data/processed"));

    std::fs::write(
        root.join(app_dirs::CONFIG_FILE_NAME),
        "[inference]\nserialize_classifier = true\n",
    )
    .unwrap();
    let config = Config::load(None).unwrap();
    assert!(config.inference.serialize_classifier);
    assert!(config.inference.parallel_batches);
}
