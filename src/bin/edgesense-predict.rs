//! Classify audio files and print one JSON result per file.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::warn;

use edgesense::analysis::{FEATURE_BINS, HOP_LENGTH, N_FFT, N_MELS, N_MFCC};
use edgesense::anomaly::AnomalyDetector;
use edgesense::audio::{TARGET_DURATION_SECONDS, TARGET_SAMPLE_RATE};
use edgesense::classifier::{Classifier, PooledLogRegClassifier, SerializedClassifier, load_classifier};
use edgesense::config::Config;
use edgesense::inference::{InferenceEngine, PredictionResult};
use edgesense::labels::DiseaseLabel;
use edgesense::logging;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct CliOptions {
    model: Option<PathBuf>,
    anomaly: Option<PathBuf>,
    config: Option<PathBuf>,
    labels: bool,
    info: bool,
    files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct TimedPrediction<'a> {
    file: String,
    #[serde(flatten)]
    result: &'a PredictionResult,
    inference_time_ms: f64,
}

#[derive(Serialize)]
struct ModelInfo {
    input_shape: (usize, usize, usize),
    labels: Vec<DiseaseLabel>,
    sample_rate: u32,
    duration_seconds: f64,
    n_mfcc: usize,
    n_mels: usize,
    n_fft: usize,
    hop_length: usize,
    feature_bins: usize,
    anomaly_detector: bool,
    anomaly_threshold: Option<f32>,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if options.labels {
        let names: Vec<&str> = DiseaseLabel::ALL.iter().map(|label| label.as_str()).collect();
        println!("{}", serde_json::to_string(&names).map_err(|err| err.to_string())?);
        return Ok(());
    }
    if let Err(err) = logging::init() {
        eprintln!("file logging disabled: {err}");
    }
    let config = Config::load(options.config.as_deref()).map_err(|err| err.to_string())?;
    let engine = build_engine(&config, &options)?;

    if options.info {
        let info = ModelInfo {
            input_shape: engine.classifier().input_shape(),
            labels: engine.classifier().labels().to_vec(),
            sample_rate: TARGET_SAMPLE_RATE,
            duration_seconds: TARGET_DURATION_SECONDS,
            n_mfcc: N_MFCC,
            n_mels: N_MELS,
            n_fft: N_FFT,
            hop_length: HOP_LENGTH,
            feature_bins: FEATURE_BINS,
            anomaly_detector: engine.anomaly().is_some(),
            anomaly_threshold: engine.anomaly().and_then(AnomalyDetector::threshold),
        };
        println!("{}", serde_json::to_string_pretty(&info).map_err(|err| err.to_string())?);
        return Ok(());
    }
    if options.files.is_empty() {
        return Err(format!("No input files\n\n{}", help_text()));
    }

    let predict = |path: &PathBuf| {
        let started = Instant::now();
        let result = engine.predict_file(path);
        (result, started.elapsed().as_secs_f64() * 1000.0)
    };
    let outcomes: Vec<_> = if config.inference.parallel_batches {
        options.files.par_iter().map(predict).collect()
    } else {
        options.files.iter().map(predict).collect()
    };

    let mut failed = 0usize;
    for (path, (outcome, elapsed_ms)) in options.files.iter().zip(outcomes) {
        match outcome {
            Ok(result) => {
                let line = TimedPrediction {
                    file: path.display().to_string(),
                    result: &result,
                    inference_time_ms: elapsed_ms,
                };
                println!("{}", serde_json::to_string(&line).map_err(|err| err.to_string())?);
            }
            Err(err) => {
                failed += 1;
                eprintln!("{}: {err}", path.display());
            }
        }
    }
    if failed > 0 {
        return Err(format!("{failed} of {} files failed", options.files.len()));
    }
    Ok(())
}

fn build_engine(config: &Config, options: &CliOptions) -> Result<InferenceEngine, String> {
    let serialize = config.inference.serialize_classifier;
    let classifier: Box<dyn Classifier> = match &options.model {
        Some(path) => load_classifier(path, serialize).map_err(|err| err.to_string())?,
        None => {
            let path = config.classifier_path();
            if path.is_file() {
                load_classifier(&path, serialize).map_err(|err| err.to_string())?
            } else {
                warn!(path = %path.display(), "classifier model not found, using bundled baseline");
                bundled(serialize)
            }
        }
    };
    let engine = InferenceEngine::new(classifier).map_err(|err| err.to_string())?;
    let anomaly_path = options.anomaly.clone().or_else(|| config.anomaly_path());
    match anomaly_path {
        Some(path) => attach_anomaly(engine, &path),
        None => Ok(engine),
    }
}

fn bundled(serialize: bool) -> Box<dyn Classifier> {
    let model = PooledLogRegClassifier::bundled();
    if serialize {
        Box::new(SerializedClassifier::new(model))
    } else {
        Box::new(model)
    }
}

fn attach_anomaly(engine: InferenceEngine, path: &Path) -> Result<InferenceEngine, String> {
    let detector = AnomalyDetector::load(path).map_err(|err| format!("{}: {err}", path.display()))?;
    engine.with_anomaly(detector).map_err(|err| err.to_string())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--model" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--model requires a value".to_string())?;
                options.model = Some(PathBuf::from(value));
            }
            "--anomaly" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--anomaly requires a value".to_string())?;
                options.anomaly = Some(PathBuf::from(value));
            }
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                options.config = Some(PathBuf::from(value));
            }
            "--labels" => options.labels = true,
            "--info" => options.info = true,
            flag if flag.starts_with("--") => {
                return Err(format!("Unknown argument: {flag}\n\n{}", help_text()));
            }
            file => options.files.push(PathBuf::from(file)),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "edgesense-predict",
        "",
        "Usage:",
        "  edgesense-predict [options] <audio file>...",
        "",
        "Options:",
        "  --model <classifier.json>  Classifier model (default: from config).",
        "  --anomaly <anomaly.json>   Anomaly detector (default: from config, if set).",
        "  --config <edgesense.toml>  Config file (default: <app dir>/edgesense.toml).",
        "  --labels                   Print the label list and exit.",
        "  --info                     Print model and feature details and exit.",
    ]
    .join("\n")
}
