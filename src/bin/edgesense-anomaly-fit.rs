//! Fit the anomaly detector on processed training features and save it.

use std::path::PathBuf;

use edgesense::anomaly::AnomalyDetector;
use edgesense::config::Config;
use edgesense::dataset::ProcessedDataset;
use edgesense::labels::DiseaseLabel;
use edgesense::{app_dirs, logging};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct CliOptions {
    processed: Option<PathBuf>,
    out: Option<PathBuf>,
    all_labels: bool,
    config: Option<PathBuf>,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init() {
        eprintln!("file logging disabled: {err}");
    }
    let config = Config::load(options.config.as_deref()).map_err(|err| err.to_string())?;
    let processed_dir = options.processed.clone().unwrap_or_else(|| config.processed_dir());
    let dataset = ProcessedDataset::read(&processed_dir).map_err(|err| err.to_string())?;

    let rows: Vec<Vec<f32>> = dataset
        .train
        .rows()
        .zip(dataset.train.labels())
        .filter(|(_, label)| options.all_labels || **label == DiseaseLabel::Normal)
        .map(|(row, _)| row.to_vec())
        .collect();
    if rows.is_empty() {
        return Err("No training rows to fit on (try --all-labels)".to_string());
    }

    let mut detector = AnomalyDetector::new(config.anomaly.clone()).map_err(|err| err.to_string())?;
    detector.fit_rows(&rows).map_err(|err| err.to_string())?;
    let mut normal = 0usize;
    for row in &rows {
        let verdict = detector.evaluate_row(row).map_err(|err| err.to_string())?;
        if !verdict.is_anomaly() {
            normal += 1;
        }
    }

    let out = match options.out.clone().or_else(|| config.anomaly_path()) {
        Some(path) => path,
        None => app_dirs::models_dir()
            .map_err(|err| err.to_string())?
            .join("anomaly.json"),
    };
    detector.save(&out).map_err(|err| err.to_string())?;
    println!(
        "fitted on {} rows; {:.1}% scored normal; saved {}",
        rows.len(),
        100.0 * normal as f64 / rows.len() as f64,
        out.display()
    );
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        let mut value = || {
            idx += 1;
            args.get(idx)
                .map(PathBuf::from)
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag {
            "-h" | "--help" => return Err(help_text()),
            "--processed" => options.processed = Some(value()?),
            "--out" => options.out = Some(value()?),
            "--config" => options.config = Some(value()?),
            "--all-labels" => options.all_labels = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "edgesense-anomaly-fit",
        "",
        "Usage:",
        "  edgesense-anomaly-fit [options]",
        "",
        "Options:",
        "  --processed <dir>  Processed dataset (default: config dataset.processed_dir).",
        "  --out <file>       Output blob (default: config models.anomaly or <app dir>/models/anomaly.json).",
        "  --all-labels       Fit on every training row instead of Normal rows only.",
        "  --config <file>    Config file (default: <app dir>/edgesense.toml).",
    ]
    .join("\n")
}
