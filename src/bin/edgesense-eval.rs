//! Evaluate a classifier on one split of a processed dataset.

use std::path::PathBuf;

use rayon::prelude::*;

use edgesense::classifier::load_classifier;
use edgesense::config::Config;
use edgesense::dataset::{ProcessedDataset, Split};
use edgesense::inference::InferenceEngine;
use edgesense::logging;
use edgesense::metrics::ClassificationReport;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug)]
struct CliOptions {
    model: Option<PathBuf>,
    processed: Option<PathBuf>,
    split: Split,
    config: Option<PathBuf>,
    json: bool,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init() {
        eprintln!("file logging disabled: {err}");
    }
    let config = Config::load(options.config.as_deref()).map_err(|err| err.to_string())?;
    let model_path = options.model.clone().unwrap_or_else(|| config.classifier_path());
    let classifier = load_classifier(&model_path, config.inference.serialize_classifier)
        .map_err(|err| format!("{}: {err}", model_path.display()))?;
    let engine = InferenceEngine::new(classifier).map_err(|err| err.to_string())?;

    let processed_dir = options.processed.clone().unwrap_or_else(|| config.processed_dir());
    let dataset = ProcessedDataset::read(&processed_dir).map_err(|err| err.to_string())?;
    let split = dataset.split(options.split);
    if split.is_empty() {
        return Err(format!("Split {} is empty", options.split));
    }

    let scores = (0..split.len())
        .into_par_iter()
        .map(|idx| {
            let tensor = split
                .tensor(idx)
                .ok_or_else(|| format!("row {idx} is malformed"))?;
            engine
                .predict_tensor(&tensor)
                .map(|result| result.probabilities.as_slice().to_vec())
                .map_err(|err| format!("row {idx}: {err}"))
        })
        .collect::<Result<Vec<_>, String>>()?;

    let report = ClassificationReport::from_scores(split.labels(), &scores);
    if options.json {
        println!("{}", serde_json::to_string_pretty(&report).map_err(|err| err.to_string())?);
    } else {
        println!("split: {} ({} rows)\n", options.split, split.len());
        print!("{}", report.render());
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions {
        model: None,
        processed: None,
        split: Split::Test,
        config: None,
        json: false,
    };
    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        let mut value = || {
            idx += 1;
            args.get(idx)
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag {
            "-h" | "--help" => return Err(help_text()),
            "--model" => options.model = Some(PathBuf::from(value()?)),
            "--processed" => options.processed = Some(PathBuf::from(value()?)),
            "--config" => options.config = Some(PathBuf::from(value()?)),
            "--split" => {
                let raw = value()?;
                options.split =
                    Split::parse(&raw).ok_or_else(|| format!("Invalid --split value: {raw}"))?;
            }
            "--json" => options.json = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "edgesense-eval",
        "",
        "Usage:",
        "  edgesense-eval [options]",
        "",
        "Options:",
        "  --model <classifier.json>  Classifier model (default: from config).",
        "  --processed <dir>          Processed dataset (default: config dataset.processed_dir).",
        "  --split <train|val|test>   Split to evaluate (default: test).",
        "  --json                     Print the report as JSON.",
        "  --config <file>            Config file (default: <app dir>/edgesense.toml).",
    ]
    .join("\n")
}
