//! Load a labeled corpus, split it and write the processed feature arrays.

use std::path::PathBuf;

use tracing::info;

use edgesense::analysis::FeatureExtractor;
use edgesense::config::Config;
use edgesense::dataset::{self, AugmentOptions};
use edgesense::logging;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct CliOptions {
    raw: Option<PathBuf>,
    out: Option<PathBuf>,
    csv: Option<PathBuf>,
    augment: bool,
    config: Option<PathBuf>,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init() {
        eprintln!("file logging disabled: {err}");
    }
    let config = Config::load(options.config.as_deref()).map_err(|err| err.to_string())?;
    let out_dir = options.out.clone().unwrap_or_else(|| config.processed_dir());

    let clips = match &options.csv {
        Some(csv) => dataset::load_manifest_csv(csv),
        None => dataset::load_directory(&options.raw.clone().unwrap_or_else(|| config.raw_dir())),
    }
    .map_err(|err| err.to_string())?;
    if clips.is_empty() {
        return Err("No readable audio files found".to_string());
    }
    info!(clips = clips.len(), "loaded corpus");

    let extractor = FeatureExtractor::new().map_err(|err| err.to_string())?;
    let augment = options.augment.then(|| AugmentOptions {
        seed: config.dataset.seed,
        ..AugmentOptions::default()
    });
    let processed = dataset::build_processed(
        &clips,
        &extractor,
        &config.dataset.split_options(),
        augment.as_ref(),
    )
    .map_err(|err| err.to_string())?;
    processed.write(&out_dir).map_err(|err| err.to_string())?;

    println!(
        "train={} val={} test={} -> {}",
        processed.train.len(),
        processed.val.len(),
        processed.test.len(),
        out_dir.display()
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
            "--raw" => options.raw = Some(value()?),
            "--out" => options.out = Some(value()?),
            "--csv" => options.csv = Some(value()?),
            "--config" => options.config = Some(value()?),
            "--augment" => options.augment = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "edgesense-preprocess",
        "",
        "Usage:",
        "  edgesense-preprocess [options]",
        "",
        "Options:",
        "  --raw <dir>        Label-directory corpus (default: config dataset.raw_dir).",
        "  --csv <file>       CSV manifest with file_path,label columns instead of --raw.",
        "  --out <dir>        Output directory (default: config dataset.processed_dir).",
        "  --augment          Add stretched, pitch-shifted and noisy training variants.",
        "  --config <file>    Config file (default: <app dir>/edgesense.toml).",
    ]
    .join("\n")
}
