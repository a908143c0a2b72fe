//! Labeled clip discovery: `root/<label dir>/*.{wav,mp3}` trees and CSV manifests.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use super::DatasetError;
use crate::audio::{self, NormalizedAudio};
use crate::labels::DiseaseLabel;

const AUDIO_EXTENSIONS: [&str; 2] = ["wav", "mp3"];

/// One normalized recording with its label.
#[derive(Debug, Clone)]
pub struct LabeledClip {
    pub path: PathBuf,
    pub label: DiseaseLabel,
    pub audio: NormalizedAudio,
}

/// Load every `*.wav`/`*.mp3` under `root/<label dir>/`, labels in output order.
///
/// Missing label directories and unreadable files are skipped with a warning.
pub fn load_directory(root: &Path) -> Result<Vec<LabeledClip>, DatasetError> {
    if !root.is_dir() {
        return Err(DatasetError::MissingDirectory(root.to_path_buf()));
    }
    let mut clips = Vec::new();
    for label in DiseaseLabel::ALL {
        let dir = root.join(label.dir_name());
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "label directory not found");
            continue;
        }
        let files = audio_files_in(&dir)?;
        info!(label = %label, files = files.len(), "loading label directory");
        for path in files {
            if let Some(clip) = load_clip(path, label) {
                clips.push(clip);
            }
        }
    }
    Ok(clips)
}

#[derive(Debug, Deserialize)]
struct ManifestRow {
    file_path: String,
    label: String,
}

/// Load clips listed in a `file_path,label` CSV.
///
/// Relative paths resolve against the CSV's directory. An unknown label is an
/// error; an unreadable file is skipped with a warning.
pub fn load_manifest_csv(path: &Path) -> Result<Vec<LabeledClip>, DatasetError> {
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut clips = Vec::new();
    for (idx, row) in reader.deserialize::<ManifestRow>().enumerate() {
        let row = row?;
        let label = DiseaseLabel::parse(&row.label).ok_or_else(|| DatasetError::UnknownLabel {
            row: idx + 1,
            label: row.label.clone(),
        })?;
        let file = PathBuf::from(&row.file_path);
        let file = if file.is_absolute() { file } else { base.join(file) };
        if let Some(clip) = load_clip(file, label) {
            clips.push(clip);
        }
    }
    info!(path = %path.display(), clips = clips.len(), "loaded CSV manifest");
    Ok(clips)
}

fn load_clip(path: PathBuf, label: DiseaseLabel) -> Option<LabeledClip> {
    match audio::load_normalized(&path) {
        Ok(audio) => Some(LabeledClip { path, label, audio }),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unreadable audio file");
            None
        }
    }
}

fn audio_files_in(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let entries = fs::read_dir(dir).map_err(|source| DatasetError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && has_audio_extension(path))
        .collect();
    files.sort();
    Ok(files)
}

fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
