use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::{MediaSource, MediaSourceStream},
    meta::MetadataOptions,
    probe::Hint,
};
use thiserror::Error;
use tracing::debug;

use super::RawAudio;
use super::normalize::sanitize_sample;

/// Failure to turn a file or byte stream into samples.
#[derive(Debug, Error)]
pub enum AudioLoadError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unsupported or unreadable audio in {origin}: {source}")]
    Probe {
        origin: String,
        source: SymphoniaError,
    },
    #[error("No decodable audio track in {origin}")]
    NoTrack { origin: String },
    #[error("Missing sample rate for {origin}")]
    MissingSampleRate { origin: String },
    #[error("Decode failed for {origin}: {source}")]
    Decode {
        origin: String,
        source: SymphoniaError,
    },
    #[error("WAV read failed for {origin}: {source}")]
    Wav {
        origin: String,
        source: hound::Error,
    },
    #[error("Decoded 0 samples from {origin}")]
    Empty { origin: String },
}

/// Interleaved samples straight out of a decoder.
struct Interleaved {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

impl Interleaved {
    fn into_mono(self) -> RawAudio {
        RawAudio::new(
            downmix_to_mono(&self.samples, self.channels),
            self.sample_rate.max(1),
        )
    }
}

/// Decode an audio file into mono samples at its native rate.
///
/// WAV goes through `hound`; every other container goes through symphonia.
pub fn decode_file(path: &Path) -> Result<RawAudio, AudioLoadError> {
    let origin = path.display().to_string();
    let open_err = |source| AudioLoadError::Open {
        path: path.to_path_buf(),
        source,
    };
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let decoded = if extension.as_deref() == Some("wav") {
        let file = File::open(path).map_err(open_err)?;
        decode_wav(BufReader::new(file), &origin)?
    } else {
        let file = File::open(path).map_err(open_err)?;
        decode_with_symphonia(Box::new(file), extension.as_deref(), &origin)?
    };
    debug!(
        path = %origin,
        sample_rate = decoded.sample_rate,
        channels = decoded.channels,
        "decoded audio file"
    );
    Ok(decoded.into_mono())
}

/// Decode an in-memory byte stream (e.g. an uploaded file).
///
/// `extension_hint` is the original file extension, when known.
pub fn decode_bytes(bytes: Vec<u8>, extension_hint: Option<&str>) -> Result<RawAudio, AudioLoadError> {
    let origin = "<memory>".to_string();
    let hint = extension_hint.map(str::to_ascii_lowercase);
    let looks_like_wav = bytes.starts_with(b"RIFF") || hint.as_deref() == Some("wav");
    let decoded = if looks_like_wav {
        decode_wav(Cursor::new(bytes), &origin)?
    } else {
        decode_with_symphonia(Box::new(Cursor::new(bytes)), hint.as_deref(), &origin)?
    };
    Ok(decoded.into_mono())
}

fn decode_wav<R: Read>(reader: R, origin: &str) -> Result<Interleaved, AudioLoadError> {
    let wav_err = |source| AudioLoadError::Wav {
        origin: origin.to_string(),
        source,
    };
    let reader = hound::WavReader::new(reader).map_err(wav_err)?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(wav_err)?,
        hound::SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample);
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(wav_err)?
        }
    };
    if samples.is_empty() {
        return Err(AudioLoadError::Empty {
            origin: origin.to_string(),
        });
    }
    Ok(Interleaved {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels.max(1) as usize,
    })
}

fn int_scale(bits_per_sample: u16) -> f32 {
    let bits = bits_per_sample.clamp(1, 32) as i32;
    2.0_f32.powi(bits - 1)
}

fn decode_with_symphonia(
    source: Box<dyn MediaSource>,
    extension: Option<&str>,
    origin: &str,
) -> Result<Interleaved, AudioLoadError> {
    let mss = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|source| AudioLoadError::Probe {
            origin: origin.to_string(),
            source,
        })?;
    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioLoadError::NoTrack {
            origin: origin.to_string(),
        })?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|channels| channels.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|source| AudioLoadError::Decode {
            origin: origin.to_string(),
            source,
        })?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(_)) => break,
            Err(source) => {
                return Err(AudioLoadError::Decode {
                    origin: origin.to_string(),
                    source,
                });
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(source) => {
                return Err(AudioLoadError::Decode {
                    origin: origin.to_string(),
                    source,
                });
            }
        };
        let spec = *audio_buf.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count());
        let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(AudioLoadError::Empty {
            origin: origin.to_string(),
        });
    }
    let sample_rate = sample_rate.ok_or_else(|| AudioLoadError::MissingSampleRate {
        origin: origin.to_string(),
    })?;
    Ok(Interleaved {
        samples,
        sample_rate,
        channels: channels.unwrap_or(1).max(1),
    })
}

fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    if channels == 1 {
        return samples.iter().copied().map(sanitize_sample).collect();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().copied().map(sanitize_sample).sum::<f32>() / channels as f32)
        .collect()
}
