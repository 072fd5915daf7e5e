//! Audio test fixture generator
//!
//! Writes WAV files with hound so pipeline tests never need real recordings.

use std::path::{Path, PathBuf};

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 2.0,
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// Generate a WAV file holding a 440Hz tone
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_samples = (config.duration_seconds * config.sample_rate as f64) as usize;

    for i in 0..total_samples {
        let t = i as f32 / config.sample_rate as f32;
        let sample = (0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin() * i16::MAX as f32) as i16;
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}

/// Two-second tone at the given path
pub fn tone(path: &Path) -> PathBuf {
    generate_test_wav(path, &AudioConfig::default()).expect("write test wav")
}

/// Tone of `seconds` as raw WAV bytes
pub fn tone_bytes(seconds: f64) -> Vec<u8> {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("tone.wav");
    generate_test_wav(
        &path,
        &AudioConfig {
            duration_seconds: seconds,
            ..Default::default()
        },
    )
    .expect("write test wav");
    std::fs::read(&path).expect("read test wav")
}
