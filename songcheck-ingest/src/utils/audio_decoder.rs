//! Audio probing
//!
//! Decodes an audio file with symphonia and measures how much audio it holds.
//! Samples are counted, not kept, so probing a long mix stays cheap on memory.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Measured properties of a decodable audio file
#[derive(Debug, Clone, PartialEq)]
pub struct AudioProbe {
    /// Decoded frames (samples per channel)
    pub frames: u64,
    pub sample_rate: u32,
    pub channels: usize,
    pub duration: Duration,
}

/// Decode `file_path` end to end and report its duration
///
/// Blocking; call from `spawn_blocking` in async code.
///
/// # Errors
/// * File I/O errors
/// * Unsupported format or no audio track
/// * Corrupt packet data
pub fn probe_audio(file_path: &Path) -> Result<AudioProbe> {
    tracing::debug!(path = %file_path.display(), "Probing audio file");

    let file = std::fs::File::open(file_path)
        .with_context(|| format!("Failed to open audio file: {}", file_path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = file_path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio file: {}", file_path.display()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found in file")?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Sample rate unknown")?;
    if sample_rate == 0 {
        anyhow::bail!("Sample rate is zero: {}", file_path.display());
    }
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("Failed to create decoder for: {}", file_path.display()))?;

    let mut frames: u64 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                return Err(anyhow::anyhow!("Error reading packet: {}", e));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => frames += decoded.frames() as u64,
            // A damaged packet is skipped; symphonia can resync on the next one
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(path = %file_path.display(), error = %e, "Skipping undecodable packet");
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to decode packet in {}: {}",
                    file_path.display(),
                    e
                ));
            }
        }
    }

    let duration = Duration::from_secs_f64(frames as f64 / sample_rate as f64);

    tracing::debug!(
        path = %file_path.display(),
        frames = frames,
        sample_rate = sample_rate,
        duration_ms = duration.as_millis() as u64,
        "Audio probe complete"
    );

    Ok(AudioProbe {
        frames,
        sample_rate,
        channels,
        duration,
    })
}
