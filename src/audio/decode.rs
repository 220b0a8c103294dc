use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer as SymphoniaBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Longest stretch of a file kept for replay
pub const MAX_DECODE_SECONDS: u32 = 600;

/// Average interleaved frames down to one channel.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// A whole file decoded to mono.
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }
}

/// First decodable track of a file, ready to pull packets from.
struct AudioTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
}

fn open_track(path: &Path) -> Result<AudioTrack> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let format = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Unrecognised audio format: {}", path.display()))?
        .format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .with_context(|| format!("No audio track in {}", path.display()))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .with_context(|| format!("Unknown sample rate in {}", path.display()))?;
    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    Ok(AudioTrack {
        format,
        decoder,
        track_id,
        channels,
        sample_rate,
    })
}

/// Decode a file to mono, keeping at most [`MAX_DECODE_SECONDS`].
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    decode_file_limited(path, MAX_DECODE_SECONDS)
}

/// Decode a file to mono, keeping at most `max_seconds` of it.
///
/// Packets the codec rejects are skipped and counted rather than failing
/// the whole file.
pub fn decode_file_limited(path: &Path, max_seconds: u32) -> Result<DecodedAudio> {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mut track = open_track(path)?;
    let limit = track.sample_rate as usize * max_seconds as usize;

    let mut samples: Vec<f32> = Vec::new();
    let mut skipped = 0usize;

    while samples.len() < limit {
        let packet = match track.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("{}: failed to read packet", name));
            }
        };
        if packet.track_id() != track.track_id {
            continue;
        }

        let decoded = match track.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                log::debug!("{}: skipping packet at ts {}: {}", name, packet.ts(), reason);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("{}: decode failed", name)),
        };

        let spec = *decoded.spec();
        let mut interleaved = SymphoniaBuffer::<f32>::new(decoded.frames() as u64, spec);
        interleaved.copy_interleaved_ref(decoded);
        samples.extend(downmix_to_mono(interleaved.samples(), track.channels));
    }

    if samples.len() >= limit {
        samples.truncate(limit);
        log::warn!("{}: keeping only the first {}s", name, max_seconds);
    }
    if skipped > 0 {
        log::warn!("{}: skipped {} undecodable packets", name, skipped);
    }

    let audio = DecodedAudio {
        samples,
        sample_rate: track.sample_rate,
    };
    log::info!(
        "{}: {} mono samples at {} Hz ({:.1}s)",
        name,
        audio.samples.len(),
        audio.sample_rate,
        audio.duration_secs()
    );
    Ok(audio)
}
