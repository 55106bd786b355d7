//! Narration clip decoding
//!
//! Uses symphonia for format-agnostic decoding (MP3, M4A, OGG, FLAC, WAV).
//! Clips are mixed down to mono at their native rate; resampling to the
//! output device happens at playback time.

use super::format::downmix;
use super::AudioClip;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Maximum clip size accepted for decoding (50 MB)
pub const MAX_CLIP_BYTES: usize = 50 * 1024 * 1024;

/// Decode an in-memory audio file into a mono clip
///
/// `extension` is a format hint taken from the clip's URI, if any.
pub fn decode_clip(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioClip, String> {
    if bytes.len() > MAX_CLIP_BYTES {
        return Err(format!(
            "Clip is too large ({:.0} MB). Maximum supported size is {} MB.",
            bytes.len() as f64 / (1024.0 * 1024.0),
            MAX_CLIP_BYTES / (1024 * 1024)
        ));
    }

    let mut reader = open_reader(bytes, extension)?;
    let (track_id, params) = reader
        .default_track()
        .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .or_else(|| {
            reader
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        })
        .map(|t| (t.id, t.codec_params.clone()))
        .ok_or_else(|| "Clip has no playable track".to_string())?;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| "Clip does not declare a sample rate".to_string())?;
    let channels = params.channels.map_or(1, |c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| format!("Unsupported codec: {}", e))?;

    let mono = decode_track(reader.as_mut(), decoder.as_mut(), track_id, channels)?;
    if mono.is_empty() {
        return Err("Clip contains no audio".to_string());
    }

    let clip = AudioClip::new(sample_rate, mono);
    tracing::debug!(
        "Decoded clip: {}Hz, {} channels, {:.2}s",
        sample_rate,
        channels,
        clip.duration().as_secs_f64()
    );
    Ok(clip)
}

fn open_reader(bytes: Vec<u8>, extension: Option<&str>) -> Result<Box<dyn FormatReader>, String> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map(|probed| probed.format)
        .map_err(|e| format!("Unrecognised audio container: {}", e))
}

/// Pull every packet of one track through the decoder, mixing down to mono
fn decode_track(
    reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
    channels: usize,
) -> Result<Vec<f32>, String> {
    let mut mono = Vec::new();
    let mut scratch: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(mono);
            }
            Err(SymphoniaError::ResetRequired) => return Ok(mono),
            Err(e) => return Err(format!("Failed to read packet: {}", e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        // Corrupt frames are skipped; narration with a glitch is still usable
        let buffer = match decoder.decode(&packet) {
            Ok(buffer) => buffer,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("Skipping undecodable frame: {}", e);
                continue;
            }
            Err(SymphoniaError::IoError(_)) => continue,
            Err(e) => return Err(format!("Failed to decode packet: {}", e)),
        };

        let frames = buffer.capacity();
        let spec = *buffer.spec();
        // SampleBuffer capacity counts interleaved samples, not frames
        let needed = frames * spec.channels.count();
        let interleaved = match &mut scratch {
            Some(existing) if existing.capacity() >= needed => existing,
            slot => slot.insert(SampleBuffer::new(frames as u64, spec)),
        };
        interleaved.copy_interleaved_ref(buffer);
        mono.extend(downmix(interleaved.samples(), channels));
    }
}
