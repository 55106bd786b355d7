//! Sample format conversion using rubato
//!
//! Narration clips are decoded at whatever rate they were mastered at and
//! must be brought to the output device's native rate and channel layout.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Chunk size for the rubato resampler (frames per call)
const RESAMPLE_CHUNK_SIZE: usize = 1024;

/// Mono resampler between two fixed rates
pub struct AudioConverter {
    resampler: SincFixedIn<f32>,
    chunk_size: usize,
}

impl AudioConverter {
    /// Create a new converter
    ///
    /// # Arguments
    /// * `source_rate` - Rate the clip was decoded at (e.g., 44100)
    /// * `target_rate` - Rate of the output device (e.g., 48000)
    /// * `chunk_size` - Size of input chunks in frames (e.g., 1024)
    pub fn new(
        source_rate: u32,
        target_rate: u32,
        chunk_size: usize,
    ) -> Result<Self, rubato::ResamplerConstructionError> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::new(
            target_rate as f64 / source_rate as f64,
            2.0, // max_resample_ratio_relative
            params,
            chunk_size,
            1, // mono
        )?;

        Ok(Self {
            resampler,
            chunk_size,
        })
    }

    /// Resample one chunk; `input` must hold exactly `chunk_size` frames
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, rubato::ResampleError> {
        let waves_in = vec![input.to_vec()];
        let waves_out = self.resampler.process(&waves_in, None)?;
        Ok(waves_out.into_iter().next().unwrap_or_default())
    }

    /// Resample a whole clip, padding the final chunk with silence
    pub fn process_all(&mut self, samples: &[f32]) -> Result<Vec<f32>, rubato::ResampleError> {
        let mut output = Vec::with_capacity(samples.len());
        for chunk in samples.chunks(self.chunk_size) {
            if chunk.len() == self.chunk_size {
                output.extend(self.process(chunk)?);
            } else {
                let mut padded = chunk.to_vec();
                padded.resize(self.chunk_size, 0.0);
                output.extend(self.process(&padded)?);
            }
        }
        Ok(output)
    }
}

/// Bring a mono clip to `target_rate`
///
/// Returns the samples untouched when the rates already match.
pub fn resample_mono(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, String> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut converter = AudioConverter::new(source_rate, target_rate, RESAMPLE_CHUNK_SIZE)
        .map_err(|e| format!("Failed to create resampler: {}", e))?;
    converter
        .process_all(samples)
        .map_err(|e| format!("Resampling error: {}", e))
}

/// Mix interleaved frames down to mono
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Spread mono samples across `channels` interleaved output channels
pub fn upmix(samples: &[f32], channels: usize, gain: f32) -> Vec<f32> {
    let channels = channels.max(1);
    let mut out = Vec::with_capacity(samples.len() * channels);
    for &sample in samples {
        let scaled = (sample * gain).clamp(-1.0, 1.0);
        out.extend(std::iter::repeat(scaled).take(channels));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_new() {
        let converter = AudioConverter::new(44100, 48000, 1024);
        assert!(converter.is_ok());
    }

    #[test]
    fn test_downmix_stereo() {
        let stereo = vec![0.5, -0.5, 0.3, 0.1, 0.2, 0.2];
        let mono = downmix(&stereo, 2);
        assert_eq!(mono.len(), 3);
        assert!(mono[0].abs() < 0.0001);
        assert!((mono[1] - 0.2).abs() < 0.0001);
        assert!((mono[2] - 0.2).abs() < 0.0001);
    }

    #[test]
    fn test_upmix_applies_gain_and_clamps() {
        let out = upmix(&[0.5, 0.9], 2, 2.0);
        assert_eq!(out, vec![1.0, 1.0, 1.0, 1.0]);

        let out = upmix(&[0.5], 3, 0.5);
        assert_eq!(out, vec![0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_mono(&samples, 48000, 48000).unwrap(), samples);
    }

    #[test]
    fn test_resample_changes_length() {
        // One second at 16kHz should come out near one second at 48kHz
        let input: Vec<f32> = (0..16000).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let output = resample_mono(&input, 16000, 48000).unwrap();
        assert!(
            output.len() > 40000 && output.len() < 56000,
            "Expected ~48000 samples, got {}",
            output.len()
        );
    }
}
