//! Narration output backends
//!
//! [`AudioOutput`] is the seam between the player and a sound device.
//! [`CpalOutput`] fetches, decodes and caches clips, then plays them through
//! a cpal output stream owned by a dedicated thread.

use super::decode::decode_clip;
use super::device::{get_device_display_name, resolve_device, DeviceKind};
use super::format::{resample_mono, upmix};
use super::{AudioClip, AudioError, SourceFetcher};
use cpal::traits::{DeviceTrait, StreamTrait};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Poll interval while a clip is playing
const PLAYBACK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Extra time allowed for the device buffer to drain after the last sample
const DRAIN_GRACE: Duration = Duration::from_millis(150);

/// A sink that can load and play narration clips
///
/// `play` resolves once the clip has been fully rendered. `halt` cuts off
/// whatever is currently sounding; dropping a `play` future must have the
/// same effect.
pub trait AudioOutput: Send + Sync + 'static {
    fn load(&self, uri: &str) -> impl Future<Output = Result<AudioClip, AudioError>> + Send;

    fn play(&self, uri: &str, clip: AudioClip)
        -> impl Future<Output = Result<(), AudioError>> + Send;

    fn halt(&self);
}

/// Sets a halt flag when dropped
struct HaltOnDrop(Arc<AtomicBool>);

impl Drop for HaltOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Speaker output through cpal
pub struct CpalOutput {
    fetcher: SourceFetcher,
    cache: Mutex<HashMap<String, AudioClip>>,
    device_id: Option<String>,
    volume: f32,
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl CpalOutput {
    pub fn new(fetcher: SourceFetcher, device_id: Option<String>, volume: f32) -> Self {
        Self {
            fetcher,
            cache: Mutex::new(HashMap::new()),
            device_id,
            volume,
            current: Mutex::new(None),
        }
    }

    /// Number of decoded clips held in memory
    pub fn cached_clips(&self) -> usize {
        self.cache.lock().len()
    }
}

impl AudioOutput for CpalOutput {
    async fn load(&self, uri: &str) -> Result<AudioClip, AudioError> {
        let cached = self.cache.lock().get(uri).cloned();
        if let Some(clip) = cached {
            tracing::debug!("Clip cache hit: {}", uri);
            return Ok(clip);
        }

        let (bytes, extension) = self.fetcher.fetch(uri).await?;
        let clip = tokio::task::spawn_blocking(move || decode_clip(bytes, extension.as_deref()))
            .await
            .map_err(|e| AudioError::load(uri, format!("Decoder task failed: {}", e)))?
            .map_err(|e| AudioError::load(uri, e))?;

        self.cache.lock().insert(uri.to_string(), clip.clone());
        Ok(clip)
    }

    async fn play(&self, uri: &str, clip: AudioClip) -> Result<(), AudioError> {
        let halt = Arc::new(AtomicBool::new(false));
        let previous = self.current.lock().replace(halt.clone());
        if let Some(previous) = previous {
            previous.store(true, Ordering::SeqCst);
        }
        let _guard = HaltOnDrop(halt.clone());

        let (done_tx, done_rx) = oneshot::channel();
        let device_id = self.device_id.clone();
        let volume = self.volume;

        std::thread::Builder::new()
            .name("reflex-playback".to_string())
            .spawn(move || {
                let result = render_clip(&clip, device_id.as_deref(), volume, &halt);
                let _ = done_tx.send(result);
            })
            .map_err(|e| AudioError::playback(uri, e))?;

        match done_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(AudioError::playback(uri, reason)),
            Err(_) => Err(AudioError::playback(uri, "Playback thread exited unexpectedly")),
        }
    }

    fn halt(&self) {
        if let Some(flag) = self.current.lock().take() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Render a clip on the default (or configured) output device
///
/// Blocks until the clip has played out or `halt` is raised.
fn render_clip(
    clip: &AudioClip,
    device_id: Option<&str>,
    volume: f32,
    halt: &AtomicBool,
) -> Result<(), String> {
    let device = resolve_device(DeviceKind::Output, device_id)
        .ok_or_else(|| "No output device available".to_string())?;
    let supported = device
        .default_output_config()
        .map_err(|e| format!("No usable output config: {}", e))?;

    let device_rate = supported.sample_rate();
    let channels = supported.channels() as usize;
    tracing::debug!(
        "Playback on '{}': {}Hz, {} channels",
        get_device_display_name(&device),
        device_rate,
        channels
    );

    let mono = resample_mono(&clip.samples, clip.sample_rate, device_rate)?;
    let frames: Arc<[f32]> = upmix(&mono, channels, volume).into();
    let total = frames.len();

    let position = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicBool::new(false));

    let callback_frames = frames.clone();
    let callback_position = position.clone();
    let error_flag = failed.clone();

    let stream = device
        .build_output_stream(
            &supported.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let start = callback_position.load(Ordering::Relaxed);
                let available = total.saturating_sub(start).min(data.len());
                data[..available].copy_from_slice(&callback_frames[start..start + available]);
                data[available..].fill(0.0);
                callback_position.store(start + available, Ordering::Relaxed);
            },
            move |err| {
                tracing::error!("Audio output stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| format!("Failed to open output stream: {}", e))?;

    stream
        .play()
        .map_err(|e| format!("Failed to start output stream: {}", e))?;

    while position.load(Ordering::Relaxed) < total {
        if halt.load(Ordering::SeqCst) {
            tracing::debug!("Playback halted");
            return Ok(());
        }
        if failed.load(Ordering::SeqCst) {
            return Err("Output device reported an error".to_string());
        }
        std::thread::sleep(PLAYBACK_POLL_INTERVAL);
    }

    if !halt.load(Ordering::SeqCst) {
        std::thread::sleep(DRAIN_GRACE);
    }
    drop(stream);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halt_on_drop_sets_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        drop(HaltOnDrop(flag.clone()));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_halt_without_playback_is_noop() {
        let output = CpalOutput::new(SourceFetcher::new(None), None, 1.0);
        output.halt();
        output.halt();
        assert_eq!(output.cached_clips(), 0);
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let output = CpalOutput::new(SourceFetcher::new(None), None, 1.0);
        let result = output.load("/nonexistent/narration.mp3").await;
        assert!(matches!(result, Err(AudioError::Load { .. })));
        assert_eq!(output.cached_clips(), 0);
    }

    #[tokio::test]
    async fn test_load_caches_decoded_clip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("line.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..800 {
            writer.write_sample(1000i16).unwrap();
        }
        writer.finalize().unwrap();

        let output = CpalOutput::new(SourceFetcher::new(Some(dir.path().to_path_buf())), None, 1.0);
        let clip = output.load("line.wav").await.unwrap();
        assert_eq!(clip.sample_rate, 8000);
        assert_eq!(clip.duration(), Duration::from_millis(100));
        assert_eq!(output.cached_clips(), 1);

        // Second load is served from the cache even after the file is gone
        std::fs::remove_file(&path).unwrap();
        assert_eq!(output.load("line.wav").await.unwrap(), clip);
    }
}
