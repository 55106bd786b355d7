//! Microphone access through cpal
//!
//! The utterance itself is not kept: the stream exists so the device is
//! genuinely held (and its indicator lit) for the length of the prompt.
//! cpal streams are not `Send` on every platform, so each one lives on its
//! own thread and is torn down when the handle is dropped.

use super::{CaptureDevice, RecordingError};
use crate::audio::device::{get_device_display_name, resolve_device, DeviceKind};
use cpal::traits::{DeviceTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How often the holder thread checks its stop flag
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for the device to confirm the stream started
const OPEN_TIMEOUT: Duration = Duration::from_secs(3);

/// The system microphone
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    device_id: Option<String>,
}

impl CpalMicrophone {
    pub fn new(device_id: Option<String>) -> Self {
        Self { device_id }
    }
}

/// An open input stream; dropping it releases the microphone
pub struct MicrophoneStream {
    stop_signal: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        let Some(thread) = self.thread.take() else {
            return;
        };

        let frames = self.frames.clone();
        let join = move || {
            if thread.join().is_err() {
                tracing::error!("Microphone thread panicked");
            }
            tracing::debug!(
                "Microphone released after {} frames",
                frames.load(Ordering::Relaxed)
            );
        };

        // Closing a cpal stream can block; keep that off the async workers
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => drop(runtime.spawn_blocking(join)),
            Err(_) => join(),
        }
    }
}

impl CaptureDevice for CpalMicrophone {
    type Stream = MicrophoneStream;

    async fn request_permission(&self) -> bool {
        let device_id = self.device_id.clone();
        // Desktop hosts have no permission prompt; a usable input config is the grant
        let probe = tokio::task::spawn_blocking(move || {
            let device = resolve_device(DeviceKind::Input, device_id.as_deref())?;
            device.default_input_config().ok()
        })
        .await;

        matches!(probe, Ok(Some(_)))
    }

    async fn open(&self) -> Result<MicrophoneStream, RecordingError> {
        let device_id = self.device_id.clone();
        tokio::task::spawn_blocking(move || open_stream(device_id))
            .await
            .map_err(|e| RecordingError::Device(format!("Microphone task failed: {}", e)))?
    }
}

fn open_stream(device_id: Option<String>) -> Result<MicrophoneStream, RecordingError> {
    let stop_signal = Arc::new(AtomicBool::new(false));
    let frames = Arc::new(AtomicU64::new(0));
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

    let thread_stop = stop_signal.clone();
    let thread_frames = frames.clone();
    let thread = std::thread::Builder::new()
        .name("reflex-microphone".to_string())
        .spawn(move || {
            let stream = match build_input_stream(device_id.as_deref(), thread_frames) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            while !thread_stop.load(Ordering::SeqCst) {
                std::thread::sleep(STOP_POLL_INTERVAL);
            }
            drop(stream);
        })
        .map_err(|e| RecordingError::Device(e.to_string()))?;

    let mut handle = MicrophoneStream {
        stop_signal,
        frames,
        thread: Some(thread),
    };

    match ready_rx.recv_timeout(OPEN_TIMEOUT) {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => Err(RecordingError::Device(e)),
        Err(_) => {
            // Leave the thread detached rather than block on a wedged driver
            handle.stop_signal.store(true, Ordering::SeqCst);
            handle.thread = None;
            Err(RecordingError::Device(
                "Timed out waiting for the microphone".to_string(),
            ))
        }
    }
}

fn build_input_stream(
    device_id: Option<&str>,
    frames: Arc<AtomicU64>,
) -> Result<cpal::Stream, String> {
    let device = resolve_device(DeviceKind::Input, device_id)
        .ok_or_else(|| "No input device available".to_string())?;
    let supported = device
        .default_input_config()
        .map_err(|e| format!("No usable input config: {}", e))?;
    let channels = supported.channels().max(1) as u64;

    tracing::info!(
        "Opening microphone '{}': {}Hz, {} channels",
        get_device_display_name(&device),
        supported.sample_rate(),
        channels
    );

    let stream = device
        .build_input_stream(
            &supported.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                frames.fetch_add(data.len() as u64 / channels, Ordering::Relaxed);
            },
            |err| {
                tracing::error!("Microphone stream error: {}", err);
            },
            None,
        )
        .map_err(|e| format!("Failed to open input stream: {}", e))?;

    stream
        .play()
        .map_err(|e| format!("Failed to start input stream: {}", e))?;
    Ok(stream)
}
