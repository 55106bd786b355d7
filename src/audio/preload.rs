//! Warm the clip cache before a scene starts
//!
//! Failures are counted, not fatal: a clip that cannot be preloaded is
//! simply fetched again when the scene reaches it.

use super::AudioOutput;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;

/// How many clips are fetched at once
const PRELOAD_CONCURRENCY: usize = 4;

/// Outcome of a preload pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadReport {
    pub loaded: usize,
    pub total: usize,
    pub failed: Vec<String>,
}

impl PreloadReport {
    /// True when every clip is ready
    pub fn is_ready(&self) -> bool {
        self.loaded == self.total
    }
}

/// Load every URI through `output`, reporting progress as clips land
pub async fn preload_clips<O: AudioOutput>(
    output: &O,
    uris: &[String],
    mut on_progress: impl FnMut(usize, usize),
) -> PreloadReport {
    let total = uris.len();
    let mut report = PreloadReport {
        total,
        ..Default::default()
    };

    let mut results = stream::iter(uris)
        .map(|uri| async move { (uri, output.load(uri).await) })
        .buffer_unordered(PRELOAD_CONCURRENCY);

    while let Some((uri, result)) = results.next().await {
        match result {
            Ok(_) => report.loaded += 1,
            Err(e) => {
                tracing::warn!("Preload failed: {}", e);
                report.failed.push(uri.clone());
            }
        }
        on_progress(report.loaded + report.failed.len(), total);
    }

    report.failed.sort();
    tracing::info!(
        "Preloaded {}/{} clips ({} failed)",
        report.loaded,
        report.total,
        report.failed.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioClip, AudioError};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CountingOutput {
        loads: Mutex<Vec<String>>,
    }

    impl AudioOutput for CountingOutput {
        async fn load(&self, uri: &str) -> Result<AudioClip, AudioError> {
            self.loads.lock().push(uri.to_string());
            if uri.contains("missing") {
                return Err(AudioError::load(uri, "not found"));
            }
            Ok(AudioClip::new(8000, vec![0.0; 80]))
        }

        async fn play(&self, _uri: &str, _clip: AudioClip) -> Result<(), AudioError> {
            Ok(())
        }

        fn halt(&self) {}
    }

    #[tokio::test]
    async fn test_preload_counts_successes_and_failures() {
        let output = CountingOutput::default();
        let uris: Vec<String> = ["a.mp3", "missing-b.mp3", "c.mp3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut progress = Vec::new();

        let report = preload_clips(&output, &uris, |done, total| progress.push((done, total))).await;

        assert_eq!(report.loaded, 2);
        assert_eq!(report.total, 3);
        assert_eq!(report.failed, vec!["missing-b.mp3"]);
        assert!(!report.is_ready());
        assert_eq!(progress.last(), Some(&(3, 3)));
        assert_eq!(output.loads.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_preload_nothing_is_ready() {
        let output = CountingOutput::default();
        let report = preload_clips(&output, &[], |_, _| {}).await;
        assert!(report.is_ready());
        assert_eq!(report.total, 0);
    }
}
