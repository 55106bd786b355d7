//! Reflex - spoken language practice scenes
//!
//! Plays a linear dialogue with narration audio, prompts the learner to speak
//! against a countdown, and nudges them with a fallback line when the prompt
//! goes unanswered.

pub mod audio;
pub mod config;
pub mod recording;
pub mod scene;
pub mod script;
pub mod terminal;

use std::path::PathBuf;

/// Directory holding the log file
pub fn get_log_dir() -> PathBuf {
    config::get_config_dir().join("logs")
}

/// Install the global tracing subscriber
///
/// Logs go to stderr and, when it can be opened, an append-only file under
/// `~/.reflex/logs`. `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() {
    use tracing_subscriber::prelude::*;

    /// Format timestamps using the system's local time via chrono
    struct LocalTimer;
    impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
        fn format_time(
            &self,
            w: &mut tracing_subscriber::fmt::format::Writer<'_>,
        ) -> std::fmt::Result {
            write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        }
    }

    let log_dir = get_log_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("reflex.log"))
        .ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // The terminal runner owns stdout, so console logs go to stderr
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTimer);

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer);

    let result = match log_file {
        Some(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_timer(LocalTimer)
                .with_ansi(false);
            registry.with(file_layer).try_init()
        }
        None => registry.try_init(),
    };

    if let Err(e) = result {
        eprintln!("Logging already initialised: {}", e);
    }
}
