//! Configuration management for Reflex
//!
//! Settings are stored in `~/.reflex/config.json` with schema versioning and
//! sequential migrations. The configuration is loaded once at startup and
//! handed to each scene by value; nothing here is cached globally.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current config schema version
pub const CURRENT_VERSION: u32 = 2;

/// Errors raised while reading or writing the configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown config version: {0}")]
    UnknownVersion(u32),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Countdown, settle and fallback timings
    pub timing: TimingConfig,
    /// Narration playback settings
    pub audio: AudioConfig,
    /// Microphone settings
    pub recording: RecordingConfig,
    /// Which scene to play
    pub scene: SceneConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            timing: TimingConfig::default(),
            audio: AudioConfig::default(),
            recording: RecordingConfig::default(),
            scene: SceneConfig::default(),
        }
    }
}

impl Config {
    /// Clamp values that would break the scene into their usable range
    pub fn sanitised(mut self) -> Self {
        if self.timing.countdown_seconds == 0 {
            tracing::warn!("countdown_seconds of 0 is not usable, falling back to 1");
            self.timing.countdown_seconds = 1;
        }
        if !self.audio.volume.is_finite() {
            self.audio.volume = 1.0;
        }
        self.audio.volume = self.audio.volume.clamp(0.0, 1.0);
        self
    }
}

/// Scene timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds the user gets to answer a prompt
    pub countdown_seconds: u32,
    /// Pause between a captured answer and the next step (milliseconds)
    pub settle_delay_ms: u64,
    /// Pause before the fallback nudge is spoken (milliseconds)
    pub fallback_audio_delay_ms: u64,
    /// How long the fallback nudge stays up before recording restarts (milliseconds)
    pub fallback_dwell_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: 5,
            settle_delay_ms: 1000,
            fallback_audio_delay_ms: 100,
            fallback_dwell_ms: 3000,
        }
    }
}

impl TimingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn fallback_audio_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_audio_delay_ms)
    }

    pub fn fallback_dwell(&self) -> Duration {
        Duration::from_millis(self.fallback_dwell_ms)
    }
}

/// Narration playback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Selected output device ID (None for system default)
    pub output_device_id: Option<String>,
    /// Whether narration and fallback nudges play automatically
    pub narration_enabled: bool,
    /// Output gain between 0.0 and 1.0
    pub volume: f32,
    /// Fetch and decode every clip in the script before the scene starts
    pub preload: bool,
    /// Directory that relative audio references resolve against
    pub asset_dir: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_device_id: None,
            narration_enabled: true,
            volume: 1.0,
            preload: true,
            asset_dir: None,
        }
    }
}

/// Microphone configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Selected input device ID (None for system default)
    pub input_device_id: Option<String>,
    /// Let "continue" move past prompts when no microphone is available
    pub skip_without_microphone: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            input_device_id: None,
            skip_without_microphone: true,
        }
    }
}

/// Scene selection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Path to a JSON dialogue script (None plays the built-in scene)
    pub script_path: Option<PathBuf>,
}

/// Get the path to the config directory (~/.reflex)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".reflex")
}

/// Get the path to the config file (~/.reflex/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load the configuration from the default location
///
/// Falls back to defaults when the file is missing or unreadable, so a broken
/// config never prevents a scene from being played.
pub fn load_config() -> Config {
    let path = get_config_path();
    match load_from_path(&path) {
        Ok(config) => {
            tracing::info!("Config loaded from {}", path.display());
            config
        }
        Err(e) => {
            tracing::error!("Failed to load config, using defaults: {}", e);
            Config::default()
        }
    }
}

/// Load configuration from a specific file
pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("Config file not found, using defaults");
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: Config = serde_json::from_str(&contents)?;
    let original_version = config.version;
    let migrated = migrate_config(config)?;

    if migrated.version != original_version {
        // Persist the migrated file so the migration only runs once
        save_to_path(&migrated, path)?;
    }

    Ok(migrated.sanitised())
}

/// Save configuration to a specific file, creating parent directories
pub fn save_to_path(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!("Config saved to {}", path.display());
    Ok(())
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, ConfigError> {
    let original_version = config.version;

    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version > CURRENT_VERSION {
        return Err(ConfigError::UnknownVersion(config.version));
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, ConfigError> {
    match config.version {
        // Version 0 -> 1: initial schema
        0 => Ok(Config {
            version: 1,
            ..config
        }),
        // Version 1 -> 2: the countdown moved from a constant into `timing`.
        // Version 1 files never carried it, so serde already filled the default.
        1 => Ok(Config {
            version: 2,
            ..config
        }),
        v => Err(ConfigError::UnknownVersion(v)),
    }
}
