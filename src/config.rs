// src/config.rs - Tracker, mapping and instrument settings
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Fingers per hand, thumb first.
pub const FINGER_COUNT: usize = 5;

/// Largest hand pool the tracker supports.
pub const MAX_HANDS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections scoring below this are dropped before matching.
    pub score_threshold: f32,
    /// Max wrist distance (meters) for a detection to keep a slot's identity.
    pub match_distance: f32,
    /// A slot appears once its consecutive matches exceed this.
    pub appear_after_frames: u32,
    /// A slot disappears once its consecutive misses exceed this.
    pub disappear_after_frames: u32,
    pub max_hands: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.3,
            match_distance: 0.2,
            appear_after_frames: 3,
            disappear_after_frames: 5,
            max_hands: MAX_HANDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub bend_smoothing: f32,
    pub vertical_smoothing: f32,
    pub volume_ramp: f32,
    /// Bend (degrees) at which a finger's volume reaches zero.
    pub full_bend_degrees: f32,
    /// Bend velocity (degrees/second) that saturates the impulse.
    pub impulse_scale: f32,
    /// Vertical angle (degrees) from camera forward that maps to 0 or 1.
    pub vertical_range_degrees: f32,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            bend_smoothing: 0.15,
            vertical_smoothing: 0.2,
            volume_ramp: 0.15,
            full_bend_degrees: 130.0,
            impulse_scale: 360.0,
            vertical_range_degrees: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub audio_clip: PathBuf,
    pub mixer_group: String,
    pub max_volume: f32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            audio_clip: PathBuf::new(),
            mixer_group: "Fingers".to_string(),
            max_volume: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Mixer group carrying the `<group>_lowpass` / `<group>_highpass` parameters.
    pub mixer_group: String,
    pub channels: [ChannelConfig; FINGER_COUNT],
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        let names = ["thumb", "index", "middle", "ring", "pinky"];
        Self {
            mixer_group: "Hands".to_string(),
            channels: names.map(|name| ChannelConfig {
                audio_clip: PathBuf::from(format!("audio/{name}.wav")),
                ..ChannelConfig::default()
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    pub mapping: MappingConfig,
    pub instrument: InstrumentConfig,
    pub calibration_retry_ms: u64,
    pub target_frame_rate: u32,
    pub sensor_rate_hz: u32,
    pub output_dir: PathBuf,
    pub record_session: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            mapping: MappingConfig::default(),
            instrument: InstrumentConfig::default(),
            calibration_retry_ms: 200,
            target_frame_rate: 30,
            sensor_rate_hz: 30,
            output_dir: directories::UserDirs::new()
                .and_then(|dirs| dirs.document_dir().map(|p| p.join("HandInstrument")))
                .unwrap_or_else(|| PathBuf::from("./output")),
            record_session: false,
        }
    }
}

impl AppConfig {
    /// Reads a JSON config, falling back to defaults when the file is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&text)?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.tracker.max_hands == 0 || self.tracker.max_hands > MAX_HANDS {
            return Err(Error::Config(format!(
                "max_hands must be between 1 and {}, got {}",
                MAX_HANDS, self.tracker.max_hands
            )));
        }
        if self.tracker.match_distance <= 0.0 {
            return Err(Error::Config("match_distance must be positive".into()));
        }
        if self.target_frame_rate == 0 || self.sensor_rate_hz == 0 {
            return Err(Error::Config("frame rates must be positive".into()));
        }
        for (i, channel) in self.instrument.channels.iter().enumerate() {
            if !(0.0..=1.0).contains(&channel.max_volume) {
                return Err(Error::Config(format!(
                    "channel {} max_volume {} outside [0, 1]",
                    i, channel.max_volume
                )));
            }
        }
        Ok(())
    }
}
