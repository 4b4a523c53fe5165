// src/output.rs - Audio/visual collaborators and session export
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Local;
use csv::Writer;
use nalgebra::Point3;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ChannelConfig;
use crate::error::Result;
use crate::instrument::InstrumentSnapshot;
use crate::service::TrackerStats;
use crate::tracking::SlotId;

/// Receives named mixer parameters such as `Hands_lowpass`.
pub trait AudioMixer {
    fn set_float(&mut self, name: &str, value: f32);
}

/// One looping per-finger voice.
pub trait AudioChannel {
    fn play(&mut self, config: &ChannelConfig);
    fn set_volume(&mut self, volume: f32);
}

pub trait ParticleEmitter {
    fn set_enabled(&mut self, enabled: bool);
    fn set_rate(&mut self, rate: f32);
    fn set_position(&mut self, position: Point3<f32>);
}

/// Builds the collaborators for each hand slot. Emitters are optional and
/// their absence only disables visual feedback.
pub trait OutputFactory {
    fn audio_channel(&mut self, slot: SlotId, finger: usize) -> Box<dyn AudioChannel>;
    fn hand_emitter(&mut self, slot: SlotId) -> Option<Box<dyn ParticleEmitter>>;
    fn finger_emitter(&mut self, slot: SlotId, finger: usize) -> Option<Box<dyn ParticleEmitter>>;
}

/// Mixer that keeps the latest value written to each parameter.
#[derive(Debug, Default, Clone)]
pub struct ParameterTable {
    values: HashMap<String, f32>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl AudioMixer for ParameterTable {
    fn set_float(&mut self, name: &str, value: f32) {
        self.values.insert(name.to_string(), value);
    }
}

/// Channel without an audio device behind it; logs what it would play.
#[derive(Debug, Default)]
pub struct SilentChannel {
    volume: f32,
}

impl SilentChannel {
    pub fn volume(&self) -> f32 {
        self.volume
    }
}

impl AudioChannel for SilentChannel {
    fn play(&mut self, config: &ChannelConfig) {
        debug!("Looping {} on {}", config.audio_clip.display(), config.mixer_group);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}

/// Headless factory: silent channels and no particle emitters.
#[derive(Debug, Default)]
pub struct HeadlessOutputs;

impl OutputFactory for HeadlessOutputs {
    fn audio_channel(&mut self, _slot: SlotId, _finger: usize) -> Box<dyn AudioChannel> {
        Box::new(SilentChannel::default())
    }

    fn hand_emitter(&mut self, _slot: SlotId) -> Option<Box<dyn ParticleEmitter>> {
        None
    }

    fn finger_emitter(&mut self, _slot: SlotId, _finger: usize) -> Option<Box<dyn ParticleEmitter>> {
        None
    }
}

#[derive(Debug, Serialize)]
struct SnapshotRecord {
    timestamp: f64,
    tick: u64,
    slot: usize,
    playing: bool,
    volume_multiplier: f32,
    vertical: f32,
    lowpass_hz: Option<f32>,
    highpass_hz: Option<f32>,
    hand_emission_rate: f32,

    thumb_volume: f32,
    index_volume: f32,
    middle_volume: f32,
    ring_volume: f32,
    pinky_volume: f32,

    thumb_impulse: f32,
    index_impulse: f32,
    middle_impulse: f32,
    ring_impulse: f32,
    pinky_impulse: f32,
}

impl SnapshotRecord {
    fn new(tick: u64, timestamp: f64, snapshot: &InstrumentSnapshot) -> Self {
        let volume = |i: usize| snapshot.fingers[i].channel_volume;
        let impulse = |i: usize| snapshot.fingers[i].audio_impulse;
        Self {
            timestamp,
            tick,
            slot: snapshot.slot.0,
            playing: snapshot.playing,
            volume_multiplier: snapshot.volume_multiplier,
            vertical: snapshot.vertical,
            lowpass_hz: snapshot.filters.map(|f| f.lowpass_hz),
            highpass_hz: snapshot.filters.map(|f| f.highpass_hz),
            hand_emission_rate: snapshot.hand_emission_rate,
            thumb_volume: volume(0),
            index_volume: volume(1),
            middle_volume: volume(2),
            ring_volume: volume(3),
            pinky_volume: volume(4),
            thumb_impulse: impulse(0),
            index_impulse: impulse(1),
            middle_impulse: impulse(2),
            ring_impulse: impulse(3),
            pinky_impulse: impulse(4),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub session_name: String,
    pub started_at: String,
    pub ticks: u64,
    pub stats: TrackerStats,
}

/// Collects render-tick snapshots and writes them out as CSV.
pub struct SessionRecorder {
    output_dir: PathBuf,
    session_id: Uuid,
    session_name: String,
    started_at: String,
    records: Vec<SnapshotRecord>,
    ticks: u64,
}

impl SessionRecorder {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Self {
        let now = Local::now();
        let session_name =
            session_name.unwrap_or_else(|| format!("session_{}", now.format("%Y%m%d_%H%M%S")));

        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            session_id: Uuid::new_v4(),
            session_name,
            started_at: now.to_rfc3339(),
            records: Vec::new(),
            ticks: 0,
        }
    }

    pub fn session_dir(&self) -> PathBuf {
        self.output_dir.join(&self.session_name)
    }

    pub fn record_tick(&mut self, timestamp: f64, snapshots: &[InstrumentSnapshot]) {
        for snapshot in snapshots {
            self.records.push(SnapshotRecord::new(self.ticks, timestamp, snapshot));
        }
        self.ticks += 1;
    }

    pub fn rows(&self) -> usize {
        self.records.len()
    }

    pub fn export_csv(&self) -> Result<PathBuf> {
        let csv_path = self.session_dir().join("instrument_params.csv");
        if let Some(parent) = csv_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = Writer::from_writer(File::create(&csv_path)?);
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        info!("Exported {} rows to {}", self.records.len(), csv_path.display());
        Ok(csv_path)
    }

    pub fn export_summary(&self, stats: &TrackerStats) -> Result<PathBuf> {
        let path = self.session_dir().join("summary.json");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let summary = SessionSummary {
            session_id: self.session_id,
            session_name: self.session_name.clone(),
            started_at: self.started_at.clone(),
            ticks: self.ticks,
            stats: stats.clone(),
        };
        std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstrumentConfig, MappingConfig};
    use crate::instrument::HandInstrument;
    use crate::landmarks::CameraPose;

    #[test]
    fn parameter_table_keeps_latest_value() {
        let mut table = ParameterTable::new();
        assert!(table.is_empty());
        table.set_float("Hands_lowpass", 18000.0);
        table.set_float("Hands_lowpass", 900.0);
        assert_eq!(table.get("Hands_lowpass"), Some(900.0));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("Hands_highpass"), None);
    }

    #[test]
    fn silent_channel_remembers_volume() {
        let mut channel = SilentChannel::default();
        assert_eq!(channel.volume(), 0.0);
        channel.play(&InstrumentConfig::default().channels[0]);
        channel.set_volume(0.42);
        assert_eq!(channel.volume(), 0.42);
    }

    #[test]
    fn exports_one_row_per_slot_and_tick() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::new(dir.path(), Some("test_session".into()));

        let mut outputs = HeadlessOutputs;
        let mut instruments: Vec<HandInstrument> = (0..2)
            .map(|i| {
                HandInstrument::new(
                    SlotId(i),
                    &InstrumentConfig::default(),
                    &MappingConfig::default(),
                    &mut outputs,
                )
            })
            .collect();
        let mut mixer = ParameterTable::new();
        for tick in 0..3 {
            let snapshots: Vec<_> = instruments
                .iter_mut()
                .map(|i| i.update_instrument(&CameraPose::identity(), &mut mixer))
                .collect();
            recorder.record_tick(tick as f64 / 30.0, &snapshots);
        }
        assert_eq!(recorder.rows(), 6);

        let csv_path = recorder.export_csv().unwrap();
        let text = std::fs::read_to_string(&csv_path).unwrap();
        assert!(text.starts_with("timestamp,tick,slot,playing"));
        assert_eq!(text.lines().count(), 7);

        let summary_path = recorder.export_summary(&TrackerStats::default()).unwrap();
        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(summary_path).unwrap()).unwrap();
        assert_eq!(summary["ticks"], 3);
        assert_eq!(summary["session_name"], "test_session");
    }
}
