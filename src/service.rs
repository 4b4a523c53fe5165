// src/service.rs - Frame pipeline: decode, match identities, drive instruments
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::Result;
use crate::instrument::{HandInstrument, InstrumentSnapshot};
use crate::landmarks::{decode_frame, CameraPose, RawFrame};
use crate::output::{AudioMixer, OutputFactory};
use crate::sensor::SensorClient;
use crate::tracking::{HandSlot, IdentityTracker, SlotId, Transition};

/// Running counters, including detections dropped for lack of a free slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub frames: u64,
    pub decoded_hands: u64,
    pub surplus_dropped: u64,
    pub appearances: u64,
    pub disappearances: u64,
}

/// A hand identity paired with the instrument it plays.
pub struct HandRecord {
    pub slot: HandSlot,
    pub instrument: HandInstrument,
}

pub struct HandService<S: SensorClient> {
    sensor: S,
    tracker: IdentityTracker,
    hands: Vec<HandRecord>,
    score_threshold: f32,
    stats: TrackerStats,
    started: bool,
}

impl<S: SensorClient> HandService<S> {
    /// Opens the sensor and builds the fixed pool of hand records.
    pub fn new(mut sensor: S, config: &AppConfig, outputs: &mut dyn OutputFactory) -> Result<Self> {
        config.validate()?;
        sensor.open()?;

        let hands = (0..config.tracker.max_hands)
            .map(|i| {
                let id = SlotId(i);
                HandRecord {
                    slot: HandSlot::new(id, &config.tracker),
                    instrument: HandInstrument::new(id, &config.instrument, &config.mapping, outputs),
                }
            })
            .collect();

        Ok(Self {
            sensor,
            tracker: IdentityTracker::new(&config.tracker),
            hands,
            score_threshold: config.tracker.score_threshold,
            stats: TrackerStats::default(),
            started: false,
        })
    }

    /// Starts the sensor if calibration allows. Returns false to retry later.
    pub fn try_start(&mut self) -> Result<bool> {
        if self.started {
            return Ok(true);
        }

        let status = self.sensor.calibration_status();
        if !status.is_ready() {
            info!("Hand tracker not yet ready to start, needs calibration ({:?})", status);
            return Ok(false);
        }

        info!("Starting hand tracker ({:?})", status);
        self.sensor.start()?;
        self.started = true;
        Ok(true)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn hands(&self) -> &[HandRecord] {
        &self.hands
    }

    pub fn hand(&self, id: SlotId) -> Option<&HandRecord> {
        self.hands.get(id.0)
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    /// Polls the sensor once and processes whatever arrived.
    pub fn poll(&mut self, camera: &CameraPose, now: f64) -> Vec<(SlotId, Transition)> {
        match self.sensor.poll_frame() {
            Some(frame) => self.on_frame(&frame, camera, now),
            None => Vec::new(),
        }
    }

    /// Sensor entry point. Returns the appear/disappear edges it dispatched.
    pub fn on_frame(&mut self, frame: &RawFrame, camera: &CameraPose, now: f64) -> Vec<(SlotId, Transition)> {
        let detected = decode_frame(frame, camera, self.score_threshold);
        self.sensor.set_hand_mesh_visible(!detected.is_empty());

        let update = self
            .tracker
            .update(self.hands.iter_mut().map(|h| &mut h.slot), &detected);

        self.stats.frames += 1;
        self.stats.decoded_hands += detected.len() as u64;
        if update.surplus > 0 {
            self.stats.surplus_dropped += update.surplus as u64;
            warn!(
                "Dropped {} detected hand(s) beyond {} slots",
                update.surplus,
                self.hands.len()
            );
        }

        let mut edges = Vec::new();
        for (id, transition) in update.transitions {
            let Some(record) = self.hands.get_mut(id.0) else {
                continue;
            };
            match transition {
                Transition::Appeared => {
                    self.stats.appearances += 1;
                    record.instrument.start();
                    edges.push((id, transition));
                }
                Transition::Disappeared => {
                    self.stats.disappearances += 1;
                    record.instrument.stop();
                    edges.push((id, transition));
                }
                Transition::Unchanged => {}
            }
        }

        for record in &mut self.hands {
            if !record.slot.is_currently_tracked() {
                continue;
            }
            if let Some(landmarks) = record.slot.landmarks() {
                record.instrument.update_tracking(landmarks, now);
            }
        }

        debug!(
            "Frame {}: {} decoded, {} matched",
            self.stats.frames,
            detected.len(),
            update.matched
        );
        edges
    }

    /// Render tick entry point. Advances smoothing and pushes parameters.
    pub fn update_instruments(&mut self, camera: &CameraPose, mixer: &mut dyn AudioMixer) -> Vec<InstrumentSnapshot> {
        self.hands
            .iter_mut()
            .map(|record| record.instrument.update_instrument(camera, mixer))
            .collect()
    }

    /// Stops every instrument and closes the sensor.
    pub fn shutdown(&mut self) {
        for record in &mut self.hands {
            if record.instrument.is_playing() {
                record.instrument.stop();
            }
        }
        self.sensor.close();
        self.started = false;
        info!(
            "Hand service shut down after {} frames ({} surplus detections dropped)",
            self.stats.frames, self.stats.surplus_dropped
        );
    }
}
