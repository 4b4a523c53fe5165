// src/instrument.rs - Per-hand instrument: five finger voices, palm height filters
use nalgebra::{Point3, Vector3};
use tracing::{info, warn};

use crate::config::{InstrumentConfig, MappingConfig, FINGER_COUNT};
use crate::finger::{angle_between_vectors, FingerMapper};
use crate::landmarks::{CameraPose, FINGERS, LANDMARKS_COUNT, PALM};
use crate::output::{AudioChannel, AudioMixer, OutputFactory, ParticleEmitter};
use crate::tracking::SlotId;

const LOWPASS_OPEN_HZ: f32 = 18_000.0;
const LOWPASS_CLOSED_HZ: f32 = 100.0;
const HIGHPASS_OPEN_HZ: f32 = 10.0;
const HIGHPASS_CLOSED_HZ: f32 = 3_000.0;
/// Below this vertical value the low-pass starts closing.
const LOWPASS_KNEE: f32 = 0.4;
/// Above this vertical value the high-pass starts rising.
const HIGHPASS_KNEE: f32 = 0.6;

const FINGER_EMIT_MIN_VOLUME: f32 = 0.1;
const FINGER_EMIT_RATE: f32 = 20.0;
const HAND_EMIT_RATE: f32 = 15.0;
const HAND_EMIT_MAX_RATE: f32 = 80.0;

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Angle from `from` to `to` in degrees, negative when the rotation runs
/// clockwise around `axis`.
pub fn signed_angle(from: &Vector3<f32>, to: &Vector3<f32>, axis: &Vector3<f32>) -> f32 {
    let unsigned = angle_between_vectors(from, to);
    let sign = axis.dot(&from.cross(to));
    if sign < 0.0 {
        -unsigned
    } else {
        unsigned
    }
}

/// Palm height relative to the view direction, 0 (low) to 1 (high).
pub fn vertical_parameter(
    camera_position: &Point3<f32>,
    forward: &Vector3<f32>,
    right: &Vector3<f32>,
    palm: &Point3<f32>,
    range_degrees: f32,
) -> f32 {
    let towards_hand = palm - camera_position;
    let angle = signed_angle(forward, &towards_hand, right);
    let normalized = (angle / range_degrees).clamp(-1.0, 1.0) * 0.5 + 0.5;
    (1.0 - normalized).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterCutoffs {
    pub lowpass_hz: f32,
    pub highpass_hz: f32,
}

impl FilterCutoffs {
    /// Lowered hands close the low-pass steeply, raised hands open the high-pass.
    pub fn from_vertical(vertical: f32) -> Self {
        let mut lowpass_hz = LOWPASS_OPEN_HZ;
        if vertical < LOWPASS_KNEE {
            let factor = (LOWPASS_KNEE - vertical).clamp(0.0, 1.0) / LOWPASS_KNEE;
            lowpass_hz = lerp(LOWPASS_OPEN_HZ, LOWPASS_CLOSED_HZ, factor.powf(0.3));
        }

        let mut highpass_hz = HIGHPASS_OPEN_HZ;
        if vertical > HIGHPASS_KNEE {
            let factor = (vertical - HIGHPASS_KNEE).clamp(0.0, 1.0) / (1.0 - HIGHPASS_KNEE);
            highpass_hz = lerp(HIGHPASS_OPEN_HZ, HIGHPASS_CLOSED_HZ, factor);
        }

        Self {
            lowpass_hz,
            highpass_hz,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerSnapshot {
    pub audio_volume: f32,
    pub audio_impulse: f32,
    /// Volume pushed to the channel after max volume and fade.
    pub channel_volume: f32,
    pub emitting: bool,
    pub emission_rate: f32,
    pub position: Point3<f32>,
}

/// Everything one render tick pushed out for a hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentSnapshot {
    pub slot: SlotId,
    pub playing: bool,
    pub volume_multiplier: f32,
    pub vertical: f32,
    /// `None` while not playing, when the mixer is left untouched.
    pub filters: Option<FilterCutoffs>,
    pub hand_position: Point3<f32>,
    pub hand_emission_rate: f32,
    pub fingers: [FingerSnapshot; FINGER_COUNT],
}

struct FingerVoice {
    mapper: FingerMapper,
    channel: Box<dyn AudioChannel>,
    max_volume: f32,
    emitter: Option<Box<dyn ParticleEmitter>>,
}

impl FingerVoice {
    fn update_output(&mut self, volume_multiplier: f32) -> FingerSnapshot {
        let audio_volume = self.mapper.audio_volume();
        let audio_impulse = self.mapper.audio_impulse();

        let channel_volume = audio_volume * audio_volume * self.max_volume * volume_multiplier;
        self.channel.set_volume(channel_volume);

        let emitting = audio_volume > FINGER_EMIT_MIN_VOLUME;
        let emission_rate = ((audio_volume + audio_impulse) * FINGER_EMIT_RATE).max(0.0);
        let position = self.mapper.position();
        if let Some(emitter) = self.emitter.as_mut() {
            emitter.set_position(position);
            emitter.set_enabled(emitting);
            emitter.set_rate(emission_rate);
        }

        FingerSnapshot {
            audio_volume,
            audio_impulse,
            channel_volume,
            emitting,
            emission_rate,
            position,
        }
    }
}

/// Instrument bound to one hand slot for the life of the process.
pub struct HandInstrument {
    slot: SlotId,
    playing: bool,
    fingers: [FingerVoice; FINGER_COUNT],
    volume_multiplier: f32,
    vertical: f32,
    hand_position: Point3<f32>,
    hand_emitter: Option<Box<dyn ParticleEmitter>>,
    lowpass_param: String,
    highpass_param: String,
    mapping: MappingConfig,
}

impl HandInstrument {
    pub fn new(
        slot: SlotId,
        config: &InstrumentConfig,
        mapping: &MappingConfig,
        outputs: &mut dyn OutputFactory,
    ) -> Self {
        let fingers = std::array::from_fn(|i| {
            let channel_config = &config.channels[i];
            let mapper = FingerMapper::new(mapping);
            let mut channel = outputs.audio_channel(slot, i);
            channel.play(channel_config);
            channel.set_volume(mapper.audio_volume() * channel_config.max_volume);

            let mut emitter = outputs.finger_emitter(slot, i);
            if let Some(emitter) = emitter.as_mut() {
                emitter.set_enabled(false);
            }

            FingerVoice {
                mapper,
                channel,
                max_volume: channel_config.max_volume,
                emitter,
            }
        });

        let mut hand_emitter = outputs.hand_emitter(slot);
        match hand_emitter.as_mut() {
            Some(emitter) => emitter.set_enabled(false),
            None => warn!("No hand particle emitter for slot {}, visual feedback disabled", slot.0),
        }

        Self {
            slot,
            playing: false,
            fingers,
            volume_multiplier: 0.0,
            vertical: 0.5,
            hand_position: Point3::origin(),
            hand_emitter,
            lowpass_param: format!("{}_lowpass", config.mixer_group),
            highpass_param: format!("{}_highpass", config.mixer_group),
            mapping: mapping.clone(),
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Smoothed vertical parameter, 0.5 when neutral.
    pub fn vertical(&self) -> f32 {
        self.vertical
    }

    pub fn volume_multiplier(&self) -> f32 {
        self.volume_multiplier
    }

    pub fn hand_position(&self) -> Point3<f32> {
        self.hand_position
    }

    pub fn fingers(&self) -> impl Iterator<Item = &FingerMapper> {
        self.fingers.iter().map(|f| &f.mapper)
    }

    pub fn start(&mut self) {
        info!("Hand {} started playing", self.slot.0);
        self.playing = true;
        self.vertical = 0.5;
        if let Some(emitter) = self.hand_emitter.as_mut() {
            emitter.set_enabled(true);
        }
    }

    pub fn stop(&mut self) {
        info!("Hand {} stopped playing", self.slot.0);
        self.playing = false;
        if let Some(emitter) = self.hand_emitter.as_mut() {
            emitter.set_enabled(false);
        }
    }

    /// Feeds one frame of world landmarks, `now` in seconds.
    pub fn update_tracking(&mut self, landmarks: &[Point3<f32>; LANDMARKS_COUNT], now: f64) {
        let palm_sum = PALM
            .iter()
            .fold(Vector3::zeros(), |acc, &i| acc + landmarks[i].coords);
        self.hand_position = Point3::from(palm_sum / PALM.len() as f32);

        for (voice, joints) in self.fingers.iter_mut().zip(FINGERS.iter()) {
            voice.mapper.update_tracking(
                &landmarks[joints[0]],
                &landmarks[joints[1]],
                &landmarks[joints[2]],
                &landmarks[joints[3]],
                now,
            );
        }
    }

    /// Render tick. Safe to call before the hand ever appeared and at any
    /// rate relative to tracking updates.
    pub fn update_instrument(
        &mut self,
        camera: &CameraPose,
        mixer: &mut dyn AudioMixer,
    ) -> InstrumentSnapshot {
        let mut filters = None;
        if self.playing {
            let vertical = vertical_parameter(
                &camera.position(),
                &camera.forward(),
                &camera.right(),
                &self.hand_position,
                self.mapping.vertical_range_degrees,
            );
            self.vertical = lerp(self.vertical, vertical, self.mapping.vertical_smoothing);

            let cutoffs = FilterCutoffs::from_vertical(vertical);
            mixer.set_float(&self.lowpass_param, cutoffs.lowpass_hz);
            mixer.set_float(&self.highpass_param, cutoffs.highpass_hz);
            filters = Some(cutoffs);
        }

        let target = if self.playing { 1.0 } else { 0.0 };
        self.volume_multiplier = lerp(self.volume_multiplier, target, self.mapping.volume_ramp);

        let multiplier = self.volume_multiplier;
        let fingers: [FingerSnapshot; FINGER_COUNT] =
            std::array::from_fn(|i| self.fingers[i].update_output(multiplier));

        let intensity = (fingers
            .iter()
            .map(|f| f.audio_volume + f.audio_impulse * 0.5)
            .sum::<f32>()
            / FINGER_COUNT as f32)
            .max(0.0);
        let hand_emission_rate = (intensity * intensity * HAND_EMIT_RATE).clamp(0.0, HAND_EMIT_MAX_RATE);
        if let Some(emitter) = self.hand_emitter.as_mut() {
            emitter.set_position(self.hand_position);
            emitter.set_rate(hand_emission_rate);
        }

        InstrumentSnapshot {
            slot: self.slot,
            playing: self.playing,
            volume_multiplier: self.volume_multiplier,
            vertical: self.vertical,
            filters,
            hand_position: self.hand_position,
            hand_emission_rate,
            fingers,
        }
    }
}
