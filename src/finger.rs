// src/finger.rs - Finger bend and bend velocity mapped to volume/impulse
use nalgebra::{Point3, Vector3};

use crate::config::MappingConfig;

/// Bend reported before the first update.
pub const INITIAL_BEND: f32 = 180.0;

/// Angle between two vectors in degrees, 0 when either is degenerate.
pub fn angle_between_vectors(v1: &Vector3<f32>, v2: &Vector3<f32>) -> f32 {
    let mag1 = v1.norm();
    let mag2 = v2.norm();
    if mag1 <= f32::EPSILON || mag2 <= f32::EPSILON {
        return 0.0;
    }
    let cos_angle = (v1.dot(v2) / (mag1 * mag2)).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

/// Total bend over the two finger joints in degrees: 0 is straight.
pub fn finger_bend(knuckle: &Point3<f32>, joint1: &Point3<f32>, joint2: &Point3<f32>, tip: &Point3<f32>) -> f32 {
    let proximal = joint1 - knuckle;
    let middle = joint2 - joint1;
    let distal = tip - joint2;
    angle_between_vectors(&proximal, &middle) + angle_between_vectors(&middle, &distal)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Smoothed kinematic state of one finger.
#[derive(Debug, Clone)]
pub struct FingerMapper {
    bend: f32,
    bend_velocity: f32,
    last_update: Option<f64>,
    position: Point3<f32>,
    smoothing: f32,
    full_bend: f32,
    impulse_scale: f32,
}

impl FingerMapper {
    pub fn new(config: &MappingConfig) -> Self {
        Self {
            bend: INITIAL_BEND,
            bend_velocity: 0.0,
            last_update: None,
            position: Point3::origin(),
            smoothing: config.bend_smoothing,
            full_bend: config.full_bend_degrees,
            impulse_scale: config.impulse_scale,
        }
    }

    /// Feeds this frame's joints, `now` in seconds. The first call never
    /// produces velocity since there is no previous timestamp.
    pub fn update_tracking(
        &mut self,
        knuckle: &Point3<f32>,
        joint1: &Point3<f32>,
        joint2: &Point3<f32>,
        tip: &Point3<f32>,
        now: f64,
    ) {
        let bend = finger_bend(knuckle, joint1, joint2, tip);

        if let Some(previous) = self.last_update {
            let dt = (now - previous) as f32;
            if dt > 0.0 {
                let bend_speed = (bend - self.bend) / dt;
                self.bend_velocity = lerp(self.bend_velocity, bend_speed, self.smoothing);
            }
        }
        self.last_update = Some(now);

        self.bend = lerp(self.bend, bend, self.smoothing);
        self.position = Point3::from((joint1.coords + joint2.coords + tip.coords) / 3.0);
    }

    /// Smoothed bend in degrees.
    pub fn bend(&self) -> f32 {
        self.bend
    }

    /// Smoothed bend velocity in degrees per second.
    pub fn bend_velocity(&self) -> f32 {
        self.bend_velocity
    }

    /// Centre of the three outer joints.
    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    /// 1 for an open finger, 0 once bent past `full_bend_degrees`.
    pub fn audio_volume(&self) -> f32 {
        1.0 - (self.bend / self.full_bend).clamp(0.0, 1.0)
    }

    /// Negated, normalized bend velocity in [-1, 1]; positive while the
    /// bend angle is decreasing.
    pub fn audio_impulse(&self) -> f32 {
        (-self.bend_velocity / self.impulse_scale).clamp(-1.0, 1.0)
    }
}
