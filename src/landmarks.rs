// src/landmarks.rs - Decodes flat sensor arrays into world-space hands
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Landmarks per hand: wrist plus four joints on each of five fingers.
pub const LANDMARKS_COUNT: usize = 21;

// Hand landmark indices, wrist first and then each finger base to tip
pub const WRIST: usize = 0;
pub const THUMB: [usize; 4] = [1, 2, 3, 4];
pub const INDEX: [usize; 4] = [5, 6, 7, 8];
pub const MIDDLE: [usize; 4] = [9, 10, 11, 12];
pub const RING: [usize; 4] = [13, 14, 15, 16];
pub const PINKY: [usize; 4] = [17, 18, 19, 20];
pub const FINGERS: [[usize; 4]; 5] = [THUMB, INDEX, MIDDLE, RING, PINKY];
/// Landmarks averaged into the palm anchor.
pub const PALM: [usize; 4] = [WRIST, INDEX[0], MIDDLE[0], RING[0]];

/// One sensor callback worth of detections. Landmarks are camera-local
/// offsets from the wrist, three floats each, hands concatenated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFrame {
    pub landmarks: Vec<f32>,
    pub translations: Vec<f32>,
    pub handedness: Vec<i32>,
    pub scores: Vec<f32>,
}

impl RawFrame {
    /// Whole hands present in the landmark array.
    pub fn hand_count(&self) -> usize {
        self.landmarks.len() / 3 / LANDMARKS_COUNT
    }

    /// Appends one hand given camera-local landmark offsets and a wrist offset.
    pub fn push_hand(
        &mut self,
        local: &[Vector3<f32>; LANDMARKS_COUNT],
        wrist_offset: Vector3<f32>,
        is_right: bool,
        score: f32,
    ) {
        for p in local {
            self.landmarks.extend_from_slice(&[p.x, p.y, p.z]);
        }
        self.translations
            .extend_from_slice(&[wrist_offset.x, wrist_offset.y, wrist_offset.z]);
        self.handedness.push(i32::from(is_right));
        self.scores.push(score);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    fn from_flag(flag: i32) -> Self {
        if flag != 0 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }
}

/// Camera pose in world space. +Z is forward, +X right, +Y up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub isometry: Isometry3<f32>,
}

impl CameraPose {
    pub fn new(position: Point3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self {
            isometry: Isometry3::from_parts(Translation3::from(position.coords), rotation),
        }
    }

    pub fn identity() -> Self {
        Self {
            isometry: Isometry3::identity(),
        }
    }

    pub fn position(&self) -> Point3<f32> {
        Point3::from(self.isometry.translation.vector)
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.isometry.rotation * Vector3::z()
    }

    pub fn right(&self) -> Vector3<f32> {
        self.isometry.rotation * Vector3::x()
    }

    pub fn transform_point(&self, local: &Point3<f32>) -> Point3<f32> {
        self.isometry.transform_point(local)
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::identity()
    }
}

/// A confident detection in world space, valid for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedHand {
    pub landmarks: [Point3<f32>; LANDMARKS_COUNT],
    pub handedness: Handedness,
    pub score: f32,
}

impl DecodedHand {
    pub fn anchor(&self) -> Point3<f32> {
        self.landmarks[WRIST]
    }

    /// Builds hand `hand_index` out of the flat arrays, or `None` when the
    /// arrays are too short to hold it.
    pub fn from_arrays(frame: &RawFrame, hand_index: usize, camera: &CameraPose) -> Option<Self> {
        let t = frame.translations.get(hand_index * 3..hand_index * 3 + 3)?;
        let wrist_offset = Vector3::new(t[0], t[1], t[2]);

        let start = hand_index * LANDMARKS_COUNT * 3;
        let flat = frame.landmarks.get(start..start + LANDMARKS_COUNT * 3)?;

        let mut landmarks = [Point3::origin(); LANDMARKS_COUNT];
        for (point, xyz) in landmarks.iter_mut().zip(flat.chunks_exact(3)) {
            let local = Point3::new(xyz[0], xyz[1], xyz[2]) + wrist_offset;
            *point = camera.transform_point(&local);
        }

        Some(Self {
            landmarks,
            handedness: Handedness::from_flag(frame.handedness.get(hand_index).copied().unwrap_or(0)),
            score: frame.scores.get(hand_index).copied().unwrap_or(0.0),
        })
    }
}

/// Decodes every hand scoring at least `score_threshold`, in detection order.
pub fn decode_frame(frame: &RawFrame, camera: &CameraPose, score_threshold: f32) -> Vec<DecodedHand> {
    let mut hands = Vec::with_capacity(frame.hand_count());

    for hand_index in 0..frame.hand_count() {
        let Some(&score) = frame.scores.get(hand_index) else {
            continue;
        };
        if score < score_threshold {
            debug!("Dropping hand {} with score {:.2}", hand_index, score);
            continue;
        }
        if let Some(hand) = DecodedHand::from_arrays(frame, hand_index, camera) {
            hands.push(hand);
        }
    }

    hands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_hand() -> [Vector3<f32>; LANDMARKS_COUNT] {
        let mut local = [Vector3::zeros(); LANDMARKS_COUNT];
        for (f, finger) in FINGERS.iter().enumerate() {
            for (j, &idx) in finger.iter().enumerate() {
                local[idx] = Vector3::new(f as f32 * 0.02, 0.03 + j as f32 * 0.02, 0.0);
            }
        }
        local
    }

    #[test]
    fn decodes_wrist_offset_into_world_space() {
        let mut frame = RawFrame::default();
        frame.push_hand(&straight_hand(), Vector3::new(0.1, 0.2, 0.5), true, 0.9);

        let camera = CameraPose::new(Point3::new(1.0, 0.0, 0.0), UnitQuaternion::identity());
        let hands = decode_frame(&frame, &camera, 0.3);

        assert_eq!(hands.len(), 1);
        let wrist = hands[0].anchor();
        assert!((wrist - Point3::new(1.1, 0.2, 0.5)).norm() < 1e-6);
        assert_eq!(hands[0].handedness, Handedness::Right);
        let index_tip = hands[0].landmarks[INDEX[3]];
        assert!((index_tip - Point3::new(1.12, 0.29, 0.5)).norm() < 1e-5);
    }

    #[test]
    fn applies_camera_rotation() {
        let mut frame = RawFrame::default();
        frame.push_hand(&straight_hand(), Vector3::new(0.0, 0.0, 1.0), false, 1.0);

        // Yaw 90 degrees: local forward becomes world +X
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::FRAC_PI_2);
        let camera = CameraPose::new(Point3::origin(), rotation);
        let hands = decode_frame(&frame, &camera, 0.3);

        assert!((hands[0].anchor() - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-5);
        assert!((camera.forward() - Vector3::x()).norm() < 1e-5);
    }

    #[test]
    fn second_hand_uses_its_own_slice() {
        let mut frame = RawFrame::default();
        frame.push_hand(&straight_hand(), Vector3::new(0.0, 0.0, 0.5), false, 0.8);
        frame.push_hand(&straight_hand(), Vector3::new(0.4, 0.0, 0.5), true, 0.8);

        let hands = decode_frame(&frame, &CameraPose::identity(), 0.3);
        assert_eq!(hands.len(), 2);
        assert!((hands[1].anchor() - Point3::new(0.4, 0.0, 0.5)).norm() < 1e-6);
    }

    #[test]
    fn drops_low_confidence_hands() {
        let mut frame = RawFrame::default();
        frame.push_hand(&straight_hand(), Vector3::zeros(), false, 0.29);
        frame.push_hand(&straight_hand(), Vector3::new(0.5, 0.0, 0.0), true, 0.3);

        let hands = decode_frame(&frame, &CameraPose::identity(), 0.3);
        assert_eq!(hands.len(), 1);
        assert!((hands[0].anchor().x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_or_short_frames_decode_to_nothing() {
        assert!(decode_frame(&RawFrame::default(), &CameraPose::identity(), 0.3).is_empty());

        let frame = RawFrame {
            landmarks: vec![0.0; LANDMARKS_COUNT * 3],
            translations: vec![],
            handedness: vec![0],
            scores: vec![1.0],
        };
        assert!(decode_frame(&frame, &CameraPose::identity(), 0.3).is_empty());
    }
}
