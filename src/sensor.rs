// src/sensor.rs - Hand tracking sensor clients (simulated and replayed)
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::landmarks::{RawFrame, FINGERS, LANDMARKS_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationStatus {
    NotCalibrated,
    Calibrated,
    ManualCalibration,
}

impl CalibrationStatus {
    /// Tracking may start once calibrated either way.
    pub fn is_ready(self) -> bool {
        matches!(self, CalibrationStatus::Calibrated | CalibrationStatus::ManualCalibration)
    }
}

/// Handle to the external hand tracking pipeline. Opened before use and
/// closed on shutdown by whoever owns it.
pub trait SensorClient {
    fn open(&mut self) -> Result<()>;
    fn calibration_status(&mut self) -> CalibrationStatus;
    fn start(&mut self) -> Result<()>;
    /// Next frame of detections, `None` if nothing new arrived.
    fn poll_frame(&mut self) -> Option<RawFrame>;
    fn set_hand_mesh_visible(&mut self, visible: bool);
    fn close(&mut self);

    /// True once a finite source has nothing left to deliver.
    fn is_finished(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Closed,
    Open,
    Running,
}

/// Camera-local landmark offsets for a hand whose fingers are each bent by
/// `curl_degrees[f]` per joint.
pub fn synthetic_hand(curl_degrees: [f32; 5]) -> [Vector3<f32>; LANDMARKS_COUNT] {
    const SEGMENT: f32 = 0.025;
    let mut local = [Vector3::zeros(); LANDMARKS_COUNT];

    for (f, finger) in FINGERS.iter().enumerate() {
        let mut point = Vector3::new(f as f32 * 0.02 - 0.04, 0.04, 0.0);
        let mut heading = 0.0f32;
        for (j, &idx) in finger.iter().enumerate() {
            local[idx] = point;
            if j >= 1 {
                heading += curl_degrees[f].to_radians();
            }
            point += Vector3::new(0.0, heading.cos(), -heading.sin()) * SEGMENT;
        }
    }

    local
}

/// Two synthetic hands moving in front of the camera. Drops the second
/// hand now and then, swaps detection order every other frame and sneaks
/// in low-confidence ghosts, so tracking has something to chew on.
pub struct SimulatedSensor {
    sim_time: f64,
    frame_dt: f64,
    frame_counter: u64,
    calibration_queries_left: u32,
    state: Lifecycle,
    mesh_visible: bool,
}

impl SimulatedSensor {
    pub fn new(frame_rate_hz: u32, calibration_queries: u32) -> Self {
        Self {
            sim_time: 0.0,
            frame_dt: 1.0 / frame_rate_hz.max(1) as f64,
            frame_counter: 0,
            calibration_queries_left: calibration_queries,
            state: Lifecycle::Closed,
            mesh_visible: false,
        }
    }

    pub fn mesh_visible(&self) -> bool {
        self.mesh_visible
    }

    fn generate_frame(&self) -> RawFrame {
        let t = self.sim_time;
        let mut frame = RawFrame::default();

        let left_curl: [f32; 5] =
            std::array::from_fn(|f| 30.0 + 30.0 * (t * 1.3 + f as f64 * 0.7).sin() as f32);
        let left_offset = Vector3::new(
            -0.2 + 0.05 * (t * 0.5).cos() as f32,
            0.15 * t.sin() as f32,
            0.5,
        );

        let right_curl: [f32; 5] =
            std::array::from_fn(|f| 35.0 + 35.0 * (t * 0.9 + f as f64 * 1.1).cos() as f32);
        let right_offset = Vector3::new(
            0.2 - 0.05 * (t * 0.5 + 1.0).cos() as f32,
            0.2 * (t * 0.7 + 1.5).sin() as f32,
            0.45,
        );

        let right_dropped = self.frame_counter % 120 >= 100;
        let swap = self.frame_counter % 2 == 1;

        let mut hands = vec![(synthetic_hand(left_curl), left_offset, false, 0.9)];
        if !right_dropped {
            hands.push((synthetic_hand(right_curl), right_offset, true, 0.85));
        }
        if swap {
            hands.reverse();
        }
        if self.frame_counter % 45 == 0 {
            hands.push((synthetic_hand([0.0; 5]), Vector3::new(0.0, -0.3, 0.6), true, 0.1));
        }

        for (local, offset, is_right, score) in &hands {
            frame.push_hand(local, *offset, *is_right, *score);
        }
        frame
    }
}

impl SensorClient for SimulatedSensor {
    fn open(&mut self) -> Result<()> {
        info!("Opening simulated hand sensor");
        self.state = Lifecycle::Open;
        Ok(())
    }

    fn calibration_status(&mut self) -> CalibrationStatus {
        if self.calibration_queries_left > 0 {
            self.calibration_queries_left -= 1;
            return CalibrationStatus::NotCalibrated;
        }
        CalibrationStatus::Calibrated
    }

    fn start(&mut self) -> Result<()> {
        if self.state == Lifecycle::Closed {
            return Err(Error::Sensor("simulated sensor started before open".into()));
        }
        self.state = Lifecycle::Running;
        Ok(())
    }

    fn poll_frame(&mut self) -> Option<RawFrame> {
        if self.state != Lifecycle::Running {
            return None;
        }
        let frame = self.generate_frame();
        self.sim_time += self.frame_dt;
        self.frame_counter += 1;
        Some(frame)
    }

    fn set_hand_mesh_visible(&mut self, visible: bool) {
        self.mesh_visible = visible;
    }

    fn close(&mut self) {
        if self.state != Lifecycle::Closed {
            info!("Closing simulated hand sensor after {} frames", self.frame_counter);
        }
        self.state = Lifecycle::Closed;
    }
}

/// Replays frames recorded as JSON lines, one `RawFrame` per line.
pub struct ReplaySensor {
    path: PathBuf,
    frames: Vec<RawFrame>,
    cursor: usize,
    state: Lifecycle,
}

impl ReplaySensor {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            frames: Vec::new(),
            cursor: 0,
            state: Lifecycle::Closed,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl SensorClient for ReplaySensor {
    fn open(&mut self) -> Result<()> {
        let reader = BufReader::new(File::open(&self.path)?);
        self.frames.clear();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            self.frames.push(serde_json::from_str(&line)?);
        }
        self.cursor = 0;
        self.state = Lifecycle::Open;
        info!("Loaded {} frames from {}", self.frames.len(), self.path.display());
        Ok(())
    }

    fn calibration_status(&mut self) -> CalibrationStatus {
        CalibrationStatus::ManualCalibration
    }

    fn start(&mut self) -> Result<()> {
        if self.state == Lifecycle::Closed {
            return Err(Error::Sensor(format!("replay {} not open", self.path.display())));
        }
        self.state = Lifecycle::Running;
        Ok(())
    }

    fn poll_frame(&mut self) -> Option<RawFrame> {
        if self.state != Lifecycle::Running {
            return None;
        }
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        frame
    }

    fn set_hand_mesh_visible(&mut self, visible: bool) {
        debug!("Replay hand mesh visible: {}", visible);
    }

    fn close(&mut self) {
        self.state = Lifecycle::Closed;
    }

    fn is_finished(&self) -> bool {
        self.state == Lifecycle::Running && self.cursor >= self.frames.len()
    }
}

/// Writes frames in the format `ReplaySensor` reads.
pub fn write_frames(path: impl AsRef<Path>, frames: &[RawFrame]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for frame in frames {
        serde_json::to_writer(&mut writer, frame)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
