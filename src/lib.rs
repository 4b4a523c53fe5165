//! Hand Instrument
//!
//! Tracks up to two hands from a landmark sensor, keeps their identities
//! stable across frames and maps finger bend and palm height onto
//! instrument parameters.

pub mod config;
pub mod error;
pub mod finger;
pub mod instrument;
pub mod landmarks;
pub mod output;
pub mod sensor;
pub mod service;
pub mod tracking;

pub use error::{Error, Result};
