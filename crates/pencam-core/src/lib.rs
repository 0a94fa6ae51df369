//! Core types for fish-pen stereo capture.
//!
//! This crate is intentionally small and knows nothing about cameras or
//! image encoding. It covers:
//! - rig configuration and the serial-number keyed camera registry,
//! - the stereo pairing engine that assigns pair timestamps,
//! - deterministic output paths for stereo and calibration images,
//! - calibration sweep planning (exposure x gain combinations).

mod camera;
mod config;
mod logger;
mod naming;
mod pairing;
mod sweep;

pub use camera::{CameraDescriptor, CameraRegistry, Side};
pub use config::{
    CameraDetails, CaptureParams, ConfigError, EnclosureConfig, RigConfig, DEFAULT_PAIR_WINDOW_MS,
};
pub use naming::{
    calibration_auto_file_name, calibration_dir, calibration_file_name, calibration_stamp,
    pen_dir, stereo_file_name, stereo_image_path,
};
pub use pairing::{Clock, PairAssignment, PairingPolicy, PairingState, SystemClock};
pub use sweep::{CalibrationPlan, ExposureGain, OpticalInputs, SweepError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
