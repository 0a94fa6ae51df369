//! Stereo-pair and calibration image capture for fish-pen camera rigs.
//!
//! This crate provides:
//! - the [`session::CameraSystem`] boundary a camera SDK is plugged in behind,
//!   plus a deterministic emulated backend,
//! - the stereo capture loop that pairs left/right frames and writes JPEGs,
//! - the calibration sweep over exposure/gain combinations,
//! - re-exports of `pencam-core` (configuration, pairing, naming).
//!
//! ## Quickstart
//!
//! ```no_run
//! use pencam::core::{RigConfig, SystemClock};
//! use pencam::session::{EmulatedCameraSystem, EmulatorParams};
//! use pencam::stereo::StereoCapture;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RigConfig::load_json("config.json")?;
//! let mut capture = StereoCapture::new(&config)?;
//! let serials: Vec<String> = capture.registry().serial_numbers().map(String::from).collect();
//! let mut cameras = EmulatedCameraSystem::new(serials, EmulatorParams::default());
//! let summary = capture.run(&mut cameras, &SystemClock)?;
//! println!("wrote {} images", summary.images.len());
//! # Ok(())
//! # }
//! ```

pub use pencam_core as core;

pub mod calibrate;
mod error;
pub mod session;
pub mod stereo;
pub mod writer;

pub use calibrate::{run_calibration, CalibrationSummary};
pub use error::CaptureError;
pub use stereo::{StereoCapture, StereoSummary, WrittenImage};
pub use writer::{ImageWriter, WriteError};
