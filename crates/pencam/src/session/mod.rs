//! Camera session boundary.
//!
//! [`CameraSystem`] is the narrow surface the capture loops need from a
//! vendor camera SDK: enumerate, open, load/save feature settings, latch
//! timestamps, start grabbing and block on the next frame. Buffers are
//! owned by the returned [`GrabResult`]; dropping it releases the buffer.

pub mod emulated;
pub mod settings;

use std::path::{Path, PathBuf};
use std::time::Duration;

use pencam_core::ExposureGain;
use serde::Serialize;

pub use emulated::{EmulatedCameraSystem, EmulatorParams};
pub use settings::{FeatureSet, SettingsParseError};

/// Index of an opened device inside a [`CameraSystem`].
pub type DeviceContext = usize;

/// Identification reported by device enumeration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub model_name: String,
}

/// How many frames a grab run may deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrabLimit {
    Unbounded,
    Frames(u32),
}

/// Exposure control mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExposureMode {
    Auto,
    Manual(ExposureGain),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Mono8,
    Rgb8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// Decoded image payload, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// A successfully grabbed frame.
#[derive(Clone, Debug)]
pub struct GrabbedFrame {
    pub context: DeviceContext,
    /// Hardware timestamp scaled to milliseconds.
    pub timestamp_ms: u64,
    pub image: FrameImage,
}

/// Outcome of one retrieval.
#[derive(Clone, Debug)]
pub enum GrabResult {
    Succeeded(GrabbedFrame),
    /// The device delivered a buffer but the grab itself failed.
    Failed {
        context: DeviceContext,
        code: u32,
        description: String,
    },
}

/// Device and communication errors. All of them end the run.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("no camera present")]
    NoDevices,
    #[error("device context {0} is not open")]
    UnknownContext(DeviceContext),
    #[error("device {0} is not attached")]
    NotAttached(String),
    #[error("device {0} is already open")]
    AlreadyOpen(String),
    #[error("grabbing is not active")]
    NotGrabbing,
    #[error("no frame arrived within {0:?}")]
    Timeout(Duration),
    #[error("settings file {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: SettingsParseError,
    },
}

/// Operations consumed from a camera SDK.
pub trait CameraSystem {
    /// List attached devices.
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>, SessionError>;

    /// Open a device and return its context index.
    fn open(&mut self, device: &DeviceInfo) -> Result<DeviceContext, SessionError>;

    fn device_info(&self, context: DeviceContext) -> Result<&DeviceInfo, SessionError>;

    /// Load persisted feature settings into the device.
    fn load_settings(&mut self, context: DeviceContext, path: &Path) -> Result<(), SessionError>;

    /// Persist the device's current feature settings.
    fn save_settings(&self, context: DeviceContext, path: &Path) -> Result<(), SessionError>;

    /// Latch and reset the hardware timestamp counter.
    fn reset_timestamp(&mut self, context: DeviceContext) -> Result<(), SessionError>;

    fn set_exposure(&mut self, context: DeviceContext, mode: ExposureMode)
        -> Result<(), SessionError>;

    /// Start grabbing on every open device.
    fn start_grabbing(&mut self, limit: GrabLimit) -> Result<(), SessionError>;

    fn stop_grabbing(&mut self);

    fn is_grabbing(&self) -> bool;

    /// Block until the next frame from any open device, or fail with
    /// [`SessionError::Timeout`].
    fn retrieve(&mut self, timeout: Duration) -> Result<GrabResult, SessionError>;
}
