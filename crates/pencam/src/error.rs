use pencam_core::{ConfigError, SweepError};

use crate::session::SessionError;
use crate::writer::WriteError;

/// Errors that end a capture run.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("camera {0} is not part of the rig configuration")]
    UnknownCamera(String),
    #[error("rig configuration has no enclosures")]
    NoEnclosures,
}

impl CaptureError {
    /// Process exit code: 1 for device errors, 2 for configuration, 3 for
    /// output failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            CaptureError::Session(_) | CaptureError::UnknownCamera(_) => 1,
            CaptureError::Config(_) | CaptureError::NoEnclosures => 2,
            CaptureError::Sweep(SweepError::Io { .. }) => 3,
            CaptureError::Sweep(_) => 2,
            CaptureError::Write(_) => 3,
        }
    }
}
