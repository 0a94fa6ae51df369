//! Calibration sweep planning.
//!
//! A sweep captures one image per (exposure, gain) combination listed in an
//! "optical inputs" document, optionally preceded by one image taken with
//! automatic exposure and gain.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::string_or_number;
use crate::naming::calibration_dir;

/// Frames discarded before the auto-exposure image is kept.
pub const AUTO_WARMUP_FRAMES: u32 = 5;

/// Frames the camera is allowed to deliver during the manual sweep.
pub const SWEEP_GRAB_BUDGET: u32 = 50;

#[derive(thiserror::Error, Debug)]
pub enum SweepError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("optical inputs need at least one exposure and one gain value")]
    EmptySweep,
    #[error("sweep needs {needed} frames but grabbing is limited to {budget}")]
    OverBudget { needed: u32, budget: u32 },
}

/// Description of one calibration batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpticalInputs {
    #[serde(deserialize_with = "string_or_number")]
    pub fish_id: String,
    pub side: String,
    #[serde(deserialize_with = "string_or_number")]
    pub batch_id: String,
    pub exposure_values: Vec<f64>,
    pub gain_values: Vec<f64>,
    #[serde(default)]
    pub capture_automatic_gain_exposure_image: bool,
    /// Free-form fields kept so the batch record is written back verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl OpticalInputs {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SweepError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| SweepError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SweepError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| SweepError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Exposure-major cartesian product of the configured values.
    pub fn combinations(&self) -> Vec<ExposureGain> {
        self.exposure_values
            .iter()
            .flat_map(|&exposure| {
                self.gain_values
                    .iter()
                    .map(move |&gain| ExposureGain { exposure, gain })
            })
            .collect()
    }

    /// Resolve the batch directory and the ordered list of captures.
    pub fn plan(&self, base_directory: &Path) -> Result<CalibrationPlan, SweepError> {
        let combinations = self.combinations();
        if combinations.is_empty() {
            return Err(SweepError::EmptySweep);
        }
        // one extra frame: the first sweep frame is taken before settings apply
        let needed = combinations.len() as u32 + 1;
        if needed > SWEEP_GRAB_BUDGET {
            return Err(SweepError::OverBudget {
                needed,
                budget: SWEEP_GRAB_BUDGET,
            });
        }

        Ok(CalibrationPlan {
            data_dir: calibration_dir(base_directory, &self.fish_id, &self.side, &self.batch_id),
            auto_image: self.capture_automatic_gain_exposure_image,
            warmup_frames: AUTO_WARMUP_FRAMES,
            grab_budget: SWEEP_GRAB_BUDGET,
            combinations,
        })
    }
}

/// One manual exposure/gain setting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExposureGain {
    /// Exposure time in microseconds.
    pub exposure: f64,
    /// Raw sensor gain.
    pub gain: f64,
}

/// Resolved calibration run.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationPlan {
    pub data_dir: PathBuf,
    pub auto_image: bool,
    pub warmup_frames: u32,
    pub grab_budget: u32,
    pub combinations: Vec<ExposureGain>,
}
