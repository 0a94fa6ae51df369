//! JSON rig configuration.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::camera::Side;

/// Pairing window used when the config does not override it.
///
/// Matches the threshold the deployed rigs were tuned with; any realistic
/// partner delta falls inside it, so pairs only reopen on unrecorded partners.
pub const DEFAULT_PAIR_WINDOW_MS: u64 = 1_000_000_000;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("enclosure {enclosure_id} has no {side}_camera_details")]
    MissingCamera { enclosure_id: String, side: Side },
    #[error("serial number {0} is configured more than once")]
    DuplicateSerial(String),
    #[error("enclosure {enclosure_id} uses serial number {serial_number} for both sides")]
    SharedSerial {
        enclosure_id: String,
        serial_number: String,
    },
    #[error("enclosure id {0} is configured more than once")]
    DuplicateEnclosure(String),
    #[error("config has no `{0}` entry")]
    MissingField(&'static str),
}

/// Per-camera record inside an enclosure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDetails {
    #[serde(deserialize_with = "string_or_number")]
    pub serial_number: String,
    pub ip_address: String,
    pub settings_file: PathBuf,
}

/// One physical rig: a pen with a left and a right camera.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnclosureConfig {
    #[serde(deserialize_with = "string_or_number")]
    pub enclosure_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub pen_id: String,
    pub pen_name: String,
    #[serde(default)]
    pub left_camera_details: Option<CameraDetails>,
    #[serde(default)]
    pub right_camera_details: Option<CameraDetails>,
}

impl EnclosureConfig {
    /// Camera record for `side`, or a [`ConfigError::MissingCamera`].
    pub fn camera(&self, side: Side) -> Result<&CameraDetails, ConfigError> {
        let details = match side {
            Side::Left => self.left_camera_details.as_ref(),
            Side::Right => self.right_camera_details.as_ref(),
        };
        details.ok_or_else(|| ConfigError::MissingCamera {
            enclosure_id: self.enclosure_id.clone(),
            side,
        })
    }
}

fn default_frames_to_grab() -> u32 {
    10
}

fn default_max_cameras() -> usize {
    2
}

fn default_retrieve_timeout_ms() -> u64 {
    5000
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_jpeg_quality() -> u8 {
    95
}

fn default_pair_window_ms() -> u64 {
    DEFAULT_PAIR_WINDOW_MS
}

/// Capture loop tuning. Every field has a default so the section is optional.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureParams {
    /// Number of frames retrieved by one stereo run.
    #[serde(default = "default_frames_to_grab")]
    pub frames_to_grab: u32,
    /// Upper bound on devices attached from the enumeration.
    #[serde(default = "default_max_cameras")]
    pub max_cameras: usize,
    #[serde(default = "default_retrieve_timeout_ms")]
    pub retrieve_timeout_ms: u64,
    /// Pause after latching the camera timestamps, before grabbing starts.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_pair_window_ms")]
    pub pair_window_ms: u64,
}

impl Default for CaptureParams {
    fn default() -> Self {
        Self {
            frames_to_grab: default_frames_to_grab(),
            max_cameras: default_max_cameras(),
            retrieve_timeout_ms: default_retrieve_timeout_ms(),
            settle_ms: default_settle_ms(),
            jpeg_quality: default_jpeg_quality(),
            pair_window_ms: default_pair_window_ms(),
        }
    }
}

/// Top-level configuration document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RigConfig {
    pub base_directory: PathBuf,
    #[serde(default)]
    pub farm_name: String,
    #[serde(default)]
    pub enclosures: Vec<EnclosureConfig>,
    /// Settings file for single-camera calibration runs.
    #[serde(default)]
    pub settings_file: Option<PathBuf>,
    #[serde(default)]
    pub capture: CaptureParams,
}

impl RigConfig {
    /// Load and validate a JSON config from disk.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip_all, fields(path = %path.as_ref().display())))]
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&raw)?;
        log::info!(
            "loaded config {} (farm {:?}, {} enclosures)",
            path.display(),
            config.farm_name,
            config.enclosures.len()
        );
        Ok(config)
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check that every enclosure has both cameras and a unique id.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for enclosure in &self.enclosures {
            if !seen.insert(enclosure.enclosure_id.as_str()) {
                return Err(ConfigError::DuplicateEnclosure(
                    enclosure.enclosure_id.clone(),
                ));
            }
            for side in Side::BOTH {
                enclosure.camera(side)?;
            }
        }
        Ok(())
    }

    /// Check the entries a stereo run needs beyond [`RigConfig::validate`].
    ///
    /// `farm_name` is optional for calibration runs but names both the farm
    /// directory and every stereo file.
    pub fn validate_stereo(&self) -> Result<(), ConfigError> {
        if self.farm_name.trim().is_empty() {
            return Err(ConfigError::MissingField("farm_name"));
        }
        self.validate()
    }

    /// `<base_directory>/<farm_name>`
    pub fn farm_dir(&self) -> PathBuf {
        self.base_directory.join(&self.farm_name)
    }

    /// Settings file for calibration runs.
    pub fn calibration_settings_file(&self) -> Result<&Path, ConfigError> {
        self.settings_file
            .as_deref()
            .ok_or(ConfigError::MissingField("settings_file"))
    }
}

/// Accept identifiers written either as JSON strings or as numbers.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(x) => x.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_PEN: &str = r#"{
        "base_directory": "/root/data",
        "farm_name": "Blom",
        "enclosures": [
            {
                "enclosure_id": 1,
                "pen_id": 4,
                "pen_name": "kjeppevikholmen-4",
                "left_camera_details": {
                    "serial_number": "40029797",
                    "ip_address": "192.168.1.11",
                    "settings_file": "/root/config/left.pfs"
                },
                "right_camera_details": {
                    "serial_number": 40020177,
                    "ip_address": "192.168.1.12",
                    "settings_file": "/root/config/right.pfs"
                }
            }
        ]
    }"#;

    #[test]
    fn parses_numeric_identifiers_as_strings() {
        let config = RigConfig::from_json_str(ONE_PEN).expect("config");
        let enclosure = &config.enclosures[0];
        assert_eq!(enclosure.enclosure_id, "1");
        assert_eq!(enclosure.pen_id, "4");
        let right = enclosure.camera(Side::Right).expect("right");
        assert_eq!(right.serial_number, "40020177");
        assert_eq!(config.farm_dir(), PathBuf::from("/root/data/Blom"));
    }

    #[test]
    fn capture_section_defaults() {
        let config = RigConfig::from_json_str(ONE_PEN).expect("config");
        assert_eq!(config.capture, CaptureParams::default());
        assert_eq!(config.capture.frames_to_grab, 10);
        assert_eq!(config.capture.max_cameras, 2);
        assert_eq!(config.capture.retrieve_timeout_ms, 5000);
        assert_eq!(config.capture.pair_window_ms, DEFAULT_PAIR_WINDOW_MS);
    }

    #[test]
    fn capture_section_overrides() {
        let raw = r#"{
            "base_directory": "/tmp",
            "capture": {"frames_to_grab": 4, "pair_window_ms": 40}
        }"#;
        let config = RigConfig::from_json_str(raw).expect("config");
        assert_eq!(config.capture.frames_to_grab, 4);
        assert_eq!(config.capture.pair_window_ms, 40);
        assert_eq!(config.capture.jpeg_quality, 95);
    }

    #[test]
    fn missing_right_camera_is_reported() {
        let raw = r#"{
            "base_directory": "/tmp",
            "farm_name": "f",
            "enclosures": [{
                "enclosure_id": "e7", "pen_id": "7", "pen_name": "p7",
                "left_camera_details": {"serial_number": "A", "ip_address": "", "settings_file": "a.pfs"}
            }]
        }"#;
        let err = RigConfig::from_json_str(raw).expect_err("incomplete enclosure");
        match err {
            ConfigError::MissingCamera { enclosure_id, side } => {
                assert_eq!(enclosure_id, "e7");
                assert_eq!(side, Side::Right);
            }
            other => panic!("unexpected error: {other}"),
        }
        let msg = RigConfig::from_json_str(raw).unwrap_err().to_string();
        assert!(msg.contains("right_camera_details"), "message was {msg}");
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = RigConfig::from_json_str("{ \"base_directory\": ").expect_err("bad json");
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = RigConfig::load_json(dir.path().join("absent.json")).expect_err("missing");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn write_then_load_preserves_topology() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let config = RigConfig::from_json_str(ONE_PEN).expect("config");
        config.write_json(&path).expect("write");
        let loaded = RigConfig::load_json(&path).expect("load");
        assert_eq!(loaded.enclosures.len(), 1);
        assert_eq!(loaded.enclosures[0].pen_name, "kjeppevikholmen-4");
    }

    #[test]
    fn duplicate_enclosure_ids_are_rejected() {
        let raw = r#"{
            "base_directory": "/tmp",
            "farm_name": "f",
            "enclosures": [
                {
                    "enclosure_id": 1, "pen_id": "1", "pen_name": "p1",
                    "left_camera_details": {"serial_number": "L1", "ip_address": "", "settings_file": "l1.pfs"},
                    "right_camera_details": {"serial_number": "R1", "ip_address": "", "settings_file": "r1.pfs"}
                },
                {
                    "enclosure_id": "1", "pen_id": "2", "pen_name": "p2",
                    "left_camera_details": {"serial_number": "L2", "ip_address": "", "settings_file": "l2.pfs"},
                    "right_camera_details": {"serial_number": "R2", "ip_address": "", "settings_file": "r2.pfs"}
                }
            ]
        }"#;
        let err = RigConfig::from_json_str(raw).expect_err("duplicate enclosure id");
        assert!(matches!(err, ConfigError::DuplicateEnclosure(ref id) if id == "1"));
    }

    #[test]
    fn camera_without_ip_address_is_rejected() {
        let raw = r#"{
            "base_directory": "/tmp",
            "farm_name": "f",
            "enclosures": [{
                "enclosure_id": "e1", "pen_id": "1", "pen_name": "p1",
                "left_camera_details": {"serial_number": "L1", "settings_file": "l1.pfs"},
                "right_camera_details": {"serial_number": "R1", "ip_address": "", "settings_file": "r1.pfs"}
            }]
        }"#;
        let err = RigConfig::from_json_str(raw).expect_err("no ip_address");
        assert!(err.to_string().contains("ip_address"), "message was {err}");
    }

    #[test]
    fn stereo_runs_need_a_farm_name() {
        let raw = ONE_PEN.replace(r#""farm_name": "Blom","#, "");
        let config = RigConfig::from_json_str(&raw).expect("farm name is optional to load");
        assert!(matches!(
            config.validate_stereo(),
            Err(ConfigError::MissingField("farm_name"))
        ));
        let full = RigConfig::from_json_str(ONE_PEN).expect("config");
        full.validate_stereo().expect("complete stereo config");
    }

    #[test]
    fn calibration_settings_file_is_required_on_demand() {
        let config = RigConfig::from_json_str(ONE_PEN).expect("config");
        assert!(matches!(
            config.calibration_settings_file(),
            Err(ConfigError::MissingField("settings_file"))
        ));
    }
}
