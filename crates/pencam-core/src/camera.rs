//! Camera descriptors and the serial-number keyed registry.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, RigConfig};

/// Physical position of a camera in a stereo enclosure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the capture loop needs to know about one camera.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub serial_number: String,
    pub side: Side,
    /// Serial number of the other camera in the same enclosure.
    pub partner_serial_number: String,
    pub ip_address: String,
    pub enclosure_id: String,
    pub pen_id: String,
    pub pen_name: String,
    pub settings_file: PathBuf,
}

/// Immutable set of camera descriptors keyed by serial number.
///
/// Partner links are symmetric: if `a.partner == b` then `b.partner == a`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CameraRegistry {
    cameras: BTreeMap<String, CameraDescriptor>,
}

impl CameraRegistry {
    /// Build the registry from a validated rig config.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(config), fields(enclosures = config.enclosures.len()))
    )]
    pub fn from_config(config: &RigConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut cameras = BTreeMap::new();

        for enclosure in &config.enclosures {
            let left = enclosure.camera(Side::Left)?;
            let right = enclosure.camera(Side::Right)?;
            if left.serial_number == right.serial_number {
                return Err(ConfigError::SharedSerial {
                    enclosure_id: enclosure.enclosure_id.clone(),
                    serial_number: left.serial_number.clone(),
                });
            }

            for side in Side::BOTH {
                let details = enclosure.camera(side)?;
                let partner = enclosure.camera(side.opposite())?;
                let descriptor = CameraDescriptor {
                    serial_number: details.serial_number.clone(),
                    side,
                    partner_serial_number: partner.serial_number.clone(),
                    ip_address: details.ip_address.clone(),
                    enclosure_id: enclosure.enclosure_id.clone(),
                    pen_id: enclosure.pen_id.clone(),
                    pen_name: enclosure.pen_name.clone(),
                    settings_file: details.settings_file.clone(),
                };
                if cameras
                    .insert(descriptor.serial_number.clone(), descriptor)
                    .is_some()
                {
                    return Err(ConfigError::DuplicateSerial(details.serial_number.clone()));
                }
            }
        }

        log::debug!("camera registry built with {} cameras", cameras.len());
        Ok(Self { cameras })
    }

    pub fn get(&self, serial_number: &str) -> Option<&CameraDescriptor> {
        self.cameras.get(serial_number)
    }

    /// Descriptor of the camera paired with `serial_number`.
    pub fn partner(&self, serial_number: &str) -> Option<&CameraDescriptor> {
        self.get(serial_number)
            .and_then(|camera| self.get(&camera.partner_serial_number))
    }

    pub fn serial_numbers(&self) -> impl Iterator<Item = &str> {
        self.cameras.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraDescriptor> {
        self.cameras.values()
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}
