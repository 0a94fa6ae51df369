//! Output directory layout and file names.
//!
//! Stereo images:
//! `<base>/<farm>/<pen_name>/<side>_<farm>_<pen_id>_<pair_timestamp>.jpg`
//!
//! Calibration images:
//! `<base>/fish_id_<fish>_side_<side>/batch_id_<batch>/<stamp>_gain_<g>_exposure_<e>.jpg`

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::camera::{CameraDescriptor, Side};

/// `<base>/<farm>/<pen_name>`
pub fn pen_dir(base_directory: &Path, farm_name: &str, pen_name: &str) -> PathBuf {
    base_directory.join(farm_name).join(pen_name)
}

pub fn stereo_file_name(side: Side, farm_name: &str, pen_id: &str, pair_timestamp_ms: u64) -> String {
    format!("{side}_{farm_name}_{pen_id}_{pair_timestamp_ms}.jpg")
}

/// Full path of the image `camera` contributes to the pair `pair_timestamp_ms`.
pub fn stereo_image_path(
    base_directory: &Path,
    farm_name: &str,
    camera: &CameraDescriptor,
    pair_timestamp_ms: u64,
) -> PathBuf {
    pen_dir(base_directory, farm_name, &camera.pen_name).join(stereo_file_name(
        camera.side,
        farm_name,
        &camera.pen_id,
        pair_timestamp_ms,
    ))
}

/// Data directory of one calibration batch.
pub fn calibration_dir(base_directory: &Path, fish_id: &str, side: &str, batch_id: &str) -> PathBuf {
    base_directory
        .join(format!("fish_id_{fish_id}_side_{side}"))
        .join(format!("batch_id_{batch_id}"))
}

/// Second-resolution stamp used as calibration file prefix, e.g. `20190412T153005`.
pub fn calibration_stamp(time: NaiveDateTime) -> String {
    time.format("%Y%m%dT%H%M%S").to_string()
}

pub fn calibration_file_name(stamp: &str, gain: f64, exposure: f64) -> String {
    format!("{stamp}_gain_{gain}_exposure_{exposure}.jpg")
}

pub fn calibration_auto_file_name(stamp: &str) -> String {
    format!("{stamp}_gain_auto_exposure_auto.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn stereo_path_layout() {
        let camera = CameraDescriptor {
            serial_number: "40029797".to_string(),
            side: Side::Left,
            partner_serial_number: "40020177".to_string(),
            ip_address: String::new(),
            enclosure_id: "1".to_string(),
            pen_id: "4".to_string(),
            pen_name: "north".to_string(),
            settings_file: PathBuf::from("left.pfs"),
        };
        let path = stereo_image_path(Path::new("/data"), "Blom", &camera, 1_555_000_000_123);
        assert_eq!(
            path,
            PathBuf::from("/data/Blom/north/left_Blom_4_1555000000123.jpg")
        );
    }

    #[test]
    fn calibration_layout() {
        let dir = calibration_dir(Path::new("/cal"), "17", "left", "3");
        assert_eq!(dir, PathBuf::from("/cal/fish_id_17_side_left/batch_id_3"));

        let t = NaiveDate::from_ymd_opt(2019, 4, 12)
            .and_then(|d| d.and_hms_opt(15, 30, 5))
            .expect("valid time");
        let stamp = calibration_stamp(t);
        assert_eq!(stamp, "20190412T153005");
        assert_eq!(
            calibration_file_name(&stamp, 100.0, 4000.0),
            "20190412T153005_gain_100_exposure_4000.jpg"
        );
        assert_eq!(
            calibration_file_name(&stamp, 0.5, 250.0),
            "20190412T153005_gain_0.5_exposure_250.jpg"
        );
        assert_eq!(
            calibration_auto_file_name(&stamp),
            "20190412T153005_gain_auto_exposure_auto.jpg"
        );
    }
}
