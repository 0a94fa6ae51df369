//! Single-camera calibration sweep.
//!
//! Captures an optional auto exposure/gain reference image, then one image
//! for every exposure x gain combination of the optical inputs. The batch
//! directory also receives the effective camera settings and a copy of the
//! optical inputs.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use pencam_core::{
    calibration_auto_file_name, calibration_file_name, calibration_stamp, CalibrationPlan,
    OpticalInputs, RigConfig,
};
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::CaptureError;
use crate::session::{
    CameraSystem, DeviceContext, ExposureMode, GrabLimit, GrabResult, SessionError,
};
use crate::writer::{ensure_dir, ImageWriter};

/// What a calibration run wrote.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CalibrationSummary {
    pub data_dir: PathBuf,
    pub auto_image: Option<PathBuf>,
    pub sweep_images: Vec<PathBuf>,
    pub failed_grabs: u32,
}

/// Run a full calibration batch on the first enumerated camera.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(fish_id = %inputs.fish_id, batch_id = %inputs.batch_id)))]
pub fn run_calibration(
    system: &mut impl CameraSystem,
    config: &RigConfig,
    inputs: &OpticalInputs,
) -> Result<CalibrationSummary, CaptureError> {
    let plan = inputs.plan(&config.base_directory)?;
    let settings_file = config.calibration_settings_file()?;
    let writer = ImageWriter::new(config.capture.jpeg_quality);
    let timeout = Duration::from_millis(config.capture.retrieve_timeout_ms);

    let device = system
        .enumerate_devices()?
        .into_iter()
        .next()
        .ok_or(SessionError::NoDevices)?;
    let context = system.open(&device)?;
    log::info!("using device {} ({})", device.model_name, device.serial_number);

    ensure_dir(&plan.data_dir)?;
    system.load_settings(context, settings_file)?;
    system.save_settings(context, &plan.data_dir.join("settings.pfs"))?;
    inputs.write_json(plan.data_dir.join("optical_inputs.json"))?;

    let mut summary = CalibrationSummary {
        data_dir: plan.data_dir.clone(),
        ..CalibrationSummary::default()
    };

    if plan.auto_image {
        summary.auto_image =
            capture_auto_image(system, context, &plan, &writer, timeout, &mut summary.failed_grabs)?;
    }
    capture_sweep(system, context, &plan, &writer, timeout, &mut summary)?;

    log::info!(
        "calibration batch done: {} sweep images in {}",
        summary.sweep_images.len(),
        plan.data_dir.display()
    );
    Ok(summary)
}

fn capture_auto_image(
    system: &mut impl CameraSystem,
    context: DeviceContext,
    plan: &CalibrationPlan,
    writer: &ImageWriter,
    timeout: Duration,
    failed_grabs: &mut u32,
) -> Result<Option<PathBuf>, CaptureError> {
    system.set_exposure(context, ExposureMode::Auto)?;
    system.start_grabbing(GrabLimit::Frames(plan.warmup_frames + 1))?;

    let mut warmed = 0;
    let mut written = None;
    while system.is_grabbing() {
        match system.retrieve(timeout)? {
            GrabResult::Succeeded(frame) => {
                if warmed < plan.warmup_frames {
                    warmed += 1;
                    continue;
                }
                let stamp = calibration_stamp(Local::now().naive_local());
                let path = plan.data_dir.join(calibration_auto_file_name(&stamp));
                writer.write(&path, &frame.image)?;
                log::info!("auto settings image captured: {}", path.display());
                written = Some(path);
                break;
            }
            GrabResult::Failed {
                code, description, ..
            } => {
                log::warn!("grab failed: {code:#x} {description}");
                *failed_grabs += 1;
            }
        }
    }
    system.stop_grabbing();
    Ok(written)
}

fn capture_sweep(
    system: &mut impl CameraSystem,
    context: DeviceContext,
    plan: &CalibrationPlan,
    writer: &ImageWriter,
    timeout: Duration,
    summary: &mut CalibrationSummary,
) -> Result<(), CaptureError> {
    system.start_grabbing(GrabLimit::Frames(plan.grab_budget))?;

    let mut index = 0;
    let mut first_frame = true;
    while system.is_grabbing() && index < plan.combinations.len() {
        let setting = plan.combinations[index];
        system.set_exposure(context, ExposureMode::Manual(setting))?;

        match system.retrieve(timeout)? {
            // the first frame was exposed before the manual settings applied
            GrabResult::Succeeded(_) if first_frame => first_frame = false,
            GrabResult::Succeeded(frame) => {
                let stamp = calibration_stamp(Local::now().naive_local());
                let path = plan.data_dir.join(calibration_file_name(
                    &stamp,
                    setting.gain,
                    setting.exposure,
                ));
                writer.write(&path, &frame.image)?;
                log::info!(
                    "exposure {} gain {} -> {}",
                    setting.exposure,
                    setting.gain,
                    path.display()
                );
                summary.sweep_images.push(path);
                index += 1;
            }
            GrabResult::Failed {
                code, description, ..
            } => {
                log::warn!("grab failed: {code:#x} {description}");
                summary.failed_grabs += 1;
            }
        }
    }
    system.stop_grabbing();
    Ok(())
}
