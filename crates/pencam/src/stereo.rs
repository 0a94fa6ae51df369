//! Stereo capture loop.
//!
//! Attaches the configured cameras, latches their timestamps, then for every
//! retrieved frame assigns a pair timestamp and writes the image under the
//! pen directory. Any device or write error ends the run.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use pencam_core::{
    CameraDescriptor, CameraRegistry, CaptureParams, Clock, PairingPolicy, PairingState,
    RigConfig, Side,
};
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::CaptureError;
use crate::session::{
    CameraSystem, DeviceContext, GrabLimit, GrabResult, GrabbedFrame, SessionError,
};
use crate::writer::{ImageWriter, WriteError};

/// One image written by the loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WrittenImage {
    pub serial_number: String,
    pub side: Side,
    pub hardware_timestamp_ms: u64,
    pub pair_timestamp_ms: u64,
    pub path: PathBuf,
}

/// What a stereo run did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StereoSummary {
    pub frames_retrieved: u32,
    pub failed_grabs: u32,
    pub pairs_opened: u32,
    pub images: Vec<WrittenImage>,
}

impl StereoSummary {
    /// Write the summary as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), WriteError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| WriteError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| WriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("wrote summary JSON to {}", path.display());
        Ok(())
    }
}

/// Stereo capture over the cameras of a rig config.
pub struct StereoCapture {
    base_directory: PathBuf,
    farm_name: String,
    params: CaptureParams,
    registry: CameraRegistry,
    pairing: PairingState,
    writer: ImageWriter,
    attached: HashMap<DeviceContext, CameraDescriptor>,
}

impl StereoCapture {
    pub fn new(config: &RigConfig) -> Result<Self, CaptureError> {
        let registry = CameraRegistry::from_config(config)?;
        if registry.is_empty() {
            return Err(CaptureError::NoEnclosures);
        }
        config.validate_stereo()?;
        Ok(Self {
            base_directory: config.base_directory.clone(),
            farm_name: config.farm_name.clone(),
            params: config.capture.clone(),
            pairing: PairingState::new(PairingPolicy::from(&config.capture)),
            writer: ImageWriter::new(config.capture.jpeg_quality),
            registry,
            attached: HashMap::new(),
        })
    }

    pub fn registry(&self) -> &CameraRegistry {
        &self.registry
    }

    pub fn pairing(&self) -> &PairingState {
        &self.pairing
    }

    /// Open up to `max_cameras` enumerated devices, load their settings and
    /// reset their timestamp counters.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn attach(&mut self, system: &mut impl CameraSystem) -> Result<usize, CaptureError> {
        let devices = system.enumerate_devices()?;
        if devices.is_empty() {
            return Err(SessionError::NoDevices.into());
        }

        for device in devices.iter().take(self.params.max_cameras) {
            let descriptor = self
                .registry
                .get(&device.serial_number)
                .cloned()
                .ok_or_else(|| CaptureError::UnknownCamera(device.serial_number.clone()))?;
            log::info!(
                "attaching {} with serial number {} ({} camera, pen {})",
                device.model_name,
                device.serial_number,
                descriptor.side,
                descriptor.pen_name
            );
            let context = system.open(device)?;
            system.load_settings(context, &descriptor.settings_file)?;
            self.attached.insert(context, descriptor);
        }

        for &context in self.attached.keys() {
            system.reset_timestamp(context)?;
        }
        Ok(self.attached.len())
    }

    /// Attach, grab `frames_to_grab` frames and write every successful one.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn run(
        &mut self,
        system: &mut impl CameraSystem,
        clock: &impl Clock,
    ) -> Result<StereoSummary, CaptureError> {
        self.attach(system)?;
        if self.params.settle_ms > 0 {
            thread::sleep(Duration::from_millis(self.params.settle_ms));
        }

        let timeout = Duration::from_millis(self.params.retrieve_timeout_ms);
        let mut summary = StereoSummary::default();
        system.start_grabbing(GrabLimit::Unbounded)?;

        for _ in 0..self.params.frames_to_grab {
            if !system.is_grabbing() {
                break;
            }
            let result = system.retrieve(timeout)?;
            summary.frames_retrieved += 1;
            match result {
                GrabResult::Succeeded(frame) => {
                    let (image, opened) = self.process_frame(frame, clock)?;
                    if opened {
                        summary.pairs_opened += 1;
                    }
                    summary.images.push(image);
                }
                GrabResult::Failed {
                    context,
                    code,
                    description,
                } => {
                    log::warn!("grab failed on context {context}: {code:#x} {description}");
                    summary.failed_grabs += 1;
                }
            }
        }

        system.stop_grabbing();
        log::info!(
            "stereo run done: {} frames, {} images, {} pairs",
            summary.frames_retrieved,
            summary.images.len(),
            summary.pairs_opened
        );
        Ok(summary)
    }

    /// Pair and persist one frame. Returns the written image and whether it
    /// opened a new pair.
    pub fn process_frame(
        &mut self,
        frame: GrabbedFrame,
        clock: &impl Clock,
    ) -> Result<(WrittenImage, bool), CaptureError> {
        let camera = self
            .attached
            .get(&frame.context)
            .ok_or(SessionError::UnknownContext(frame.context))?;

        let assignment = self.pairing.assign(camera, frame.timestamp_ms, clock);
        log::info!(
            "timestamp for stereo image pair (ms) {}: {}",
            camera.serial_number,
            assignment.pair_timestamp_ms
        );
        let path = self.writer.write_stereo(
            &self.base_directory,
            &self.farm_name,
            camera,
            assignment.pair_timestamp_ms,
            &frame.image,
        )?;
        log::info!("wrote image to {}", path.display());

        Ok((
            WrittenImage {
                serial_number: camera.serial_number.clone(),
                side: camera.side,
                hardware_timestamp_ms: frame.timestamp_ms,
                pair_timestamp_ms: assignment.pair_timestamp_ms,
                path,
            },
            assignment.opened,
        ))
    }
}
