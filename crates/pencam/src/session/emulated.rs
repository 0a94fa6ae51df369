//! Deterministic in-process camera backend.
//!
//! Serves synthetic gradient frames round-robin over the opened devices. Each
//! device's hardware clock advances by `frame_interval_ms` per frame and
//! starts `skew_ms * context` after a timestamp reset, which is what a
//! triggered stereo pair looks like to the pairing engine.

use std::fs;
use std::path::Path;
use std::time::Duration;

use super::{
    CameraSystem, DeviceContext, DeviceInfo, ExposureMode, FeatureSet, FrameImage, GrabLimit,
    GrabResult, GrabbedFrame, PixelFormat, SessionError,
};

/// Knobs of the emulated devices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulatorParams {
    pub width: u32,
    pub height: u32,
    pub frame_interval_ms: u64,
    pub skew_ms: u64,
    /// Retrieval number (0-based) that reports a failed grab.
    pub fail_grab_at: Option<u64>,
    /// Retrievals after this many frames time out.
    pub stall_after: Option<u64>,
}

impl Default for EmulatorParams {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            frame_interval_ms: 100,
            skew_ms: 3,
            fail_grab_at: None,
            stall_after: None,
        }
    }
}

#[derive(Debug)]
struct EmulatedCamera {
    info: DeviceInfo,
    features: FeatureSet,
    exposure: ExposureMode,
    clock_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct GrabState {
    remaining: Option<u32>,
    next_context: DeviceContext,
}

/// A [`CameraSystem`] with no hardware behind it.
#[derive(Debug)]
pub struct EmulatedCameraSystem {
    params: EmulatorParams,
    attached: Vec<DeviceInfo>,
    open: Vec<EmulatedCamera>,
    grab: Option<GrabState>,
    retrievals: u64,
}

impl EmulatedCameraSystem {
    /// Emulate one device per serial number.
    pub fn new<I, S>(serial_numbers: I, params: EmulatorParams) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let attached = serial_numbers
            .into_iter()
            .map(|serial| DeviceInfo {
                serial_number: serial.into(),
                model_name: "Emulation".to_string(),
            })
            .collect();
        Self {
            params,
            attached,
            open: Vec::new(),
            grab: None,
            retrievals: 0,
        }
    }

    /// Emulate `count` devices with generated serial numbers.
    pub fn with_device_count(count: usize, params: EmulatorParams) -> Self {
        Self::new((0..count).map(|i| format!("0815-{i:04}")), params)
    }

    fn camera(&self, context: DeviceContext) -> Result<&EmulatedCamera, SessionError> {
        self.open
            .get(context)
            .ok_or(SessionError::UnknownContext(context))
    }

    fn camera_mut(&mut self, context: DeviceContext) -> Result<&mut EmulatedCamera, SessionError> {
        self.open
            .get_mut(context)
            .ok_or(SessionError::UnknownContext(context))
    }

    fn render(&self, camera: &EmulatedCamera, frame: u64) -> FrameImage {
        let width = camera
            .features
            .get_parsed("Width")
            .unwrap_or(self.params.width)
            .max(1);
        let height = camera
            .features
            .get_parsed("Height")
            .unwrap_or(self.params.height)
            .max(1);
        let format = match camera.features.get("PixelFormat") {
            Some("RGB8Packed") | Some("BGR8Packed") | Some("RGB8") => PixelFormat::Rgb8,
            _ => PixelFormat::Mono8,
        };
        let brightness = match camera.exposure {
            ExposureMode::Auto => 0.5,
            ExposureMode::Manual(eg) => {
                (eg.exposure / 10_000.0 * (1.0 + eg.gain / 100.0)).clamp(0.05, 1.0)
            }
        };

        let channels = format.channels();
        let mut data = Vec::with_capacity(width as usize * height as usize * channels);
        for y in 0..height {
            for x in 0..width {
                let ramp = ((x + y) as u64 * 255 / (width + height) as u64 + frame) % 256;
                let value = (ramp as f64 * brightness) as u8;
                for c in 0..channels {
                    data.push(value.saturating_add(c as u8 * 16));
                }
            }
        }
        FrameImage {
            width,
            height,
            format,
            data,
        }
    }
}

impl CameraSystem for EmulatedCameraSystem {
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>, SessionError> {
        Ok(self.attached.clone())
    }

    fn open(&mut self, device: &DeviceInfo) -> Result<DeviceContext, SessionError> {
        if !self.attached.contains(device) {
            return Err(SessionError::NotAttached(device.serial_number.clone()));
        }
        if self.open.iter().any(|c| c.info == *device) {
            return Err(SessionError::AlreadyOpen(device.serial_number.clone()));
        }
        self.open.push(EmulatedCamera {
            info: device.clone(),
            features: FeatureSet::default(),
            exposure: ExposureMode::Auto,
            clock_ms: 0,
        });
        Ok(self.open.len() - 1)
    }

    fn device_info(&self, context: DeviceContext) -> Result<&DeviceInfo, SessionError> {
        Ok(&self.camera(context)?.info)
    }

    fn load_settings(&mut self, context: DeviceContext, path: &Path) -> Result<(), SessionError> {
        let raw = fs::read_to_string(path).map_err(|source| SessionError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        let loaded: FeatureSet = raw.parse().map_err(|source| SessionError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })?;
        let camera = self.camera_mut(context)?;
        log::debug!(
            "{}: loaded {} features from {}",
            camera.info.serial_number,
            loaded.len(),
            path.display()
        );
        camera.features.merge(loaded);
        Ok(())
    }

    fn save_settings(&self, context: DeviceContext, path: &Path) -> Result<(), SessionError> {
        let camera = self.camera(context)?;
        fs::write(path, camera.features.to_string()).map_err(|source| SessionError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })
    }

    fn reset_timestamp(&mut self, context: DeviceContext) -> Result<(), SessionError> {
        let skew = self.params.skew_ms;
        let camera = self.camera_mut(context)?;
        camera.clock_ms = skew * context as u64;
        Ok(())
    }

    fn set_exposure(
        &mut self,
        context: DeviceContext,
        mode: ExposureMode,
    ) -> Result<(), SessionError> {
        let camera = self.camera_mut(context)?;
        match mode {
            ExposureMode::Auto => {
                camera.features.set("ExposureAuto", "Continuous");
                camera.features.set("GainAuto", "Continuous");
            }
            ExposureMode::Manual(eg) => {
                camera.features.set("ExposureAuto", "Off");
                camera.features.set("GainAuto", "Off");
                camera.features.set("ExposureTimeAbs", eg.exposure);
                camera.features.set("GainRaw", eg.gain);
            }
        }
        camera.exposure = mode;
        Ok(())
    }

    fn start_grabbing(&mut self, limit: GrabLimit) -> Result<(), SessionError> {
        if self.open.is_empty() {
            return Err(SessionError::NoDevices);
        }
        self.grab = Some(GrabState {
            remaining: match limit {
                GrabLimit::Unbounded => None,
                GrabLimit::Frames(n) => Some(n),
            },
            next_context: 0,
        });
        Ok(())
    }

    fn stop_grabbing(&mut self) {
        self.grab = None;
    }

    fn is_grabbing(&self) -> bool {
        matches!(self.grab, Some(g) if g.remaining != Some(0))
    }

    fn retrieve(&mut self, timeout: Duration) -> Result<GrabResult, SessionError> {
        if !self.is_grabbing() {
            return Err(SessionError::NotGrabbing);
        }
        if matches!(self.params.stall_after, Some(n) if self.retrievals >= n) {
            return Err(SessionError::Timeout(timeout));
        }
        let Some(mut grab) = self.grab else {
            return Err(SessionError::NotGrabbing);
        };

        let context = grab.next_context;
        grab.next_context = (context + 1) % self.open.len();
        if let Some(remaining) = grab.remaining.as_mut() {
            *remaining -= 1;
        }
        self.grab = Some(grab);

        let retrieval = self.retrievals;
        self.retrievals += 1;
        let interval = self.params.frame_interval_ms;
        let camera = self.camera_mut(context)?;
        let timestamp_ms = camera.clock_ms;
        camera.clock_ms += interval;

        if self.params.fail_grab_at == Some(retrieval) {
            return Ok(GrabResult::Failed {
                context,
                code: 0xe100_0014,
                description: "emulated buffer underrun".to_string(),
            });
        }

        let image = self.render(self.camera(context)?, retrieval);
        Ok(GrabResult::Succeeded(GrabbedFrame {
            context,
            timestamp_ms,
            image,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pencam_core::ExposureGain;

    fn opened(serials: &[&str], params: EmulatorParams) -> EmulatedCameraSystem {
        let mut system = EmulatedCameraSystem::new(serials.iter().copied(), params);
        for device in system.enumerate_devices().expect("enumerate") {
            let ctx = system.open(&device).expect("open");
            system.reset_timestamp(ctx).expect("reset");
        }
        system
    }

    fn frame(result: GrabResult) -> GrabbedFrame {
        match result {
            GrabResult::Succeeded(frame) => frame,
            GrabResult::Failed { description, .. } => panic!("grab failed: {description}"),
        }
    }

    #[test]
    fn frames_alternate_with_skewed_clocks() {
        let mut system = opened(&["L", "R"], EmulatorParams::default());
        system.start_grabbing(GrabLimit::Unbounded).expect("start");
        let timeout = Duration::from_millis(5000);

        let f0 = frame(system.retrieve(timeout).expect("f0"));
        let f1 = frame(system.retrieve(timeout).expect("f1"));
        let f2 = frame(system.retrieve(timeout).expect("f2"));

        assert_eq!((f0.context, f0.timestamp_ms), (0, 0));
        assert_eq!((f1.context, f1.timestamp_ms), (1, 3));
        assert_eq!((f2.context, f2.timestamp_ms), (0, 100));
        assert_eq!(f0.image.data.len(), 64 * 48);
    }

    #[test]
    fn bounded_grab_stops_after_limit() {
        let mut system = opened(&["only"], EmulatorParams::default());
        system.start_grabbing(GrabLimit::Frames(2)).expect("start");
        let timeout = Duration::from_millis(10);
        assert!(system.is_grabbing());
        system.retrieve(timeout).expect("first");
        system.retrieve(timeout).expect("second");
        assert!(!system.is_grabbing());
        assert!(matches!(
            system.retrieve(timeout),
            Err(SessionError::NotGrabbing)
        ));
    }

    #[test]
    fn stall_reports_timeout() {
        let params = EmulatorParams {
            stall_after: Some(1),
            ..EmulatorParams::default()
        };
        let mut system = opened(&["only"], params);
        system.start_grabbing(GrabLimit::Unbounded).expect("start");
        let timeout = Duration::from_millis(250);
        system.retrieve(timeout).expect("first frame");
        match system.retrieve(timeout) {
            Err(SessionError::Timeout(t)) => assert_eq!(t, timeout),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn settings_drive_frame_geometry_and_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = dir.path().join("cam.pfs");
        fs::write(&settings, "Width\t8\nHeight\t4\nPixelFormat\tRGB8Packed\n").expect("write");

        let mut system = opened(&["only"], EmulatorParams::default());
        system.load_settings(0, &settings).expect("load");
        system
            .set_exposure(
                0,
                ExposureMode::Manual(ExposureGain {
                    exposure: 2500.0,
                    gain: 12.0,
                }),
            )
            .expect("exposure");
        system.start_grabbing(GrabLimit::Frames(1)).expect("start");
        let f = frame(system.retrieve(Duration::from_millis(10)).expect("frame"));
        assert_eq!((f.image.width, f.image.height), (8, 4));
        assert_eq!(f.image.format, PixelFormat::Rgb8);
        assert_eq!(f.image.data.len(), 8 * 4 * 3);

        let saved = dir.path().join("saved.pfs");
        system.save_settings(0, &saved).expect("save");
        let reloaded: FeatureSet = fs::read_to_string(&saved)
            .expect("read saved")
            .parse()
            .expect("parse saved");
        assert_eq!(reloaded.get("ExposureTimeAbs"), Some("2500"));
        assert_eq!(reloaded.get("GainRaw"), Some("12"));
        assert_eq!(reloaded.get("Width"), Some("8"));
    }

    #[test]
    fn missing_settings_file_is_a_session_error() {
        let mut system = opened(&["only"], EmulatorParams::default());
        let err = system
            .load_settings(0, Path::new("/nonexistent/cam.pfs"))
            .expect_err("missing file");
        assert!(matches!(err, SessionError::SettingsIo { .. }));
    }

    #[test]
    fn opening_twice_is_rejected() {
        let mut system = EmulatedCameraSystem::with_device_count(1, EmulatorParams::default());
        let device = system.enumerate_devices().expect("enumerate").remove(0);
        system.open(&device).expect("first open");
        assert!(matches!(
            system.open(&device),
            Err(SessionError::AlreadyOpen(_))
        ));
    }
}
