//! JPEG persistence of grabbed frames.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageBuffer, Luma, Rgb};
use pencam_core::{stereo_image_path, CameraDescriptor};

use crate::session::{FrameImage, PixelFormat};

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{width}x{height} {format:?} frame needs {expected} bytes, got {got}")]
    BufferSize {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        got: usize,
    },
}

/// Writes frames as JPEG files, creating parent directories on demand.
#[derive(Clone, Copy, Debug)]
pub struct ImageWriter {
    quality: u8,
}

impl Default for ImageWriter {
    fn default() -> Self {
        Self::new(95)
    }
}

impl ImageWriter {
    /// `quality` is clamped to 1..=100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Write the image of `camera` for the pair `pair_timestamp_ms` and
    /// return its path.
    pub fn write_stereo(
        &self,
        base_directory: &Path,
        farm_name: &str,
        camera: &CameraDescriptor,
        pair_timestamp_ms: u64,
        image: &FrameImage,
    ) -> Result<PathBuf, WriteError> {
        let path = stereo_image_path(base_directory, farm_name, camera, pair_timestamp_ms);
        self.write(&path, image)?;
        Ok(path)
    }

    pub fn write(&self, path: &Path, image: &FrameImage) -> Result<(), WriteError> {
        let dynamic = to_dynamic(image)?;
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }

        let io_err = |source| WriteError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut out = BufWriter::new(file);
        let encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
        dynamic
            .write_with_encoder(encoder)
            .map_err(|source| WriteError::Encode {
                path: path.to_path_buf(),
                source,
            })?;
        out.into_inner()
            .map_err(|e| io_err(e.into_error()))?
            .sync_all()
            .map_err(io_err)?;

        log::debug!("wrote {}", path.display());
        Ok(())
    }
}

/// Create `dir` and all missing ancestors.
pub fn ensure_dir(dir: &Path) -> Result<(), WriteError> {
    fs::create_dir_all(dir).map_err(|source| WriteError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

fn to_dynamic(image: &FrameImage) -> Result<DynamicImage, WriteError> {
    let expected = image.width as usize * image.height as usize * image.format.channels();
    let size_err = || WriteError::BufferSize {
        width: image.width,
        height: image.height,
        format: image.format,
        expected,
        got: image.data.len(),
    };
    if image.data.len() != expected {
        return Err(size_err());
    }

    let data = image.data.clone();
    Ok(match image.format {
        PixelFormat::Mono8 => DynamicImage::ImageLuma8(
            ImageBuffer::<Luma<u8>, _>::from_raw(image.width, image.height, data)
                .ok_or_else(size_err)?,
        ),
        PixelFormat::Rgb8 => DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, _>::from_raw(image.width, image.height, data)
                .ok_or_else(size_err)?,
        ),
    })
}
