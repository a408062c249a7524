//! Video4Linux capture through `rscam`, enabled by the `camera` feature.

use image::RgbImage;
use lightcore::{FrameSource, LightCheckError, LightCheckResult};
use rscam::{Camera, Config as CameraConfig};

/// MJPEG camera stream. The device is released when this is dropped.
pub struct V4lCamera {
    camera: Camera,
    device: String,
}

impl V4lCamera {
    pub fn open(device: &str, resolution: (u32, u32)) -> LightCheckResult<Self> {
        let mut camera = Camera::new(device)
            .map_err(|err| LightCheckError::Camera(format!("opening {}: {}", device, err)))?;
        camera
            .start(&CameraConfig {
                interval: (1, 30),
                resolution,
                format: b"MJPG",
                ..Default::default()
            })
            .map_err(|err| LightCheckError::Camera(format!("starting {}: {}", device, err)))?;
        Ok(Self {
            camera,
            device: device.to_string(),
        })
    }
}

impl FrameSource for V4lCamera {
    fn next_frame(&mut self) -> LightCheckResult<Option<RgbImage>> {
        let frame = self
            .camera
            .capture()
            .map_err(|err| LightCheckError::Camera(format!("{}: {}", self.device, err)))?;
        let decoded = image::load_from_memory(&frame)
            .map_err(|err| LightCheckError::Camera(format!("{}: {}", self.device, err)))?;
        Ok(Some(decoded.to_rgb8()))
    }
}
