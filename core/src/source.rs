use crate::prelude::{FrameSource, LightCheckError, LightCheckResult};
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Replays still images from a directory in file-name order.
pub struct ImageSequence {
    files: Vec<PathBuf>,
    cursor: usize,
    repeat: bool,
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(dir: P, repeat: bool) -> LightCheckResult<Self> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if is_image {
                files.push(path);
            }
        }
        files.sort();
        if files.is_empty() {
            return Err(LightCheckError::InvalidConfig(format!(
                "no images in {}",
                dir.as_ref().display()
            )));
        }
        Ok(Self {
            files,
            cursor: 0,
            repeat,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> LightCheckResult<Option<RgbImage>> {
        if self.cursor >= self.files.len() {
            if !self.repeat {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let path = &self.files[self.cursor];
        self.cursor += 1;
        let frame = image::open(path)
            .map_err(|err| LightCheckError::Camera(format!("{}: {}", path.display(), err)))?;
        Ok(Some(frame.to_rgb8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    #[test]
    fn replays_images_in_name_order_then_ends() {
        let dir = tempdir().unwrap();
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]))
            .save(dir.path().join("a.png"))
            .unwrap();
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageSequence::open(dir.path(), false).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(
            *source.next_frame().unwrap().unwrap().get_pixel(0, 0),
            Rgb([255, 0, 0])
        );
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn repeating_sequence_wraps_around() {
        let dir = tempdir().unwrap();
        RgbImage::new(2, 2).save(dir.path().join("only.png")).unwrap();
        let mut source = ImageSequence::open(dir.path(), true).unwrap();
        for _ in 0..3 {
            assert!(source.next_frame().unwrap().is_some());
        }
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(ImageSequence::open(dir.path(), false).is_err());
    }

    #[test]
    fn unreadable_image_is_a_camera_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let mut source = ImageSequence::open(dir.path(), false).unwrap();
        assert!(matches!(source.next_frame(), Err(LightCheckError::Camera(_))));
    }
}
