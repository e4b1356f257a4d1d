//! Single-image source: one frame, then end of stream.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::FrameSource;
use crate::frame::Frame;

pub struct StillImageSource {
    path: PathBuf,
    image: Option<RgbImage>,
}

impl StillImageSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path, image: None }
    }
}

impl FrameSource for StillImageSource {
    fn describe(&self) -> String {
        format!("image {}", self.path.display())
    }

    fn open(&mut self) -> Result<()> {
        let image = image::open(&self.path)
            .with_context(|| format!("failed to open image {}", self.path.display()))?
            .into_rgb8();
        log::info!(
            "StillImageSource: loaded {} ({}x{})",
            self.path.display(),
            image.width(),
            image.height()
        );
        self.image = Some(image);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.image.take() {
            Some(image) => Ok(Some(Frame::new(image, 0))),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.image = None;
    }
}

/// Decode one image file into an RGB frame.
pub(crate) fn load_frame(path: &std::path::Path, index: u64) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode frame {}", path.display()))?
        .into_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(anyhow!("frame {} is empty", path.display()));
    }
    Ok(Frame::new(image, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn yields_exactly_one_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sky.png");
        RgbImage::from_pixel(5, 3, Rgb([10, 20, 30])).save(&path)?;

        let mut source = StillImageSource::new(path);
        source.open()?;
        let frame = source.next_frame()?.expect("one frame");
        assert_eq!((frame.width(), frame.height()), (5, 3));
        assert_eq!(frame.image().get_pixel(4, 2), &Rgb([10, 20, 30]));
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn missing_file_fails_on_open() {
        let mut source = StillImageSource::new(PathBuf::from("/nonexistent/sky.png"));
        let err = source.open().unwrap_err();
        assert!(format!("{:#}", err).contains("failed to open image"));
    }
}
