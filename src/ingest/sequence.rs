//! Directory-of-frames source.
//!
//! Reads every image file in a directory in file-name order, one frame per file. This
//! is how recorded clips are replayed without a video decoder.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use super::still::load_frame;
use super::{has_image_extension, FrameSource};
use crate::frame::Frame;

pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: Vec::new(),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn describe(&self) -> String {
        format!("frames {}", self.dir.display())
    }

    fn open(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read frame directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to list {}", self.dir.display()))?
                .path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!(
                "frame directory {} contains no images",
                self.dir.display()
            ));
        }
        files.sort();
        log::info!(
            "ImageSequenceSource: {} frames in {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        let frame = load_frame(path, self.cursor as u64)?;
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.files.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn frames_come_back_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for (name, shade) in [("002.png", 2u8), ("001.png", 1), ("003.bmp", 3)] {
            RgbImage::from_pixel(2, 2, Rgb([shade, 0, 0])).save(dir.path().join(name))?;
        }
        std::fs::write(dir.path().join("notes.txt"), "not a frame")?;

        let mut source = ImageSequenceSource::new(dir.path().to_path_buf());
        source.open()?;
        assert_eq!(source.len(), 3);

        let mut shades = Vec::new();
        while let Some(frame) = source.next_frame()? {
            assert_eq!(frame.index, shades.len() as u64);
            shades.push(frame.image().get_pixel(0, 0)[0]);
        }
        assert_eq!(shades, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn empty_directory_fails_on_open() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = ImageSequenceSource::new(dir.path().to_path_buf());
        assert!(source.open().is_err());
        Ok(())
    }

    #[test]
    fn corrupt_frame_is_a_read_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("001.png"), b"not really a png")?;
        let mut source = ImageSequenceSource::new(dir.path().to_path_buf());
        source.open()?;
        assert!(source.next_frame().is_err());
        Ok(())
    }
}
