//! Synthetic frame source (`stub://`).
//!
//! Produces a moving gradient so downstream stages see changing pixels. With a frame
//! limit the stream ends after that many frames; without one it never ends.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::FrameSource;
use crate::frame::Frame;

/// Frames between simulated scene changes.
const SCENE_PERIOD: u64 = 50;

pub struct SyntheticSource {
    name: String,
    frames: Option<u64>,
    width: u32,
    height: u32,
    emitted: u64,
    scene_state: u8,
    opened: bool,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>, frames: Option<u64>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            frames,
            width,
            height,
            emitted: 0,
            scene_state: 0,
            opened: false,
        }
    }

    /// Frames produced since the last `open`.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn render(&mut self) -> RgbImage {
        if self.emitted > 0 && self.emitted % SCENE_PERIOD == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let shift = self.emitted + self.scene_state as u64 * 37;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let base = (x as u64 + y as u64 + shift) % 256;
            Rgb([base as u8, (base / 2) as u8 + 64, 255 - base as u8])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }

    fn open(&mut self) -> Result<()> {
        self.emitted = 0;
        self.scene_state = 0;
        self.opened = true;
        log::info!(
            "SyntheticSource: connected to stub://{} ({}x{}, {})",
            self.name,
            self.width,
            self.height,
            self.frames
                .map(|n| format!("{} frames", n))
                .unwrap_or_else(|| "unbounded".to_string())
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.opened {
            return Err(anyhow!("synthetic source {} not opened", self.name));
        }
        if self.frames.is_some_and(|limit| self.emitted >= limit) {
            return Ok(None);
        }
        let image = self.render();
        let frame = Frame::new(image, self.emitted);
        self.emitted += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.opened {
            log::info!(
                "SyntheticSource: closed stub://{} after {} frames",
                self.name,
                self.emitted
            );
        }
        self.opened = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_stream_ends_after_limit() -> Result<()> {
        let mut source = SyntheticSource::new("sky", Some(2), 8, 6);
        source.open()?;
        let first = source.next_frame()?.expect("first frame");
        assert_eq!((first.index, first.width(), first.height()), (0, 8, 6));
        let second = source.next_frame()?.expect("second frame");
        assert_eq!(second.index, 1);
        assert_ne!(first.pixels(), second.pixels());
        assert!(source.next_frame()?.is_none());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn reading_before_open_fails() {
        let mut source = SyntheticSource::new("sky", None, 4, 4);
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn reopen_restarts_the_stream() -> Result<()> {
        let mut source = SyntheticSource::new("sky", Some(1), 4, 4);
        source.open()?;
        assert!(source.next_frame()?.is_some());
        source.close();
        source.close();
        source.open()?;
        assert_eq!(source.next_frame()?.map(|f| f.index), Some(0));
        Ok(())
    }
}
