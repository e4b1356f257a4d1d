//! Camera capture settings and the V4L2 camera source.
//!
//! Settings negotiation follows what the device reports: usable resolutions (at least
//! 320x240) are kept, clamped to 1280x720, and a reported rate in 1..=60 fps is kept.
//! Anything else falls back to 640x480 at 15 fps.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CAMERA_WIDTH: u32 = 640;
pub const DEFAULT_CAMERA_HEIGHT: u32 = 480;
pub const DEFAULT_CAMERA_FPS: u32 = 15;

const MIN_WIDTH: u32 = 320;
const MIN_HEIGHT: u32 = 240;
const MAX_WIDTH: u32 = 1280;
const MAX_HEIGHT: u32 = 720;
const MAX_FPS: u32 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            fps: DEFAULT_CAMERA_FPS,
        }
    }
}

impl CameraSettings {
    /// Pick capture settings from what the device reports.
    pub fn negotiate(reported_width: u32, reported_height: u32, reported_fps: u32) -> Self {
        let mut settings = Self::default();
        if reported_width >= MIN_WIDTH && reported_height >= MIN_HEIGHT {
            settings.width = reported_width.min(MAX_WIDTH);
            settings.height = reported_height.min(MAX_HEIGHT);
        }
        if (1..=MAX_FPS).contains(&reported_fps) {
            settings.fps = reported_fps;
        }
        settings
    }
}

#[cfg(feature = "ingest-v4l2")]
pub use device::CameraSource;

#[cfg(feature = "ingest-v4l2")]
mod device {
    use anyhow::{anyhow, Context, Result};
    use ouroboros::self_referencing;

    use super::CameraSettings;
    use crate::frame::Frame;
    use crate::ingest::normalize::{normalize_to_rgb, PixelFormat};
    use crate::ingest::FrameSource;

    /// V4L2 camera. Cameras never report end of stream; capture errors are read failures.
    pub struct CameraSource {
        device: String,
        requested: Option<CameraSettings>,
        state: Option<CameraState>,
        active: CameraSettings,
        format: PixelFormat,
        frame_count: u64,
    }

    #[self_referencing]
    struct CameraState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl CameraSource {
        /// `settings` skips negotiation and requests exactly these values.
        pub fn new(device: String, settings: Option<CameraSettings>) -> Self {
            Self {
                device,
                requested: settings,
                state: None,
                active: CameraSettings::default(),
                format: PixelFormat::Rgb24,
                frame_count: 0,
            }
        }

        pub fn active_settings(&self) -> CameraSettings {
            self.active
        }
    }

    impl FrameSource for CameraSource {
        fn describe(&self) -> String {
            format!("camera {}", self.device)
        }

        fn open(&mut self) -> Result<()> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&self.device)
                .with_context(|| format!("open camera {}", self.device))?;
            let mut format = device.format().context("read camera format")?;
            let reported_fps = device
                .params()
                .map(|p| {
                    if p.interval.numerator == 0 {
                        0
                    } else {
                        p.interval.denominator / p.interval.numerator
                    }
                })
                .unwrap_or(0);

            let wanted = self.requested.unwrap_or_else(|| {
                CameraSettings::negotiate(format.width, format.height, reported_fps)
            });
            format.width = wanted.width;
            format.height = wanted.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "CameraSource: failed to set format on {}: {}",
                        self.device,
                        err
                    );
                    device
                        .format()
                        .context("read camera format after set failure")?
                }
            };
            self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
                anyhow!(
                    "camera {} delivers unsupported pixel format {}",
                    self.device,
                    format.fourcc
                )
            })?;

            let params = v4l::video::capture::Parameters::with_fps(wanted.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("CameraSource: failed to set fps on {}: {}", self.device, err);
            }

            self.active = CameraSettings {
                width: format.width,
                height: format.height,
                fps: wanted.fps,
            };

            let state = CameraStateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| anyhow::Error::new(err).context("create camera buffer stream"))
                },
            }
            .try_build()?;
            self.state = Some(state);
            self.frame_count = 0;

            log::info!(
                "CameraSource: connected to {} ({}x{} @ {} fps, {:?})",
                self.device,
                self.active.width,
                self.active.height,
                self.active.fps,
                self.format
            );
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            use v4l::io::traits::CaptureStream;

            let state = self
                .state
                .as_mut()
                .ok_or_else(|| anyhow!("camera {} not opened", self.device))?;
            let (width, height, format) = (self.active.width, self.active.height, self.format);
            let (pixels, w, h) = state.with_mut(|fields| -> Result<(Vec<u8>, u32, u32)> {
                let (buf, meta) = fields.stream.next().context("capture camera frame")?;
                let used = (meta.bytesused as usize).min(buf.len());
                let used = if used == 0 { buf.len() } else { used };
                normalize_to_rgb(&buf[..used], width, height, format)
            })?;

            let frame = Frame::from_rgb(pixels, w, h, self.frame_count)?;
            self.frame_count += 1;
            Ok(Some(frame))
        }

        fn close(&mut self) {
            if self.state.take().is_some() {
                log::info!(
                    "CameraSource: released {} after {} frames",
                    self.device,
                    self.frame_count
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_device_settings_are_kept() {
        assert_eq!(
            CameraSettings::negotiate(800, 600, 30),
            CameraSettings {
                width: 800,
                height: 600,
                fps: 30
            }
        );
    }

    #[test]
    fn large_resolutions_are_clamped() {
        let settings = CameraSettings::negotiate(1920, 1080, 60);
        assert_eq!((settings.width, settings.height, settings.fps), (1280, 720, 60));
    }

    #[test]
    fn unusable_reports_fall_back_to_defaults() {
        assert_eq!(CameraSettings::negotiate(160, 120, 0), CameraSettings::default());
        let settings = CameraSettings::negotiate(640, 200, 120);
        assert_eq!((settings.width, settings.height, settings.fps), (640, 480, 15));
    }
}
