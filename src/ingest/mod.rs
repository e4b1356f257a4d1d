//! Frame ingestion sources.
//!
//! This module provides the sources a session can pull frames from:
//! - Synthetic generator (`stub://`), for tests and demos
//! - Single still image
//! - Directory of image files, read in name order
//! - Local video files (feature: ingest-file-ffmpeg)
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//!
//! Ingestion is local-only. Remote stream URLs are rejected when the identifier is
//! parsed. Sources MUST NOT log pixel content.

pub mod camera;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod sequence;
pub mod still;
pub mod synthetic;
#[cfg(feature = "ingest-file-ffmpeg")]
pub mod video;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::frame::Frame;

pub use camera::CameraSettings;
#[cfg(feature = "ingest-v4l2")]
pub use camera::CameraSource;
pub use sequence::ImageSequenceSource;
pub use still::StillImageSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-file-ffmpeg")]
pub use video::VideoFileSource;

/// Image file extensions accepted for still images and frame directories.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

const DEFAULT_STUB_WIDTH: u32 = 640;
const DEFAULT_STUB_HEIGHT: u32 = 480;

/// Sequential supplier of frames.
///
/// `open` must be called before `next_frame`. `next_frame` returns `Ok(None)` once the
/// stream is exhausted; an `Err` is a read failure. `close` releases the underlying
/// device or file and is safe to call more than once.
pub trait FrameSource {
    /// Human-readable identifier for logs.
    fn describe(&self) -> String;

    fn open(&mut self) -> Result<()>;

    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn close(&mut self);
}

/// Parsed source identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// `stub://<name>[?frames=N&width=W&height=H]`. Unbounded without `frames`.
    Synthetic {
        name: String,
        frames: Option<u64>,
        width: u32,
        height: u32,
    },
    /// Camera device node, e.g. `/dev/video0`.
    Camera { device: String },
    Image(PathBuf),
    Sequence(PathBuf),
    Video(PathBuf),
}

impl SourceSpec {
    /// Classify a source identifier.
    ///
    /// `camera:<n>`, a bare index, or `/dev/video<n>` select a camera. Paths are
    /// classified by directory-ness and extension; existence is checked on `open`.
    pub fn parse(identifier: &str) -> Result<Self> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(anyhow!("source identifier is empty"));
        }
        if identifier.starts_with("stub://") {
            return parse_stub(identifier);
        }
        if identifier.contains("://") {
            return Err(anyhow!(
                "remote source '{}' not supported; use a local camera, file or directory",
                identifier
            ));
        }
        if let Some(index) = identifier.strip_prefix("camera:") {
            return camera_from_index(index.trim());
        }
        if identifier.chars().all(|c| c.is_ascii_digit()) {
            return camera_from_index(identifier);
        }
        if identifier.starts_with("/dev/video") {
            return Ok(SourceSpec::Camera {
                device: identifier.to_string(),
            });
        }

        let path = PathBuf::from(identifier);
        if path.is_dir() {
            Ok(SourceSpec::Sequence(path))
        } else if has_image_extension(&path) {
            Ok(SourceSpec::Image(path))
        } else {
            Ok(SourceSpec::Video(path))
        }
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Synthetic { name, .. } => write!(f, "stub://{}", name),
            SourceSpec::Camera { device } => write!(f, "camera {}", device),
            SourceSpec::Image(path) => write!(f, "image {}", path.display()),
            SourceSpec::Sequence(path) => write!(f, "frames {}", path.display()),
            SourceSpec::Video(path) => write!(f, "video {}", path.display()),
        }
    }
}

/// Build an unopened source for `spec`.
///
/// `camera` overrides the negotiated capture settings for camera sources.
pub fn build_source(spec: &SourceSpec, camera: Option<CameraSettings>) -> Result<Box<dyn FrameSource>> {
    match spec {
        SourceSpec::Synthetic {
            name,
            frames,
            width,
            height,
        } => Ok(Box::new(SyntheticSource::new(
            name.clone(),
            *frames,
            *width,
            *height,
        ))),
        SourceSpec::Image(path) => Ok(Box::new(StillImageSource::new(path.clone()))),
        SourceSpec::Sequence(path) => Ok(Box::new(ImageSequenceSource::new(path.clone()))),
        #[cfg(feature = "ingest-v4l2")]
        SourceSpec::Camera { device } => Ok(Box::new(CameraSource::new(device.clone(), camera))),
        #[cfg(not(feature = "ingest-v4l2"))]
        SourceSpec::Camera { device } => {
            let _ = camera;
            Err(anyhow!(
                "camera {} requires the ingest-v4l2 feature",
                device
            ))
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        SourceSpec::Video(path) => Ok(Box::new(VideoFileSource::new(path.clone()))),
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        SourceSpec::Video(path) => Err(anyhow!(
            "video file {} requires the ingest-file-ffmpeg feature",
            path.display()
        )),
    }
}

/// Parse `identifier` and build an unopened source.
pub fn source_from_identifier(
    identifier: &str,
    camera: Option<CameraSettings>,
) -> Result<Box<dyn FrameSource>> {
    let spec = SourceSpec::parse(identifier)?;
    build_source(&spec, camera).with_context(|| format!("build source '{}'", identifier))
}

pub(crate) fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn camera_from_index(index: &str) -> Result<SourceSpec> {
    let index: u32 = index
        .parse()
        .map_err(|_| anyhow!("invalid camera index '{}'", index))?;
    Ok(SourceSpec::Camera {
        device: format!("/dev/video{}", index),
    })
}

fn parse_stub(identifier: &str) -> Result<SourceSpec> {
    let url = Url::parse(identifier).context("parse stub source url")?;
    let name = url
        .host_str()
        .filter(|host| !host.is_empty())
        .unwrap_or("synthetic")
        .to_string();
    let mut frames = None;
    let mut width = DEFAULT_STUB_WIDTH;
    let mut height = DEFAULT_STUB_HEIGHT;
    for (key, value) in url.query_pairs() {
        let parsed: u64 = value
            .parse()
            .map_err(|_| anyhow!("stub source: '{}' must be a number, got '{}'", key, value))?;
        match key.as_ref() {
            "frames" => frames = Some(parsed),
            "width" => width = dimension(&key, parsed)?,
            "height" => height = dimension(&key, parsed)?,
            other => return Err(anyhow!("stub source: unknown parameter '{}'", other)),
        }
    }
    Ok(SourceSpec::Synthetic {
        name,
        frames,
        width,
        height,
    })
}

fn dimension(key: &str, value: u64) -> Result<u32> {
    match u32::try_from(value) {
        Ok(v) if (1..=8192).contains(&v) => Ok(v),
        _ => Err(anyhow!("stub source: {} out of range (1..=8192)", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_identifiers_parse_query_parameters() {
        let spec = SourceSpec::parse("stub://sky?frames=3&width=320&height=240").unwrap();
        assert_eq!(
            spec,
            SourceSpec::Synthetic {
                name: "sky".to_string(),
                frames: Some(3),
                width: 320,
                height: 240,
            }
        );
        assert_eq!(
            SourceSpec::parse("stub://demo").unwrap(),
            SourceSpec::Synthetic {
                name: "demo".to_string(),
                frames: None,
                width: 640,
                height: 480,
            }
        );
        assert!(SourceSpec::parse("stub://x?fps=3").is_err());
        assert!(SourceSpec::parse("stub://x?width=0").is_err());
    }

    #[test]
    fn camera_identifiers_map_to_device_nodes() {
        let camera = |device: &str| SourceSpec::Camera {
            device: device.to_string(),
        };
        assert_eq!(SourceSpec::parse("camera:1").unwrap(), camera("/dev/video1"));
        assert_eq!(SourceSpec::parse("2").unwrap(), camera("/dev/video2"));
        assert_eq!(SourceSpec::parse("/dev/video0").unwrap(), camera("/dev/video0"));
        assert!(SourceSpec::parse("camera:front").is_err());
    }

    #[test]
    fn remote_and_empty_identifiers_are_rejected() {
        assert!(SourceSpec::parse("rtsp://10.0.0.2/stream").is_err());
        assert!(SourceSpec::parse("http://example.com/clip.mp4").is_err());
        assert!(SourceSpec::parse("  ").is_err());
    }

    #[test]
    fn paths_are_classified_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            SourceSpec::parse(dir.path().to_str().unwrap()).unwrap(),
            SourceSpec::Sequence(dir.path().to_path_buf())
        );
        assert_eq!(
            SourceSpec::parse("shots/sky.JPG").unwrap(),
            SourceSpec::Image(PathBuf::from("shots/sky.JPG"))
        );
        assert_eq!(
            SourceSpec::parse("clips/flyover.mp4").unwrap(),
            SourceSpec::Video(PathBuf::from("clips/flyover.mp4"))
        );
    }

    #[test]
    fn build_source_describes_synthetic_sources() {
        let source = source_from_identifier("stub://sky?frames=2", None).unwrap();
        assert_eq!(source.describe(), "stub://sky");
    }
}
