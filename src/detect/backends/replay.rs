use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// One recorded frame in a replay file.
#[derive(Clone, Debug, Deserialize)]
pub struct ReplayEntry {
    /// Zero-based frame index the entry applies to.
    pub frame: u64,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
    /// When set, the frame fails as if inference had raised.
    #[serde(default)]
    pub failure: Option<String>,
}

/// Replays recorded detections by frame index.
///
/// Used for demos and offline runs against synthetic sources. Frames without an entry
/// produce no detections. The confidence threshold is applied the way a model would.
pub struct ReplayBackend {
    entries: HashMap<u64, ReplayEntry>,
}

impl ReplayBackend {
    pub fn new(entries: Vec<ReplayEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.frame, e)).collect(),
        }
    }

    /// Load a JSON array of `ReplayEntry`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        let entries: Vec<ReplayEntry> = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid replay file {}: {}", path.display(), e))?;
        log::info!(
            "replay backend: {} recorded frames from {}",
            entries.len(),
            path.display()
        );
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<RawDetection>> {
        let Some(entry) = self.entries.get(&frame.index) else {
            return Ok(Vec::new());
        };
        if let Some(reason) = &entry.failure {
            return Err(anyhow!("recorded failure: {}", reason));
        }
        Ok(entry
            .detections
            .iter()
            .filter(|det| det.confidence >= confidence_threshold)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::io::Write;

    fn frame(index: u64) -> Frame {
        Frame::new(RgbImage::new(4, 4), index)
    }

    #[test]
    fn replays_recorded_frames_and_applies_threshold() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(
            br#"[
                {"frame": 1, "detections": [
                    {"class_id": 2, "confidence": 0.9, "bbox": {"x1": 1, "y1": 1, "x2": 3, "y2": 3}},
                    {"class_id": 1, "confidence": 0.3, "bbox": {"x1": 0, "y1": 0, "x2": 2, "y2": 2}}
                ]},
                {"frame": 2, "failure": "gpu lost"}
            ]"#,
        )?;
        let mut backend = ReplayBackend::from_path(file.path())?;
        assert_eq!(backend.len(), 2);

        assert!(backend.detect(&frame(0), 0.5)?.is_empty());
        let dets = backend.detect(&frame(1), 0.5)?;
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 2);
        assert_eq!(backend.detect(&frame(1), 0.2)?.len(), 2);

        let err = backend.detect(&frame(2), 0.5).unwrap_err();
        assert!(err.to_string().contains("gpu lost"));
        Ok(())
    }

    #[test]
    fn malformed_file_is_rejected() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"{\"frame\": 1}")?;
        assert!(ReplayBackend::from_path(file.path()).is_err());
        Ok(())
    }
}
