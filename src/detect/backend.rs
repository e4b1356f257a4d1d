use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend wraps one model. It receives RGB frames and returns detections in the
/// model's own ranking order, already filtered by `confidence_threshold`.
///
/// Backends are driven from a single session loop; `detect` takes `&mut self` so a
/// backend may keep scratch buffers between calls.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Errors are per-frame: the caller skips the frame and keeps going.
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, run once right after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
