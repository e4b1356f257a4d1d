//! Rolling FPS and per-class detection counts.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::ClassCatalog;
use crate::detect::Detection;

/// Number of inter-frame samples averaged for FPS.
pub const DEFAULT_FPS_WINDOW: usize = 15;

/// FPS over a bounded window of inter-frame durations.
#[derive(Clone, Debug)]
pub struct FpsMeter {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl FpsMeter {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// `1 / mean(samples)`, or 0 when empty or the mean is zero.
    pub fn fps(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: f64 = self.samples.iter().map(Duration::as_secs_f64).sum();
        let mean = total / self.samples.len() as f64;
        if mean > 0.0 {
            1.0 / mean
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new(DEFAULT_FPS_WINDOW)
    }
}

/// Per-class counts keyed by catalog name, in catalog order.
///
/// Every catalog class is always present (zero when unseen). Names outside the catalog
/// are never counted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassCounts {
    counts: Vec<(String, u64)>,
}

impl ClassCounts {
    pub fn zeroed(catalog: &ClassCatalog) -> Self {
        Self {
            counts: catalog.names().map(|name| (name.to_string(), 0)).collect(),
        }
    }

    /// Count of `class_name`; 0 for unknown names.
    pub fn get(&self, class_name: &str) -> u64 {
        self.counts
            .iter()
            .find(|(name, _)| name == class_name)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, count)| count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    /// Classes with a non-zero count, in catalog order.
    pub fn nonzero(&self) -> impl Iterator<Item = (&str, u64)> {
        self.iter().filter(|(_, count)| *count > 0)
    }

    pub fn to_map(&self) -> BTreeMap<String, u64> {
        self.counts.iter().cloned().collect()
    }

    fn add(&mut self, detections: &[Detection]) {
        for detection in detections {
            if let Some((_, count)) = self
                .counts
                .iter_mut()
                .find(|(name, _)| *name == detection.class_name)
            {
                *count += 1;
            }
        }
    }

    fn clear(&mut self) {
        for (_, count) in self.counts.iter_mut() {
            *count = 0;
        }
    }
}

/// FPS plus frame and session counts for one session.
pub struct StatsTracker {
    catalog: Arc<ClassCatalog>,
    fps: FpsMeter,
    frame: ClassCounts,
    session: ClassCounts,
}

impl StatsTracker {
    pub fn new(catalog: Arc<ClassCatalog>, fps_window: usize) -> Self {
        let frame = ClassCounts::zeroed(&catalog);
        let session = frame.clone();
        Self {
            catalog,
            fps: FpsMeter::new(fps_window),
            frame,
            session,
        }
    }

    /// Replace frame counts with the counts of `detections`.
    pub fn update_frame(&mut self, detections: &[Detection]) {
        self.frame.clear();
        self.frame.add(detections);
    }

    /// Add `detections` to the cumulative session counts.
    pub fn update_session(&mut self, detections: &[Detection]) {
        self.session.add(detections);
    }

    pub fn clear_frame(&mut self) {
        self.frame.clear();
    }

    pub fn update_fps(&mut self, sample: Duration) {
        self.fps.push(sample);
    }

    pub fn fps(&self) -> f64 {
        self.fps.fps()
    }

    pub fn fps_window(&self) -> usize {
        self.fps.capacity()
    }

    /// Zero session counts, frame counts and FPS samples.
    pub fn reset_session(&mut self) {
        self.session.clear();
        self.frame.clear();
        self.fps.reset();
    }

    pub fn frame_counts(&self) -> &ClassCounts {
        &self.frame
    }

    pub fn session_counts(&self) -> &ClassCounts {
        &self.session
    }

    pub fn frame_summary(&self) -> String {
        let total = self.frame.total();
        if total == 0 {
            return "No detections".to_string();
        }
        format!(
            "Detected {} objects: {}",
            total,
            summary_parts(&self.catalog, &self.frame)
        )
    }

    pub fn session_summary(&self) -> String {
        let total = self.session.total();
        if total == 0 {
            return "No detections this session yet".to_string();
        }
        format!(
            "Session total: {} detections - {}",
            total,
            summary_parts(&self.catalog, &self.session)
        )
    }
}

fn summary_parts(catalog: &ClassCatalog, counts: &ClassCounts) -> String {
    counts
        .nonzero()
        .map(|(name, count)| format!("{} {}: {}", catalog.icon_for(name), name, count))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(class_name: &str) -> Detection {
        Detection {
            class_id: 0,
            class_name: class_name.to_string(),
            confidence: 0.8,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        }
    }

    fn tracker() -> StatsTracker {
        StatsTracker::new(Arc::new(ClassCatalog::aerial()), DEFAULT_FPS_WINDOW)
    }

    #[test]
    fn fps_converges_for_constant_samples() {
        let mut meter = FpsMeter::new(15);
        for _ in 0..40 {
            meter.push(Duration::from_millis(50));
            assert!(meter.len() <= 15);
        }
        assert_eq!(meter.len(), 15);
        assert!((meter.fps() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn fps_is_zero_when_empty_or_instant() {
        let mut meter = FpsMeter::default();
        assert_eq!(meter.fps(), 0.0);
        meter.push(Duration::ZERO);
        assert_eq!(meter.fps(), 0.0);
    }

    #[test]
    fn fps_evicts_oldest_sample() {
        let mut meter = FpsMeter::new(2);
        meter.push(Duration::from_secs(10));
        meter.push(Duration::from_millis(100));
        meter.push(Duration::from_millis(100));
        assert!((meter.fps() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn frame_counts_reset_every_frame() {
        let mut stats = tracker();
        stats.update_frame(&[det("Drone"), det("Drone"), det("Bird")]);
        assert_eq!(stats.frame_counts().get("Drone"), 2);
        stats.update_frame(&[det("Bird")]);
        assert_eq!(stats.frame_counts().get("Drone"), 0);
        assert_eq!(stats.frame_counts().get("Bird"), 1);
        stats.clear_frame();
        assert_eq!(stats.frame_counts().total(), 0);
    }

    #[test]
    fn session_counts_accumulate_and_skip_unknown_names() {
        let mut stats = tracker();
        stats.update_session(&[det("Drone"), det("Class_9")]);
        stats.update_session(&[det("Drone"), det("Aircraft")]);
        let session = stats.session_counts();
        assert_eq!(session.get("Drone"), 2);
        assert_eq!(session.get("Aircraft"), 1);
        assert_eq!(session.get("Class_9"), 0);
        assert_eq!(session.total(), 3);
        assert_eq!(session.iter().count(), 4);
    }

    #[test]
    fn reset_session_clears_everything() {
        let mut stats = tracker();
        stats.update_frame(&[det("Bird")]);
        stats.update_session(&[det("Bird")]);
        stats.update_fps(Duration::from_millis(30));
        stats.reset_session();
        assert_eq!(stats.session_counts().total(), 0);
        assert_eq!(stats.frame_counts().total(), 0);
        assert_eq!(stats.fps(), 0.0);
    }

    #[test]
    fn summaries_list_nonzero_classes_with_icons() {
        let mut stats = tracker();
        assert_eq!(stats.frame_summary(), "No detections");
        assert_eq!(stats.session_summary(), "No detections this session yet");

        let frame = [det("Aircraft"), det("Drone"), det("Drone")];
        stats.update_frame(&frame);
        stats.update_session(&frame);
        assert_eq!(
            stats.frame_summary(),
            "Detected 3 objects: ✈️ Aircraft: 1, 🛸 Drone: 2"
        );
        assert_eq!(
            stats.session_summary(),
            "Session total: 3 detections - ✈️ Aircraft: 1, 🛸 Drone: 2"
        );
    }
}
