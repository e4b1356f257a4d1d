//! Detection session controller.
//!
//! Owns one frame source per session and drives it through the detector, annotator,
//! statistics and alert gate, one frame per `step()`. The controller is a two-state
//! machine (`Stopped`, `Running`):
//!
//! - `start` validates the config, opens the source and resets per-session state.
//! - `step` processes one frame and paces the loop to the target interval. Source
//!   exhaustion, a read failure or a pending stop request ends the session and yields a
//!   terminal event.
//! - `stop` is idempotent.
//!
//! Detector and notifier failures never end a session. A frame without a detector
//! result is passed through unannotated and leaves the session counts untouched.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::alert::{AlertGate, AlertOutcome, DEFAULT_ALERT_COOLDOWN, DEFAULT_TRIGGER_CLASS};
use crate::annotate::Annotator;
use crate::catalog::ClassCatalog;
use crate::detect::{Detection, Detector};
use crate::error::SessionError;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::notify::Notifier;
use crate::stats::{ClassCounts, StatsTracker, DEFAULT_FPS_WINDOW};

pub const DEFAULT_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(15);
pub const DEFAULT_DEGRADED_AFTER_MISSES: u32 = 30;

/// How `step` waits out the target frame interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    /// Sleep whatever is left of the interval after processing the frame.
    #[default]
    Residual,
    /// Sleep to a fixed schedule of deadlines so processing jitter does not accumulate.
    /// A step that overruns by more than one interval re-anchors the schedule.
    Tick,
}

impl FromStr for Pacing {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "residual" => Ok(Pacing::Residual),
            "tick" => Ok(Pacing::Tick),
            other => Err(anyhow!(
                "unknown pacing '{}'; expected residual or tick",
                other
            )),
        }
    }
}

/// Per-session settings. Fixed for the lifetime of a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Minimum detection confidence, in (0, 1].
    pub confidence_threshold: f32,
    pub target_frame_interval: Duration,
    pub alert_enabled: bool,
    pub alert_trigger_class: String,
    pub alert_cooldown: Duration,
    /// Inter-frame samples averaged for FPS.
    pub fps_window: usize,
    pub pacing: Pacing,
    /// Send session start/end messages through the notifier.
    pub session_events: bool,
    /// Consecutive frames without a detector result before a degraded-service warning.
    /// Zero disables the warning.
    pub degraded_after_misses: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE,
            target_frame_interval: DEFAULT_FRAME_INTERVAL,
            alert_enabled: false,
            alert_trigger_class: DEFAULT_TRIGGER_CLASS.to_string(),
            alert_cooldown: DEFAULT_ALERT_COOLDOWN,
            fps_window: DEFAULT_FPS_WINDOW,
            pacing: Pacing::Residual,
            session_events: false,
            degraded_after_misses: DEFAULT_DEGRADED_AFTER_MISSES,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), SessionError> {
        let threshold = self.confidence_threshold;
        if !(threshold.is_finite() && threshold > 0.0 && threshold <= 1.0) {
            return Err(SessionError::InvalidConfig(format!(
                "confidence threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.fps_window == 0 {
            return Err(SessionError::InvalidConfig(
                "fps window must hold at least one sample".to_string(),
            ));
        }
        if self.alert_enabled && self.alert_trigger_class.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "alert trigger class must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Running,
}

/// Why a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    Exhausted,
    ReadFailed(String),
    StopRequested,
}

/// Outcome of one `step()`.
#[derive(Clone, Debug)]
pub struct IterationEvent {
    /// Source index of the processed frame; `None` on terminal events.
    pub frame_index: Option<u64>,
    /// Annotated frame, or the raw frame when the detector produced no result.
    pub annotated_frame: Option<Frame>,
    pub detections: Vec<Detection>,
    /// False when the detector produced no result for this frame.
    pub detection_available: bool,
    pub fps: f64,
    pub frame_stats: ClassCounts,
    pub session_stats: ClassCounts,
    pub alert_fired: bool,
    /// Gate decision; `None` when alerting was not consulted.
    pub alert: Option<AlertOutcome>,
    /// Frames in a row without a detector result, this one included.
    pub consecutive_misses: u32,
    pub terminal: bool,
    pub end: Option<SessionEnd>,
}

/// Cooperative stop request, shareable with another thread (e.g. a signal handler).
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

struct ActiveSession {
    source: Box<dyn FrameSource>,
    config: SessionConfig,
    alert: AlertGate,
    last_tick: Instant,
    next_deadline: Instant,
    consecutive_misses: u32,
    frames: u64,
}

pub struct SessionController {
    detector: Detector,
    annotator: Annotator,
    notifier: Option<Box<dyn Notifier>>,
    catalog: Arc<ClassCatalog>,
    stats: StatsTracker,
    stop_handle: StopHandle,
    active: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(detector: Detector, annotator: Annotator, notifier: Option<Box<dyn Notifier>>) -> Self {
        let catalog = detector.catalog().clone();
        Self {
            stats: StatsTracker::new(catalog.clone(), DEFAULT_FPS_WINDOW),
            detector,
            annotator,
            notifier,
            catalog,
            stop_handle: StopHandle::default(),
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Running
        } else {
            SessionState::Stopped
        }
    }

    /// Handle for requesting a stop from outside the stepping thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    /// Statistics of the current or most recent session.
    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Begin a session on `source`. A running session is stopped first.
    pub fn start(&mut self, mut source: Box<dyn FrameSource>, config: SessionConfig) -> Result<(), SessionError> {
        config.validate()?;
        if self.active.is_some() {
            log::info!("session restart requested; stopping current session");
            self.stop();
        }

        let description = source.describe();
        source.open().map_err(|err| {
            log::error!("failed to open {}: {:#}", description, err);
            SessionError::resource(&err)
        })?;

        if let Err(err) = self.detector.ensure_loaded() {
            log::warn!("{}; frames will pass through unannotated", err);
        }
        if config.alert_enabled && self.notifier.is_none() {
            log::warn!("alerts enabled but no notifier configured; alerts will not be sent");
        }

        if self.stats.fps_window() == config.fps_window {
            self.stats.reset_session();
        } else {
            self.stats = StatsTracker::new(self.catalog.clone(), config.fps_window);
        }
        self.stop_handle.clear();
        let now = Instant::now();
        let alert = AlertGate::new(config.alert_trigger_class.clone(), config.alert_cooldown);
        log::info!(
            "session started on {} (confidence {:.2}, interval {:?}, alerts {})",
            description,
            config.confidence_threshold,
            config.target_frame_interval,
            if config.alert_enabled { "on" } else { "off" }
        );

        if config.session_events {
            if let Some(notifier) = &self.notifier {
                if !notifier.send_session_start() {
                    log::warn!("session start notification failed");
                }
            }
        }

        self.active = Some(ActiveSession {
            next_deadline: now + config.target_frame_interval,
            source,
            config,
            alert,
            last_tick: now,
            consecutive_misses: 0,
            frames: 0,
        });
        Ok(())
    }

    /// Process one frame. Blocks for the rest of the frame interval.
    pub fn step(&mut self) -> Result<IterationEvent, SessionError> {
        let Some(active) = self.active.as_mut() else {
            return Err(SessionError::NotRunning);
        };

        if self.stop_handle.is_stop_requested() {
            log::info!("stop requested");
            return Ok(self.finish(SessionEnd::StopRequested));
        }

        let frame = match active.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("{} exhausted", active.source.describe());
                return Ok(self.finish(SessionEnd::Exhausted));
            }
            Err(err) => {
                let reason = format!("{:#}", err);
                log::error!("{} read failed: {}", active.source.describe(), reason);
                return Ok(self.finish(SessionEnd::ReadFailed(reason)));
            }
        };

        let entered = Instant::now();
        self.stats
            .update_fps(entered.saturating_duration_since(active.last_tick));
        active.last_tick = entered;
        active.frames += 1;

        let threshold = active.config.confidence_threshold;
        let (annotated, detections, available, alert) =
            match self.detector.detect(&frame, threshold) {
                Some(detections) => {
                    active.consecutive_misses = 0;
                    let annotated = self.annotator.annotate(&frame, &detections);
                    self.stats.update_frame(&detections);
                    self.stats.update_session(&detections);
                    let alert = match (&self.notifier, active.config.alert_enabled) {
                        (Some(notifier), true) => {
                            Some(active.alert.maybe_fire(&detections, entered, notifier.as_ref()))
                        }
                        _ => None,
                    };
                    (annotated, detections, true, alert)
                }
                None => {
                    active.consecutive_misses += 1;
                    let limit = active.config.degraded_after_misses;
                    if degraded_warning_due(active.consecutive_misses, limit) {
                        log::warn!(
                            "detector degraded: no result for {} consecutive frames",
                            limit
                        );
                    }
                    self.stats.clear_frame();
                    (frame, Vec::new(), false, None)
                }
            };

        let event = IterationEvent {
            frame_index: Some(annotated.index),
            annotated_frame: Some(annotated),
            detections,
            detection_available: available,
            fps: self.stats.fps(),
            frame_stats: self.stats.frame_counts().clone(),
            session_stats: self.stats.session_counts().clone(),
            alert_fired: alert.map(|a| a.fired()).unwrap_or(false),
            alert,
            consecutive_misses: active.consecutive_misses,
            terminal: false,
            end: None,
        };

        pace(active, entered);
        Ok(event)
    }

    /// End the current session. No-op when already stopped.
    pub fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.source.close();
        self.stats.clear_frame();
        log::info!(
            "session stopped after {} frames; {}",
            active.frames,
            self.stats.session_summary()
        );
        if active.config.session_events {
            if let Some(notifier) = &self.notifier {
                if !notifier.send_session_end(self.stats.session_counts()) {
                    log::warn!("session end notification failed");
                }
            }
        }
    }

    fn finish(&mut self, end: SessionEnd) -> IterationEvent {
        self.stop();
        IterationEvent {
            frame_index: None,
            annotated_frame: None,
            detections: Vec::new(),
            detection_available: false,
            fps: self.stats.fps(),
            frame_stats: self.stats.frame_counts().clone(),
            session_stats: self.stats.session_counts().clone(),
            alert_fired: false,
            alert: None,
            consecutive_misses: 0,
            terminal: true,
            end: Some(end),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pace(active: &mut ActiveSession, entered: Instant) {
    let interval = active.config.target_frame_interval;
    if interval.is_zero() {
        return;
    }
    match active.config.pacing {
        Pacing::Residual => {
            let elapsed = entered.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        Pacing::Tick => {
            let (sleep, next) = tick_schedule(active.next_deadline, Instant::now(), interval);
            if !sleep.is_zero() {
                std::thread::sleep(sleep);
            }
            active.next_deadline = next;
        }
    }
}

/// Sleep needed before `deadline` and the deadline after it.
///
/// An overrun of more than one interval re-anchors the schedule at `now`.
fn tick_schedule(deadline: Instant, now: Instant, interval: Duration) -> (Duration, Instant) {
    if now < deadline {
        (deadline - now, deadline + interval)
    } else if now - deadline > interval {
        (Duration::ZERO, now + interval)
    } else {
        (Duration::ZERO, deadline + interval)
    }
}

/// The degraded warning fires once, on the miss that reaches `limit`. Zero disables it.
fn degraded_warning_due(consecutive_misses: u32, limit: u32) -> bool {
    limit > 0 && consecutive_misses == limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, DetectorBackend, RawDetection};
    use crate::ingest::SyntheticSource;

    struct EveryFrame(Vec<RawDetection>);

    impl DetectorBackend for EveryFrame {
        fn name(&self) -> &'static str {
            "every-frame"
        }

        fn detect(&mut self, _frame: &Frame, threshold: f32) -> anyhow::Result<Vec<RawDetection>> {
            Ok(self
                .0
                .iter()
                .filter(|d| d.confidence >= threshold)
                .cloned()
                .collect())
        }
    }

    fn controller(raw: Vec<RawDetection>) -> SessionController {
        let catalog = Arc::new(ClassCatalog::aerial());
        SessionController::new(
            Detector::new(EveryFrame(raw), catalog.clone()),
            Annotator::new(catalog),
            None,
        )
    }

    fn quick() -> SessionConfig {
        SessionConfig {
            target_frame_interval: Duration::ZERO,
            ..SessionConfig::default()
        }
    }

    fn source(frames: u64) -> Box<dyn FrameSource> {
        Box::new(SyntheticSource::new("test", Some(frames), 32, 24))
    }

    fn bird() -> RawDetection {
        RawDetection {
            class_id: 1,
            confidence: 0.8,
            bbox: BoundingBox::new(2.0, 2.0, 12.0, 12.0),
        }
    }

    #[test]
    fn step_requires_running_session() {
        let mut controller = controller(Vec::new());
        assert!(matches!(controller.step(), Err(SessionError::NotRunning)));
    }

    #[test]
    fn invalid_config_is_rejected_before_opening() {
        let mut controller = controller(Vec::new());
        for confidence in [0.0, 1.5, f32::NAN] {
            let config = SessionConfig {
                confidence_threshold: confidence,
                ..quick()
            };
            assert!(matches!(
                controller.start(source(1), config),
                Err(SessionError::InvalidConfig(_))
            ));
        }
        assert_eq!(controller.state(), SessionState::Stopped);
    }

    #[test]
    fn stop_request_ends_session_between_frames() {
        let mut controller = controller(Vec::new());
        controller.start(source(10), quick()).unwrap();
        let handle = controller.stop_handle();
        assert!(!controller.step().unwrap().terminal);
        handle.request_stop();
        let event = controller.step().unwrap();
        assert!(event.terminal);
        assert_eq!(event.end, Some(SessionEnd::StopRequested));
        assert_eq!(controller.state(), SessionState::Stopped);
    }

    #[test]
    fn restart_resets_counts_and_stop_flag() {
        let mut controller = controller(vec![bird()]);
        controller.start(source(2), quick()).unwrap();
        controller.step().unwrap();
        controller.stop_handle().request_stop();
        controller.start(source(2), quick()).unwrap();
        assert_eq!(controller.stats().session_counts().total(), 0);
        let event = controller.step().unwrap();
        assert!(!event.terminal);
        assert_eq!(event.session_stats.get("Bird"), 1);
        assert_eq!(event.frame_index, Some(0));
    }

    #[test]
    fn threshold_is_applied_by_the_backend() {
        let mut controller = controller(vec![bird()]);
        let config = SessionConfig {
            confidence_threshold: 0.9,
            ..quick()
        };
        controller.start(source(1), config).unwrap();
        let event = controller.step().unwrap();
        assert!(event.detection_available);
        assert!(event.detections.is_empty());
        assert_eq!(event.frame_stats.total(), 0);
    }

    #[test]
    fn residual_pacing_holds_the_frame_interval() {
        let mut controller = controller(Vec::new());
        let config = SessionConfig {
            target_frame_interval: Duration::from_millis(20),
            ..SessionConfig::default()
        };
        controller.start(source(3), config).unwrap();
        let started = Instant::now();
        for _ in 0..3 {
            controller.step().unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn tick_pacing_keeps_schedule() {
        let mut controller = controller(Vec::new());
        let config = SessionConfig {
            target_frame_interval: Duration::from_millis(10),
            pacing: Pacing::Tick,
            ..SessionConfig::default()
        };
        controller.start(source(5), config).unwrap();
        let started = Instant::now();
        for _ in 0..5 {
            controller.step().unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn tick_schedule_sleeps_until_deadline() {
        let start = Instant::now();
        let interval = Duration::from_millis(10);
        let deadline = start + interval;

        let (sleep, next) = tick_schedule(deadline, start + Duration::from_millis(4), interval);
        assert_eq!(sleep, Duration::from_millis(6));
        assert_eq!(next, deadline + interval);

        let (sleep, next) = tick_schedule(deadline, deadline + Duration::from_millis(3), interval);
        assert!(sleep.is_zero());
        assert_eq!(next, deadline + interval);
    }

    #[test]
    fn tick_schedule_reanchors_after_long_overrun() {
        let start = Instant::now();
        let interval = Duration::from_millis(10);
        let deadline = start + interval;
        let late = deadline + Duration::from_millis(35);

        let (sleep, next) = tick_schedule(deadline, late, interval);
        assert!(sleep.is_zero());
        assert_eq!(next, late + interval);
    }

    #[test]
    fn degraded_warning_fires_once_at_limit() {
        let due: Vec<u32> = (1..=70).filter(|&m| degraded_warning_due(m, 30)).collect();
        assert_eq!(due, vec![30]);
        assert!((1..=70).all(|m| !degraded_warning_due(m, 0)));
    }

    #[test]
    fn restart_with_same_window_resets_tracker() {
        let mut controller = controller(vec![bird()]);
        controller.start(source(3), quick()).unwrap();
        controller.step().unwrap();
        controller.step().unwrap();
        assert_eq!(controller.stats().session_counts().get("Bird"), 2);

        controller.start(source(3), quick()).unwrap();
        assert_eq!(controller.stats().fps_window(), DEFAULT_FPS_WINDOW);
        assert_eq!(controller.stats().fps(), 0.0);
        assert_eq!(controller.stats().session_counts().total(), 0);
        assert_eq!(controller.stats().frame_counts().total(), 0);

        let wider = SessionConfig {
            fps_window: 5,
            ..quick()
        };
        controller.start(source(3), wider).unwrap();
        assert_eq!(controller.stats().fps_window(), 5);
    }

    #[test]
    fn pacing_parses_case_insensitively() {
        assert_eq!("Tick".parse::<Pacing>().unwrap(), Pacing::Tick);
        assert_eq!("residual".parse::<Pacing>().unwrap(), Pacing::Residual);
        assert!("burst".parse::<Pacing>().is_err());
    }
}
