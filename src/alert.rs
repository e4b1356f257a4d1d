//! Cooldown-gated alerting.
//!
//! One gate per session. It fires when the trigger class is in the frame and the
//! cooldown since the last *successful* alert has fully elapsed. A failed send leaves
//! the gate idle so the next qualifying frame retries.

use std::time::{Duration, Instant};

use crate::detect::Detection;
use crate::notify::Notifier;

pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(10);
pub const DEFAULT_TRIGGER_CLASS: &str = "Drone";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertState {
    /// Next qualifying frame fires.
    Idle,
    /// Within the cooldown of the last successful alert.
    Cooling,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertOutcome {
    /// Trigger class not in the frame.
    NotTriggered,
    /// Trigger class present but the gate is cooling down.
    Suppressed,
    Fired { count: u64 },
    /// Notifier rejected the alert; the gate stays idle.
    Failed { count: u64 },
}

impl AlertOutcome {
    pub fn fired(&self) -> bool {
        matches!(self, AlertOutcome::Fired { .. })
    }
}

#[derive(Clone, Debug)]
pub struct AlertGate {
    trigger_class: String,
    cooldown: Duration,
    last_fired_at: Option<Instant>,
}

impl AlertGate {
    pub fn new(trigger_class: impl Into<String>, cooldown: Duration) -> Self {
        Self {
            trigger_class: trigger_class.into(),
            cooldown,
            last_fired_at: None,
        }
    }

    pub fn trigger_class(&self) -> &str {
        &self.trigger_class
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_fired_at(&self) -> Option<Instant> {
        self.last_fired_at
    }

    pub fn state(&self, now: Instant) -> AlertState {
        if self.cooled_down(now) {
            AlertState::Idle
        } else {
            AlertState::Cooling
        }
    }

    pub fn reset(&mut self) {
        self.last_fired_at = None;
    }

    /// Fire an alert for this frame's detections if the gate allows it.
    pub fn maybe_fire(
        &mut self,
        detections: &[Detection],
        now: Instant,
        notifier: &dyn Notifier,
    ) -> AlertOutcome {
        let count = detections
            .iter()
            .filter(|d| d.class_name == self.trigger_class)
            .count() as u64;
        if count == 0 {
            return AlertOutcome::NotTriggered;
        }
        if !self.cooled_down(now) {
            log::debug!("{} alert suppressed (cooling down)", self.trigger_class);
            return AlertOutcome::Suppressed;
        }
        if notifier.send_alert(&self.trigger_class, count) {
            log::info!("{} alert sent ({} in frame)", self.trigger_class, count);
            self.last_fired_at = Some(now);
            AlertOutcome::Fired { count }
        } else {
            log::warn!(
                "{} alert not delivered; will retry on next detection",
                self.trigger_class
            );
            AlertOutcome::Failed { count }
        }
    }

    fn cooled_down(&self, now: Instant) -> bool {
        match self.last_fired_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.cooldown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::notify::ConnectionCheck;
    use crate::stats::ClassCounts;
    use std::sync::Mutex;

    struct Scripted {
        results: Mutex<Vec<bool>>,
        alerts: Mutex<Vec<(String, u64)>>,
    }

    impl Scripted {
        fn new(results: &[bool]) -> Self {
            Self {
                results: Mutex::new(results.iter().rev().copied().collect()),
                alerts: Mutex::new(Vec::new()),
            }
        }

        fn alerts(&self) -> Vec<(String, u64)> {
            self.alerts.lock().unwrap().clone()
        }
    }

    impl Notifier for Scripted {
        fn send_test(&self) -> bool {
            true
        }

        fn send_alert(&self, trigger_class: &str, count: u64) -> bool {
            self.alerts
                .lock()
                .unwrap()
                .push((trigger_class.to_string(), count));
            self.results.lock().unwrap().pop().unwrap_or(true)
        }

        fn send_session_start(&self) -> bool {
            true
        }

        fn send_session_end(&self, _counts: &ClassCounts) -> bool {
            true
        }

        fn test_connection(&self) -> ConnectionCheck {
            ConnectionCheck::ok("scripted")
        }
    }

    fn det(class_name: &str) -> Detection {
        Detection {
            class_id: 2,
            class_name: class_name.to_string(),
            confidence: 0.9,
            bbox: BoundingBox::new(0.0, 0.0, 5.0, 5.0),
        }
    }

    #[test]
    fn fires_once_within_cooldown_window() {
        let notifier = Scripted::new(&[]);
        let mut gate = AlertGate::new("Drone", Duration::from_secs(10));
        let t0 = Instant::now();
        let frame = [det("Drone")];

        assert!(gate.maybe_fire(&frame, t0, &notifier).fired());
        assert_eq!(gate.state(t0 + Duration::from_secs(5)), AlertState::Cooling);
        for secs in [1, 5, 10] {
            assert_eq!(
                gate.maybe_fire(&frame, t0 + Duration::from_secs(secs), &notifier),
                AlertOutcome::Suppressed
            );
        }
        assert_eq!(notifier.alerts().len(), 1);

        let later = t0 + Duration::from_millis(10_001);
        assert_eq!(gate.state(later), AlertState::Idle);
        assert!(gate.maybe_fire(&frame, later, &notifier).fired());
        assert_eq!(notifier.alerts().len(), 2);
    }

    #[test]
    fn failed_send_retries_on_next_frame() {
        let notifier = Scripted::new(&[false, true]);
        let mut gate = AlertGate::new("Drone", Duration::from_secs(10));
        let t0 = Instant::now();
        let frame = [det("Drone"), det("Drone"), det("Bird")];

        assert_eq!(
            gate.maybe_fire(&frame, t0, &notifier),
            AlertOutcome::Failed { count: 2 }
        );
        assert!(gate.last_fired_at().is_none());
        let t1 = t0 + Duration::from_millis(30);
        assert_eq!(
            gate.maybe_fire(&frame, t1, &notifier),
            AlertOutcome::Fired { count: 2 }
        );
        assert_eq!(gate.last_fired_at(), Some(t1));
        assert_eq!(notifier.alerts(), vec![("Drone".to_string(), 2); 2]);
    }

    #[test]
    fn other_classes_never_trigger() {
        let notifier = Scripted::new(&[]);
        let mut gate = AlertGate::new("Drone", DEFAULT_ALERT_COOLDOWN);
        let outcome = gate.maybe_fire(&[det("Bird"), det("Aircraft")], Instant::now(), &notifier);
        assert_eq!(outcome, AlertOutcome::NotTriggered);
        assert!(notifier.alerts().is_empty());
    }

    #[test]
    fn reset_clears_cooldown() {
        let notifier = Scripted::new(&[]);
        let mut gate = AlertGate::new("Drone", DEFAULT_ALERT_COOLDOWN);
        let t0 = Instant::now();
        gate.maybe_fire(&[det("Drone")], t0, &notifier);
        gate.reset();
        assert_eq!(gate.state(t0), AlertState::Idle);
        assert!(gate.maybe_fire(&[det("Drone")], t0, &notifier).fired());
        assert_eq!(notifier.alerts().len(), 2);
    }
}
