//! Terminal feedback for the binaries: timed stages and a live session status line.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use skywatch::session::IterationEvent;

/// Plain mode prints a status line every this many frames.
const PLAIN_STATUS_EVERY: u64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = spinner("{spinner} {msg}");
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    pub fn status(&self) -> StatusLine {
        let bar = self
            .use_pretty()
            .then(|| spinner("{spinner} [{elapsed}] {msg}"));
        StatusLine { bar, frames: 0 }
    }
}

fn spinner(template: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style =
        ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Live per-frame status for a running session.
pub struct StatusLine {
    bar: Option<ProgressBar>,
    frames: u64,
}

impl StatusLine {
    pub fn update(&mut self, event: &IterationEvent, frame_summary: &str) {
        if event.terminal {
            return;
        }
        self.frames += 1;
        let line = status_text(self.frames, event, frame_summary);
        match &self.bar {
            Some(bar) => bar.set_message(line),
            None if self.frames % PLAIN_STATUS_EVERY == 1 => eprintln!("{line}"),
            None => {}
        }
    }

    pub fn finish(&self, message: &str) {
        match &self.bar {
            Some(bar) => bar.finish_with_message(message.to_string()),
            None => eprintln!("{message}"),
        }
    }
}

fn status_text(frames: u64, event: &IterationEvent, frame_summary: &str) -> String {
    let mut line = format!("frame {} | {:.1} FPS | ", frames, event.fps);
    if event.detection_available {
        line.push_str(frame_summary);
    } else {
        line.push_str(&format!(
            "detector unavailable ({} frames)",
            event.consecutive_misses
        ));
    }
    if event.alert_fired {
        line.push_str(" | alert sent");
    }
    line
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skywatch::catalog::ClassCatalog;
    use skywatch::stats::ClassCounts;

    fn event(available: bool, alert_fired: bool) -> IterationEvent {
        let zero = ClassCounts::zeroed(&ClassCatalog::aerial());
        IterationEvent {
            frame_index: Some(0),
            annotated_frame: None,
            detections: Vec::new(),
            detection_available: available,
            fps: 12.34,
            frame_stats: zero.clone(),
            session_stats: zero,
            alert_fired,
            alert: None,
            consecutive_misses: if available { 0 } else { 3 },
            terminal: false,
            end: None,
        }
    }

    #[test]
    fn status_text_reports_fps_and_summary() {
        assert_eq!(
            status_text(7, &event(true, true), "No detections"),
            "frame 7 | 12.3 FPS | No detections | alert sent"
        );
        assert_eq!(
            status_text(8, &event(false, false), "ignored"),
            "frame 8 | 12.3 FPS | detector unavailable (3 frames)"
        );
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
