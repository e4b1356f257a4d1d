//! Skywatch
//!
//! Real-time aerial object detection sessions: frames come from a camera, a video file,
//! a directory of frames or a single image, pass through a detector, get annotated and
//! counted, and can trigger cooldown-gated Telegram alerts.
//!
//! # Architecture
//!
//! One `SessionController` owns a session and steps it frame by frame:
//!
//! ```text
//! FrameSource::next_frame -> Detector::detect -> Annotator::annotate
//!     -> StatsTracker -> AlertGate::maybe_fire -> IterationEvent
//! ```
//!
//! Collaborator failures never crash the loop. A detector failure skips the frame, a
//! notifier failure is reported and retried on the next qualifying frame, and only a
//! frame source failure ends the session.
//!
//! # Module Structure
//!
//! - `catalog`: class names, colors and icons (injected, never global)
//! - `frame`: shared-pixel frames with copy-on-write
//! - `ingest`: frame sources (synthetic, image, frame directory, video, camera)
//! - `detect`: detector backends, registry and the session-facing `Detector`
//! - `annotate`: box and label overlay
//! - `stats`: FPS and per-class counts
//! - `alert`: cooldown gate
//! - `notify`: notifier trait and Telegram transport
//! - `session`: the controller state machine
//! - `config`: file + environment configuration

pub mod alert;
pub mod annotate;
pub mod catalog;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod session;
pub mod stats;

pub use alert::{AlertGate, AlertOutcome, AlertState};
pub use annotate::{Annotator, AnnotatorStyle};
pub use catalog::{ClassCatalog, ClassEntry, Color};
pub use config::SkywatchConfig;
pub use detect::{
    BackendRegistry, BoundingBox, Detection, Detector, DetectorBackend, DetectorSettings,
    RawDetection,
};
pub use error::SessionError;
pub use frame::Frame;
pub use ingest::{build_source, source_from_identifier, CameraSettings, FrameSource, SourceSpec};
pub use notify::{ConnectionCheck, Notifier, NotifyError, NullNotifier, TelegramConfig, TelegramNotifier};
pub use session::{
    IterationEvent, Pacing, SessionConfig, SessionController, SessionEnd, SessionState, StopHandle,
};
pub use stats::{ClassCounts, FpsMeter, StatsTracker};
