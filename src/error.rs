use thiserror::Error;

/// Failures surfaced by the session controller.
///
/// Only `ResourceUnavailable` ends a session. Detector and notifier failures are
/// absorbed per call and reported through the iteration event instead.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Frame source could not be opened or read.
    #[error("frame source unavailable: {0}")]
    ResourceUnavailable(String),

    /// Detector backend is not loaded or failed to run.
    #[error("detector unavailable: {0}")]
    DetectionUnavailable(String),

    /// Notification transport or credentials failed.
    ///
    /// The controller never returns this: alert and session message failures are
    /// reported as `false` / `AlertOutcome::Failed` and the loop keeps running.
    #[error("notification failed: {0}")]
    NotificationFailed(String),

    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    #[error("session is not running")]
    NotRunning,
}

impl SessionError {
    /// Wraps an adapter error chain as a frame source failure.
    pub fn resource(err: &anyhow::Error) -> Self {
        SessionError::ResourceUnavailable(format!("{:#}", err))
    }

    /// Returns true when this failure ends the current session.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, SessionError::ResourceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn resource_error_keeps_context_chain() {
        let err = Err::<(), _>(anyhow!("no such device"))
            .context("open camera 3")
            .unwrap_err();
        let mapped = SessionError::resource(&err);
        assert_eq!(
            mapped.to_string(),
            "frame source unavailable: open camera 3: no such device"
        );
        assert!(mapped.is_fatal_to_session());
    }

    #[test]
    fn detector_and_notifier_failures_are_not_fatal() {
        assert!(!SessionError::DetectionUnavailable("x".into()).is_fatal_to_session());
        assert!(!SessionError::NotificationFailed("x".into()).is_fatal_to_session());
    }
}
