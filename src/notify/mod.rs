//! Outbound notifications.
//!
//! The session talks to a `Notifier`; every send reports plain success or failure and
//! never aborts the caller. Transport details live behind the trait (`telegram`).

pub mod messages;
pub mod telegram;

use thiserror::Error;

use crate::stats::ClassCounts;

pub use telegram::{TelegramConfig, TelegramNotifier, DEFAULT_API_BASE, DEFAULT_TIMEOUT};

/// Transport-level notification failure.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("missing notifier credentials: {0}")]
    MissingCredentials(&'static str),

    #[error("endpoint returned HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

/// Result of a connectivity probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionCheck {
    pub ok: bool,
    pub message: String,
}

impl ConnectionCheck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Message sink used by the alert gate and the session controller.
///
/// Each send returns `true` when the endpoint accepted the message.
pub trait Notifier: Send {
    fn send_test(&self) -> bool;

    /// Alert that `count` objects of `trigger_class` are in the current frame.
    fn send_alert(&self, trigger_class: &str, count: u64) -> bool;

    fn send_session_start(&self) -> bool;

    /// Session summary with the final cumulative counts.
    fn send_session_end(&self, session_counts: &ClassCounts) -> bool;

    fn test_connection(&self) -> ConnectionCheck;
}

/// Notifier that drops every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn send_test(&self) -> bool {
        log::debug!("notifications disabled; test message dropped");
        true
    }

    fn send_alert(&self, trigger_class: &str, count: u64) -> bool {
        log::debug!(
            "notifications disabled; {} alert ({}) dropped",
            trigger_class,
            count
        );
        true
    }

    fn send_session_start(&self) -> bool {
        true
    }

    fn send_session_end(&self, _session_counts: &ClassCounts) -> bool {
        true
    }

    fn test_connection(&self) -> ConnectionCheck {
        ConnectionCheck::failed("notifications disabled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ClassCatalog;

    #[test]
    fn null_notifier_accepts_messages_but_reports_no_connection() {
        let notifier = NullNotifier;
        assert!(notifier.send_alert("Drone", 2));
        assert!(notifier.send_session_end(&ClassCounts::zeroed(&ClassCatalog::aerial())));
        let check = notifier.test_connection();
        assert!(!check.ok);
        assert_eq!(check.message, "notifications disabled");
    }

    #[test]
    fn notify_errors_render_readably() {
        assert_eq!(NotifyError::Status(401).to_string(), "endpoint returned HTTP 401");
        assert_eq!(
            NotifyError::MissingCredentials("bot token").to_string(),
            "missing notifier credentials: bot token"
        );
    }
}
