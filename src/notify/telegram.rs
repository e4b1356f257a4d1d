//! Telegram Bot API notifier.
//!
//! Messages go to `POST <api_base>/bot<token>/sendMessage` as JSON with HTML parse mode.
//! Only HTTP 200 counts as delivered. The connection check calls `getMe`.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use super::messages;
use super::{ConnectionCheck, Notifier, NotifyError};
use crate::catalog::ClassCatalog;
use crate::stats::ClassCounts;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// Bot API root, without trailing slash.
    pub api_base: String,
    pub timeout: Duration,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

#[derive(Debug, Deserialize)]
struct GetMeResponse {
    ok: bool,
    #[serde(default)]
    result: Option<BotInfo>,
}

#[derive(Debug, Deserialize)]
struct BotInfo {
    #[serde(default)]
    first_name: Option<String>,
}

pub struct TelegramNotifier {
    config: TelegramConfig,
    catalog: Arc<ClassCatalog>,
    agent: ureq::Agent,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig, catalog: Arc<ClassCatalog>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            config,
            catalog,
            agent,
        }
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    /// Deliver one HTML-mode message.
    pub fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        self.check_credentials()?;
        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        let response = self
            .agent
            .post(&self.config.method_url("sendMessage"))
            .send_json(payload)
            .map_err(map_ureq_error)?;
        match response.status() {
            200 => Ok(()),
            other => Err(NotifyError::Status(other)),
        }
    }

    fn check_credentials(&self) -> Result<(), NotifyError> {
        if self.config.bot_token.trim().is_empty() {
            return Err(NotifyError::MissingCredentials("bot token"));
        }
        if self.config.chat_id.trim().is_empty() {
            return Err(NotifyError::MissingCredentials("chat id"));
        }
        Ok(())
    }

    fn deliver(&self, kind: &str, text: &str) -> bool {
        match self.send_message(text) {
            Ok(()) => {
                log::info!("telegram: {} message delivered", kind);
                true
            }
            Err(err) => {
                log::warn!("telegram: {} message failed: {}", kind, err);
                false
            }
        }
    }

    fn probe(&self) -> Result<String, NotifyError> {
        if self.config.bot_token.trim().is_empty() {
            return Err(NotifyError::MissingCredentials("bot token"));
        }
        let response = self
            .agent
            .get(&self.config.method_url("getMe"))
            .call()
            .map_err(map_ureq_error)?;
        if response.status() != 200 {
            return Err(NotifyError::Status(response.status()));
        }
        let body: GetMeResponse = response
            .into_json()
            .map_err(|e| NotifyError::InvalidResponse(e.to_string()))?;
        if !body.ok {
            return Err(NotifyError::InvalidResponse("invalid bot token".to_string()));
        }
        Ok(body
            .result
            .and_then(|bot| bot.first_name)
            .unwrap_or_else(|| "Unknown".to_string()))
    }
}

impl Notifier for TelegramNotifier {
    fn send_test(&self) -> bool {
        self.deliver("test", &messages::test_message(&messages::timestamp_now()))
    }

    fn send_alert(&self, trigger_class: &str, count: u64) -> bool {
        let text = messages::alert_message(
            trigger_class,
            self.catalog.icon_for(trigger_class),
            count,
            &messages::timestamp_now(),
        );
        self.deliver("alert", &text)
    }

    fn send_session_start(&self) -> bool {
        self.deliver(
            "session start",
            &messages::session_start_message(&messages::timestamp_now()),
        )
    }

    fn send_session_end(&self, session_counts: &ClassCounts) -> bool {
        let text = messages::session_end_message(
            session_counts,
            &self.catalog,
            &messages::timestamp_now(),
        );
        self.deliver("session end", &text)
    }

    fn test_connection(&self) -> ConnectionCheck {
        match self.probe() {
            Ok(name) => ConnectionCheck::ok(format!("Connected to bot: {}", name)),
            Err(NotifyError::Status(code)) => ConnectionCheck::failed(format!("HTTP error: {}", code)),
            Err(NotifyError::InvalidResponse(reason)) if reason == "invalid bot token" => {
                ConnectionCheck::failed("Invalid bot token")
            }
            Err(NotifyError::Transport(reason)) => {
                ConnectionCheck::failed(format!("Connection error: {}", reason))
            }
            Err(err) => ConnectionCheck::failed(format!("Error: {}", err)),
        }
    }
}

fn map_ureq_error(err: ureq::Error) -> NotifyError {
    match err {
        ureq::Error::Status(code, _) => NotifyError::Status(code),
        ureq::Error::Transport(transport) => NotifyError::Transport(transport.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_joins_base_token_and_method() {
        let config = TelegramConfig::new("123:abc", "42").with_api_base("http://127.0.0.1:9000/");
        assert_eq!(
            config.method_url("sendMessage"),
            "http://127.0.0.1:9000/bot123:abc/sendMessage"
        );
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn missing_credentials_fail_without_network() {
        let notifier = TelegramNotifier::new(
            TelegramConfig::new("", "42").with_api_base("http://127.0.0.1:9"),
            Arc::default(),
        );
        assert!(matches!(
            notifier.send_message("hi"),
            Err(NotifyError::MissingCredentials("bot token"))
        ));
        assert!(!notifier.send_test());

        let check = notifier.test_connection();
        assert!(!check.ok);
        assert!(check.message.contains("bot token"));
    }
}
