use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::catalog::{ClassCatalog, ClassEntry};
use crate::detect::DetectorSettings;
use crate::ingest::CameraSettings;
use crate::notify::TelegramConfig;
use crate::session::{Pacing, SessionConfig};

const DEFAULT_SOURCE: &str = "camera:0";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SkywatchConfigFile {
    source: Option<String>,
    detector: Option<DetectorConfigFile>,
    session: Option<SessionConfigFile>,
    alert: Option<AlertConfigFile>,
    telegram: Option<TelegramConfigFile>,
    camera: Option<CameraSettings>,
    classes: Option<Vec<ClassEntry>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    replay_path: Option<PathBuf>,
    input_size: Option<u32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SessionConfigFile {
    confidence: Option<f32>,
    frame_interval_ms: Option<u64>,
    fps_window: Option<usize>,
    pacing: Option<Pacing>,
    degraded_after_misses: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AlertConfigFile {
    enabled: Option<bool>,
    trigger_class: Option<String>,
    cooldown_secs: Option<u64>,
    session_events: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TelegramConfigFile {
    bot_token: Option<String>,
    chat_id: Option<String>,
    api_base: Option<String>,
    timeout_secs: Option<u64>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct SkywatchConfig {
    /// Source identifier, see `SourceSpec::parse`.
    pub source: String,
    pub detector: DetectorConfig,
    pub session: SessionConfig,
    /// Present when both bot token and chat id are configured.
    pub telegram: Option<TelegramConfig>,
    /// Explicit capture settings; negotiated from the device when absent.
    pub camera: Option<CameraSettings>,
    pub catalog: Arc<ClassCatalog>,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Registered backend name; the registry default when absent.
    pub backend: Option<String>,
    pub settings: DetectorSettings,
}

/// Telegram fields collected before deciding whether a notifier is configured.
#[derive(Debug, Clone, Default)]
struct TelegramDraft {
    bot_token: Option<String>,
    chat_id: Option<String>,
    api_base: Option<String>,
    timeout: Option<Duration>,
}

impl SkywatchConfig {
    /// Load from `SKYWATCH_CONFIG` (JSON, or TOML by extension), then apply
    /// `SKYWATCH_*` environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("SKYWATCH_CONFIG").ok().as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        Self::resolve(file_cfg.unwrap_or_default())
    }

    /// Load from an explicit file, still honoring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::resolve(read_config_file(path)?)
    }

    fn resolve(file: SkywatchConfigFile) -> Result<Self> {
        let (mut cfg, mut telegram) = Self::from_file(file)?;
        cfg.apply_env(&mut telegram)?;
        cfg.telegram = telegram.build()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SkywatchConfigFile) -> Result<(Self, TelegramDraft)> {
        let catalog = match file.classes {
            Some(entries) => ClassCatalog::from_entries(entries).context("invalid classes")?,
            None => ClassCatalog::aerial(),
        };

        let detector_file = file.detector.unwrap_or_default();
        let mut settings = DetectorSettings::default();
        if let Some(size) = detector_file.input_size {
            settings.input_size = size;
        }
        if let Some(iou) = detector_file.iou_threshold {
            settings.iou_threshold = iou;
        }
        settings.model_path = detector_file.model_path;
        settings.replay_path = detector_file.replay_path;

        let mut session = SessionConfig::default();
        if let Some(s) = file.session {
            if let Some(confidence) = s.confidence {
                session.confidence_threshold = confidence;
            }
            if let Some(ms) = s.frame_interval_ms {
                session.target_frame_interval = Duration::from_millis(ms);
            }
            if let Some(window) = s.fps_window {
                session.fps_window = window;
            }
            if let Some(pacing) = s.pacing {
                session.pacing = pacing;
            }
            if let Some(misses) = s.degraded_after_misses {
                session.degraded_after_misses = misses;
            }
        }
        if let Some(a) = file.alert {
            if let Some(enabled) = a.enabled {
                session.alert_enabled = enabled;
            }
            if let Some(class) = a.trigger_class {
                session.alert_trigger_class = class;
            }
            if let Some(secs) = a.cooldown_secs {
                session.alert_cooldown = Duration::from_secs(secs);
            }
            if let Some(events) = a.session_events {
                session.session_events = events;
            }
        }

        let telegram = file
            .telegram
            .map(|t| TelegramDraft {
                bot_token: t.bot_token,
                chat_id: t.chat_id,
                api_base: t.api_base,
                timeout: t.timeout_secs.map(Duration::from_secs),
            })
            .unwrap_or_default();

        Ok((
            Self {
                source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
                detector: DetectorConfig {
                    backend: detector_file.backend,
                    settings,
                },
                session,
                telegram: None,
                camera: file.camera,
                catalog: Arc::new(catalog),
            },
            telegram,
        ))
    }

    fn apply_env(&mut self, telegram: &mut TelegramDraft) -> Result<()> {
        if let Some(source) = env_nonempty("SKYWATCH_SOURCE") {
            self.source = source;
        }
        if let Some(confidence) = env_nonempty("SKYWATCH_CONFIDENCE") {
            self.session.confidence_threshold = confidence
                .parse()
                .map_err(|_| anyhow!("SKYWATCH_CONFIDENCE must be a number in (0, 1]"))?;
        }
        if let Some(backend) = env_nonempty("SKYWATCH_DETECTOR") {
            self.detector.backend = Some(backend);
        }
        if let Some(path) = env_nonempty("SKYWATCH_MODEL_PATH") {
            self.detector.settings.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_nonempty("SKYWATCH_REPLAY_PATH") {
            self.detector.settings.replay_path = Some(PathBuf::from(path));
        }
        if let Some(class) = env_nonempty("SKYWATCH_TRIGGER_CLASS") {
            self.session.alert_trigger_class = class;
        }
        if let Some(enabled) = env_nonempty("SKYWATCH_ALERT_ENABLED") {
            self.session.alert_enabled = parse_bool("SKYWATCH_ALERT_ENABLED", &enabled)?;
        }
        if let Some(cooldown) = env_nonempty("SKYWATCH_ALERT_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.parse().map_err(|_| {
                anyhow!("SKYWATCH_ALERT_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.session.alert_cooldown = Duration::from_secs(seconds);
        }
        if let Some(token) = env_nonempty("SKYWATCH_TELEGRAM_BOT_TOKEN") {
            telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = env_nonempty("SKYWATCH_TELEGRAM_CHAT_ID") {
            telegram.chat_id = Some(chat_id);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.session
            .validate()
            .map_err(|err| anyhow!("{}", err))?;
        let iou = self.detector.settings.iou_threshold;
        if !(iou > 0.0 && iou <= 1.0) {
            return Err(anyhow!("detector iou_threshold must be in (0, 1], got {}", iou));
        }
        if self.detector.settings.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        let needs_notifier = self.session.alert_enabled || self.session.session_events;
        if needs_notifier && self.telegram.is_none() {
            return Err(anyhow!(
                "alerts require telegram bot_token and chat_id (SKYWATCH_TELEGRAM_BOT_TOKEN, SKYWATCH_TELEGRAM_CHAT_ID)"
            ));
        }
        if self.session.alert_enabled && !self.catalog.contains(&self.session.alert_trigger_class) {
            return Err(anyhow!(
                "alert trigger class '{}' is not in the class catalog ({})",
                self.session.alert_trigger_class,
                self.catalog.names().collect::<Vec<_>>().join(", ")
            ));
        }
        Ok(())
    }
}

impl TelegramDraft {
    fn build(self) -> Result<Option<TelegramConfig>> {
        let (token, chat_id) = match (self.bot_token, self.chat_id) {
            (Some(token), Some(chat_id)) => (token, chat_id),
            (None, None) => return Ok(None),
            (Some(_), None) => return Err(anyhow!("telegram chat_id is required with a bot token")),
            (None, Some(_)) => return Err(anyhow!("telegram bot_token is required with a chat id")),
        };
        let mut cfg = TelegramConfig::new(token, chat_id);
        if let Some(base) = self.api_base {
            let url = Url::parse(&base).with_context(|| format!("invalid telegram api_base '{}'", base))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(anyhow!(
                    "telegram api_base must be http(s), got '{}'",
                    url.scheme()
                ));
            }
            cfg = cfg.with_api_base(base);
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(anyhow!("telegram timeout_secs must be greater than zero"));
            }
            cfg = cfg.with_timeout(timeout);
        }
        Ok(Some(cfg))
    }
}

fn read_config_file(path: &Path) -> Result<SkywatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean (true/false), got '{}'", key, value)),
    }
}
