//! Application configuration. Bot token, data dir, scheduling timezone.

use std::str::FromStr;

use chrono_tz::Tz;
use serde::Deserialize;
use tracing::warn;

/// Default long-poll hold for getUpdates, in seconds.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// All schedules run on this civil calendar unless overridden.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Istanbul;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Bot API token. Read from TG_REPOST_BOT_TOKEN (or TELEGRAM_BOT_TOKEN).
    pub bot_token: Option<String>,

    /// Directory holding the job registry file. Read from TG_REPOST_DATA_DIR.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// IANA timezone name for schedules. Read from TG_REPOST_TIMEZONE.
    #[serde(default)]
    pub timezone: Option<String>,

    /// getUpdates long-poll hold in seconds. Read from TG_REPOST_POLL_TIMEOUT_SECS.
    #[serde(default)]
    pub poll_timeout_secs: Option<u64>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("TG_REPOST"));
        if let Ok(path) = std::env::var("TG_REPOST_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        let mut cfg: Self = c.build()?.try_deserialize()?;
        // TELEGRAM_BOT_TOKEN is read without the prefix so existing bot
        // deployments keep working.
        if cfg.bot_token.is_none() {
            cfg.bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        }
        Ok(cfg)
    }

    /// The bot token, if configured. Startup is fatal without one.
    pub fn bot_token(&self) -> Option<String> {
        self.bot_token.clone().filter(|t| !t.is_empty())
    }

    pub fn data_dir_or_default(&self) -> String {
        self.data_dir.clone().unwrap_or_else(|| "./data".to_string())
    }

    /// Scheduling timezone. Unknown names fall back to the default with a
    /// warning rather than failing startup.
    pub fn timezone_or_default(&self) -> Tz {
        match self.timezone.as_deref() {
            Some(name) => Tz::from_str(name).unwrap_or_else(|_| {
                warn!(name, "unknown timezone; using {}", DEFAULT_TIMEZONE);
                DEFAULT_TIMEZONE
            }),
            None => DEFAULT_TIMEZONE,
        }
    }

    pub fn poll_timeout_secs_or_default(&self) -> u64 {
        self.poll_timeout_secs.unwrap_or(DEFAULT_POLL_TIMEOUT_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timezone_fallback() {
        let cfg = AppConfig { timezone: Some("Not/AZone".to_string()), ..Default::default() };
        assert_eq!(cfg.timezone_or_default(), DEFAULT_TIMEZONE);

        let cfg = AppConfig { timezone: Some("Europe/Berlin".to_string()), ..Default::default() };
        assert_eq!(cfg.timezone_or_default(), chrono_tz::Europe::Berlin);

        let cfg = AppConfig::default();
        assert_eq!(cfg.timezone_or_default(), DEFAULT_TIMEZONE);
    }

    #[test]
    fn test_empty_token_counts_as_missing() {
        let cfg = AppConfig { bot_token: Some(String::new()), ..Default::default() };
        assert!(cfg.bot_token().is_none());
    }
}
