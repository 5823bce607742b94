// ── Runtime bot configuration ──
//
// Describes how a bot talks to the service and how it routes messages.
// Built by the CLI (or any embedding application) and handed to `Bot`;
// core never reads config files.

use std::path::PathBuf;
use std::time::Duration;

use mino_api::{ClientConfig, StreamConfig};

use crate::error::CoreError;

pub const DEFAULT_PREFIX: &str = "!";

/// Configuration for a single bot account.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// HTTP client, identity keys, and transport tuning.
    pub client: ClientConfig,
    /// WebSocket heartbeat and reconnect tuning.
    pub stream: StreamConfig,
    /// Prefix that marks a chat message as a command.
    pub command_prefix: String,
    /// Community the bot works in, if fixed up front.
    pub community_id: Option<i64>,
    /// Populate the per-user message mailbox so `wait_for_message` works.
    pub intents: bool,
    /// Report user active time for every community the bot hears from.
    pub online_status: bool,
    /// Period of the active-time reporting loop.
    pub activity_interval: Duration,
    /// UTC offset in minutes sent with active-time reports.
    pub timezone: i32,
    /// Reply sent when a command is on cooldown. `{seconds}` is
    /// replaced with the remaining time.
    pub cooldown_message: Option<String>,
    /// Directory holding the login cache. `None` disables caching.
    pub cache_dir: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            stream: StreamConfig::default(),
            command_prefix: DEFAULT_PREFIX.into(),
            community_id: None,
            intents: false,
            online_status: false,
            activity_interval: Duration::from_secs(300),
            timezone: -300,
            cooldown_message: None,
            cache_dir: None,
        }
    }
}

impl BotConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_prefix(&self.command_prefix)?;
        if let Some(id) = self.community_id {
            if id <= 0 {
                return Err(CoreError::InvalidCommunityId {
                    value: id.to_string(),
                });
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_prefix(prefix: &str) -> Result<(), CoreError> {
    if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
        return Err(CoreError::InvalidCommandPrefix {
            prefix: prefix.to_owned(),
        });
    }
    Ok(())
}

/// Parse a community id given as text.
pub fn parse_community_id(raw: &str) -> Result<i64, CoreError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| CoreError::InvalidCommunityId {
            value: raw.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BotConfig::default();
        assert_eq!(config.command_prefix, "!");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn prefix_must_be_a_single_token() {
        for bad in ["", " ", "! ", "a b"] {
            let config = BotConfig {
                command_prefix: bad.into(),
                ..BotConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(CoreError::InvalidCommandPrefix { .. })
            ));
        }
        assert!(validate_prefix("$$").is_ok());
    }

    #[test]
    fn community_ids_parse() {
        assert_eq!(parse_community_id(" 123 ").unwrap(), 123);
        assert!(matches!(
            parse_community_id("x123"),
            Err(CoreError::InvalidCommunityId { .. })
        ));
        assert!(parse_community_id("0").is_err());
        assert!(parse_community_id("-4").is_err());
    }
}
