//! TOML profiles and their translation to `mino_core::BotConfig`.
//!
//! Core never sees these types. It receives a pre-built `BotConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use mino_api::{ClientConfig, KeyMaterial, StreamConfig, TransportConfig};
use mino_core::{BotConfig, DEFAULT_PREFIX};

use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "MINO_";
const KEY_CACHE_FILE: &str = "keys.json";

// ── TOML config structs ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is requested.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_prefix")]
    pub command_prefix: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// WebSocket keep-alive interval in seconds.
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval: u64,

    /// UTC offset in minutes reported with active time.
    #[serde(default = "default_timezone")]
    pub timezone: i32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            command_prefix: default_prefix(),
            timeout: default_timeout(),
            heartbeat_interval: default_heartbeat(),
            timezone: default_timezone(),
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.into()
}
fn default_timeout() -> u64 {
    30
}
fn default_heartbeat() -> u64 {
    10
}
fn default_timezone() -> i32 {
    -300
}
fn default_true() -> bool {
    true
}

/// One bot account.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Profile {
    pub email: Option<String>,

    /// Plaintext password. Prefer the keyring or `password_env`.
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Session id to log in with instead of a password.
    pub sid: Option<String>,

    pub device_id: Option<String>,

    pub command_prefix: Option<String>,

    pub community_id: Option<i64>,

    pub proxy: Option<String>,

    #[serde(default)]
    pub keys: KeyMaterial,

    #[serde(default)]
    pub intents: bool,

    #[serde(default)]
    pub online_status: bool,

    /// Reuse cached sessions. Default: true.
    #[serde(default = "default_true")]
    pub use_cache: bool,

    pub heartbeat_interval: Option<u64>,

    pub timeout: Option<u64>,

    pub cooldown_message: Option<String>,

    /// Overrides the platform data directory for caches.
    pub cache_dir: Option<PathBuf>,
}

// ── Paths ────────────────────────────────────────────────────────────

/// Where the config file and caches live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
}

impl Paths {
    /// Platform locations, falling back to `./.mino` when no home
    /// directory can be determined.
    pub fn platform() -> Self {
        ProjectDirs::from("rs", "mino", "mino").map_or_else(
            || Self::rooted(Path::new(".mino")),
            |dirs| Self {
                config_file: dirs.config_dir().join("config.toml"),
                data_dir: dirs.data_dir().to_path_buf(),
            },
        )
    }

    /// Everything under one directory.
    pub fn rooted(root: &Path) -> Self {
        Self {
            config_file: root.join("config.toml"),
            data_dir: root.join("data"),
        }
    }

    pub fn key_cache(&self) -> PathBuf {
        self.data_dir.join(KEY_CACHE_FILE)
    }
}

// ── Loading ──────────────────────────────────────────────────────────

/// Load the config file merged with `MINO_` environment variables.
/// A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    Ok(config)
}

/// Write the config as TOML, creating parent directories.
pub fn save_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}

impl Config {
    /// The requested profile name, else the configured default.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(String::from)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_owned(),
                available: self.available_profiles(),
            })
    }

    fn available_profiles(&self) -> String {
        if self.profiles.is_empty() {
            return "none".into();
        }
        self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

// ── Translation ──────────────────────────────────────────────────────

impl Profile {
    /// Build the runtime bot configuration.
    ///
    /// This is the single boundary where profile types cross into core
    /// types.
    pub fn to_bot_config(&self, defaults: &Defaults, paths: &Paths) -> Result<BotConfig, ConfigError> {
        let data_dir = self.cache_dir.clone().unwrap_or_else(|| paths.data_dir.clone());

        let mut transport = TransportConfig {
            timeout: Duration::from_secs(self.timeout.unwrap_or(defaults.timeout)),
            ..TransportConfig::default()
        };
        if let Some(ref proxy) = self.proxy {
            let url = Url::parse(proxy)
                .map_err(|e| ConfigError::validation("proxy", format!("{proxy}: {e}")))?;
            transport = transport.with_proxy(url);
        }

        let client = ClientConfig {
            transport,
            keys: self.keys.clone(),
            key_cache: Some(data_dir.join(KEY_CACHE_FILE)),
            device_id: self.device_id.clone(),
            ..ClientConfig::default()
        };

        let stream = StreamConfig {
            heartbeat_interval: Duration::from_secs(
                self.heartbeat_interval.unwrap_or(defaults.heartbeat_interval),
            ),
            ..StreamConfig::default()
        };

        let config = BotConfig {
            client,
            stream,
            command_prefix: self
                .command_prefix
                .clone()
                .unwrap_or_else(|| defaults.command_prefix.clone()),
            community_id: self.community_id,
            intents: self.intents,
            online_status: self.online_status,
            timezone: defaults.timezone,
            cooldown_message: self.cooldown_message.clone(),
            cache_dir: self.use_cache.then_some(data_dir),
            ..BotConfig::default()
        };
        config
            .validate()
            .map_err(|e| ConfigError::validation("profile", e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = r#"
        default_profile = "main"

        [defaults]
        command_prefix = "$"

        [profiles.main]
        email = "bot@example.com"
        password_env = "BOT_PASSWORD"
        community_id = 12345
        intents = true

        [profiles.main.keys]
        prefix = 25
        service_key = "00ff"

        [profiles.alt]
        sid = "abc"
        command_prefix = "?"
        proxy = "http://127.0.0.1:8080"
    "#;

    #[test]
    fn loads_profiles_from_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            let config = load_config(Path::new("config.toml")).unwrap();

            assert_eq!(config.active_profile_name(None), "main");
            assert_eq!(config.defaults.command_prefix, "$");
            assert_eq!(config.defaults.timeout, 30);

            let main = config.profile("main").unwrap();
            assert_eq!(main.email.as_deref(), Some("bot@example.com"));
            assert_eq!(main.community_id, Some(12345));
            assert_eq!(main.keys.prefix, Some(25));
            assert!(main.use_cache);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("MINO_DEFAULT_PROFILE", "alt");
            jail.set_env("MINO_DEFAULTS__TIMEOUT", "5");
            let config = load_config(Path::new("config.toml")).unwrap();

            assert_eq!(config.active_profile_name(None), "alt");
            assert_eq!(config.active_profile_name(Some("main")), "main");
            assert_eq!(config.defaults.timeout, 5);
            Ok(())
        });
    }

    #[test]
    fn missing_file_gives_defaults() {
        Jail::expect_with(|_| {
            let config = load_config(Path::new("nope.toml")).unwrap();
            assert_eq!(config, Config::default());
            assert!(matches!(
                config.profile("main"),
                Err(ConfigError::ProfileNotFound { .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn profile_translates_to_bot_config() {
        let paths = Paths::rooted(Path::new("/tmp/mino-test"));
        let profile = Profile {
            command_prefix: Some("?".into()),
            proxy: Some("http://127.0.0.1:8080".into()),
            community_id: Some(9),
            online_status: true,
            heartbeat_interval: Some(20),
            use_cache: true,
            ..Profile::default()
        };

        let config = profile.to_bot_config(&Defaults::default(), &paths).unwrap();
        assert_eq!(config.command_prefix, "?");
        assert_eq!(config.community_id, Some(9));
        assert!(config.online_status);
        assert_eq!(config.stream.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(config.client.transport.timeout, Duration::from_secs(30));
        assert!(config.client.transport.proxy.is_some());
        assert_eq!(config.cache_dir, Some(paths.data_dir.clone()));
        assert_eq!(config.client.key_cache, Some(paths.key_cache()));
    }

    #[test]
    fn bad_values_are_rejected() {
        let paths = Paths::rooted(Path::new("/tmp/mino-test"));
        let bad_proxy = Profile {
            proxy: Some("not a url".into()),
            ..Profile::default()
        };
        assert!(matches!(
            bad_proxy.to_bot_config(&Defaults::default(), &paths),
            Err(ConfigError::Validation { ref field, .. }) if field == "proxy"
        ));

        let bad_prefix = Profile {
            command_prefix: Some("a b".into()),
            ..Profile::default()
        };
        assert!(bad_prefix.to_bot_config(&Defaults::default(), &paths).is_err());
    }

    #[test]
    fn cache_can_be_disabled() {
        let paths = Paths::rooted(Path::new("/tmp/mino-test"));
        let profile = Profile {
            use_cache: false,
            ..Profile::default()
        };
        let config = profile.to_bot_config(&Defaults::default(), &paths).unwrap();
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                email: Some("bot@example.com".into()),
                use_cache: true,
                ..Profile::default()
            },
        );
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.profiles, config.profiles);
    }
}
