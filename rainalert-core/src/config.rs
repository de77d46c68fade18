use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    model::{Location, Mode},
    provider::ProviderId,
};

pub const DEFAULT_TIMEZONE: &str = "Asia/Kuala_Lumpur";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("could not determine platform config directory")]
    NoConfigDir,

    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize configuration to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Administrative name, e.g. "Petaling". Needed by MET Malaysia.
    pub name: Option<String>,
    /// IANA zone name; defaults to Asia/Kuala_Lumpur.
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// http_timeout_secs = 15
///
/// [location]
/// latitude = 3.1073
/// longitude = 101.6067
/// name = "Petaling"
///
/// [providers.openweather]
/// api_key = "..."
///
/// [telegram]
/// bot_token = "..."
/// chat_id = "..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub http_timeout_secs: Option<u64>,

    #[serde(default)]
    pub location: LocationConfig,

    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Config {
    /// Load config from `path`, or an empty default if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            // Environment variables alone are a valid setup for cron.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let toml = toml::to_string_pretty(self)?;

        fs::write(path, toml).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("dev", "rainalert", "rainalert").ok_or(ConfigError::NoConfigDir)?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Override file values with process environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override file values with whatever `lookup` returns. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("LAT") {
            self.location.latitude = Some(parse_number("LAT", &v)?);
        }
        if let Some(v) = get("LON") {
            self.location.longitude = Some(parse_number("LON", &v)?);
        }
        if let Some(v) = get("LOCATION_NAME") {
            self.location.name = Some(v);
        }
        if let Some(v) = get("TIMEZONE") {
            self.location.timezone = Some(v);
        }
        if let Some(v) = get("HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = Some(parse_number("HTTP_TIMEOUT_SECS", &v)?);
        }

        for (var, id) in [
            ("MET_API_TOKEN", ProviderId::MetMalaysia),
            ("WEATHERAPI_API_KEY", ProviderId::WeatherApi),
            ("OPENWEATHER_API_KEY", ProviderId::OpenWeather),
        ] {
            if let Some(v) = get(var) {
                self.upsert_provider_api_key(id, v);
            }
        }

        if let Some(v) = get("TELEGRAM_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = get("CHAT_ID") {
            self.telegram.chat_id = Some(v);
        }

        Ok(())
    }

    /// Set or replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .insert(provider_id.as_str().to_string(), ProviderConfig { api_key });
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers
            .get(provider_id.as_str())
            .map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        let name = self.location.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        name.parse::<Tz>().map_err(|e| ConfigError::Invalid {
            field: "location.timezone",
            reason: e.to_string(),
        })
    }

    /// The validated location. Latitude and longitude are required.
    pub fn location(&self) -> Result<Location, ConfigError> {
        let latitude = self
            .location
            .latitude
            .ok_or(ConfigError::MissingField("location.latitude"))?;
        let longitude = self
            .location
            .longitude
            .ok_or(ConfigError::MissingField("location.longitude"))?;

        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ConfigError::Invalid {
                field: "location.latitude",
                reason: format!("{latitude} is outside -90..=90"),
            });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ConfigError::Invalid {
                field: "location.longitude",
                reason: format!("{longitude} is outside -180..=180"),
            });
        }

        Ok(Location {
            latitude,
            longitude,
            name: self.location.name.clone(),
            timezone: self.timezone()?,
        })
    }

    /// Bot token and chat id for the Telegram notifier.
    pub fn telegram_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let token = self
            .telegram
            .bot_token
            .as_deref()
            .ok_or(ConfigError::MissingField("telegram.bot_token"))?;
        let chat_id = self
            .telegram
            .chat_id
            .as_deref()
            .ok_or(ConfigError::MissingField("telegram.chat_id"))?;
        Ok((token, chat_id))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(
            self.http_timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        )
    }

    /// Check everything a run in `mode` needs before any request goes out.
    pub fn validate_for(&self, mode: Mode, needs_telegram: bool) -> Result<(), ConfigError> {
        self.location()?;

        for id in [mode.primary_provider(), mode.fallback_provider()] {
            if id.requires_api_key() && !self.is_provider_configured(id) {
                return Err(ConfigError::MissingField(match id {
                    ProviderId::WeatherApi => "providers.weatherapi.api_key",
                    ProviderId::OpenWeather => "providers.openweather.api_key",
                    ProviderId::MetMalaysia => "providers.metmalaysia.api_key",
                }));
            }
        }

        if needs_telegram {
            self.telegram_credentials()?;
        }

        Ok(())
    }
}

fn parse_number<T>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("'{value}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn complete() -> Config {
        let mut cfg = Config::default();
        cfg.apply_env_from(env(&[
            ("LAT", "3.1073"),
            ("LON", "101.6067"),
            ("LOCATION_NAME", "Petaling"),
            ("OPENWEATHER_API_KEY", "OW"),
            ("WEATHERAPI_API_KEY", "WA"),
            ("TELEGRAM_TOKEN", "TG"),
            ("CHAT_ID", "42"),
        ]))
        .unwrap();
        cfg
    }

    #[test]
    fn set_api_key_for_provider() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OPEN_KEY".into());

        let key = cfg.provider_api_key(ProviderId::OpenWeather);
        assert_eq!(key, Some("OPEN_KEY"));
        assert!(cfg.is_provider_configured(ProviderId::OpenWeather));
        assert!(!cfg.is_provider_configured(ProviderId::WeatherApi));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg: Config = toml::from_str(
            r#"
            [location]
            latitude = 1.0
            longitude = 2.0
            name = "Langkawi"

            [providers.openweather]
            api_key = "FROM_FILE"
            "#,
        )
        .unwrap();

        cfg.apply_env_from(env(&[("LAT", "3.5"), ("OPENWEATHER_API_KEY", "FROM_ENV"), ("LON", "  ")]))
            .unwrap();

        assert_eq!(cfg.location.latitude, Some(3.5));
        assert_eq!(cfg.location.longitude, Some(2.0));
        assert_eq!(cfg.location.name.as_deref(), Some("Langkawi"));
        assert_eq!(cfg.provider_api_key(ProviderId::OpenWeather), Some("FROM_ENV"));
    }

    #[test]
    fn bad_number_in_env_is_invalid() {
        let mut cfg = Config::default();
        let err = cfg.apply_env_from(env(&[("LAT", "north")])).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { field: "LAT", .. }));
    }

    #[test]
    fn location_requires_coordinates() {
        let cfg = Config::default();
        assert!(matches!(
            cfg.location().unwrap_err(),
            ConfigError::MissingField("location.latitude")
        ));

        let location = complete().location().unwrap();
        assert_eq!(location.name.as_deref(), Some("Petaling"));
        assert_eq!(location.timezone, chrono_tz::Asia::Kuala_Lumpur);
    }

    #[test]
    fn unknown_timezone_is_invalid() {
        let mut cfg = complete();
        cfg.location.timezone = Some("Mars/Olympus_Mons".into());

        assert!(matches!(
            cfg.location().unwrap_err(),
            ConfigError::Invalid { field: "location.timezone", .. }
        ));
    }

    #[test]
    fn validate_reports_missing_provider_key_by_mode() {
        let mut cfg = complete();
        cfg.providers.remove(ProviderId::WeatherApi.as_str());

        // Daily uses MET Malaysia, whose token is optional.
        assert!(cfg.validate_for(Mode::Daily, true).is_ok());
        assert!(matches!(
            cfg.validate_for(Mode::Alert, true).unwrap_err(),
            ConfigError::MissingField("providers.weatherapi.api_key")
        ));
    }

    #[test]
    fn validate_skips_telegram_when_not_sending() {
        let mut cfg = complete();
        cfg.telegram = TelegramConfig::default();

        assert!(cfg.validate_for(Mode::Daily, false).is_ok());
        assert!(matches!(
            cfg.validate_for(Mode::Daily, true).unwrap_err(),
            ConfigError::MissingField("telegram.bot_token")
        ));
    }

    #[test]
    fn http_timeout_is_never_zero() {
        let mut cfg = Config::default();
        assert_eq!(cfg.http_timeout(), Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));

        cfg.http_timeout_secs = Some(0);
        assert_eq!(cfg.http_timeout(), Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));

        cfg.http_timeout_secs = Some(5);
        assert_eq!(cfg.http_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn save_and_load_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let cfg = complete();
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.location, cfg.location);
        assert_eq!(loaded.provider_api_key(ProviderId::WeatherApi), Some("WA"));
        assert_eq!(loaded.telegram.chat_id.as_deref(), Some("42"));
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert!(cfg.providers.is_empty());
    }
}
