use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::provider::ProviderId;

/// Operating mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Summary of rain for today and tomorrow.
    #[default]
    Daily,
    /// Near-term check covering the next 30 minutes.
    Alert,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Daily => "daily",
            Mode::Alert => "alert",
        }
    }

    /// Provider asked first for this mode.
    pub fn primary_provider(&self) -> ProviderId {
        match self {
            Mode::Daily => ProviderId::MetMalaysia,
            Mode::Alert => ProviderId::WeatherApi,
        }
    }

    /// Provider used when the primary fails. Same for both modes.
    pub fn fallback_provider(&self) -> ProviderId {
        ProviderId::OpenWeather
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized weather condition, independent of provider vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeatherCategory {
    Clear,
    Cloudy,
    LightRain,
    ModerateRain,
    Thunderstorm,
    Mist,
    Snow,
    Unknown,
}

impl WeatherCategory {
    pub fn is_rain(&self) -> bool {
        matches!(
            self,
            WeatherCategory::LightRain | WeatherCategory::ModerateRain | WeatherCategory::Thunderstorm
        )
    }
}

/// The fixed location notifications are computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Administrative name used to pick the right entry from providers that
    /// return many locations at once (MET Malaysia).
    pub name: Option<String>,
    /// Zone whose calendar days bound the daily window.
    pub timezone: Tz,
}

/// One normalized prediction for a single point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEntry {
    pub timestamp: DateTime<Utc>,
    pub is_rain: bool,
    pub description: String,
    /// Chance of precipitation, 0..=100.
    pub probability: Option<u8>,
    pub category: WeatherCategory,
    /// Length of the bucket starting at `timestamp` that this entry describes.
    pub span: Duration,
    pub source: ProviderId,
}

impl ForecastEntry {
    /// Whether `at` lies inside `[timestamp, timestamp + span)`.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.timestamp <= at && at < self.timestamp + self.span
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    pub provider: ProviderId,
    pub was_fallback: bool,
}

/// Entries returned by a single provider call, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub entries: Vec<ForecastEntry>,
    pub provenance: Provenance,
}

impl ProviderResult {
    /// Build a result from a provider's own data, sorting entries by time.
    pub fn new(provider: ProviderId, mut entries: Vec<ForecastEntry>) -> Self {
        entries.sort_by_key(|e| e.timestamp);
        Self {
            entries,
            provenance: Provenance {
                provider,
                was_fallback: false,
            },
        }
    }
}
