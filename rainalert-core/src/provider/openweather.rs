use async_trait::async_trait;
use chrono::{DateTime, Duration};
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::{
    Location, Mode,
    model::{ForecastEntry, ProviderResult, WeatherCategory},
    provider::{ProviderError, ProviderId, parse_json, status_error},
};

use super::ForecastProvider;

const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// 5-day / 3-hour forecast. Fallback for both modes.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: Client,
    base_url: String,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, http: Client) -> Self {
        Self {
            api_key,
            http,
            base_url: OPENWEATHER_BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    weather: Vec<OwWeather>,
    /// Probability of precipitation, 0.0..=1.0.
    #[serde(default)]
    pop: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwForecastEntry>,
}

/// Map an OpenWeather icon code ("10d", "50n", ...) to a category.
fn category_from_icon(icon: &str) -> WeatherCategory {
    match icon.get(..2) {
        Some("01") => WeatherCategory::Clear,
        Some("02" | "03" | "04") => WeatherCategory::Cloudy,
        Some("09") => WeatherCategory::ModerateRain,
        Some("10") => WeatherCategory::LightRain,
        Some("11") => WeatherCategory::Thunderstorm,
        Some("13") => WeatherCategory::Snow,
        Some("50") => WeatherCategory::Mist,
        _ => WeatherCategory::Unknown,
    }
}

fn is_rain_group(main: &str) -> bool {
    let main = main.to_lowercase();
    main.contains("rain") || main.contains("drizzle") || main.contains("thunderstorm")
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

impl TryFrom<OwForecastEntry> for ForecastEntry {
    type Error = ProviderError;

    fn try_from(entry: OwForecastEntry) -> Result<Self, Self::Error> {
        let timestamp = DateTime::from_timestamp(entry.dt, 0).ok_or_else(|| {
            ProviderError::MalformedResponse(format!("invalid timestamp {}", entry.dt))
        })?;

        let weather = entry.weather.first().ok_or_else(|| {
            ProviderError::MalformedResponse(format!("entry at {} has no weather data", entry.dt))
        })?;

        Ok(ForecastEntry {
            timestamp,
            is_rain: is_rain_group(&weather.main),
            description: title_case(&weather.description),
            probability: entry.pop.map(|p| (p.clamp(0.0, 1.0) * 100.0).round() as u8),
            category: category_from_icon(&weather.icon),
            span: Duration::hours(3),
            source: ProviderId::OpenWeather,
        })
    }
}

#[async_trait]
impl ForecastProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    #[instrument(skip(self, location), fields(provider = "openweather"))]
    async fn fetch(&self, location: &Location, mode: Mode) -> Result<ProviderResult, ProviderError> {
        let url = format!("{}/forecast", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[
                ("lat", location.latitude.to_string()),
                ("lon", location.longitude.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(status_error(ProviderId::OpenWeather, status, &body));
        }

        let parsed: OwForecastResponse = parse_json(ProviderId::OpenWeather, &body)?;

        let entries = parsed
            .list
            .into_iter()
            .map(ForecastEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = entries.len(), "parsed OpenWeather entries");

        Ok(ProviderResult::new(ProviderId::OpenWeather, entries))
    }
}
