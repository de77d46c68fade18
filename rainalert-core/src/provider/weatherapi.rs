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

const WEATHERAPI_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// Two days of hourly forecasts is enough to cover a 30-minute window that
/// crosses local midnight.
const FORECAST_DAYS: &str = "2";

/// Hourly near-term forecast from WeatherAPI.com. Primary for alert mode.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    http: Client,
    base_url: String,
}

impl WeatherApiProvider {
    pub fn new(api_key: String, http: Client) -> Self {
        Self {
            api_key,
            http,
            base_url: WEATHERAPI_BASE_URL.to_string(),
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
struct WaCondition {
    text: String,
    code: u32,
}

#[derive(Debug, Deserialize)]
struct WaForecastHour {
    time_epoch: i64,
    condition: WaCondition,
    #[serde(default)]
    will_it_rain: u8,
    #[serde(default)]
    chance_of_rain: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    hour: Vec<WaForecastHour>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    forecast: WaForecast,
}

/// WeatherAPI reports auth problems as JSON errors, sometimes with 400.
#[derive(Debug, Deserialize)]
struct WaErrorBody {
    error: WaErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WaErrorDetail {
    code: u32,
    message: String,
}

/// See https://www.weatherapi.com/docs/weather_conditions.json
fn category_from_code(code: u32) -> WeatherCategory {
    match code {
        1000 => WeatherCategory::Clear,
        1003 | 1006 | 1009 => WeatherCategory::Cloudy,
        1030 | 1135 | 1147 => WeatherCategory::Mist,
        1063 | 1150 | 1153 | 1168 | 1171 | 1180 | 1183 | 1198 | 1240 => {
            WeatherCategory::LightRain
        }
        1186 | 1189 | 1192 | 1195 | 1201 | 1243 | 1246 => WeatherCategory::ModerateRain,
        1087 | 1273 | 1276 => WeatherCategory::Thunderstorm,
        1066 | 1069 | 1072 | 1114 | 1117 | 1204 | 1207 | 1210 | 1213 | 1216 | 1219 | 1222
        | 1225 | 1237 | 1249 | 1252 | 1255 | 1258 | 1261 | 1264 | 1279 | 1282 => {
            WeatherCategory::Snow
        }
        _ => WeatherCategory::Unknown,
    }
}

impl TryFrom<WaForecastHour> for ForecastEntry {
    type Error = ProviderError;

    fn try_from(hour: WaForecastHour) -> Result<Self, Self::Error> {
        let timestamp = DateTime::from_timestamp(hour.time_epoch, 0).ok_or_else(|| {
            ProviderError::MalformedResponse(format!("invalid time_epoch {}", hour.time_epoch))
        })?;
        let category = category_from_code(hour.condition.code);

        Ok(ForecastEntry {
            timestamp,
            is_rain: hour.will_it_rain == 1 || category.is_rain(),
            description: hour.condition.text.trim().to_string(),
            probability: hour.chance_of_rain.map(|p| p.min(100)),
            category,
            span: Duration::hours(1),
            source: ProviderId::WeatherApi,
        })
    }
}

#[async_trait]
impl ForecastProvider for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::WeatherApi
    }

    #[instrument(skip(self, location), fields(provider = "weatherapi"))]
    async fn fetch(&self, location: &Location, mode: Mode) -> Result<ProviderResult, ProviderError> {
        let url = format!("{}/forecast.json", self.base_url);
        let query = format!("{},{}", location.latitude, location.longitude);

        let res = self
            .http
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query.as_str()),
                ("days", FORECAST_DAYS),
                ("aqi", "no"),
                ("alerts", "no"),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            // 1002: key not provided, 2006: key invalid, 2007/2008: quota/disabled.
            if let Ok(err) = serde_json::from_str::<WaErrorBody>(&body) {
                if matches!(err.error.code, 1002 | 2006 | 2007 | 2008) {
                    return Err(ProviderError::AuthFailure(format!(
                        "weatherapi rejected key ({}): {}",
                        err.error.code, err.error.message
                    )));
                }
            }
            return Err(status_error(ProviderId::WeatherApi, status, &body));
        }

        let parsed: WaForecastResponse = parse_json(ProviderId::WeatherApi, &body)?;

        let entries = parsed
            .forecast
            .forecastday
            .into_iter()
            .flat_map(|day| day.hour)
            .map(ForecastEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        if entries.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "weatherapi response contained no hourly data".to_string(),
            ));
        }

        tracing::debug!(count = entries.len(), "parsed WeatherAPI hourly entries");

        Ok(ProviderResult::new(ProviderId::WeatherApi, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn location() -> Location {
        Location {
            latitude: 3.139,
            longitude: 101.6869,
            name: None,
            timezone: chrono_tz::Asia::Kuala_Lumpur,
        }
    }

    fn hour(epoch: i64, text: &str, code: u32, will_it_rain: u8, chance: u8) -> serde_json::Value {
        serde_json::json!({
            "time_epoch": epoch,
            "time": "ignored",
            "temp_c": 27.5,
            "condition": {"text": text, "icon": "//cdn/x.png", "code": code},
            "will_it_rain": will_it_rain,
            "chance_of_rain": chance
        })
    }

    #[test]
    fn condition_codes() {
        assert_eq!(category_from_code(1000), WeatherCategory::Clear);
        assert_eq!(category_from_code(1183), WeatherCategory::LightRain);
        assert_eq!(category_from_code(1195), WeatherCategory::ModerateRain);
        assert_eq!(category_from_code(1276), WeatherCategory::Thunderstorm);
        assert_eq!(category_from_code(1030), WeatherCategory::Mist);
        assert_eq!(category_from_code(9999), WeatherCategory::Unknown);
    }

    #[tokio::test]
    async fn fetch_flattens_hours_of_all_days() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast.json"))
            .and(query_param("key", "WA_KEY"))
            .and(query_param("q", "3.139,101.6869"))
            .and(query_param("days", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "location": {"name": "Kuala Lumpur", "country": "Malaysia"},
                "forecast": {"forecastday": [
                    {"date": "2026-10-18", "hour": [
                        hour(1760796000, "Sunny", 1000, 0, 0),
                        hour(1760799600, "Patchy rain nearby", 1063, 1, 75)
                    ]},
                    {"date": "2026-10-19", "hour": [
                        hour(1760882400, "Partly cloudy", 1003, 0, 10)
                    ]}
                ]}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = WeatherApiProvider::with_base_url("WA_KEY", &mock_server.uri());
        let result = provider.fetch(&location(), Mode::Alert).await.unwrap();

        assert_eq!(result.entries.len(), 3);
        assert!(!result.entries[0].is_rain);

        let rain = &result.entries[1];
        assert!(rain.is_rain);
        assert_eq!(rain.probability, Some(75));
        assert_eq!(rain.description, "Patchy rain nearby");
        assert_eq!(rain.span, Duration::hours(1));
        assert_eq!(rain.source, ProviderId::WeatherApi);
    }

    #[tokio::test]
    async fn invalid_key_in_error_body_is_auth_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast.json"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": 2006, "message": "API key is invalid."}
            })))
            .mount(&mock_server)
            .await;

        let provider = WeatherApiProvider::with_base_url("BAD", &mock_server.uri());
        let err = provider.fetch(&location(), Mode::Alert).await.unwrap_err();

        assert!(matches!(err, ProviderError::AuthFailure(_)));
    }

    #[tokio::test]
    async fn server_error_is_network() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast.json"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&mock_server)
            .await;

        let provider = WeatherApiProvider::with_base_url("WA_KEY", &mock_server.uri());
        let err = provider.fetch(&location(), Mode::Alert).await.unwrap_err();

        assert!(matches!(err, ProviderError::Network(_)));
    }

    #[tokio::test]
    async fn empty_forecast_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"forecast": {"forecastday": []}})),
            )
            .mount(&mock_server)
            .await;

        let provider = WeatherApiProvider::with_base_url("WA_KEY", &mock_server.uri());
        let err = provider.fetch(&location(), Mode::Alert).await.unwrap_err();

        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }
}
