use crate::{
    Location, Mode, ProviderResult,
    config::{Config, ConfigError},
    provider::{
        metmalaysia::MetMalaysiaProvider, openweather::OpenWeatherProvider,
        weatherapi::WeatherApiProvider,
    },
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::{fmt::Debug, time::Duration};

pub mod metmalaysia;
pub mod openweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    MetMalaysia,
    WeatherApi,
    OpenWeather,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::MetMalaysia => "metmalaysia",
            ProviderId::WeatherApi => "weatherapi",
            ProviderId::OpenWeather => "openweather",
        }
    }

    /// Name shown to the user in messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::MetMalaysia => "MET Malaysia",
            ProviderId::WeatherApi => "WeatherAPI.com",
            ProviderId::OpenWeather => "OpenWeather",
        }
    }

    /// Whether the provider refuses requests without an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderId::MetMalaysia)
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::MetMalaysia,
            ProviderId::WeatherApi,
            ProviderId::OpenWeather,
        ]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single provider call. Recovered by the fallback coordinator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication rejected: {0}")]
    AuthFailure(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("no matching location: {0}")]
    NoMatchingLocation(String),
}

impl ProviderError {
    /// Short failure class used in log fields.
    pub fn class(&self) -> &'static str {
        match self {
            ProviderError::Network(_) => "network",
            ProviderError::AuthFailure(_) => "auth_failure",
            ProviderError::MalformedResponse(_) => "malformed_response",
            ProviderError::NoMatchingLocation(_) => "no_matching_location",
        }
    }
}

// The request URL carries API keys; keep it out of error text.
impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

#[async_trait]
pub trait ForecastProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    /// Fetch forecast entries for `location`. Issues exactly one HTTP request.
    async fn fetch(&self, location: &Location, mode: Mode) -> Result<ProviderResult, ProviderError>;
}

/// Build the HTTP client shared by all adapters. The timeout is always finite:
/// runs are unattended and must finish before the next cron tick.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("rainalert/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
    http: Client,
) -> Result<Box<dyn ForecastProvider>, ConfigError> {
    let api_key = config.provider_api_key(id).map(str::to_owned);

    let boxed: Box<dyn ForecastProvider> = match id {
        ProviderId::MetMalaysia => Box::new(MetMalaysiaProvider::new(api_key, http)),
        ProviderId::WeatherApi => Box::new(WeatherApiProvider::new(
            api_key.ok_or(ConfigError::MissingField("providers.weatherapi.api_key"))?,
            http,
        )),
        ProviderId::OpenWeather => Box::new(OpenWeatherProvider::new(
            api_key.ok_or(ConfigError::MissingField("providers.openweather.api_key"))?,
            http,
        )),
    };

    Ok(boxed)
}

/// Turn a non-success HTTP status into the matching error kind.
pub(crate) fn status_error(provider: ProviderId, status: StatusCode, body: &str) -> ProviderError {
    let detail = format!("{provider} returned {status}: {}", truncate_body(body));

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ProviderError::AuthFailure(detail)
    } else {
        ProviderError::Network(detail)
    }
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    provider: ProviderId,
    body: &str,
) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| {
        ProviderError::MalformedResponse(format!("failed to parse {provider} JSON: {e}"))
    })
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
