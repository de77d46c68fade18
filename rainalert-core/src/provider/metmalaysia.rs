//! MET Malaysia general forecast, served through the data.gov.my open API.
//!
//! The endpoint returns one record per (location, date). Each record carries
//! Malay text for the morning, afternoon and night periods, which we expand
//! into three entries.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Asia::Kuala_Lumpur;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::{
    Location, Mode,
    model::{ForecastEntry, ProviderResult, WeatherCategory},
    provider::{ProviderError, ProviderId, parse_json, status_error},
};

use super::ForecastProvider;

const MET_BASE_URL: &str = "https://api.data.gov.my";

/// Administrative level of a MET location, best match first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum LocationLevel {
    District,
    Town,
    Division,
    State,
    Recreation,
    Other,
}

impl LocationLevel {
    fn from_id(location_id: &str) -> Self {
        match location_id.get(..2) {
            Some("Ds") => LocationLevel::District,
            Some("Tn") => LocationLevel::Town,
            Some("Dv") => LocationLevel::Division,
            Some("St") => LocationLevel::State,
            Some("Rc") => LocationLevel::Recreation,
            _ => LocationLevel::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetMalaysiaProvider {
    api_token: Option<String>,
    http: Client,
    base_url: String,
}

impl MetMalaysiaProvider {
    pub fn new(api_token: Option<String>, http: Client) -> Self {
        Self {
            api_token,
            http,
            base_url: MET_BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(api_token: Option<&str>, base_url: &str) -> Self {
        Self {
            api_token: api_token.map(str::to_string),
            http: Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MetLocation {
    location_id: String,
    location_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MetForecastDay {
    location: MetLocation,
    date: NaiveDate,
    morning_forecast: String,
    afternoon_forecast: String,
    night_forecast: String,
}

/// A period of the day as published by MET: local start hour and length.
const PERIODS: [(u32, i64); 3] = [(6, 6), (12, 6), (18, 12)];

/// Keep the records of the single location that best matches `name`.
///
/// Exact (case-insensitive) name matches win over substring matches. Among
/// several matching locations, districts beat towns, then by id.
fn select_location(days: Vec<MetForecastDay>, name: &str) -> Result<Vec<MetForecastDay>, ProviderError> {
    let wanted = name.trim().to_lowercase();

    let exact: Vec<&MetForecastDay> = days
        .iter()
        .filter(|d| d.location.location_name.trim().to_lowercase() == wanted)
        .collect();
    let candidates: Vec<&MetForecastDay> = if exact.is_empty() {
        days.iter()
            .filter(|d| d.location.location_name.to_lowercase().contains(&wanted))
            .collect()
    } else {
        exact
    };

    let best_id = candidates
        .iter()
        .map(|d| &d.location)
        .min_by(|a, b| {
            LocationLevel::from_id(&a.location_id)
                .cmp(&LocationLevel::from_id(&b.location_id))
                .then_with(|| a.location_id.cmp(&b.location_id))
        })
        .map(|l| l.location_id.clone())
        .ok_or_else(|| {
            ProviderError::NoMatchingLocation(format!("no MET Malaysia location named '{name}'"))
        })?;

    tracing::debug!(location_id = %best_id, "selected MET Malaysia location");

    Ok(days
        .into_iter()
        .filter(|d| d.location.location_id == best_id)
        .collect())
}

/// Translate a MET Malaysia Malay forecast phrase.
///
/// Returns English description, category and whether it means rain.
fn translate(phrase: &str) -> (String, WeatherCategory, bool) {
    let lower = phrase.trim().to_lowercase();

    if lower.starts_with("tiada hujan") {
        return ("No rain".to_string(), WeatherCategory::Clear, false);
    }
    if lower.starts_with("berjerebu") {
        return ("Hazy".to_string(), WeatherCategory::Mist, false);
    }
    if lower.starts_with("berawan") || lower.starts_with("mendung") {
        return ("Cloudy".to_string(), WeatherCategory::Cloudy, false);
    }

    let thunder = lower.starts_with("ribut petir");
    if !thunder && !lower.starts_with("hujan") {
        let is_rain = lower.contains("hujan") && !lower.contains("tiada");
        return (phrase.trim().to_string(), WeatherCategory::Unknown, is_rain);
    }

    let extent = if lower.contains("di satu dua tempat") {
        Some("Isolated")
    } else if lower.contains("di beberapa tempat") {
        Some("Scattered")
    } else if lower.contains("menyeluruh") {
        Some("Widespread")
    } else {
        None
    };

    let area = if lower.contains("kawasan pantai") {
        " over coastal areas"
    } else if lower.contains("kawasan pedalaman") {
        " over inland areas"
    } else {
        ""
    };

    let (noun, category) = match (thunder, extent) {
        (true, _) => ("thunderstorms", WeatherCategory::Thunderstorm),
        (false, Some("Isolated")) => ("rain", WeatherCategory::LightRain),
        (false, _) => ("rain", WeatherCategory::ModerateRain),
    };

    let description = match extent {
        Some(extent) => format!("{extent} {noun}{area}"),
        None if thunder => format!("Thunderstorms{area}"),
        None => format!("Rain{area}"),
    };

    (description, category, true)
}

fn expand_day(day: &MetForecastDay) -> Result<Vec<ForecastEntry>, ProviderError> {
    let texts = [
        &day.morning_forecast,
        &day.afternoon_forecast,
        &day.night_forecast,
    ];

    PERIODS
        .iter()
        .zip(texts)
        .map(|(&(hour, span_hours), text)| {
            let start = NaiveTime::from_hms_opt(hour, 0, 0).ok_or_else(|| {
                ProviderError::MalformedResponse(format!("invalid period hour {hour}"))
            })?;
            let local = day.date.and_time(start);
            let timestamp = Kuala_Lumpur
                .from_local_datetime(&local)
                .single()
                .ok_or_else(|| {
                    ProviderError::MalformedResponse(format!("ambiguous local time {local}"))
                })?
                .with_timezone(&Utc);
            let (description, category, is_rain) = translate(text);

            Ok(ForecastEntry {
                timestamp,
                is_rain,
                description,
                probability: None,
                category,
                span: Duration::hours(span_hours),
                source: ProviderId::MetMalaysia,
            })
        })
        .collect()
}

#[async_trait]
impl ForecastProvider for MetMalaysiaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::MetMalaysia
    }

    #[instrument(skip(self, location), fields(provider = "metmalaysia"))]
    async fn fetch(&self, location: &Location, mode: Mode) -> Result<ProviderResult, ProviderError> {
        let name = location.name.as_deref().ok_or_else(|| {
            ProviderError::NoMatchingLocation(
                "MET Malaysia needs a location name to pick a forecast".to_string(),
            )
        })?;

        let url = format!("{}/weather/forecast", self.base_url);
        let mut req = self
            .http
            .get(&url)
            .query(&[("contains", format!("{name}@location__location_name"))]);
        if let Some(token) = &self.api_token {
            req = req.header("Authorization", format!("Token {token}"));
        }

        let res = req.send().await?;
        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(status_error(ProviderId::MetMalaysia, status, &body));
        }

        let days: Vec<MetForecastDay> = parse_json(ProviderId::MetMalaysia, &body)?;
        let days = select_location(days, name)?;

        let mut entries = Vec::with_capacity(days.len() * PERIODS.len());
        for day in &days {
            entries.extend(expand_day(day)?);
        }

        tracing::debug!(count = entries.len(), "expanded MET Malaysia periods");

        Ok(ProviderResult::new(ProviderId::MetMalaysia, entries))
    }
}
