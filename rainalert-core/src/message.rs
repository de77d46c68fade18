//! Rain decision and Telegram-Markdown rendering.

use chrono::{DateTime, Days, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use std::fmt;

use crate::{
    model::{ForecastEntry, Mode, Provenance, WeatherCategory},
    window::{ALERT_HORIZON_MINUTES, WindowedForecast},
};

/// Icon used for categories without a dedicated one.
pub const DEFAULT_ICON: &str = "🌧";

pub const NO_RAIN_TEXT: &str = "No rain predicted";
pub const NO_DATA_TEXT: &str = "No forecast data available";

pub fn icon(category: WeatherCategory) -> &'static str {
    match category {
        WeatherCategory::Clear => "☀️",
        WeatherCategory::Cloudy => "☁️",
        WeatherCategory::LightRain => "🌦",
        WeatherCategory::ModerateRain => "🌧",
        WeatherCategory::Thunderstorm => "⛈",
        WeatherCategory::Mist => "🌫",
        WeatherCategory::Snow => "🌨",
        WeatherCategory::Unknown => DEFAULT_ICON,
    }
}

/// Text ready for the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage(String);

impl RenderedMessage {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RenderedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why nothing is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// Data covers the window and none of it is rain.
    Dry,
    /// Nothing covers the window.
    NoData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Send(RenderedMessage),
    NoOp(NoOpReason),
}

/// Decide whether to notify and render the message.
///
/// Daily always produces a summary. Alert only speaks up when rain is
/// expected; a dry or uncovered window is a `NoOp`.
pub fn build_message(
    window: &WindowedForecast,
    mode: Mode,
    provenance: Provenance,
    now: DateTime<Utc>,
    tz: Tz,
) -> Outcome {
    match mode {
        Mode::Daily => Outcome::Send(render_daily(window, provenance, now, tz)),
        Mode::Alert => {
            if window.is_empty() {
                return Outcome::NoOp(NoOpReason::NoData);
            }
            match window.entries.iter().find(|e| e.is_rain) {
                Some(first) => Outcome::Send(render_alert(first, window.approximate, provenance, tz)),
                None => Outcome::NoOp(NoOpReason::Dry),
            }
        }
    }
}

fn fallback_note(provenance: Provenance) -> String {
    format!(
        "⚠️ _Primary source unavailable, using fallback source {} (accuracy may be lower)_",
        provenance.provider.display_name()
    )
}

fn render_daily(
    window: &WindowedForecast,
    provenance: Provenance,
    now: DateTime<Utc>,
    tz: Tz,
) -> RenderedMessage {
    let today = now.with_timezone(&tz).date_naive();
    let days: Vec<(&str, NaiveDate)> = [("Today", Some(today)), ("Tomorrow", today.checked_add_days(Days::new(1)))]
        .into_iter()
        .filter_map(|(label, date)| date.map(|d| (label, d)))
        .collect();

    let any_rain = window.entries.iter().any(|e| e.is_rain);

    let mut parts = Vec::new();
    if provenance.was_fallback {
        parts.push(fallback_note(provenance));
    }
    parts.push(if any_rain {
        "☔ *Rain Alert!*".to_string()
    } else {
        "🌤 *Daily Rain Forecast*".to_string()
    });

    for (label, date) in days {
        let day_entries: Vec<&ForecastEntry> = window
            .entries
            .iter()
            .filter(|e| e.timestamp.with_timezone(&tz).date_naive() == date)
            .collect();

        parts.push(format!("\n*{label}* *({})*", date.format("%Y-%m-%d")));

        if day_entries.is_empty() {
            parts.push(NO_DATA_TEXT.to_string());
            continue;
        }

        let rainy: Vec<&&ForecastEntry> = day_entries.iter().filter(|e| e.is_rain).collect();
        if rainy.is_empty() {
            parts.push(NO_RAIN_TEXT.to_string());
            continue;
        }

        parts.push("Expected rain at:".to_string());
        for (i, entry) in rainy.iter().enumerate() {
            parts.push(format!(
                "    {}. {} - {} {}",
                i + 1,
                local_time(entry.timestamp, tz),
                escape_markdown(&entry.description),
                icon(entry.category),
            ));
        }
    }

    parts.push(format!("\n_Source: {}_", provenance.provider.display_name()));

    RenderedMessage(parts.join("\n"))
}

fn render_alert(
    entry: &ForecastEntry,
    approximate: bool,
    provenance: Provenance,
    tz: Tz,
) -> RenderedMessage {
    let description = escape_markdown(&entry.description);
    let mut details = Vec::new();

    let when = if approximate {
        details.push(format!("estimate from {} forecast", span_label(entry.span)));
        format!("likely in the next {ALERT_HORIZON_MINUTES} minutes")
    } else {
        format!("expected at {}", local_time(entry.timestamp, tz))
    };

    if let Some(p) = entry.probability {
        details.push(format!("{p}%"));
    }
    if provenance.was_fallback {
        details.push(format!("fallback source {}", provenance.provider.display_name()));
    }

    let details = if details.is_empty() {
        String::new()
    } else {
        format!(" ({})", details.join(", "))
    };

    RenderedMessage(format!(
        "⚠️ *Rain alert*: {description} {when}{details} {}",
        icon(entry.category)
    ))
}

/// "3-hour" for whole-hour buckets and longer, "15-minute" below an hour.
fn span_label(span: Duration) -> String {
    match span.num_hours() {
        0 => format!("{}-minute", span.num_minutes().max(1)),
        hours => format!("{hours}-hour"),
    }
}

/// "5 AM" on the hour, "5:30 AM" otherwise.
fn local_time(ts: DateTime<Utc>, tz: Tz) -> String {
    let local = ts.with_timezone(&tz);
    if local.minute() == 0 {
        local.format("%-I %p").to_string()
    } else {
        local.format("%-I:%M %p").to_string()
    }
}

/// Escape characters that Telegram's legacy Markdown treats as entities.
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
