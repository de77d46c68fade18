//! Mode-specific time window selection.

use chrono::{DateTime, Days, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::model::{ForecastEntry, Mode};

/// Length of the alert look-ahead.
pub const ALERT_HORIZON_MINUTES: i64 = 30;

/// Entries selected for one mode, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedForecast {
    pub entries: Vec<ForecastEntry>,
    /// Set when the alert outcome rests on a bucket that started before
    /// `now` rather than on an entry timed inside the window.
    pub approximate: bool,
}

impl WindowedForecast {
    /// No data covers the window. Not the same thing as "no rain".
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Local midnight at the start of `date` in `tz`, as UTC.
pub(crate) fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(chrono::NaiveTime::MIN);
    // A zone whose DST change skips midnight has no 00:00 that day; take the
    // earliest valid instant after it instead.
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// Select the entries relevant to `mode` at `now`.
///
/// Daily keeps `[local today 00:00, local day-after-tomorrow 00:00)`. Alert
/// keeps `[now, now + 30 min]` with both ends inclusive, preceded by the
/// bucket already in progress at `now`, if any. The result is flagged
/// approximate when that bucket is rain or is the only coverage.
pub fn filter_window(
    entries: &[ForecastEntry],
    mode: Mode,
    now: DateTime<Utc>,
    tz: Tz,
) -> WindowedForecast {
    let mut sorted: Vec<&ForecastEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.timestamp);

    match mode {
        Mode::Daily => {
            let today = now.with_timezone(&tz).date_naive();
            let start = local_midnight(tz, today);
            let end = today
                .checked_add_days(Days::new(2))
                .map(|d| local_midnight(tz, d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);

            WindowedForecast {
                entries: sorted
                    .into_iter()
                    .filter(|e| e.timestamp >= start && e.timestamp < end)
                    .cloned()
                    .collect(),
                approximate: false,
            }
        }
        Mode::Alert => {
            let end = now + Duration::minutes(ALERT_HORIZON_MINUTES);

            // Bucket that started before `now` and is still running. It
            // describes the start of the window even when later entries fall
            // inside it.
            let ongoing = sorted
                .iter()
                .rev()
                .find(|e| e.timestamp < now && e.covers(now))
                .map(|e| (*e).clone());

            let inside: Vec<ForecastEntry> = sorted
                .iter()
                .filter(|e| e.timestamp >= now && e.timestamp <= end)
                .map(|e| (*e).clone())
                .collect();

            // The ongoing bucket decides the outcome when it is rain (it is
            // the earliest entry) or when nothing else covers the window.
            let approximate = ongoing
                .as_ref()
                .is_some_and(|bucket| bucket.is_rain || inside.is_empty());

            if let Some(bucket) = &ongoing {
                tracing::debug!(
                    bucket = %bucket.timestamp,
                    span_minutes = bucket.span.num_minutes(),
                    approximate,
                    "bucket enclosing now included in alert window"
                );
            }

            let mut entries: Vec<ForecastEntry> = ongoing.into_iter().collect();
            entries.extend(inside);

            WindowedForecast {
                entries,
                approximate,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WeatherCategory;
    use crate::provider::ProviderId;
    use chrono_tz::Asia::Kuala_Lumpur;

    fn entry(timestamp: DateTime<Utc>, span: Duration) -> ForecastEntry {
        ForecastEntry {
            timestamp,
            is_rain: true,
            description: "Light rain".to_string(),
            probability: None,
            category: WeatherCategory::LightRain,
            span,
            source: ProviderId::WeatherApi,
        }
    }

    fn timestamps(w: &WindowedForecast) -> Vec<DateTime<Utc>> {
        w.entries.iter().map(|e| e.timestamp).collect()
    }

    #[test]
    fn daily_uses_local_day_boundaries() {
        // 2026-10-18 10:00 MYT == 02:00 UTC.
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 2, 0, 0).unwrap();
        let local_today_start = Utc.with_ymd_and_hms(2026, 10, 17, 16, 0, 0).unwrap();
        let local_window_end = Utc.with_ymd_and_hms(2026, 10, 19, 16, 0, 0).unwrap();

        let entries = vec![
            entry(local_window_end, Duration::hours(3)),
            entry(local_today_start - Duration::seconds(1), Duration::hours(3)),
            entry(local_window_end - Duration::seconds(1), Duration::hours(3)),
            entry(local_today_start, Duration::hours(3)),
            // Still "today" in UTC but already the day after tomorrow locally.
            entry(Utc.with_ymd_and_hms(2026, 10, 19, 20, 0, 0).unwrap(), Duration::hours(3)),
        ];

        let window = filter_window(&entries, Mode::Daily, now, Kuala_Lumpur);

        assert_eq!(
            timestamps(&window),
            vec![local_today_start, local_window_end - Duration::seconds(1)]
        );
        assert!(!window.approximate);
    }

    #[test]
    fn daily_output_is_sorted_regardless_of_input_order() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 2, 0, 0).unwrap();
        let a = Utc.with_ymd_and_hms(2026, 10, 18, 3, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        let c = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();

        let entries = vec![
            entry(c, Duration::hours(3)),
            entry(a, Duration::hours(3)),
            entry(b, Duration::hours(3)),
        ];

        let window = filter_window(&entries, Mode::Daily, now, Kuala_Lumpur);
        assert_eq!(timestamps(&window), vec![a, b, c]);
    }

    #[test]
    fn alert_window_is_inclusive_at_both_ends() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap();
        let span = Duration::minutes(15);

        let entries = vec![
            entry(now - Duration::seconds(1), Duration::seconds(1)),
            entry(now, span),
            entry(now + Duration::minutes(30), span),
            entry(now + Duration::minutes(30) + Duration::seconds(1), span),
        ];

        let window = filter_window(&entries, Mode::Alert, now, Kuala_Lumpur);

        assert_eq!(
            timestamps(&window),
            vec![now, now + Duration::minutes(30)]
        );
        assert!(!window.approximate);
    }

    #[test]
    fn alert_uses_enclosing_coarse_bucket_as_approximate() {
        let bucket = Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap();
        let now = bucket + Duration::minutes(40);

        let entries = vec![
            entry(bucket - Duration::hours(3), Duration::hours(3)),
            entry(bucket, Duration::hours(3)),
            entry(bucket + Duration::hours(3), Duration::hours(3)),
        ];

        let window = filter_window(&entries, Mode::Alert, now, Kuala_Lumpur);

        assert_eq!(timestamps(&window), vec![bucket]);
        assert!(window.approximate);
    }

    #[test]
    fn alert_keeps_ongoing_hourly_rain_when_next_hour_is_inside() {
        // Hourly series, run at :35. The 15:00 entry falls inside the window
        // but the 14:00 bucket is still raining.
        let hour = Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap();
        let now = hour + Duration::minutes(35);
        let mut dry = entry(hour + Duration::hours(1), Duration::hours(1));
        dry.is_rain = false;
        dry.category = WeatherCategory::Cloudy;

        let entries = vec![entry(hour, Duration::hours(1)), dry];

        let window = filter_window(&entries, Mode::Alert, now, Kuala_Lumpur);

        assert_eq!(timestamps(&window), vec![hour, hour + Duration::hours(1)]);
        assert!(window.entries[0].is_rain);
        assert!(window.approximate);
    }

    #[test]
    fn alert_dry_ongoing_bucket_does_not_hedge_upcoming_rain() {
        let hour = Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap();
        let now = hour + Duration::minutes(45);
        let mut dry = entry(hour, Duration::hours(1));
        dry.is_rain = false;

        let entries = vec![dry, entry(hour + Duration::hours(1), Duration::hours(1))];

        let window = filter_window(&entries, Mode::Alert, now, Kuala_Lumpur);

        assert_eq!(window.entries.len(), 2);
        assert!(!window.approximate);
    }

    #[test]
    fn alert_without_coverage_is_empty_not_dry() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap();

        // Data ends before now; nothing encloses or follows it.
        let entries = vec![entry(now - Duration::hours(4), Duration::hours(3))];

        let window = filter_window(&entries, Mode::Alert, now, Kuala_Lumpur);

        assert!(window.is_empty());
        assert!(!window.approximate);
    }

    #[test]
    fn local_midnight_in_fixed_offset_zone() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(
            local_midnight(Kuala_Lumpur, date),
            Utc.with_ymd_and_hms(2026, 10, 17, 16, 0, 0).unwrap()
        );
    }
}
