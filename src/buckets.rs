use chrono::{Datelike, Duration, NaiveDate, Utc};

use crate::models::{Granularity, SignupEvent, TimeBucket};

/// Group signup events into calendar-day or week buckets over the
/// lookback window. The series is sparse (days with no signups produce
/// no bucket) and sorted ascending by period start.
pub fn aggregate_new_users(
    events: &[SignupEvent],
    granularity: Granularity,
    window_days: i64,
) -> Vec<TimeBucket> {
    let cutoff = Utc::now().date_naive() - Duration::days(window_days.max(1));
    let mut counts: std::collections::HashMap<NaiveDate, i64> = std::collections::HashMap::new();

    for event in events.iter() {
        let day = event.created_at.date_naive();
        if day < cutoff {
            continue;
        }
        *counts.entry(bucket_key(day, granularity)).or_insert(0) += 1;
    }

    let mut series: Vec<TimeBucket> = counts
        .into_iter()
        .map(|(period_start, count)| TimeBucket { period_start, count })
        .collect();
    series.sort_by_key(|bucket| bucket.period_start);
    series
}

fn bucket_key(day: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Day => day,
        Granularity::Week => monday_of_week(day),
    }
}

/// Monday of the ISO week containing `day`. A Sunday rolls back six
/// days to the previous Monday, never forward to the next week.
pub fn monday_of_week(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    // Wide enough that fixed historical dates stay inside the window.
    const WIDE_WINDOW: i64 = 10_000;

    fn event_on(year: i32, month: u32, day: u32) -> SignupEvent {
        SignupEvent {
            user_id: Uuid::new_v4(),
            created_at: Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn empty_events_yield_empty_series() {
        assert!(aggregate_new_users(&[], Granularity::Day, 90).is_empty());
    }

    #[test]
    fn daily_series_is_ascending_with_unique_keys() {
        let events = vec![
            event_on(2026, 3, 4),
            event_on(2026, 3, 2),
            event_on(2026, 3, 4),
            event_on(2026, 3, 3),
        ];
        let series = aggregate_new_users(&events, Granularity::Day, WIDE_WINDOW);

        let keys: Vec<NaiveDate> = series.iter().map(|b| b.period_start).collect();
        let mut expected = keys.clone();
        expected.sort();
        expected.dedup();
        assert_eq!(keys, expected);
        assert_eq!(series.len(), 3);
        assert_eq!(series[2], TimeBucket { period_start: date(2026, 3, 4), count: 2 });
    }

    #[test]
    fn sunday_lands_in_the_preceding_week() {
        // 2024-01-01 is a Monday, 2024-01-07 the following Sunday.
        let events = vec![event_on(2024, 1, 1), event_on(2024, 1, 7)];
        let series = aggregate_new_users(&events, Granularity::Week, WIDE_WINDOW);

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].period_start, date(2024, 1, 1));
        assert_eq!(series[0].count, 2);
    }

    #[test]
    fn weekly_buckets_split_on_mondays() {
        let events = vec![event_on(2024, 1, 1), event_on(2024, 1, 1), event_on(2024, 1, 8)];
        let series = aggregate_new_users(&events, Granularity::Week, WIDE_WINDOW);

        assert_eq!(
            series,
            vec![
                TimeBucket { period_start: date(2024, 1, 1), count: 2 },
                TimeBucket { period_start: date(2024, 1, 8), count: 1 },
            ]
        );
    }

    #[test]
    fn window_excludes_old_signups() {
        let recent = SignupEvent {
            user_id: Uuid::new_v4(),
            created_at: Utc::now() - Duration::days(3),
        };
        let stale = SignupEvent {
            user_id: Uuid::new_v4(),
            created_at: Utc::now() - Duration::days(200),
        };
        let series = aggregate_new_users(&[recent, stale], Granularity::Day, 90);

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].count, 1);
    }

    #[test]
    fn monday_of_week_is_idempotent() {
        let monday = date(2024, 1, 1);
        assert_eq!(monday_of_week(monday), monday);
        assert_eq!(monday_of_week(date(2024, 1, 3)), monday);
        assert_eq!(monday_of_week(date(2024, 1, 7)), monday);
    }
}
