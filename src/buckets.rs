//! Time-bucketing for dashboard charts.
//!
//! Every period yields a fixed, ordered set of buckets: 24 hours of today,
//! the trailing 7 days, or the 12 months of the current year. Events that
//! fall outside the window, or whose timestamp cannot be parsed, are ignored.
//!
//! "Today" and "this year" come from the `now` argument. Its timezone is the
//! local zone for the `day` and `year` periods. The `week` period keys days
//! by their UTC calendar date and labels each bucket with that same UTC
//! date's weekday. The label is the weekday of the UTC date, not of the local
//! date, so close to midnight in a non-UTC zone the newest `week` bucket can
//! be labelled with the previous or the next local day.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Year,
}

impl Period {
    /// Anything other than `day` or `week` means `year`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("day") => Period::Day,
            Some("week") => Period::Week,
            _ => Period::Year,
        }
    }

    pub fn bucket_count(self) -> usize {
        match self {
            Period::Day => 24,
            Period::Week => 7,
            Period::Year => 12,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    pub label: String,
    pub value: i64,
}

impl Bucket {
    fn empty(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimestampedEvent {
    pub created_at: String,
}

impl TimestampedEvent {
    pub fn new(created_at: impl Into<String>) -> Self {
        Self {
            created_at: created_at.into(),
        }
    }
}

pub fn bucketize<Tz: TimeZone>(
    events: &[TimestampedEvent],
    period: Period,
    now: &DateTime<Tz>,
) -> Vec<Bucket> {
    let buckets = match period {
        Period::Day => by_hour(events, now),
        Period::Week => by_day(events, now),
        Period::Year => by_month(events, now),
    };
    debug_assert_eq!(buckets.len(), period.bucket_count());
    buckets
}

fn by_hour<Tz: TimeZone>(events: &[TimestampedEvent], now: &DateTime<Tz>) -> Vec<Bucket> {
    let today = now.date_naive();
    let mut buckets: Vec<Bucket> = (0..24).map(|h| Bucket::empty(format!("{:02}:00", h))).collect();

    for ts in parsed(events, &now.timezone()) {
        if ts.date_naive() == today {
            buckets[ts.hour() as usize].value += 1;
        }
    }
    buckets
}

fn by_day<Tz: TimeZone>(events: &[TimestampedEvent], now: &DateTime<Tz>) -> Vec<Bucket> {
    let today = now.with_timezone(&Utc).date_naive();
    let days: Vec<NaiveDate> = (0..7)
        .rev()
        .map(|back| today - Duration::days(back))
        .collect();
    let mut buckets: Vec<Bucket> = days
        .iter()
        .map(|d| Bucket::empty(d.format("%a").to_string()))
        .collect();

    for ts in parsed(events, &now.timezone()) {
        let key = ts.with_timezone(&Utc).date_naive();
        if let Some(idx) = days.iter().position(|d| *d == key) {
            buckets[idx].value += 1;
        }
    }
    buckets
}

fn by_month<Tz: TimeZone>(events: &[TimestampedEvent], now: &DateTime<Tz>) -> Vec<Bucket> {
    let year = now.year();
    let mut buckets: Vec<Bucket> = MONTHS.iter().map(|m| Bucket::empty(*m)).collect();

    for ts in parsed(events, &now.timezone()) {
        if ts.year() == year {
            buckets[ts.month0() as usize].value += 1;
        }
    }
    buckets
}

fn parsed<'a, Tz: TimeZone>(
    events: &'a [TimestampedEvent],
    tz: &'a Tz,
) -> impl Iterator<Item = DateTime<Tz>> + 'a {
    events
        .iter()
        .filter_map(move |evt| parse_timestamp(&evt.created_at, tz))
}

/// Parses RFC 3339 and Postgres-style timestamps. Timestamps without an
/// offset are read as local time in `tz`.
pub fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(tz));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(tz));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return tz.from_local_datetime(&naive).earliest();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc_now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 18, 16, 0, 0)
            .unwrap()
    }

    fn events(raw: &[&str]) -> Vec<TimestampedEvent> {
        raw.iter().map(|s| TimestampedEvent::new(*s)).collect()
    }

    fn values(buckets: &[Bucket]) -> Vec<i64> {
        buckets.iter().map(|b| b.value).collect()
    }

    #[test]
    fn empty_input_gives_full_zeroed_sequence() {
        for period in [Period::Day, Period::Week, Period::Year] {
            let buckets = bucketize(&[], period, &utc_now());
            assert_eq!(buckets.len(), period.bucket_count());
            assert!(buckets.iter().all(|b| b.value == 0));
        }
    }

    #[test]
    fn canonical_labels() {
        let now = utc_now();
        let day = bucketize(&[], Period::Day, &now);
        assert_eq!(day[0].label, "00:00");
        assert_eq!(day[23].label, "23:00");

        let week: Vec<String> = bucketize(&[], Period::Week, &now)
            .into_iter()
            .map(|b| b.label)
            .collect();
        assert_eq!(week, ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]);

        let year = bucketize(&[], Period::Year, &now);
        assert_eq!(year[0].label, "Jan");
        assert_eq!(year[11].label, "Dec");
    }

    #[test]
    fn today_lands_in_its_hour() {
        let buckets = bucketize(&events(&["2026-10-18 14:30:00"]), Period::Day, &utc_now());
        assert_eq!(buckets.len(), 24);
        for b in &buckets {
            let expected = if b.label == "14:00" { 1 } else { 0 };
            assert_eq!(b.value, expected, "{}", b.label);
        }
    }

    #[test]
    fn day_ignores_other_days() {
        let buckets = bucketize(
            &events(&["2026-10-17 14:30:00", "2026-10-19T01:00:00Z", "2026-10-18T09:59:59Z"]),
            Period::Day,
            &utc_now(),
        );
        assert_eq!(buckets.iter().map(|b| b.value).sum::<i64>(), 1);
        assert_eq!(buckets[9].value, 1);
    }

    #[test]
    fn week_counts_trailing_seven_days() {
        let buckets = bucketize(
            &events(&[
                "2026-10-12T08:00:00Z",
                "2026-10-12T23:00:00Z",
                "2026-10-15 10:00:00",
                "2026-10-18T00:00:00Z",
                "2026-10-11T23:59:59Z",
                "2026-10-19T00:00:00Z",
            ]),
            Period::Week,
            &utc_now(),
        );
        assert_eq!(values(&buckets), [2, 0, 0, 1, 0, 0, 1]);
    }

    #[test]
    fn year_counts_current_year_by_month() {
        let buckets = bucketize(
            &events(&[
                "2026-01-01T00:00:00Z",
                "2026-10-03 12:00:00",
                "2026-10-18T15:00:00.123456+00:00",
                "2026-12-31 23:59:59",
            ]),
            Period::Year,
            &utc_now(),
        );
        assert_eq!(values(&buckets), [1, 0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 1]);
    }

    #[test]
    fn out_of_window_noise_is_ignored() {
        let now = utc_now();
        let base = events(&["2026-03-01T10:00:00Z", "2026-10-18T10:00:00Z"]);
        let mut noisy = base.clone();
        noisy.extend(events(&[
            "2025-03-01T10:00:00Z",
            "2027-10-18T10:00:00Z",
            "1999-12-31 23:59:59",
            "not a timestamp",
            "",
        ]));
        for period in [Period::Day, Period::Week, Period::Year] {
            assert_eq!(bucketize(&base, period, &now), bucketize(&noisy, period, &now));
        }
    }

    #[test]
    fn unknown_period_means_year() {
        assert_eq!(Period::parse(Some("day")), Period::Day);
        assert_eq!(Period::parse(Some("week")), Period::Week);
        assert_eq!(Period::parse(Some("year")), Period::Year);
        assert_eq!(Period::parse(Some("month")), Period::Year);
        assert_eq!(Period::parse(None), Period::Year);
    }

    #[test]
    fn postgres_style_offsets_parse() {
        let tz = Utc;
        let a = parse_timestamp("2026-10-18 14:30:00+00", &tz).unwrap();
        let b = parse_timestamp("2026-10-18 16:30:00+02:00", &tz).unwrap();
        assert_eq!(a, b);
        assert!(parse_timestamp("18/10/2026", &tz).is_none());
    }

    #[test]
    fn timezone_boundary_uses_local_for_day_and_utc_for_week() {
        // 01:30 on Sunday in UTC+5 is still 20:30 on Saturday in UTC.
        let plus5 = FixedOffset::east_opt(5 * 3600).unwrap();
        let now = plus5.with_ymd_and_hms(2026, 10, 18, 1, 30, 0).unwrap();
        let evts = events(&[
            // local 2026-10-18 00:15, UTC 2026-10-17 19:15
            "2026-10-18T00:15:00+05:00",
            // local 2026-10-18 06:00, UTC 2026-10-18 01:00
            "2026-10-18 06:00:00",
        ]);

        let day = bucketize(&evts, Period::Day, &now);
        assert_eq!(day[0].value, 1);
        assert_eq!(day[6].value, 1);

        let week = bucketize(&evts, Period::Week, &now);
        assert_eq!(week[6].label, "Sat");
        assert_eq!(values(&week), [0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn timezone_boundary_for_year() {
        let plus5 = FixedOffset::east_opt(5 * 3600).unwrap();
        let now = plus5.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap();
        let buckets = bucketize(
            &events(&["2025-12-31T22:00:00Z", "2025-12-31T18:00:00Z"]),
            Period::Year,
            &now,
        );
        assert_eq!(buckets[0].value, 1);
        assert_eq!(buckets.iter().map(|b| b.value).sum::<i64>(), 1);
    }
}
