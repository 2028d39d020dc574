//! # Date Validity Windows
//!
//! A calendar date does not begin or end at one global instant. The first
//! place on Earth to reach a date is UTC+14 (Line Islands); the last is
//! UTC-12 (Baker Island). Between those two local midnights the date is
//! ambiguous: it exists in some timezones and not others.
//!
//! Two derived facts drive the orchestrator:
//! - a date that has not begun even in UTC+14 is rejected before any fetch
//!   or cache access (upstream cannot possibly have content for it);
//! - a not-found result for a date that is still "future somewhere" is
//!   expected to resolve soon, so its negative-cache duration is stretched
//!   to the end of that ambiguity window.
//!
//! All functions take `now` explicitly; they are pure and trivially
//! testable.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};

/// UTC offset of the first timezone to reach a calendar date.
const FIRST_ZONE_OFFSET_HOURS: i64 = 14;

/// UTC offset of the last timezone to reach a calendar date.
const LAST_ZONE_OFFSET_HOURS: i64 = -12;

/// The UTC instant at which `date` begins somewhere on Earth (local
/// midnight in UTC+14).
pub fn first_moment_anywhere(date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&(midnight - ChronoDuration::hours(FIRST_ZONE_OFFSET_HOURS)))
}

/// The UTC instant at which `date` has begun everywhere on Earth (local
/// midnight in UTC-12). Before this, the date is still "future somewhere".
pub fn reached_everywhere_at(date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&(midnight - ChronoDuration::hours(LAST_ZONE_OFFSET_HOURS)))
}

/// Whether `date` has not yet begun in any timezone.
pub fn is_future_everywhere(date: NaiveDate, now: DateTime<Utc>) -> bool {
    now < first_moment_anywhere(date)
}

/// Seconds until `date` is no longer future anywhere on Earth, floored at
/// zero for dates already reached everywhere. Bounds the negative-cache
/// extension for just-past dates.
pub fn seconds_until_reached_everywhere(date: NaiveDate, now: DateTime<Utc>) -> u64 {
    let remaining = reached_everywhere_at(date) - now;
    remaining.num_seconds().max(0) as u64
}
