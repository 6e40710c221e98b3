//! Expiry calculator: combines per-profile policy with wall clock into
//! absolute expiry/purge timestamps, including civil-time interval
//! alignment.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::config::{CacheProfile, L1Config};
use crate::error::{CacheError, CacheResult};

/// Resolved expiry/purge pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryWindow {
    /// Absolute wall-clock instant (ms since epoch) of freshness cutoff.
    pub expires_at_millis: i64,
    /// Absolute wall-clock instant (ms since epoch) of purge eligibility.
    /// Always strictly later than `expires_at_millis`.
    pub purge_at_millis: i64,
}

fn purge_extension_seconds(l1: &L1Config) -> i64 {
    l1.purge_expired_after_hours as i64 * 3600
}

/// Align `base_millis` down to the nearest multiple of
/// `interval_seconds` within the civil day of `tz` (a 6-hour interval lands
/// on 00:00/06:00/12:00/18:00 local time; 24 hours lands on local
/// midnight). DST transitions are resolved by the civil calendar of `tz`
/// itself, since all arithmetic happens on local wall-clock fields.
fn align_to_interval(base_millis: i64, interval_seconds: i64, tz: Tz) -> CacheResult<i64> {
    if interval_seconds <= 0 {
        return Err(CacheError::Config(
            "interval alignment requires a positive interval".to_string(),
        ));
    }

    let base_utc = millis_to_datetime(base_millis)?;
    let local = base_utc.with_timezone(&tz);

    let seconds_since_midnight =
        local.hour() as i64 * 3600 + local.minute() as i64 * 60 + local.second() as i64;
    let bucket_start_seconds = (seconds_since_midnight / interval_seconds) * interval_seconds;

    let midnight = local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("00:00:00 is always a valid naive time");
    let aligned_naive = midnight + ChronoDuration::seconds(bucket_start_seconds);

    // `LocalResult::single()` is the expected case; fall back to the
    // earliest valid instant across a DST fold/gap rather than failing the
    // whole computation.
    let aligned_local = match tz.from_local_datetime(&aligned_naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => tz
            .from_local_datetime(&(aligned_naive + ChronoDuration::hours(1)))
            .single()
            .ok_or_else(|| CacheError::Config("could not resolve interval boundary across DST gap".to_string()))?,
    };

    Ok(aligned_local.with_timezone(&Utc).timestamp_millis())
}

fn millis_to_datetime(millis: i64) -> CacheResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| CacheError::Config(format!("invalid timestamp: {millis}")))
}

/// Compute the expiry window for a freshly fetched origin response.
///
/// `origin_expires_at_millis` is the expiry the origin itself supplied, if
/// any. When `profile.override_origin_expiry` is set, or the origin
/// supplied none, the base expiry is `now + default_expiry_seconds`;
/// otherwise the origin's value is passed through unchanged rather than
/// re-aligned to the interval bucket (see DESIGN.md).
pub fn compute_fresh_window(
    profile: &CacheProfile,
    l1: &L1Config,
    now_millis: i64,
    origin_expires_at_millis: Option<i64>,
) -> CacheResult<ExpiryWindow> {
    let mut expires_at = match (profile.override_origin_expiry, origin_expires_at_millis) {
        (true, _) | (false, None) => now_millis + profile.default_expiry_seconds * 1000,
        (false, Some(origin_expiry)) => origin_expiry,
    };

    if profile.expiry_on_interval {
        let tz: Tz = profile
            .interval_time_zone
            .parse()
            .map_err(|_| CacheError::Config(format!("unknown time zone: {}", profile.interval_time_zone)))?;
        expires_at = align_to_interval(expires_at, profile.default_expiry_seconds, tz)?;
    }

    let purge_at = expires_at + purge_extension_seconds(l1) * 1000;
    Ok(ExpiryWindow { expires_at_millis: expires_at, purge_at_millis: purge_at })
}

/// Compute the rewritten expiry window for the stale-fallback path:
/// `expiresAt <- now + errorExtensionSeconds`, with `purgeAt` advanced
/// correspondingly.
pub fn compute_stale_fallback_window(
    profile: &CacheProfile,
    l1: &L1Config,
    now_millis: i64,
) -> ExpiryWindow {
    let expires_at = now_millis + profile.error_extension_seconds * 1000;
    let purge_at = expires_at + purge_extension_seconds(l1) * 1000;
    ExpiryWindow { expires_at_millis: expires_at, purge_at_millis: purge_at }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn profile_with(default_expiry_seconds: i64, tz: &str) -> CacheProfile {
        CacheProfile {
            default_expiry_seconds,
            expiry_on_interval: true,
            interval_time_zone: tz.to_string(),
            ..CacheProfile::default()
        }
    }

    #[test]
    fn interval_aligned_expiry_rounds_down_to_bucket_boundary() {
        // 2024-06-01 09:15:00 CDT, 6h interval -> 2024-06-01 12:00:00 CDT.
        let tz: Tz = "America/Chicago".parse().unwrap();
        let now_local = tz
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2024, 6, 1)
                    .unwrap()
                    .and_hms_opt(9, 15, 0)
                    .unwrap(),
            )
            .single()
            .unwrap();
        let now_millis = now_local.with_timezone(&Utc).timestamp_millis();

        let profile = profile_with(21_600, "America/Chicago");
        let l1 = L1Config::default();
        let window = compute_fresh_window(&profile, &l1, now_millis, None).unwrap();

        let expected_local = tz
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2024, 6, 1)
                    .unwrap()
                    .and_hms_opt(12, 0, 0)
                    .unwrap(),
            )
            .single()
            .unwrap();
        assert_eq!(window.expires_at_millis, expected_local.with_timezone(&Utc).timestamp_millis());
    }

    #[test]
    fn twenty_four_hour_interval_lands_on_local_midnight() {
        let tz: Tz = "UTC".parse().unwrap();
        let now_local = tz
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(13, 0, 0)
                    .unwrap(),
            )
            .single()
            .unwrap();
        let profile = profile_with(86_400, "UTC");
        let l1 = L1Config::default();
        let window =
            compute_fresh_window(&profile, &l1, now_local.timestamp_millis(), None).unwrap();

        let expected = tz
            .from_local_datetime(&NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap())
            .single()
            .unwrap();
        assert_eq!(window.expires_at_millis, expected.timestamp_millis());
    }

    #[test]
    fn invariant_expires_at_never_exceeds_purge_at() {
        let profile = CacheProfile::default();
        let l1 = L1Config::default();
        let window = compute_fresh_window(&profile, &l1, 1_700_000_000_000, None).unwrap();
        assert!(window.expires_at_millis <= window.purge_at_millis);

        let stale_window = compute_stale_fallback_window(&profile, &l1, 1_700_000_000_000);
        assert!(stale_window.expires_at_millis <= stale_window.purge_at_millis);
    }

    #[test]
    fn origin_expiry_used_unless_overridden() {
        let mut profile = CacheProfile::default();
        profile.override_origin_expiry = false;
        let l1 = L1Config::default();
        let origin_expiry = 1_700_000_500_000;
        let window = compute_fresh_window(&profile, &l1, 1_700_000_000_000, Some(origin_expiry)).unwrap();
        assert_eq!(window.expires_at_millis, origin_expiry);
    }

    #[test]
    fn override_origin_expiry_ignores_origin_value() {
        let mut profile = CacheProfile::default();
        profile.override_origin_expiry = true;
        profile.default_expiry_seconds = 60;
        let l1 = L1Config::default();
        let now = 1_700_000_000_000;
        let window = compute_fresh_window(&profile, &l1, now, Some(999_999_999_999)).unwrap();
        assert_eq!(window.expires_at_millis, now + 60_000);
    }

    #[test]
    fn stale_fallback_horizon_uses_error_extension_seconds() {
        let mut profile = CacheProfile::default();
        profile.error_extension_seconds = 300;
        let l1 = L1Config::default();
        let now = 1_700_000_000_000;
        let window = compute_stale_fallback_window(&profile, &l1, now);
        assert_eq!(window.expires_at_millis, now + 300_000);
    }
}
