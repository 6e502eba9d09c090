//! Recurrence expansion: (anchor, frequency, count) → concrete start times.
//!
//! Pure and deterministic. Arithmetic happens in the mentor's local wall
//! clock so a 10:00 session stays at 10:00 across a DST change:
//! - weekly / biweekly step by 7 / 14 local days,
//! - monthly keeps the anchor's day-of-month, clamped to the last day of
//!   shorter months (Jan 31 → Feb 28/29 → Mar 31 is NOT restored; each step
//!   clamps independently from the anchor),
//! - a local time that falls in a spring-forward gap shifts forward one
//!   hour; an ambiguous fall-back time resolves to the earlier instant.

use chrono::{Duration, Months, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::model::{Frequency, Ms};

/// Expand an anchor start into `count` ordered candidate start times.
/// Availability is not consulted here; the coordinator checks each
/// candidate under the calendar lock.
pub fn expand(anchor_ms: Ms, tz: Tz, frequency: Frequency, count: u32) -> Vec<Ms> {
    let Some(anchor_utc) = Utc.timestamp_millis_opt(anchor_ms).single() else {
        return Vec::new();
    };
    let anchor_local = anchor_utc.with_timezone(&tz).naive_local();

    (0..count)
        .filter_map(|i| step_local(anchor_local, frequency, i))
        .filter_map(|local| resolve_local(local, tz))
        .collect()
}

fn step_local(anchor: NaiveDateTime, frequency: Frequency, i: u32) -> Option<NaiveDateTime> {
    match frequency {
        Frequency::Weekly => anchor.checked_add_signed(Duration::days(7 * i64::from(i))),
        Frequency::Biweekly => anchor.checked_add_signed(Duration::days(14 * i64::from(i))),
        // checked_add_months clamps to the target month's last day.
        Frequency::Monthly => anchor.checked_add_months(Months::new(i)),
    }
}

/// Resolve a local wall-clock time to an instant in `tz`, applying the
/// documented DST policy. Availability materialization uses the same rule.
pub(crate) fn resolve_local(local: NaiveDateTime, tz: Tz) -> Option<Ms> {
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return Some(dt.timestamp_millis());
    }
    // Spring-forward gap: the wall time doesn't exist; push one hour later.
    let shifted = local.checked_add_signed(Duration::hours(1))?;
    tz.from_local_datetime(&shifted)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use chrono_tz::{America::New_York, UTC};

    fn utc_ms(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Ms {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    const WEEK_MS: Ms = 7 * 24 * 3_600_000;

    #[test]
    fn weekly_steps_seven_days() {
        let anchor = utc_ms(2026, 9, 7, 10, 0); // a Monday
        let starts = expand(anchor, UTC, Frequency::Weekly, 4);
        assert_eq!(starts.len(), 4);
        for (i, s) in starts.iter().enumerate() {
            assert_eq!(*s, anchor + (i as Ms) * WEEK_MS);
        }
    }

    #[test]
    fn biweekly_steps_fourteen_days() {
        let anchor = utc_ms(2026, 9, 7, 10, 0);
        let starts = expand(anchor, UTC, Frequency::Biweekly, 3);
        assert_eq!(
            starts,
            vec![anchor, anchor + 2 * WEEK_MS, anchor + 4 * WEEK_MS]
        );
    }

    #[test]
    fn monthly_keeps_day_of_month() {
        let anchor = utc_ms(2026, 9, 15, 14, 0);
        let starts = expand(anchor, UTC, Frequency::Monthly, 3);
        assert_eq!(starts[1], utc_ms(2026, 10, 15, 14, 0));
        assert_eq!(starts[2], utc_ms(2026, 11, 15, 14, 0));
    }

    #[test]
    fn monthly_clamps_to_short_month_end() {
        // Jan 31 → Feb 28 (2027 is not a leap year) → Mar 31
        let anchor = utc_ms(2027, 1, 31, 9, 0);
        let starts = expand(anchor, UTC, Frequency::Monthly, 3);
        assert_eq!(starts[1], utc_ms(2027, 2, 28, 9, 0));
        assert_eq!(starts[2], utc_ms(2027, 3, 31, 9, 0));
    }

    #[test]
    fn weekly_preserves_local_time_across_dst() {
        // 2026-10-26 is the Monday before the US fall-back (Nov 1); the next
        // Monday is after it. Local 10:00 must be preserved, so the UTC gap
        // between the two occurrences is 7 days + 1 hour.
        let anchor_local = NaiveDate::from_ymd_opt(2026, 10, 26)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let anchor = New_York
            .from_local_datetime(&anchor_local)
            .single()
            .unwrap()
            .timestamp_millis();
        let starts = expand(anchor, New_York, Frequency::Weekly, 2);
        assert_eq!(starts[1] - starts[0], WEEK_MS + 3_600_000);
    }

    #[test]
    fn expansion_is_deterministic_and_ordered() {
        let anchor = utc_ms(2026, 9, 7, 10, 0);
        let a = expand(anchor, New_York, Frequency::Monthly, 12);
        let b = expand(anchor, New_York, Frequency::Monthly, 12);
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn zero_count_expands_empty() {
        assert!(expand(utc_ms(2026, 9, 7, 10, 0), UTC, Frequency::Weekly, 0).is_empty());
    }
}
