//! Availability resolution: weekly rules in a mentor's timezone become
//! concrete UTC spans, then blackouts and live reservations are carved out.
//!
//! All functions here are pure over their inputs. Callers that need a
//! consistent snapshot take the calendar lock and pass the guarded data in.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::model::{AvailabilityRule, MentorCalendar, Ms, Span};
use crate::recurrence::resolve_local;

/// Materialize weekly rules into concrete spans overlapping `query`,
/// clipped to it. Output is sorted but may contain overlaps when rules
/// overlap; callers merge.
pub fn materialize_rules(rules: &[AvailabilityRule], tz: Tz, query: &Span) -> Vec<Span> {
    let Some(start_utc) = Utc.timestamp_millis_opt(query.start).single() else {
        return Vec::new();
    };
    let Some(end_utc) = Utc.timestamp_millis_opt(query.end).single() else {
        return Vec::new();
    };
    // Walk one local day past each edge so spans straddling midnight (or a
    // timezone offset) are not missed.
    let first = start_utc.with_timezone(&tz).date_naive() - Duration::days(1);
    let last = end_utc.with_timezone(&tz).date_naive() + Duration::days(1);

    let mut out = Vec::new();
    let mut date = first;
    while date <= last {
        for rule in rules.iter().filter(|r| r.active && r.weekday == date.weekday()) {
            let Some(start_local) = minute_on(date, rule.start_minute) else {
                continue;
            };
            let Some(end_local) = minute_on(date, rule.end_minute) else {
                continue;
            };
            let (Some(start), Some(end)) =
                (resolve_local(start_local, tz), resolve_local(end_local, tz))
            else {
                continue;
            };
            let clipped = Span {
                start: start.max(query.start),
                end: end.min(query.end),
            };
            if clipped.start < clipped.end {
                out.push(clipped);
            }
        }
        date += Duration::days(1);
    }
    out.sort_by_key(|s| s.start);
    out
}

/// A rule minute-of-day on a concrete local date. 1440 means next midnight.
fn minute_on(date: NaiveDate, minute: u16) -> Option<NaiveDateTime> {
    if minute >= 1_440 {
        date.succ_opt().map(|d| d.and_time(NaiveTime::MIN))
    } else {
        date.and_hms_opt(u32::from(minute) / 60, u32::from(minute) % 60, 0)
    }
}

/// Merge a start-sorted span list, coalescing overlapping and adjacent
/// entries.
pub fn merge_overlapping(mut spans: Vec<Span>) -> Vec<Span> {
    spans.sort_by_key(|s| s.start);
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(prev) if span.start <= prev.end => {
                prev.end = prev.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Subtract `cuts` from `base`. Both inputs must be merged and sorted;
/// output preserves that shape.
pub fn subtract_intervals(base: &[Span], cuts: &[Span]) -> Vec<Span> {
    let mut out = Vec::with_capacity(base.len());
    for span in base {
        let mut cursor = span.start;
        for cut in cuts {
            if cut.end <= cursor {
                continue;
            }
            if cut.start >= span.end {
                break;
            }
            if cut.start > cursor {
                out.push(Span { start: cursor, end: cut.start.min(span.end) });
            }
            cursor = cursor.max(cut.end);
            if cursor >= span.end {
                break;
            }
        }
        if cursor < span.end {
            out.push(Span { start: cursor, end: span.end });
        }
    }
    out
}

/// The open hours of a calendar over `query`: rules materialized and merged,
/// blackouts removed. Reservations are NOT subtracted here.
pub(crate) fn open_hours(calendar: &MentorCalendar, query: &Span) -> Vec<Span> {
    let rules = merge_overlapping(materialize_rules(&calendar.rules, calendar.timezone, query));
    let blackouts = merge_overlapping(calendar.blackouts.clone());
    subtract_intervals(&rules, &blackouts)
}

/// Free bookable windows: open hours minus every occurrence still holding
/// its slot at `now`.
pub fn open_windows(calendar: &MentorCalendar, query: &Span, now: Ms) -> Vec<Span> {
    let open = open_hours(calendar, query);
    let held: Vec<Span> = calendar
        .overlapping(query)
        .filter(|o| o.status.is_active(now))
        .map(|o| o.span)
        .collect();
    subtract_intervals(&open, &merge_overlapping(held))
}

/// Whether `window` lies entirely inside the calendar's open hours.
pub(crate) fn within_open_hours(calendar: &MentorCalendar, window: &Span) -> bool {
    open_hours(calendar, window)
        .iter()
        .any(|open| open.contains_span(window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use chrono_tz::America::New_York;
    use chrono_tz::UTC;
    use ulid::Ulid;

    fn rule(weekday: Weekday, start_minute: u16, end_minute: u16) -> AvailabilityRule {
        AvailabilityRule { id: Ulid::new(), weekday, start_minute, end_minute, active: true }
    }

    fn utc_ms(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Ms {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    #[test]
    fn merge_coalesces_overlap_and_adjacency() {
        let merged = merge_overlapping(vec![
            Span::new(10, 20),
            Span::new(30, 40),
            Span::new(15, 30),
            Span::new(50, 60),
        ]);
        assert_eq!(merged, vec![Span::new(10, 40), Span::new(50, 60)]);
    }

    #[test]
    fn subtract_splits_and_trims() {
        let base = vec![Span::new(0, 100)];
        let cuts = vec![Span::new(10, 20), Span::new(40, 50), Span::new(90, 200)];
        assert_eq!(
            subtract_intervals(&base, &cuts),
            vec![Span::new(0, 10), Span::new(20, 40), Span::new(50, 90)]
        );
    }

    #[test]
    fn subtract_full_cover_yields_empty() {
        assert!(subtract_intervals(&[Span::new(10, 20)], &[Span::new(0, 30)]).is_empty());
    }

    #[test]
    fn materializes_weekly_rule_in_utc() {
        // Mondays 09:00-17:00 UTC; query one full week starting Mon Sep 7 2026.
        let rules = vec![rule(Weekday::Mon, 540, 1020)];
        let query = Span::new(utc_ms(2026, 9, 7, 0, 0), utc_ms(2026, 9, 14, 0, 0));
        let spans = materialize_rules(&rules, UTC, &query);
        assert_eq!(
            spans,
            vec![Span::new(utc_ms(2026, 9, 7, 9, 0), utc_ms(2026, 9, 7, 17, 0))]
        );
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let mut r = rule(Weekday::Mon, 540, 1020);
        r.active = false;
        let query = Span::new(utc_ms(2026, 9, 7, 0, 0), utc_ms(2026, 9, 14, 0, 0));
        assert!(materialize_rules(&[r], UTC, &query).is_empty());
    }

    #[test]
    fn materializes_in_mentor_timezone() {
        // Monday 09:00 New York = 13:00 UTC during EDT.
        let rules = vec![rule(Weekday::Mon, 540, 1020)];
        let query = Span::new(utc_ms(2026, 9, 7, 0, 0), utc_ms(2026, 9, 8, 0, 0));
        let spans = materialize_rules(&rules, New_York, &query);
        assert_eq!(
            spans,
            vec![Span::new(utc_ms(2026, 9, 7, 13, 0), utc_ms(2026, 9, 7, 21, 0))]
        );
    }

    #[test]
    fn clips_to_query_window() {
        let rules = vec![rule(Weekday::Mon, 540, 1020)];
        // Query starts mid-rule.
        let query = Span::new(utc_ms(2026, 9, 7, 12, 0), utc_ms(2026, 9, 7, 15, 0));
        let spans = materialize_rules(&rules, UTC, &query);
        assert_eq!(spans, vec![query]);
    }

    #[test]
    fn rule_ending_at_midnight() {
        let rules = vec![rule(Weekday::Mon, 1_380, 1_440)]; // 23:00-24:00
        let query = Span::new(utc_ms(2026, 9, 7, 0, 0), utc_ms(2026, 9, 8, 2, 0));
        let spans = materialize_rules(&rules, UTC, &query);
        assert_eq!(
            spans,
            vec![Span::new(utc_ms(2026, 9, 7, 23, 0), utc_ms(2026, 9, 8, 0, 0))]
        );
    }

    #[test]
    fn open_windows_subtract_blackouts_and_live_holds() {
        let mentor = Ulid::new();
        let mut cal = MentorCalendar::new(mentor, UTC);
        cal.rules.push(rule(Weekday::Mon, 540, 1020)); // 09:00-17:00
        cal.blackouts.push(Span::new(utc_ms(2026, 9, 7, 12, 0), utc_ms(2026, 9, 7, 13, 0)));

        let now = utc_ms(2026, 9, 1, 0, 0);
        cal.insert_occurrence(crate::model::Occurrence {
            id: Ulid::new(),
            mentor_id: mentor,
            session_type_id: Ulid::new(),
            span: Span::new(utc_ms(2026, 9, 7, 9, 0), utc_ms(2026, 9, 7, 10, 0)),
            capacity: 1,
            participants: vec![Ulid::new()],
            status: crate::model::OccurrenceStatus::Confirmed,
            price_per_participant_cents: 5_000,
            package_id: None,
            meeting_link: None,
        });
        // Expired hold: must NOT consume availability.
        cal.insert_occurrence(crate::model::Occurrence {
            id: Ulid::new(),
            mentor_id: mentor,
            session_type_id: Ulid::new(),
            span: Span::new(utc_ms(2026, 9, 7, 15, 0), utc_ms(2026, 9, 7, 16, 0)),
            capacity: 1,
            participants: vec![Ulid::new()],
            status: crate::model::OccurrenceStatus::PendingPayment { hold_expires_at: now - 1 },
            price_per_participant_cents: 5_000,
            package_id: None,
            meeting_link: None,
        });

        let query = Span::new(utc_ms(2026, 9, 7, 0, 0), utc_ms(2026, 9, 8, 0, 0));
        let windows = open_windows(&cal, &query, now);
        assert_eq!(
            windows,
            vec![
                Span::new(utc_ms(2026, 9, 7, 10, 0), utc_ms(2026, 9, 7, 12, 0)),
                Span::new(utc_ms(2026, 9, 7, 13, 0), utc_ms(2026, 9, 7, 17, 0)),
            ]
        );
    }

    #[test]
    fn within_open_hours_respects_blackouts() {
        let mut cal = MentorCalendar::new(Ulid::new(), UTC);
        cal.rules.push(rule(Weekday::Mon, 540, 1020));
        let inside = Span::new(utc_ms(2026, 9, 7, 10, 0), utc_ms(2026, 9, 7, 11, 0));
        assert!(within_open_hours(&cal, &inside));

        cal.blackouts.push(Span::new(utc_ms(2026, 9, 7, 10, 30), utc_ms(2026, 9, 7, 12, 0)));
        assert!(!within_open_hours(&cal, &inside));

        let outside = Span::new(utc_ms(2026, 9, 8, 10, 0), utc_ms(2026, 9, 8, 11, 0));
        assert!(!within_open_hours(&cal, &outside), "Tuesday has no rule");
    }
}
