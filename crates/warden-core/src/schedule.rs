//! Clock and schedule evaluation.
//!
//! A schedule is an ordered list of availability rules; each rule names
//! weekdays and wall-clock time ranges. A domain is *available* (not
//! blocked) at an instant iff any rule matches the instant's local
//! weekday and any of that rule's ranges contains the local time.
//! Ranges with `end <= start` wrap overnight into the following day.

use crate::error::WardenError;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Weekday names accepted in policy files, lowercase full English.
pub const VALID_DAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// One wall-clock window in `HH:MM` 24-hour form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

/// A set of weekdays sharing a list of time ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub days: Vec<String>,
    pub time_ranges: Vec<TimeRange>,
}

/// An availability schedule attached to a domain, category or service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub available_hours: Vec<AvailabilityRule>,
}

/// Resolve an IANA zone name, surfacing unknown zones as config errors.
pub fn resolve_zone(name: &str) -> Result<Tz, WardenError> {
    name.parse::<Tz>().map_err(|_| {
        WardenError::Config(format!(
            "unknown timezone '{name}' (expected an IANA zone name)"
        ))
    })
}

/// Parse `HH:MM` into minutes from midnight. `24:00` is rejected.
pub fn parse_hhmm(raw: &str) -> Option<u32> {
    let (h, m) = raw.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Evaluate availability of `schedule` at `instant` in zone `tz`. Pure.
///
/// Callers handle the null-schedule case before reaching this function:
/// no schedule means "never available" for blocklist entries and
/// "always available" for allowlist entries.
pub fn is_available(schedule: &Schedule, instant: DateTime<Utc>, tz: Tz) -> bool {
    let local = instant.with_timezone(&tz);
    let today = weekday_name(local.weekday());
    let yesterday = weekday_name((local - Duration::days(1)).weekday());
    let minute = local.time().hour() * 60 + local.time().minute();

    for rule in &schedule.available_hours {
        let matches_today = rule.days.iter().any(|d| d == today);
        let matches_yesterday = rule.days.iter().any(|d| d == yesterday);

        for range in &rule.time_ranges {
            let (Some(start), Some(end)) = (parse_hhmm(&range.start), parse_hhmm(&range.end))
            else {
                continue;
            };

            if start == end {
                // Empty window, matches nothing.
                continue;
            }

            if start < end {
                if matches_today && minute >= start && minute < end {
                    return true;
                }
            } else {
                // Overnight window: starts on a listed weekday, ends the
                // following day strictly before 24h later.
                if matches_today && minute >= start {
                    return true;
                }
                if matches_yesterday && minute < end {
                    return true;
                }
            }
        }
    }

    false
}

impl Schedule {
    /// Validate days and time formats; returns error strings prefixed
    /// with `prefix`. Overlapping same-day ranges are warned, not
    /// rejected.
    pub fn validate(&self, prefix: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if self.available_hours.is_empty() {
            errors.push(format!("{prefix}: available_hours must not be empty"));
        }

        // day -> (start, end) pairs for overlap detection
        let mut per_day: std::collections::BTreeMap<String, Vec<(u32, u32)>> =
            std::collections::BTreeMap::new();

        for (idx, rule) in self.available_hours.iter().enumerate() {
            if rule.days.is_empty() {
                errors.push(format!("{prefix}: block #{idx} has no days"));
            }
            let mut rule_days = Vec::new();
            for day in &rule.days {
                if !VALID_DAYS.contains(&day.as_str()) {
                    errors.push(format!("{prefix}: invalid day '{day}'"));
                } else {
                    rule_days.push(day.clone());
                }
            }

            if rule.time_ranges.is_empty() {
                errors.push(format!("{prefix}: block #{idx} has no time_ranges"));
            }
            for range in &rule.time_ranges {
                let start = parse_hhmm(&range.start);
                let end = parse_hhmm(&range.end);
                if start.is_none() {
                    errors.push(format!(
                        "{prefix}: invalid time format '{}' for 'start' (expected HH:MM)",
                        range.start
                    ));
                }
                if end.is_none() {
                    errors.push(format!(
                        "{prefix}: invalid time format '{}' for 'end' (expected HH:MM)",
                        range.end
                    ));
                }
                if let (Some(s), Some(e)) = (start, end) {
                    for day in &rule_days {
                        per_day.entry(day.clone()).or_default().push((s, e));
                    }
                }
            }
        }

        for (day, mut ranges) in per_day {
            ranges.sort_unstable();
            for pair in ranges.windows(2) {
                let (s1, e1) = pair[0];
                let (s2, _) = pair[1];
                // Overnight ranges wrap; only flag plain same-day overlap.
                if s1 < e1 && s2 < e1 {
                    tracing::warn!("{prefix}: overlapping time ranges on {day}");
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule(days: &[&str], ranges: &[(&str, &str)]) -> Schedule {
        Schedule {
            available_hours: vec![AvailabilityRule {
                days: days.iter().map(|d| d.to_string()).collect(),
                time_ranges: ranges
                    .iter()
                    .map(|(s, e)| TimeRange {
                        start: s.to_string(),
                        end: e.to_string(),
                    })
                    .collect(),
            }],
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("00:00"), Some(0));
        assert_eq!(parse_hhmm("23:59"), Some(1439));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("9:00"), None);
        assert_eq!(parse_hhmm("09:60"), None);
        assert_eq!(parse_hhmm("0900"), None);
    }

    #[test]
    fn test_simple_window() {
        let s = schedule(&["monday"], &[("12:00", "13:00")]);
        // 2024-01-15 is a Monday.
        assert!(is_available(&s, utc(2024, 1, 15, 12, 0), chrono_tz::UTC));
        assert!(is_available(&s, utc(2024, 1, 15, 12, 59), chrono_tz::UTC));
        assert!(!is_available(&s, utc(2024, 1, 15, 13, 0), chrono_tz::UTC));
        assert!(!is_available(&s, utc(2024, 1, 16, 12, 30), chrono_tz::UTC));
    }

    #[test]
    fn test_zone_conversion() {
        let s = schedule(&["monday"], &[("12:00", "13:00")]);
        let tz: Tz = "America/New_York".parse().unwrap();
        // 17:30 UTC == 12:30 in New York (EST).
        assert!(is_available(&s, utc(2024, 1, 15, 17, 30), tz));
        assert!(!is_available(&s, utc(2024, 1, 15, 12, 30), tz));
    }

    #[test]
    fn test_overnight_window() {
        let s = schedule(&["monday"], &[("22:00", "02:00")]);
        let tz = chrono_tz::UTC;
        assert!(is_available(&s, utc(2024, 1, 15, 22, 30), tz)); // Mon 22:30
        assert!(is_available(&s, utc(2024, 1, 16, 1, 30), tz)); // Tue 01:30
        assert!(!is_available(&s, utc(2024, 1, 16, 2, 0), tz)); // Tue 02:00
        assert!(!is_available(&s, utc(2024, 1, 16, 22, 30), tz)); // Tue 22:30
        assert!(!is_available(&s, utc(2024, 1, 15, 1, 30), tz)); // Mon 01:30
    }

    #[test]
    fn test_empty_window_never_matches() {
        let s = schedule(&["monday"], &[("00:00", "00:00")]);
        for hour in 0..24 {
            assert!(!is_available(&s, utc(2024, 1, 15, hour, 0), chrono_tz::UTC));
        }
    }

    #[test]
    fn test_always_available_rule() {
        let s = schedule(&VALID_DAYS, &[("00:00", "23:59")]);
        let tz: Tz = "Europe/Oslo".parse().unwrap();
        for day in 10..17 {
            for hour in [0, 6, 12, 23] {
                assert!(is_available(&s, utc(2024, 3, day, hour, 30), tz));
            }
        }
    }

    #[test]
    fn test_union_of_ranges() {
        let s = schedule(&["monday"], &[("12:00", "13:00"), ("18:00", "22:00")]);
        let tz = chrono_tz::UTC;
        assert!(is_available(&s, utc(2024, 1, 15, 12, 30), tz));
        assert!(is_available(&s, utc(2024, 1, 15, 19, 0), tz));
        assert!(!is_available(&s, utc(2024, 1, 15, 14, 30), tz));
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let s = schedule(&["funday"], &[("24:00", "02:00")]);
        let errors = s.validate("'x.com'");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("funday"));
        assert!(errors[1].contains("24:00"));
    }

    #[test]
    fn test_validate_empty_schedule() {
        let s = Schedule {
            available_hours: vec![],
        };
        assert!(!s.validate("'x.com'").is_empty());
    }

    #[test]
    fn test_resolve_zone() {
        assert!(resolve_zone("America/New_York").is_ok());
        assert!(resolve_zone("Mars/Olympus").is_err());
    }
}
