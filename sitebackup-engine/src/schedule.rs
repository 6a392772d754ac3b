//! Weekly schedule rules and next-fire computation.

use crate::method::Method;
use chrono::{DateTime, Datelike, Days, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn day_slug(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

/// Subset of the seven weekdays.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DaySet(u8);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown weekday: {0}")]
pub struct UnknownWeekday(pub String);

impl DaySet {
    pub const EMPTY: DaySet = DaySet(0);
    pub const ALL: DaySet = DaySet(0b111_1111);

    pub fn of(days: &[Weekday]) -> Self {
        days.iter().fold(Self::EMPTY, |set, d| set.with(*d))
    }

    pub fn with(self, day: Weekday) -> Self {
        Self(self.0 | 1 << day.num_days_from_monday())
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        WEEK.into_iter().filter(move |d| self.contains(*d))
    }

    /// Unset or empty means every day.
    pub fn or_all(self) -> Self {
        if self.is_empty() {
            Self::ALL
        } else {
            self
        }
    }

    /// Parse `mon,wed` style lists. Blank input is the empty set.
    pub fn parse(text: &str) -> Result<Self, UnknownWeekday> {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .try_fold(Self::EMPTY, |set, s| {
                let day = s
                    .parse::<Weekday>()
                    .map_err(|_| UnknownWeekday(s.to_string()))?;
                Ok(set.with(day))
            })
    }

    /// Canonical `mon,wed` form, Monday first.
    pub fn to_csv(self) -> String {
        self.iter().map(day_slug).collect::<Vec<_>>().join(",")
    }
}

impl fmt::Debug for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DaySet({})", self.to_csv())
    }
}

impl Serialize for DaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(day_slug))
    }
}

impl<'de> Deserialize<'de> for DaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            List(Vec<String>),
            Csv(String),
        }
        let text = match Repr::deserialize(deserializer)? {
            Repr::List(days) => days.join(","),
            Repr::Csv(text) => text,
        };
        DaySet::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub id: i64,
    pub method: Method,
    pub hour: u8,
    pub minute: u8,
    pub days: DaySet,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRule {
    #[error("hour must be 0-23, got {0}")]
    Hour(u8),
    #[error("minute must be 0-59, got {0}")]
    Minute(u8),
}

impl ScheduleRule {
    pub fn validate(&self) -> Result<(), InvalidRule> {
        if self.hour > 23 {
            return Err(InvalidRule::Hour(self.hour));
        }
        if self.minute > 59 {
            return Err(InvalidRule::Minute(self.minute));
        }
        Ok(())
    }

    /// Six-field cron expression (seconds first) for the dispatcher, or `None`
    /// when the rule can never fire.
    pub fn cron_expression(&self) -> Option<String> {
        if self.days.is_empty() {
            return None;
        }
        let days = self
            .days
            .iter()
            .map(|d| {
                let slug = day_slug(d);
                let mut name = slug[..1].to_ascii_uppercase();
                name.push_str(&slug[1..]);
                name
            })
            .collect::<Vec<_>>()
            .join(",");
        Some(format!("0 {} {} * * {}", self.minute, self.hour, days))
    }
}

/// Earliest instant strictly after `now` whose local date in `tz` is one of
/// the rule's days and whose local time is the rule's time.
///
/// Days where the local time does not exist (a DST gap) are skipped. An
/// ambiguous local time fires at its first occurrence.
pub fn compute_next_fire<Tz: TimeZone>(
    rule: &ScheduleRule,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Option<DateTime<Tz>> {
    if rule.days.is_empty() {
        return None;
    }
    let time = NaiveTime::from_hms_opt(rule.hour.into(), rule.minute.into(), 0)?;
    let today = now.with_timezone(tz).date_naive();

    // Two weeks covers a matching day lost to a DST gap.
    (0..=14u64)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter(|date| rule.days.contains(date.weekday()))
        .filter_map(|date| tz.from_local_datetime(&date.and_time(time)).earliest())
        .find(|candidate| candidate.with_timezone(&Utc) > now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;

    fn rule(hour: u8, minute: u8, days: DaySet) -> ScheduleRule {
        ScheduleRule {
            id: 1,
            method: Method::Sftp,
            hour,
            minute,
            days,
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_tuesday_fires_next_wednesday() {
        let tz: Tz = "Africa/Johannesburg".parse().unwrap();
        let r = rule(14, 30, DaySet::of(&[Weekday::Mon, Weekday::Wed]));
        // Tuesday 2024-07-23 10:00 SAST
        let next = compute_next_fire(&r, utc(2024, 7, 23, 8, 0), &tz).unwrap();

        assert_eq!(next.weekday(), Weekday::Wed);
        assert_eq!(next.format("%Y-%m-%d %H:%M").to_string(), "2024-07-24 14:30");
    }

    #[test]
    fn test_empty_days_never_fire() {
        let r = rule(14, 30, DaySet::EMPTY);
        assert_eq!(compute_next_fire(&r, utc(2024, 7, 23, 8, 0), &Utc), None);
        assert_eq!(r.cron_expression(), None);
    }

    #[test]
    fn test_exact_fire_time_moves_to_next_week() {
        let r = rule(3, 0, DaySet::of(&[Weekday::Fri]));
        let now = utc(2024, 7, 26, 3, 0);
        let next = compute_next_fire(&r, now, &Utc).unwrap();
        assert_eq!(next, utc(2024, 8, 2, 3, 0));
    }

    #[test]
    fn test_later_today_fires_today() {
        let r = rule(23, 15, DaySet::ALL);
        let next = compute_next_fire(&r, utc(2024, 7, 26, 3, 0), &Utc).unwrap();
        assert_eq!(next, utc(2024, 7, 26, 23, 15));
    }

    #[test]
    fn test_dst_gap_skips_to_next_matching_day() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        // 02:30 does not exist on Sunday 2024-03-31 in Berlin.
        let r = rule(2, 30, DaySet::ALL);
        let next = compute_next_fire(&r, utc(2024, 3, 30, 12, 0), &tz).unwrap();
        assert_eq!(next.format("%Y-%m-%d %H:%M").to_string(), "2024-04-01 02:30");
    }

    #[test]
    fn test_dst_gap_on_only_day_moves_a_week() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        let r = rule(2, 30, DaySet::of(&[Weekday::Sun]));
        // Saturday 2024-03-30; the Sunday after has no 02:30.
        let next = compute_next_fire(&r, utc(2024, 3, 30, 12, 0), &tz).unwrap();
        assert_eq!(next.format("%Y-%m-%d %H:%M %Z").to_string(), "2024-04-07 02:30 CEST");
    }

    #[test]
    fn test_day_set_parse_and_serde() {
        let days = DaySet::parse("wed, mon").unwrap();
        assert_eq!(days.to_csv(), "mon,wed");
        assert!(DaySet::parse("funday").is_err());
        assert!(DaySet::parse("").unwrap().is_empty());
        assert_eq!(DaySet::EMPTY.or_all(), DaySet::ALL);

        let json = serde_json::to_string(&days).unwrap();
        assert_eq!(json, r#"["mon","wed"]"#);
        let back: DaySet = serde_json::from_str(r#""mon,wed""#).unwrap();
        assert_eq!(back, days);
    }

    #[test]
    fn test_cron_expression() {
        let r = rule(14, 30, DaySet::of(&[Weekday::Wed, Weekday::Mon]));
        assert_eq!(r.cron_expression().unwrap(), "0 30 14 * * Mon,Wed");
    }

    #[test]
    fn test_validate_bounds() {
        assert!(rule(24, 0, DaySet::ALL).validate().is_err());
        assert!(rule(0, 60, DaySet::ALL).validate().is_err());
        assert!(rule(23, 59, DaySet::ALL).validate().is_ok());
    }
}
