//! Schedule specs: a minute, an hour and a set of weekdays.
//! No day-of-month or month granularity.
//!
//! Rendered in cron order for logs: `"0 15 * * THU"` = Thursdays at 15:00.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Weekday};
use herald_core::error::{HeraldError, Result};

use crate::tasks::Reminder;

/// Upper bound for the next-run search; every spec matches within a week.
const SEARCH_MINUTES: i64 = 8 * 24 * 60;

const WEEKDAYS: [Weekday; 5] = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub minute: u32,
    pub hour: u32,
    /// Empty means every day.
    pub days: Vec<Weekday>,
}

impl ScheduleSpec {
    pub fn new(minute: u32, hour: u32, days: Vec<Weekday>) -> Result<Self> {
        if minute > 59 || hour > 23 {
            return Err(HeraldError::parse(format!("{hour:02}:{minute:02} is not a time of day")));
        }
        Ok(Self { minute, hour, days })
    }

    /// Derive the spec from a reminder's stored fields.
    pub fn from_reminder(reminder: &Reminder) -> Result<Self> {
        let minute = reminder
            .minute
            .parse()
            .map_err(|_| HeraldError::parse(format!("bad minute '{}'", reminder.minute)))?;
        let hour = reminder
            .hour
            .parse()
            .map_err(|_| HeraldError::parse(format!("bad hour '{}'", reminder.hour)))?;
        Self::new(minute, hour, parse_days(&reminder.day)?)
    }

    /// Whether `at` falls inside the scheduled minute.
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        at.minute() == self.minute
            && at.hour() == self.hour
            && (self.days.is_empty() || self.days.contains(&at.weekday()))
    }

    /// First scheduled minute strictly after `after`, scanning minute by minute.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut candidate = after.clone() + Duration::minutes(1);
        candidate = candidate.with_second(0).unwrap_or(candidate);
        candidate = candidate.with_nanosecond(0).unwrap_or(candidate);

        for _ in 0..SEARCH_MINUTES {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

impl std::fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let days = if self.days.is_empty() {
            "*".to_string()
        } else {
            self.days
                .iter()
                .map(|d| d.to_string().to_uppercase())
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(f, "{} {} * * {}", self.minute, self.hour, days)
    }
}

/// `day`, `weekday` or a weekday name.
fn parse_days(day: &str) -> Result<Vec<Weekday>> {
    match day.to_lowercase().as_str() {
        "day" => Ok(Vec::new()),
        "weekday" => Ok(WEEKDAYS.to_vec()),
        name => name
            .parse::<Weekday>()
            .map(|d| vec![d])
            .map_err(|_| HeraldError::parse(format!("unknown day '{day}'"))),
    }
}
