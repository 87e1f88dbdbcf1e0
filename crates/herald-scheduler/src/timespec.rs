//! Parsing of reminder commands and their time specifiers.
//!
//! ```text
//! remind me [[every|this|next|on] <day> | every]
//!           [at HH[:MM][am|pm] | morning|noon|afternoon|evening|night] [to] <message>
//!
//! <day> = <weekday> | day | weekday | today | tomorrow
//! ```
//!
//! Relative days are resolved against `now` in the scheduler's time zone, so
//! a parsed spec always names a weekday, `day` or `weekday`. A bare `every`
//! means every day.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Weekday};
use herald_core::error::{HeraldError, Result};
use regex::{Regex, RegexBuilder};

pub const CANCEL_PATTERN: &str = r"\A\s*cancel\s+reminder\s+([0-9]+)";
pub const LIST_PATTERN: &str = r"\A\s*reminders";
/// Matches any `remind me` command, parsable or not.
pub const REMIND_PATTERN: &str = r"\A\s*remind\s+me\b";
const MESSAGE_PATTERN: &str = r"\A\s*remind\s+me\s+(.*)\z";
const TIME_SPEC_PATTERN: &str = concat!(
    r"\A(?:(?:(this|next|on|every)\s+)?",
    r"(today|tomorrow|day|monday|tuesday|wednesday|thursday|friday|saturday|sunday|weekday)\b",
    r"|(every)\b)?",
    r"\s*(?:at\s+([0-9]{1,2})(?::?([0-9]{2}))?(?:\s*(am|pm)\b)?|(morning|noon|afternoon|evening|night)\b)?",
    r"\s*(.*)\z",
);

const DEFAULT_HOUR: u32 = 8;

/// A fully resolved time specifier plus the reminder text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSpec {
    pub recurring: bool,
    pub day: String,
    pub hour: String,
    pub minute: String,
    pub message: String,
}

/// Compiled command patterns.
#[derive(Debug, Clone)]
pub struct CommandPatterns {
    pub cancel: Regex,
    pub list: Regex,
    pub remind: Regex,
    message: Regex,
    time_spec: Regex,
}

fn compile(expr: &str) -> Result<Regex> {
    RegexBuilder::new(expr)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| HeraldError::Config(format!("Invalid pattern '{expr}': {e}")))
}

impl CommandPatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            cancel: compile(CANCEL_PATTERN)?,
            list: compile(LIST_PATTERN)?,
            remind: compile(REMIND_PATTERN)?,
            message: compile(MESSAGE_PATTERN)?,
            time_spec: compile(TIME_SPEC_PATTERN)?,
        })
    }

    /// Reminder id from `cancel reminder <id>`.
    pub fn cancel_id(&self, body: &str) -> Result<i64> {
        let digits = self
            .cancel
            .captures(body)
            .and_then(|c| c.get(1))
            .ok_or_else(|| HeraldError::parse("expected `cancel reminder <id>`"))?;
        digits
            .as_str()
            .parse()
            .map_err(|_| HeraldError::parse(format!("{} is not a reminder id", digits.as_str())))
    }

    /// Parse a full `remind me ...` message body.
    pub fn parse_reminder<Tz: TimeZone>(&self, body: &str, now: &DateTime<Tz>) -> Result<TimeSpec> {
        let command = self
            .message
            .captures(body)
            .and_then(|c| c.get(1))
            .ok_or_else(|| HeraldError::parse("nothing to remind you of"))?;
        self.parse_time_spec(command.as_str(), now)
    }

    /// Parse what follows `remind me`.
    pub fn parse_time_spec<Tz: TimeZone>(&self, command: &str, now: &DateTime<Tz>) -> Result<TimeSpec> {
        let caps = self
            .time_spec
            .captures(command.trim())
            .ok_or_else(|| HeraldError::parse(format!("could not read a time from '{command}'")))?;
        let text = |i: usize| caps.get(i).map(|m| m.as_str().to_lowercase());

        // `every` with no day of its own repeats daily.
        let bare_every = caps.get(3).is_some();
        let recurring = bare_every || text(1).as_deref() == Some("every");

        let (hour, minute) = match (text(4), text(7)) {
            (Some(hour), _) => clock_time(&hour, text(5).as_deref(), text(6).as_deref())?,
            (None, Some(fuzzy)) => (fuzzy_hour(&fuzzy), 0),
            (None, None) => (DEFAULT_HOUR, 0),
        };

        let message = caps
            .get(8)
            .map(|m| strip_to(m.as_str().trim()))
            .unwrap_or_default();
        if message.is_empty() {
            return Err(HeraldError::parse("what should I remind you of?"));
        }

        let day = if bare_every {
            "day".to_string()
        } else {
            resolve_day(text(2).as_deref(), hour, minute, now)
        };

        Ok(TimeSpec {
            recurring,
            day,
            hour: format!("{hour:02}"),
            minute: format!("{minute:02}"),
            message,
        })
    }
}

/// Drop a leading `to ` from the message, whatever its case.
fn strip_to(message: &str) -> String {
    match message.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("to ") => message[3..].trim().to_string(),
        _ => message.to_string(),
    }
}

fn clock_time(hour: &str, minute: Option<&str>, meridiem: Option<&str>) -> Result<(u32, u32)> {
    let hour: u32 = hour
        .parse()
        .map_err(|_| HeraldError::parse(format!("{hour} is not an hour")))?;
    let minute: u32 = match minute {
        Some(m) => m
            .parse()
            .map_err(|_| HeraldError::parse(format!("{m} is not a minute")))?,
        None => 0,
    };
    if minute > 59 {
        return Err(HeraldError::parse(format!("{minute} is not a valid minute")));
    }

    let hour = match meridiem {
        Some(m) => {
            if !(1..=12).contains(&hour) {
                return Err(HeraldError::parse(format!("{hour}{m} is not a valid time")));
            }
            match (m, hour) {
                ("am", 12) => 0,
                ("am", h) => h,
                (_, 12) => 12,
                (_, h) => h + 12,
            }
        }
        None if hour > 23 => {
            return Err(HeraldError::parse(format!("{hour} is not a valid hour")));
        }
        None => hour,
    };
    Ok((hour, minute))
}

fn fuzzy_hour(word: &str) -> u32 {
    match word {
        "noon" => 12,
        "afternoon" => 15,
        "evening" => 18,
        "night" => 21,
        _ => DEFAULT_HOUR,
    }
}

/// Turn relative or missing days into a weekday name.
///
/// Without a day the reminder goes to today, unless today's (hour, minute) has
/// already been reached, in which case it goes to tomorrow.
fn resolve_day<Tz: TimeZone>(day: Option<&str>, hour: u32, minute: u32, now: &DateTime<Tz>) -> String {
    let today = || weekday_name(now.weekday());
    let tomorrow = || weekday_name((now.clone() + Duration::days(1)).weekday());
    match day {
        None => {
            if (now.hour(), now.minute()) >= (hour, minute) {
                tomorrow()
            } else {
                today()
            }
        }
        Some("today") => today(),
        Some("tomorrow") => tomorrow(),
        Some(other) => other.to_string(),
    }
}

pub fn weekday_name(day: Weekday) -> String {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
    .to_string()
}
