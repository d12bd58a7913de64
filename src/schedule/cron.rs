//! Five-field cron expressions (minute hour day month weekday)
//!
//! Parsing and next-fire computation go through the `cron` crate, which wants
//! a leading seconds field and numbers weekdays 1-7 from Sunday. Expressions
//! are accepted in the classic crontab form and translated: a `0` seconds
//! field is prepended and the weekday field (0-7, Sunday = 0 or 7) is expanded
//! into day names.
//!
//! When both day-of-month and day-of-week are restricted, crontab fires when
//! either matches. The `cron` crate requires both, so such expressions are
//! split into two schedules and the earlier fire time wins.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ::cron::Schedule;

use crate::{Error, Result};

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A validated crontab expression.
#[derive(Debug, Clone)]
pub struct CronExpression {
    expression: String,
    schedules: Vec<Schedule>,
}

impl CronExpression {
    /// Parse and validate a five-field expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the expression does not have exactly
    /// five fields or any field is out of range.
    ///
    /// ```rust
    /// use als_ops::schedule::CronExpression;
    ///
    /// assert!(CronExpression::parse("0 */6 * * *").is_ok());
    /// assert!(CronExpression::parse("0 0 * * 1-5").is_ok());
    /// assert!(CronExpression::parse("not a cron").is_err());
    /// assert!(CronExpression::parse("0 0 * *").is_err());
    /// ```
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, day, month, weekday] = fields[..] else {
            return Err(Error::validation(
                "Invalid cron expression. Must be 5 fields: minute hour day month weekday",
            ));
        };

        let weekdays = expand_weekday(weekday)?;
        let build = |day: &str, weekday: &str| {
            Schedule::from_str(&format!("0 {minute} {hour} {day} {month} {weekday}")).map_err(
                |e| Error::validation(format!("Invalid cron expression '{expression}': {e}")),
            )
        };

        let schedules = if day.starts_with('*') || weekday.starts_with('*') {
            vec![build(day, &weekdays)?]
        } else {
            vec![build(day, "*")?, build("*", &weekdays)?]
        };

        Ok(Self {
            expression: fields.join(" "),
            schedules,
        })
    }

    /// The expression with whitespace normalized to single spaces.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(&after).next())
            .min()
    }

    /// Human-readable description for common schedules.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.expression.as_str() {
            "0 0 * * *" => "Daily at midnight".to_string(),
            "0 0 * * 0" => "Every Sunday at midnight".to_string(),
            "0 0 1 * *" => "First day of month at midnight".to_string(),
            "0 */6 * * *" => "Every 6 hours".to_string(),
            other => format!("Cron: {other}"),
        }
    }
}

impl PartialEq for CronExpression {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for CronExpression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Expand a crontab weekday field into a comma-separated list of day names.
///
/// `*` stays as is.
fn expand_weekday(field: &str) -> Result<String> {
    if field == "*" {
        return Ok(field.to_string());
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, parse_step(step)?),
            None => (item, 1),
        };
        let (lo, hi) = match range.split_once('-') {
            _ if range == "*" => (0, 7),
            Some((lo, hi)) => (weekday_number(lo)?, weekday_number(hi)?),
            None if item.contains('/') => (weekday_number(range)?, 7),
            None => {
                let day = weekday_number(range)?;
                (day, day)
            }
        };
        if lo > hi {
            return Err(Error::validation(format!(
                "Invalid cron expression: weekday range {range} is reversed"
            )));
        }
        for day in (lo..=hi).step_by(step) {
            days[day % 7] = true;
        }
    }

    Ok(WEEKDAYS
        .iter()
        .zip(days)
        .filter(|(_, set)| *set)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(","))
}

fn parse_step(raw: &str) -> Result<usize> {
    match raw.parse::<usize>() {
        Ok(step) if step > 0 => Ok(step),
        _ => Err(Error::validation(format!(
            "Invalid cron expression: bad weekday step '{raw}'"
        ))),
    }
}

fn weekday_number(atom: &str) -> Result<usize> {
    if let Ok(day) = atom.parse::<usize>() {
        return if day <= 7 {
            Ok(day)
        } else {
            Err(Error::validation(format!(
                "Invalid cron expression: weekday {day} is out of range 0-7"
            )))
        };
    }
    WEEKDAYS
        .iter()
        .position(|name| name.eq_ignore_ascii_case(atom))
        .ok_or_else(|| Error::validation(format!("Invalid cron expression: weekday '{atom}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_accepts_common_expressions() {
        for expr in [
            "0 0 * * *",
            "0 0 * * 0",
            "0 0 1 * *",
            "0 */6 * * *",
            "30 2 * * 1-5",
            "0 5 * * MON,FRI",
            "15 3 1,15 * *",
            "0 0 * * 7",
            "0 0 * * 1-7",
        ] {
            assert!(CronExpression::parse(expr).is_ok(), "rejected {expr}");
        }
    }

    #[test]
    fn test_rejects_bad_expressions() {
        for expr in [
            "",
            "not a cron",
            "* * * *",
            "* * * * * *",
            "61 * * * *",
            "0 25 * * *",
            "0 0 32 * *",
            "0 0 * 13 *",
            "0 0 * * 8",
        ] {
            assert!(CronExpression::parse(expr).is_err(), "accepted {expr:?}");
        }
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let cron = CronExpression::parse("  0   0 * *  *  ").unwrap();
        assert_eq!(cron.as_str(), "0 0 * * *");
        assert_eq!(cron.describe(), "Daily at midnight");
    }

    #[test]
    fn test_describe_fallback() {
        let cron = CronExpression::parse("15 3 * * *").unwrap();
        assert_eq!(cron.describe(), "Cron: 15 3 * * *");
    }

    #[test]
    fn test_next_after_daily() {
        let cron = CronExpression::parse("0 0 * * *").unwrap();
        let next = cron.next_after(at(2025, 11, 12, 12, 30)).unwrap();
        assert_eq!(next, at(2025, 11, 13, 0, 0));
    }

    #[test]
    fn test_next_after_sunday_zero() {
        // 2025-11-12 is a Wednesday
        let cron = CronExpression::parse("0 0 * * 0").unwrap();
        let next = cron.next_after(at(2025, 11, 12, 12, 30)).unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next, at(2025, 11, 16, 0, 0));
    }

    #[test]
    fn test_next_after_weekdays() {
        // Saturday afternoon -> Monday 02:30
        let cron = CronExpression::parse("30 2 * * 1-5").unwrap();
        let next = cron.next_after(at(2025, 11, 15, 14, 0)).unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!((next.hour(), next.minute()), (2, 30));
    }

    #[test]
    fn test_next_after_sunday_as_seven_only() {
        // 2025-11-12 is a Wednesday
        let cron = CronExpression::parse("0 0 * * 7-7").unwrap();
        let next = cron.next_after(at(2025, 11, 12, 12, 30)).unwrap();
        assert_eq!(next, at(2025, 11, 16, 0, 0));
    }

    #[test]
    fn test_day_of_month_or_weekday() {
        // 2026-01-27 is a Tuesday, 2026-02-01 a Sunday
        let cron = CronExpression::parse("0 0 1 * 1").unwrap();
        let first = cron.next_after(at(2026, 1, 27, 12, 0)).unwrap();
        assert_eq!(first, at(2026, 2, 1, 0, 0));
        let second = cron.next_after(first).unwrap();
        assert_eq!(second, at(2026, 2, 2, 0, 0));
        assert_eq!(second.weekday(), Weekday::Mon);
    }

    #[test]
    fn test_star_step_day_of_month_keeps_and() {
        // Day-of-month starting with '*' is unrestricted, so only the weekday applies
        let cron = CronExpression::parse("0 0 */1 * 1").unwrap();
        let next = cron.next_after(at(2026, 1, 27, 12, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 2, 0, 0));
    }

    #[test]
    fn test_expand_weekday() {
        assert_eq!(expand_weekday("*").unwrap(), "*");
        assert_eq!(expand_weekday("0").unwrap(), "SUN");
        assert_eq!(expand_weekday("7").unwrap(), "SUN");
        assert_eq!(expand_weekday("7-7").unwrap(), "SUN");
        assert_eq!(expand_weekday("1-5").unwrap(), "MON,TUE,WED,THU,FRI");
        assert_eq!(expand_weekday("0,6").unwrap(), "SUN,SAT");
        assert_eq!(expand_weekday("1-7").unwrap(), "SUN,MON,TUE,WED,THU,FRI,SAT");
        assert_eq!(expand_weekday("*/2").unwrap(), "SUN,TUE,THU,SAT");
        assert_eq!(expand_weekday("2-7/2").unwrap(), "TUE,THU,SAT");
        assert_eq!(expand_weekday("mon-fri").unwrap(), "MON,TUE,WED,THU,FRI");
        assert!(expand_weekday("5-1").is_err());
        assert!(expand_weekday("*/0").is_err());
        assert!(expand_weekday("funday").is_err());
    }
}
