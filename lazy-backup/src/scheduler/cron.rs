//! Cron expression parsing.
//!
//! Expressions carry six whitespace-separated fields
//! (`sec min hour day-of-month month day-of-week`) or an `@`-descriptor
//! such as `@daily` or `@hourly`. Numeric days of week run 0-6 from Sunday.
//! Schedules are evaluated in a configurable time zone; fire times are
//! reported in UTC.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::{Error, Result};

const CRON_FIELDS: usize = 6;
const DAY_OF_WEEK_FIELD: usize = 5;

/// A parsed, validated cron schedule.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
    timezone: Tz,
}

/// Rewrite one numeric day-of-week value from 0-6 (Sunday first) to the
/// 1-7 numbering the `cron` crate uses. Names pass through unchanged.
fn shift_day_value(value: &str, expression: &str) -> Result<String> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(value.to_string());
    }
    match value.parse::<u8>() {
        Ok(day) if day <= 6 => Ok((day + 1).to_string()),
        _ => Err(Error::validation(format!(
            "invalid cron expression '{expression}': day of week {value} is outside 0-6"
        ))),
    }
}

/// Translate the day-of-week field, leaving step sizes alone.
fn translate_day_of_week(field: &str, expression: &str) -> Result<String> {
    let mut parts = Vec::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };
        let range = range
            .split('-')
            .map(|value| shift_day_value(value, expression))
            .collect::<Result<Vec<_>>>()?
            .join("-");
        parts.push(match step {
            Some(step) => format!("{range}/{step}"),
            None => range,
        });
    }
    Ok(parts.join(","))
}

impl CronSchedule {
    /// Parse an expression evaluated in UTC.
    pub fn parse(expression: &str) -> Result<Self> {
        Self::parse_in(expression, chrono_tz::UTC)
    }

    /// Parse an expression evaluated in `timezone`, rejecting anything but six
    /// fields or a descriptor.
    pub fn parse_in(expression: &str, timezone: Tz) -> Result<Self> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("cron expression must not be empty"));
        }

        let normalized = if trimmed.starts_with('@') {
            trimmed.to_string()
        } else {
            let mut fields: Vec<String> = trimmed.split_whitespace().map(str::to_string).collect();
            if fields.len() != CRON_FIELDS {
                return Err(Error::validation(format!(
                    "invalid cron expression '{trimmed}': expected {CRON_FIELDS} fields, got {}",
                    fields.len()
                )));
            }
            let day_of_week = translate_day_of_week(&fields[DAY_OF_WEEK_FIELD], trimmed)?;
            fields[DAY_OF_WEEK_FIELD] = day_of_week;
            fields.join(" ")
        };

        let schedule = cron::Schedule::from_str(&normalized)
            .map_err(|e| Error::validation(format!("invalid cron expression '{trimmed}': {e}")))?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
            timezone,
        })
    }

    /// The expression as written.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.upcoming_from(after, 1).into_iter().next()
    }

    /// The next `count` fire times strictly after `after`.
    pub fn upcoming_from(&self, after: &DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .take(count)
            .map(|t| t.with_timezone(&Utc))
            .collect()
    }
}

/// Validate an expression without keeping the parsed schedule.
pub fn validate_cron_expression(expression: &str) -> Result<()> {
    CronSchedule::parse(expression).map(|_| ())
}

/// The next `count` fire times from now, evaluated in UTC.
pub fn next_run_times(expression: &str, count: usize) -> Result<Vec<DateTime<Utc>>> {
    next_run_times_in(expression, chrono_tz::UTC, count)
}

/// The next `count` fire times from now, evaluated in `timezone`.
pub fn next_run_times_in(
    expression: &str,
    timezone: Tz,
    count: usize,
) -> Result<Vec<DateTime<Utc>>> {
    let schedule = CronSchedule::parse_in(expression, timezone)?;
    Ok(schedule.upcoming_from(&Utc::now(), count))
}

/// Parse an IANA zone name such as `Asia/Tokyo`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse()
        .map_err(|_| Error::validation(format!("'{name}' is not a valid IANA timezone")))
}
