// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Routine schedule expressions.
//!
//! Accepted forms:
//!
//! | Form | Example |
//! |------|---------|
//! | 5-field cron | `*/5 * * * *` |
//! | 6-field cron (seconds first) | `30 */5 * * * *` |
//! | descriptor | `@hourly`, `@daily`, `@weekly`, `@monthly`, `@yearly` |
//! | fixed interval | `@every 30s`, `@every 5m`, `@every 2h` |

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use croner::Cron;
use thiserror::Error;

/// Errors parsing a schedule expression.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The expression is empty.
    #[error("empty schedule")]
    Empty,

    /// An `@every` interval could not be parsed.
    #[error("invalid interval '{0}': expected @every <n><s|m|h> with n > 0")]
    InvalidInterval(String),

    /// The cron expression was rejected.
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron {
        /// The rejected expression.
        expr: String,
        /// Parser message.
        reason: String,
    },
}

/// A parsed schedule.
pub enum Schedule {
    /// Calendar schedule.
    Cron {
        /// Original expression.
        expr: String,
        /// Parsed pattern.
        cron: Box<Cron>,
    },
    /// Fires every fixed interval, counted from the previous firing.
    Every(Duration),
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Cron { expr, .. } => f.debug_tuple("Cron").field(expr).finish(),
            Schedule::Every(interval) => f.debug_tuple("Every").field(interval).finish(),
        }
    }
}

impl Schedule {
    /// Parse a schedule expression.
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ScheduleError::Empty);
        }

        if let Some(interval) = expr.strip_prefix("@every") {
            return parse_interval(interval.trim())
                .map(Schedule::Every)
                .ok_or_else(|| ScheduleError::InvalidInterval(expr.to_string()));
        }

        let cron = Cron::new(expr)
            .with_seconds_optional()
            .parse()
            .map_err(|e| ScheduleError::InvalidCron {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Schedule::Cron {
            expr: expr.to_string(),
            cron: Box::new(cron),
        })
    }

    /// Time to wait from `now` until the next firing.
    ///
    /// `None` when the schedule has no future occurrence.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Schedule::Every(interval) => Some(*interval),
            Schedule::Cron { cron, .. } => {
                let next = cron.find_next_occurrence(&now, false).ok()?;
                Some((next - now).to_std().unwrap_or_default())
            }
        }
    }
}

fn parse_interval(s: &str) -> Option<Duration> {
    let unit = s.chars().last()?;
    let amount: u64 = s[..s.len() - unit.len_utf8()].trim().parse().ok()?;
    if amount == 0 {
        return None;
    }
    let secs = match unit {
        's' => amount,
        'm' => amount.checked_mul(60)?,
        'h' => amount.checked_mul(3600)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_every() {
        assert!(matches!(
            Schedule::parse("@every 30s").unwrap(),
            Schedule::Every(d) if d == Duration::from_secs(30)
        ));
        assert!(matches!(
            Schedule::parse("@every 5m").unwrap(),
            Schedule::Every(d) if d == Duration::from_secs(300)
        ));
        assert!(matches!(
            Schedule::parse("  @every 2h ").unwrap(),
            Schedule::Every(d) if d == Duration::from_secs(7200)
        ));
    }

    #[test]
    fn test_every_invalid() {
        for expr in ["@every", "@every 0s", "@every 10", "@every 3d", "@every xs"] {
            assert!(
                matches!(Schedule::parse(expr), Err(ScheduleError::InvalidInterval(_))),
                "{expr} should be rejected"
            );
        }
    }

    #[test]
    fn test_cron_next() {
        let schedule = Schedule::parse("0 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 0).unwrap();

        assert_eq!(schedule.delay_from(now), Some(Duration::from_secs(45 * 60)));
    }

    #[test]
    fn test_cron_with_seconds() {
        let schedule = Schedule::parse("*/10 * * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 3).unwrap();

        assert_eq!(schedule.delay_from(now), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_descriptor() {
        let schedule = Schedule::parse("@daily").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 23, 0, 0).unwrap();

        assert_eq!(schedule.delay_from(now), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_invalid_cron() {
        assert!(matches!(
            Schedule::parse("every tuesday"),
            Err(ScheduleError::InvalidCron { .. })
        ));
        assert!(matches!(Schedule::parse("  "), Err(ScheduleError::Empty)));
    }
}
