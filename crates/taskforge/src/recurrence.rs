/*
 *  Copyright 2026 Taskforge Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Computes a recurring task's next `next_run_at` from its schedule
//! policy (spec §3's `schedule policy (none | interval(minutes) |
//! cron(expr))`). [`crate::pipeline::PipelineEngine`] calls this when a
//! recurring task reaches `done`, to fold it back to `pending` (or
//! `approved`, if it no longer requires approval) with a fresh
//! `next_run_at` instead of leaving it terminal.

use chrono::{DateTime, Duration, Utc};
use croner::Cron;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecurrenceError {
    #[error("invalid cron expression '{0}': {1}")]
    InvalidCron(String, String),

    #[error("cron expression '{0}' has no next occurrence")]
    NoNextOccurrence(String),
}

/// Returns the next run time after `after`, given a task's schedule
/// fields. `schedule_type = "none"` (or anything unrecognized) yields
/// `None`, meaning the task does not recur on a timer.
pub fn next_run_after(
    schedule_type: &str,
    cron_expr: Option<&str>,
    interval_minutes: Option<i32>,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, RecurrenceError> {
    match schedule_type {
        "interval" => {
            let minutes = interval_minutes.unwrap_or(0).max(1);
            Ok(Some(after + Duration::minutes(minutes as i64)))
        }
        "cron" => {
            let Some(expr) = cron_expr else { return Ok(None) };
            let cron = Cron::new(expr)
                .parse()
                .map_err(|e| RecurrenceError::InvalidCron(expr.to_string(), e.to_string()))?;
            let next = cron
                .find_next_occurrence(&after, false)
                .map_err(|_| RecurrenceError::NoNextOccurrence(expr.to_string()))?;
            Ok(Some(next))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn none_schedule_never_recurs() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(next_run_after("none", None, None, after).unwrap().is_none());
    }

    #[test]
    fn interval_schedule_adds_minutes() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = next_run_after("interval", None, Some(30), after).unwrap().unwrap();
        assert_eq!(next, after + Duration::minutes(30));
    }

    #[test]
    fn interval_schedule_floors_at_one_minute() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = next_run_after("interval", None, Some(0), after).unwrap().unwrap();
        assert_eq!(next, after + Duration::minutes(1));
    }

    #[test]
    fn cron_schedule_finds_next_midnight() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let next = next_run_after("cron", Some("0 0 * * *"), None, after).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn malformed_cron_expression_is_an_error() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(next_run_after("cron", Some("not a cron"), None, after).is_err());
    }
}
