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

//! Premium-CLI executor health state machine. Backed by the singleton
//! `claude_health` row for durability and a process-local rolling-duration
//! history / consecutive-rate-limit window for the fast-path classification
//! that must not survive a restart (spec §9 "Global mutable state").

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use regex::Regex;
use thiserror::Error;

use crate::store::{models::HealthRow, parse_ts, Database, StoreError};

const ROLLING_HISTORY_CAP: usize = 20;
const DEFAULT_CONSECUTIVE_THRESHOLD: u32 = 5;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    AuthFailed,
    DailyLimitHit,
    Unavailable,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "HEALTHY",
            HealthState::Degraded => "DEGRADED",
            HealthState::AuthFailed => "AUTH_FAILED",
            HealthState::DailyLimitHit => "DAILY_LIMIT_HIT",
            HealthState::Unavailable => "UNAVAILABLE",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "DEGRADED" => HealthState::Degraded,
            "AUTH_FAILED" => HealthState::AuthFailed,
            "DAILY_LIMIT_HIT" => HealthState::DailyLimitHit,
            "UNAVAILABLE" => HealthState::Unavailable,
            _ => HealthState::Healthy,
        }
    }
}

/// One classified invocation outcome, as returned by an executor adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    Success,
    Auth,
    RateLimit,
    DailyLimit,
    Timeout,
    Error,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Success => "SUCCESS",
            FailureType::Auth => "AUTH",
            FailureType::RateLimit => "RATE_LIMIT",
            FailureType::DailyLimit => "DAILY_LIMIT",
            FailureType::Timeout => "TIMEOUT",
            FailureType::Error => "ERROR",
        }
    }
}

struct Regexes {
    auth: Regex,
    daily: Regex,
    rate_limit: Regex,
}

impl Default for Regexes {
    fn default() -> Self {
        Self {
            auth: Regex::new(r"(?i)unauthorized|login|session.?expired|auth|token").unwrap(),
            daily: Regex::new(r"(?i)daily.?limit|usage.?limit|limit.?reached|quota.?exceeded").unwrap(),
            rate_limit: Regex::new(r"(?i)rate.?limit|too many requests|throttled|capacity|try again later")
                .unwrap(),
        }
    }
}

/// Classifies a raw premium-CLI invocation result into a [`FailureType`],
/// following spec §4.2's classification rules in order.
pub fn classify(
    exit_code: i32,
    output: &str,
    timed_out: bool,
    elapsed: std::time::Duration,
    rolling_average: Option<std::time::Duration>,
) -> FailureType {
    let re = Regexes::default();

    if timed_out {
        return FailureType::Timeout;
    }

    if exit_code != 0 {
        if re.auth.is_match(output) {
            return FailureType::Auth;
        }
        if re.daily.is_match(output) {
            return FailureType::DailyLimit;
        }
        if re.rate_limit.is_match(output) {
            return FailureType::RateLimit;
        }
        return FailureType::Error;
    }

    // exit == 0, but output may still carry a rate/daily-limit signal,
    // or be suspiciously empty for how long the call took (stealth limit).
    if output.trim().is_empty() {
        if let Some(avg) = rolling_average {
            if !avg.is_zero() && elapsed > avg * 3 {
                return FailureType::RateLimit;
            }
        }
        return FailureType::Error;
    }

    if re.daily.is_match(output) {
        return FailureType::DailyLimit;
    }
    if re.rate_limit.is_match(output) {
        return FailureType::RateLimit;
    }

    FailureType::Success
}

/// Process-local runtime cache: rolling invocation durations and the
/// consecutive-rate-limit timestamp window. Never persisted; lost on
/// restart by design (spec §5, §9).
#[derive(Default)]
struct RuntimeCache {
    rolling_durations: VecDeque<std::time::Duration>,
    consecutive_rate_limits: VecDeque<DateTime<Utc>>,
}

impl RuntimeCache {
    fn push_duration(&mut self, d: std::time::Duration) {
        self.rolling_durations.push_back(d);
        if self.rolling_durations.len() > ROLLING_HISTORY_CAP {
            self.rolling_durations.pop_front();
        }
    }

    fn rolling_average(&self) -> Option<std::time::Duration> {
        if self.rolling_durations.is_empty() {
            return None;
        }
        let total: std::time::Duration = self.rolling_durations.iter().sum();
        Some(total / self.rolling_durations.len() as u32)
    }

    fn record_rate_limit(&mut self, now: DateTime<Utc>, window: ChronoDuration) {
        self.consecutive_rate_limits.push_back(now);
        let cutoff = now - window;
        while self
            .consecutive_rate_limits
            .front()
            .map(|t| *t < cutoff)
            .unwrap_or(false)
        {
            self.consecutive_rate_limits.pop_front();
        }
    }

    fn clear_rate_limits(&mut self) {
        self.consecutive_rate_limits.clear();
    }

    fn rate_limits_in_window(&self, now: DateTime<Utc>, window: ChronoDuration) -> usize {
        let cutoff = now - window;
        self.consecutive_rate_limits.iter().filter(|t| **t >= cutoff).count()
    }
}

#[derive(Clone)]
pub struct HealthMonitor {
    db: Database,
    consecutive_threshold: u32,
    rate_limit_window: ChronoDuration,
    unavailable_cooldown: ChronoDuration,
    cache: Arc<Mutex<RuntimeCache>>,
}

impl HealthMonitor {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            consecutive_threshold: DEFAULT_CONSECUTIVE_THRESHOLD,
            rate_limit_window: ChronoDuration::minutes(10),
            unavailable_cooldown: ChronoDuration::minutes(30),
            cache: Arc::new(Mutex::new(RuntimeCache::default())),
        }
    }

    pub fn with_thresholds(
        mut self,
        consecutive_threshold: u32,
        rate_limit_window: std::time::Duration,
        unavailable_cooldown: std::time::Duration,
    ) -> Self {
        self.consecutive_threshold = consecutive_threshold;
        self.rate_limit_window = ChronoDuration::from_std(rate_limit_window).unwrap_or(self.rate_limit_window);
        self.unavailable_cooldown =
            ChronoDuration::from_std(unavailable_cooldown).unwrap_or(self.unavailable_cooldown);
        self
    }

    pub fn rolling_average(&self) -> Option<std::time::Duration> {
        self.cache.lock().rolling_average()
    }

    /// Reads current state, applying auto-reset rules before returning it.
    pub async fn get_state(&self) -> Result<HealthState, HealthError> {
        let row = self.db.health().get().await?;
        let (state, row) = self.apply_auto_resets(row).await?;
        let _ = row;
        Ok(state)
    }

    async fn apply_auto_resets(&self, mut row: HealthRow) -> Result<(HealthState, HealthRow), HealthError> {
        let now = Utc::now();
        let state = HealthState::parse(&row.state);

        match state {
            HealthState::DailyLimitHit => {
                if let Some(reset_at) = row.daily_reset_at.as_deref().and_then(parse_ts) {
                    if now >= reset_at {
                        row.state = HealthState::Healthy.as_str().to_string();
                        row.consecutive_failures = 0;
                        row.daily_reset_at = Some(crate::store::format_ts(next_midnight_utc(now)));
                        row.updated_at = Some(crate::store::format_ts(now));
                        self.db.health().save(&row).await?;
                        return Ok((HealthState::Healthy, row));
                    }
                }
            }
            HealthState::Unavailable => {
                if let Some(last_failure) = row.last_failure.as_deref().and_then(parse_ts) {
                    if now - last_failure >= self.unavailable_cooldown {
                        row.state = HealthState::Healthy.as_str().to_string();
                        row.consecutive_failures = 0;
                        row.updated_at = Some(crate::store::format_ts(now));
                        self.db.health().save(&row).await?;
                        return Ok((HealthState::Healthy, row));
                    }
                }
            }
            _ => {}
        }

        Ok((state, row))
    }

    /// Records one invocation result, transitioning the singleton health
    /// row per spec §4.2's state table. Returns the resulting state.
    pub async fn record(
        &self,
        failure_type: FailureType,
        elapsed: std::time::Duration,
    ) -> Result<HealthState, HealthError> {
        self.cache.lock().push_duration(elapsed);

        let row = self.db.health().get().await?;
        let (_, mut row) = self.apply_auto_resets(row).await?;
        let current = HealthState::parse(&row.state);
        let now = Utc::now();

        // Daily-limit promotion: N consecutive rate limits within the window.
        let promoted = if failure_type == FailureType::RateLimit {
            self.cache.lock().record_rate_limit(now, self.rate_limit_window);
            let count = self.cache.lock().rate_limits_in_window(now, self.rate_limit_window);
            count as u32 >= self.consecutive_threshold
        } else {
            false
        };

        let effective = if promoted { FailureType::DailyLimit } else { failure_type };

        let next = match (current, effective) {
            (_, FailureType::Success) => {
                self.cache.lock().clear_rate_limits();
                row.last_success = Some(crate::store::format_ts(now));
                row.consecutive_failures = 0;
                HealthState::Healthy
            }
            (HealthState::AuthFailed, _) => HealthState::AuthFailed,
            (HealthState::DailyLimitHit, FailureType::DailyLimit) => HealthState::DailyLimitHit,
            (HealthState::DailyLimitHit, _) => HealthState::DailyLimitHit,
            (HealthState::Unavailable, _) if effective != FailureType::Success => HealthState::Unavailable,
            (_, FailureType::RateLimit) => HealthState::Degraded,
            (_, FailureType::DailyLimit) => {
                row.daily_reset_at = Some(crate::store::format_ts(next_midnight_utc(now)));
                row.daily_invocations += 1;
                HealthState::DailyLimitHit
            }
            (_, FailureType::Auth) => HealthState::AuthFailed,
            (_, FailureType::Timeout) | (_, FailureType::Error) => {
                row.consecutive_failures += 1;
                if row.consecutive_failures >= self.consecutive_threshold as i32 {
                    HealthState::Unavailable
                } else {
                    current
                }
            }
        };

        if effective != FailureType::Success {
            row.last_failure = Some(crate::store::format_ts(now));
            row.last_failure_type = Some(effective.as_str().to_string());
        }

        let from = row.state.clone();
        row.state = next.as_str().to_string();
        row.updated_at = Some(crate::store::format_ts(now));
        self.db.health().save(&row).await?;

        if from != row.state {
            let entry = crate::audit::log_health_state_changed(&from, &row.state, Some(effective.as_str()));
            self.db.action_log().append(entry).await?;
        }

        Ok(next)
    }

    /// Forces the state to HEALTHY and clears counters, as after an
    /// operator re-authenticates the premium CLI out of band.
    pub async fn manual_reset(&self) -> Result<(), HealthError> {
        let mut row = self.db.health().get().await?;
        row.state = HealthState::Healthy.as_str().to_string();
        row.consecutive_failures = 0;
        row.updated_at = Some(crate::store::now_ts());
        self.db.health().save(&row).await?;
        self.cache.lock().clear_rate_limits();
        self.db.action_log().append(crate::audit::log_health_manual_reset()).await?;
        Ok(())
    }
}

fn next_midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = (now + ChronoDuration::days(1)).date_naive();
    tomorrow
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_failure() {
        let ft = classify(1, "Error: session expired, please login again", false, std::time::Duration::from_secs(1), None);
        assert_eq!(ft, FailureType::Auth);
    }

    #[test]
    fn classifies_daily_before_rate_limit() {
        let ft = classify(1, "daily limit reached, try again later", false, std::time::Duration::from_secs(1), None);
        assert_eq!(ft, FailureType::DailyLimit);
    }

    #[test]
    fn classifies_rate_limit() {
        let ft = classify(1, "429 too many requests", false, std::time::Duration::from_secs(1), None);
        assert_eq!(ft, FailureType::RateLimit);
    }

    #[test]
    fn classifies_timeout() {
        let ft = classify(0, "", true, std::time::Duration::from_secs(400), None);
        assert_eq!(ft, FailureType::Timeout);
    }

    #[test]
    fn classifies_stealth_rate_limit_from_empty_output() {
        let avg = std::time::Duration::from_secs(10);
        let ft = classify(0, "", false, std::time::Duration::from_secs(35), Some(avg));
        assert_eq!(ft, FailureType::RateLimit);
    }

    #[test]
    fn empty_history_never_triggers_stealth_promotion() {
        let ft = classify(0, "", false, std::time::Duration::from_secs(600), None);
        assert_eq!(ft, FailureType::Success);
    }

    #[test]
    fn generic_error_on_unmatched_nonzero_exit() {
        let ft = classify(1, "boom", false, std::time::Duration::from_secs(1), None);
        assert_eq!(ft, FailureType::Error);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let db = crate::store::Database::new(":memory:").unwrap();
        db.run_migrations().await.unwrap();
        let hm = HealthMonitor::new(db);
        for _ in 0..3 {
            hm.record(FailureType::Error, std::time::Duration::from_secs(1)).await.unwrap();
        }
        let state = hm.record(FailureType::Success, std::time::Duration::from_secs(1)).await.unwrap();
        assert_eq!(state, HealthState::Healthy);
        let row = hm.db.health().get().await.unwrap();
        assert_eq!(row.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn consecutive_errors_reach_unavailable_at_threshold() {
        let db = crate::store::Database::new(":memory:").unwrap();
        db.run_migrations().await.unwrap();
        let hm = HealthMonitor::new(db);
        let mut last = HealthState::Healthy;
        for _ in 0..DEFAULT_CONSECUTIVE_THRESHOLD {
            last = hm.record(FailureType::Error, std::time::Duration::from_secs(1)).await.unwrap();
        }
        assert_eq!(last, HealthState::Unavailable);
    }

    #[tokio::test]
    async fn one_fewer_than_threshold_does_not_promote() {
        let db = crate::store::Database::new(":memory:").unwrap();
        db.run_migrations().await.unwrap();
        let hm = HealthMonitor::new(db);
        let mut last = HealthState::Healthy;
        for _ in 0..(DEFAULT_CONSECUTIVE_THRESHOLD - 1) {
            last = hm.record(FailureType::Error, std::time::Duration::from_secs(1)).await.unwrap();
        }
        assert_ne!(last, HealthState::Unavailable);
    }

    #[tokio::test]
    async fn auth_failed_requires_manual_reset() {
        let db = crate::store::Database::new(":memory:").unwrap();
        db.run_migrations().await.unwrap();
        let hm = HealthMonitor::new(db);
        hm.record(FailureType::Auth, std::time::Duration::from_secs(1)).await.unwrap();
        let state = hm.record(FailureType::RateLimit, std::time::Duration::from_secs(1)).await.unwrap();
        assert_eq!(state, HealthState::AuthFailed);
        hm.manual_reset().await.unwrap();
        assert_eq!(hm.get_state().await.unwrap(), HealthState::Healthy);
    }
}
