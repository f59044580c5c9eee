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

//! Engine configuration, loaded from environment variables (optionally via
//! a `.env` file through `dotenvy`). See spec §6's environment variable
//! table for the recognized names; every field has a conservative default
//! so the engine can start with no configuration at all.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub public_base_url: Option<String>,
    pub approver_email: Option<String>,
    pub scheduler_tick: Duration,
    pub openclaw_poll_interval: Duration,
    pub routines_tick: Duration,
    pub schedule_approval_lead: Duration,
    pub claude_cli_timeout: Duration,
    pub claude_consecutive_rate_limits_for_daily: u32,
    pub claude_rate_limit_window: Duration,
    pub claude_unavailable_cooldown: Duration,
    pub approval_ttl: Duration,
    pub auto_critical_keywords: Vec<String>,
    pub database_url: String,
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub openclaw_base_url: Option<String>,
    pub openclaw_auth_token: Option<String>,
    pub remote_llm_timeout: Duration,
    pub local_job_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            public_base_url: None,
            approver_email: None,
            scheduler_tick: Duration::from_secs(20),
            openclaw_poll_interval: Duration::from_secs(20),
            routines_tick: Duration::from_secs(10),
            schedule_approval_lead: Duration::from_secs(300),
            claude_cli_timeout: Duration::from_secs(300),
            claude_consecutive_rate_limits_for_daily: 3,
            claude_rate_limit_window: Duration::from_secs(10 * 60),
            claude_unavailable_cooldown: Duration::from_secs(30 * 60),
            approval_ttl: Duration::from_secs(3600),
            auto_critical_keywords: default_critical_keywords(),
            database_url: "taskforge.db".to_string(),
            openrouter_api_key: None,
            openrouter_base_url: "https://openrouter.ai/api/v1".to_string(),
            openclaw_base_url: None,
            openclaw_auth_token: None,
            remote_llm_timeout: Duration::from_secs(120),
            local_job_timeout: Duration::from_secs(300),
        }
    }
}

fn default_critical_keywords() -> Vec<String> {
    [
        "critical",
        "important",
        "blocker",
        "security",
        "vulnerability",
        "risk",
        "exploit",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl EngineConfig {
    /// Loads configuration from the process environment, falling back to
    /// defaults for anything unset. Call `dotenvy::dotenv().ok()` before
    /// this if a `.env` file should be honored.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("PUBLIC_BASE_URL") {
            cfg.public_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("APPROVER_EMAIL") {
            cfg.approver_email = Some(v);
        }
        if let Ok(v) = std::env::var("SCHEDULER_TICK_SECONDS") {
            cfg.scheduler_tick = parse_secs("SCHEDULER_TICK_SECONDS", &v)?;
        }
        if let Ok(v) = std::env::var("OPENCLAW_POLL_SECONDS") {
            cfg.openclaw_poll_interval = parse_secs("OPENCLAW_POLL_SECONDS", &v)?;
        }
        if let Ok(v) = std::env::var("ROUTINES_TICK_SECONDS") {
            cfg.routines_tick = parse_secs("ROUTINES_TICK_SECONDS", &v)?;
        }
        if let Ok(v) = std::env::var("SCHEDULE_APPROVAL_LEAD_SECONDS") {
            cfg.schedule_approval_lead = parse_secs("SCHEDULE_APPROVAL_LEAD_SECONDS", &v)?;
        }
        if let Ok(v) = std::env::var("CLAUDE_CLI_TIMEOUT_SECONDS") {
            cfg.claude_cli_timeout = parse_secs("CLAUDE_CLI_TIMEOUT_SECONDS", &v)?;
        }
        if let Ok(v) = std::env::var("CLAUDE_CONSECUTIVE_RATE_LIMITS_FOR_DAILY") {
            cfg.claude_consecutive_rate_limits_for_daily =
                parse_u32("CLAUDE_CONSECUTIVE_RATE_LIMITS_FOR_DAILY", &v)?;
        }
        if let Ok(v) = std::env::var("CLAUDE_RATE_LIMIT_WINDOW_MINUTES") {
            cfg.claude_rate_limit_window =
                Duration::from_secs(60 * u64::from(parse_u32("CLAUDE_RATE_LIMIT_WINDOW_MINUTES", &v)?));
        }
        if let Ok(v) = std::env::var("CLAUDE_UNAVAILABLE_COOLDOWN_MINUTES") {
            cfg.claude_unavailable_cooldown = Duration::from_secs(
                60 * u64::from(parse_u32("CLAUDE_UNAVAILABLE_COOLDOWN_MINUTES", &v)?),
            );
        }
        if let Ok(v) = std::env::var("APPROVAL_TTL_HOURS") {
            cfg.approval_ttl =
                Duration::from_secs(3600 * u64::from(parse_u32("APPROVAL_TTL_HOURS", &v)?));
        }
        if let Ok(v) = std::env::var("AUTO_CRITICAL_KEYWORDS") {
            cfg.auto_critical_keywords = v
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("TASKFORGE_DATABASE_URL") {
            cfg.database_url = v;
        }
        if let Ok(v) = std::env::var("OPENROUTER_API_KEY") {
            cfg.openrouter_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("OPENROUTER_BASE_URL") {
            cfg.openrouter_base_url = v;
        }
        if let Ok(v) = std::env::var("OPENCLAW_BASE_URL") {
            cfg.openclaw_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("OPENCLAW_AUTH_TOKEN").or_else(|_| std::env::var("OPENCLAW_TOKEN")) {
            cfg.openclaw_auth_token = Some(v);
        }
        if let Ok(v) = std::env::var("REMOTE_LLM_TIMEOUT_SECONDS") {
            cfg.remote_llm_timeout = parse_secs("REMOTE_LLM_TIMEOUT_SECONDS", &v)?;
        }
        if let Ok(v) = std::env::var("LOCAL_JOB_TIMEOUT_SECONDS") {
            cfg.local_job_timeout = parse_secs("LOCAL_JOB_TIMEOUT_SECONDS", &v)?;
        }

        Ok(cfg)
    }
}

fn parse_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: "must be a non-negative integer number of seconds",
    })?;
    Ok(Duration::from_secs(secs))
}

fn parse_u32(name: &'static str, value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: "must be a non-negative integer",
    })
}
