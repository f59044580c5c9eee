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

//! Premium CLI adapter: spawns the `claude -p <prompt>` subprocess under
//! a bounded timeout, classifies the outcome via [`crate::health::classify`],
//! and feeds the result into the shared [`HealthMonitor`] so the state
//! machine and the rolling-duration/consecutive-rate-limit tracking stay
//! consistent across every invocation regardless of caller.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::{AdapterResult, ExecutorAdapter, ExecutorError};
use crate::config::EngineConfig;
use crate::health::{self, FailureType, HealthMonitor};

pub struct PremiumCliAdapter {
    health: HealthMonitor,
    timeout: std::time::Duration,
    binary: String,
}

impl PremiumCliAdapter {
    pub fn new(health: HealthMonitor, config: &EngineConfig) -> Self {
        Self {
            health,
            timeout: config.claude_cli_timeout,
            binary: "claude".to_string(),
        }
    }
}

#[async_trait]
impl ExecutorAdapter for PremiumCliAdapter {
    fn name(&self) -> &'static str {
        "claude_cli"
    }

    async fn run(&self, prompt: &str, _model: &str) -> Result<AdapterResult, ExecutorError> {
        let started = Instant::now();
        let rolling_average = self.health.rolling_average();

        let spawned = Command::new(&self.binary)
            .arg("-p")
            .arg(prompt)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let elapsed = started.elapsed();
                self.health.record(FailureType::Error, elapsed).await?;
                return Ok(AdapterResult::failure(
                    self.name(),
                    elapsed,
                    FailureType::Error,
                    "claude CLI not found on PATH",
                ));
            }
            Err(e) => {
                let elapsed = started.elapsed();
                self.health.record(FailureType::Error, elapsed).await?;
                return Ok(AdapterResult::failure(self.name(), elapsed, FailureType::Error, e.to_string()));
            }
        };

        let wait_result = tokio::time::timeout(self.timeout, child.wait()).await;

        let status = match wait_result {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                let elapsed = started.elapsed();
                self.health.record(FailureType::Error, elapsed).await?;
                return Ok(AdapterResult::failure(self.name(), elapsed, FailureType::Error, e.to_string()));
            }
            Err(_) => {
                let _ = child.kill().await;
                let elapsed = started.elapsed();
                self.health.record(FailureType::Timeout, elapsed).await?;
                return Ok(AdapterResult::failure(
                    self.name(),
                    elapsed,
                    FailureType::Timeout,
                    format!("timeout after {:?}", self.timeout),
                ));
            }
        };

        let elapsed = started.elapsed();

        let mut stdout = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout).await;
        }
        let mut stderr = String::new();
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr).await;
        }
        let combined = format!("{stdout}\n{stderr}");

        let failure_type = health::classify(
            status.code().unwrap_or(-1),
            &combined,
            false,
            elapsed,
            rolling_average,
        );
        self.health.record(failure_type, elapsed).await?;

        if failure_type == FailureType::Success {
            Ok(AdapterResult::ok(self.name(), elapsed, stdout))
        } else {
            let error = if stderr.trim().is_empty() {
                combined
            } else {
                stderr
            };
            Ok(AdapterResult::failure(self.name(), elapsed, failure_type, error))
        }
    }
}
