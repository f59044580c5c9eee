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

//! Uniform adapter surface over the three backends a pipeline block can
//! run a model on: a remote OpenAI-compatible gateway, an in-process
//! local job queue that wraps the same gateway, and the premium CLI
//! subprocess. `PipelineEngine` never talks to any of these directly —
//! only through [`ExecutorAdapter::run`].

pub mod local_job;
pub mod premium_cli;
pub mod remote_llm;

use async_trait::async_trait;
use thiserror::Error;

use crate::health::FailureType;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Health(#[from] crate::health::HealthError),
}

/// The result of one adapter invocation. Classified failures are not
/// Rust errors — they are ordinary outcomes the pipeline reacts to —
/// so `run` returns this directly rather than wrapping it in `Result`
/// except for genuinely exceptional conditions (store/health failures).
#[derive(Debug, Clone)]
pub struct AdapterResult {
    pub success: bool,
    pub output: String,
    pub duration: std::time::Duration,
    pub error: Option<String>,
    pub failure_type: Option<FailureType>,
    pub executor: &'static str,
}

impl AdapterResult {
    fn failure(executor: &'static str, duration: std::time::Duration, failure_type: FailureType, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            duration,
            error: Some(error.into()),
            failure_type: Some(failure_type),
            executor,
        }
    }

    fn ok(executor: &'static str, duration: std::time::Duration, output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            duration,
            error: None,
            failure_type: Some(FailureType::Success),
            executor,
        }
    }
}

#[async_trait]
pub trait ExecutorAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, prompt: &str, model: &str) -> Result<AdapterResult, ExecutorError>;
}

/// Classifies a completed HTTP response the way spec §4.6 requires for
/// both the remote-gateway and local-job adapters: 401 → AUTH, 429 →
/// RATE_LIMIT, 5xx → ERROR. Any other non-2xx status is ERROR as well.
pub(crate) fn classify_http_status(status: reqwest::StatusCode) -> FailureType {
    if status.as_u16() == 401 || status.as_u16() == 403 {
        FailureType::Auth
    } else if status.as_u16() == 429 {
        FailureType::RateLimit
    } else {
        FailureType::Error
    }
}
