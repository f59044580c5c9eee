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

//! Crate-wide error type. Module-scoped errors (`StoreError`, `HealthError`,
//! `ApprovalError`, `ExecutorError`, `PipelineError`, `RoutineError`)
//! convert into `EngineError` via `#[from]` at crate boundaries.

use thiserror::Error;

use crate::approvals::ApprovalError;
use crate::executor::ExecutorError;
use crate::health::HealthError;
use crate::pipeline::PipelineError;
use crate::routines::RoutineError;
use crate::scheduler::SchedulerError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Routine(#[from] RoutineError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
