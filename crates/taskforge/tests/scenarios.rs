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

//! End-to-end scenarios driving the real `PipelineEngine`, `HealthMonitor`
//! and `ApprovalTokens` together through a single in-memory (or, where a
//! scenario needs a second connection, file-backed) database, rather than
//! unit-testing any one of them in isolation.

pub mod support;

mod approval_flow;
mod auth_failure;
mod escalation_queue;
mod happy_path;
mod retry_loop;
mod stale_job_recovery;
