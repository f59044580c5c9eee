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

//! PipelineEngine: walks a pipeline's block sequence for one task,
//! dispatching each block to an [`ExecutorAdapter`], logging every step,
//! and driving the task's status machine (active → dev_done/done, or
//! blocked/paused_limit/queued_for_claude on escalation limits).

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::agent_files::AgentFiles;
use crate::executor::{AdapterResult, ExecutorAdapter};
use crate::health::{HealthMonitor, HealthState};
use crate::store::models::{NewExecutorLogEntry, Task};
use crate::store::{Database, StoreError};

const OUTPUT_PREVIEW_LEN: usize = 2000;
const DEFAULT_PIPELINE_TASK_TYPE: &str = "default";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Executor(#[from] crate::executor::ExecutorError),

    #[error(transparent)]
    Health(#[from] crate::health::HealthError),

    #[error("task {0} has no resolvable pipeline")]
    NoPipeline(i32),

    #[error("pipeline {0} has malformed blocks_json: {1}")]
    MalformedBlocks(i32, String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

fn cfg_str<'a>(config: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(|v| v.as_str())
}

fn cfg_u32(config: &serde_json::Value, key: &str, default: u32) -> u32 {
    config.get(key).and_then(|v| v.as_u64()).map(|v| v as u32).unwrap_or(default)
}

fn cfg_bool(config: &serde_json::Value, key: &str, default: bool) -> bool {
    config.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

/// Parses a reviewer's output into PASS/FAIL per spec's case-insensitive
/// rule: a `"verdict"` JSON fragment containing `"fail"`, or the trimmed
/// text starting with `fail`, or containing `\nfail`, means FAIL.
pub fn parse_verdict(output: &str) -> bool {
    let lower = output.to_lowercase();

    if let Some(idx) = lower.find("\"verdict\"") {
        let tail = &lower[idx..];
        if tail.contains("fail") {
            return false;
        }
    }

    let trimmed = lower.trim_start();
    if trimmed.starts_with("fail") {
        return false;
    }
    if lower.contains("\nfail") {
        return false;
    }

    true
}

pub struct PipelineEngine {
    db: Database,
    health: HealthMonitor,
    agent_files: AgentFiles,
    remote_llm: Arc<dyn ExecutorAdapter>,
    local_job: Arc<dyn ExecutorAdapter>,
    premium_cli: Arc<dyn ExecutorAdapter>,
}

impl PipelineEngine {
    pub fn new(
        db: Database,
        health: HealthMonitor,
        agent_files: AgentFiles,
        remote_llm: Arc<dyn ExecutorAdapter>,
        local_job: Arc<dyn ExecutorAdapter>,
        premium_cli: Arc<dyn ExecutorAdapter>,
    ) -> Self {
        Self {
            db,
            health,
            agent_files,
            remote_llm,
            local_job,
            premium_cli,
        }
    }

    fn adapter_for(&self, name: &str) -> Arc<dyn ExecutorAdapter> {
        match name {
            "local" | "local_job" => self.local_job.clone(),
            "premium" | "premium_cli" | "claude" | "claude_cli" => self.premium_cli.clone(),
            _ => self.remote_llm.clone(),
        }
    }

    async fn resolve_pipeline_id(&self, task: &Task) -> Result<i32, PipelineError> {
        if let Some(pipeline_ref) = task.resume_pipeline_ref {
            return Ok(pipeline_ref);
        }
        if let Some(agent_id) = task.assigned_agent_id {
            let agent = self.db.agents().get(agent_id).await?;
            if let Some(pipeline_id) = agent.pipeline_id {
                return Ok(pipeline_id);
            }
        }
        if let Some(pipeline) = self.db.pipelines().find_by_task_type(DEFAULT_PIPELINE_TASK_TYPE).await? {
            return Ok(pipeline.id);
        }
        Err(PipelineError::NoPipeline(task.id))
    }

    fn build_prompt(&self, task: &Task, agent_name: &str, agent_role: &str, review_notes: Option<&str>, prior_output: Option<&str>) -> String {
        let system = self.agent_files.system_prompt(agent_name, agent_role);
        let mut sections = vec![
            system,
            format!("## Task: {}\n\n{}", task.title, task.description),
        ];
        if let Some(prior) = prior_output {
            sections.push(format!("## Prior Output\n\n{prior}"));
        }
        if let Some(notes) = review_notes {
            sections.push(format!("## Reviewer Notes\n\n{notes}"));
        }
        sections.join("\n\n")
    }

    async fn log_step(
        &self,
        task_id: i32,
        pipeline_id: i32,
        block_index: usize,
        block_kind: &str,
        model: Option<&str>,
        result: Option<&AdapterResult>,
        pass_fail: Option<&str>,
    ) -> Result<(), PipelineError> {
        let (executor, duration_ms, success, output_preview, failure_type, error) = match result {
            Some(r) => (
                Some(r.executor.to_string()),
                r.duration.as_millis() as i64,
                r.success,
                r.output.chars().take(OUTPUT_PREVIEW_LEN).collect::<String>(),
                r.failure_type.map(|f| f.as_str().to_string()),
                r.error.clone(),
            ),
            None => (None, 0, true, String::new(), None, None),
        };

        self.db
            .executor_log()
            .append(NewExecutorLogEntry {
                task_id,
                pipeline_id: Some(pipeline_id),
                block_index: block_index as i32,
                block_kind: block_kind.to_string(),
                model: model.map(str::to_string),
                executor,
                started_at: crate::store::now_ts(),
                duration_ms,
                success,
                pass_fail: pass_fail.map(str::to_string),
                review_notes: String::new(),
                output_preview,
                failure_type,
                error,
            })
            .await?;
        Ok(())
    }

    /// Resolves the task's pipeline, walks its blocks from index 0 or
    /// from the persisted resume pointer, and drives the task's status
    /// to completion, a suspension point, or `blocked`.
    pub async fn run(&self, task_id: i32) -> Result<(), PipelineError> {
        let mut task = self.db.tasks().get(task_id).await?;
        let pipeline_id = self.resolve_pipeline_id(&task).await?;
        let pipeline = self.db.pipelines().get(pipeline_id).await?;

        let blocks: Vec<Block> = serde_json::from_str(&pipeline.blocks_json)
            .map_err(|e| PipelineError::MalformedBlocks(pipeline_id, e.to_string()))?;

        if task.status == "done" || (task.status == "blocked" && !task.is_recurring) {
            return Ok(());
        }

        let (agent_name, agent_role, default_model) = match task.assigned_agent_id {
            Some(agent_id) => {
                let agent = self.db.agents().get(agent_id).await?;
                (agent.name, agent.role, agent.model)
            }
            None => ("unassigned".to_string(), "general".to_string(), "openai/gpt-4o-mini".to_string()),
        };

        if task.status != "active" {
            self.db.tasks().set_status(task_id, "active").await?;
            self.db
                .action_log()
                .append(crate::audit::log_task_dispatched(task_id, pipeline_id))
                .await?;
        }

        let start_index = task.resume_block_index.map(|i| i as usize).unwrap_or(0);
        let mut index = start_index;
        let mut last_review_notes: Option<String> = None;

        while index < blocks.len() {
            let block = &blocks[index];
            match block.kind.as_str() {
                "route" => {
                    self.log_step(task_id, pipeline_id, index, "route", None, None, None).await?;
                }

                "executor" => {
                    let model = cfg_str(&block.config, "model").unwrap_or(&default_model).to_string();
                    let executor_name = cfg_str(&block.config, "executor").unwrap_or("remote");
                    let prompt = self.build_prompt(&task, &agent_name, &agent_role, None, None);

                    let adapter = self.adapter_for(executor_name);
                    let result = adapter.run(&prompt, &model).await?;
                    self.log_step(task_id, pipeline_id, index, "executor", Some(&model), Some(&result), None)
                        .await?;

                    if result.success {
                        self.db.tasks().set_result(task_id, &result.output, None).await?;
                        task = self.db.tasks().get(task_id).await?;
                    } else {
                        self.db.tasks().set_result(task_id, "", result.error.as_deref()).await?;
                        task = self.db.tasks().get(task_id).await?;
                        if index + 1 == blocks.len() {
                            self.fail_block(task_id, "executor failed with no recovery block").await?;
                            return Ok(());
                        }
                    }
                }

                "review" => {
                    let model = cfg_str(&block.config, "model").unwrap_or(&default_model).to_string();
                    let executor_name = cfg_str(&block.config, "executor").unwrap_or("remote");
                    let prompt = self.build_prompt(&task, &agent_name, "reviewing", None, Some(&task.last_result));

                    let adapter = self.adapter_for(executor_name);
                    let result = adapter.run(&prompt, &model).await?;

                    let passed = result.success && parse_verdict(&result.output);
                    self.log_step(
                        task_id,
                        pipeline_id,
                        index,
                        "review",
                        Some(&model),
                        Some(&result),
                        Some(if passed { "pass" } else { "fail" }),
                    )
                    .await?;

                    self.db.tasks().set_review_summary(task_id, &result.output).await?;

                    if passed {
                        last_review_notes = None;
                        let pass_action = cfg_str(&block.config, "pass_action").unwrap_or("skip_to_done");
                        if pass_action == "skip_to_done" {
                            if let Some(done_idx) = blocks.iter().position(|b| b.kind == "done") {
                                index = done_idx;
                                continue;
                            }
                        }
                    } else {
                        last_review_notes = Some(result.output.clone());
                        self.db.tasks().set_review_notes(task_id, &result.output).await?;
                    }
                }

                "retry" => {
                    let max_retries = cfg_u32(&block.config, "max_retries", 1);
                    let include_notes = cfg_bool(&block.config, "include_review_notes", false);

                    if task.retry_count < max_retries as i32 {
                        if let Some(exec_idx) = blocks[..index].iter().rposition(|b| b.kind == "executor") {
                            let exec_block = &blocks[exec_idx];
                            let model = cfg_str(&exec_block.config, "model").unwrap_or(&default_model).to_string();
                            let executor_name = cfg_str(&exec_block.config, "executor").unwrap_or("remote");
                            let notes = if include_notes { last_review_notes.as_deref() } else { None };
                            let prompt = self.build_prompt(&task, &agent_name, &agent_role, notes, Some(&task.last_result));

                            let new_count = self.db.tasks().increment_retry_count(task_id).await?;
                            self.db
                                .action_log()
                                .append(crate::audit::log_task_retry(task_id, new_count))
                                .await?;

                            let adapter = self.adapter_for(executor_name);
                            let result = adapter.run(&prompt, &model).await?;
                            self.log_step(task_id, pipeline_id, index, "retry", Some(&model), Some(&result), None)
                                .await?;

                            if result.success {
                                self.db.tasks().set_result(task_id, &result.output, None).await?;
                            } else {
                                self.db.tasks().set_result(task_id, "", result.error.as_deref()).await?;
                            }
                            task = self.db.tasks().get(task_id).await?;
                        } else {
                            self.log_step(task_id, pipeline_id, index, "retry", None, None, None).await?;
                        }
                    } else {
                        self.log_step(task_id, pipeline_id, index, "retry", None, None, None).await?;
                    }
                }

                "escalate" => {
                    let on_limit = cfg_str(&block.config, "on_limit").unwrap_or("stop").to_string();
                    let pre_state = self.health.get_state().await?;

                    if matches!(pre_state, HealthState::DailyLimitHit | HealthState::AuthFailed | HealthState::Unavailable) {
                        self.suspend_on_limit(task_id, pipeline_id, index, pre_state, &on_limit).await?;
                        return Ok(());
                    }

                    let prompt = self.build_prompt(&task, &agent_name, &agent_role, last_review_notes.as_deref(), Some(&task.last_result));
                    let result = self.premium_cli.run(&prompt, &default_model).await?;
                    self.log_step(task_id, pipeline_id, index, "escalate", Some(&default_model), Some(&result), None)
                        .await?;

                    // premium_cli.run already recorded this outcome with the health
                    // monitor; re-reading state here (instead of recording again)
                    // avoids double-counting the invocation.
                    let post_state = self.health.get_state().await?;

                    if result.success {
                        self.db.tasks().set_result(task_id, &result.output, None).await?;
                        task = self.db.tasks().get(task_id).await?;
                    } else if matches!(post_state, HealthState::DailyLimitHit | HealthState::AuthFailed | HealthState::Unavailable) {
                        self.db.tasks().set_result(task_id, "", result.error.as_deref()).await?;
                        self.suspend_on_limit(task_id, pipeline_id, index, post_state, &on_limit).await?;
                        return Ok(());
                    } else {
                        self.fail_block(task_id, result.error.as_deref().unwrap_or("escalate failed")).await?;
                        return Ok(());
                    }
                }

                "done" => {
                    // Terminal bookkeeping only — not an executor invocation,
                    // so it doesn't add its own executor_log row; the action
                    // log entry below is the record of this transition.
                    self.db.tasks().set_status(task_id, "done").await?;
                    self.db.tasks().set_resume_pointer(task_id, None, None).await?;
                    self.db
                        .action_log()
                        .append(crate::audit::log_task_completed(task_id))
                        .await?;
                    info!(task_id, "task reached done");
                    self.reschedule_if_recurring(&task).await?;
                    return Ok(());
                }

                other => {
                    warn!(task_id, block_kind = other, "unrecognized block kind; skipping");
                    self.log_step(task_id, pipeline_id, index, other, None, None, None).await?;
                }
            }

            index += 1;
        }

        // Fell off the end of the block list without an explicit `done`.
        self.db.tasks().set_status(task_id, "dev_done").await?;
        self.db.tasks().set_resume_pointer(task_id, None, None).await?;
        Ok(())
    }

    async fn suspend_on_limit(
        &self,
        task_id: i32,
        pipeline_id: i32,
        block_index: usize,
        state: HealthState,
        on_limit: &str,
    ) -> Result<(), PipelineError> {
        if on_limit == "queue" {
            self.db
                .tasks()
                .set_resume_pointer(task_id, Some(block_index as i32), Some(pipeline_id))
                .await?;
            let status = if state == HealthState::DailyLimitHit {
                "queued_for_claude"
            } else {
                "paused_limit"
            };
            self.db.tasks().set_status(task_id, status).await?;
            self.db
                .action_log()
                .append(crate::audit::log_task_escalated(task_id, block_index as i32, true))
                .await?;
        } else {
            self.db.tasks().set_status(task_id, "blocked").await?;
            self.db
                .action_log()
                .append(crate::audit::log_task_escalated(task_id, block_index as i32, false))
                .await?;
            self.db
                .action_log()
                .append(crate::audit::log_task_blocked(
                    task_id,
                    &format!("premium CLI health is {}", state.as_str()),
                ))
                .await?;
        }
        Ok(())
    }

    /// Folds a recurring task that just reached `done` back to `pending`
    /// (or straight to `approved` if it no longer requires approval),
    /// with a fresh `next_run_at` computed from its schedule policy. A
    /// non-recurring task's `done` is left exactly as §3 invariant (d)
    /// requires: terminal.
    async fn reschedule_if_recurring(&self, task: &Task) -> Result<(), PipelineError> {
        if !task.is_recurring {
            return Ok(());
        }

        let next_run = crate::recurrence::next_run_after(
            &task.schedule_type,
            task.cron_expr.as_deref(),
            task.interval_minutes,
            chrono::Utc::now(),
        );
        let next_run = match next_run {
            Ok(next_run) => next_run,
            Err(e) => {
                warn!(task_id = task.id, error = %e, "failed to compute next run for recurring task");
                return Ok(());
            }
        };

        self.db
            .tasks()
            .set_next_run_at(task.id, next_run.map(crate::store::format_ts).as_deref())
            .await?;
        self.db.tasks().reset_retry_count(task.id).await?;
        let next_status = if task.requires_approval { "pending" } else { "approved" };
        self.db.tasks().set_status(task.id, next_status).await?;
        info!(task_id = task.id, next_status, "recurring task rescheduled");
        Ok(())
    }

    async fn fail_block(&self, task_id: i32, reason: &str) -> Result<(), PipelineError> {
        self.db.tasks().set_status(task_id, "blocked").await?;
        self.db
            .action_log()
            .append(crate::audit::log_task_blocked(task_id, reason))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_verdict_pass_by_default() {
        assert!(parse_verdict("Looks good.\nverdict: pass"));
    }

    #[test]
    fn parse_verdict_detects_fail_prefix() {
        assert!(!parse_verdict("FAIL: missing import"));
    }

    #[test]
    fn parse_verdict_detects_json_verdict_fail() {
        assert!(!parse_verdict(r#"{"verdict": "FAIL - missing tests"}"#));
    }

    #[test]
    fn parse_verdict_detects_embedded_fail_line() {
        assert!(!parse_verdict("Summary ok\nfail: edge case not handled"));
    }
}
