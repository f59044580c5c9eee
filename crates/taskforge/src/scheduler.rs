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

//! Three periodic ticks that drive task dispatch: ScheduleTick (approve
//! and launch work), PollTick (reconcile in-flight dispatch bookkeeping),
//! and ResumeTick (wake tasks parked on a premium-CLI health limit).
//!
//! Unlike the original job-queue design this is ported from, a dispatched
//! task's [`crate::pipeline::PipelineEngine::run`] runs its whole pipeline
//! to completion inside one spawned task rather than handing off to an
//! external worker polled later — so PollTick's role narrows to clearing
//! the in-flight marker once the runner finishes and logging a summary;
//! stale-crash recovery is `idle_autostart`'s job (see [`crate::routines`]).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::health::HealthState;
use crate::pipeline::PipelineEngine;
use crate::store::{Database, StoreError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Health(#[from] crate::health::HealthError),
}

pub struct TaskScheduler {
    db: Database,
    engine: Arc<PipelineEngine>,
    health: crate::health::HealthMonitor,
    config: EngineConfig,
}

impl TaskScheduler {
    pub fn new(
        db: Database,
        engine: Arc<PipelineEngine>,
        health: crate::health::HealthMonitor,
        config: EngineConfig,
    ) -> Self {
        Self { db, engine, health, config }
    }

    /// Spawns the three independent tick loops. Returns their join handles
    /// so the caller can hold or abort them; each loop runs until the
    /// process exits.
    pub fn spawn(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let schedule = self.clone();
        let poll = self.clone();
        let resume = self.clone();

        vec![
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(schedule.config.scheduler_tick);
                loop {
                    interval.tick().await;
                    if let Err(e) = schedule.schedule_tick().await {
                        error!(error = %e, "schedule tick failed");
                    }
                }
            }),
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(poll.config.openclaw_poll_interval);
                loop {
                    interval.tick().await;
                    if let Err(e) = poll.poll_tick().await {
                        error!(error = %e, "poll tick failed");
                    }
                }
            }),
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                loop {
                    interval.tick().await;
                    if let Err(e) = resume.resume_tick().await {
                        error!(error = %e, "resume tick failed");
                    }
                }
            }),
        ]
    }

    /// (a) Ensures an outstanding approval decision exists for recurring
    /// tasks entering their approval lead window; (b) dispatches approved
    /// tasks with no in-flight marker.
    pub async fn schedule_tick(&self) -> Result<(), SchedulerError> {
        let mut approvals_ensured = 0u32;
        let mut dispatched = 0u32;

        let candidates = self.db.tasks().list_by_status("pending").await?;
        let lead = chrono::Duration::from_std(self.config.schedule_approval_lead).unwrap_or_default();
        let now = Utc::now();
        for task in candidates {
            if !task.requires_approval || !task.is_recurring {
                continue;
            }
            let Some(next_run_at) = task.next_run_at.as_deref().and_then(crate::store::parse_ts) else {
                continue;
            };
            if next_run_at - now > lead {
                continue;
            }
            if self
                .db
                .decisions()
                .find_pending("task", task.id, "start_task")
                .await?
                .is_some()
            {
                continue;
            }
            if let Err(e) = self.ensure_approval_decision(task.id).await {
                warn!(task_id = task.id, error = %e, "failed to create approval decision");
                continue;
            }
            approvals_ensured += 1;
        }

        let approved = self.db.tasks().list_by_status("approved").await?;
        for task in approved {
            if task.openclaw_job_id.is_some() {
                continue;
            }
            let ready = match task.next_run_at.as_deref().and_then(crate::store::parse_ts) {
                Some(next_run_at) => next_run_at <= now,
                None => true,
            };
            if !ready {
                continue;
            }
            if let Err(e) = self.dispatch(task.id).await {
                warn!(task_id = task.id, error = %e, "failed to dispatch task");
                continue;
            }
            dispatched += 1;
        }

        debug!(approvals_ensured, dispatched, "schedule tick complete");
        Ok(())
    }

    async fn ensure_approval_decision(&self, task_id: i32) -> Result<(), SchedulerError> {
        let tokens = crate::approvals::ApprovalTokens::new(self.db.clone());
        let _ = tokens
            .create_decision("task", task_id, "start_task", self.config.approval_ttl)
            .await
            .map_err(|e| SchedulerError::Store(StoreError::NotFound(e.to_string())))?;
        Ok(())
    }

    /// Transitions a task to `active`, marks it in-flight, and spawns a
    /// detached task running the pipeline to completion. Shared by the
    /// schedule tick and by [`crate::routines::RoutinesEngine`]'s
    /// per-idle-agent dispatch step.
    pub(crate) async fn dispatch(&self, task_id: i32) -> Result<(), SchedulerError> {
        self.db.tasks().set_status(task_id, "active").await?;
        self.db
            .tasks()
            .set_external_job(task_id, Some(&format!("local:{task_id}")), Some("running"))
            .await?;

        let db = self.db.clone();
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let result = engine.run(task_id).await;
            if let Err(e) = &result {
                error!(task_id, error = %e, "pipeline run failed");
                let _ = db.tasks().set_result(task_id, "", Some(&e.to_string())).await;
                let _ = db.tasks().set_status(task_id, "blocked").await;
            }
            let _ = db.tasks().set_external_job(task_id, None, None).await;
        });

        Ok(())
    }

    /// Reconciles in-flight bookkeeping. The pipeline runner already
    /// clears a task's external-job marker on completion, so in steady
    /// state this tick only logs a count for observability.
    pub async fn poll_tick(&self) -> Result<(), SchedulerError> {
        let in_flight = self.db.tasks().list_by_status("active").await?;
        let still_running = in_flight.iter().filter(|t| t.openclaw_job_status.as_deref() == Some("running")).count();
        debug!(still_running, "poll tick complete");
        Ok(())
    }

    /// Wakes tasks parked on a premium-CLI health limit once the monitor
    /// reports HEALTHY again.
    pub async fn resume_tick(&self) -> Result<(), SchedulerError> {
        if self.health.get_state().await? != HealthState::Healthy {
            return Ok(());
        }

        let parked = self.db.tasks().list_by_statuses(&["paused_limit", "queued_for_claude"]).await?;
        let mut resumed = 0u32;
        for task in parked {
            self.db.tasks().set_status(task.id, "active").await?;
            self.db
                .tasks()
                .set_external_job(task.id, Some(&format!("local:{}", task.id)), Some("running"))
                .await?;

            let db = self.db.clone();
            let engine = self.engine.clone();
            let task_id = task.id;
            tokio::spawn(async move {
                let result = engine.run(task_id).await;
                if let Err(e) = &result {
                    error!(task_id, error = %e, "resumed pipeline run failed");
                    let _ = db.tasks().set_result(task_id, "", Some(&e.to_string())).await;
                    let _ = db.tasks().set_status(task_id, "blocked").await;
                }
                let _ = db.tasks().set_external_job(task_id, None, None).await;
            });
            resumed += 1;
        }

        debug!(resumed, "resume tick complete");
        Ok(())
    }
}
