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

//! Self-healing / auto-advancement loops. Each enabled [`crate::store::models::Routine`]
//! is dispatched by `kind` on every routines tick; a failure in one routine
//! is logged and never prevents the others from running that tick.

use chrono::{Duration as ChronoDuration, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::scheduler::TaskScheduler;
use crate::store::models::{NewTask, Task};
use crate::store::{parse_ts, Database, StoreError};

const MAX_RETRIES: i32 = 3;
const STALE_RUNNING_MINUTES: i64 = 10;
const STATUS_REPORT_INTERVAL_MINUTES: i64 = 30;
const STATUS_REPORT_MIN_TASKS: usize = 10;

const HELPER_PREFIXES: [&str; 3] = ["Review:", "Resolve:", "Plan:"];

#[derive(Debug, Error)]
pub enum RoutineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Health(#[from] crate::health::HealthError),

    #[error(transparent)]
    Scheduler(#[from] crate::scheduler::SchedulerError),
}

fn is_helper_title(title: &str) -> bool {
    HELPER_PREFIXES.iter().any(|p| title.starts_with(p))
}

fn review_marker(task_id: i32) -> String {
    format!("[review_of_task_id:{task_id}]")
}

fn resolve_marker(task_id: i32) -> String {
    format!("[resolve_blocked_task_id:{task_id}]")
}

/// Ported verbatim (spec §4.4 `status_report_email` qualification rule)
/// from the original's `is_important`: a helper task only counts toward
/// the report threshold if it (or its title/description/last_result)
/// mentions one of the critical keywords, or is itself flagged critical.
fn is_important(task: &Task, keywords: &[String]) -> bool {
    if !is_helper_title(&task.title) {
        return true;
    }
    if task.is_critical {
        return true;
    }
    let haystack = format!("{} {} {}", task.title, task.description, task.last_result).to_lowercase();
    keywords.iter().any(|k| haystack.contains(k.as_str()))
}

pub struct RoutinesEngine {
    db: Database,
    scheduler: std::sync::Arc<TaskScheduler>,
    auto_critical_keywords: Vec<String>,
}

impl RoutinesEngine {
    pub fn new(db: Database, scheduler: std::sync::Arc<TaskScheduler>, auto_critical_keywords: Vec<String>) -> Self {
        Self {
            db,
            scheduler,
            auto_critical_keywords,
        }
    }

    /// Spawns the routines tick loop. Runs until the process exits.
    pub fn spawn(self: std::sync::Arc<Self>, tick: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                if let Err(e) = self.run_tick().await {
                    error!(error = %e, "routines tick failed");
                }
            }
        })
    }

    /// Runs every enabled routine once, isolating failures per-routine so
    /// one broken routine never blocks the others in the same tick.
    pub async fn run_tick(&self) -> Result<(), RoutineError> {
        let routines = self.db.routines().list_enabled().await?;
        for routine in routines {
            let result = match routine.kind.as_str() {
                "idle_autostart" => self.idle_autostart(routine.claim_unassigned).await,
                "review_autocreate" => self.review_autocreate().await,
                "blocked_resolution" => self.blocked_resolution().await,
                "planning_next_phase" => self.planning_next_phase().await,
                "status_report_email" => self.status_report_email().await,
                other => {
                    warn!(kind = other, routine_id = %routine.id, "unrecognized routine kind; skipping");
                    Ok(())
                }
            };
            if let Err(e) = result {
                error!(routine_id = %routine.id, kind = %routine.kind, error = %e, "routine failed");
            }
        }
        Ok(())
    }

    /// Steps (0)-(vii) of spec §4.4, in the load-bearing order documented
    /// in the expanded spec: stale reset, completed promotion,
    /// retry-or-exhaust, stale-field clearing, auto-approval, claiming,
    /// then per-agent dispatch.
    async fn idle_autostart(&self, claim_unassigned: bool) -> Result<(), RoutineError> {
        self.reset_stale_running().await?;
        self.advance_completed_to_dev_done().await?;
        self.retry_or_exhaust_failed().await?;
        self.clear_stale_external_fields().await?;
        self.auto_approve_non_critical_pending().await?;
        if claim_unassigned {
            self.claim_unassigned_for_idle_agents().await?;
        }
        self.dispatch_per_idle_agent().await?;
        Ok(())
    }

    async fn reset_stale_running(&self) -> Result<(), RoutineError> {
        let active = self.db.tasks().list_by_status("active").await?;
        let cutoff = Utc::now() - ChronoDuration::minutes(STALE_RUNNING_MINUTES);
        for task in active {
            if task.openclaw_job_status.as_deref() != Some("running") {
                continue;
            }
            let Some(updated_at) = parse_ts(&task.updated_at) else { continue };
            if updated_at >= cutoff {
                continue;
            }
            self.db.tasks().set_result(task.id, &task.last_result, Some("stale_running_reset")).await?;
            self.db.tasks().set_status(task.id, "approved").await?;
            self.db.tasks().set_external_job(task.id, None, None).await?;
            self.db
                .action_log()
                .append(crate::audit::log_routine_stale_reset(task.id))
                .await?;
        }
        Ok(())
    }

    async fn advance_completed_to_dev_done(&self) -> Result<(), RoutineError> {
        let active = self.db.tasks().list_by_status("active").await?;
        for task in active {
            if task.openclaw_job_status.as_deref() == Some("completed") {
                self.db.tasks().set_status(task.id, "dev_done").await?;
                self.db.tasks().set_external_job(task.id, None, None).await?;
            }
        }
        Ok(())
    }

    async fn retry_or_exhaust_failed(&self) -> Result<(), RoutineError> {
        let active = self.db.tasks().list_by_status("active").await?;
        for task in active {
            if task.openclaw_job_status.as_deref() != Some("failed") {
                continue;
            }
            if task.retry_count < MAX_RETRIES {
                self.db.tasks().increment_retry_count(task.id).await?;
                self.db.tasks().set_external_job(task.id, None, None).await?;
                self.db.tasks().set_status(task.id, "approved").await?;
                self.db
                    .action_log()
                    .append(crate::audit::log_task_retry(task.id, task.retry_count + 1))
                    .await?;
            } else {
                self.db.tasks().set_external_job(task.id, None, None).await?;
                self.db.tasks().set_result(task.id, "", Some("max_retries_exceeded")).await?;
                self.db.tasks().set_status(task.id, "blocked").await?;
                self.db
                    .action_log()
                    .append(crate::audit::log_task_blocked(task.id, "max_retries_exceeded"))
                    .await?;
            }
        }
        Ok(())
    }

    async fn clear_stale_external_fields(&self) -> Result<(), RoutineError> {
        for status in ["pending", "approved"] {
            let tasks = self.db.tasks().list_by_status(status).await?;
            for task in tasks {
                if task.openclaw_job_id.is_some() || task.openclaw_job_status.is_some() {
                    self.db.tasks().set_external_job(task.id, None, None).await?;
                }
            }
        }
        Ok(())
    }

    async fn auto_approve_non_critical_pending(&self) -> Result<(), RoutineError> {
        let pending = self.db.tasks().list_by_status("pending").await?;
        for task in pending {
            if task.is_critical {
                continue;
            }
            self.db.tasks().set_status(task.id, "approved").await?;
            self.db
                .action_log()
                .append(crate::audit::log_task_approved(task.id, "auto"))
                .await?;
        }
        Ok(())
    }

    /// An agent is idle iff it has no task in `{active}` or with an
    /// external-job state in `{queued, running}` (spec §4.4 parenthetical).
    async fn claim_unassigned_for_idle_agents(&self) -> Result<(), RoutineError> {
        let unassigned = self.db.tasks().list_approved_unassigned().await?;
        if unassigned.is_empty() {
            return Ok(());
        }
        let agents = self.db.agents().list_active().await?;
        let mut queue = unassigned.into_iter();
        for agent in agents {
            if self.db.tasks().agent_is_busy(agent.id).await? {
                continue;
            }
            let Some(task) = queue.next() else { break };
            self.db.tasks().assign_agent(task.id, agent.id).await?;
        }
        Ok(())
    }

    async fn dispatch_per_idle_agent(&self) -> Result<(), RoutineError> {
        let agents = self.db.agents().list_active().await?;
        for agent in agents {
            if self.db.tasks().agent_is_busy(agent.id).await? {
                continue;
            }
            if let Some(task) = self.db.tasks().find_oldest_approved_for_agent(agent.id).await? {
                self.scheduler.dispatch(task.id).await?;
            }
        }
        Ok(())
    }

    /// Ensures a companion `Review:` task for every task in `{dev_done,
    /// review}`. Never recurses: review tasks themselves never qualify
    /// (they're excluded from the source scan by title prefix).
    async fn review_autocreate(&self) -> Result<(), RoutineError> {
        let mut candidates = self.db.tasks().list_by_status("dev_done").await?;
        candidates.extend(self.db.tasks().list_by_status("review").await?);

        for task in candidates {
            if is_helper_title(&task.title) {
                continue;
            }
            let marker = review_marker(task.id);
            let existing = self.db.tasks().find_by_description_marker(&marker).await?;

            let should_create = match existing.iter().max_by_key(|t| t.id) {
                None => true,
                Some(prior) => prior.status == "done" && prior.last_error.as_deref().is_some_and(|e| !e.is_empty()),
            };
            if !should_create {
                continue;
            }

            let reviewer = self.db.agents().find_by_role("reviewing").await?;
            let helper = self
                .db
                .tasks()
                .create(NewTask {
                    title: format!("Review: Task #{} — {}", task.id, task.title),
                    description: format!("{marker}\n\nReview the output of task #{}.", task.id),
                    status: "approved".to_string(),
                    assigned_agent_id: reviewer.map(|a| a.id),
                    due_date: None,
                    is_critical: false,
                    requires_approval: false,
                    schedule_type: "none".to_string(),
                    cron_expr: None,
                    interval_minutes: None,
                    is_recurring: false,
                    next_run_at: None,
                    created_at: String::new(),
                    updated_at: String::new(),
                })
                .await?;

            self.db
                .action_log()
                .append(crate::audit::log_routine_helper_created("review_autocreate", task.id, helper.id))
                .await?;
        }
        Ok(())
    }

    /// Creates at most one `Resolve:` helper per tick (the original's
    /// `LIMIT 1`), and applies any already-completed resolve helper back
    /// onto its source task.
    async fn blocked_resolution(&self) -> Result<(), RoutineError> {
        let blocked = self.db.tasks().list_by_status("blocked").await?;
        let architect = self.db.agents().find_by_role("architecture").await?;

        let mut created = 0u32;
        let mut waiting = 0u32;
        for task in &blocked {
            let marker = resolve_marker(task.id);
            let existing = self.db.tasks().find_by_description_marker(&marker).await?;

            if let Some(helper) = existing.iter().find(|h| h.status == "done") {
                self.db.tasks().set_review_summary(task.id, &helper.last_result).await?;
                self.db.tasks().reset_retry_count(task.id).await?;
                self.db.tasks().set_status(task.id, "approved").await?;
                self.db.tasks().delete(helper.id).await?;
                self.db
                    .action_log()
                    .append(crate::audit::log_routine_helper_resolved(task.id, helper.id))
                    .await?;
                continue;
            }
            if !existing.is_empty() {
                continue;
            }

            if created >= 1 {
                waiting += 1;
                continue;
            }

            let helper = self
                .db
                .tasks()
                .create(NewTask {
                    title: format!("Resolve: Task #{} — {}", task.id, task.title),
                    description: format!(
                        "{marker}\n\nlast_error: {}\n\nlast_result:\n{}",
                        task.last_error.as_deref().unwrap_or(""),
                        task.last_result,
                    ),
                    status: "approved".to_string(),
                    assigned_agent_id: architect.as_ref().map(|a| a.id),
                    due_date: None,
                    is_critical: task.is_critical,
                    requires_approval: false,
                    schedule_type: "none".to_string(),
                    cron_expr: None,
                    interval_minutes: None,
                    is_recurring: false,
                    next_run_at: None,
                    created_at: String::new(),
                    updated_at: String::new(),
                })
                .await?;
            self.db
                .action_log()
                .append(crate::audit::log_routine_helper_created("blocked_resolution", task.id, helper.id))
                .await?;
            created += 1;
        }

        if waiting > 0 {
            info!(waiting, "blocked_resolution throughput cap reached this tick");
        }
        Ok(())
    }

    /// When there's no "real" outstanding work and no outstanding `Plan:`
    /// task, asks the architect for the next batch of work.
    async fn planning_next_phase(&self) -> Result<(), RoutineError> {
        let open = self.db.tasks().list_not_in_statuses(&["done", "blocked"]).await?;
        let real_open = open.iter().any(|t| !is_helper_title(&t.title));
        if real_open {
            return Ok(());
        }

        let all = self.db.tasks().list_all().await?;
        let has_open_plan = all
            .iter()
            .any(|t| t.title.starts_with("Plan:") && t.status != "done" && t.status != "blocked");
        if has_open_plan {
            return Ok(());
        }

        let done_titles: Vec<&str> = all.iter().filter(|t| t.status == "done").map(|t| t.title.as_str()).collect();
        let blocked_titles: Vec<&str> = all.iter().filter(|t| t.status == "blocked").map(|t| t.title.as_str()).collect();

        let architect = self.db.agents().find_by_role("architecture").await?;
        let helper = self
            .db
            .tasks()
            .create(NewTask {
                title: "Plan: next phase".to_string(),
                description: format!(
                    "Done:\n{}\n\nBlocked:\n{}\n\nPropose the next 3-8 tasks.",
                    done_titles.join("\n"),
                    blocked_titles.join("\n"),
                ),
                status: "approved".to_string(),
                assigned_agent_id: architect.map(|a| a.id),
                due_date: None,
                is_critical: false,
                requires_approval: false,
                schedule_type: "none".to_string(),
                cron_expr: None,
                interval_minutes: None,
                is_recurring: false,
                next_run_at: None,
                created_at: String::new(),
                updated_at: String::new(),
            })
            .await?;

        self.db
            .action_log()
            .append(crate::audit::log_routine_helper_created("planning_next_phase", 0, helper.id))
            .await?;
        Ok(())
    }

    /// Every ≥30 min, if at least 10 qualifying tasks reached `done`
    /// since the last report, sends a summary and persists the
    /// watermark in `routine_state`.
    async fn status_report_email(&self) -> Result<(), RoutineError> {
        const ROUTINE_ID: &str = "status_report_email";

        let last_sent_at = self.db.routines().get_state(ROUTINE_ID, "last_sent_at").await?;
        if let Some(ts) = last_sent_at.as_deref().and_then(parse_ts) {
            if Utc::now() - ts < ChronoDuration::minutes(STATUS_REPORT_INTERVAL_MINUTES) {
                return Ok(());
            }
        }

        let max_processed_id: i32 = self
            .db
            .routines()
            .get_state(ROUTINE_ID, "max_processed_done_id")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let done = self.db.tasks().list_by_status("done").await?;
        let qualifying: Vec<&Task> = done
            .iter()
            .filter(|t| t.id > max_processed_id)
            .filter(|t| is_important(t, &self.auto_critical_keywords))
            .collect();

        if qualifying.len() < STATUS_REPORT_MIN_TASKS {
            return Ok(());
        }

        let new_max = qualifying.iter().map(|t| t.id).max().unwrap_or(max_processed_id);
        let body = render_status_report(&qualifying);

        let sender = crate::email::LoggingEmailSender;
        crate::email::EmailSender::send(&sender, "Taskforge status report", &body).await;

        self.db
            .routines()
            .set_state(ROUTINE_ID, "last_sent_at", &crate::store::now_ts())
            .await?;
        self.db
            .routines()
            .set_state(ROUTINE_ID, "max_processed_done_id", &new_max.to_string())
            .await?;
        Ok(())
    }
}

fn render_status_report(tasks: &[&Task]) -> String {
    let mut html = String::from("<h1>Taskforge status report</h1><ul>");
    for task in tasks {
        html.push_str(&format!("<li>#{} — {}</li>", task.id, task.title));
    }
    html.push_str("</ul>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_titles_are_recognized_by_prefix() {
        assert!(is_helper_title("Review: Task #1 — foo"));
        assert!(is_helper_title("Resolve: Task #1 — foo"));
        assert!(is_helper_title("Plan: next phase"));
        assert!(!is_helper_title("Implement login"));
    }

    fn sample_task(title: &str, description: &str, is_critical: bool) -> Task {
        Task {
            id: 1,
            title: title.to_string(),
            description: description.to_string(),
            status: "done".to_string(),
            assigned_agent_id: None,
            due_date: None,
            is_critical,
            requires_approval: false,
            schedule_type: "none".to_string(),
            cron_expr: None,
            interval_minutes: None,
            is_recurring: false,
            next_run_at: None,
            last_run_at: None,
            last_result: String::new(),
            last_error: None,
            review_summary: String::new(),
            retry_count: 0,
            openclaw_job_id: None,
            openclaw_job_status: None,
            openclaw_last_status_payload: String::new(),
            resume_block_index: None,
            resume_pipeline_ref: None,
            created_at: String::new(),
            updated_at: String::new(),
            review_notes: String::new(),
        }
    }

    #[test]
    fn non_helper_tasks_are_always_important() {
        let keywords = vec!["security".to_string()];
        let t = sample_task("Implement login", "", false);
        assert!(is_important(&t, &keywords));
    }

    #[test]
    fn helper_tasks_require_critical_flag_or_keyword() {
        let keywords = vec!["security".to_string()];
        let plain = sample_task("Review: Task #1 — foo", "routine review", false);
        assert!(!is_important(&plain, &keywords));

        let critical = sample_task("Review: Task #1 — foo", "routine review", true);
        assert!(is_important(&critical, &keywords));

        let keyword_hit = sample_task("Review: Task #1 — foo", "found a security issue", false);
        assert!(is_important(&keyword_hit, &keywords));
    }

    async fn memdb() -> Database {
        let db = Database::new(":memory:").unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    fn make_scheduler(db: Database) -> std::sync::Arc<TaskScheduler> {
        let health = crate::health::HealthMonitor::new(db.clone());
        let agent_files = crate::agent_files::AgentFiles::new(std::env::temp_dir());
        let remote = std::sync::Arc::new(NoopAdapter);
        let engine = std::sync::Arc::new(crate::pipeline::PipelineEngine::new(
            db.clone(),
            health.clone(),
            agent_files,
            remote.clone(),
            remote.clone(),
            remote,
        ));
        let config = crate::config::EngineConfig::default();
        std::sync::Arc::new(TaskScheduler::new(db, engine, health, config))
    }

    #[tokio::test]
    async fn idle_autostart_leaves_recently_running_task_untouched() {
        let db = memdb().await;
        let task = db
            .tasks()
            .create(NewTask {
                title: "do the thing".into(),
                description: "".into(),
                status: "pending".into(),
                assigned_agent_id: None,
                due_date: None,
                is_critical: false,
                requires_approval: false,
                schedule_type: "none".into(),
                cron_expr: None,
                interval_minutes: None,
                is_recurring: false,
                next_run_at: None,
                created_at: String::new(),
                updated_at: String::new(),
            })
            .await
            .unwrap();
        db.tasks().set_status(task.id, "active").await.unwrap();
        db.tasks()
            .set_external_job(task.id, Some("local:1"), Some("running"))
            .await
            .unwrap();

        let scheduler = make_scheduler(db.clone());
        let routines = RoutinesEngine::new(db.clone(), scheduler, vec![]);
        routines.reset_stale_running().await.unwrap();

        let reloaded = db.tasks().get(task.id).await.unwrap();
        assert_eq!(reloaded.status, "active");
        assert_eq!(reloaded.openclaw_job_status.as_deref(), Some("running"));
    }

    #[tokio::test]
    async fn auto_approve_skips_critical_pending_tasks() {
        let db = memdb().await;
        let normal = db
            .tasks()
            .create(NewTask {
                title: "routine work".into(),
                description: "".into(),
                status: "pending".into(),
                assigned_agent_id: None,
                due_date: None,
                is_critical: false,
                requires_approval: true,
                schedule_type: "none".into(),
                cron_expr: None,
                interval_minutes: None,
                is_recurring: false,
                next_run_at: None,
                created_at: String::new(),
                updated_at: String::new(),
            })
            .await
            .unwrap();
        let critical = db
            .tasks()
            .create(NewTask {
                title: "dangerous deploy".into(),
                description: "".into(),
                status: "pending".into(),
                assigned_agent_id: None,
                due_date: None,
                is_critical: true,
                requires_approval: true,
                schedule_type: "none".into(),
                cron_expr: None,
                interval_minutes: None,
                is_recurring: false,
                next_run_at: None,
                created_at: String::new(),
                updated_at: String::new(),
            })
            .await
            .unwrap();

        let scheduler = make_scheduler(db.clone());
        let routines = RoutinesEngine::new(db.clone(), scheduler, vec![]);
        routines.auto_approve_non_critical_pending().await.unwrap();

        assert_eq!(db.tasks().get(normal.id).await.unwrap().status, "approved");
        assert_eq!(db.tasks().get(critical.id).await.unwrap().status, "pending");
    }

    #[tokio::test]
    async fn blocked_resolution_creates_helper_only_once() {
        let db = memdb().await;
        let task = db
            .tasks()
            .create(NewTask {
                title: "flaky deploy".into(),
                description: "".into(),
                status: "pending".into(),
                assigned_agent_id: None,
                due_date: None,
                is_critical: false,
                requires_approval: false,
                schedule_type: "none".into(),
                cron_expr: None,
                interval_minutes: None,
                is_recurring: false,
                next_run_at: None,
                created_at: String::new(),
                updated_at: String::new(),
            })
            .await
            .unwrap();
        db.tasks().set_result(task.id, "", Some("boom")).await.unwrap();
        db.tasks().set_status(task.id, "blocked").await.unwrap();

        let scheduler = make_scheduler(db.clone());
        let routines = RoutinesEngine::new(db.clone(), scheduler, vec![]);
        routines.blocked_resolution().await.unwrap();
        routines.blocked_resolution().await.unwrap();

        let helpers = db.tasks().find_by_description_marker(&resolve_marker(task.id)).await.unwrap();
        assert_eq!(helpers.len(), 1);
        assert!(helpers[0].title.starts_with("Resolve:"));
    }

    struct NoopAdapter;

    #[async_trait::async_trait]
    impl crate::executor::ExecutorAdapter for NoopAdapter {
        fn name(&self) -> &'static str {
            "noop"
        }
        async fn run(
            &self,
            _prompt: &str,
            _model: &str,
        ) -> Result<crate::executor::AdapterResult, crate::executor::ExecutorError> {
            unreachable!("not exercised by this test")
        }
    }
}
