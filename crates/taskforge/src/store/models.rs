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

//! Diesel row types. Timestamps are stored as RFC3339 text (SQLite has no
//! native datetime type); conversion to/from `chrono::DateTime<Utc>` is the
//! caller's job via [`crate::store::parse_ts`] / [`crate::store::format_ts`].

use diesel::prelude::*;

use super::schema::*;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = agents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Agent {
    pub id: i32,
    pub name: String,
    pub role: String,
    pub model: String,
    pub pipeline_id: Option<i32>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = agents)]
pub struct NewAgent {
    pub name: String,
    pub role: String,
    pub model: String,
    pub pipeline_id: Option<i32>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = pipelines)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Pipeline {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub task_type: String,
    pub blocks_json: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pipelines)]
pub struct NewPipeline {
    pub name: String,
    pub description: String,
    pub task_type: String,
    pub blocks_json: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Task {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub status: String,
    pub assigned_agent_id: Option<i32>,
    pub due_date: Option<String>,
    pub is_critical: bool,
    pub requires_approval: bool,
    pub schedule_type: String,
    pub cron_expr: Option<String>,
    pub interval_minutes: Option<i32>,
    pub is_recurring: bool,
    pub next_run_at: Option<String>,
    pub last_run_at: Option<String>,
    pub last_result: String,
    pub last_error: Option<String>,
    pub review_summary: String,
    pub retry_count: i32,
    pub openclaw_job_id: Option<String>,
    pub openclaw_job_status: Option<String>,
    pub openclaw_last_status_payload: String,
    pub resume_block_index: Option<i32>,
    pub resume_pipeline_ref: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
    pub review_notes: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: String,
    pub assigned_agent_id: Option<i32>,
    pub due_date: Option<String>,
    pub is_critical: bool,
    pub requires_approval: bool,
    pub schedule_type: String,
    pub cron_expr: Option<String>,
    pub interval_minutes: Option<i32>,
    pub is_recurring: bool,
    pub next_run_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(primary_key(decision_id))]
#[diesel(table_name = decisions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Decision {
    pub decision_id: String,
    pub entity_type: String,
    pub entity_id: i32,
    pub action: String,
    pub status: String,
    pub token_hash: String,
    pub token_salt: String,
    pub expires_at: Option<String>,
    pub requested_at: String,
    pub decided_at: Option<String>,
    pub requester: String,
    pub decider_ip: Option<String>,
    pub decider_ua: Option<String>,
    pub result_markdown: String,
    pub error: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = decisions)]
pub struct NewDecision {
    pub decision_id: String,
    pub entity_type: String,
    pub entity_id: i32,
    pub action: String,
    pub status: String,
    pub token_hash: String,
    pub token_salt: String,
    pub expires_at: Option<String>,
    pub requested_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = critiques)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Critique {
    pub id: i32,
    pub task_id: Option<i32>,
    pub title: String,
    pub body: String,
    pub severity: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = critiques)]
pub struct NewCritique {
    pub task_id: Option<i32>,
    pub title: String,
    pub body: String,
    pub severity: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = action_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ActionLog {
    pub id: i32,
    pub ts: String,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = action_logs)]
pub struct NewActionLog {
    pub ts: String,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(primary_key(id))]
#[diesel(table_name = routines)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Routine {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub is_enabled: bool,
    pub agent_id: Option<i32>,
    pub claim_unassigned: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = routines)]
pub struct NewRoutine {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub is_enabled: bool,
    pub agent_id: Option<i32>,
    pub claim_unassigned: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(primary_key(agent_id))]
#[diesel(table_name = agent_runtime)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AgentRuntime {
    pub agent_id: i32,
    pub was_running: bool,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = executor_log)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ExecutorLogEntry {
    pub id: i32,
    pub task_id: i32,
    pub pipeline_id: Option<i32>,
    pub block_index: i32,
    pub block_kind: String,
    pub model: Option<String>,
    pub executor: Option<String>,
    pub started_at: String,
    pub duration_ms: i64,
    pub success: bool,
    pub pass_fail: Option<String>,
    pub review_notes: String,
    pub output_preview: String,
    pub failure_type: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = executor_log)]
pub struct NewExecutorLogEntry {
    pub task_id: i32,
    pub pipeline_id: Option<i32>,
    pub block_index: i32,
    pub block_kind: String,
    pub model: Option<String>,
    pub executor: Option<String>,
    pub started_at: String,
    pub duration_ms: i64,
    pub success: bool,
    pub pass_fail: Option<String>,
    pub review_notes: String,
    pub output_preview: String,
    pub failure_type: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, AsChangeset)]
#[diesel(primary_key(id))]
#[diesel(table_name = claude_health)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HealthRow {
    pub id: i32,
    pub state: String,
    pub last_success: Option<String>,
    pub last_failure: Option<String>,
    pub last_failure_type: Option<String>,
    pub consecutive_failures: i32,
    pub daily_invocations: i32,
    pub daily_reset_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(primary_key(job_id))]
#[diesel(table_name = local_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LocalJob {
    pub job_id: String,
    pub status: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub payload: String,
    pub result: String,
    pub error: Option<String>,
    pub logs: String,
    pub used_model: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = local_jobs)]
pub struct NewLocalJob {
    pub job_id: String,
    pub status: String,
    pub created_at: String,
    pub payload: String,
}
