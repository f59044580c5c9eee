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

//! Structured audit log events. Each function here both emits a
//! `tracing` event (for operators tailing logs) and returns the row to be
//! appended to the `action_logs` table (for the durable, queryable trail).

use chrono::Utc;
use tracing::info;

/// String constants for the `action` column, mirrored into the
/// `tracing` event name so log and table agree on vocabulary.
pub mod events {
    pub const TASK_CREATED: &str = "task_created";
    pub const TASK_APPROVED: &str = "task_approved";
    pub const TASK_REJECTED: &str = "task_rejected";
    pub const TASK_DISPATCHED: &str = "task_dispatched";
    pub const TASK_COMPLETED: &str = "task_completed";
    pub const TASK_BLOCKED: &str = "task_blocked";
    pub const TASK_RETRY: &str = "task_retry";
    pub const TASK_ESCALATED_QUEUED: &str = "task_escalated_queued";
    pub const TASK_ESCALATED_STOPPED: &str = "task_escalated_stopped";
    pub const HEALTH_STATE_CHANGED: &str = "health_state_changed";
    pub const HEALTH_MANUAL_RESET: &str = "health_manual_reset";
    pub const DECISION_CREATED: &str = "decision_created";
    pub const DECISION_APPLIED: &str = "decision_applied";
    pub const DECISION_REJECTED_STALE_TOKEN: &str = "decision_rejected_stale_token";
    pub const ROUTINE_STALE_RESET: &str = "routine_stale_reset";
    pub const ROUTINE_HELPER_CREATED: &str = "routine_helper_created";
    pub const ROUTINE_HELPER_RESOLVED: &str = "routine_helper_resolved";
}

#[derive(Debug, Clone)]
pub struct ActionLogRow {
    pub ts: chrono::DateTime<Utc>,
    pub actor: String,
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Option<String>,
    pub detail: String,
}

fn row(action: &'static str, entity_type: &'static str, entity_id: Option<String>, detail: String) -> ActionLogRow {
    ActionLogRow {
        ts: Utc::now(),
        actor: "system".to_string(),
        action,
        entity_type,
        entity_id,
        detail,
    }
}

pub fn log_task_created(task_id: i32, title: &str) -> ActionLogRow {
    info!(event_type = events::TASK_CREATED, task_id, title, "task created");
    row(events::TASK_CREATED, "task", Some(task_id.to_string()), title.to_string())
}

pub fn log_task_approved(task_id: i32, decision_id: &str) -> ActionLogRow {
    info!(event_type = events::TASK_APPROVED, task_id, decision_id, "task approved");
    row(
        events::TASK_APPROVED,
        "task",
        Some(task_id.to_string()),
        format!("decision_id={decision_id}"),
    )
}

pub fn log_task_rejected(task_id: i32, decision_id: &str) -> ActionLogRow {
    info!(event_type = events::TASK_REJECTED, task_id, decision_id, "task rejected");
    row(
        events::TASK_REJECTED,
        "task",
        Some(task_id.to_string()),
        format!("decision_id={decision_id}"),
    )
}

pub fn log_task_completed(task_id: i32) -> ActionLogRow {
    info!(event_type = events::TASK_COMPLETED, task_id, "task completed");
    row(events::TASK_COMPLETED, "task", Some(task_id.to_string()), String::new())
}

pub fn log_task_retry(task_id: i32, attempt: i32) -> ActionLogRow {
    info!(event_type = events::TASK_RETRY, task_id, attempt, "task retried");
    row(events::TASK_RETRY, "task", Some(task_id.to_string()), format!("attempt={attempt}"))
}

pub fn log_task_dispatched(task_id: i32, pipeline_id: i32) -> ActionLogRow {
    info!(event_type = events::TASK_DISPATCHED, task_id, pipeline_id, "dispatching task");
    row(
        events::TASK_DISPATCHED,
        "task",
        Some(task_id.to_string()),
        format!("pipeline_id={pipeline_id}"),
    )
}

pub fn log_task_blocked(task_id: i32, reason: &str) -> ActionLogRow {
    info!(event_type = events::TASK_BLOCKED, task_id, reason, "task blocked");
    row(events::TASK_BLOCKED, "task", Some(task_id.to_string()), reason.to_string())
}

pub fn log_task_escalated(task_id: i32, resume_block_index: i32, queued: bool) -> ActionLogRow {
    let ev = if queued {
        events::TASK_ESCALATED_QUEUED
    } else {
        events::TASK_ESCALATED_STOPPED
    };
    info!(event_type = ev, task_id, resume_block_index, "task escalated to premium CLI");
    row(
        ev,
        "task",
        Some(task_id.to_string()),
        format!("resume_block_index={resume_block_index}"),
    )
}

pub fn log_health_state_changed(from: &str, to: &str, failure_type: Option<&str>) -> ActionLogRow {
    info!(
        event_type = events::HEALTH_STATE_CHANGED,
        from, to, failure_type, "executor health state changed"
    );
    row(
        events::HEALTH_STATE_CHANGED,
        "health",
        None,
        format!("{from} -> {to} ({})", failure_type.unwrap_or("-")),
    )
}

pub fn log_health_manual_reset() -> ActionLogRow {
    info!(event_type = events::HEALTH_MANUAL_RESET, "executor health manually reset");
    row(events::HEALTH_MANUAL_RESET, "health", None, String::new())
}

pub fn log_decision_created(decision_id: &str, entity_type: &'static str, entity_id: i32, action: &str) -> ActionLogRow {
    info!(
        event_type = events::DECISION_CREATED,
        decision_id, entity_type, entity_id, action, "decision created"
    );
    row(
        events::DECISION_CREATED,
        entity_type,
        Some(entity_id.to_string()),
        format!("decision_id={decision_id} action={action}"),
    )
}

pub fn log_decision_applied(decision_id: &str, approved: bool) -> ActionLogRow {
    info!(event_type = events::DECISION_APPLIED, decision_id, approved, "decision applied");
    row(
        events::DECISION_APPLIED,
        "decision",
        Some(decision_id.to_string()),
        format!("approved={approved}"),
    )
}

pub fn log_decision_rejected_stale_token(decision_id: &str) -> ActionLogRow {
    info!(event_type = events::DECISION_REJECTED_STALE_TOKEN, decision_id, "stale or invalid token presented");
    row(
        events::DECISION_REJECTED_STALE_TOKEN,
        "decision",
        Some(decision_id.to_string()),
        String::new(),
    )
}

pub fn log_routine_stale_reset(task_id: i32) -> ActionLogRow {
    info!(event_type = events::ROUTINE_STALE_RESET, task_id, "stale running task reset to approved");
    row(events::ROUTINE_STALE_RESET, "task", Some(task_id.to_string()), "stale_running_reset".to_string())
}

pub fn log_routine_helper_created(kind: &str, source_task_id: i32, helper_task_id: i32) -> ActionLogRow {
    info!(
        event_type = events::ROUTINE_HELPER_CREATED,
        kind, source_task_id, helper_task_id, "routine created helper task"
    );
    row(
        events::ROUTINE_HELPER_CREATED,
        "task",
        Some(helper_task_id.to_string()),
        format!("kind={kind} source_task_id={source_task_id}"),
    )
}

pub fn log_routine_helper_resolved(source_task_id: i32, helper_task_id: i32) -> ActionLogRow {
    info!(
        event_type = events::ROUTINE_HELPER_RESOLVED,
        source_task_id, helper_task_id, "routine resolved helper task"
    );
    row(
        events::ROUTINE_HELPER_RESOLVED,
        "task",
        Some(source_task_id.to_string()),
        format!("helper_task_id={helper_task_id}"),
    )
}
