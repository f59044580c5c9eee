//! Scenario: the premium CLI reports an auth failure, which only a
//! manual reset can clear. Any `escalate` block hit while in that state
//! suspends the task immediately — `blocked` under `on_limit = "stop"`,
//! `paused_limit` under `on_limit = "queue"` — without ever calling the
//! adapter again.

use std::sync::Arc;

use taskforge::health::{FailureType, HealthMonitor};
use taskforge::store::models::NewTask;

use crate::support;

async fn make_task(db: &taskforge::store::Database, agent_id: i32) -> i32 {
    db.tasks()
        .create(NewTask {
            title: "needs claude".into(),
            description: "escalated task".into(),
            status: "approved".into(),
            assigned_agent_id: Some(agent_id),
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
        .unwrap()
        .id
}

#[tokio::test]
async fn on_limit_stop_blocks_the_task() {
    let db = support::memdb().await;
    let health = HealthMonitor::new(db.clone());
    health.record(FailureType::Auth, std::time::Duration::from_secs(1)).await.unwrap();
    assert_eq!(health.get_state().await.unwrap(), taskforge::health::HealthState::AuthFailed);

    let blocks = serde_json::json!([
        {"kind": "escalate", "config": {"on_limit": "stop"}},
        {"kind": "done", "config": {}},
    ]);
    let (agent_id, _pipeline_id) = support::seed_pipeline(&db, blocks).await;
    let task_id = make_task(&db, agent_id).await;

    let never_called = Arc::new(support::ScriptedAdapter::new(vec![]));
    let engine = support::make_engine(db.clone(), health, never_called.clone(), never_called.clone(), never_called);

    engine.run(task_id).await.unwrap();

    let reloaded = db.tasks().get(task_id).await.unwrap();
    assert_eq!(reloaded.status, "blocked");
}

#[tokio::test]
async fn on_limit_queue_pauses_the_task() {
    let db = support::memdb().await;
    let health = HealthMonitor::new(db.clone());
    health.record(FailureType::Auth, std::time::Duration::from_secs(1)).await.unwrap();

    let blocks = serde_json::json!([
        {"kind": "escalate", "config": {"on_limit": "queue"}},
        {"kind": "done", "config": {}},
    ]);
    let (agent_id, pipeline_id) = support::seed_pipeline(&db, blocks).await;
    let task_id = make_task(&db, agent_id).await;

    let never_called = Arc::new(support::ScriptedAdapter::new(vec![]));
    let engine = support::make_engine(db.clone(), health, never_called.clone(), never_called.clone(), never_called);

    engine.run(task_id).await.unwrap();

    let reloaded = db.tasks().get(task_id).await.unwrap();
    assert_eq!(reloaded.status, "paused_limit");
    assert_eq!(reloaded.resume_block_index, Some(0));
    assert_eq!(reloaded.resume_pipeline_ref, Some(pipeline_id));
}
