//! Scenario: a task escalates to the premium CLI, which reports the
//! daily usage limit has been hit. With `on_limit = "queue"` the task
//! parks itself with a resume pointer instead of failing outright; once
//! the daily reset passes, resuming the same block succeeds.

use std::sync::Arc;

use taskforge::health::HealthMonitor;
use taskforge::store::models::NewTask;
use taskforge::store::format_ts;

use crate::support::{self, failure, success};

#[tokio::test]
async fn daily_limit_parks_task_then_resumes_after_reset() {
    let db = support::memdb().await;
    let health = HealthMonitor::new(db.clone());

    let blocks = serde_json::json!([
        {"kind": "executor", "config": {}},
        {"kind": "review", "config": {}},
        {"kind": "retry", "config": {"max_retries": 1}},
        {"kind": "review", "config": {}},
        {"kind": "escalate", "config": {"on_limit": "queue"}},
        {"kind": "done", "config": {}},
    ]);
    let (agent_id, pipeline_id) = support::seed_pipeline(&db, blocks).await;

    let task = db
        .tasks()
        .create(NewTask {
            title: "stubborn bug".into(),
            description: "review keeps failing".into(),
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
        .unwrap();

    let remote = Arc::new(support::ScriptedAdapter::new(vec![
        success("ok\n"),
        success("FAIL: still broken"),
        success("ok retried\n"),
        success("FAIL: still broken"),
    ]));
    let premium = Arc::new(support::ScriptedPremiumCli::new(
        health.clone(),
        vec![failure(taskforge::health::FailureType::DailyLimit, "daily limit reached"), success("approved\n")],
    ));
    let engine = support::make_engine(db.clone(), health.clone(), remote.clone(), remote, premium);

    engine.run(task.id).await.unwrap();

    let parked = db.tasks().get(task.id).await.unwrap();
    assert_eq!(parked.status, "queued_for_claude");
    assert_eq!(parked.resume_block_index, Some(4));
    assert_eq!(parked.resume_pipeline_ref, Some(pipeline_id));

    // Simulate the daily reset deadline having passed.
    let mut row = db.health().get().await.unwrap();
    row.daily_reset_at = Some(format_ts(chrono::Utc::now() - chrono::Duration::hours(1)));
    db.health().save(&row).await.unwrap();

    engine.run(task.id).await.unwrap();

    let resumed = db.tasks().get(task.id).await.unwrap();
    assert_eq!(resumed.status, "done");
}
