//! Scenario: a small pipeline with no retries or escalations runs
//! straight through to `done`, and only the blocks that actually invoke
//! an executor leave a mark in the executor log.

use std::sync::Arc;

use taskforge::health::HealthMonitor;
use taskforge::store::models::NewTask;

use crate::support::{self, success};

#[tokio::test]
async fn small_pipeline_runs_to_done_with_three_executor_log_entries() {
    let db = support::memdb().await;
    let health = HealthMonitor::new(db.clone());

    let blocks = serde_json::json!([
        {"kind": "route", "config": {"condition": "always"}},
        {"kind": "executor", "config": {"model": "openai/gpt-4o-mini"}},
        {"kind": "review", "config": {}},
        {"kind": "done", "config": {}},
    ]);
    let (agent_id, _pipeline_id) = support::seed_pipeline(&db, blocks).await;

    let task = db
        .tasks()
        .create(NewTask {
            title: "implement widget".into(),
            description: "add the widget endpoint".into(),
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
        success("verdict: pass"),
    ]));
    let engine = support::make_engine(db.clone(), health, remote.clone(), remote.clone(), remote);

    engine.run(task.id).await.unwrap();

    let reloaded = db.tasks().get(task.id).await.unwrap();
    assert_eq!(reloaded.status, "done");

    let log = db.executor_log().for_task(task.id).await.unwrap();
    assert_eq!(log.len(), 3, "route + executor + review should each log, done should not: {log:?}");
    assert_eq!(log[0].block_kind, "route");
    assert_eq!(log[1].block_kind, "executor");
    assert_eq!(log[2].block_kind, "review");
    assert_eq!(log[2].pass_fail.as_deref(), Some("pass"));
}
