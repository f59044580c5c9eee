//! Scenario: a review failure drives one retry (with the reviewer's
//! notes folded into the retry prompt), and the second review passes,
//! completing the task with `retry_count == 1`.

use std::sync::Arc;

use taskforge::health::HealthMonitor;
use taskforge::store::models::NewTask;

use crate::support::{self, success};

#[tokio::test]
async fn failed_review_retries_once_then_passes() {
    let db = support::memdb().await;
    let health = HealthMonitor::new(db.clone());

    let blocks = serde_json::json!([
        {"kind": "executor", "config": {}},
        {"kind": "review", "config": {}},
        {"kind": "retry", "config": {"max_retries": 1, "include_review_notes": true}},
        {"kind": "review", "config": {}},
        {"kind": "escalate", "config": {"on_limit": "queue"}},
        {"kind": "done", "config": {}},
    ]);
    let (agent_id, _pipeline_id) = support::seed_pipeline(&db, blocks).await;

    let task = db
        .tasks()
        .create(NewTask {
            title: "fix failing test".into(),
            description: "patch the broken import".into(),
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
        success("FAIL: missing import"),
        success("ok retried\n"),
        success("verdict: pass"),
    ]));
    let engine = support::make_engine(db.clone(), health, remote.clone(), remote.clone(), remote);

    engine.run(task.id).await.unwrap();

    let reloaded = db.tasks().get(task.id).await.unwrap();
    assert_eq!(reloaded.status, "done");
    assert_eq!(reloaded.retry_count, 1);

    let log = db.executor_log().for_task(task.id).await.unwrap();
    let kinds: Vec<&str> = log.iter().map(|e| e.block_kind.as_str()).collect();
    assert_eq!(kinds, vec!["executor", "review", "retry", "review"]);
    assert_eq!(log[1].pass_fail.as_deref(), Some("fail"));
    assert_eq!(log[3].pass_fail.as_deref(), Some("pass"));
}
