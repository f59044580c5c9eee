//! Scenario: a critical task starts `pending` and only moves once a
//! human presents the right capability token for its decision. A wrong
//! or stale token is rejected and leaves the task untouched.

use taskforge::approvals::ApprovalTokens;
use taskforge::store::models::NewTask;

use crate::support;

#[tokio::test]
async fn correct_token_approves_critical_task() {
    let db = support::memdb().await;
    let task = db
        .tasks()
        .create(NewTask {
            title: "rotate production credentials".into(),
            description: "security-critical task".into(),
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
    assert!(task.is_critical);
    assert_eq!(task.status, "pending");

    let tokens = ApprovalTokens::new(db.clone());
    let created = tokens
        .create_decision("task", task.id, "start_task", std::time::Duration::from_secs(3600))
        .await
        .unwrap();

    let decision = tokens.verify_decision_token(&created.decision_id, &created.token).await.unwrap();
    tokens.apply_decision(&decision, true).await.unwrap();

    let reloaded = db.tasks().get(task.id).await.unwrap();
    assert_eq!(reloaded.status, "approved");
}

#[tokio::test]
async fn wrong_or_stale_token_is_rejected_without_changing_state() {
    let db = support::memdb().await;
    let task = db
        .tasks()
        .create(NewTask {
            title: "rotate production credentials".into(),
            description: "security-critical task".into(),
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

    let tokens = ApprovalTokens::new(db.clone());
    let created = tokens
        .create_decision("task", task.id, "start_task", std::time::Duration::from_secs(3600))
        .await
        .unwrap();

    let wrong = tokens.verify_decision_token(&created.decision_id, "not-the-token").await;
    assert!(matches!(wrong, Err(taskforge::approvals::ApprovalError::TokenMismatch)));

    // A decision_id from a since-superseded request is just as rejected.
    let superseded = tokens
        .create_decision("task", task.id, "start_task", std::time::Duration::from_secs(3600))
        .await
        .unwrap();
    let _ = superseded;
    let stale = tokens.verify_decision_token(&created.decision_id, &created.token).await;
    assert!(matches!(stale, Err(taskforge::approvals::ApprovalError::NotPending(_))));

    let reloaded = db.tasks().get(task.id).await.unwrap();
    assert_eq!(reloaded.status, "pending");
}
