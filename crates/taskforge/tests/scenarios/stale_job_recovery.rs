//! Scenario: a task stuck `active` with an `openclaw_job_status` that's
//! been `"running"` for longer than the stale-job window gets reclaimed
//! by the `idle_autostart` routine rather than left to rot. Every setter
//! on the public `TaskDal` stamps `updated_at = now()`, so backdating it
//! past the window needs a second connection straight to the schema —
//! there's no clock to inject.

use diesel::prelude::*;

use taskforge::store::models::NewTask;
use taskforge::store::schema::tasks;
use taskforge::store::Database;

use crate::support;

fn backdate_updated_at(db_path: &str, task_id: i32, minutes_ago: i64) {
    let old = taskforge::store::format_ts(chrono::Utc::now() - chrono::Duration::minutes(minutes_ago));
    let mut conn = diesel::sqlite::SqliteConnection::establish(db_path).unwrap();
    diesel::update(tasks::table.filter(tasks::id.eq(task_id)))
        .set(tasks::updated_at.eq(old))
        .execute(&mut conn)
        .unwrap();
}

#[tokio::test]
async fn stale_running_task_is_reset_to_approved() {
    let tmp = tempfile::Builder::new().suffix(".db").tempfile().unwrap();
    let path = tmp.path().to_str().unwrap().to_string();

    let db = Database::new(&path).unwrap();
    db.run_migrations().await.unwrap();

    let task = db
        .tasks()
        .create(NewTask {
            title: "generate report".into(),
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
    db.tasks().set_external_job(task.id, Some("ext-1"), Some("running")).await.unwrap();
    backdate_updated_at(&path, task.id, 15);

    let routine = db
        .routines()
        .create(taskforge::store::models::NewRoutine {
            id: "idle-autostart".into(),
            name: "idle autostart".into(),
            kind: "idle_autostart".into(),
            is_enabled: true,
            agent_id: None,
            claim_unassigned: false,
            created_at: String::new(),
            updated_at: String::new(),
        })
        .await
        .unwrap();

    let health = taskforge::health::HealthMonitor::new(db.clone());
    let never_called = std::sync::Arc::new(support::ScriptedAdapter::new(vec![]));
    let engine = std::sync::Arc::new(support::make_engine(
        db.clone(),
        health.clone(),
        never_called.clone(),
        never_called.clone(),
        never_called,
    ));
    let config = taskforge::config::EngineConfig::default();
    let scheduler = std::sync::Arc::new(taskforge::scheduler::TaskScheduler::new(db.clone(), engine, health, config));
    let routines = taskforge::routines::RoutinesEngine::new(db.clone(), scheduler, vec![]);

    routines.run_tick().await.unwrap();

    let reloaded = db.tasks().get(task.id).await.unwrap();
    assert_eq!(reloaded.status, "approved");
    assert_eq!(reloaded.last_error.as_deref(), Some("stale_running_reset"));
    assert_eq!(reloaded.retry_count, 0);
    assert_eq!(reloaded.openclaw_job_status, None);
    let _ = routine;
}
