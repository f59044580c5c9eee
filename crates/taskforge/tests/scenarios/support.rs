//! Shared fixtures for the end-to-end scenario tests: an in-memory
//! database wired up exactly like [`taskforge::Engine::bootstrap`] does
//! it, plus scripted executor adapters that stand in for the remote LLM
//! gateway and the premium CLI so a scenario can dictate each block's
//! outcome without shelling out or hitting the network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use taskforge::agent_files::AgentFiles;
use taskforge::executor::{AdapterResult, ExecutorAdapter, ExecutorError};
use taskforge::health::{FailureType, HealthMonitor};
use taskforge::pipeline::PipelineEngine;
use taskforge::store::models::{NewAgent, NewPipeline};
use taskforge::store::Database;

pub async fn memdb() -> Database {
    let db = Database::new(":memory:").unwrap();
    db.run_migrations().await.unwrap();
    db
}

/// Builds a `PipelineEngine` wired the way `Engine::bootstrap` wires it,
/// with arbitrary per-backend adapters substituted in by the caller.
pub fn make_engine(
    db: Database,
    health: HealthMonitor,
    remote: std::sync::Arc<dyn ExecutorAdapter>,
    local: std::sync::Arc<dyn ExecutorAdapter>,
    premium: std::sync::Arc<dyn ExecutorAdapter>,
) -> PipelineEngine {
    PipelineEngine::new(db, health, AgentFiles::new(std::env::temp_dir()), remote, local, premium)
}

pub fn success(output: impl Into<String>) -> AdapterResult {
    AdapterResult {
        success: true,
        output: output.into(),
        duration: Duration::from_millis(10),
        error: None,
        failure_type: Some(FailureType::Success),
        executor: "scripted",
    }
}

pub fn failure(failure_type: FailureType, error: impl Into<String>) -> AdapterResult {
    AdapterResult {
        success: false,
        output: String::new(),
        duration: Duration::from_millis(10),
        error: Some(error.into()),
        failure_type: Some(failure_type),
        executor: "scripted",
    }
}

/// Replays a fixed queue of results, one per call, in order. Panics if
/// exhausted — a scenario that calls it more times than scripted is a
/// test bug, not a runtime condition to handle gracefully.
pub struct ScriptedAdapter {
    queue: Mutex<VecDeque<AdapterResult>>,
}

impl ScriptedAdapter {
    pub fn new(results: Vec<AdapterResult>) -> Self {
        Self { queue: Mutex::new(results.into_iter().collect()) }
    }
}

#[async_trait]
impl ExecutorAdapter for ScriptedAdapter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, _prompt: &str, _model: &str) -> Result<AdapterResult, ExecutorError> {
        let result = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedAdapter queue exhausted");
        Ok(result)
    }
}

/// Like [`ScriptedAdapter`], but also records each outcome with a
/// [`HealthMonitor`] the way the real premium-CLI adapter does — the
/// `escalate` pipeline block reads health state immediately after
/// calling this adapter and relies on that side effect.
pub struct ScriptedPremiumCli {
    queue: Mutex<VecDeque<AdapterResult>>,
    health: HealthMonitor,
}

impl ScriptedPremiumCli {
    pub fn new(health: HealthMonitor, results: Vec<AdapterResult>) -> Self {
        Self { queue: Mutex::new(results.into_iter().collect()), health }
    }
}

#[async_trait]
impl ExecutorAdapter for ScriptedPremiumCli {
    fn name(&self) -> &'static str {
        "premium_cli"
    }

    async fn run(&self, _prompt: &str, _model: &str) -> Result<AdapterResult, ExecutorError> {
        let result = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedPremiumCli queue exhausted");
        let failure_type = result.failure_type.unwrap_or(FailureType::Error);
        self.health.record(failure_type, result.duration).await?;
        Ok(result)
    }
}

/// Seeds one agent and one pipeline (`task_type = "default"`) with the
/// given block sequence, and returns the pipeline's id.
pub async fn seed_pipeline(db: &Database, blocks_json: serde_json::Value) -> (i32, i32) {
    let agent = db
        .agents()
        .create(NewAgent {
            name: "worker".into(),
            role: "general".into(),
            model: "openai/gpt-4o-mini".into(),
            pipeline_id: None,
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        })
        .await
        .unwrap();

    let pipeline = db
        .pipelines()
        .create(NewPipeline {
            name: "default".into(),
            description: "scenario pipeline".into(),
            task_type: "default".into(),
            blocks_json: blocks_json.to_string(),
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        })
        .await
        .unwrap();

    (agent.id, pipeline.id)
}
