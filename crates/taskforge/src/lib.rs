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

//! Taskforge: an autonomous, approval-gated task execution and
//! orchestration engine. Tasks flow through a per-agent pipeline of
//! blocks (route, executor, review, retry, escalate, done), dispatched
//! across three interchangeable executor backends, with a state machine
//! tracking the health of the premium CLI executor and a set of routines
//! that keep the system self-healing between scheduler ticks.
//!
//! [`Engine`] is the top-level wiring facade: it owns the store, health
//! monitor, agent files, executor adapters, pipeline engine, scheduler,
//! and routines engine, and is the type `taskforge-cli` and
//! `taskforge-server` construct from an [`EngineConfig`].

pub mod agent_files;
pub mod approvals;
pub mod audit;
pub mod config;
pub mod email;
pub mod error;
pub mod executor;
pub mod health;
pub mod pipeline;
pub mod recurrence;
pub mod routines;
pub mod scheduler;
pub mod seed;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

pub use error::{EngineError, Result};

use agent_files::AgentFiles;
use approvals::ApprovalTokens;
use config::EngineConfig;
use executor::local_job::LocalJobAdapter;
use executor::premium_cli::PremiumCliAdapter;
use executor::remote_llm::RemoteLlmAdapter;
use executor::ExecutorAdapter;
use health::HealthMonitor;
use pipeline::PipelineEngine;
use routines::RoutinesEngine;
use scheduler::TaskScheduler;
use store::Database;

/// Owns every long-lived collaborator and the background tasks that
/// drive the engine forward once [`Engine::spawn`] is called.
pub struct Engine {
    pub db: Database,
    pub health: HealthMonitor,
    pub approvals: ApprovalTokens,
    pub scheduler: Arc<TaskScheduler>,
    pub routines: Arc<RoutinesEngine>,
    pub config: EngineConfig,
}

impl Engine {
    /// Opens the store, runs migrations, seeds a default roster if the
    /// database is empty, and wires up the health monitor, executor
    /// adapters, pipeline engine, scheduler, and routines engine from
    /// `config`. Does not start any background task — call
    /// [`Engine::spawn`] for that once the caller is ready to run.
    pub async fn bootstrap(config: EngineConfig, agents_root: impl Into<std::path::PathBuf>) -> Result<Self> {
        let db = Database::new(&config.database_url)?;
        db.run_migrations().await?;
        seed::seed_if_empty(&db).await?;

        let health = HealthMonitor::new(db.clone()).with_thresholds(
            config.claude_consecutive_rate_limits_for_daily,
            config.claude_rate_limit_window,
            config.claude_unavailable_cooldown,
        );
        let agent_files = AgentFiles::new(agents_root);

        let remote_llm: Arc<dyn ExecutorAdapter> = Arc::new(RemoteLlmAdapter::new(&config));
        let local_job: Arc<dyn ExecutorAdapter> = Arc::new(LocalJobAdapter::new(db.clone(), &config));
        let premium_cli: Arc<dyn ExecutorAdapter> = Arc::new(PremiumCliAdapter::new(health.clone(), &config));

        let pipeline_engine = Arc::new(PipelineEngine::new(
            db.clone(),
            health.clone(),
            agent_files,
            remote_llm,
            local_job,
            premium_cli,
        ));

        let scheduler = Arc::new(TaskScheduler::new(db.clone(), pipeline_engine, health.clone(), config.clone()));
        let routines = Arc::new(RoutinesEngine::new(db.clone(), scheduler.clone(), config.auto_critical_keywords.clone()));
        let approvals = ApprovalTokens::new(db.clone());

        Ok(Self { db, health, approvals, scheduler, routines, config })
    }

    /// Spawns the scheduler's three tick loops plus the routines loop.
    /// Returns their join handles; the caller decides whether to hold
    /// them, abort them, or just let the process run until it's killed.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        let mut handles = self.scheduler.spawn();
        handles.push(self.routines.clone().spawn(self.routines_tick()));
        handles
    }

    fn routines_tick(&self) -> Duration {
        self.config.routines_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_seeds_a_usable_engine() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.database_url = ":memory:".to_string();

        let engine = Engine::bootstrap(config, tmp.path().join("agents")).await.unwrap();
        assert_eq!(engine.db.agents().count().await.unwrap(), 4);
        assert_eq!(engine.health.get_state().await.unwrap(), health::HealthState::Healthy);
    }
}
