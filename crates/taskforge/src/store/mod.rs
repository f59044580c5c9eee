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

//! Embedded SQLite persistence: connection pool, migrations, and a small
//! set of data-access-layer (DAL) structs, one per entity, each holding a
//! reference back to the shared [`Database`] handle.
//!
//! Timestamps are stored as RFC3339 strings; SQLite has no native datetime
//! type and the original system stored ISO-8601 text, which this mirrors.

pub mod models;
pub mod schema;

use chrono::{DateTime, Utc};
use deadpool_diesel::sqlite::{Manager, Pool, Runtime};
use diesel::prelude::*;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use thiserror::Error;
use tracing::info;

use self::models::*;
use self::schema::*;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("../../migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("database error: {0}")]
    Diesel(#[from] diesel::result::Error),

    #[error("row not found: {0}")]
    NotFound(String),

    #[error("migration error: {0}")]
    Migration(String),
}

/// Formats a `chrono` timestamp the way the store persists it.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub fn now_ts() -> String {
    format_ts(Utc::now())
}

/// Parses a stored timestamp. Malformed rows are a store bug, not a
/// recoverable condition, so callers generally `expect` this.
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}

#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Database(sqlite)")
    }
}

impl Database {
    /// Opens (creating if needed) a SQLite database at `path`, or an
    /// in-memory database for `path == ":memory:"`.
    pub fn new(path: &str) -> Result<Self, StoreError> {
        let manager = Manager::new(path.to_string(), Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(1) // SQLite: a single writer avoids "database is locked".
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        info!(path, "opened sqlite store");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(|conn| {
            diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
            diesel::sql_query("PRAGMA busy_timeout=30000;").execute(conn)?;
            diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
            conn.run_pending_migrations(MIGRATIONS)
                .map(|_| ())
                .map_err(|e| {
                    diesel::result::Error::QueryBuilderError(
                        Box::<dyn std::error::Error + Send + Sync>::from(e.to_string()),
                    )
                })
        })
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))??;
        Ok(())
    }

    pub fn tasks(&self) -> TaskDal<'_> {
        TaskDal { db: self }
    }
    pub fn agents(&self) -> AgentDal<'_> {
        AgentDal { db: self }
    }
    pub fn pipelines(&self) -> PipelineDal<'_> {
        PipelineDal { db: self }
    }
    pub fn decisions(&self) -> DecisionDal<'_> {
        DecisionDal { db: self }
    }
    pub fn health(&self) -> HealthDal<'_> {
        HealthDal { db: self }
    }
    pub fn routines(&self) -> RoutineDal<'_> {
        RoutineDal { db: self }
    }
    pub fn executor_log(&self) -> ExecutorLogDal<'_> {
        ExecutorLogDal { db: self }
    }
    pub fn action_log(&self) -> ActionLogDal<'_> {
        ActionLogDal { db: self }
    }
    pub fn local_jobs(&self) -> LocalJobDal<'_> {
        LocalJobDal { db: self }
    }
    pub fn critiques(&self) -> CritiqueDal<'_> {
        CritiqueDal { db: self }
    }
}

// =============================================================================
// Tasks
// =============================================================================

pub struct TaskDal<'a> {
    db: &'a Database,
}

impl<'a> TaskDal<'a> {
    pub async fn create(&self, mut new_task: NewTask) -> Result<Task, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        let ts = now_ts();
        new_task.created_at = ts.clone();
        new_task.updated_at = ts;
        conn.interact(move |conn| {
            diesel::insert_into(tasks::table).values(&new_task).execute(conn)?;
            tasks::table.order(tasks::id.desc()).first(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn get(&self, id: i32) -> Result<Task, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| tasks::table.filter(tasks::id.eq(id)).first(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)
    }

    pub async fn list_by_status(&self, status: &str) -> Result<Vec<Task>, StoreError> {
        let status = status.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            tasks::table
                .filter(tasks::status.eq(status))
                .order(tasks::id.asc())
                .load(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn list_by_statuses(&self, statuses: &[&str]) -> Result<Vec<Task>, StoreError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            tasks::table
                .filter(tasks::status.eq_any(statuses))
                .order(tasks::id.asc())
                .load(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn list_not_in_statuses(&self, statuses: &[&str]) -> Result<Vec<Task>, StoreError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            tasks::table
                .filter(tasks::status.ne_all(statuses))
                .order(tasks::id.asc())
                .load(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn list_all(&self) -> Result<Vec<Task>, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| tasks::table.order(tasks::id.asc()).load(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)
    }

    /// Returns tasks whose description contains the given helper-task
    /// marker, e.g. `[review_of_task_id:42]`.
    pub async fn find_by_description_marker(&self, marker: &str) -> Result<Vec<Task>, StoreError> {
        let pattern = format!("%{marker}%");
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            tasks::table
                .filter(tasks::description.like(pattern))
                .order(tasks::id.asc())
                .load(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn set_status(&self, id: i32, status: &str) -> Result<(), StoreError> {
        let status = status.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(tasks::table.filter(tasks::id.eq(id)))
                .set((tasks::status.eq(status), tasks::updated_at.eq(now_ts())))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn set_external_job(
        &self,
        id: i32,
        job_id: Option<&str>,
        job_status: Option<&str>,
    ) -> Result<(), StoreError> {
        let job_id = job_id.map(str::to_string);
        let job_status = job_status.map(str::to_string);
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(tasks::table.filter(tasks::id.eq(id)))
                .set((
                    tasks::openclaw_job_id.eq(job_id),
                    tasks::openclaw_job_status.eq(job_status),
                    tasks::updated_at.eq(now_ts()),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn set_resume_pointer(
        &self,
        id: i32,
        block_index: Option<i32>,
        pipeline_ref: Option<i32>,
    ) -> Result<(), StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(tasks::table.filter(tasks::id.eq(id)))
                .set((
                    tasks::resume_block_index.eq(block_index),
                    tasks::resume_pipeline_ref.eq(pipeline_ref),
                    tasks::updated_at.eq(now_ts()),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn set_result(
        &self,
        id: i32,
        last_result: &str,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        let last_result = last_result.to_string();
        let last_error = last_error.map(str::to_string);
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(tasks::table.filter(tasks::id.eq(id)))
                .set((
                    tasks::last_result.eq(last_result),
                    tasks::last_error.eq(last_error),
                    tasks::updated_at.eq(now_ts()),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn set_review_notes(&self, id: i32, notes: &str) -> Result<(), StoreError> {
        let notes = notes.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(tasks::table.filter(tasks::id.eq(id)))
                .set((tasks::review_notes.eq(notes), tasks::updated_at.eq(now_ts())))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn set_review_summary(&self, id: i32, summary: &str) -> Result<(), StoreError> {
        let summary = summary.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(tasks::table.filter(tasks::id.eq(id)))
                .set((tasks::review_summary.eq(summary), tasks::updated_at.eq(now_ts())))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn increment_retry_count(&self, id: i32) -> Result<i32, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            conn.transaction(|conn| {
                let current: i32 = tasks::table
                    .filter(tasks::id.eq(id))
                    .select(tasks::retry_count)
                    .first(conn)?;
                let next = current + 1;
                diesel::update(tasks::table.filter(tasks::id.eq(id)))
                    .set((tasks::retry_count.eq(next), tasks::updated_at.eq(now_ts())))
                    .execute(conn)?;
                Ok::<i32, diesel::result::Error>(next)
            })
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn reset_retry_count(&self, id: i32) -> Result<(), StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(tasks::table.filter(tasks::id.eq(id)))
                .set((tasks::retry_count.eq(0), tasks::updated_at.eq(now_ts())))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn assign_agent(&self, id: i32, agent_id: i32) -> Result<(), StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(tasks::table.filter(tasks::id.eq(id)))
                .set((tasks::assigned_agent_id.eq(agent_id), tasks::updated_at.eq(now_ts())))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn set_next_run_at(&self, id: i32, next_run_at: Option<&str>) -> Result<(), StoreError> {
        let next_run_at = next_run_at.map(str::to_string);
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(tasks::table.filter(tasks::id.eq(id)))
                .set((tasks::next_run_at.eq(next_run_at), tasks::updated_at.eq(now_ts())))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn set_last_run_at(&self, id: i32, last_run_at: &str) -> Result<(), StoreError> {
        let last_run_at = last_run_at.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(tasks::table.filter(tasks::id.eq(id)))
                .set((tasks::last_run_at.eq(last_run_at), tasks::updated_at.eq(now_ts())))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn delete(&self, id: i32) -> Result<(), StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| diesel::delete(tasks::table.filter(tasks::id.eq(id))).execute(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)?;
        Ok(())
    }

    /// True if `agent_id` has any task in-flight (`active`, or with an
    /// in-flight external-job marker).
    pub async fn agent_is_busy(&self, agent_id: i32) -> Result<bool, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        let count: i64 = conn
            .interact(move |conn| {
                tasks::table
                    .filter(tasks::assigned_agent_id.eq(agent_id))
                    .filter(
                        tasks::status
                            .eq("active")
                            .or(tasks::openclaw_job_status.eq("queued"))
                            .or(tasks::openclaw_job_status.eq("running")),
                    )
                    .count()
                    .get_result(conn)
            })
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)?;
        Ok(count > 0)
    }

    pub async fn list_approved_unassigned(&self) -> Result<Vec<Task>, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            tasks::table
                .filter(tasks::status.eq("approved"))
                .filter(tasks::assigned_agent_id.is_null())
                .order((tasks::updated_at.asc(), tasks::id.asc()))
                .load(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn find_oldest_approved_for_agent(&self, agent_id: i32) -> Result<Option<Task>, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            tasks::table
                .filter(tasks::status.eq("approved"))
                .filter(tasks::assigned_agent_id.eq(agent_id))
                .order((tasks::updated_at.asc(), tasks::id.asc()))
                .first(conn)
                .optional()
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }
}

// =============================================================================
// Agents
// =============================================================================

pub struct AgentDal<'a> {
    db: &'a Database,
}

impl<'a> AgentDal<'a> {
    pub async fn create(&self, mut new_agent: NewAgent) -> Result<Agent, StoreError> {
        let ts = now_ts();
        new_agent.created_at = ts.clone();
        new_agent.updated_at = ts;
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::insert_into(agents::table).values(&new_agent).execute(conn)?;
            agents::table.order(agents::id.desc()).first(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn get(&self, id: i32) -> Result<Agent, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| agents::table.filter(agents::id.eq(id)).first(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)
    }

    pub async fn list_active(&self) -> Result<Vec<Agent>, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            agents::table
                .filter(agents::is_active.eq(true))
                .order(agents::id.asc())
                .load(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn list_all(&self) -> Result<Vec<Agent>, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| agents::table.order(agents::id.asc()).load(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)
    }

    pub async fn find_by_role(&self, role: &str) -> Result<Option<Agent>, StoreError> {
        let role = role.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            agents::table
                .filter(agents::role.eq(role))
                .filter(agents::is_active.eq(true))
                .order(agents::id.asc())
                .first(conn)
                .optional()
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| agents::table.count().get_result(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)
    }
}

// =============================================================================
// Pipelines
// =============================================================================

pub struct PipelineDal<'a> {
    db: &'a Database,
}

impl<'a> PipelineDal<'a> {
    pub async fn create(&self, mut new_pipeline: NewPipeline) -> Result<Pipeline, StoreError> {
        let ts = now_ts();
        new_pipeline.created_at = ts.clone();
        new_pipeline.updated_at = ts;
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::insert_into(pipelines::table).values(&new_pipeline).execute(conn)?;
            pipelines::table.order(pipelines::id.desc()).first(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn get(&self, id: i32) -> Result<Pipeline, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| pipelines::table.filter(pipelines::id.eq(id)).first(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)
    }

    pub async fn find_by_task_type(&self, task_type: &str) -> Result<Option<Pipeline>, StoreError> {
        let task_type = task_type.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            pipelines::table
                .filter(pipelines::task_type.eq(task_type))
                .filter(pipelines::is_active.eq(true))
                .first(conn)
                .optional()
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| pipelines::table.count().get_result(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)
    }
}

// =============================================================================
// Decisions
// =============================================================================

pub struct DecisionDal<'a> {
    db: &'a Database,
}

impl<'a> DecisionDal<'a> {
    pub async fn create(&self, new_decision: NewDecision) -> Result<Decision, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        let id = new_decision.decision_id.clone();
        conn.interact(move |conn| {
            diesel::insert_into(decisions::table).values(&new_decision).execute(conn)?;
            decisions::table.filter(decisions::decision_id.eq(id)).first(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn get(&self, decision_id: &str) -> Result<Option<Decision>, StoreError> {
        let decision_id = decision_id.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            decisions::table
                .filter(decisions::decision_id.eq(decision_id))
                .first(conn)
                .optional()
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    /// Supersedes any existing pending decision for `(entity_type, entity_id, action)`.
    pub async fn supersede_pending(
        &self,
        entity_type: &str,
        entity_id: i32,
        action: &str,
    ) -> Result<(), StoreError> {
        let entity_type = entity_type.to_string();
        let action = action.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(
                decisions::table
                    .filter(decisions::entity_type.eq(entity_type))
                    .filter(decisions::entity_id.eq(entity_id))
                    .filter(decisions::action.eq(action))
                    .filter(decisions::status.eq("pending")),
            )
            .set((decisions::status.eq("superseded"), decisions::updated_at.eq(now_ts())))
            .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn find_pending(
        &self,
        entity_type: &str,
        entity_id: i32,
        action: &str,
    ) -> Result<Option<Decision>, StoreError> {
        let entity_type = entity_type.to_string();
        let action = action.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            decisions::table
                .filter(decisions::entity_type.eq(entity_type))
                .filter(decisions::entity_id.eq(entity_id))
                .filter(decisions::action.eq(action))
                .filter(decisions::status.eq("pending"))
                .first(conn)
                .optional()
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn apply(
        &self,
        decision_id: &str,
        status: &str,
        result_markdown: &str,
    ) -> Result<(), StoreError> {
        let decision_id = decision_id.to_string();
        let status = status.to_string();
        let result_markdown = result_markdown.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(decisions::table.filter(decisions::decision_id.eq(decision_id)))
                .set((
                    decisions::status.eq(status),
                    decisions::decided_at.eq(now_ts()),
                    decisions::result_markdown.eq(result_markdown),
                    decisions::updated_at.eq(now_ts()),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }
}

// =============================================================================
// HealthMonitor singleton row
// =============================================================================

pub struct HealthDal<'a> {
    db: &'a Database,
}

impl<'a> HealthDal<'a> {
    pub async fn get(&self) -> Result<HealthRow, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| claude_health::table.filter(claude_health::id.eq(1)).first(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)
    }

    pub async fn save(&self, row: &HealthRow) -> Result<(), StoreError> {
        let row = row.clone();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(claude_health::table.filter(claude_health::id.eq(1)))
                .set(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }
}

// =============================================================================
// Routines + routine_state KV
// =============================================================================

pub struct RoutineDal<'a> {
    db: &'a Database,
}

impl<'a> RoutineDal<'a> {
    pub async fn create(&self, mut new_routine: NewRoutine) -> Result<Routine, StoreError> {
        let ts = now_ts();
        new_routine.created_at = ts.clone();
        new_routine.updated_at = ts;
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        let id = new_routine.id.clone();
        conn.interact(move |conn| {
            diesel::insert_into(routines::table).values(&new_routine).execute(conn)?;
            routines::table.filter(routines::id.eq(id)).first(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn list_enabled(&self) -> Result<Vec<Routine>, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            routines::table
                .filter(routines::is_enabled.eq(true))
                .order(routines::id.asc())
                .load(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| routines::table.count().get_result(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)
    }

    pub async fn get_state(&self, routine_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        let routine_id = routine_id.to_string();
        let key = key.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            routine_state::table
                .filter(routine_state::routine_id.eq(routine_id))
                .filter(routine_state::key.eq(key))
                .select(routine_state::value)
                .first(conn)
                .optional()
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn set_state(&self, routine_id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let routine_id = routine_id.to_string();
        let key = key.to_string();
        let value = value.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::insert_into(routine_state::table)
                .values((
                    routine_state::routine_id.eq(&routine_id),
                    routine_state::key.eq(&key),
                    routine_state::value.eq(&value),
                    routine_state::updated_at.eq(now_ts()),
                ))
                .on_conflict((routine_state::routine_id, routine_state::key))
                .do_update()
                .set((routine_state::value.eq(&value), routine_state::updated_at.eq(now_ts())))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }
}

// =============================================================================
// Executor log
// =============================================================================

pub struct ExecutorLogDal<'a> {
    db: &'a Database,
}

impl<'a> ExecutorLogDal<'a> {
    pub async fn append(&self, entry: NewExecutorLogEntry) -> Result<(), StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| diesel::insert_into(executor_log::table).values(&entry).execute(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn for_task(&self, task_id: i32) -> Result<Vec<ExecutorLogEntry>, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            executor_log::table
                .filter(executor_log::task_id.eq(task_id))
                .order(executor_log::id.asc())
                .load(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }
}

// =============================================================================
// Action log (audit trail)
// =============================================================================

pub struct ActionLogDal<'a> {
    db: &'a Database,
}

impl<'a> ActionLogDal<'a> {
    pub async fn append(&self, row: crate::audit::ActionLogRow) -> Result<(), StoreError> {
        let new_row = NewActionLog {
            ts: format_ts(row.ts),
            actor: row.actor,
            action: row.action.to_string(),
            entity_type: row.entity_type.to_string(),
            entity_id: row.entity_id,
            detail: row.detail,
        };
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| diesel::insert_into(action_logs::table).values(&new_row).execute(conn))
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .map_err(StoreError::from)?;
        Ok(())
    }
}

// =============================================================================
// Local (in-process) job table
// =============================================================================

pub struct LocalJobDal<'a> {
    db: &'a Database,
}

impl<'a> LocalJobDal<'a> {
    pub async fn create(&self, new_job: NewLocalJob) -> Result<LocalJob, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        let job_id = new_job.job_id.clone();
        conn.interact(move |conn| {
            diesel::insert_into(local_jobs::table).values(&new_job).execute(conn)?;
            local_jobs::table.filter(local_jobs::job_id.eq(job_id)).first(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<LocalJob>, StoreError> {
        let job_id = job_id.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            local_jobs::table.filter(local_jobs::job_id.eq(job_id)).first(conn).optional()
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn mark_running(&self, job_id: &str) -> Result<(), StoreError> {
        let job_id = job_id.to_string();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(local_jobs::table.filter(local_jobs::job_id.eq(job_id)))
                .set((local_jobs::status.eq("running"), local_jobs::started_at.eq(now_ts())))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn finish(
        &self,
        job_id: &str,
        status: &str,
        result: &str,
        error: Option<&str>,
        used_model: Option<&str>,
    ) -> Result<(), StoreError> {
        let job_id = job_id.to_string();
        let status = status.to_string();
        let result = result.to_string();
        let error = error.map(str::to_string);
        let used_model = used_model.map(str::to_string);
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::update(local_jobs::table.filter(local_jobs::job_id.eq(job_id)))
                .set((
                    local_jobs::status.eq(status),
                    local_jobs::result.eq(result),
                    local_jobs::error.eq(error),
                    local_jobs::used_model.eq(used_model),
                    local_jobs::finished_at.eq(now_ts()),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)?;
        Ok(())
    }
}

// =============================================================================
// Critiques
// =============================================================================

pub struct CritiqueDal<'a> {
    db: &'a Database,
}

impl<'a> CritiqueDal<'a> {
    pub async fn create(&self, mut new_critique: NewCritique) -> Result<Critique, StoreError> {
        new_critique.created_at = now_ts();
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            diesel::insert_into(critiques::table).values(&new_critique).execute(conn)?;
            critiques::table.order(critiques::id.desc()).first(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn for_task(&self, task_id: i32) -> Result<Vec<Critique>, StoreError> {
        let conn = self.db.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            critiques::table
                .filter(critiques::task_id.eq(task_id))
                .order(critiques::id.asc())
                .load(conn)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memdb() -> Database {
        let db = Database::new(":memory:").unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    #[tokio::test]
    async fn create_and_fetch_task_round_trips() {
        let db = memdb().await;
        let created = db
            .tasks()
            .create(NewTask {
                title: "do the thing".into(),
                description: "".into(),
                status: "pending".into(),
                assigned_agent_id: None,
                due_date: None,
                is_critical: false,
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
        assert_eq!(created.status, "pending");

        let fetched = db.tasks().get(created.id).await.unwrap();
        assert_eq!(fetched.title, "do the thing");
    }

    #[tokio::test]
    async fn set_status_updates_updated_at() {
        let db = memdb().await;
        let t = db
            .tasks()
            .create(NewTask {
                title: "x".into(),
                description: "".into(),
                status: "pending".into(),
                assigned_agent_id: None,
                due_date: None,
                is_critical: false,
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
        db.tasks().set_status(t.id, "approved").await.unwrap();
        let reloaded = db.tasks().get(t.id).await.unwrap();
        assert_eq!(reloaded.status, "approved");
    }

    #[tokio::test]
    async fn health_singleton_row_is_seeded_by_migration() {
        let db = memdb().await;
        let row = db.health().get().await.unwrap();
        assert_eq!(row.id, 1);
        assert_eq!(row.state, "HEALTHY");
    }

    #[tokio::test]
    async fn routine_state_upserts() {
        let db = memdb().await;
        db.routines().set_state("status_report_email", "last_sent_at", "a").await.unwrap();
        db.routines().set_state("status_report_email", "last_sent_at", "b").await.unwrap();
        let v = db.routines().get_state("status_report_email", "last_sent_at").await.unwrap();
        assert_eq!(v.as_deref(), Some("b"));
    }
}
