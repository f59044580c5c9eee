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

//! In-process local-job adapter: enqueues a row to the `local_jobs`
//! table, runs the gateway call on a detached task, and polls the row
//! until it reaches a terminal state or a bounded per-job timeout
//! elapses. Grounded in the original local job-queue service, with the
//! HTTP+SQLite server collapsed into an in-process table plus a
//! `tokio::spawn`'d worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::remote_llm::RemoteLlmAdapter;
use super::{AdapterResult, ExecutorAdapter, ExecutorError};
use crate::config::EngineConfig;
use crate::health::FailureType;
use crate::store::{models::NewLocalJob, Database};

pub struct LocalJobAdapter {
    db: Database,
    gateway: Arc<RemoteLlmAdapter>,
    timeout: Duration,
    poll_interval: Duration,
}

impl LocalJobAdapter {
    pub fn new(db: Database, config: &EngineConfig) -> Self {
        Self {
            db,
            gateway: Arc::new(RemoteLlmAdapter::new(config)),
            timeout: config.local_job_timeout,
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[async_trait]
impl ExecutorAdapter for LocalJobAdapter {
    fn name(&self) -> &'static str {
        "local_job"
    }

    async fn run(&self, prompt: &str, model: &str) -> Result<AdapterResult, ExecutorError> {
        let started = Instant::now();
        let job_id = uuid::Uuid::new_v4().to_string();
        let payload = serde_json::json!({"prompt": prompt, "model": model}).to_string();

        self.db
            .local_jobs()
            .create(NewLocalJob {
                job_id: job_id.clone(),
                status: "queued".to_string(),
                created_at: String::new(),
                payload,
            })
            .await?;

        let db = self.db.clone();
        let gateway = self.gateway.clone();
        let bg_job_id = job_id.clone();
        let bg_prompt = prompt.to_string();
        let bg_model = model.to_string();
        tokio::spawn(async move {
            let _ = db.local_jobs().mark_running(&bg_job_id).await;
            match gateway.run(&bg_prompt, &bg_model).await {
                Ok(r) if r.success => {
                    let _ = db
                        .local_jobs()
                        .finish(&bg_job_id, "completed", &r.output, None, Some(&bg_model))
                        .await;
                }
                Ok(r) => {
                    let _ = db
                        .local_jobs()
                        .finish(&bg_job_id, "failed", "", r.error.as_deref(), None)
                        .await;
                }
                Err(e) => {
                    let _ = db
                        .local_jobs()
                        .finish(&bg_job_id, "failed", "", Some(&e.to_string()), None)
                        .await;
                }
            }
        });

        loop {
            if started.elapsed() > self.timeout {
                return Ok(AdapterResult::failure(
                    self.name(),
                    started.elapsed(),
                    FailureType::Error,
                    format!("local job timed out after {:?}", self.timeout),
                ));
            }

            if let Some(job) = self.db.local_jobs().get(&job_id).await? {
                match job.status.as_str() {
                    "completed" => return Ok(AdapterResult::ok(self.name(), started.elapsed(), job.result)),
                    "failed" => {
                        return Ok(AdapterResult::failure(
                            self.name(),
                            started.elapsed(),
                            FailureType::Error,
                            job.error.unwrap_or_default(),
                        ))
                    }
                    _ => {}
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_surfaces_as_failed_job() {
        let db = Database::new(":memory:").unwrap();
        db.run_migrations().await.unwrap();
        let config = EngineConfig::default();
        let adapter = LocalJobAdapter::new(db, &config);
        let result = adapter.run("do something", "openai/gpt-4o-mini").await.unwrap();
        assert!(!result.success);
    }
}
