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

//! First-run bootstrap: a default pipeline, one agent per role, and one
//! enabled routine per kind. Only runs when the agents table is empty, so
//! an operator's hand-edited roster is never clobbered on restart.

use tracing::info;

use crate::store::models::{NewAgent, NewPipeline, NewRoutine};
use crate::store::{Database, StoreError};

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
const DEFAULT_TASK_TYPE: &str = "default";

const DEFAULT_BLOCKS_JSON: &str = r#"[
  {"kind": "route", "config": {}},
  {"kind": "executor", "config": {"executor": "local", "model": "openai/gpt-4o-mini"}},
  {"kind": "review", "config": {"executor": "remote", "model": "openai/gpt-4o-mini", "pass_action": "skip_to_done"}},
  {"kind": "retry", "config": {"max_retries": 2, "include_review_notes": true}},
  {"kind": "escalate", "config": {"on_limit": "queue"}},
  {"kind": "done", "config": {}}
]"#;

struct RoleSeed {
    name: &'static str,
    role: &'static str,
}

const ROLE_SEEDS: [RoleSeed; 4] = [
    RoleSeed { name: "Ada", role: "programming" },
    RoleSeed { name: "Vitruvius", role: "architecture" },
    RoleSeed { name: "Rex", role: "reviewing" },
    RoleSeed { name: "Herald", role: "reporting" },
];

struct RoutineSeed {
    id: &'static str,
    name: &'static str,
    kind: &'static str,
    claim_unassigned: bool,
}

const ROUTINE_SEEDS: [RoutineSeed; 5] = [
    RoutineSeed { id: "idle_autostart", name: "Idle autostart", kind: "idle_autostart", claim_unassigned: true },
    RoutineSeed { id: "review_autocreate", name: "Review autocreate", kind: "review_autocreate", claim_unassigned: false },
    RoutineSeed { id: "blocked_resolution", name: "Blocked resolution", kind: "blocked_resolution", claim_unassigned: false },
    RoutineSeed { id: "planning_next_phase", name: "Planning next phase", kind: "planning_next_phase", claim_unassigned: false },
    RoutineSeed { id: "status_report_email", name: "Status report email", kind: "status_report_email", claim_unassigned: false },
];

/// Installs the default pipeline, one agent per role, and every routine
/// kind enabled, but only if no agents exist yet. Idempotent across
/// restarts of an already-seeded database.
pub async fn seed_if_empty(db: &Database) -> Result<(), StoreError> {
    if db.agents().count().await? > 0 {
        return Ok(());
    }

    info!("no agents found; installing default pipeline, agents, and routines");

    let pipeline = db
        .pipelines()
        .create(NewPipeline {
            name: "Default pipeline".to_string(),
            description: "route -> executor -> review -> retry -> escalate -> done".to_string(),
            task_type: DEFAULT_TASK_TYPE.to_string(),
            blocks_json: DEFAULT_BLOCKS_JSON.to_string(),
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        })
        .await?;

    for seed in ROLE_SEEDS {
        db.agents()
            .create(NewAgent {
                name: seed.name.to_string(),
                role: seed.role.to_string(),
                model: DEFAULT_MODEL.to_string(),
                pipeline_id: Some(pipeline.id),
                is_active: true,
                created_at: String::new(),
                updated_at: String::new(),
            })
            .await?;
    }

    for seed in ROUTINE_SEEDS {
        db.routines()
            .create(NewRoutine {
                id: seed.id.to_string(),
                name: seed.name.to_string(),
                kind: seed.kind.to_string(),
                is_enabled: true,
                agent_id: None,
                claim_unassigned: seed.claim_unassigned,
                created_at: String::new(),
                updated_at: String::new(),
            })
            .await?;
    }

    Ok(())
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
    async fn seeds_one_agent_per_role() {
        let db = memdb().await;
        seed_if_empty(&db).await.unwrap();
        let agents = db.agents().list_all().await.unwrap();
        assert_eq!(agents.len(), ROLE_SEEDS.len());
        for seed in ROLE_SEEDS {
            assert!(db.agents().find_by_role(seed.role).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn seeds_every_routine_kind_enabled() {
        let db = memdb().await;
        seed_if_empty(&db).await.unwrap();
        let routines = db.routines().list_enabled().await.unwrap();
        assert_eq!(routines.len(), ROUTINE_SEEDS.len());
    }

    #[tokio::test]
    async fn is_a_noop_on_second_call() {
        let db = memdb().await;
        seed_if_empty(&db).await.unwrap();
        seed_if_empty(&db).await.unwrap();
        assert_eq!(db.agents().count().await.unwrap(), ROLE_SEEDS.len() as i64);
    }

    #[tokio::test]
    async fn default_pipeline_blocks_parse_as_valid_json() {
        let db = memdb().await;
        seed_if_empty(&db).await.unwrap();
        let pipeline = db.pipelines().find_by_task_type(DEFAULT_TASK_TYPE).await.unwrap().unwrap();
        let parsed: Vec<crate::pipeline::Block> = serde_json::from_str(&pipeline.blocks_json).unwrap();
        assert_eq!(parsed.len(), 6);
        assert_eq!(parsed.last().unwrap().kind, "done");
    }
}
