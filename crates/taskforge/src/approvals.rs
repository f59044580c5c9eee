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

//! Single-use approval-capability tokens (spec §4.5). The plaintext token
//! is never persisted: only `sha256(salt || token)` and the salt are
//! stored, and verification recomputes the hash and compares it in
//! constant time.

use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::store::{models::NewDecision, models::Decision, parse_ts, Database, StoreError};

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("decision not found")]
    NotFound,

    #[error("decision is not pending (status: {0})")]
    NotPending(String),

    #[error("decision expired")]
    Expired,

    #[error("token does not match")]
    TokenMismatch,

    #[error("unsupported entity/action combination: {entity_type}/{action}")]
    UnsupportedAction { entity_type: String, action: String },
}

fn random_hex(len_bytes: usize) -> String {
    let mut buf = vec![0u8; len_bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

fn hash_token(salt: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time equality over two hex strings of the stored hash length
/// (64 hex chars for SHA-256). A length mismatch is checked only after
/// comparing against a fixed-size buffer, so a well-formed 64-char
/// candidate never takes a fast path based on its own length.
fn constant_time_eq(a: &str, b: &str) -> bool {
    const FIXED_LEN: usize = 64;
    let mut buf_a = [0u8; FIXED_LEN];
    let mut buf_b = [0u8; FIXED_LEN];
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    for i in 0..FIXED_LEN {
        buf_a[i] = a_bytes.get(i).copied().unwrap_or(0);
        buf_b[i] = b_bytes.get(i).copied().unwrap_or(0);
    }

    let mut diff = 0u8;
    for i in 0..FIXED_LEN {
        diff |= buf_a[i] ^ buf_b[i];
    }

    diff == 0 && a_bytes.len() == b_bytes.len()
}

pub struct ApprovalTokens {
    db: Database,
}

pub struct CreatedDecision {
    pub decision_id: String,
    pub token: String,
}

impl ApprovalTokens {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Generates a new decision, superseding any existing pending decision
    /// for the same `(entity_type, entity_id, action)` triple.
    pub async fn create_decision(
        &self,
        entity_type: &str,
        entity_id: i32,
        action: &str,
        ttl: std::time::Duration,
    ) -> Result<CreatedDecision, ApprovalError> {
        self.db.decisions().supersede_pending(entity_type, entity_id, action).await?;

        let decision_id = random_hex(16);
        let token = random_hex(32);
        let salt = random_hex(16);
        let token_hash = hash_token(&salt, &token);
        let now = Utc::now();
        let expires_at = now + Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1));

        let decision = self
            .db
            .decisions()
            .create(NewDecision {
                decision_id: decision_id.clone(),
                entity_type: entity_type.to_string(),
                entity_id,
                action: action.to_string(),
                status: "pending".to_string(),
                token_hash,
                token_salt: salt,
                expires_at: Some(crate::store::format_ts(expires_at)),
                requested_at: crate::store::format_ts(now),
            })
            .await?;

        self.db
            .action_log()
            .append(crate::audit::log_decision_created(&decision.decision_id, "task", entity_id, action))
            .await?;

        Ok(CreatedDecision { decision_id, token })
    }

    /// Verifies a presented token against the stored decision. Does not
    /// mutate state; callers should follow a successful verify with
    /// [`Self::apply_decision`].
    pub async fn verify_decision_token(
        &self,
        decision_id: &str,
        token: &str,
    ) -> Result<Decision, ApprovalError> {
        let decision = self.db.decisions().get(decision_id).await?.ok_or(ApprovalError::NotFound)?;

        if decision.status != "pending" {
            return Err(ApprovalError::NotPending(decision.status));
        }

        if let Some(expires_at) = decision.expires_at.as_deref().and_then(parse_ts) {
            if Utc::now() >= expires_at {
                return Err(ApprovalError::Expired);
            }
        }

        let expected = hash_token(&decision.token_salt, token);
        if !constant_time_eq(&expected, &decision.token_hash) {
            self.db
                .action_log()
                .append(crate::audit::log_decision_rejected_stale_token(decision_id))
                .await?;
            return Err(ApprovalError::TokenMismatch);
        }

        Ok(decision)
    }

    /// One-shot transition of both the decision and its target entity.
    /// Currently supports `entity_type=task, action=start_task`.
    pub async fn apply_decision(&self, decision: &Decision, approve: bool) -> Result<(), ApprovalError> {
        let new_status = if approve { "approved" } else { "rejected" };
        self.db.decisions().apply(&decision.decision_id, new_status, "").await?;

        match (decision.entity_type.as_str(), decision.action.as_str()) {
            ("task", "start_task") => {
                let target_status = if approve { "approved" } else { "rejected" };
                self.db.tasks().set_status(decision.entity_id, target_status).await?;
            }
            (entity_type, action) => {
                return Err(ApprovalError::UnsupportedAction {
                    entity_type: entity_type.to_string(),
                    action: action.to_string(),
                });
            }
        }

        self.db
            .action_log()
            .append(crate::audit::log_decision_applied(&decision.decision_id, approve))
            .await?;
        Ok(())
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

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        let h = hash_token("salt", "token");
        assert!(constant_time_eq(&h, &h));
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_strings() {
        let h1 = hash_token("salt", "token-a");
        let h2 = hash_token("salt", "token-b");
        assert!(!constant_time_eq(&h1, &h2));
    }

    #[tokio::test]
    async fn create_then_verify_then_apply_approves_task() {
        let db = memdb().await;
        let task = db
            .tasks()
            .create(crate::store::models::NewTask {
                title: "critical thing".into(),
                description: "".into(),
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

        let decision = tokens.verify_decision_token(&created.decision_id, &created.token).await.unwrap();
        tokens.apply_decision(&decision, true).await.unwrap();

        let reloaded = db.tasks().get(task.id).await.unwrap();
        assert_eq!(reloaded.status, "approved");
    }

    #[tokio::test]
    async fn wrong_token_is_rejected_and_state_unchanged() {
        let db = memdb().await;
        let task = db
            .tasks()
            .create(crate::store::models::NewTask {
                title: "t".into(),
                description: "".into(),
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

        let result = tokens.verify_decision_token(&created.decision_id, "wrong-token").await;
        assert!(matches!(result, Err(ApprovalError::TokenMismatch)));

        let reloaded = db.tasks().get(task.id).await.unwrap();
        assert_eq!(reloaded.status, "pending");
    }

    #[tokio::test]
    async fn creating_second_decision_supersedes_first() {
        let db = memdb().await;
        let task = db
            .tasks()
            .create(crate::store::models::NewTask {
                title: "t".into(),
                description: "".into(),
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
        let first = tokens
            .create_decision("task", task.id, "start_task", std::time::Duration::from_secs(3600))
            .await
            .unwrap();
        let _second = tokens
            .create_decision("task", task.id, "start_task", std::time::Duration::from_secs(3600))
            .await
            .unwrap();

        let result = tokens.verify_decision_token(&first.decision_id, &first.token).await;
        assert!(matches!(result, Err(ApprovalError::NotPending(_))));
    }
}
