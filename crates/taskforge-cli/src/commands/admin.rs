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

//! Operator actions that bypass the approval email / HTTP round trip:
//! inspecting or resetting the premium-CLI health state, and issuing a
//! one-off approval decision and printing its URLs directly to the
//! terminal.

use anyhow::{Context, Result};
use taskforge::Engine;

pub async fn show_health(engine: &Engine) -> Result<()> {
    let state = engine.health.get_state().await.context("reading health state")?;
    println!("premium CLI health: {}", state.as_str());
    Ok(())
}

pub async fn reset_health(engine: &Engine) -> Result<()> {
    engine.health.manual_reset().await.context("resetting health state")?;
    println!("premium CLI health reset to HEALTHY");
    Ok(())
}

pub async fn approve(engine: &Engine, task_id: i32) -> Result<()> {
    let created = engine
        .approvals
        .create_decision("task", task_id, "start_task", engine.config.approval_ttl)
        .await
        .context("creating approval decision")?;

    let base = engine.config.public_base_url.as_deref().unwrap_or("http://localhost:8787");
    println!(
        "approve: {base}/approve?decision_id={}&token={}",
        created.decision_id, created.token
    );
    println!(
        "reject:  {base}/reject?decision_id={}&token={}",
        created.decision_id, created.token
    );
    Ok(())
}
