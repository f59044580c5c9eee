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

//! `taskforge run`: bootstraps the engine, spawns its background tick
//! loops, and serves the approval HTTP surface until a shutdown signal
//! arrives.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use taskforge::config::EngineConfig;
use taskforge::Engine;
use tracing::info;

pub async fn run(config: EngineConfig, agents_dir: PathBuf, listen: SocketAddr) -> Result<()> {
    let engine = Arc::new(
        Engine::bootstrap(config, agents_dir)
            .await
            .context("bootstrapping engine")?,
    );

    let handles = engine.spawn();
    info!(ticks = handles.len(), "background tick loops started");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received; draining in-flight pipeline runs");
    };

    taskforge_server::serve(engine, listen, shutdown)
        .await
        .context("approval server exited with an error")?;

    for handle in handles {
        handle.abort();
    }

    Ok(())
}
