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

//! Taskforge CLI - entrypoint and daemon for the taskforge orchestration
//! engine. `taskforge run` wires the store, health monitor, executors,
//! pipeline engine, scheduler ticks, routines loop, and the embedded
//! approval HTTP server from environment configuration (spec §6), then
//! runs until SIGINT/SIGTERM (spec §5's graceful-shutdown contract:
//! ticks stop accepting new work, in-flight runners finish on their own
//! adapter timeouts). `taskforge admin` exposes the out-of-band
//! operator actions spec §4.2 and §4.5 call for (manual health reset,
//! one-off decision issuance) without requiring the HTTP surface.

mod commands;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use taskforge::config::EngineConfig;
use taskforge::Engine;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Taskforge - an autonomous, approval-gated task execution engine.
#[derive(Parser)]
#[command(name = "taskforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (can also be set via TASKFORGE_DATABASE_URL).
    #[arg(long, env = "TASKFORGE_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Directory holding each agent's SOUL/INSTRUCTIONS/CONTEXT files.
    #[arg(long, env = "TASKFORGE_AGENTS_DIR", default_value = "agents", global = true)]
    agents_dir: std::path::PathBuf,

    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine: scheduler ticks, routines loop, and the approval
    /// HTTP server, until interrupted.
    Run {
        /// Address the approval HTTP server binds to.
        #[arg(long, default_value = "127.0.0.1:8787")]
        listen: SocketAddr,
    },
    /// Administrative commands that don't require the HTTP server.
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Force the premium-CLI health monitor back to HEALTHY, as after an
    /// operator re-authenticates it out of band (spec §4.2).
    ResetHealth,
    /// Print the premium-CLI health monitor's current state.
    ShowHealth,
    /// Issue a fresh approval decision for a task and print the
    /// approve/reject URLs (spec §4.5), superseding any pending one.
    Approve {
        /// The task id to request approval for.
        task_id: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut config = EngineConfig::from_env().context("loading configuration from environment")?;
    if let Some(database_url) = cli.database_url.clone() {
        config.database_url = database_url;
    }

    match cli.command {
        Commands::Run { listen } => commands::run::run(config, cli.agents_dir, listen).await,
        Commands::Admin { command } => {
            let engine = Arc::new(
                Engine::bootstrap(config, cli.agents_dir)
                    .await
                    .context("bootstrapping engine")?,
            );
            match command {
                AdminCommands::ResetHealth => commands::admin::reset_health(&engine).await,
                AdminCommands::ShowHealth => commands::admin::show_health(&engine).await,
                AdminCommands::Approve { task_id } => commands::admin::approve(&engine, task_id).await,
            }
        }
    }
}
