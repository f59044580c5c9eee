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

//! The thin HTTP adapter for the approval-token subsystem (spec §6): two
//! single-shot confirmation routes (`/approve`, `/reject`), a `/status`
//! JSON summary, and the ambient `/healthz` liveness probe and
//! `/metrics` Prometheus exporter every binary in this corpus carries.
//! It does not render a dashboard, accept task/agent CRUD, or edit
//! pipelines — that UI is explicitly out of scope (spec §1).

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use taskforge::Engine;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub(crate) struct AppState {
    pub engine: Arc<Engine>,
    pub metrics: PrometheusHandle,
}

/// Builds the axum [`Router`] exposing the approval and status surface
/// described in spec §6, wired against an already-[`Engine::bootstrap`]ed
/// engine. Installing the Prometheus recorder is idempotent-by-caller:
/// call this once per process.
pub fn build_router(engine: Arc<Engine>) -> Router {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .expect("install prometheus recorder");

    let state = AppState { engine, metrics };

    Router::new()
        .route("/approve", axum::routing::get(routes::approve))
        .route("/reject", axum::routing::get(routes::reject))
        .route("/status", axum::routing::get(routes::status))
        .route("/healthz", axum::routing::get(routes::healthz))
        .route("/metrics", axum::routing::get(routes::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves `build_router` until the process is killed or the
/// given future resolves (graceful shutdown).
pub async fn serve(engine: Arc<Engine>, addr: SocketAddr, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> std::io::Result<()> {
    let app = build_router(engine);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "taskforge-server listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn test_engine() -> Arc<Engine> {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = taskforge::config::EngineConfig::default();
        config.database_url = ":memory:".to_string();
        Arc::new(Engine::bootstrap(config, tmp.path().join("agents")).await.unwrap())
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let engine = test_engine().await;
        let app = build_router(engine);
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn approve_with_unknown_decision_returns_403() {
        let engine = test_engine().await;
        let app = build_router(engine);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/approve?decision_id=nope&token=nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
