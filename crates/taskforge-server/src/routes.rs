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

//! Route handlers. `/approve` and `/reject` are the out-of-band
//! confirmation pages a human follows from an approval email; both are
//! single-shot (spec §6, §8 invariant 3 via `ApprovalTokens`). Neither
//! route renders markdown or HTML beyond a tiny fixed template — real
//! rendering of task content is the out-of-scope web UI's job.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionQuery {
    decision_id: String,
    token: String,
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{body}</p></body></html>"
    ))
}

async fn decide(state: &AppState, query: &DecisionQuery, approve: bool) -> Response {
    let tokens = &state.engine.approvals;

    let decision = match tokens.verify_decision_token(&query.decision_id, &query.token).await {
        Ok(decision) => decision,
        Err(e) => {
            warn!(decision_id = %query.decision_id, error = %e, "approval token rejected");
            return (StatusCode::FORBIDDEN, page("Link expired or invalid", "This approval link has already been used, expired, or does not match our records.")).into_response();
        }
    };

    if let Err(e) = tokens.apply_decision(&decision, approve).await {
        warn!(decision_id = %query.decision_id, error = %e, "failed to apply decision");
        return (StatusCode::INTERNAL_SERVER_ERROR, page("Something went wrong", "The decision could not be recorded. Please try again or contact the operator.")).into_response();
    }

    let verb = if approve { "approved" } else { "rejected" };
    (
        StatusCode::OK,
        page("Thank you", &format!("Task #{} has been {verb}.", decision.entity_id)),
    )
        .into_response()
}

pub(crate) async fn approve(State(state): State<AppState>, Query(query): Query<DecisionQuery>) -> Response {
    decide(&state, &query, true).await
}

pub(crate) async fn reject(State(state): State<AppState>, Query(query): Query<DecisionQuery>) -> Response {
    decide(&state, &query, false).await
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    health_state: String,
    tasks_pending: i64,
    tasks_approved: i64,
    tasks_active: i64,
    tasks_blocked: i64,
    tasks_done: i64,
}

pub(crate) async fn status(State(state): State<AppState>) -> Response {
    let health_state = match state.engine.health.get_state().await {
        Ok(s) => s.as_str().to_string(),
        Err(_) => "unknown".to_string(),
    };

    let count = |status: &'static str| {
        let db = state.engine.db.clone();
        async move { db.tasks().list_by_status(status).await.map(|v| v.len() as i64).unwrap_or(0) }
    };

    let body = StatusResponse {
        health_state,
        tasks_pending: count("pending").await,
        tasks_approved: count("approved").await,
        tasks_active: count("active").await,
        tasks_blocked: count("blocked").await,
        tasks_done: count("done").await,
    };

    Json(body).into_response()
}

pub(crate) async fn healthz() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

pub(crate) async fn metrics(State(state): State<AppState>) -> Response {
    state.metrics.render().into_response()
}
