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

//! Remote LLM gateway adapter: a direct, synchronous call to an
//! OpenAI-compatible chat-completions endpoint (OpenRouter by default).
//! Grounded in the chat-model invocation built by the original
//! LangGraph-based job runtime, expressed here as a plain `reqwest` call
//! since this stack carries no LangChain/LangGraph equivalent.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{classify_http_status, AdapterResult, ExecutorAdapter, ExecutorError};
use crate::config::EngineConfig;
use crate::health::FailureType;

pub struct RemoteLlmAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    app_url: String,
    app_name: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl RemoteLlmAdapter {
    pub fn new(config: &EngineConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(config.remote_llm_timeout)
            .build()
            .expect("reqwest client builds with static config");

        Self {
            client,
            base_url: config.openrouter_base_url.trim_end_matches('/').to_string(),
            api_key: config.openrouter_api_key.clone(),
            app_url: config
                .public_base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:9000".to_string()),
            app_name: "Taskforge".to_string(),
        }
    }
}

#[async_trait]
impl ExecutorAdapter for RemoteLlmAdapter {
    fn name(&self) -> &'static str {
        "remote_llm"
    }

    async fn run(&self, prompt: &str, model: &str) -> Result<AdapterResult, ExecutorError> {
        let started = Instant::now();

        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(AdapterResult::failure(
                self.name(),
                started.elapsed(),
                FailureType::Error,
                "openrouter_api_key_missing",
            ));
        };

        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let result = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.app_url)
            .header("X-Title", &self.app_name)
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                let ft = if e.is_timeout() { FailureType::Timeout } else { FailureType::Error };
                return Ok(AdapterResult::failure(self.name(), started.elapsed(), ft, e.to_string()));
            }
        };

        if !response.status().is_success() {
            let ft = classify_http_status(response.status());
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            return Ok(AdapterResult::failure(
                self.name(),
                started.elapsed(),
                ft,
                format!("http {status}: {body_text}"),
            ));
        }

        match response.json::<ChatCompletionResponse>().await {
            Ok(parsed) => {
                let text = parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .unwrap_or_default();
                Ok(AdapterResult::ok(self.name(), started.elapsed(), text))
            }
            Err(e) => Ok(AdapterResult::failure(
                self.name(),
                started.elapsed(),
                FailureType::Error,
                format!("malformed gateway response: {e}"),
            )),
        }
    }
}
