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

//! Out-of-scope email delivery (spec §1 Non-goals), described here only
//! as an interface. `status_report_email` calls this trait; the real SMTP
//! transport is an external collaborator left to the deployer, same as
//! the premium CLI binary itself.

use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, subject: &str, html_body: &str);
}

/// Default sender: logs the report instead of delivering it. Suitable
/// for local runs and tests; operators wire a real transport in by
/// implementing [`EmailSender`] themselves.
pub struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(&self, subject: &str, html_body: &str) {
        info!(subject, bytes = html_body.len(), "status report email (logged, not sent)");
    }
}
